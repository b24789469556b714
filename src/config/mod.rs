//! Runtime configuration (spec section 6), grounded on the teacher's
//! `utils::Settings`/`settings::load_config` pattern: a serde tree loaded
//! through the `config` crate, extended with the `rule`/`expiration`/
//! `pollInterval`/`hashtableBits` schema spec.md 6 describes for the XML
//! tree this crate replaces with TOML/INI (teacher's own substitution,
//! not ours — `utils::Settings` already loads an INI-shaped file instead
//! of the upstream project's native config format).

use crate::error::ConfigError;
use crate::ie::registry;
use crate::rule::{pattern, Field, Modifier, Rule, RuleSet, Semantic};
use config::{Config, File};
use log::warn;
use serde::Deserialize;
use std::path::PathBuf;

/// Sanity caps mirroring `AggregatorBaseCfg`'s own limits (Design Notes,
/// "malformed rule, unknown IE, too many rules/fields... fatal at
/// startup").
const MAX_RULES: usize = 64;
const MAX_FIELDS_PER_RULE: usize = 32;

#[derive(Debug, Deserialize)]
pub struct LogSettings {
    pub level: String,
}

#[derive(Debug, Deserialize)]
pub struct ListenerSettings {
    pub host: String,
    /// `0` (the pcap default) disables packet capture so the process can
    /// run on the decoded-record ingest path alone (UDP listener only).
    #[serde(default)]
    pub capture_device: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExporterSettings {
    pub host: String,
    #[serde(default = "default_template_refresh_secs")]
    pub template_refresh_secs: u64,
    #[serde(default = "default_template_refresh_messages")]
    pub template_refresh_messages: u32,
}

fn default_template_refresh_secs() -> u64 {
    60
}

fn default_template_refresh_messages() -> u32 {
    100
}

#[derive(Debug, Deserialize)]
pub struct ExpirationSettings {
    pub active_timeout_secs: i64,
    pub inactive_timeout_secs: i64,
}

/// A single `<flowKey>`/`<nonFlowKey>` entry (spec section 6): an IE
/// descriptor plus the modifier, optional match pattern, and the
/// `autoAddV4PrefixLength` flag that asks the loader to also add the
/// paired IPv4 prefix-length field for a masked address.
#[derive(Debug, Deserialize)]
pub struct FieldDescriptor {
    pub ie_name: Option<String>,
    pub ie_id: Option<u16>,
    #[serde(default)]
    pub enterprise_number: u32,
    /// `"keep"`, `"discard"`, `"mask<N>"` (e.g. `"mask24"`), or
    /// `"aggregate"`.
    pub modifier: String,
    pub pattern: Option<String>,
    #[serde(default)]
    pub auto_add_v4_prefix_length: bool,
}

#[derive(Debug, Deserialize)]
pub struct RuleSettings {
    pub template_id: u16,
    #[serde(default)]
    pub biflow_aggregation: bool,
    #[serde(default)]
    pub flow_key: Vec<FieldDescriptor>,
    #[serde(default)]
    pub non_flow_key: Vec<FieldDescriptor>,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub log: LogSettings,
    pub listener: ListenerSettings,
    pub exporter: ExporterSettings,
    pub expiration: ExpirationSettings,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_hashtable_bits")]
    pub hashtable_bits: u8,
    #[serde(default)]
    pub front_payload_len: usize,
    #[serde(default = "default_max_table_size")]
    pub max_table_size: usize,
    #[serde(default)]
    pub rule: Vec<RuleSettings>,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_hashtable_bits() -> u8 {
    17
}

fn default_max_table_size() -> usize {
    1_000_000
}

impl Settings {
    /// Loads and validates the configuration tree, matching the
    /// teacher's `Settings::init`/`load_config` pattern: an optional
    /// override file merged over defaults, plus `APP_`-prefixed
    /// environment variables.
    pub fn load(config_file: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut raw = Config::new();

        match config_file {
            Some(path) => {
                raw.merge(File::from(path))?;
            }
            None => warn!("no config file provided, launching with built-in defaults"),
        }
        raw.merge(config::Environment::with_prefix("APP"))?;

        let settings: Settings = raw.try_into()?;
        settings.validate_timing()?;
        Ok(settings)
    }

    /// Enforces the `pollInterval ≤ min(activeTimeout, inactiveTimeout)/2`
    /// rule spec section 4.3 calls out as something "an implementation
    /// must enforce" — the teacher's loader never validated beyond what
    /// `serde` itself rejects, so this is new, not inherited.
    fn validate_timing(&self) -> Result<(), ConfigError> {
        let poll_ms = self.poll_interval_ms;
        let limit_ms = (self.expiration.active_timeout_secs.min(self.expiration.inactive_timeout_secs) * 1000 / 2).max(0) as u64;
        if poll_ms > limit_ms {
            return Err(ConfigError::PollIntervalTooLarge { poll_ms, limit_ms });
        }
        if self.hashtable_bits == 0 || self.hashtable_bits > 30 {
            return Err(ConfigError::InvalidHashtableBits(self.hashtable_bits));
        }
        Ok(())
    }

    pub fn active_timeout_us(&self) -> i64 {
        self.expiration.active_timeout_secs * 1_000_000
    }

    pub fn inactive_timeout_us(&self) -> i64 {
        self.expiration.inactive_timeout_secs * 1_000_000
    }

    pub fn poll_interval_us(&self) -> i64 {
        self.poll_interval_ms as i64 * 1000
    }

    /// Builds the `RuleSet` the Aggregator runs, applying the same
    /// sanity caps `AggregatorBaseCfg::readRule` applies before handing
    /// the result to `Rule::build` for the per-rule checks (empty rule,
    /// biflow-with-pattern stripping).
    pub fn build_rule_set(&self) -> Result<RuleSet, ConfigError> {
        if self.rule.len() > MAX_RULES {
            return Err(ConfigError::TooManyRules(self.rule.len(), MAX_RULES));
        }

        let rules = self.rule.iter().map(build_rule).collect::<Result<Vec<Rule>, ConfigError>>()?;
        Ok(RuleSet { rules })
    }
}

fn resolve_ie(desc: &FieldDescriptor) -> Result<crate::ie::IeKey, ConfigError> {
    if let Some(id) = desc.ie_id {
        return Ok(crate::ie::IeKey::enterprise(id, desc.enterprise_number));
    }
    let name = desc.ie_name.as_deref().ok_or_else(|| ConfigError::UnknownIe("<missing ieName/ieId>".to_string()))?;
    registry().find_by_name(name).ok_or_else(|| ConfigError::UnknownIe(name.to_string()))
}

fn parse_modifier(text: &str) -> Option<Modifier> {
    match text {
        "keep" => Some(Modifier::Keep),
        "discard" => Some(Modifier::Discard),
        "aggregate" => Some(Modifier::Aggregate),
        other => other.strip_prefix("mask").and_then(|bits| bits.parse::<u8>().ok()).map(Modifier::Mask),
    }
}

fn semantic_for(ie: crate::ie::IeKey) -> Semantic {
    use crate::ie::FieldType::*;
    match crate::ie::FieldType::from_id(ie.id) {
        Some(SourceIPv4Address) | Some(SourceIPv6Address) | Some(SourceTransportPort) | Some(SourceMacAddress) => Semantic::SourceDirectional,
        Some(DestinationIPv4Address) | Some(DestinationIPv6Address) | Some(DestinationTransportPort) | Some(DestinationMacAddress) => Semantic::DestinationDirectional,
        _ => Semantic::Default,
    }
}

fn parse_pattern_for_ie(template_id: u16, ie: crate::ie::IeKey, text: &str) -> Result<crate::rule::Pattern, ConfigError> {
    use crate::ie::FieldType::*;
    match crate::ie::FieldType::from_id(ie.id) {
        Some(ProtocolIdentifier) => pattern::parse_protocol(template_id, text),
        Some(SourceTransportPort) | Some(DestinationTransportPort) => pattern::parse_ports(template_id, text),
        Some(SourceIPv4Address) | Some(DestinationIPv4Address) => pattern::parse_ipv4_prefix(template_id, text),
        Some(SourceMacAddress) | Some(DestinationMacAddress) => pattern::parse_mac(template_id, text),
        Some(TcpControlBits) => pattern::parse_tcp_flags(template_id, text),
        _ => Err(ConfigError::BadPattern { template_id, kind: "unsupported", value: text.to_string(), reason: format!("IE {} has no known pattern grammar", ie) }),
    }
}

fn build_field(template_id: u16, desc: &FieldDescriptor, is_key: bool) -> Result<Field, ConfigError> {
    let ie = resolve_ie(desc)?;
    let modifier = parse_modifier(&desc.modifier).unwrap_or(if is_key { Modifier::Keep } else { Modifier::Aggregate });
    let pattern = desc.pattern.as_deref().map(|text| parse_pattern_for_ie(template_id, ie, text)).transpose()?;
    Ok(Field { ie, modifier, pattern, semantic: semantic_for(ie) })
}

fn build_rule(settings: &RuleSettings) -> Result<Rule, ConfigError> {
    let total_fields = settings.flow_key.len() + settings.non_flow_key.len();
    if total_fields > MAX_FIELDS_PER_RULE {
        return Err(ConfigError::TooManyFields(total_fields, MAX_FIELDS_PER_RULE));
    }

    let mut fields = Vec::with_capacity(total_fields + settings.flow_key.len());
    for desc in &settings.flow_key {
        let field = build_field(settings.template_id, desc, true)?;
        if desc.auto_add_v4_prefix_length {
            if let Some(prefix_ie) = auto_prefix_length_ie(field.ie) {
                fields.push(Field { ie: prefix_ie, modifier: Modifier::Keep, pattern: None, semantic: field.semantic });
            }
        }
        fields.push(field);
    }
    for desc in &settings.non_flow_key {
        fields.push(build_field(settings.template_id, desc, false)?);
    }

    Rule::build(settings.template_id, settings.biflow_aggregation, fields)
}

fn auto_prefix_length_ie(ie: crate::ie::IeKey) -> Option<crate::ie::IeKey> {
    use crate::ie::FieldType::*;
    match crate::ie::FieldType::from_id(ie.id) {
        Some(SourceIPv4Address) => Some(crate::ie::IeKey::standard(SourceIPv4PrefixLength as u16)),
        Some(DestinationIPv4Address) => Some(crate::ie::IeKey::standard(DestinationIPv4PrefixLength as u16)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_rule_settings() -> RuleSettings {
        RuleSettings {
            template_id: 256,
            biflow_aggregation: false,
            flow_key: vec![
                FieldDescriptor { ie_name: Some("sourceIPv4Address".to_string()), ie_id: None, enterprise_number: 0, modifier: "keep".to_string(), pattern: None, auto_add_v4_prefix_length: false },
                FieldDescriptor { ie_name: Some("protocolIdentifier".to_string()), ie_id: None, enterprise_number: 0, modifier: "keep".to_string(), pattern: Some("6".to_string()), auto_add_v4_prefix_length: false },
            ],
            non_flow_key: vec![FieldDescriptor { ie_name: Some("octetDeltaCount".to_string()), ie_id: None, enterprise_number: 0, modifier: "aggregate".to_string(), pattern: None, auto_add_v4_prefix_length: false }],
        }
    }

    #[test]
    fn builds_a_rule_from_named_ies() {
        let rule = build_rule(&sample_rule_settings()).unwrap();
        assert_eq!(rule.fields.len(), 3);
        assert!(rule.fields[1].pattern.is_some());
    }

    #[test]
    fn unknown_ie_name_is_a_config_error() {
        let mut settings = sample_rule_settings();
        settings.flow_key[0].ie_name = Some("notARealIe".to_string());
        assert!(matches!(build_rule(&settings), Err(ConfigError::UnknownIe(_))));
    }

    #[test]
    fn mask_modifier_parses_prefix_bits() {
        assert_eq!(parse_modifier("mask24"), Some(Modifier::Mask(24)));
        assert_eq!(parse_modifier("keep"), Some(Modifier::Keep));
        assert_eq!(parse_modifier("bogus"), None);
    }

    #[test]
    fn auto_add_v4_prefix_length_inserts_companion_field() {
        let mut settings = sample_rule_settings();
        settings.flow_key[0].modifier = "mask24".to_string();
        settings.flow_key[0].auto_add_v4_prefix_length = true;
        let rule = build_rule(&settings).unwrap();
        assert!(rule.fields.iter().any(|f| crate::ie::FieldType::from_id(f.ie.id) == Some(crate::ie::FieldType::SourceIPv4PrefixLength)));
    }

    #[test]
    fn too_many_fields_is_a_config_error() {
        let mut settings = sample_rule_settings();
        for _ in 0..MAX_FIELDS_PER_RULE {
            settings.non_flow_key.push(FieldDescriptor { ie_name: Some("octetDeltaCount".to_string()), ie_id: None, enterprise_number: 0, modifier: "aggregate".to_string(), pattern: None, auto_add_v4_prefix_length: false });
        }
        assert!(matches!(build_rule(&settings), Err(ConfigError::TooManyFields(_, _))));
    }
}
