//! Rules and field extraction (spec section 4.2), grounded on
//! original_source's `AggregatorBaseCfg.cpp` (`readRule`,
//! `readFlowKeyRule`, `readNonFlowKeyRule`).
//!
//! The C++ loader swallows pattern-parse errors by nulling the field and
//! letting the rule survive without it (Design Notes, Open Question 2).
//! This implementation treats a pattern-parse failure as a
//! [`ConfigError`] and refuses to start — the spec's explicit resolution
//! of that ambiguity.

mod pattern;

pub use pattern::{MacBytes, Pattern};

use crate::error::ConfigError;
use crate::ie::{registry, AggregationPolicy, FieldType, FieldValue, IeKey};
use crate::packet::{HeaderView, Packet};
use log::warn;
use std::collections::HashMap;
use std::net::IpAddr;

/// How a flow-key field's raw bytes are transformed before hashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    Keep,
    Discard,
    /// Keep only the top `prefix_bits` bits of an address field,
    /// zeroing the rest (1..=32 for IPv4, checked at load time).
    Mask(u8),
    Aggregate,
}

/// Directional semantics an IE can carry (spec section 3): most fields
/// are direction-agnostic, but some are explicitly tagged so biflow
/// folding knows which counterpart to swap into on a reverse match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Semantic {
    Default,
    SourceDirectional,
    DestinationDirectional,
    Reverse,
}

#[derive(Debug, Clone)]
pub struct Field {
    pub ie: IeKey,
    pub modifier: Modifier,
    pub pattern: Option<Pattern>,
    pub semantic: Semantic,
}

impl Field {
    pub fn is_key(&self) -> bool {
        matches!(self.modifier, Modifier::Keep | Modifier::Discard | Modifier::Mask(_))
    }
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub template_id: u16,
    pub biflow_aggregation: bool,
    pub fields: Vec<Field>,
}

impl Rule {
    pub fn key_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.is_key())
    }

    pub fn aggregate_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| matches!(f.modifier, Modifier::Aggregate))
    }

    /// Whether `headers` satisfies every key field's match pattern, if
    /// any (spec section 4.2).
    pub fn matches(&self, headers: &HeaderView) -> bool {
        rule_matches(self, headers)
    }

    /// Builds a `Rule` from already-validated pieces, applying the
    /// loader-time sanity checks the spec requires: biflow rules cannot
    /// carry patterns (strip + warn, matching
    /// `AggregatorBaseCfg::readRule`'s texture), and a rule must declare
    /// at least one field.
    pub fn build(template_id: u16, biflow_aggregation: bool, mut fields: Vec<Field>) -> Result<Rule, ConfigError> {
        if fields.is_empty() {
            return Err(ConfigError::EmptyRule(template_id));
        }

        if biflow_aggregation {
            for f in &mut fields {
                if f.pattern.take().is_some() {
                    warn!(
                        "rule {}: match pattern for {} ignored because biflow aggregation is enabled",
                        template_id,
                        registry().name(f.ie)
                    );
                }
            }
        }

        for f in &fields {
            let policy = registry().policy(f.ie);
            match f.modifier {
                Modifier::Aggregate if policy == AggregationPolicy::Key => {
                    warn!("field {} configured as nonFlowKey will not be aggregated", registry().name(f.ie));
                }
                Modifier::Keep | Modifier::Discard | Modifier::Mask(_) if policy.is_aggregate() => {
                    warn!("field {} configured as flowKey will be aggregated", registry().name(f.ie));
                }
                _ => {}
            }
        }

        Ok(Rule { template_id, biflow_aggregation, fields })
    }
}

#[derive(Debug, Default, Clone)]
pub struct RuleSet {
    pub rules: Vec<Rule>,
}

impl RuleSet {
    /// Every Rule that matches `packet`, in rule order (spec section
    /// 4.4: "Dispatches each input to *every* Rule that matches").
    pub fn matching<'a>(&'a self, packet: &Packet) -> Vec<&'a Rule> {
        let headers = match packet.headers() {
            Ok(h) => h,
            Err(_) => return Vec::new(),
        };
        self.rules.iter().filter(|r| rule_matches(r, headers)).collect()
    }
}

fn extract_raw(headers: &HeaderView, ie: IeKey) -> Option<FieldValue> {
    let field_type = FieldType::from_id(ie.id);
    match field_type {
        Some(FieldType::SourceIPv4Address) | Some(FieldType::SourceIPv6Address) => ip_field(headers.src_ip),
        Some(FieldType::DestinationIPv4Address) | Some(FieldType::DestinationIPv6Address) => ip_field(headers.dst_ip),
        Some(FieldType::SourceTransportPort) => headers.src_port.map(FieldValue::U16),
        Some(FieldType::DestinationTransportPort) => headers.dst_port.map(FieldValue::U16),
        Some(FieldType::ProtocolIdentifier) => Some(FieldValue::U8(headers.protocol)),
        Some(FieldType::SourceMacAddress) => Some(FieldValue::Bytes(headers.src_mac.to_vec())),
        Some(FieldType::DestinationMacAddress) => Some(FieldValue::Bytes(headers.dst_mac.to_vec())),
        Some(FieldType::VlanId) => headers.vlan_id.map(FieldValue::U16),
        Some(FieldType::TcpControlBits) => headers.tcp_flags.map(FieldValue::U8),
        Some(FieldType::MSinimumTTL) | Some(FieldType::MSaximumTTL) => Some(FieldValue::U8(headers.ttl)),
        Some(FieldType::OctetTotalCount) | Some(FieldType::OctetDeltaCount) => Some(FieldValue::U64(headers.ip_total_length as u64)),
        Some(FieldType::PacketTotalCount) | Some(FieldType::PacketDeltaCount) => Some(FieldValue::U64(1)),
        _ => None,
    }
}

fn ip_field(addr: IpAddr) -> Option<FieldValue> {
    match addr {
        IpAddr::V4(v4) => Some(FieldValue::U32(u32::from(v4))),
        IpAddr::V6(v6) => Some(FieldValue::U128(u128::from(v6))),
    }
}

fn apply_modifier(value: FieldValue, modifier: Modifier) -> FieldValue {
    match modifier {
        Modifier::Mask(bits) => mask_prefix(value, bits),
        _ => value,
    }
}

fn mask_prefix(value: FieldValue, prefix_bits: u8) -> FieldValue {
    match value {
        FieldValue::U32(v) => {
            let mask: u32 = if prefix_bits == 0 { 0 } else { !0u32 << (32 - prefix_bits.min(32)) };
            FieldValue::U32(v & mask)
        }
        FieldValue::U128(v) => {
            let mask: u128 = if prefix_bits == 0 { 0 } else { !0u128 << (128 - prefix_bits.min(128)) };
            FieldValue::U128(v & mask)
        }
        other => other,
    }
}

fn pattern_matches(pattern: &Pattern, value: &FieldValue) -> bool {
    match (pattern, value) {
        (Pattern::Protocol(ranges), FieldValue::U8(v)) => ranges.iter().any(|(lo, hi)| (*lo..=*hi).contains(v)),
        (Pattern::Ports(ranges), FieldValue::U16(v)) => ranges.iter().any(|(lo, hi)| (*lo..=*hi).contains(v)),
        (Pattern::Ipv4Prefix(net), FieldValue::U32(v)) => net.contains(std::net::Ipv4Addr::from(*v)),
        (Pattern::Mac(want), FieldValue::Bytes(got)) => got.as_slice() == want.0.as_slice(),
        (Pattern::TcpFlags { mask, value: want }, FieldValue::U8(v)) => (v & mask) == (want & mask),
        _ => false,
    }
}

fn rule_matches(rule: &Rule, headers: &HeaderView) -> bool {
    for field in rule.key_fields() {
        let raw = match extract_raw(headers, field.ie) {
            Some(v) => v,
            None => return false,
        };
        if let Some(pattern) = &field.pattern {
            if !pattern_matches(pattern, &raw) {
                return false;
            }
        }
    }
    true
}

/// Extracts every field a rule names — key and aggregate alike — as
/// named `(IeKey, FieldValue)` pairs ready to feed a [`crate::hashtable::Hashtable`].
/// Key fields carry their modifier already applied, so a masked address
/// is stored (and later exported) at its masked width. Fields the
/// packet doesn't carry (e.g. a rule mixing IPv4 and IPv6 addresses) are
/// silently omitted rather than failing the whole rule.
pub fn collect_fields(rule: &Rule, headers: &HeaderView) -> Vec<(IeKey, FieldValue)> {
    rule.fields
        .iter()
        .filter_map(|field| {
            let raw = extract_raw(headers, field.ie)?;
            Some((field.ie, apply_modifier(raw, field.modifier)))
        })
        .collect()
}

/// Synthesizes the canonical flow-key byte layout for `packet` under
/// `rule`: read each key field, apply its modifier, concatenate in field
/// order (spec section 4.2, "Key determinism" property in section 8).
pub fn synthesize_key(rule: &Rule, headers: &HeaderView) -> Option<Vec<u8>> {
    let mut key = Vec::new();
    for field in rule.key_fields() {
        let raw = extract_raw(headers, field.ie)?;
        let transformed = apply_modifier(raw, field.modifier);
        key.extend_from_slice(&transformed.encode_be());
    }
    Some(key)
}

/// The decoded-record counterpart of [`Rule::matches`]/[`synthesize_key`]:
/// a Data Record arriving from the IPFIX or NetFlow v5 ingest path has no
/// packet headers to re-parse, only the field values the wire decoder
/// already produced (spec section 4.4, "the same dispatch-to-every-
/// matching-rule semantics apply regardless of which ingest produced the
/// record").
pub fn rule_matches_fields(rule: &Rule, fields: &HashMap<IeKey, FieldValue>) -> bool {
    for field in rule.key_fields() {
        let raw = match fields.get(&field.ie) {
            Some(v) => v,
            None => return false,
        };
        if let Some(pattern) = &field.pattern {
            if !pattern_matches(pattern, raw) {
                return false;
            }
        }
    }
    true
}

/// Field-map counterpart of [`synthesize_key`].
pub fn synthesize_key_from_fields(rule: &Rule, fields: &HashMap<IeKey, FieldValue>) -> Option<Vec<u8>> {
    let mut key = Vec::new();
    for field in rule.key_fields() {
        let raw = fields.get(&field.ie)?.clone();
        key.extend_from_slice(&apply_modifier(raw, field.modifier).encode_be());
    }
    Some(key)
}

/// Field-map counterpart of [`synthesize_reverse_key`].
pub fn synthesize_reverse_key_from_fields(rule: &Rule, fields: &HashMap<IeKey, FieldValue>) -> Option<Vec<u8>> {
    if !rule.biflow_aggregation {
        return None;
    }
    let mut key = Vec::new();
    for field in rule.key_fields() {
        let ie = biflow_partner(field.ie).unwrap_or(field.ie);
        let raw = fields.get(&ie)?.clone();
        key.extend_from_slice(&apply_modifier(raw, field.modifier).encode_be());
    }
    Some(key)
}

/// The IE a biflow rule swaps a given key field with when synthesizing
/// the reverse-direction key (spec section 4.2, "Biflow fold").
pub fn biflow_partner(ie: IeKey) -> Option<IeKey> {
    if ie.enterprise != 0 {
        return None;
    }
    use FieldType::*;
    let pairs: &[(FieldType, FieldType)] = &[
        (SourceIPv4Address, DestinationIPv4Address),
        (SourceIPv6Address, DestinationIPv6Address),
        (SourceTransportPort, DestinationTransportPort),
        (SourceMacAddress, DestinationMacAddress),
        (IngressInterface, EgressInterface),
    ];
    let this = FieldType::from_id(ie.id)?;
    for (a, b) in pairs {
        if *a as u16 == this as u16 {
            return Some(IeKey::standard(*b as u16));
        }
        if *b as u16 == this as u16 {
            return Some(IeKey::standard(*a as u16));
        }
    }
    None
}

/// Synthesizes the reverse-direction flow key: the forward key's bytes
/// with every swappable field replaced by its partner's observed value.
pub fn synthesize_reverse_key(rule: &Rule, headers: &HeaderView) -> Option<Vec<u8>> {
    if !rule.biflow_aggregation {
        return None;
    }
    let mut key = Vec::new();
    for field in rule.key_fields() {
        let ie = biflow_partner(field.ie).unwrap_or(field.ie);
        let raw = extract_raw(headers, ie)?;
        let transformed = apply_modifier(raw, field.modifier);
        key.extend_from_slice(&transformed.encode_be());
    }
    Some(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Packet;

    fn tcp_packet(src: [u8; 4], dst: [u8; 4], sport: u16, dport: u16) -> Packet {
        let mut buf = vec![0u8; 14 + 20 + 20];
        buf[12] = 0x08;
        buf[13] = 0x00;
        buf[14] = 0x45;
        buf[14 + 9] = 6;
        buf[14 + 12..14 + 16].copy_from_slice(&src);
        buf[14 + 16..14 + 20].copy_from_slice(&dst);
        let l4 = 34;
        buf[l4..l4 + 2].copy_from_slice(&sport.to_be_bytes());
        buf[l4 + 2..l4 + 4].copy_from_slice(&dport.to_be_bytes());
        Packet::new(0, buf)
    }

    fn simple_rule() -> Rule {
        Rule::build(
            256,
            false,
            vec![
                Field { ie: IeKey::standard(FieldType::SourceIPv4Address as u16), modifier: Modifier::Keep, pattern: None, semantic: Semantic::SourceDirectional },
                Field { ie: IeKey::standard(FieldType::DestinationIPv4Address as u16), modifier: Modifier::Keep, pattern: None, semantic: Semantic::DestinationDirectional },
                Field { ie: IeKey::standard(FieldType::SourceTransportPort as u16), modifier: Modifier::Keep, pattern: None, semantic: Semantic::SourceDirectional },
                Field { ie: IeKey::standard(FieldType::DestinationTransportPort as u16), modifier: Modifier::Keep, pattern: None, semantic: Semantic::DestinationDirectional },
                Field { ie: IeKey::standard(FieldType::ProtocolIdentifier as u16), modifier: Modifier::Keep, pattern: None, semantic: Semantic::Default },
                Field { ie: IeKey::standard(FieldType::OctetDeltaCount as u16), modifier: Modifier::Aggregate, pattern: None, semantic: Semantic::Default },
                Field { ie: IeKey::standard(FieldType::PacketDeltaCount as u16), modifier: Modifier::Aggregate, pattern: None, semantic: Semantic::Default },
            ],
        )
        .unwrap()
    }

    #[test]
    fn key_is_deterministic_for_identical_packets() {
        let rule = simple_rule();
        let p1 = tcp_packet([10, 0, 0, 1], [10, 0, 0, 2], 1000, 80);
        let p2 = tcp_packet([10, 0, 0, 1], [10, 0, 0, 2], 1000, 80);
        let k1 = synthesize_key(&rule, p1.headers().unwrap());
        let k2 = synthesize_key(&rule, p2.headers().unwrap());
        assert_eq!(k1, k2);
    }

    #[test]
    fn key_differs_for_different_ports() {
        let rule = simple_rule();
        let p1 = tcp_packet([10, 0, 0, 1], [10, 0, 0, 2], 1000, 80);
        let p2 = tcp_packet([10, 0, 0, 1], [10, 0, 0, 2], 1001, 80);
        let k1 = synthesize_key(&rule, p1.headers().unwrap());
        let k2 = synthesize_key(&rule, p2.headers().unwrap());
        assert_ne!(k1, k2);
    }

    #[test]
    fn reverse_key_swaps_source_and_destination() {
        let rule = Rule::build(
            256,
            true,
            vec![
                Field { ie: IeKey::standard(FieldType::SourceIPv4Address as u16), modifier: Modifier::Keep, pattern: None, semantic: Semantic::SourceDirectional },
                Field { ie: IeKey::standard(FieldType::DestinationIPv4Address as u16), modifier: Modifier::Keep, pattern: None, semantic: Semantic::DestinationDirectional },
            ],
        )
        .unwrap();
        let forward = tcp_packet([10, 0, 0, 1], [10, 0, 0, 2], 1, 2);
        let reverse = tcp_packet([10, 0, 0, 2], [10, 0, 0, 1], 1, 2);

        let fwd_key = synthesize_key(&rule, forward.headers().unwrap()).unwrap();
        let rev_key_of_forward = synthesize_reverse_key(&rule, forward.headers().unwrap()).unwrap();
        let fwd_key_of_reverse = synthesize_key(&rule, reverse.headers().unwrap()).unwrap();

        assert_eq!(rev_key_of_forward, fwd_key_of_reverse);
        assert_ne!(fwd_key, rev_key_of_forward);
    }

    #[test]
    fn biflow_rule_strips_patterns_instead_of_failing() {
        let rule = Rule::build(
            256,
            true,
            vec![Field {
                ie: IeKey::standard(FieldType::ProtocolIdentifier as u16),
                modifier: Modifier::Keep,
                pattern: Some(Pattern::Protocol(vec![(6, 6)])),
                semantic: Semantic::Default,
            }],
        )
        .unwrap();
        assert!(rule.fields[0].pattern.is_none());
    }

    #[test]
    fn empty_rule_is_a_config_error() {
        let err = Rule::build(256, false, vec![]);
        assert!(matches!(err, Err(ConfigError::EmptyRule(256))));
    }

    #[test]
    fn protocol_pattern_filters_non_matching_packets() {
        let rule = Rule::build(
            256,
            false,
            vec![Field {
                ie: IeKey::standard(FieldType::ProtocolIdentifier as u16),
                modifier: Modifier::Keep,
                pattern: Some(Pattern::Protocol(vec![(6, 6)])),
                semantic: Semantic::Default,
            }],
        )
        .unwrap();
        let tcp = tcp_packet([1, 2, 3, 4], [5, 6, 7, 8], 1, 2);
        let mut udp_bytes = tcp.bytes().to_vec();
        udp_bytes[14 + 9] = 17;
        let udp = Packet::new(0, udp_bytes);

        assert!(rule_matches(&rule, tcp.headers().unwrap()));
        assert!(!rule_matches(&rule, udp.headers().unwrap()));
    }
}
