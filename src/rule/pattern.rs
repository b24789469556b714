//! Match-pattern parsing for flow-key fields (spec section 4.2).
//!
//! Grounded on original_source's `AggregatorBaseCfg::readFlowKeyRule`,
//! which accepts a handful of textual pattern syntaxes per IE type:
//! a single protocol number or `lo-hi` range, a comma-separated list of
//! port numbers/ranges, a dotted-quad IPv4 address with an optional
//! `/prefix`, a colon-separated MAC address, and a `mask/value` pair of
//! hex bytes for TCP flags. The original logs and nulls the field on a
//! parse failure; this implementation returns a `ConfigError` instead
//! (see the module doc on [`super`]).

use crate::error::ConfigError;
use ipnetwork::Ipv4Network;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacBytes(pub [u8; 6]);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    Protocol(Vec<(u8, u8)>),
    Ports(Vec<(u16, u16)>),
    Ipv4Prefix(Ipv4Network),
    Mac(MacBytes),
    TcpFlags { mask: u8, value: u8 },
}

fn bad(template_id: u16, kind: &'static str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::BadPattern { template_id, kind, value: value.to_string(), reason: reason.into() }
}

/// Parses `"6"` or `"6-17"` or a comma-separated mix of both into a list
/// of inclusive ranges.
pub fn parse_protocol(template_id: u16, text: &str) -> Result<Pattern, ConfigError> {
    let ranges = parse_range_list::<u8>(text).map_err(|e| bad(template_id, "protocol", text, e))?;
    if ranges.is_empty() {
        return Err(bad(template_id, "protocol", text, "empty pattern"));
    }
    Ok(Pattern::Protocol(ranges))
}

/// Parses `"80"`, `"1024-2048"`, or `"80,443,8000-8999"` into port ranges.
pub fn parse_ports(template_id: u16, text: &str) -> Result<Pattern, ConfigError> {
    let ranges = parse_range_list::<u16>(text).map_err(|e| bad(template_id, "port", text, e))?;
    if ranges.is_empty() {
        return Err(bad(template_id, "port", text, "empty pattern"));
    }
    Ok(Pattern::Ports(ranges))
}

fn parse_range_list<T>(text: &str) -> Result<Vec<(T, T)>, String>
where
    T: std::str::FromStr + Copy,
    T::Err: std::fmt::Display,
{
    text.split(',')
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .map(|part| match part.split_once('-') {
            Some((lo, hi)) => {
                let lo: T = lo.trim().parse().map_err(|e: T::Err| e.to_string())?;
                let hi: T = hi.trim().parse().map_err(|e: T::Err| e.to_string())?;
                Ok((lo, hi))
            }
            None => {
                let v: T = part.parse().map_err(|e: T::Err| e.to_string())?;
                Ok((v, v))
            }
        })
        .collect()
}

/// Parses `"10.0.0.0/8"` (a bare address implies a /32 host match).
pub fn parse_ipv4_prefix(template_id: u16, text: &str) -> Result<Pattern, ConfigError> {
    let with_prefix = if text.contains('/') { text.trim().to_string() } else { format!("{}/32", text.trim()) };
    let network: Ipv4Network = with_prefix.parse().map_err(|_| bad(template_id, "ipv4", text, "not a dotted-quad address with optional /prefix"))?;
    Ok(Pattern::Ipv4Prefix(network))
}

/// Parses a colon-separated MAC address, `"aa:bb:cc:dd:ee:ff"`.
pub fn parse_mac(template_id: u16, text: &str) -> Result<Pattern, ConfigError> {
    let parts: Vec<&str> = text.split(':').collect();
    if parts.len() != 6 {
        return Err(bad(template_id, "mac", text, "expected 6 colon-separated hex octets"));
    }
    let mut bytes = [0u8; 6];
    for (i, p) in parts.iter().enumerate() {
        bytes[i] = u8::from_str_radix(p, 16).map_err(|_| bad(template_id, "mac", text, format!("{} is not a hex octet", p)))?;
    }
    Ok(Pattern::Mac(MacBytes(bytes)))
}

/// Parses `"mask/value"` hex bytes for a masked TCP-flags equality test,
/// e.g. `"12/02"` matches SYN set and PSH clear, ignoring the rest.
pub fn parse_tcp_flags(template_id: u16, text: &str) -> Result<Pattern, ConfigError> {
    let (mask_s, value_s) = text.split_once('/').ok_or_else(|| bad(template_id, "tcpflags", text, "expected mask/value"))?;
    let mask = u8::from_str_radix(mask_s.trim(), 16).map_err(|_| bad(template_id, "tcpflags", text, "mask is not a hex byte"))?;
    let value = u8::from_str_radix(value_s.trim(), 16).map_err(|_| bad(template_id, "tcpflags", text, "value is not a hex byte"))?;
    Ok(Pattern::TcpFlags { mask, value })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_single_and_range() {
        assert_eq!(parse_protocol(1, "6").unwrap(), Pattern::Protocol(vec![(6, 6)]));
        assert_eq!(parse_protocol(1, "1-17").unwrap(), Pattern::Protocol(vec![(1, 17)]));
    }

    #[test]
    fn ports_comma_separated_mixed() {
        assert_eq!(parse_ports(1, "80,443,8000-8999").unwrap(), Pattern::Ports(vec![(80, 80), (443, 443), (8000, 8999)]));
    }

    #[test]
    fn ipv4_prefix_defaults_to_host_match() {
        let net: Ipv4Network = "10.0.0.1/32".parse().unwrap();
        assert_eq!(parse_ipv4_prefix(1, "10.0.0.1").unwrap(), Pattern::Ipv4Prefix(net));
    }

    #[test]
    fn ipv4_prefix_rejects_out_of_range() {
        assert!(parse_ipv4_prefix(1, "10.0.0.0/33").is_err());
    }

    #[test]
    fn mac_requires_six_octets() {
        assert!(parse_mac(1, "aa:bb:cc").is_err());
        assert_eq!(parse_mac(1, "aa:bb:cc:dd:ee:ff").unwrap(), Pattern::Mac(MacBytes([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff])));
    }

    #[test]
    fn tcp_flags_masked_equality() {
        assert_eq!(parse_tcp_flags(1, "12/02").unwrap(), Pattern::TcpFlags { mask: 0x12, value: 0x02 });
    }

    #[test]
    fn bad_patterns_produce_config_error_not_silent_failure() {
        assert!(matches!(parse_protocol(1, "not-a-number"), Err(ConfigError::BadPattern { .. })));
        assert!(matches!(parse_mac(1, "not-a-mac"), Err(ConfigError::BadPattern { .. })));
    }
}
