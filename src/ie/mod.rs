//! Information Element registry.
//!
//! Grounded on the teacher's `flow::ipfix::FieldType` enum (itself a
//! transcription of <http://www.iana.org/assignments/ipfix/ipfix.xml>),
//! generalized per spec section 3: every `(id, enterpriseNumber)` pair
//! now also carries a canonical length and an [`AggregationPolicy`], and
//! the registry distinguishes enterprise-specific IEs (bit 15 of the
//! wire id set) from the standard IANA range.
//!
//! Built once at startup from [`registry()`] and treated as immutable
//! shared-read state afterwards, per the "mutable global IE registry"
//! Design Note: construct a single registry, never mutate it again.

mod field_type;

pub use field_type::FieldType;

use std::collections::HashMap;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::OnceLock;

/// The enterprise number Vermont-derived collectors use for private IEs
/// such as `frontPayload`; kept as a constant rather than hard-coded
/// magic numbers throughout the rule/hashtable code.
pub const PEN_VERMONT: u32 = 29305;

/// Private IE id for the front-payload capture, scoped under
/// [`PEN_VERMONT`]. A 4-byte length prefix precedes the captured bytes
/// on the wire (spec section 4.3, FRONT_PAYLOAD policy).
pub const IE_FRONT_PAYLOAD: u16 = 100;

/// Identifies an Information Element by `(id, enterpriseNumber)`, the key
/// the spec's data model uses throughout (section 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IeKey {
    pub id: u16,
    pub enterprise: u32,
}

impl IeKey {
    pub const fn standard(id: u16) -> Self {
        IeKey { id, enterprise: 0 }
    }

    pub const fn enterprise(id: u16, enterprise: u32) -> Self {
        IeKey { id, enterprise }
    }

    pub fn is_enterprise_specific(&self) -> bool {
        self.enterprise != 0
    }
}

/// Whether `key` is the RFC 5103 reverse counterpart of a standard IE
/// (same id, scoped under [`PEN_VERMONT`]) rather than a genuinely
/// distinct enterprise-specific IE such as `frontPayload`.
fn is_reverse_counterpart(key: IeKey) -> bool {
    key.enterprise == PEN_VERMONT && key.id != IE_FRONT_PAYLOAD
}

fn titlecase_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// The IE a biflow record stores a non-key field's value under once it
/// has been folded in from the reverse direction (spec section 3, "for
/// biflow records, forward and reverse counter fields are paired").
/// Follows the RFC 5103 convention of scoping the same IE id under the
/// Reverse Information Element PEN rather than minting a parallel set of
/// `reverseOctetDeltaCount`-style ids.
pub fn reverse_of(ie: IeKey) -> IeKey {
    if ie.enterprise == 0 {
        IeKey::enterprise(ie.id, PEN_VERMONT)
    } else {
        ie
    }
}

impl fmt::Display for IeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.enterprise == 0 {
            match FieldType::from_id(self.id) {
                Some(t) => write!(f, "{:?}", t),
                None => write!(f, "{}", self.id),
            }
        } else {
            write!(f, "{}@{}", self.id, self.enterprise)
        }
    }
}

/// How new observations of a non-key field combine with the value
/// already stored in a `FlowRecord` (spec section 4.3 table).
///
/// `Key` marks IEs that are ordinarily used as flow keys (addresses,
/// ports, protocol…): placing one in a `nonFlowKey` slot is legal but
/// surprising, so the rule loader logs a warning rather than refusing
/// to start (matching `AggregatorBaseCfg::readNonFlowKeyRule`'s texture).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationPolicy {
    Key,
    Sum,
    Min,
    Max,
    Or,
    FirstSeen,
    LastSeen,
    FrontPayload,
}

impl AggregationPolicy {
    /// Whether `BaseHashtable::isToBeAggregated` would consider this
    /// policy an actual aggregation (as opposed to a flow-key passthrough).
    pub fn is_aggregate(self) -> bool {
        !matches!(self, AggregationPolicy::Key)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IeSpec {
    pub key: IeKey,
    pub name: &'static str,
    /// Canonical (template-declared) length in octets, or `None` for
    /// variable-length IEs (wire length 0xFFFF).
    pub length: Option<u16>,
    pub policy: AggregationPolicy,
}

pub struct Registry {
    by_key: HashMap<IeKey, IeSpec>,
}

impl Registry {
    pub fn lookup(&self, key: IeKey) -> Option<&IeSpec> {
        self.by_key.get(&key)
    }

    pub fn policy(&self, key: IeKey) -> AggregationPolicy {
        if let Some(spec) = self.lookup(key) {
            return spec.policy;
        }
        if is_reverse_counterpart(key) {
            return self.policy(IeKey::standard(key.id));
        }
        AggregationPolicy::Key
    }

    pub fn name(&self, key: IeKey) -> String {
        if let Some(spec) = self.lookup(key) {
            return spec.name.to_string();
        }
        if is_reverse_counterpart(key) {
            return format!("reverse{}", titlecase_first(&self.name(IeKey::standard(key.id))));
        }
        key.to_string()
    }

    /// Resolves a textual `ieName` from a config file back to its key
    /// (spec section 6, field descriptors accept `ieName` or `ieId`).
    pub fn find_by_name(&self, name: &str) -> Option<IeKey> {
        self.by_key.values().find(|spec| spec.name == name).map(|spec| spec.key)
    }
}

macro_rules! ie {
    ($map:expr, $id:expr, $name:expr, $len:expr, $policy:expr) => {
        $map.insert(
            IeKey::standard($id),
            IeSpec { key: IeKey::standard($id), name: $name, length: $len, policy: $policy },
        );
    };
}

fn build_registry() -> Registry {
    use AggregationPolicy::*;
    let mut by_key = HashMap::new();

    // Flow-key-shaped IEs: default policy, overwritten only if aggregated
    // against operator intent (rule loader warns, doesn't refuse).
    ie!(by_key, FieldType::SourceIPv4Address as u16, "sourceIPv4Address", Some(4), Key);
    ie!(by_key, FieldType::DestinationIPv4Address as u16, "destinationIPv4Address", Some(4), Key);
    ie!(by_key, FieldType::SourceIPv6Address as u16, "sourceIPv6Address", Some(16), Key);
    ie!(by_key, FieldType::DestinationIPv6Address as u16, "destinationIPv6Address", Some(16), Key);
    ie!(by_key, FieldType::SourceTransportPort as u16, "sourceTransportPort", Some(2), Key);
    ie!(by_key, FieldType::DestinationTransportPort as u16, "destinationTransportPort", Some(2), Key);
    ie!(by_key, FieldType::ProtocolIdentifier as u16, "protocolIdentifier", Some(1), Key);
    ie!(by_key, FieldType::SourceMacAddress as u16, "sourceMacAddress", Some(6), Key);
    ie!(by_key, FieldType::DestinationMacAddress as u16, "destinationMacAddress", Some(6), Key);
    ie!(by_key, FieldType::VlanId as u16, "vlanId", Some(2), Key);
    ie!(by_key, FieldType::FlowDirection as u16, "flowDirection", Some(1), Key);
    ie!(by_key, FieldType::SourceIPv4PrefixLength as u16, "sourceIPv4PrefixLength", Some(1), Key);
    ie!(by_key, FieldType::DestinationIPv4PrefixLength as u16, "destinationIPv4PrefixLength", Some(1), Key);
    ie!(by_key, FieldType::IngressInterface as u16, "ingressInterface", Some(4), Key);
    ie!(by_key, FieldType::EgressInterface as u16, "egressInterface", Some(4), Key);

    // Aggregated counters.
    ie!(by_key, FieldType::OctetDeltaCount as u16, "octetDeltaCount", Some(8), Sum);
    ie!(by_key, FieldType::PacketDeltaCount as u16, "packetDeltaCount", Some(8), Sum);
    ie!(by_key, FieldType::OctetTotalCount as u16, "octetTotalCount", Some(8), Sum);
    ie!(by_key, FieldType::PacketTotalCount as u16, "packetTotalCount", Some(8), Sum);
    ie!(by_key, FieldType::DroppedOctetDeltaCount as u16, "droppedOctetDeltaCount", Some(8), Sum);
    ie!(by_key, FieldType::DroppedPacketDeltaCount as u16, "droppedPacketDeltaCount", Some(8), Sum);
    ie!(by_key, FieldType::InitiatorOctets as u16, "initiatorOctets", Some(8), Sum);
    ie!(by_key, FieldType::ResponderOctets as u16, "responderOctets", Some(8), Sum);

    ie!(by_key, FieldType::MSinimumTTL as u16, "minimumTTL", Some(1), Min);
    ie!(by_key, FieldType::MSaximumTTL as u16, "maximumTTL", Some(1), Max);
    ie!(by_key, FieldType::FlowStartSeconds as u16, "flowStartSeconds", Some(4), Min);
    ie!(by_key, FieldType::FlowEndSeconds as u16, "flowEndSeconds", Some(4), Max);
    ie!(by_key, FieldType::FlowStartMilliseconds as u16, "flowStartMilliseconds", Some(8), Min);
    ie!(by_key, FieldType::FlowEndMilliseconds as u16, "flowEndMilliseconds", Some(8), Max);
    ie!(by_key, FieldType::MinimumIpTotalLength as u16, "minimumIpTotalLength", Some(4), Min);
    ie!(by_key, FieldType::MaximumIpTotalLength as u16, "maximumIpTotalLength", Some(4), Max);

    ie!(by_key, FieldType::TcpControlBits as u16, "tcpControlBits", Some(1), Or);

    ie!(by_key, FieldType::FlowEndReason as u16, "flowEndReason", Some(1), LastSeen);
    ie!(by_key, FieldType::BiflowDirection as u16, "biflowDirection", Some(1), LastSeen);
    ie!(by_key, FieldType::IPClassOfService as u16, "ipClassOfService", Some(1), FirstSeen);

    by_key.insert(
        IeKey::enterprise(IE_FRONT_PAYLOAD, PEN_VERMONT),
        IeSpec { key: IeKey::enterprise(IE_FRONT_PAYLOAD, PEN_VERMONT), name: "frontPayload", length: None, policy: FrontPayload },
    );

    Registry { by_key }
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(build_registry)
}

/// A decoded field value, shared between the IPFIX/NetFlow wire decoders
/// and the packet-header field extractor (spec section 4.2/4.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    U128(u128),
    Bytes(Vec<u8>),
}

impl FieldValue {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            FieldValue::U8(v) => Some(*v as u64),
            FieldValue::U16(v) => Some(*v as u64),
            FieldValue::U32(v) => Some(*v as u64),
            FieldValue::U64(v) => Some(*v),
            FieldValue::U128(_) | FieldValue::Bytes(_) => None,
        }
    }

    pub fn encode_be(&self) -> Vec<u8> {
        match self {
            FieldValue::U8(v) => v.to_be_bytes().to_vec(),
            FieldValue::U16(v) => v.to_be_bytes().to_vec(),
            FieldValue::U32(v) => v.to_be_bytes().to_vec(),
            FieldValue::U64(v) => v.to_be_bytes().to_vec(),
            FieldValue::U128(v) => v.to_be_bytes().to_vec(),
            FieldValue::Bytes(v) => v.clone(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            FieldValue::U8(_) => 1,
            FieldValue::U16(_) => 2,
            FieldValue::U32(_) => 4,
            FieldValue::U64(_) => 8,
            FieldValue::U128(_) => 16,
            FieldValue::Bytes(v) => v.len(),
        }
    }

    pub fn from_be_bytes(buf: &[u8]) -> Self {
        match buf.len() {
            1 => FieldValue::U8(buf[0]),
            2 => FieldValue::U16(u16::from_be_bytes(buf.try_into().unwrap())),
            4 => FieldValue::U32(u32::from_be_bytes(buf.try_into().unwrap())),
            8 => FieldValue::U64(u64::from_be_bytes(buf.try_into().unwrap())),
            16 => FieldValue::U128(u128::from_be_bytes(buf.try_into().unwrap())),
            _ => FieldValue::Bytes(buf.to_vec()),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::U8(v) => v.fmt(f),
            FieldValue::U16(v) => v.fmt(f),
            FieldValue::U32(v) => v.fmt(f),
            FieldValue::U64(v) => v.fmt(f),
            FieldValue::U128(v) => v.fmt(f),
            FieldValue::Bytes(v) => write!(f, "{:02x?}", v),
        }
    }
}

pub fn format_ipv4(value: &FieldValue) -> Option<Ipv4Addr> {
    if let FieldValue::U32(v) = value {
        Some(Ipv4Addr::from(*v))
    } else {
        None
    }
}

pub fn format_ipv6(value: &FieldValue) -> Option<Ipv6Addr> {
    if let FieldValue::U128(v) = value {
        Some(Ipv6Addr::from(*v))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_classifies_counters_as_sum() {
        let reg = registry();
        assert_eq!(reg.policy(IeKey::standard(FieldType::OctetDeltaCount as u16)), AggregationPolicy::Sum);
        assert_eq!(reg.policy(IeKey::standard(FieldType::PacketDeltaCount as u16)), AggregationPolicy::Sum);
    }

    #[test]
    fn registry_classifies_min_max() {
        let reg = registry();
        assert_eq!(reg.policy(IeKey::standard(FieldType::MSinimumTTL as u16)), AggregationPolicy::Min);
        assert_eq!(reg.policy(IeKey::standard(FieldType::MSaximumTTL as u16)), AggregationPolicy::Max);
    }

    #[test]
    fn registry_classifies_addresses_as_key() {
        let reg = registry();
        assert_eq!(reg.policy(IeKey::standard(FieldType::SourceIPv4Address as u16)), AggregationPolicy::Key);
    }

    #[test]
    fn unregistered_ie_defaults_to_key() {
        let reg = registry();
        assert_eq!(reg.policy(IeKey::standard(60000)), AggregationPolicy::Key);
    }

    #[test]
    fn reverse_counterpart_inherits_base_policy_and_name() {
        let reg = registry();
        let reverse_octets = reverse_of(IeKey::standard(FieldType::OctetDeltaCount as u16));
        assert_eq!(reg.policy(reverse_octets), AggregationPolicy::Sum);
        assert_eq!(reg.name(reverse_octets), "reverseOctetDeltaCount");
    }

    #[test]
    fn front_payload_is_enterprise_scoped() {
        let reg = registry();
        let spec = reg.lookup(IeKey::enterprise(IE_FRONT_PAYLOAD, PEN_VERMONT)).unwrap();
        assert_eq!(spec.policy, AggregationPolicy::FrontPayload);
        assert!(spec.length.is_none());
    }
}
