//! Typed error surface for the aggregation pipeline.
//!
//! Every stage in the pipeline (config loading, wire parsing, capture,
//! record allocation, transport) reports through one of these variants
//! instead of the ad hoc `Result<_, String>` the legacy NetFlow v5/IPFIX
//! readers used. See spec section 7 for the propagation rules: only
//! `ConfigError` and the fatal subset of `CaptureError`/`TransportError`
//! are allowed to end the process; everything else is counted and logged
//! by the stage that hit it.

use std::fmt;

/// Malformed rule, unknown IE, too many rules/fields, contradictory flags.
/// Fatal at startup.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("unknown information element {0}")]
    UnknownIe(String),

    #[error("rule field count {0} exceeds the configured sanity cap {1}")]
    TooManyFields(usize, usize),

    #[error("rule count {0} exceeds the configured sanity cap {1}")]
    TooManyRules(usize, usize),

    #[error("rule {template_id}: biflow aggregation and a match pattern cannot both be set on field {ie}")]
    BiflowWithPattern { template_id: u16, ie: String },

    #[error("rule {template_id}: failed to parse {kind} pattern {value:?}: {reason}")]
    BadPattern {
        template_id: u16,
        kind: &'static str,
        value: String,
        reason: String,
    },

    #[error("rule {0} has no fields")]
    EmptyRule(u16),

    #[error("pollInterval ({poll_ms}ms) must be <= min(activeTimeout, inactiveTimeout)/2 ({limit_ms}ms)")]
    PollIntervalTooLarge { poll_ms: u64, limit_ms: u64 },

    #[error("hashtableBits {0} out of the supported range 1..=30")]
    InvalidHashtableBits(u8),

    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

/// Malformed IPFIX/NetFlow bytes, or a DataSet referencing an unknown
/// template past the buffering window. Non-fatal: the offending message
/// is dropped and a counter is incremented.
#[derive(thiserror::Error, Debug, PartialEq, Eq, Clone)]
pub enum ProtocolError {
    #[error("short buffer: needed at least {needed} bytes but got {got}")]
    ShortBuffer { needed: usize, got: usize },

    #[error("unsupported message version {0}")]
    UnsupportedVersion(u16),

    #[error("unknown information element id {0}")]
    UnknownFieldType(u16),

    #[error("invalid set id {0}")]
    InvalidSetId(u16),

    #[error("ipfix header length {header} does not match the received datagram size {received}")]
    LengthMismatch { header: usize, received: usize },

    #[error("data set references unknown template {template_id} for observation domain {domain_id}")]
    UnknownTemplate { domain_id: u32, template_id: u16 },

    #[error("record count mismatch: header announced {announced} but buffer holds {actual}")]
    RecordCountMismatch { announced: usize, actual: usize },
}

/// The capture device was lost; the Observer thread must exit and the
/// pipeline enters shutdown.
#[derive(thiserror::Error, Debug)]
pub enum CaptureError {
    #[error("failed to open capture interface {iface}: {reason}")]
    OpenFailed { iface: String, reason: String },

    #[error("capture device lost: {0}")]
    DeviceLost(String),
}

/// Allocation failure during frame copy or record creation.
#[derive(thiserror::Error, Debug, PartialEq, Eq, Clone, Copy)]
pub enum ResourceError {
    #[error("failed to allocate a packet buffer of {0} bytes")]
    FrameAllocation(usize),

    #[error("failed to allocate a flow record")]
    RecordAllocation,
}

/// Transient or persistent failure writing to the export transport.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("transient write failure: {0}")]
    Transient(String),

    #[error("persistent write failure, giving up after {attempts} attempts: {reason}")]
    Persistent { attempts: u32, reason: String },
}

impl fmt::Display for ProtocolErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (from {})", self.error, self.source)
    }
}

/// Wraps a `ProtocolError` with the peer it came from, so the listener
/// thread can log a single, useful line without re-deriving context.
#[derive(Debug, Clone)]
pub struct ProtocolErrorContext {
    pub error: ProtocolError,
    pub source: std::net::SocketAddr,
}
