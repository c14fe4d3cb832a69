use thiserror::Error;

/// Errors raised while sanitizing a decoded packet field or parsing a packet body.
///
/// These map onto the three Python exception kinds the original protocol
/// raises (`TypeError`, `ValueError`, `KeyError`) plus the reserved-packet
/// case, which the original raises as `NotImplementedError`.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum PacketError {
    #[error("value should be {expected}, but is not: {found}")]
    Type { expected: &'static str, found: String },

    #[error("{0}")]
    Value(String),

    #[error("missing mandatory key: {0}")]
    Key(String),

    #[error("packet type is reserved and not implemented: {0}")]
    NotImplemented(&'static str),
}

impl PacketError {
    pub fn value(msg: impl Into<String>) -> Self {
        PacketError::Value(msg.into())
    }

    pub fn key(name: impl Into<String>) -> Self {
        PacketError::Key(name.into())
    }
}

/// Errors raised by the sequencer while matching a response to its request.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum SequencerError {
    #[error("unsolicited response: no outstanding request for req_id {req_id}")]
    Unsolicited { req_id: u32 },

    #[error("sequence number {req_id}: expected a {expected} packet, not {found}")]
    TypeMismatch {
        req_id: u32,
        expected: &'static str,
        found: &'static str,
    },

    #[error("non-consecutive file body: offset should be {expected}, not {actual}")]
    Continuity { expected: u64, actual: u64 },

    #[error("file size does not match: should be {expected}, found {actual}")]
    SizeMismatch { expected: u64, actual: u64 },
}
