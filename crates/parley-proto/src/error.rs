//! Protocol error taxonomy.

use thiserror::Error;

/// Errors produced by the wire codec.
///
/// Decode failures are per-frame: the offending frame is dropped and the
/// connection stays open. Nothing in this enum is fatal to a session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Frame text was not valid JSON.
    #[error("malformed frame: {reason}")]
    Malformed {
        /// Parser failure description.
        reason: String,
    },

    /// Frame carried a recognized `type` tag but its payload did not match
    /// the schema for that type.
    #[error("invalid `{kind}` payload: {reason}")]
    InvalidPayload {
        /// Envelope `type` tag of the offending frame.
        kind: String,
        /// Schema mismatch description.
        reason: String,
    },

    /// Outbound message could not be serialized.
    #[error("failed to encode `{kind}` message: {reason}")]
    Encode {
        /// Envelope `type` tag of the message being encoded.
        kind: String,
        /// Serializer failure description.
        reason: String,
    },
}
