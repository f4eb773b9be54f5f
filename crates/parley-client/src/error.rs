//! Session error taxonomy.

use parley_proto::ProtocolError;
use thiserror::Error;

use crate::session::SessionStatus;

/// Errors reported by a session.
///
/// Only [`SessionError::NotOpen`] is ever returned to a caller directly; the
/// other variants travel inside
/// [`SessionEvent::Error`](crate::SessionEvent::Error) and are never thrown.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// A query or send was invoked while the session was not open. Reported
    /// synchronously at the call site; session state is unaffected.
    #[error("session is not open (state: {state})")]
    NotOpen {
        /// State the session was in at the call site.
        state: SessionStatus,
    },

    /// A frame failed to decode. Per-frame and recoverable: the connection
    /// stays open and session state is unchanged.
    #[error(transparent)]
    Frame(#[from] ProtocolError),

    /// The underlying socket failed. Fatal: the session has transitioned to
    /// failed and processes no further events.
    #[error("transport failed: {reason}")]
    Transport {
        /// Socket failure description.
        reason: String,
    },
}
