//! Socket, session, and roster event vocabularies.
//!
//! Three fixed sets of occurrences, leaves first:
//! - [`RosterEvent`]: membership changes returned by roster reconciliation
//! - [`SocketEvent`]: what the transport adapter feeds into the session
//! - [`SessionEvent`]: what the session emits to its subscribers, wrapped in
//!   [`SessionAction`] next to the frames the caller must write
//!
//! Delivery is synchronous and in order: events come back as values from the
//! mutating call that produced them, so no observer ever sees a half-applied
//! transition.

use std::sync::Arc;

use parley_proto::{ClientMessage, ProtocolError, ServerMessage};

use crate::{error::SessionError, user::User};

/// Occurrences surfaced by the transport adapter.
#[derive(Debug, Clone)]
pub enum SocketEvent {
    /// Socket finished its handshake and is ready to carry frames.
    Opened,

    /// One validated protocol message.
    Frame(ServerMessage),

    /// One frame failed to decode. Per-frame and recoverable: the
    /// connection stays up and the frame is dropped.
    FrameError(ProtocolError),

    /// The socket reported a fatal error. No further frames follow.
    Failed {
        /// Transport failure description.
        reason: String,
    },

    /// The socket closed. No further frames follow.
    Closed,
}

/// Instructions returned by [`Session::handle`](crate::Session::handle) for
/// the caller to execute, in order.
#[derive(Debug, Clone)]
pub enum SessionAction {
    /// Write this message to the socket.
    Send(ClientMessage),

    /// Deliver this occurrence to the session's subscribers.
    Emit(SessionEvent),
}

/// Occurrences a session emits.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Both the room assignment and the first membership snapshot have
    /// arrived; the session is open. Fires at most once.
    Opened {
        /// Identifier of the joined room.
        room_id: String,
    },

    /// A participant entered the roster.
    UserJoined(Arc<User>),

    /// A participant left the roster. Its own leave notification has
    /// already fired.
    UserLeft(Arc<User>),

    /// A relayed payload addressed to this client arrived.
    Message {
        /// Resolved originating participant.
        sender: Arc<User>,
        /// Resolved participants the payload was addressed to.
        receivers: Vec<Arc<User>>,
        /// Opaque payload text.
        payload: String,
    },

    /// A failure was observed. Frame errors leave the session state
    /// untouched; transport errors have already moved it to failed.
    Error(SessionError),

    /// The socket closed and the session is terminally closed.
    Closed,
}

/// Membership changes produced by roster reconciliation.
#[derive(Debug, Clone)]
pub enum RosterEvent {
    /// The participant was inserted into the roster.
    Joined(Arc<User>),

    /// The participant was removed from the roster.
    Left(Arc<User>),
}
