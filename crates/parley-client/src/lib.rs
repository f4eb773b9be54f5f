//! Client
//!
//! Session manager for the parley signaling channel. A session joins a named
//! room over a persistent socket, tracks which peers are present, and relays
//! opaque payloads (offer/answer/ICE blobs for a higher-level
//! peer-connection layer) between named participants.
//!
//! # Architecture
//!
//! The core follows the Sans-IO, action-based pattern: [`Session`] receives
//! socket occurrences ([`SocketEvent`]), processes them through pure state
//! machine logic, and returns actions ([`SessionAction`]) for the caller to
//! execute: either a frame to write or an occurrence ([`SessionEvent`]) to
//! deliver. Membership lives in [`Roster`], which preserves participant
//! identity ([`User`]) across server snapshots.
//!
//! # Components
//!
//! - [`Session`]: state machine combining room assignment and roster
//!   readiness into an open session
//! - [`Roster`]: snapshot reconciliation with stable participant identity
//! - [`User`]: one endpoint, self or remote, with a latched leave
//!   notification
//!
//! # Transport (optional)
//!
//! With the `transport` feature (on by default), this crate also provides:
//! - [`transport::SocketHandle`]: driven WebSocket with keepalive handling
//! - [`transport::ConnectedSession`]: socket and session wired together

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
mod event;
mod roster;
mod session;
mod user;

#[cfg(feature = "transport")]
pub mod transport;

pub use error::SessionError;
pub use event::{RosterEvent, SessionAction, SessionEvent, SocketEvent};
pub use parley_proto::{ClientMessage, ProtocolError, ServerMessage};
pub use roster::Roster;
pub use session::{Session, SessionStatus};
pub use user::User;
