//! Wire protocol for the parley signaling channel.
//!
//! Every structured frame on the wire is UTF-8 text containing one JSON
//! envelope of the form `{ "type": <tag>, "data": <payload> }`. This crate
//! defines the typed messages behind those envelopes ([`ServerMessage`]
//! inbound, [`ClientMessage`] outbound) and the codec between them.
//!
//! Keepalive frames are the literal texts [`KEEPALIVE_PROBE`] and
//! [`KEEPALIVE_REPLY`]; they live outside the envelope schema and never
//! decode to a message.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
mod message;

pub use error::ProtocolError;
pub use message::{
    ClientMessage, JoinRequest, KEEPALIVE_PROBE, KEEPALIVE_REPLY, MembershipChange,
    MembershipEvent, RoomAssigned, ServerMessage, SignalRelay, SignalRequest, UsersSnapshot,
};
