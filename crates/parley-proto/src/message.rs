//! Typed protocol messages and the `{type, data}` envelope codec.
//!
//! The server pushes [`ServerMessage`]s; the client writes
//! [`ClientMessage`]s. Decoding is tolerant of envelopes whose `type` tag is
//! not recognized: those frames are ignored without error, so the protocol
//! can grow server-side without breaking deployed clients.

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::error::ProtocolError;

/// Literal keepalive probe sent by the server.
///
/// Exchanged outside the envelope schema: a probe frame is answered with
/// [`KEEPALIVE_REPLY`] and never surfaces as a message.
pub const KEEPALIVE_PROBE: &str = "ping";

/// Literal keepalive reply expected by the server.
pub const KEEPALIVE_REPLY: &str = "pong";

/// Room assignment pushed once the server has placed this client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomAssigned {
    /// Identifier of the assigned room.
    pub id: String,
}

/// Complete membership snapshot for the room.
///
/// Snapshots are authoritative: the roster reconciles against `users` as a
/// whole rather than applying the `event` annotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsersSnapshot {
    /// Identifier the server uses for this client.
    pub me: String,
    /// Identifiers of every current member, this client included.
    pub users: Vec<String>,
    /// Membership change that triggered this snapshot, when the server
    /// includes it. Advisory only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<MembershipEvent>,
}

/// Membership change annotation attached to a [`UsersSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipEvent {
    /// Whether the annotated participant joined or left.
    #[serde(rename = "type")]
    pub kind: MembershipChange,
    /// Identifier of the participant the change concerns.
    pub user: String,
}

/// Direction of a membership change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipChange {
    /// Participant entered the room.
    Join,
    /// Participant left the room.
    Leave,
}

/// Opaque payload relayed from another participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalRelay {
    /// Identifier of the originating participant.
    pub sender: String,
    /// Identifiers the payload was addressed to.
    pub receivers: Vec<String>,
    /// Opaque payload text; the server never interprets it.
    pub data: String,
}

/// Request to join the room the socket was opened against.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequest {}

/// Opaque payload addressed to a set of participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalRequest {
    /// Identifiers to relay the payload to.
    pub receivers: Vec<String>,
    /// Opaque payload text.
    pub data: String,
}

/// Messages pushed by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Room assignment (`type: "room"`).
    Room(RoomAssigned),
    /// Membership snapshot (`type: "users"`).
    Users(UsersSnapshot),
    /// Relayed payload (`type: "signal"`).
    Signal(SignalRelay),
}

/// Messages written by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// Join request (`type: "join"`).
    Join(JoinRequest),
    /// Payload relay request (`type: "signal"`).
    Signal(SignalRequest),
}

/// Owned envelope used for decoding.
#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    data: serde_json::Value,
}

/// Borrowing envelope used for encoding.
#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    #[serde(rename = "type")]
    kind: &'a str,
    data: &'a T,
}

fn decode_payload<T: DeserializeOwned>(
    kind: &str,
    data: serde_json::Value,
) -> Result<T, ProtocolError> {
    serde_json::from_value(data).map_err(|e| ProtocolError::InvalidPayload {
        kind: kind.to_string(),
        reason: e.to_string(),
    })
}

fn encode_envelope<T: Serialize>(kind: &str, data: &T) -> Result<String, ProtocolError> {
    serde_json::to_string(&EnvelopeRef { kind, data }).map_err(|e| ProtocolError::Encode {
        kind: kind.to_string(),
        reason: e.to_string(),
    })
}

impl ServerMessage {
    /// Decode one inbound frame.
    ///
    /// Returns `Ok(None)` when the envelope parses but its `type` tag is not
    /// recognized; such frames are dropped without error.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::Malformed`] when `text` is not a JSON envelope
    /// - [`ProtocolError::InvalidPayload`] when a recognized `type` carries a
    ///   payload that does not match its schema
    pub fn decode(text: &str) -> Result<Option<Self>, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(text)
            .map_err(|e| ProtocolError::Malformed { reason: e.to_string() })?;

        let message = match envelope.kind.as_str() {
            "room" => Self::Room(decode_payload(&envelope.kind, envelope.data)?),
            "users" => Self::Users(decode_payload(&envelope.kind, envelope.data)?),
            "signal" => Self::Signal(decode_payload(&envelope.kind, envelope.data)?),
            _ => return Ok(None),
        };

        Ok(Some(message))
    }

    /// Encode into the wire envelope.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Encode`] when serialization fails.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        match self {
            Self::Room(data) => encode_envelope(self.kind(), data),
            Self::Users(data) => encode_envelope(self.kind(), data),
            Self::Signal(data) => encode_envelope(self.kind(), data),
        }
    }

    /// Envelope `type` tag for this message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Room(_) => "room",
            Self::Users(_) => "users",
            Self::Signal(_) => "signal",
        }
    }
}

impl ClientMessage {
    /// Decode one outbound frame (used by test peers acting as the server).
    ///
    /// Returns `Ok(None)` for envelopes with an unrecognized `type` tag.
    ///
    /// # Errors
    ///
    /// Same taxonomy as [`ServerMessage::decode`].
    pub fn decode(text: &str) -> Result<Option<Self>, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(text)
            .map_err(|e| ProtocolError::Malformed { reason: e.to_string() })?;

        let message = match envelope.kind.as_str() {
            "join" => Self::Join(decode_payload(&envelope.kind, envelope.data)?),
            "signal" => Self::Signal(decode_payload(&envelope.kind, envelope.data)?),
            _ => return Ok(None),
        };

        Ok(Some(message))
    }

    /// Encode into the wire envelope.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Encode`] when serialization fails.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        match self {
            Self::Join(data) => encode_envelope(self.kind(), data),
            Self::Signal(data) => encode_envelope(self.kind(), data),
        }
    }

    /// Envelope `type` tag for this message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Join(_) => "join",
            Self::Signal(_) => "signal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_room_assignment() {
        let message = ServerMessage::decode(r#"{"type":"room","data":{"id":"r1"}}"#).unwrap();
        assert_eq!(message, Some(ServerMessage::Room(RoomAssigned { id: "r1".into() })));
    }

    #[test]
    fn decode_users_snapshot_without_event() {
        let message =
            ServerMessage::decode(r#"{"type":"users","data":{"me":"u1","users":["u1","u2"]}}"#)
                .unwrap();

        let Some(ServerMessage::Users(snapshot)) = message else {
            panic!("expected users snapshot, got {message:?}");
        };
        assert_eq!(snapshot.me, "u1");
        assert_eq!(snapshot.users, vec!["u1".to_string(), "u2".to_string()]);
        assert_eq!(snapshot.event, None);
    }

    #[test]
    fn decode_users_snapshot_with_event() {
        let text = r#"{"type":"users","data":{"me":"u1","users":["u1","u2"],"event":{"type":"join","user":"u2"}}}"#;
        let message = ServerMessage::decode(text).unwrap();

        let Some(ServerMessage::Users(snapshot)) = message else {
            panic!("expected users snapshot, got {message:?}");
        };
        assert_eq!(
            snapshot.event,
            Some(MembershipEvent { kind: MembershipChange::Join, user: "u2".into() })
        );
    }

    #[test]
    fn decode_signal_relay() {
        let text = r#"{"type":"signal","data":{"sender":"u2","receivers":["u1"],"data":"hi"}}"#;
        let message = ServerMessage::decode(text).unwrap();

        assert_eq!(
            message,
            Some(ServerMessage::Signal(SignalRelay {
                sender: "u2".into(),
                receivers: vec!["u1".into()],
                data: "hi".into(),
            }))
        );
    }

    #[test]
    fn unknown_type_is_ignored() {
        let message = ServerMessage::decode(r#"{"type":"presence","data":{"x":1}}"#).unwrap();
        assert_eq!(message, None);
    }

    #[test]
    fn non_json_is_malformed() {
        let err = ServerMessage::decode("not json").unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed { .. }));
    }

    #[test]
    fn keepalive_probe_is_not_an_envelope() {
        // "ping" must be filtered before decode; fed through anyway it is a
        // malformed frame, not a message.
        let err = ServerMessage::decode(KEEPALIVE_PROBE).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed { .. }));
    }

    #[test]
    fn known_type_with_bad_payload_is_invalid() {
        let err = ServerMessage::decode(r#"{"type":"room","data":{"id":42}}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidPayload { kind, .. } if kind == "room"));
    }

    #[test]
    fn encode_join_request() {
        let text = ClientMessage::Join(JoinRequest {}).encode().unwrap();
        assert_eq!(text, r#"{"type":"join","data":{}}"#);
    }

    #[test]
    fn encode_signal_request() {
        let message = ClientMessage::Signal(SignalRequest {
            receivers: vec!["u2".into()],
            data: "offer".into(),
        });

        let text = message.encode().unwrap();
        assert_eq!(text, r#"{"type":"signal","data":{"receivers":["u2"],"data":"offer"}}"#);
    }

    #[test]
    fn client_decode_mirrors_encode() {
        let original = ClientMessage::Signal(SignalRequest {
            receivers: vec!["u1".into(), "u3".into()],
            data: "candidate".into(),
        });

        let decoded = ClientMessage::decode(&original.encode().unwrap()).unwrap();
        assert_eq!(decoded, Some(original));
    }
}
