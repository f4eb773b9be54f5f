//! WebSocket transport for the session.
//!
//! Owns the socket I/O: one spawned driver task reads frames, answers
//! keepalive probes, decodes envelopes, and relays everything else as
//! [`SocketEvent`]s; outbound messages and the close request travel through
//! a command channel. Protocol logic stays in the sans-io
//! [`Session`]; [`ConnectedSession`] wires the two together.

use std::{collections::VecDeque, sync::Arc};

use futures_util::{SinkExt, StreamExt};
use parley_proto::{
    ClientMessage, KEEPALIVE_PROBE, KEEPALIVE_REPLY, ProtocolError, ServerMessage,
};
use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
};
use tokio_tungstenite::{WebSocketStream, connect_async, tungstenite::Message};

use crate::{
    error::SessionError,
    event::{SessionAction, SessionEvent, SocketEvent},
    session::{Session, SessionStatus},
    user::User,
};

/// Default signaling server host.
pub const DEFAULT_SERVER: &str = "signal.parley.dev";

/// Socket construction overrides. Purely configuration, no logic.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// Server host (and optional port) to connect to.
    pub server: String,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self { server: DEFAULT_SERVER.to_string() }
    }
}

impl SocketConfig {
    /// Connection URL for an optional room id.
    ///
    /// The room id becomes the sole path segment; without one the path is
    /// empty and the server assigns a fresh room.
    pub fn url(&self, room: Option<&str>) -> String {
        format!("wss://{}/{}", self.server, room.unwrap_or(""))
    }
}

/// Transport errors reported to the `connect` caller.
///
/// Everything after connection establishment is reported through
/// [`SocketEvent`]s instead.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection could not be established.
    #[error("connection failed: {reason}")]
    Connect {
        /// Handshake failure description.
        reason: String,
    },

    /// The driver task was already torn down when a frame was written.
    #[error("socket closed")]
    SocketClosed,
}

#[derive(Debug)]
enum SocketCommand {
    Frame(ClientMessage),
    Close,
}

/// Handle to a driven socket.
///
/// Frames go out through [`SocketHandle::send`]; occurrences come back from
/// [`SocketHandle::recv`]. Dropping the handle tears the driver task down.
#[derive(Debug)]
pub struct SocketHandle {
    commands: mpsc::Sender<SocketCommand>,
    events: mpsc::Receiver<SocketEvent>,
}

impl SocketHandle {
    /// Connect to the configured server and start the driver task.
    ///
    /// # Errors
    ///
    /// [`TransportError::Connect`] when the WebSocket handshake fails.
    pub async fn connect(
        room: Option<&str>,
        config: &SocketConfig,
    ) -> Result<Self, TransportError> {
        let url = config.url(room);
        let (stream, _) = connect_async(&url)
            .await
            .map_err(|e| TransportError::Connect { reason: e.to_string() })?;

        Ok(Self::from_stream(stream))
    }

    /// Drive an already-established WebSocket stream.
    ///
    /// This is the injection point for alternate socket constructors: tests
    /// hand in an in-memory duplex stream instead of a TCP connection.
    pub fn from_stream<S>(stream: WebSocketStream<S>) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (commands, command_source) = mpsc::channel(32);
        let (event_sink, events) = mpsc::channel(32);

        drop(tokio::spawn(drive(stream, command_source, event_sink)));

        Self { commands, events }
    }

    /// Write one protocol message to the socket.
    ///
    /// # Errors
    ///
    /// [`TransportError::SocketClosed`] when the driver has terminated.
    pub async fn send(&self, message: ClientMessage) -> Result<(), TransportError> {
        self.commands
            .send(SocketCommand::Frame(message))
            .await
            .map_err(|_| TransportError::SocketClosed)
    }

    /// Start the closing handshake. Idempotent: closing an already-closed
    /// socket is a no-op. The resulting [`SocketEvent::Closed`] is what
    /// drives the session transition.
    pub async fn close(&self) {
        let _ = self.commands.send(SocketCommand::Close).await;
    }

    /// Next socket occurrence. `None` once the driver has terminated and
    /// all buffered occurrences were drained.
    pub async fn recv(&mut self) -> Option<SocketEvent> {
        self.events.recv().await
    }
}

/// Classification of one raw inbound text frame.
enum Inbound {
    /// Keepalive probe: answer with the reply literal, raise nothing.
    Keepalive,
    /// Validated protocol message.
    Frame(ServerMessage),
    /// Unrecognized `type` tag: dropped without error.
    Ignored,
    /// Undecodable frame: recoverable, surfaced as an event.
    Invalid(ProtocolError),
}

fn classify(text: &str) -> Inbound {
    if text == KEEPALIVE_PROBE {
        return Inbound::Keepalive;
    }

    match ServerMessage::decode(text) {
        Ok(Some(message)) => Inbound::Frame(message),
        Ok(None) => Inbound::Ignored,
        Err(error) => Inbound::Invalid(error),
    }
}

/// Run the socket, bridging between the channels and the WebSocket.
async fn drive<S>(
    stream: WebSocketStream<S>,
    mut commands: mpsc::Receiver<SocketCommand>,
    events: mpsc::Sender<SocketEvent>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut sink, mut source) = stream.split();

    // The WebSocket handshake has completed by the time the stream exists.
    if events.send(SocketEvent::Opened).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(SocketCommand::Frame(message)) => {
                    let text = match message.encode() {
                        Ok(text) => text,
                        Err(error) => {
                            tracing::warn!(%error, "dropping unencodable outbound message");
                            continue;
                        },
                    };
                    if let Err(error) = sink.send(Message::Text(text)).await {
                        let _ = events
                            .send(SocketEvent::Failed { reason: error.to_string() })
                            .await;
                        return;
                    }
                },
                Some(SocketCommand::Close) | None => {
                    if sink.send(Message::Close(None)).await.is_err() {
                        let _ = events.send(SocketEvent::Closed).await;
                        return;
                    }
                    break;
                },
            },
            frame = source.next() => {
                if !relay_frame(frame, &mut sink, &events).await {
                    return;
                }
            },
        }
    }

    // Half-closed: drain until the server acknowledges the close.
    while let Some(frame) = source.next().await {
        match frame {
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {},
        }
    }
    let _ = events.send(SocketEvent::Closed).await;
}

/// Relay one inbound frame. Returns `false` when the driver must stop.
async fn relay_frame<W>(
    frame: Option<Result<Message, tokio_tungstenite::tungstenite::Error>>,
    sink: &mut W,
    events: &mpsc::Sender<SocketEvent>,
) -> bool
where
    W: futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    match frame {
        Some(Ok(Message::Text(text))) => match classify(&text) {
            Inbound::Keepalive => {
                if let Err(error) = sink.send(Message::Text(KEEPALIVE_REPLY.to_string())).await {
                    let _ = events.send(SocketEvent::Failed { reason: error.to_string() }).await;
                    return false;
                }
                true
            },
            Inbound::Frame(message) => {
                tracing::debug!(kind = message.kind(), "inbound frame");
                events.send(SocketEvent::Frame(message)).await.is_ok()
            },
            Inbound::Ignored => {
                tracing::debug!("ignoring frame with unrecognized type");
                true
            },
            Inbound::Invalid(error) => {
                tracing::warn!(%error, "dropping undecodable frame");
                events.send(SocketEvent::FrameError(error)).await.is_ok()
            },
        },
        Some(Ok(Message::Close(_))) | None => {
            let _ = events.send(SocketEvent::Closed).await;
            false
        },
        // Binary, ping, and pong frames are not part of the protocol.
        Some(Ok(_)) => true,
        Some(Err(error)) => {
            let _ = events.send(SocketEvent::Failed { reason: error.to_string() }).await;
            false
        },
    }
}

/// A session wired to a live socket.
///
/// Owns the socket handle and the state machine, pumps socket occurrences
/// through [`Session::handle`], writes the resulting frames back to the
/// socket, and yields the emitted [`SessionEvent`]s. State and roster
/// queries reflect everything processed by the pump so far.
#[derive(Debug)]
pub struct ConnectedSession {
    socket: SocketHandle,
    session: Session,
    pending: VecDeque<SessionEvent>,
}

impl ConnectedSession {
    /// Connect to the configured server and wrap the socket in a session.
    ///
    /// # Errors
    ///
    /// [`TransportError::Connect`] when the WebSocket handshake fails.
    pub async fn connect(
        room: Option<&str>,
        config: &SocketConfig,
    ) -> Result<Self, TransportError> {
        Ok(Self::from_socket(SocketHandle::connect(room, config).await?))
    }

    /// Wrap an already-driven socket.
    pub fn from_socket(socket: SocketHandle) -> Self {
        Self { socket, session: Session::new(), pending: VecDeque::new() }
    }

    /// Next session occurrence. `None` once the socket driver has
    /// terminated and every buffered occurrence was delivered.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }

            let socket_event = self.socket.recv().await?;
            for action in self.session.handle(socket_event) {
                match action {
                    SessionAction::Send(message) => {
                        if let Err(error) = self.socket.send(message).await {
                            tracing::warn!(%error, "failed to write outbound message");
                        }
                    },
                    SessionAction::Emit(event) => self.pending.push_back(event),
                }
            }
        }
    }

    /// Current state discriminator. Never fails.
    pub fn state(&self) -> SessionStatus {
        self.session.state()
    }

    /// Identifier of the joined room. Requires the session to be open.
    pub fn room_id(&self) -> Result<&str, SessionError> {
        self.session.room_id()
    }

    /// Snapshot of the current members. Requires the session to be open.
    pub fn users(&self) -> Result<Vec<Arc<User>>, SessionError> {
        self.session.users()
    }

    /// The local participant. Requires the session to be open.
    pub fn me(&self) -> Result<Arc<User>, SessionError> {
        self.session.me()
    }

    /// Relay `payload`, defaulting to the full current membership when no
    /// explicit `receivers` are given.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotOpen`] before the session opens;
    /// [`SessionError::Transport`] when the socket is already torn down.
    pub async fn send(
        &self,
        payload: &str,
        receivers: Option<&[Arc<User>]>,
    ) -> Result<(), SessionError> {
        let message = self.session.send(payload, receivers)?;
        self.socket
            .send(message)
            .await
            .map_err(|e| SessionError::Transport { reason: e.to_string() })
    }

    /// Close the socket. Valid in any state and idempotent; the session
    /// transitions once the close completes and the closed occurrence is
    /// pumped.
    pub async fn close(&self) {
        self.socket.close().await;
    }

    /// The underlying sans-io state machine.
    pub fn session(&self) -> &Session {
        &self.session
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_derivation_with_and_without_room() {
        let config = SocketConfig { server: "example.org:9090".into() };
        assert_eq!(config.url(Some("r1")), "wss://example.org:9090/r1");
        assert_eq!(config.url(None), "wss://example.org:9090/");
    }

    #[test]
    fn default_config_points_at_default_server() {
        assert_eq!(SocketConfig::default().server, DEFAULT_SERVER);
    }

    #[test]
    fn classify_keepalive_probe() {
        assert!(matches!(classify(KEEPALIVE_PROBE), Inbound::Keepalive));
    }

    #[test]
    fn classify_valid_frame() {
        let inbound = classify(r#"{"type":"room","data":{"id":"r1"}}"#);
        assert!(matches!(inbound, Inbound::Frame(ServerMessage::Room(_))));
    }

    #[test]
    fn classify_unknown_type() {
        assert!(matches!(classify(r#"{"type":"presence","data":{}}"#), Inbound::Ignored));
    }

    #[test]
    fn classify_garbage() {
        assert!(matches!(classify("garbage"), Inbound::Invalid(ProtocolError::Malformed { .. })));
    }
}
