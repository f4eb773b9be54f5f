//! Session state machine.
//!
//! The `Session` is the top-level state machine that combines the room
//! assignment and the first membership snapshot into an open session and
//! routes inbound protocol messages to roster mutation and identity
//! resolution.
//!
//! Pure state machine: it consumes [`SocketEvent`]s and returns
//! [`SessionAction`]s for the caller to execute. No I/O, no suspension
//! points; every call runs to completion and returns its occurrences
//! atomically.

use std::{fmt, sync::Arc};

use parley_proto::{
    ClientMessage, JoinRequest, RoomAssigned, ServerMessage, SignalRelay, SignalRequest,
    UsersSnapshot,
};

use crate::{
    error::SessionError,
    event::{RosterEvent, SessionAction, SessionEvent, SocketEvent},
    roster::Roster,
    user::User,
};

/// State discriminator of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Waiting for the room assignment and the first membership snapshot.
    Connecting,
    /// Both prerequisites arrived; the session carries traffic.
    Open,
    /// Terminal: the socket closed.
    Closed,
    /// Terminal: the socket reported a transport error.
    Failed,
}

impl SessionStatus {
    /// Wire-facing discriminator string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "close",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session state. Exactly one variant is active at a time; the `Open`
/// variant is the only holder of the room id and the roster, so impossible
/// combinations (a room id without a roster while open) cannot be
/// represented.
#[derive(Debug)]
enum State {
    /// Tracks which of the two open prerequisites has arrived.
    Connecting { room: Option<String>, roster: Option<Roster> },
    /// Authoritative room id and roster.
    Open { room: String, roster: Roster },
    /// Terminal.
    Closed,
    /// Terminal.
    Failed,
}

/// Client session for one signaling socket.
///
/// Feed socket occurrences through [`Session::handle`] and execute the
/// returned actions in order. Queries and [`Session::send`] require the
/// session to be open and fail synchronously with
/// [`SessionError::NotOpen`] otherwise.
#[derive(Debug)]
pub struct Session {
    state: State,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Create a session in the connecting state.
    pub fn new() -> Self {
        Self { state: State::Connecting { room: None, roster: None } }
    }

    /// Process one socket occurrence and return the resulting actions.
    ///
    /// Once the session is closed or failed, every further occurrence is
    /// dropped and no actions are returned.
    pub fn handle(&mut self, event: SocketEvent) -> Vec<SessionAction> {
        if matches!(self.state, State::Closed | State::Failed) {
            return Vec::new();
        }

        match event {
            SocketEvent::Opened => {
                vec![SessionAction::Send(ClientMessage::Join(JoinRequest {}))]
            },
            SocketEvent::Frame(message) => self.handle_frame(message),
            SocketEvent::FrameError(error) => {
                vec![SessionAction::Emit(SessionEvent::Error(SessionError::Frame(error)))]
            },
            SocketEvent::Failed { reason } => {
                self.state = State::Failed;
                vec![SessionAction::Emit(SessionEvent::Error(SessionError::Transport { reason }))]
            },
            SocketEvent::Closed => {
                self.state = State::Closed;
                vec![SessionAction::Emit(SessionEvent::Closed)]
            },
        }
    }

    fn handle_frame(&mut self, message: ServerMessage) -> Vec<SessionAction> {
        match message {
            ServerMessage::Room(assigned) => self.handle_room(assigned),
            ServerMessage::Users(snapshot) => self.handle_users(snapshot),
            ServerMessage::Signal(relay) => self.handle_signal(relay),
        }
    }

    fn handle_room(&mut self, assigned: RoomAssigned) -> Vec<SessionAction> {
        match &mut self.state {
            State::Connecting { room, .. } => *room = Some(assigned.id),
            // The open transition fires at most once; a reassignment while
            // open is dropped.
            State::Open { .. } | State::Closed | State::Failed => return Vec::new(),
        }

        self.try_open().into_iter().collect()
    }

    fn handle_users(&mut self, snapshot: UsersSnapshot) -> Vec<SessionAction> {
        match &mut self.state {
            // The roster is renewed in place, never rebuilt, so that
            // participant identity survives successive snapshots.
            State::Connecting { roster: Some(roster), .. } | State::Open { roster, .. } => {
                return Self::emit_roster_events(roster.renew(&snapshot.users));
            },
            State::Connecting { roster, .. } => {
                *roster = Some(Roster::new(&snapshot.me, &snapshot.users));
            },
            State::Closed | State::Failed => return Vec::new(),
        }

        self.try_open().into_iter().collect()
    }

    fn handle_signal(&mut self, relay: SignalRelay) -> Vec<SessionAction> {
        // Relayed payloads are only meaningful against an open session;
        // anything earlier or later is silently ignored.
        let State::Open { roster, .. } = &mut self.state else {
            return Vec::new();
        };

        let mut actions = Vec::new();

        let (sender, joined) = roster.get_or_create(&relay.sender);
        if let Some(event) = joined {
            actions.push(Self::emit_roster_event(event));
        }

        let mut receivers = Vec::with_capacity(relay.receivers.len());
        for id in &relay.receivers {
            let (user, joined) = roster.get_or_create(id);
            if let Some(event) = joined {
                actions.push(Self::emit_roster_event(event));
            }
            receivers.push(user);
        }

        actions.push(SessionAction::Emit(SessionEvent::Message {
            sender,
            receivers,
            payload: relay.data,
        }));

        actions
    }

    /// Move from connecting to open exactly when both the room id and the
    /// roster have been established, regardless of arrival order.
    fn try_open(&mut self) -> Option<SessionAction> {
        let State::Connecting { room, roster } = &mut self.state else {
            return None;
        };
        if room.is_none() || roster.is_none() {
            return None;
        }

        let room = room.take()?;
        let roster = roster.take()?;
        self.state = State::Open { room: room.clone(), roster };

        Some(SessionAction::Emit(SessionEvent::Opened { room_id: room }))
    }

    fn emit_roster_events(events: Vec<RosterEvent>) -> Vec<SessionAction> {
        events.into_iter().map(Self::emit_roster_event).collect()
    }

    fn emit_roster_event(event: RosterEvent) -> SessionAction {
        match event {
            RosterEvent::Joined(user) => SessionAction::Emit(SessionEvent::UserJoined(user)),
            RosterEvent::Left(user) => SessionAction::Emit(SessionEvent::UserLeft(user)),
        }
    }

    /// Current state discriminator. Never fails.
    pub fn state(&self) -> SessionStatus {
        match self.state {
            State::Connecting { .. } => SessionStatus::Connecting,
            State::Open { .. } => SessionStatus::Open,
            State::Closed => SessionStatus::Closed,
            State::Failed => SessionStatus::Failed,
        }
    }

    /// Identifier of the joined room. Requires the session to be open.
    pub fn room_id(&self) -> Result<&str, SessionError> {
        let (room, _) = self.open_state()?;
        Ok(room)
    }

    /// Snapshot of the current members. Requires the session to be open.
    pub fn users(&self) -> Result<Vec<Arc<User>>, SessionError> {
        let (_, roster) = self.open_state()?;
        Ok(roster.members())
    }

    /// The local participant. Requires the session to be open.
    pub fn me(&self) -> Result<Arc<User>, SessionError> {
        let (_, roster) = self.open_state()?;
        Ok(Arc::clone(roster.me()))
    }

    /// Build the outbound relay frame for `payload`.
    ///
    /// With no explicit `receivers` the payload is addressed to the full
    /// current membership at call time, the local participant included. The
    /// caller writes the returned message to the socket.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotOpen`] unless the session is open.
    pub fn send(
        &self,
        payload: &str,
        receivers: Option<&[Arc<User>]>,
    ) -> Result<ClientMessage, SessionError> {
        let (_, roster) = self.open_state()?;

        let receiver_ids = match receivers {
            Some(users) => users.iter().map(|user| user.id().to_string()).collect(),
            None => roster.members().iter().map(|user| user.id().to_string()).collect(),
        };

        Ok(ClientMessage::Signal(SignalRequest {
            receivers: receiver_ids,
            data: payload.to_string(),
        }))
    }

    fn open_state(&self) -> Result<(&str, &Roster), SessionError> {
        match &self.state {
            State::Open { room, roster } => Ok((room, roster)),
            State::Connecting { .. } | State::Closed | State::Failed => {
                Err(SessionError::NotOpen { state: self.state() })
            },
        }
    }
}
