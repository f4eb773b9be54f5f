//! Session state machine scenarios.
//!
//! Drives the sans-io `Session` with synthetic socket occurrences and
//! asserts the emitted actions, state transitions, and query gating.

use std::{collections::HashSet, sync::Arc};

use parley_client::{
    ClientMessage, ProtocolError, ServerMessage, Session, SessionAction, SessionError,
    SessionEvent, SessionStatus, SocketEvent, User,
};
use parley_proto::{RoomAssigned, SignalRelay, SignalRequest, UsersSnapshot};

fn room_frame(id: &str) -> SocketEvent {
    SocketEvent::Frame(ServerMessage::Room(RoomAssigned { id: id.into() }))
}

fn users_frame(me: &str, members: &[&str]) -> SocketEvent {
    SocketEvent::Frame(ServerMessage::Users(UsersSnapshot {
        me: me.into(),
        users: members.iter().map(ToString::to_string).collect(),
        event: None,
    }))
}

fn signal_frame(sender: &str, receivers: &[&str], data: &str) -> SocketEvent {
    SocketEvent::Frame(ServerMessage::Signal(SignalRelay {
        sender: sender.into(),
        receivers: receivers.iter().map(ToString::to_string).collect(),
        data: data.into(),
    }))
}

fn emitted(actions: Vec<SessionAction>) -> Vec<SessionEvent> {
    actions
        .into_iter()
        .filter_map(|action| match action {
            SessionAction::Emit(event) => Some(event),
            SessionAction::Send(_) => None,
        })
        .collect()
}

fn member_ids(users: &[Arc<User>]) -> HashSet<String> {
    users.iter().map(|user| user.id().to_string()).collect()
}

/// Session that has received its room assignment and first snapshot.
fn opened_session() -> Session {
    let mut session = Session::new();
    let _ = session.handle(room_frame("r1"));
    let _ = session.handle(users_frame("u1", &["u1", "u2"]));
    assert_eq!(session.state(), SessionStatus::Open);
    session
}

#[test]
fn room_then_users_opens_the_session() {
    let session = opened_session();

    assert_eq!(session.state().as_str(), "open");
    assert_eq!(session.room_id().unwrap(), "r1");
    assert_eq!(
        member_ids(&session.users().unwrap()),
        HashSet::from(["u1".to_string(), "u2".to_string()])
    );
    assert!(session.me().unwrap().is_me());
    assert_eq!(session.me().unwrap().id(), "u1");
}

#[test]
fn snapshot_renews_join_before_leave() {
    let mut session = opened_session();

    let events = emitted(session.handle(users_frame("u1", &["u1", "u3"])));

    assert_eq!(events.len(), 2);
    assert!(matches!(&events[0], SessionEvent::UserJoined(user) if user.id() == "u3"));
    assert!(matches!(&events[1], SessionEvent::UserLeft(user) if user.id() == "u2"));
    assert_eq!(
        member_ids(&session.users().unwrap()),
        HashSet::from(["u1".to_string(), "u3".to_string()])
    );
}

#[test]
fn signal_resolves_sender_and_receivers() {
    let mut session = opened_session();

    let events = emitted(session.handle(signal_frame("u2", &["u1"], "hi")));

    let [SessionEvent::Message { sender, receivers, payload }] = &events[..] else {
        panic!("expected exactly one message event, got {events:?}");
    };
    assert_eq!(sender.id(), "u2");
    assert_eq!(payload, "hi");

    // Resolution goes through the roster: the event carries the same
    // allocations later lookups return.
    let users = session.users().unwrap();
    let u2 = users.iter().find(|user| user.id() == "u2").unwrap();
    let u1 = users.iter().find(|user| user.id() == "u1").unwrap();
    assert!(Arc::ptr_eq(sender, u2));
    assert_eq!(receivers.len(), 1);
    assert!(Arc::ptr_eq(&receivers[0], u1));
}

#[test]
fn signal_from_unknown_sender_joins_it_first() {
    let mut session = opened_session();

    let events = emitted(session.handle(signal_frame("u9", &["u1"], "blob")));

    assert_eq!(events.len(), 2);
    assert!(matches!(&events[0], SessionEvent::UserJoined(user) if user.id() == "u9"));
    assert!(matches!(&events[1], SessionEvent::Message { sender, .. } if sender.id() == "u9"));
    assert!(member_ids(&session.users().unwrap()).contains("u9"));
}

#[test]
fn signal_is_ignored_while_connecting() {
    let mut session = Session::new();
    let _ = session.handle(room_frame("r1"));

    let actions = session.handle(signal_frame("u2", &["u1"], "early"));

    assert!(actions.is_empty());
    assert_eq!(session.state(), SessionStatus::Connecting);
}

#[test]
fn users_then_room_opens_in_either_order() {
    let mut session = Session::new();
    let _ = session.handle(users_frame("u1", &["u1", "u2"]));
    assert_eq!(session.state(), SessionStatus::Connecting);

    let events = emitted(session.handle(room_frame("r2")));

    assert!(matches!(&events[..], [SessionEvent::Opened { room_id }] if room_id == "r2"));
    assert_eq!(session.state(), SessionStatus::Open);
}

#[test]
fn snapshot_while_connecting_renews_without_opening() {
    // Roster exists before the room assignment; a second snapshot must
    // renew it in place, and the session must stay connecting.
    let mut session = Session::new();
    let _ = session.handle(users_frame("u1", &["u1", "u2"]));

    let events = emitted(session.handle(users_frame("u1", &["u1", "u3"])));

    assert!(matches!(&events[0], SessionEvent::UserJoined(user) if user.id() == "u3"));
    assert!(matches!(&events[1], SessionEvent::UserLeft(user) if user.id() == "u2"));
    assert_eq!(session.state(), SessionStatus::Connecting);

    // The roster that opens is the one that was renewed, not a rebuild.
    let events = emitted(session.handle(room_frame("r1")));
    assert!(matches!(&events[..], [SessionEvent::Opened { .. }]));
    assert_eq!(
        member_ids(&session.users().unwrap()),
        HashSet::from(["u1".to_string(), "u3".to_string()])
    );
}

#[test]
fn identity_survives_renewal() {
    let mut session = opened_session();
    let before =
        session.users().unwrap().into_iter().find(|user| user.id() == "u2").unwrap();

    let _ = session.handle(users_frame("u1", &["u1", "u2", "u3"]));

    let after = session.users().unwrap().into_iter().find(|user| user.id() == "u2").unwrap();
    assert!(Arc::ptr_eq(&before, &after));
}

#[test]
fn frame_error_is_recoverable() {
    let mut session = opened_session();
    let error = ProtocolError::Malformed { reason: "expected value at line 1".into() };

    let events = emitted(session.handle(SocketEvent::FrameError(error.clone())));

    assert!(matches!(
        &events[..],
        [SessionEvent::Error(SessionError::Frame(cause))] if *cause == error
    ));
    assert_eq!(session.state(), SessionStatus::Open);

    // The session keeps processing frames afterwards.
    let events = emitted(session.handle(signal_frame("u2", &["u1"], "still here")));
    assert!(matches!(&events[..], [SessionEvent::Message { .. }]));
}

#[test]
fn close_is_terminal() {
    let mut session = opened_session();

    let events = emitted(session.handle(SocketEvent::Closed));
    assert!(matches!(&events[..], [SessionEvent::Closed]));
    assert_eq!(session.state().as_str(), "close");

    let err = session.send("late", None).unwrap_err();
    assert_eq!(err, SessionError::NotOpen { state: SessionStatus::Closed });

    // No further inbound occurrence is processed.
    assert!(session.handle(users_frame("u1", &["u1"])).is_empty());
    assert!(session.handle(SocketEvent::Opened).is_empty());
}

#[test]
fn transport_error_is_terminal() {
    let mut session = opened_session();

    let events = emitted(session.handle(SocketEvent::Failed { reason: "reset".into() }));

    assert!(matches!(
        &events[..],
        [SessionEvent::Error(SessionError::Transport { reason })] if reason == "reset"
    ));
    assert_eq!(session.state(), SessionStatus::Failed);
    assert!(session.handle(room_frame("r1")).is_empty());
    assert!(session.users().is_err());
}

#[test]
fn send_before_open_is_an_illegal_state() {
    let session = Session::new();

    let err = session.send("early", None).unwrap_err();

    assert_eq!(err, SessionError::NotOpen { state: SessionStatus::Connecting });
}

#[test]
fn send_defaults_to_full_membership() {
    let session = opened_session();

    let message = session.send("offer", None).unwrap();

    let ClientMessage::Signal(SignalRequest { receivers, data }) = message else {
        panic!("expected a signal request, got {message:?}");
    };
    assert_eq!(data, "offer");
    assert_eq!(
        receivers.into_iter().collect::<HashSet<_>>(),
        HashSet::from(["u1".to_string(), "u2".to_string()])
    );
}

#[test]
fn send_honors_explicit_receivers() {
    let mut session = opened_session();
    let _ = session.handle(users_frame("u1", &["u1", "u2", "u3"]));
    let target: Vec<Arc<User>> = session
        .users()
        .unwrap()
        .into_iter()
        .filter(|user| user.id() == "u3")
        .collect();

    let message = session.send("direct", Some(&target)).unwrap();

    let ClientMessage::Signal(SignalRequest { receivers, .. }) = message else {
        panic!("expected a signal request, got {message:?}");
    };
    assert_eq!(receivers, vec!["u3".to_string()]);
}

#[test]
fn queries_fail_until_open() {
    let mut session = Session::new();
    let _ = session.handle(users_frame("u1", &["u1"]));

    assert_eq!(session.state(), SessionStatus::Connecting);
    assert!(session.room_id().is_err());
    assert!(session.users().is_err());
    assert!(session.me().is_err());
}

#[test]
fn snapshot_omitting_self_removes_self() {
    // Literal reconciliation: the local participant is not special-cased
    // by `renew`, only by `me()` continuing to resolve.
    let mut session = opened_session();
    let me = session.me().unwrap();

    let events = emitted(session.handle(users_frame("u1", &["u2"])));

    assert!(matches!(&events[..], [SessionEvent::UserLeft(user)] if Arc::ptr_eq(user, &me)));
    assert!(me.has_left());
    assert!(Arc::ptr_eq(&session.me().unwrap(), &me));
    assert_eq!(member_ids(&session.users().unwrap()), HashSet::from(["u2".to_string()]));
}

#[test]
fn synthesized_participant_leaves_on_next_snapshot() {
    let mut session = opened_session();
    let _ = session.handle(signal_frame("u9", &["u1"], "drive-by"));

    let events = emitted(session.handle(users_frame("u1", &["u1", "u2"])));

    assert!(matches!(&events[..], [SessionEvent::UserLeft(user)] if user.id() == "u9"));
}
