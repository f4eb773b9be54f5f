//! Roster reconciliation.
//!
//! The roster owns the participant map for one session and reconciles it
//! against the complete membership snapshots the server pushes. Participant
//! identity survives reconciliation: as long as an id stays a member, every
//! lookup returns the same [`Arc<User>`] allocation.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use crate::{event::RosterEvent, user::User};

/// Reconciled membership for one session.
#[derive(Debug)]
pub struct Roster {
    users: HashMap<String, Arc<User>>,
    me: Arc<User>,
}

impl Roster {
    /// Build the initial roster from the server-assigned self id and the
    /// first membership snapshot.
    ///
    /// The local participant is always resident at construction time. It is
    /// inserted last so that an accidental duplicate of `me_id` in
    /// `member_ids` cannot shadow it with a second allocation.
    pub fn new(me_id: &str, member_ids: &[String]) -> Self {
        let mut users: HashMap<String, Arc<User>> = member_ids
            .iter()
            .filter(|id| id.as_str() != me_id)
            .map(|id| (id.clone(), Arc::new(User::new(id.clone(), false))))
            .collect();

        let me = Arc::new(User::new(me_id, true));
        users.insert(me_id.to_string(), Arc::clone(&me));

        Self { users, me }
    }

    /// Reconcile membership to exactly `ids`, self-inclusive.
    ///
    /// Two passes in a fixed order: every id not yet resident joins first,
    /// then every resident whose id is not in `ids` leaves (its own leave
    /// notification fires before the `Left` event is reported). Joins are
    /// ordered strictly before leaves within one call even when the net set
    /// shrinks; downstream consumers rely on that to never observe a
    /// transiently empty roster.
    pub fn renew(&mut self, ids: &[String]) -> Vec<RosterEvent> {
        let mut events = Vec::new();

        for id in ids {
            if !self.users.contains_key(id) {
                let user = Arc::new(User::new(id.clone(), false));
                self.users.insert(id.clone(), Arc::clone(&user));
                events.push(RosterEvent::Joined(user));
            }
        }

        let keep: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let departed: Vec<String> =
            self.users.keys().filter(|id| !keep.contains(id.as_str())).cloned().collect();

        for id in &departed {
            if let Some(user) = self.users.remove(id) {
                user.mark_left();
                events.push(RosterEvent::Left(user));
            }
        }

        events
    }

    /// Resolve `id` to its participant, materializing one if needed.
    ///
    /// Relay messages may reference ids no snapshot has confirmed yet; such
    /// participants are created on the spot and reported as joined exactly
    /// once. While the participant remains a member, repeated calls return
    /// the identical allocation.
    pub fn get_or_create(&mut self, id: &str) -> (Arc<User>, Option<RosterEvent>) {
        if let Some(user) = self.users.get(id) {
            return (Arc::clone(user), None);
        }

        let user = Arc::new(User::new(id, false));
        self.users.insert(id.to_string(), Arc::clone(&user));
        let joined = RosterEvent::Joined(Arc::clone(&user));

        (user, Some(joined))
    }

    /// Snapshot of the current members, safe to hold across later renewals.
    pub fn members(&self) -> Vec<Arc<User>> {
        self.users.values().cloned().collect()
    }

    /// The distinguished local participant.
    ///
    /// Keeps returning the same instance even after a snapshot has removed
    /// the local id from the membership.
    pub fn me(&self) -> &Arc<User> {
        &self.me
    }

    /// Number of current members.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Whether the roster has no members.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
