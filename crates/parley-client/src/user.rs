//! Participant identity.

use std::fmt;

use tokio::sync::watch;

/// One endpoint known to the roster, either the local participant or a
/// remote peer.
///
/// Identity is by allocation, not by value: the roster hands out
/// [`Arc<User>`](std::sync::Arc) clones, and two lookups for the same id
/// while it remains a member return the same allocation. Compare with
/// `Arc::ptr_eq`.
pub struct User {
    id: String,
    me: bool,
    left: watch::Sender<bool>,
}

impl User {
    pub(crate) fn new(id: impl Into<String>, me: bool) -> Self {
        let (left, _) = watch::channel(false);
        Self { id: id.into(), me, left }
    }

    /// Identifier, unique within a session.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether this participant denotes the local endpoint.
    pub fn is_me(&self) -> bool {
        self.me
    }

    /// Whether the leave notification has fired.
    pub fn has_left(&self) -> bool {
        *self.left.borrow()
    }

    /// Resolves once this participant leaves the roster; immediately if it
    /// already has.
    pub async fn left(&self) {
        let mut departed = self.left.subscribe();
        // Cannot fail: `self` holds the sender for as long as we wait.
        let _ = departed.wait_for(|left| *left).await;
    }

    /// Fire the leave notification. Latched: the first call wins and later
    /// calls are no-ops.
    pub(crate) fn mark_left(&self) {
        self.left.send_replace(true);
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("me", &self.me)
            .field("left", &self.has_left())
            .finish()
    }
}
