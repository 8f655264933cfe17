//! Local bookkeeping of the sessions a pool manages.
//!
//! The registry is the only mutable state shared between the reconciler and
//! callers. Every write replaces a single entry under a short write lock, so
//! readers always see whole `Session` snapshots, and no lock is ever held
//! across a control-plane call.

use std::collections::BTreeMap;

use livy_pool_core::{Session, SessionId, SessionKind};
use parking_lot::RwLock;

/// Sessions known to one pool, keyed by id.
///
/// A registry serves exactly one [`SessionKind`]; sessions of any other kind
/// are refused on insert.
#[derive(Debug)]
pub struct SessionRegistry {
    kind: SessionKind,
    sessions: RwLock<BTreeMap<SessionId, Session>>,
}

impl SessionRegistry {
    /// Create an empty registry for `kind`.
    #[must_use]
    pub fn new(kind: SessionKind) -> Self {
        Self {
            kind,
            sessions: RwLock::new(BTreeMap::new()),
        }
    }

    /// The kind this registry serves.
    #[must_use]
    pub const fn kind(&self) -> SessionKind {
        self.kind
    }

    /// Insert or replace a session.
    ///
    /// Returns false, leaving the registry untouched, if the session is not
    /// of the registry's kind.
    pub fn upsert(&self, session: Session) -> bool {
        if !session.is_kind(self.kind) {
            return false;
        }
        self.sessions.write().insert(session.id, session);
        true
    }

    /// Remove a session.
    pub fn remove(&self, session_id: SessionId) -> Option<Session> {
        self.sessions.write().remove(&session_id)
    }

    /// Get a session snapshot, if tracked.
    #[must_use]
    pub fn get(&self, session_id: SessionId) -> Option<Session> {
        self.sessions.read().get(&session_id).cloned()
    }

    /// Check if a session is tracked.
    #[must_use]
    pub fn contains(&self, session_id: SessionId) -> bool {
        self.sessions.read().contains_key(&session_id)
    }

    /// Number of tracked sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Check if the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Ids of every tracked session, in ascending order.
    #[must_use]
    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.read().keys().copied().collect()
    }

    /// Copies of every tracked session, in ascending id order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Session> {
        self.sessions.read().values().cloned().collect()
    }

    /// The lowest-numbered idle session, if any.
    #[must_use]
    pub fn first_idle(&self) -> Option<Session> {
        self.sessions
            .read()
            .values()
            .find(|s| s.is_idle_for(self.kind))
            .cloned()
    }

    /// Every idle session, in ascending id order.
    #[must_use]
    pub fn idle_sessions(&self) -> Vec<Session> {
        self.sessions
            .read()
            .values()
            .filter(|s| s.is_idle_for(self.kind))
            .cloned()
            .collect()
    }
}
