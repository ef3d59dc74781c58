//! Process-wide map of live sessions.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use conclave_core::SessionId;
use dashmap::DashMap;
use tracing::debug;

use crate::session::MeetingSession;

/// Sessions by id. One instance per process, injected where needed.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<MeetingSession>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session under its id.
    pub fn insert(&self, session: Arc<MeetingSession>) {
        let id = session.id().clone();
        debug!(session_id = %id, "session registered");
        let _ = self.sessions.insert(id, session);
    }

    /// Look up a session.
    pub fn get(&self, id: &SessionId) -> Option<Arc<MeetingSession>> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Remove a session.
    pub fn remove(&self, id: &SessionId) -> Option<Arc<MeetingSession>> {
        self.sessions.remove(id).map(|(_, session)| session)
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is registered.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Every registered session, oldest first.
    pub fn list(&self) -> Vec<Arc<MeetingSession>> {
        let mut sessions: Vec<_> = self
            .sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        // v7 ids sort by creation time
        sessions.sort_by(|a, b| a.id().cmp(b.id()));
        sessions
    }

    /// Remove sessions that finished at or before `cutoff`; returns them.
    pub fn remove_finished_before(&self, cutoff: DateTime<Utc>) -> Vec<Arc<MeetingSession>> {
        let expired: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().finished_before(cutoff))
            .map(|entry| entry.key().clone())
            .collect();
        expired.iter().filter_map(|id| self.remove(id)).collect()
    }
}
