//! Session-scoped observer registry and event fan-out.

use std::collections::HashMap;
use std::sync::Arc;

use conclave_core::{ConnectionId, MeetingEvent, SessionId};
use metrics::{counter, gauge};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::connection::ObserverConnection;
use crate::metrics::{WS_BROADCAST_DROPS_TOTAL, WS_CONNECTIONS_ACTIVE};

/// Drops after which a lagging observer is disconnected.
pub const MAX_TOTAL_DROPS: u64 = 100;

type SessionConnections = HashMap<ConnectionId, Arc<ObserverConnection>>;

/// Fans meeting events out to the observers of each session.
///
/// All operations are synchronous and never await while holding the lock, so
/// they can be called from inside a session's state critical section.
#[derive(Default)]
pub struct BroadcastManager {
    sessions: RwLock<HashMap<SessionId, SessionConnections>>,
}

impl BroadcastManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an observer to its session. Registering twice is a no-op.
    pub fn register(&self, connection: Arc<ObserverConnection>) -> bool {
        let mut sessions = self.sessions.write();
        let observers = sessions.entry(connection.session_id.clone()).or_default();
        if observers.contains_key(&connection.id) {
            return false;
        }
        info!(conn_id = %connection.id, session_id = %connection.session_id, "observer registered");
        gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
        let _ = observers.insert(connection.id.clone(), connection);
        true
    }

    /// Detach an observer. Unknown ids are ignored.
    pub fn unregister(&self, session_id: &SessionId, connection_id: &ConnectionId) -> bool {
        let mut sessions = self.sessions.write();
        let Some(observers) = sessions.get_mut(session_id) else {
            return false;
        };
        let removed = observers.remove(connection_id).is_some();
        if observers.is_empty() {
            let _ = sessions.remove(session_id);
        }
        if removed {
            gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
            debug!(conn_id = %connection_id, session_id = %session_id, "observer unregistered");
        }
        removed
    }

    /// Deliver `event` to every observer of `session_id`.
    ///
    /// The event is serialized once. A failed delivery is logged and skipped;
    /// observers that keep lagging are closed and evicted. Returns the number
    /// of observers the event was queued for.
    pub fn broadcast(&self, session_id: &SessionId, event: &MeetingEvent) -> usize {
        let json = match serde_json::to_string(event) {
            Ok(j) => Arc::new(j),
            Err(e) => {
                warn!(event = event.kind(), error = %e, "failed to serialize event");
                return 0;
            }
        };

        let recipients: Vec<Arc<ObserverConnection>> = self
            .sessions
            .read()
            .get(session_id)
            .map(|observers| observers.values().cloned().collect())
            .unwrap_or_default();

        let mut delivered = 0;
        let mut lagging = Vec::new();
        for conn in &recipients {
            if conn.send(Arc::clone(&json)) {
                delivered += 1;
                continue;
            }
            counter!(WS_BROADCAST_DROPS_TOTAL).increment(1);
            warn!(conn_id = %conn.id, %session_id, event = event.kind(), "failed to deliver event to observer");
            if conn.dropped_messages() >= MAX_TOTAL_DROPS {
                lagging.push(conn.id.clone());
            }
        }

        for conn_id in lagging {
            warn!(%conn_id, %session_id, "evicting lagging observer");
            if let Some(conn) = self.find(session_id, &conn_id) {
                conn.close();
            }
            let _ = self.unregister(session_id, &conn_id);
        }

        debug!(event = event.kind(), %session_id, recipients = recipients.len(), delivered, "broadcast event");
        delivered
    }

    /// Close and detach every observer of `session_id`.
    pub fn close_all(&self, session_id: &SessionId) -> usize {
        let removed = self.sessions.write().remove(session_id).unwrap_or_default();
        for conn in removed.values() {
            conn.close();
        }
        if !removed.is_empty() {
            gauge!(WS_CONNECTIONS_ACTIVE).decrement(removed.len() as f64);
            info!(%session_id, closed = removed.len(), "closed session observers");
        }
        removed.len()
    }

    /// Total observers across sessions.
    pub fn connection_count(&self) -> usize {
        self.sessions.read().values().map(HashMap::len).sum()
    }

    /// Observers of one session.
    pub fn session_connection_count(&self, session_id: &SessionId) -> usize {
        self.sessions.read().get(session_id).map_or(0, HashMap::len)
    }

    fn find(&self, session_id: &SessionId, conn_id: &ConnectionId) -> Option<Arc<ObserverConnection>> {
        self.sessions.read().get(session_id)?.get(conn_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;

    fn observer(session: &SessionId, cap: usize) -> (Arc<ObserverConnection>, mpsc::Receiver<Arc<String>>) {
        ObserverConnection::channel(session.clone(), cap)
    }

    #[test]
    fn register_is_idempotent() {
        let bm = BroadcastManager::new();
        let sid = SessionId::new();
        let (c, _rx) = observer(&sid, 4);
        assert!(bm.register(Arc::clone(&c)));
        assert!(!bm.register(c));
        assert_eq!(bm.connection_count(), 1);
    }

    #[test]
    fn unregister_unknown_is_safe() {
        let bm = BroadcastManager::new();
        assert!(!bm.unregister(&SessionId::new(), &ConnectionId::new()));
    }

    #[test]
    fn broadcast_is_scoped_to_session() {
        let bm = BroadcastManager::new();
        let a = SessionId::new();
        let b = SessionId::new();
        let (c1, mut rx1) = observer(&a, 4);
        let (c2, mut rx2) = observer(&b, 4);
        let (c3, mut rx3) = observer(&a, 4);
        let _ = bm.register(c1);
        let _ = bm.register(c2);
        let _ = bm.register(c3);

        assert_eq!(bm.broadcast(&a, &MeetingEvent::RoundUpdate { round: 1 }), 2);
        assert!(rx1.try_recv().is_ok());
        assert!(rx3.try_recv().is_ok());
        assert!(rx2.try_recv().is_err());
    }

    #[test]
    fn failed_observer_does_not_block_others() {
        let bm = BroadcastManager::new();
        let sid = SessionId::new();
        let (slow, _slow_rx) = observer(&sid, 1);
        let (fast, mut fast_rx) = observer(&sid, 8);
        let _ = bm.register(slow);
        let _ = bm.register(fast);

        for round in 1..=3 {
            let _ = bm.broadcast(&sid, &MeetingEvent::RoundUpdate { round });
        }
        let mut received = 0;
        while fast_rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, 3);
    }

    #[test]
    fn lagging_observer_is_evicted() {
        let bm = BroadcastManager::new();
        let sid = SessionId::new();
        let (slow, _rx) = observer(&sid, 1);
        let _ = bm.register(Arc::clone(&slow));
        for round in 0..=u32::try_from(MAX_TOTAL_DROPS).unwrap() {
            let _ = bm.broadcast(&sid, &MeetingEvent::RoundUpdate { round });
        }
        assert!(slow.is_closed());
        assert_eq!(bm.session_connection_count(&sid), 0);
    }

    #[test]
    fn close_all_closes_and_detaches() {
        let bm = BroadcastManager::new();
        let sid = SessionId::new();
        let (c1, _rx1) = observer(&sid, 4);
        let (c2, _rx2) = observer(&sid, 4);
        let _ = bm.register(Arc::clone(&c1));
        let _ = bm.register(Arc::clone(&c2));
        assert_eq!(bm.close_all(&sid), 2);
        assert!(c1.is_closed() && c2.is_closed());
        assert_eq!(bm.connection_count(), 0);
        assert_eq!(bm.close_all(&sid), 0);
    }

    #[test]
    fn broadcast_to_empty_session_delivers_nothing() {
        let bm = BroadcastManager::new();
        assert_eq!(bm.broadcast(&SessionId::new(), &MeetingEvent::error("x")), 0);
    }
}
