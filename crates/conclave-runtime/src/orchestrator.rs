//! Orchestrator: entry point for everything outside the runtime.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use conclave_core::{ConnectionId, ControlCommand, SessionId, Utterance};
use conclave_llm::TextGenerator;
use conclave_settings::MeetingSettings;
use metrics::counter;
use tracing::{info, instrument, warn};

use crate::broadcast::{BroadcastManager, ObserverConnection};
use crate::diagnostics::{self, GeneratorCheck, TestMessageReply, TestMessageRequest};
use crate::errors::{MeetingError, Result};
use crate::metrics::SESSIONS_CREATED_TOTAL;
use crate::registry::SessionRegistry;
use crate::request::CreateMeetingRequest;
use crate::scenario::{ScenarioCatalog, ScenarioSummary};
use crate::session::{CommandOutcome, MeetingSession, SessionSnapshot, SessionSummary};

/// Owns the session registry, the broadcaster, the generator and the
/// scenario catalog, and exposes the operations the transport layer needs.
pub struct MeetingOrchestrator {
    registry: SessionRegistry,
    broadcast: Arc<BroadcastManager>,
    generator: Arc<dyn TextGenerator>,
    scenarios: ScenarioCatalog,
    settings: MeetingSettings,
}

impl MeetingOrchestrator {
    /// Create an orchestrator.
    pub fn new(
        settings: MeetingSettings,
        scenarios: ScenarioCatalog,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        Self {
            registry: SessionRegistry::new(),
            broadcast: Arc::new(BroadcastManager::new()),
            generator,
            scenarios,
            settings,
        }
    }

    /// Validate `request`, register the session and start its loop.
    ///
    /// The session is registered before the loop starts, so an observer can
    /// attach as soon as the id is returned.
    #[instrument(skip_all, fields(topic = %request.topic))]
    pub fn create_session(&self, request: CreateMeetingRequest) -> Result<SessionId> {
        let config = request.resolve(&self.settings, &self.scenarios)?;
        let session = Arc::new(MeetingSession::new(
            config,
            self.settings.clone(),
            Arc::clone(&self.broadcast),
            Arc::clone(&self.generator),
        ));
        let id = session.id().clone();
        self.registry.insert(Arc::clone(&session));
        counter!(SESSIONS_CREATED_TOTAL).increment(1);
        info!(
            session_id = %id,
            rounds = session.config().total_rounds,
            scenario = %session.config().scenario.id,
            generator = self.generator.name(),
            "session created"
        );
        let _ = session.start();
        Ok(id)
    }

    /// Apply a control command to a session.
    pub fn handle_command(&self, id: &SessionId, command: ControlCommand) -> Result<CommandOutcome> {
        let session = self.session(id)?;
        Ok(session.apply(command))
    }

    /// Send `init` to `connection` and subscribe it to the session's events.
    pub fn register_observer(&self, connection: Arc<ObserverConnection>) -> Result<()> {
        let session = self.session(&connection.session_id)?;
        let _ = session.attach_observer(connection);
        Ok(())
    }

    /// Detach an observer. Unknown sessions and connections are ignored.
    pub fn unregister_observer(&self, session_id: &SessionId, connection_id: &ConnectionId) {
        let _ = self.broadcast.unregister(session_id, connection_id);
    }

    /// Snapshot of one session.
    pub fn snapshot(&self, id: &SessionId) -> Result<SessionSnapshot> {
        Ok(self.session(id)?.snapshot())
    }

    /// A page of one session's transcript and its total length.
    pub fn messages(
        &self,
        id: &SessionId,
        offset: usize,
        limit: usize,
    ) -> Result<(usize, Vec<Utterance>)> {
        Ok(self.session(id)?.messages(offset, limit))
    }

    /// Listing of every registered session.
    pub fn list_sessions(&self) -> Vec<SessionSummary> {
        self.registry.list().iter().map(|s| s.summary()).collect()
    }

    /// Evict sessions that finished more than `max_age` ago, closing any
    /// observers still attached. Returns how many were evicted.
    pub fn sweep_finished(&self, max_age: Duration) -> usize {
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        let cutoff = Utc::now()
            .checked_sub_signed(max_age)
            .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);
        let evicted = self.registry.remove_finished_before(cutoff);
        for session in &evicted {
            let _ = self.broadcast.close_all(session.id());
        }
        if !evicted.is_empty() {
            info!(evicted = evicted.len(), "swept finished sessions");
        }
        evicted.len()
    }

    /// End every live session and wait up to `grace` for their loops to stop.
    pub async fn shutdown(&self, grace: Duration) {
        let sessions = self.registry.list();
        for session in &sessions {
            let _ = session.apply(ControlCommand::EndSession);
        }
        let all_done = wait_all(&sessions);
        if tokio::time::timeout(grace, all_done).await.is_err() {
            warn!(sessions = sessions.len(), "shutdown grace period elapsed with loops still running");
        }
    }

    /// Scenario listing.
    pub fn scenarios(&self) -> Vec<ScenarioSummary> {
        self.scenarios.list()
    }

    /// Shared broadcaster.
    pub fn broadcast(&self) -> &Arc<BroadcastManager> {
        &self.broadcast
    }

    /// Make one short call against the configured generator.
    pub async fn check_generator(&self) -> GeneratorCheck {
        diagnostics::check_generator(self.generator.as_ref()).await
    }

    /// Run one generation outside any session.
    pub async fn test_message(&self, request: TestMessageRequest) -> Result<TestMessageReply> {
        if request.message.trim().is_empty() {
            return Err(MeetingError::Validation("message must not be empty".into()));
        }
        Ok(diagnostics::test_message(self.generator.as_ref(), request).await)
    }

    /// Number of registered sessions.
    pub fn session_count(&self) -> usize {
        self.registry.len()
    }

    /// Meeting settings in effect.
    pub fn settings(&self) -> &MeetingSettings {
        &self.settings
    }

    fn session(&self, id: &SessionId) -> Result<Arc<MeetingSession>> {
        self.registry
            .get(id)
            .ok_or_else(|| MeetingError::UnknownSession(id.to_string()))
    }
}

async fn wait_all(sessions: &[Arc<MeetingSession>]) {
    for session in sessions {
        session.wait_finished().await;
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use conclave_core::Role;
    use conclave_llm::mock::ScriptedGenerator;

    use super::*;

    fn orchestrator() -> MeetingOrchestrator {
        MeetingOrchestrator::new(
            MeetingSettings::default(),
            ScenarioCatalog::builtin(),
            Arc::new(ScriptedGenerator::numbered()),
        )
    }

    #[tokio::test]
    async fn invalid_request_allocates_nothing() {
        let orch = orchestrator();
        let err = orch
            .create_session(CreateMeetingRequest {
                topic: "Solo".into(),
                participants: vec![Role::new("a", "A", "One")],
                ..Default::default()
            })
            .unwrap_err();
        assert_matches!(err, MeetingError::Validation(_));
        assert_eq!(orch.session_count(), 0);
    }

    #[tokio::test]
    async fn blank_test_message_is_rejected() {
        let orch = orchestrator();
        let err = orch
            .test_message(TestMessageRequest {
                message: " \n".into(),
                topic: None,
            })
            .await
            .unwrap_err();
        assert_matches!(err, MeetingError::Validation(_));

        let reply = orch
            .test_message(TestMessageRequest {
                message: "Hi".into(),
                topic: None,
            })
            .await
            .unwrap();
        assert!(reply.success);
        assert!(orch.check_generator().await.backend.connected);
    }

    #[test]
    fn unknown_session_is_reported() {
        let orch = orchestrator();
        let id = SessionId::new();
        assert_matches!(
            orch.handle_command(&id, ControlCommand::PauseSession),
            Err(MeetingError::UnknownSession(_))
        );
        assert_matches!(orch.snapshot(&id), Err(MeetingError::UnknownSession(_)));
        assert_matches!(orch.messages(&id, 0, 10), Err(MeetingError::UnknownSession(_)));

        let (conn, _rx) = ObserverConnection::channel(id.clone(), 4);
        assert_matches!(orch.register_observer(conn), Err(MeetingError::UnknownSession(_)));
        orch.unregister_observer(&id, &ConnectionId::new());
    }

    #[tokio::test]
    async fn sweep_keeps_recent_and_running_sessions() {
        let orch = orchestrator();
        let id = orch
            .create_session(CreateMeetingRequest {
                topic: "Launch".into(),
                participants: vec![Role::new("a", "A", "One"), Role::new("b", "B", "Two")],
                ..Default::default()
            })
            .unwrap();
        let _ = orch.handle_command(&id, ControlCommand::EndSession).unwrap();

        assert_eq!(orch.sweep_finished(Duration::from_secs(3600)), 0);
        assert_eq!(orch.sweep_finished(Duration::ZERO), 1);
        assert_eq!(orch.session_count(), 0);
    }

    #[tokio::test]
    async fn shutdown_ends_live_sessions() {
        let orch = MeetingOrchestrator::new(
            MeetingSettings::default(),
            ScenarioCatalog::builtin(),
            Arc::new(ScriptedGenerator::numbered().with_delay(Duration::from_millis(20))),
        );
        let id = orch
            .create_session(CreateMeetingRequest {
                topic: "Launch".into(),
                participants: vec![Role::new("a", "A", "One"), Role::new("b", "B", "Two")],
                rounds: Some(5),
                ..Default::default()
            })
            .unwrap();
        orch.shutdown(Duration::from_secs(5)).await;
        assert_eq!(orch.snapshot(&id).unwrap().stage, conclave_core::Stage::Ended);
        assert_eq!(orch.list_sessions().len(), 1);
    }
}
