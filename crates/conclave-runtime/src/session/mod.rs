//! One meeting session: guarded state, control commands and the driving task.
//!
//! All mutable fields live behind a single `parking_lot::Mutex`. The driving
//! loop (see [`driver`]) and control-command handlers both go through it, and
//! every event is broadcast while the lock is held, so observers see events
//! in exactly the order the state changed. Lock order is always
//! session state, then the broadcaster; the broadcaster never calls back.

mod driver;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use conclave_core::{ControlCommand, MeetingEvent, Role, SessionId, Stage, Utterance};
use conclave_llm::TextGenerator;
use conclave_settings::MeetingSettings;
use metrics::{counter, gauge};
use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::broadcast::{BroadcastManager, ObserverConnection};
use crate::errors::MeetingError;
use crate::metrics::{SESSIONS_ACTIVE, UTTERANCES_TOTAL};
use crate::request::{AdvanceMode, MeetingConfig};
use crate::scheduler;
use crate::transcript::TranscriptStore;

/// Result of applying a control command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The command changed session state.
    Applied,
    /// The command was not valid in the current state.
    Ignored(&'static str),
}

/// Why the driving loop stopped early.
#[derive(Debug)]
enum LoopExit {
    /// The session reached a terminal stage from outside the loop.
    Terminated,
    /// Unrecoverable failure; the session moves to `error`.
    Failed(MeetingError),
}

impl From<MeetingError> for LoopExit {
    fn from(err: MeetingError) -> Self {
        Self::Failed(err)
    }
}

/// How an utterance was produced.
#[derive(Clone, Copy, Debug)]
enum UtteranceKind {
    Generated,
    Templated,
    Fallback,
}

impl UtteranceKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Generated => "generated",
            Self::Templated => "templated",
            Self::Fallback => "fallback",
        }
    }
}

struct SessionState {
    stage: Stage,
    paused_from: Option<Stage>,
    current_round: u32,
    transcript: TranscriptStore,
    conclusion: Option<String>,
    advance_requested: bool,
    finished_at: Option<DateTime<Utc>>,
}

/// Read-only view of a session.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// Session id.
    pub id: SessionId,
    /// Topic.
    pub topic: String,
    /// Current stage.
    pub stage: Stage,
    /// Stage interrupted by a pause.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paused_from: Option<Stage>,
    /// Current round (0 before discussion).
    pub current_round: u32,
    /// Configured number of rounds.
    pub total_rounds: u32,
    /// Scenario id.
    pub scenario: String,
    /// Round advance mode.
    pub advance: AdvanceMode,
    /// Every role, moderator first.
    pub roles: Vec<Role>,
    /// Full transcript.
    pub messages: Vec<Utterance>,
    /// Summary text, once produced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conclusion: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// When the session reached `ended` or `error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Short listing entry.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// Session id.
    pub id: SessionId,
    /// Topic.
    pub topic: String,
    /// Current stage.
    pub stage: Stage,
    /// Current round.
    pub current_round: u32,
    /// Configured number of rounds.
    pub total_rounds: u32,
    /// Number of transcript entries.
    pub message_count: usize,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// A running (or finished) meeting.
pub struct MeetingSession {
    id: SessionId,
    config: MeetingConfig,
    settings: MeetingSettings,
    created_at: DateTime<Utc>,
    state: Mutex<SessionState>,
    wake: Notify,
    broadcast: Arc<BroadcastManager>,
    generator: Arc<dyn TextGenerator>,
    started: AtomicBool,
    done: CancellationToken,
}

impl MeetingSession {
    /// Create a session in `waiting`. Nothing runs until [`start`](Self::start).
    pub fn new(
        config: MeetingConfig,
        settings: MeetingSettings,
        broadcast: Arc<BroadcastManager>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        let transcript = TranscriptStore::new(config.roster.speaker_ids());
        Self {
            id: SessionId::new(),
            config,
            settings,
            created_at: Utc::now(),
            state: Mutex::new(SessionState {
                stage: Stage::Waiting,
                paused_from: None,
                current_round: 0,
                transcript,
                conclusion: None,
                advance_requested: false,
                finished_at: None,
            }),
            wake: Notify::new(),
            broadcast,
            generator,
            started: AtomicBool::new(false),
            done: CancellationToken::new(),
        }
    }

    /// Session id.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Validated configuration.
    pub fn config(&self) -> &MeetingConfig {
        &self.config
    }

    /// Current stage.
    pub fn stage(&self) -> Stage {
        self.state.lock().stage
    }

    /// Current round.
    pub fn current_round(&self) -> u32 {
        self.state.lock().current_round
    }

    /// Number of transcript entries.
    pub fn message_count(&self) -> usize {
        self.state.lock().transcript.len()
    }

    /// Whether the session finished at or before `cutoff`.
    pub fn finished_before(&self, cutoff: DateTime<Utc>) -> bool {
        self.state.lock().finished_at.is_some_and(|at| at <= cutoff)
    }

    /// Spawn the driving loop. Returns `false` if it was already started.
    ///
    /// A supervisor task awaits the loop; a failure or panic escaping it moves
    /// the session to `error` and never reaches the caller.
    pub fn start(self: &Arc<Self>) -> bool {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(session_id = %self.id, "driving loop already started");
            return false;
        }

        gauge!(SESSIONS_ACTIVE).increment(1.0);
        let session = Arc::clone(self);
        let _ = tokio::spawn(async move {
            let outcome = tokio::spawn(driver::run(Arc::clone(&session))).await;
            match outcome {
                Ok(Ok(())) => info!(session_id = %session.id, "meeting finished"),
                Ok(Err(LoopExit::Terminated)) => {
                    info!(session_id = %session.id, "driving loop stopped after forced end");
                }
                Ok(Err(LoopExit::Failed(err))) => session.mark_failed(&err.to_string()),
                Err(join) => session.mark_failed(&format!("driving loop aborted: {join}")),
            }
            gauge!(SESSIONS_ACTIVE).decrement(1.0);
            session.done.cancel();
        });
        true
    }

    /// Resolve once the driving loop has exited. Never resolves if the
    /// session was not started.
    pub async fn wait_finished(&self) {
        self.done.cancelled().await;
    }

    // ─────────────────────────────────────────────────────────────────────
    // Control commands
    // ─────────────────────────────────────────────────────────────────────

    /// Apply an observer control command.
    pub fn apply(&self, command: ControlCommand) -> CommandOutcome {
        let outcome = match command {
            ControlCommand::PauseSession => self.pause(),
            ControlCommand::ResumeSession => self.resume(),
            ControlCommand::EndSession => self.end(),
            ControlCommand::AdvanceRound => self.request_advance(),
        };
        match outcome {
            CommandOutcome::Applied => {
                info!(session_id = %self.id, command = command.as_str(), "control command applied");
            }
            CommandOutcome::Ignored(reason) => {
                info!(session_id = %self.id, command = command.as_str(), reason, "control command ignored");
            }
        }
        outcome
    }

    fn pause(&self) -> CommandOutcome {
        let mut state = self.state.lock();
        if state.stage.is_terminal() {
            return CommandOutcome::Ignored("session already finished");
        }
        if state.stage == Stage::Paused {
            return CommandOutcome::Ignored("session already paused");
        }
        let previous = state.stage;
        state.paused_from = Some(previous);
        state.stage = Stage::Paused;
        self.emit(&MeetingEvent::StageChange {
            stage: Stage::Paused,
            previous_stage: Some(previous),
        });
        CommandOutcome::Applied
    }

    fn resume(&self) -> CommandOutcome {
        let mut state = self.state.lock();
        if state.stage != Stage::Paused {
            return CommandOutcome::Ignored("session is not paused");
        }
        let restored = state.paused_from.take().unwrap_or(Stage::Waiting);
        state.stage = restored;
        self.emit(&MeetingEvent::StageChange {
            stage: restored,
            previous_stage: Some(Stage::Paused),
        });
        drop(state);
        self.wake.notify_waiters();
        CommandOutcome::Applied
    }

    fn end(&self) -> CommandOutcome {
        let mut state = self.state.lock();
        if state.stage.is_terminal() {
            return CommandOutcome::Ignored("session already finished");
        }
        let previous = state.stage;
        state.stage = Stage::Ended;
        state.paused_from = None;
        state.finished_at = Some(Utc::now());
        self.emit(&MeetingEvent::StageChange {
            stage: Stage::Ended,
            previous_stage: Some(previous),
        });
        drop(state);
        let _ = self.broadcast.close_all(&self.id);
        self.wake.notify_waiters();
        CommandOutcome::Applied
    }

    fn request_advance(&self) -> CommandOutcome {
        let mut state = self.state.lock();
        if state.stage != Stage::Discussion {
            return CommandOutcome::Ignored("next_round is only valid during discussion");
        }
        state.advance_requested = true;
        drop(state);
        self.wake.notify_waiters();
        CommandOutcome::Applied
    }

    /// Force the session into `error` and notify observers.
    fn mark_failed(&self, message: &str) {
        let mut state = self.state.lock();
        if state.stage.is_terminal() {
            return;
        }
        error!(session_id = %self.id, error = message, "meeting failed");
        let previous = state.stage;
        state.stage = Stage::Error;
        state.paused_from = None;
        state.finished_at = Some(Utc::now());
        self.emit(&MeetingEvent::StageChange {
            stage: Stage::Error,
            previous_stage: Some(previous),
        });
        self.emit(&MeetingEvent::error(message));
    }

    // ─────────────────────────────────────────────────────────────────────
    // Observers and reads
    // ─────────────────────────────────────────────────────────────────────

    /// Send `init` to `connection` and register it for live events.
    ///
    /// Both happen under the state lock, so the connection receives every
    /// event after the snapshot and none before it.
    pub fn attach_observer(&self, connection: Arc<ObserverConnection>) -> bool {
        let state = self.state.lock();
        let init = MeetingEvent::Init {
            stage: state.stage,
            current_round: state.current_round,
            messages: state.transcript.all().to_vec(),
            conclusion: state.conclusion.clone(),
        };
        if !connection.send_event(&init) {
            warn!(session_id = %self.id, conn_id = %connection.id, "failed to deliver init snapshot");
        }
        self.broadcast.register(connection)
    }

    /// Full snapshot of the session.
    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock();
        SessionSnapshot {
            id: self.id.clone(),
            topic: self.config.topic.clone(),
            stage: state.stage,
            paused_from: state.paused_from,
            current_round: state.current_round,
            total_rounds: self.config.total_rounds,
            scenario: self.config.scenario.id.clone(),
            advance: self.config.advance,
            roles: self.config.roster.roles().to_vec(),
            messages: state.transcript.all().to_vec(),
            conclusion: state.conclusion.clone(),
            created_at: self.created_at,
            finished_at: state.finished_at,
        }
    }

    /// Listing entry.
    pub fn summary(&self) -> SessionSummary {
        let state = self.state.lock();
        SessionSummary {
            id: self.id.clone(),
            topic: self.config.topic.clone(),
            stage: state.stage,
            current_round: state.current_round,
            total_rounds: self.config.total_rounds,
            message_count: state.transcript.len(),
            created_at: self.created_at,
        }
    }

    /// A page of the transcript and the total length.
    pub fn messages(&self, offset: usize, limit: usize) -> (usize, Vec<Utterance>) {
        let state = self.state.lock();
        (
            state.transcript.len(),
            state.transcript.page(offset, limit).to_vec(),
        )
    }

    // ─────────────────────────────────────────────────────────────────────
    // Loop primitives
    // ─────────────────────────────────────────────────────────────────────

    fn emit(&self, event: &MeetingEvent) {
        let _ = self.broadcast.broadcast(&self.id, event);
    }

    fn pause_poll(&self) -> Duration {
        Duration::from_millis(self.settings.pause_poll_ms.max(1))
    }

    /// Lock the state once the session is not paused.
    ///
    /// Waits on resume notifications, re-checking every `pause_poll_ms` as a
    /// backstop. Fails with [`LoopExit::Terminated`] once the session is
    /// terminal.
    async fn lock_running(&self) -> Result<MutexGuard<'_, SessionState>, LoopExit> {
        loop {
            let notified = self.wake.notified();
            {
                let state = self.state.lock();
                if state.stage.is_terminal() {
                    return Err(LoopExit::Terminated);
                }
                if state.stage != Stage::Paused {
                    return Ok(state);
                }
            }
            let _ = tokio::time::timeout(self.pause_poll(), notified).await;
        }
    }

    async fn checkpoint(&self) -> Result<(), LoopExit> {
        self.lock_running().await.map(drop)
    }

    async fn transition(&self, to: Stage) -> Result<(), LoopExit> {
        let mut state = self.lock_running().await?;
        let from = state.stage;
        if !from.can_advance_to(to) {
            return Err(LoopExit::Failed(MeetingError::Internal(format!(
                "illegal stage transition {from} -> {to}"
            ))));
        }
        state.stage = to;
        if to.is_terminal() {
            state.finished_at = Some(Utc::now());
        }
        info!(session_id = %self.id, from = %from, to = %to, "stage changed");
        self.emit(&MeetingEvent::StageChange {
            stage: to,
            previous_stage: Some(from),
        });
        Ok(())
    }

    /// Move from introduction into discussion with round 1 already open.
    ///
    /// Stage and round change under one lock so a `next_round` can never
    /// land in a discussion that has no round yet.
    async fn enter_discussion(&self) -> Result<(), LoopExit> {
        let mut state = self.lock_running().await?;
        let from = state.stage;
        if !from.can_advance_to(Stage::Discussion) {
            return Err(LoopExit::Failed(MeetingError::Internal(format!(
                "illegal stage transition {from} -> {}",
                Stage::Discussion
            ))));
        }
        state.stage = Stage::Discussion;
        state.current_round = 1;
        state.advance_requested = false;
        info!(session_id = %self.id, from = %from, to = %Stage::Discussion, "stage changed");
        self.emit(&MeetingEvent::StageChange {
            stage: Stage::Discussion,
            previous_stage: Some(from),
        });
        self.emit(&MeetingEvent::RoundUpdate { round: 1 });
        Ok(())
    }

    async fn begin_round(&self, round: u32) -> Result<(), LoopExit> {
        let mut state = self.lock_running().await?;
        state.current_round = round;
        state.advance_requested = false;
        debug!(session_id = %self.id, round, "round started");
        self.emit(&MeetingEvent::RoundUpdate { round });
        Ok(())
    }

    async fn complete_round(&self, round: u32) -> Result<(), LoopExit> {
        let _state = self.lock_running().await?;
        debug!(session_id = %self.id, round, "round completed");
        self.emit(&MeetingEvent::RoundCompleted { round });
        Ok(())
    }

    async fn append(&self, role: &Role, text: String, kind: UtteranceKind) -> Result<(), LoopExit> {
        let mut state = self.lock_running().await?;
        let message = state.transcript.append(Utterance::new(role, text))?.clone();
        counter!(UTTERANCES_TOTAL, "kind" => kind.as_str()).increment(1);
        self.emit(&MeetingEvent::new_message(message));
        Ok(())
    }

    async fn publish_conclusion(&self, text: &str) -> Result<(), LoopExit> {
        let mut state = self.lock_running().await?;
        state.conclusion = Some(text.to_string());
        self.emit(&MeetingEvent::Conclusion {
            text: text.to_string(),
        });
        Ok(())
    }

    /// Consume a pending `next_round` request.
    fn take_advance(&self) -> bool {
        std::mem::take(&mut self.state.lock().advance_requested)
    }

    /// Block until `next_round` arrives while not paused.
    async fn wait_for_advance(&self) -> Result<(), LoopExit> {
        loop {
            let notified = self.wake.notified();
            {
                let mut state = self.state.lock();
                if state.stage.is_terminal() {
                    return Err(LoopExit::Terminated);
                }
                if state.advance_requested && state.stage != Stage::Paused {
                    state.advance_requested = false;
                    return Ok(());
                }
            }
            let _ = tokio::time::timeout(self.pause_poll(), notified).await;
        }
    }

    fn recent_window(&self, n: usize) -> Vec<Utterance> {
        self.state.lock().transcript.recent_window(n).to_vec()
    }

    fn recent_speakers(&self, excluded: &[&str]) -> Vec<String> {
        let state = self.state.lock();
        scheduler::recent_speakers(
            state.transcript.all(),
            excluded,
            scheduler::RECENT_SPEAKER_LIMIT,
        )
    }
}

impl std::fmt::Debug for MeetingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeetingSession")
            .field("id", &self.id)
            .field("topic", &self.config.topic)
            .field("stage", &self.stage())
            .finish_non_exhaustive()
    }
}
