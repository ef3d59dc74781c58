//! # conclave-runtime
//!
//! Meeting orchestration.
//!
//! - **Orchestrator**: [`MeetingOrchestrator`] facade used by the server
//! - **Session**: [`session::MeetingSession`] state machine and its driving loop
//! - **Scheduling**: [`scheduler::TurnScheduler`] weighted, anti-repetition turn order
//! - **Transcript**: [`transcript::TranscriptStore`] append-only utterance log
//! - **Fan-out**: [`broadcast::BroadcastManager`] per-session observer delivery
//! - **Registry**: [`registry::SessionRegistry`] live sessions by id
//! - **Scenarios & prompts**: [`scenario`], [`prompts`], [`chair`]
//! - **Diagnostics**: [`diagnostics`] generator reachability and test replies
//!
//! ## Crate Position
//!
//! Depends on conclave-core, conclave-llm and conclave-settings.
//! Depended on by conclave-server and the binary.

#![deny(unsafe_code)]

pub mod broadcast;
pub mod chair;
pub mod diagnostics;
pub mod errors;
pub mod metrics;
pub mod orchestrator;
pub mod prompts;
pub mod registry;
pub mod request;
pub mod roster;
pub mod scenario;
pub mod scheduler;
pub mod session;
pub mod transcript;

pub use broadcast::{BroadcastManager, ObserverConnection};
pub use diagnostics::{GeneratorCheck, TestMessageReply, TestMessageRequest};
pub use errors::{MeetingError, Result};
pub use orchestrator::MeetingOrchestrator;
pub use request::{AdvanceMode, CreateMeetingRequest, MeetingConfig};
pub use scenario::{Scenario, ScenarioCatalog, ScenarioSummary};
pub use session::{CommandOutcome, MeetingSession, SessionSnapshot, SessionSummary};
