//! Events pushed to session observers.
//!
//! Every event serializes as a JSON object with a `type` discriminant and a
//! variant-specific payload, e.g. `{"type":"round_update","round":2}`.

use serde::{Deserialize, Serialize};

use crate::meeting::{Stage, Utterance};

/// A notification delivered to every observer of a session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MeetingEvent {
    /// Full-state snapshot, sent once per connection on registration.
    Init {
        /// Current stage.
        stage: Stage,
        /// Current round (0 before discussion).
        current_round: u32,
        /// Whole transcript so far.
        messages: Vec<Utterance>,
        /// Conclusion text, once produced.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        conclusion: Option<String>,
    },
    /// The session moved to a new stage.
    StageChange {
        /// New stage.
        stage: Stage,
        /// Stage that was left.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        previous_stage: Option<Stage>,
    },
    /// A discussion round began.
    RoundUpdate {
        /// Round number, starting at 1.
        round: u32,
    },
    /// An utterance was appended to the transcript.
    NewMessage {
        /// The appended entry.
        message: Utterance,
        /// Role id of the speaker.
        current_speaker: String,
    },
    /// Every scheduled speaker of a round has spoken.
    RoundCompleted {
        /// Round number.
        round: u32,
    },
    /// The moderator's summary is ready.
    Conclusion {
        /// Summary text.
        text: String,
    },
    /// Unrecoverable failure or a rejected request.
    Error {
        /// Human-readable reason.
        message: String,
    },
}

impl MeetingEvent {
    /// Wire discriminant of this event.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Init { .. } => "init",
            Self::StageChange { .. } => "stage_change",
            Self::RoundUpdate { .. } => "round_update",
            Self::NewMessage { .. } => "new_message",
            Self::RoundCompleted { .. } => "round_completed",
            Self::Conclusion { .. } => "conclusion",
            Self::Error { .. } => "error",
        }
    }

    /// Build a `new_message` event for `message`.
    pub fn new_message(message: Utterance) -> Self {
        let current_speaker = message.speaker_id.clone();
        Self::NewMessage {
            message,
            current_speaker,
        }
    }

    /// Build an `error` event.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}
