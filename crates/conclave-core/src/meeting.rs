//! Meeting model: roles, lifecycle stages and transcript entries.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::UtteranceId;

// ─────────────────────────────────────────────────────────────────────────────
// Role
// ─────────────────────────────────────────────────────────────────────────────

fn default_active() -> bool {
    true
}

/// A scripted speaking identity taking part in a meeting.
///
/// Roles are fixed once the session starts, including the `active` flag.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    /// Unique id within the session roster.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Job title shown next to the name.
    #[serde(default)]
    pub title: String,
    /// Custom persona prompt replacing the generic role description.
    #[serde(default, alias = "rolePrompt", skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,
    /// Short personality sketch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personality: Option<String>,
    /// Area of expertise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expertise: Option<String>,
    /// Sampling temperature override for this role.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Whether the role speaks in this session.
    #[serde(default = "default_active", alias = "isActive")]
    pub active: bool,
}

impl Role {
    /// Create an active role with no persona or temperature override.
    pub fn new(id: impl Into<String>, name: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            title: title.into(),
            persona: None,
            personality: None,
            expertise: None,
            temperature: None,
            active: true,
        }
    }

    /// Attach a persona prompt.
    #[must_use]
    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = Some(persona.into());
        self
    }

    /// Set a temperature override.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Mark the role inactive.
    #[must_use]
    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// `"Name (Title)"`, or just the name when the title is empty.
    pub fn label(&self) -> String {
        if self.title.is_empty() {
            self.name.clone()
        } else {
            format!("{} ({})", self.name, self.title)
        }
    }

    /// The role's own temperature, or `fallback` when unset.
    pub fn temperature_or(&self, fallback: f64) -> f64 {
        self.temperature.unwrap_or(fallback)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stage
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle stage of a session.
///
/// The main line is `waiting → introduction → discussion → conclusion → ended`.
/// `paused` is orthogonal and resumes into the stage it interrupted. `error`
/// and `ended` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Created, loop not yet started.
    Waiting,
    /// Welcome and self-introductions.
    Introduction,
    /// Discussion rounds.
    Discussion,
    /// Summary by the moderator.
    Conclusion,
    /// Finished normally or force-ended.
    Ended,
    /// Temporarily halted.
    Paused,
    /// Aborted by an internal failure.
    Error,
}

impl Stage {
    /// Wire name of the stage.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Introduction => "introduction",
            Self::Discussion => "discussion",
            Self::Conclusion => "conclusion",
            Self::Ended => "ended",
            Self::Paused => "paused",
            Self::Error => "error",
        }
    }

    /// No transition out of this stage is accepted.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ended | Self::Error)
    }

    /// Position on the main lifecycle line; `None` for `paused` and `error`.
    fn ordinal(self) -> Option<u8> {
        match self {
            Self::Waiting => Some(0),
            Self::Introduction => Some(1),
            Self::Discussion => Some(2),
            Self::Conclusion => Some(3),
            Self::Ended => Some(4),
            Self::Paused | Self::Error => None,
        }
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    ///
    /// Main-line moves must go strictly forward (skipping is allowed, which
    /// covers a forced end). `error` is reachable from any non-terminal stage,
    /// `paused` from any non-terminal main-line stage. Leaving `paused` is
    /// handled by resume, not by this check.
    pub fn can_advance_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self.ordinal(), next) {
            (_, Self::Error) => true,
            (Some(_), Self::Paused) => true,
            (Some(from), to) => to.ordinal().is_some_and(|to| to > from),
            (None, _) => false,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Utterance
// ─────────────────────────────────────────────────────────────────────────────

/// One immutable transcript entry.
///
/// Speaker name and title are copied from the role at append time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Utterance {
    /// Unique entry id.
    pub id: UtteranceId,
    /// Role id of the speaker.
    pub speaker_id: String,
    /// Speaker display name.
    pub speaker_name: String,
    /// Speaker title.
    pub speaker_title: String,
    /// Spoken text.
    pub text: String,
    /// When the entry was created.
    pub timestamp: DateTime<Utc>,
}

impl Utterance {
    /// New entry spoken by `role`, stamped now.
    pub fn new(role: &Role, text: impl Into<String>) -> Self {
        Self {
            id: UtteranceId::new(),
            speaker_id: role.id.clone(),
            speaker_name: role.name.clone(),
            speaker_title: role.title.clone(),
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    /// `"Name (Title): text"` line used as generation context.
    pub fn context_line(&self) -> String {
        format!("{} ({}): {}", self.speaker_name, self.speaker_title, self.text)
    }
}
