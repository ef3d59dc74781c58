//! Meeting pacing, limits and generation parameters.

use serde::{Deserialize, Serialize};

/// Runtime knobs for every meeting session.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MeetingSettings {
    /// Temperature for roles without their own override.
    pub default_temperature: f64,
    /// Temperature for the conclusion summary; lower than discussion turns.
    pub conclusion_temperature: f64,
    /// Utterances of context given to each discussion turn.
    pub discussion_window: usize,
    /// Utterances of context given to the conclusion summary.
    pub conclusion_window: usize,
    /// Minimum active non-moderator roles to start a session.
    pub min_active_roles: usize,
    /// Upper bound on requested rounds.
    pub max_rounds: u32,
    /// Rounds used when a request does not specify any.
    pub default_rounds: u32,
    /// Upper bound on the wait between pause checks, in milliseconds.
    pub pause_poll_ms: u64,
    /// Pause inserted after every appended utterance, in milliseconds.
    pub turn_delay_ms: u64,
    /// Scenario used when a request names none or an unknown one.
    pub default_scenario: String,
    /// Output language when a request does not specify one.
    pub default_language: String,
    /// How long finished sessions stay queryable, in seconds.
    pub session_retention_secs: u64,
    /// Directory of extra scenario definitions (`*.json`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scenario_dir: Option<String>,
}

impl Default for MeetingSettings {
    fn default() -> Self {
        Self {
            default_temperature: 0.7,
            conclusion_temperature: 0.5,
            discussion_window: 10,
            conclusion_window: 30,
            min_active_roles: 2,
            max_rounds: 20,
            default_rounds: 3,
            pause_poll_ms: 250,
            turn_delay_ms: 0,
            default_scenario: "business_meeting".to_string(),
            default_language: "English".to_string(),
            session_retention_secs: 3600,
            scenario_dir: None,
        }
    }
}
