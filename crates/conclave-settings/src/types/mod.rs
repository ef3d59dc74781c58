//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a partial
//! JSON file only needs the keys it changes.

mod llm;
mod meeting;
mod server;

pub use llm::*;
pub use meeting::*;
pub use server::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 9000 },
///   "meeting": { "turnDelayMs": 1500 }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConclaveSettings {
    /// HTTP / WebSocket listener.
    pub server: ServerSettings,
    /// Generative text backend.
    pub llm: LlmSettings,
    /// Meeting pacing and limits.
    pub meeting: MeetingSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl ConclaveSettings {
    /// Reject combinations the runtime cannot honor.
    pub fn validate(&self) -> Result<()> {
        let m = &self.meeting;
        if m.max_rounds == 0 {
            return Err(SettingsError::InvalidValue(
                "meeting.maxRounds must be at least 1".into(),
            ));
        }
        if m.default_rounds == 0 || m.default_rounds > m.max_rounds {
            return Err(SettingsError::InvalidValue(format!(
                "meeting.defaultRounds must be within 1..={}",
                m.max_rounds
            )));
        }
        if m.conclusion_window <= m.discussion_window {
            return Err(SettingsError::InvalidValue(
                "meeting.conclusionWindow must be larger than meeting.discussionWindow".into(),
            ));
        }
        if m.min_active_roles < 2 {
            return Err(SettingsError::InvalidValue(
                "meeting.minActiveRoles must be at least 2".into(),
            ));
        }
        if self.server.outbound_buffer == 0 {
            return Err(SettingsError::InvalidValue(
                "server.outboundBuffer must be positive".into(),
            ));
        }
        Ok(())
    }
}
