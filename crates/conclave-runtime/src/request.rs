//! Session-creation input and its validation.

use std::collections::HashSet;
use std::sync::Arc;

use conclave_core::Role;
use conclave_settings::MeetingSettings;
use serde::{Deserialize, Serialize};

use crate::errors::{MeetingError, Result};
use crate::roster::{Roster, default_moderator};
use crate::scenario::{Scenario, ScenarioCatalog};

/// How the loop moves from one discussion round to the next.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvanceMode {
    /// Rounds run back to back; `next_round` cuts the current one short.
    #[default]
    Automatic,
    /// After each round the loop waits for `next_round`.
    Manual,
}

/// Raw request to start a meeting.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMeetingRequest {
    /// Discussion topic.
    pub topic: String,
    /// Participating roles (moderator excluded).
    #[serde(default)]
    pub participants: Vec<Role>,
    /// Number of discussion rounds.
    #[serde(default)]
    pub rounds: Option<u32>,
    /// Scenario id.
    #[serde(default)]
    pub scenario: Option<String>,
    /// Free text injected into every prompt.
    #[serde(default, alias = "additionalNotes")]
    pub notes: Option<String>,
    /// Role id (or name/title) that chairs the rounds.
    #[serde(default)]
    pub chair: Option<String>,
    /// Moderator replacing the built-in secretary.
    #[serde(default)]
    pub moderator: Option<Role>,
    /// Output language.
    #[serde(default)]
    pub language: Option<String>,
    /// Run rounds back to back (default) or wait for `next_round`.
    #[serde(default)]
    pub auto_advance: Option<bool>,
}

/// Validated, immutable configuration of one session.
#[derive(Clone, Debug)]
pub struct MeetingConfig {
    /// Discussion topic, trimmed.
    pub topic: String,
    /// Moderator plus participants.
    pub roster: Roster,
    /// Number of discussion rounds.
    pub total_rounds: u32,
    /// Resolved scenario.
    pub scenario: Arc<Scenario>,
    /// Free text injected into every prompt.
    pub notes: Option<String>,
    /// Designated chair key.
    pub chair: Option<String>,
    /// Output language.
    pub language: String,
    /// Round advance mode.
    pub advance: AdvanceMode,
}

impl CreateMeetingRequest {
    /// Validate the request and resolve it into a [`MeetingConfig`].
    pub fn resolve(
        self,
        settings: &MeetingSettings,
        catalog: &ScenarioCatalog,
    ) -> Result<MeetingConfig> {
        let topic = self.topic.trim().to_string();
        if topic.is_empty() {
            return Err(MeetingError::Validation("topic must not be empty".into()));
        }

        let total_rounds = self.rounds.unwrap_or(settings.default_rounds);
        if total_rounds == 0 || total_rounds > settings.max_rounds {
            return Err(MeetingError::Validation(format!(
                "rounds must be between 1 and {}, got {total_rounds}",
                settings.max_rounds
            )));
        }

        let moderator = self.moderator.unwrap_or_else(default_moderator);
        let mut seen = HashSet::new();
        for role in std::iter::once(&moderator).chain(&self.participants) {
            if role.id.trim().is_empty() {
                return Err(MeetingError::Validation("role id must not be empty".into()));
            }
            if !seen.insert(role.id.as_str()) {
                return Err(MeetingError::Validation(format!(
                    "duplicate role id: {}",
                    role.id
                )));
            }
        }

        let active = self.participants.iter().filter(|r| r.active).count();
        if active < settings.min_active_roles {
            return Err(MeetingError::Validation(format!(
                "at least {} active participants are required, got {active}",
                settings.min_active_roles
            )));
        }

        let roster = Roster::new(moderator, self.participants);

        let chair = self
            .chair
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        if let Some(key) = &chair
            && !roster
                .roles()
                .iter()
                .any(|r| r.id == *key || crate::scenario::role_matches(r, key))
        {
            return Err(MeetingError::Validation(format!(
                "chair {key} is not part of the roster"
            )));
        }

        let scenario = catalog.resolve(self.scenario.as_deref());
        let notes = self
            .notes
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        let language = self
            .language
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| settings.default_language.clone());
        let advance = match self.auto_advance {
            Some(false) => AdvanceMode::Manual,
            _ => AdvanceMode::Automatic,
        };

        Ok(MeetingConfig {
            topic,
            roster,
            total_rounds,
            scenario,
            notes,
            chair,
            language,
            advance,
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::roster::DEFAULT_MODERATOR_ID;

    fn request() -> CreateMeetingRequest {
        CreateMeetingRequest {
            topic: "  Q3 budget ".into(),
            participants: vec![
                Role::new("cfo", "Dana", "Finance Manager"),
                Role::new("cto", "Sam", "R&D Director"),
            ],
            ..Default::default()
        }
    }

    fn resolve(req: CreateMeetingRequest) -> Result<MeetingConfig> {
        req.resolve(&MeetingSettings::default(), &ScenarioCatalog::builtin())
    }

    #[test]
    fn applies_defaults() {
        let config = resolve(request()).unwrap();
        assert_eq!(config.topic, "Q3 budget");
        assert_eq!(config.total_rounds, 3);
        assert_eq!(config.scenario.id, "business_meeting");
        assert_eq!(config.language, "English");
        assert_eq!(config.advance, AdvanceMode::Automatic);
        assert_eq!(config.roster.moderator().id, DEFAULT_MODERATOR_ID);
        assert!(config.notes.is_none());
    }

    #[test]
    fn empty_topic_rejected() {
        let mut req = request();
        req.topic = "   ".into();
        assert_matches!(resolve(req), Err(MeetingError::Validation(_)));
    }

    #[test]
    fn too_few_active_roles_rejected() {
        let mut req = request();
        req.participants[1].active = false;
        assert_matches!(resolve(req), Err(MeetingError::Validation(m)) if m.contains("at least 2"));
    }

    #[test]
    fn rounds_bounded() {
        let mut req = request();
        req.rounds = Some(0);
        assert_matches!(resolve(req), Err(MeetingError::Validation(_)));

        let mut req = request();
        req.rounds = Some(21);
        assert_matches!(resolve(req), Err(MeetingError::Validation(_)));

        let mut req = request();
        req.rounds = Some(20);
        assert_eq!(resolve(req).unwrap().total_rounds, 20);
    }

    #[test]
    fn duplicate_ids_rejected() {
        let mut req = request();
        req.participants.push(Role::new("cfo", "Other", "Finance"));
        assert_matches!(resolve(req), Err(MeetingError::Validation(m)) if m.contains("duplicate"));
    }

    #[test]
    fn participant_cannot_reuse_moderator_id() {
        let mut req = request();
        req.participants.push(Role::new(DEFAULT_MODERATOR_ID, "Fake", "Mod"));
        assert_matches!(resolve(req), Err(MeetingError::Validation(_)));
    }

    #[test]
    fn unknown_chair_rejected() {
        let mut req = request();
        req.chair = Some("ceo".into());
        assert_matches!(resolve(req), Err(MeetingError::Validation(m)) if m.contains("chair"));
    }

    #[test]
    fn chair_may_be_named_by_title() {
        let mut req = request();
        req.chair = Some("Finance Manager".into());
        assert_eq!(resolve(req).unwrap().chair.as_deref(), Some("Finance Manager"));
    }

    #[test]
    fn manual_mode_and_notes() {
        let mut req = request();
        req.auto_advance = Some(false);
        req.notes = Some(" Keep it under budget ".into());
        req.scenario = Some("karaoke".into());
        let config = resolve(req).unwrap();
        assert_eq!(config.advance, AdvanceMode::Manual);
        assert_eq!(config.notes.as_deref(), Some("Keep it under budget"));
        assert_eq!(config.scenario.id, "business_meeting");
    }

    #[test]
    fn deserializes_wire_shape() {
        let req: CreateMeetingRequest = serde_json::from_str(
            r#"{
                "topic": "Launch",
                "participants": [
                    {"id": "a", "name": "A", "title": "T", "isActive": true},
                    {"id": "b", "name": "B", "title": "T"}
                ],
                "rounds": 2,
                "additionalNotes": "be bold",
                "autoAdvance": false
            }"#,
        )
        .unwrap();
        assert_eq!(req.participants.len(), 2);
        assert_eq!(req.notes.as_deref(), Some("be bold"));
        assert_eq!(req.auto_advance, Some(false));
    }
}
