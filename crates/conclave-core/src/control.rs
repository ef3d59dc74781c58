//! Control commands sent by observers.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// A tagged control payload received on an observer connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlCommand {
    /// Move on to the next round, or to the conclusion after the last one.
    #[serde(rename = "next_round")]
    AdvanceRound,
    /// Force the session to end.
    #[serde(rename = "end_conference")]
    EndSession,
    /// Halt at the next check point.
    #[serde(rename = "pause_conference")]
    PauseSession,
    /// Continue where the pause interrupted.
    #[serde(rename = "resume_conference")]
    ResumeSession,
}

impl ControlCommand {
    /// Parse an inbound text frame.
    ///
    /// Unknown or malformed payloads are logged and yield `None`.
    pub fn parse(text: &str) -> Option<Self> {
        match serde_json::from_str(text) {
            Ok(command) => Some(command),
            Err(error) => {
                warn!(%error, payload_len = text.len(), "ignoring unrecognized control payload");
                None
            }
        }
    }

    /// Wire name of the command.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AdvanceRound => "next_round",
            Self::EndSession => "end_conference",
            Self::PauseSession => "pause_conference",
            Self::ResumeSession => "resume_conference",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn parses_every_command() {
        assert_matches!(
            ControlCommand::parse(r#"{"type":"next_round"}"#),
            Some(ControlCommand::AdvanceRound)
        );
        assert_matches!(
            ControlCommand::parse(r#"{"type":"end_conference"}"#),
            Some(ControlCommand::EndSession)
        );
        assert_matches!(
            ControlCommand::parse(r#"{"type":"pause_conference"}"#),
            Some(ControlCommand::PauseSession)
        );
        assert_matches!(
            ControlCommand::parse(r#"{"type":"resume_conference"}"#),
            Some(ControlCommand::ResumeSession)
        );
    }

    #[test]
    fn tolerates_extra_fields() {
        assert_matches!(
            ControlCommand::parse(r#"{"type":"next_round","from":"ui"}"#),
            Some(ControlCommand::AdvanceRound)
        );
    }

    #[test]
    fn rejects_unknown_and_malformed() {
        assert!(ControlCommand::parse(r#"{"type":"dance"}"#).is_none());
        assert!(ControlCommand::parse("not json").is_none());
        assert!(ControlCommand::parse(r#"{"kind":"next_round"}"#).is_none());
    }

    #[test]
    fn round_trips_wire_name() {
        let json = serde_json::to_value(ControlCommand::PauseSession).unwrap();
        assert_eq!(json["type"], ControlCommand::PauseSession.as_str());
    }
}
