//! Runtime error types.

use conclave_llm::GenerationError;

/// Errors raised by meeting orchestration.
#[derive(Debug, thiserror::Error)]
pub enum MeetingError {
    /// Session-creation input was rejected; no session was created.
    #[error("validation failed: {0}")]
    Validation(String),

    /// No session with this id is registered.
    #[error("session not found: {0}")]
    UnknownSession(String),

    /// An utterance named a speaker outside the session roster.
    #[error("speaker {role_id} is not part of this session")]
    InvalidSpeaker {
        /// Offending role id.
        role_id: String,
    },

    /// Text generation failed.
    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),

    /// Scenario definitions could not be loaded.
    #[error("scenario config error: {0}")]
    Config(String),

    /// Internal / unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl MeetingError {
    /// Whether the error was caused by the caller's input.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::UnknownSession(_))
    }

    /// Error category string for logs and metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::UnknownSession(_) => "unknown_session",
            Self::InvalidSpeaker { .. } => "invalid_speaker",
            Self::Generation(_) => "generation",
            Self::Config(_) => "config",
            Self::Internal(_) => "internal",
        }
    }
}

/// Result alias for runtime operations.
pub type Result<T> = std::result::Result<T, MeetingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        let err = MeetingError::InvalidSpeaker {
            role_id: "ghost".into(),
        };
        assert_eq!(err.to_string(), "speaker ghost is not part of this session");
        assert_eq!(
            MeetingError::UnknownSession("abc".into()).to_string(),
            "session not found: abc"
        );
    }

    #[test]
    fn client_errors() {
        assert!(MeetingError::Validation("empty topic".into()).is_client_error());
        assert!(MeetingError::UnknownSession("x".into()).is_client_error());
        assert!(!MeetingError::Internal("boom".into()).is_client_error());
    }

    #[test]
    fn generation_converts() {
        let err: MeetingError = GenerationError::EmptyResponse.into();
        assert_eq!(err.category(), "generation");
    }
}
