//! The text generation contract.

use async_trait::async_trait;

/// Errors a [`TextGenerator`] can return.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// Transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body could not be decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Credentials rejected.
    #[error("authentication failed: {message}")]
    Auth {
        /// Error message.
        message: String,
    },

    /// Backend asked us to slow down.
    #[error("rate limited: {message}")]
    RateLimited {
        /// Suggested wait before retrying.
        retry_after_ms: u64,
        /// Error message.
        message: String,
    },

    /// Non-success status from the backend.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message.
        message: String,
        /// Whether a retry could succeed.
        retryable: bool,
    },

    /// The backend answered without any text.
    #[error("empty response")]
    EmptyResponse,

    /// No backend is configured.
    #[error("generator not configured: {message}")]
    NotConfigured {
        /// Error message.
        message: String,
    },

    /// Anything else.
    #[error("{message}")]
    Other {
        /// Error message.
        message: String,
    },
}

impl GenerationError {
    /// Whether the same call could succeed later.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::Api { retryable, .. } => *retryable,
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// Short category label for logs and metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Http(_) => "network",
            Self::Json(_) | Self::EmptyResponse => "malformed_response",
            Self::Auth { .. } => "auth",
            Self::RateLimited { .. } => "rate_limit",
            Self::Api { .. } => "api",
            Self::NotConfigured { .. } => "not_configured",
            Self::Other { .. } => "unknown",
        }
    }
}

/// Result alias for generation calls.
pub type GenerationResult<T> = Result<T, GenerationError>;

/// Produces text for one utterance.
///
/// Calls may be slow and may fail; callers decide how to degrade.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Generate a reply to `user_prompt` under `system_prompt`.
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f64,
    ) -> GenerationResult<String>;
}
