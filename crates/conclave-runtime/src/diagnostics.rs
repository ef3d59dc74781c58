//! Generator diagnostics: a reachability check and a one-off test reply.

use chrono::{DateTime, Utc};
use conclave_llm::{GenerationError, TextGenerator};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Prompt sent by the reachability check.
const CHECK_PROMPT: &str = "Reply with a short test response.";

/// Topic used when a test message names none.
pub const DEFAULT_TEST_TOPIC: &str = "Test topic";

/// Error text is cut to this many characters.
const MAX_ERROR_CHARS: usize = 200;

const TEST_TEMPERATURE: f64 = 0.7;

/// Result of probing the configured generator with one short call.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratorCheck {
    /// Always `"ok"`: the server itself answered.
    pub status: &'static str,
    /// When the check ran.
    pub timestamp: DateTime<Utc>,
    /// Backend name.
    pub generator: String,
    /// Whether the backend has credentials at all.
    pub api_key_set: bool,
    /// Outcome of the test call.
    pub backend: BackendStatus,
}

/// Outcome of the test call inside a [`GeneratorCheck`].
#[derive(Debug, Clone, Serialize)]
pub struct BackendStatus {
    /// The call returned text.
    pub connected: bool,
    /// Generated text on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    /// Failure text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Failure category.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<&'static str>,
}

/// Body of a one-off test generation.
#[derive(Debug, Clone, Deserialize)]
pub struct TestMessageRequest {
    /// User message sent to the generator.
    pub message: String,
    /// Discussion topic framing the reply.
    #[serde(default)]
    pub topic: Option<String>,
}

/// Result of a one-off test generation.
#[derive(Debug, Clone, Serialize)]
pub struct TestMessageReply {
    /// Whether the generator produced text.
    pub success: bool,
    /// Generated text on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Failure text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Failure category.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<&'static str>,
    /// Topic the reply was framed with.
    pub topic: String,
    /// When the reply was produced.
    pub timestamp: DateTime<Utc>,
}

/// Make one short call against `generator` and report what happened.
pub async fn check_generator(generator: &dyn TextGenerator) -> GeneratorCheck {
    let result = generator
        .generate(&assistant_system(DEFAULT_TEST_TOPIC), CHECK_PROMPT, TEST_TEMPERATURE)
        .await;
    let (api_key_set, backend) = match result {
        Ok(text) => {
            info!(generator = generator.name(), "generator check succeeded");
            (
                true,
                BackendStatus {
                    connected: true,
                    response: Some(text.trim().to_string()),
                    reason: None,
                    error_type: None,
                },
            )
        }
        Err(e) => {
            warn!(generator = generator.name(), category = e.category(), error = %e, "generator check failed");
            (
                !matches!(e, GenerationError::NotConfigured { .. }),
                BackendStatus {
                    connected: false,
                    response: None,
                    reason: Some(truncate(&e.to_string())),
                    error_type: Some(e.category()),
                },
            )
        }
    };
    GeneratorCheck {
        status: "ok",
        timestamp: Utc::now(),
        generator: generator.name().to_string(),
        api_key_set,
        backend,
    }
}

/// Generate one assistant reply to `request.message`.
pub async fn test_message(generator: &dyn TextGenerator, request: TestMessageRequest) -> TestMessageReply {
    let topic = request
        .topic
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_TEST_TOPIC.to_string());
    let result = generator
        .generate(&assistant_system(&topic), &request.message, TEST_TEMPERATURE)
        .await;
    match result {
        Ok(text) => TestMessageReply {
            success: true,
            message: Some(text.trim().to_string()),
            error: None,
            error_type: None,
            topic,
            timestamp: Utc::now(),
        },
        Err(e) => {
            warn!(generator = generator.name(), category = e.category(), error = %e, "test message failed");
            TestMessageReply {
                success: false,
                message: None,
                error: Some(truncate(&e.to_string())),
                error_type: Some(e.category()),
                topic,
                timestamp: Utc::now(),
            }
        }
    }
}

fn assistant_system(topic: &str) -> String {
    format!(
        "You are a meeting assistant taking part in a discussion about \"{topic}\". \
         Reply in a professional but friendly tone."
    )
}

fn truncate(text: &str) -> String {
    text.chars().take(MAX_ERROR_CHARS).collect()
}
