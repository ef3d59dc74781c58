//! OpenAI-compatible chat-completions adapter.
//!
//! Works against any server exposing `POST {base_url}/chat/completions` with
//! the OpenAI request/response shape. Only the first choice is used.

use std::time::Instant;

use async_trait::async_trait;
use metrics::{counter, histogram};
use reqwest::StatusCode;
use reqwest::header::RETRY_AFTER;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::generator::{GenerationError, GenerationResult, TextGenerator};

const DEFAULT_RETRY_AFTER_MS: u64 = 5_000;

/// Connection parameters for the adapter.
#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    /// API root, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    /// Bearer token.
    pub api_key: String,
    /// Model identifier.
    pub model: String,
    /// Token cap per completion.
    pub max_tokens: u32,
}

/// [`TextGenerator`] backed by a chat-completions endpoint.
pub struct OpenAiGenerator {
    client: reqwest::Client,
    config: OpenAiConfig,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f64,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiGenerator {
    /// Create an adapter with a fresh HTTP client.
    pub fn new(config: OpenAiConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    /// Create an adapter sharing an existing HTTP client.
    pub fn with_client(client: reqwest::Client, mut config: OpenAiConfig) -> Self {
        config.base_url = config.base_url.trim_end_matches('/').to_string();
        Self { client, config }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url)
    }

    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f64,
    ) -> GenerationResult<String> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            temperature,
            max_tokens: self.config.max_tokens,
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let retry_after_ms = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map_or(DEFAULT_RETRY_AFTER_MS, |secs| secs * 1000);
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &body, retry_after_ms));
        }

        let body: ChatResponse = response.json().await?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or(GenerationError::EmptyResponse)
    }
}

/// Map a non-success response to a [`GenerationError`].
fn classify_failure(status: StatusCode, body: &str, retry_after_ms: u64) -> GenerationError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| json["error"]["message"].as_str().map(String::from))
        .unwrap_or_else(|| format!("HTTP {}: {body}", status.as_u16()));

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GenerationError::Auth { message },
        StatusCode::TOO_MANY_REQUESTS => GenerationError::RateLimited {
            retry_after_ms,
            message,
        },
        _ => GenerationError::Api {
            status: status.as_u16(),
            message,
            retryable: status.is_server_error(),
        },
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f64,
    ) -> GenerationResult<String> {
        debug!(model = %self.config.model, temperature, "requesting completion");
        let started = Instant::now();
        let result = self.complete(system_prompt, user_prompt, temperature).await;
        histogram!("llm_request_duration_seconds").record(started.elapsed().as_secs_f64());

        match &result {
            Ok(_) => counter!("llm_requests_total", "status" => "ok").increment(1),
            Err(e) => {
                counter!("llm_requests_total", "status" => e.category()).increment(1);
                warn!(model = %self.config.model, error = %e, "completion failed");
            }
        }
        result
    }
}
