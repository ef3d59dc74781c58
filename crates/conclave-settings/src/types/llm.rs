//! Generative text backend settings.

use serde::{Deserialize, Serialize};

/// OpenAI-compatible chat-completions backend.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LlmSettings {
    /// API root, without the trailing `/chat/completions`.
    pub base_url: String,
    /// Model identifier.
    pub model: String,
    /// Token cap per generated utterance.
    pub max_tokens: u32,
    /// Bearer token. Read from the environment, never written back to disk.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            max_tokens: 300,
            api_key: None,
        }
    }
}
