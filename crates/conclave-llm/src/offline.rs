//! Generator used when no backend is configured.

use async_trait::async_trait;

use crate::generator::{GenerationError, GenerationResult, TextGenerator};

/// Fails every call with [`GenerationError::NotConfigured`].
///
/// Meetings still run end to end; every generated line becomes a visible
/// fallback line.
#[derive(Debug, Clone)]
pub struct OfflineGenerator {
    reason: String,
}

impl OfflineGenerator {
    /// Create a generator that reports `reason` on every call.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl Default for OfflineGenerator {
    fn default() -> Self {
        Self::new("no API key configured")
    }
}

#[async_trait]
impl TextGenerator for OfflineGenerator {
    fn name(&self) -> &str {
        "offline"
    }

    async fn generate(&self, _system: &str, _user: &str, _temperature: f64) -> GenerationResult<String> {
        Err(GenerationError::NotConfigured {
            message: self.reason.clone(),
        })
    }
}
