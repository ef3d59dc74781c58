//! Scripted generator for deterministic tests without a backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::generator::{GenerationError, GenerationResult, TextGenerator};

/// One recorded call.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationCall {
    /// System prompt passed in.
    pub system_prompt: String,
    /// User prompt passed in.
    pub user_prompt: String,
    /// Sampling temperature passed in.
    pub temperature: f64,
}

type Responder = dyn Fn(&GenerationCall, usize) -> GenerationResult<String> + Send + Sync;

/// Generator whose replies come from a closure, with every call recorded.
pub struct ScriptedGenerator {
    responder: Box<Responder>,
    delay: Option<Duration>,
    calls: Mutex<Vec<GenerationCall>>,
    call_count: AtomicUsize,
}

impl ScriptedGenerator {
    /// Reply to every call with `responder(call, index)`.
    pub fn from_fn(
        responder: impl Fn(&GenerationCall, usize) -> GenerationResult<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            delay: None,
            calls: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        }
    }

    /// Reply `"Scripted reply N."` to the N-th call (0-based).
    pub fn numbered() -> Self {
        Self::from_fn(|_, n| Ok(format!("Scripted reply {n}.")))
    }

    /// Fail every call.
    pub fn failing() -> Self {
        Self::from_fn(|_, n| {
            Err(GenerationError::Other {
                message: format!("scripted failure {n}"),
            })
        })
    }

    /// Sleep for `delay` before answering each call.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of calls so far.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Copy of every recorded call in order.
    pub fn calls(&self) -> Vec<GenerationCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f64,
    ) -> GenerationResult<String> {
        let index = self.call_count.fetch_add(1, Ordering::Relaxed);
        let call = GenerationCall {
            system_prompt: system_prompt.to_string(),
            user_prompt: user_prompt.to_string(),
            temperature,
        };
        self.calls.lock().push(call.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.responder)(&call, index)
    }
}
