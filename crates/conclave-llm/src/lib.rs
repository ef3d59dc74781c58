//! # conclave-llm
//!
//! Generative text backends.
//!
//! - [`generator`]: the [`TextGenerator`] contract and [`GenerationError`]
//! - [`openai`]: OpenAI-compatible chat-completions adapter over `reqwest`
//! - [`offline`]: generator used when no backend is configured
//! - [`mock`]: scripted generator for tests and demos
//!
//! ## Crate Position
//!
//! Depends on nothing internal. Consumed by conclave-runtime and the binary.

#![deny(unsafe_code)]

pub mod generator;
pub mod mock;
pub mod offline;
pub mod openai;

pub use generator::{GenerationError, GenerationResult, TextGenerator};
pub use offline::OfflineGenerator;
pub use openai::{OpenAiConfig, OpenAiGenerator};
