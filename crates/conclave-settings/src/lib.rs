//! # conclave-settings
//!
//! Layered configuration for the conclave meeting server.
//!
//! Settings are resolved from three layers (in priority order):
//! 1. **Compiled defaults**: [`ConclaveSettings::default()`]
//! 2. **User file**: `~/.conclave/settings.json`, deep-merged over defaults
//! 3. **Environment variables**: `CONCLAVE_*` and `OPENAI_API_KEY` (highest priority)
//!
//! The resolved value is handed to each component explicitly; there is no
//! process-wide settings global.
//!
//! ## Crate Position
//!
//! Leaf crate. Consumed by conclave-runtime, conclave-server and the binary.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides_from, deep_merge, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::*;
