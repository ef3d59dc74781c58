//! # conclave-server
//!
//! HTTP and WebSocket surface over the meeting runtime.
//!
//! - `server`: axum router, shared state and listener
//! - `websocket`: observer connection lifecycle (events out, control commands in)
//! - `errors`: mapping of runtime errors onto HTTP responses
//! - `health`: `/health` payload
//! - `metrics`: Prometheus recorder and `/metrics` rendering
//! - `shutdown`: cancellation-token based shutdown coordination
//! - `config`: listener configuration derived from settings
//!
//! ## Crate Position
//!
//! Depends on conclave-core, conclave-settings and conclave-runtime.
//! Depended on by the `conclave` binary.

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use errors::ApiError;
pub use server::{AppState, ConclaveServer};
pub use shutdown::ShutdownCoordinator;
