//! Observer WebSocket connections.

pub mod session;

pub use session::run_observer_session;
