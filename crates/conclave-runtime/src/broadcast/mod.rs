//! Per-session fan-out of meeting events to observers.

pub mod connection;
pub mod manager;

pub use connection::ObserverConnection;
pub use manager::BroadcastManager;
