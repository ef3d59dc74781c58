//! Server configuration.

use std::time::Duration;

use conclave_settings::ServerSettings;
use serde::{Deserialize, Serialize};

/// Configuration for the conclave server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Allowed CORS origins; empty means any origin.
    pub cors_origins: Vec<String>,
    /// Per-observer outbound queue capacity.
    pub outbound_buffer: usize,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Ping interval in milliseconds.
    pub ping_interval_ms: u64,
    /// Missed-pong multiple after which an observer is dropped.
    pub pong_timeout_intervals: u32,
}

impl ServerConfig {
    /// Listener configuration from loaded settings.
    pub fn from_settings(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            cors_origins: settings.cors_origins.clone(),
            outbound_buffer: settings.outbound_buffer.max(1),
            max_message_size: settings.max_message_bytes,
            ping_interval_ms: settings.ping_interval_ms.max(1),
            ..Self::default()
        }
    }

    /// `host:port` bind address.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Interval between pings.
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    /// Silence after which an observer counts as dead.
    pub fn pong_timeout(&self) -> Duration {
        self.ping_interval() * self.pong_timeout_intervals
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            cors_origins: Vec::new(),
            outbound_buffer: 256,
            max_message_size: 64 * 1024,
            ping_interval_ms: 30_000,
            pong_timeout_intervals: 3,
        }
    }
}
