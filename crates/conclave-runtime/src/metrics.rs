//! Metric names recorded by the runtime and the server.

/// Sessions created since start.
pub const SESSIONS_CREATED_TOTAL: &str = "meeting_sessions_created_total";
/// Sessions whose loop is running.
pub const SESSIONS_ACTIVE: &str = "meeting_sessions_active";
/// Utterances appended, labelled by `kind` (`generated`, `templated`, `fallback`).
pub const UTTERANCES_TOTAL: &str = "meeting_utterances_total";
/// Failed generations, labelled by `category`.
pub const GENERATION_FAILURES_TOTAL: &str = "meeting_generation_failures_total";
/// Wall time of one generation call.
pub const GENERATION_DURATION_SECONDS: &str = "meeting_generation_duration_seconds";
/// Open observer connections.
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Events that could not be queued for an observer.
pub const WS_BROADCAST_DROPS_TOTAL: &str = "ws_broadcast_drops_total";
/// Inbound observer frames.
pub const WS_MESSAGES_RECEIVED_TOTAL: &str = "ws_messages_received_total";
