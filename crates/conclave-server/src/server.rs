//! `ConclaveServer`: axum router, shared state and listener.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use conclave_core::{ControlCommand, SessionId, Utterance};
use conclave_runtime::{
    CommandOutcome, CreateMeetingRequest, GeneratorCheck, MeetingOrchestrator, ScenarioSummary,
    SessionSnapshot, SessionSummary, TestMessageReply, TestMessageRequest,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::errors::ApiError;
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::run_observer_session;

/// Default page size for transcript queries.
const DEFAULT_PAGE_SIZE: usize = 100;

/// Shared state for axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Session facade.
    pub orchestrator: Arc<MeetingOrchestrator>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Server start time (for uptime).
    pub start_time: Instant,
    /// Prometheus handle, when a recorder is installed.
    pub metrics_handle: Option<PrometheusHandle>,
    /// Listener configuration.
    pub config: Arc<ServerConfig>,
}

/// The HTTP + WebSocket server.
pub struct ConclaveServer {
    config: Arc<ServerConfig>,
    orchestrator: Arc<MeetingOrchestrator>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics_handle: Option<PrometheusHandle>,
    start_time: Instant,
}

impl ConclaveServer {
    /// Create a server around `orchestrator`.
    pub fn new(config: ServerConfig, orchestrator: Arc<MeetingOrchestrator>) -> Self {
        Self {
            config: Arc::new(config),
            orchestrator,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            metrics_handle: None,
            start_time: Instant::now(),
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }

    /// Build the axum router.
    pub fn router(&self) -> Router {
        let state = AppState {
            orchestrator: Arc::clone(&self.orchestrator),
            shutdown: Arc::clone(&self.shutdown),
            start_time: self.start_time,
            metrics_handle: self.metrics_handle.clone(),
            config: Arc::clone(&self.config),
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/api/scenarios", get(scenarios_handler))
            .route("/api/test", get(generator_check_handler))
            .route("/api/test/message", post(test_message_handler))
            .route("/api/conference", get(list_handler))
            .route("/api/conference/start", post(start_handler))
            .route("/api/conference/{id}", get(snapshot_handler))
            .route("/api/conference/{id}/messages", get(messages_handler))
            .route("/api/conference/{id}/control", post(control_handler))
            .route("/ws/conference/{id}", get(ws_handler))
            .layer(cors_layer(&self.config.cors_origins))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind the configured address and serve until shutdown is signalled.
    ///
    /// Returns the bound address (useful with port 0) and the serve task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(self.config.bind_address()).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %e, "server error");
            }
        });
        info!(%addr, "conclave server listening");
        Ok((addr, handle))
    }

    /// Session facade.
    pub fn orchestrator(&self) -> &Arc<MeetingOrchestrator> {
        &self.orchestrator
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Listener configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods(Any)
        .allow_headers(Any)
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.orchestrator.broadcast().connection_count(),
        state.orchestrator.session_count(),
    ))
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics_handle {
        Some(handle) => crate::metrics::render(handle).into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

async fn scenarios_handler(State(state): State<AppState>) -> Json<Vec<ScenarioSummary>> {
    Json(state.orchestrator.scenarios())
}

async fn generator_check_handler(State(state): State<AppState>) -> Json<GeneratorCheck> {
    Json(state.orchestrator.check_generator().await)
}

async fn test_message_handler(
    State(state): State<AppState>,
    Json(request): Json<TestMessageRequest>,
) -> Result<Json<TestMessageReply>, ApiError> {
    Ok(Json(state.orchestrator.test_message(request).await?))
}

async fn list_handler(State(state): State<AppState>) -> Json<Vec<SessionSummary>> {
    Json(state.orchestrator.list_sessions())
}

/// Body returned by `POST /api/conference/start`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    /// Always `true`; failures use the error body.
    pub success: bool,
    /// New session id.
    pub conference_id: SessionId,
    /// Human-readable status line.
    pub message: String,
}

async fn start_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateMeetingRequest>,
) -> Result<Json<StartResponse>, ApiError> {
    let id = state.orchestrator.create_session(request)?;
    Ok(Json(StartResponse {
        success: true,
        conference_id: id,
        message: "Conference started".into(),
    }))
}

async fn snapshot_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    Ok(Json(state.orchestrator.snapshot(&SessionId::from(id))?))
}

/// Paging parameters for the transcript endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    /// Maximum utterances returned.
    pub limit: Option<usize>,
    /// Utterances to skip from the start.
    pub offset: Option<usize>,
}

/// One page of a transcript.
#[derive(Debug, Serialize)]
pub struct MessagesPage {
    /// Transcript length.
    pub total: usize,
    /// Requested slice.
    pub messages: Vec<Utterance>,
}

async fn messages_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(page): Query<PageQuery>,
) -> Result<Json<MessagesPage>, ApiError> {
    let (total, messages) = state.orchestrator.messages(
        &SessionId::from(id),
        page.offset.unwrap_or(0),
        page.limit.unwrap_or(DEFAULT_PAGE_SIZE),
    )?;
    Ok(Json(MessagesPage { total, messages }))
}

/// Body returned by `POST /api/conference/{id}/control`.
#[derive(Debug, Serialize)]
pub struct ControlResponse {
    /// Always `true`; failures use the error body.
    pub success: bool,
    /// Whether the command changed anything.
    pub applied: bool,
    /// Why an ignored command had no effect.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

async fn control_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(command): Json<ControlCommand>,
) -> Result<Json<ControlResponse>, ApiError> {
    let outcome = state
        .orchestrator
        .handle_command(&SessionId::from(id), command)?;
    let (applied, reason) = match outcome {
        CommandOutcome::Applied => (true, None),
        CommandOutcome::Ignored(reason) => (false, Some(reason)),
    };
    Ok(Json(ControlResponse {
        success: true,
        applied,
        reason,
    }))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    let session_id = SessionId::from(id);
    let orchestrator = Arc::clone(&state.orchestrator);
    let config = Arc::clone(&state.config);
    let shutdown = state.shutdown.token();
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| {
            run_observer_session(socket, session_id, orchestrator, config, shutdown)
        })
}
