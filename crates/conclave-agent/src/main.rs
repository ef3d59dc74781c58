//! # conclave
//!
//! Meeting orchestrator binary: loads settings, wires the generator, the
//! scenario catalog and the orchestrator, and serves HTTP/WebSocket until
//! Ctrl-C.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use conclave_llm::{OfflineGenerator, OpenAiConfig, OpenAiGenerator, TextGenerator};
use conclave_runtime::{MeetingOrchestrator, ScenarioCatalog};
use conclave_server::{ConclaveServer, ServerConfig};
use conclave_settings::{ConclaveSettings, LlmSettings, MeetingSettings};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How long live sessions get to stop after Ctrl-C.
const SESSION_GRACE: Duration = Duration::from_secs(5);

/// Upper bound on the time between retention sweeps.
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Multi-role meeting orchestrator.
#[derive(Parser, Debug)]
#[command(name = "conclave", about = "Multi-role meeting orchestrator")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (default `~/.conclave/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log filter when `RUST_LOG` is unset (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    json_logs: bool,

    /// Directory of extra scenario `*.json` files (overrides settings).
    #[arg(long)]
    scenario_dir: Option<PathBuf>,
}

impl Cli {
    /// Apply command-line overrides on top of loaded settings.
    fn apply(&self, settings: &mut ConclaveSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.json_logs {
            settings.logging.json = true;
        }
        if let Some(dir) = &self.scenario_dir {
            settings.meeting.scenario_dir = Some(dir.to_string_lossy().into_owned());
        }
    }
}

/// The chat-completions adapter when an API key is configured, otherwise a
/// generator that always fails so every generated line becomes a fallback.
fn build_generator(llm: &LlmSettings) -> Arc<dyn TextGenerator> {
    match llm.api_key.as_deref().filter(|key| !key.trim().is_empty()) {
        Some(api_key) => {
            tracing::info!(model = %llm.model, base_url = %llm.base_url, "using chat-completions backend");
            Arc::new(OpenAiGenerator::new(OpenAiConfig {
                base_url: llm.base_url.clone(),
                api_key: api_key.to_string(),
                model: llm.model.clone(),
                max_tokens: llm.max_tokens,
            }))
        }
        None => {
            tracing::warn!("no API key configured, generated lines will be fallbacks");
            Arc::new(OfflineGenerator::new("no API key configured"))
        }
    }
}

/// Built-in scenarios plus any found in the configured directory.
fn build_catalog(settings: &MeetingSettings) -> Result<ScenarioCatalog> {
    let mut catalog = ScenarioCatalog::builtin();
    if let Some(dir) = settings.scenario_dir.as_deref() {
        let loaded = catalog
            .load_dir(Path::new(dir))
            .with_context(|| format!("Failed to load scenarios from {dir}"))?;
        tracing::info!(dir, loaded, "loaded scenario files");
    }
    Ok(catalog.with_default(&settings.default_scenario))
}

/// Time between retention sweeps for a given retention window.
fn sweep_interval(retention: Duration) -> Duration {
    (retention / 4).clamp(Duration::from_secs(1), MAX_SWEEP_INTERVAL)
}

/// Periodically evict sessions finished longer than `retention` ago.
fn spawn_sweeper(
    orchestrator: Arc<MeetingOrchestrator>,
    retention: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval(retention));
        let _ = ticker.tick().await;
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let _ = orchestrator.sweep_finished(retention);
                }
            }
        }
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings_path = args
        .settings
        .clone()
        .unwrap_or_else(conclave_settings::settings_path);
    let mut settings = conclave_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;
    args.apply(&mut settings);

    conclave_core::logging::init_subscriber(&settings.logging.level, settings.logging.json);

    let metrics_handle = match conclave_server::metrics::install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "metrics recorder unavailable, /metrics disabled");
            None
        }
    };

    let generator = build_generator(&settings.llm);
    let catalog = build_catalog(&settings.meeting)?;
    let orchestrator = Arc::new(MeetingOrchestrator::new(
        settings.meeting.clone(),
        catalog,
        generator,
    ));

    let mut server = ConclaveServer::new(
        ServerConfig::from_settings(&settings.server),
        Arc::clone(&orchestrator),
    );
    if let Some(handle) = metrics_handle {
        server = server.with_metrics(handle);
    }

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!("conclave listening on http://{addr}");

    let sweeper = spawn_sweeper(
        Arc::clone(&orchestrator),
        Duration::from_secs(settings.meeting.session_retention_secs),
        server.shutdown().token(),
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("shutting down");
    orchestrator.shutdown(SESSION_GRACE).await;
    server
        .shutdown()
        .graceful_shutdown(vec![handle, sweeper], None)
        .await;

    tracing::info!("shutdown complete");
    Ok(())
}
