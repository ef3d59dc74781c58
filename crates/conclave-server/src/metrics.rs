//! Prometheus metrics recorder and `/metrics` rendering.
//!
//! Metric names live in `conclave_runtime::metrics`.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the global Prometheus recorder.
///
/// Call once at startup; a second install fails because a global recorder
/// is already set.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from `handle`.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_from_local_recorder() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            metrics::counter!(conclave_runtime::metrics::SESSIONS_CREATED_TOTAL).increment(2);
        });
        let text = render(&handle);
        assert!(text.contains("meeting_sessions_created_total 2"), "{text}");
    }
}
