//! Prometheus metrics (SPEC_FULL.md §10.4, ambient addition alongside the
//! spec-mandated `/healthz`): gauges for active sessions (overall and by
//! lifecycle state) plus the counters `ws-tts-session` records directly
//! against the names in `ws_tts_core::metrics`.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub use ws_tts_core::metrics::{
    CHUNKS_EMITTED, ENGINE_ERRORS, SESSIONS_ACTIVE, SESSIONS_ACTIVE_BY_STATE, SESSIONS_BACKPRESSURE,
    SESSIONS_CANCELLED, SESSIONS_CREATED,
};

/// Installs the global Prometheus recorder and returns the handle used by
/// the `/metrics` handler to render the text-format scrape.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Handler for `GET /metrics`.
pub async fn metrics_handler(
    axum::extract::State(state): axum::extract::State<crate::state::AppState>,
) -> String {
    metrics::gauge!(SESSIONS_ACTIVE).set(state.registry.active_count() as f64);
    for (session_state, count) in state.registry.counts_by_state() {
        metrics::gauge!(SESSIONS_ACTIVE_BY_STATE, "state" => session_state.metric_label())
            .set(count as f64);
    }
    state.metrics_handle.render()
}
