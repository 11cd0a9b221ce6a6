//! Router assembly: the spec-mandated `/healthz` introspection endpoint
//! (spec §6), the ambient `/metrics` Prometheus scrape (SPEC_FULL.md
//! §10.4), and the `/ws` WebSocket front door (spec §4.1).

use axum::{
    extract::State,
    http::Method,
    middleware,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::auth_middleware;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use crate::websocket::ws_handler;

pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer();

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_handler))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// The gateway has no browser-facing static assets of its own (the static
/// web reference client is an external collaborator per spec §1), so CORS
/// only needs to be permissive enough for a client page served elsewhere
/// to open the WebSocket.
fn build_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any)
}

#[derive(Debug, Serialize)]
struct HealthzResponse {
    status: &'static str,
    engine: &'static str,
    engine_resolved: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model_sample_rate: Option<u32>,
    uptime_s: u64,
    sessions_active: usize,
}

/// `GET /healthz` (spec §6).
async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    let native = state.engine.native_spec();
    Json(HealthzResponse {
        status: "ok",
        engine: state.engine.engine_kind(),
        engine_resolved: state.engine.resolved_model(),
        model_sample_rate: Some(native.sample_rate),
        uptime_s: state.uptime_seconds(),
        sessions_active: state.registry.active_count(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, OnceLock};
    use ws_tts_config::Settings;
    use ws_tts_engine::DummyEngine;

    // The Prometheus recorder is process-global; install it once and reuse
    // the handle across tests instead of panicking on a second install.
    static METRICS: OnceLock<metrics_exporter_prometheus::PrometheusHandle> = OnceLock::new();

    fn test_state() -> AppState {
        let settings = Settings::default();
        let engine = Arc::new(DummyEngine::new(settings.engine.dummy_native_sample_rate));
        let handle = METRICS.get_or_init(crate::metrics::init_metrics).clone();
        AppState::new(settings, engine, handle)
    }

    #[test]
    fn router_builds() {
        let _ = create_router(test_state());
    }

    #[tokio::test]
    async fn healthz_reports_dummy_engine() {
        let state = test_state();
        let response = healthz(State(state)).await.into_response();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }
}
