use std::sync::Arc;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusHandle;
use tokio::sync::watch;

use ws_tts_config::Settings;
use ws_tts_core::TtsEngine;
use ws_tts_session::{AdmissionParams, SessionManager, SessionParams};

/// Shared application state handed to every axum handler (spec §4.1, §4.6).
/// Cheaply cloneable: everything inside is already behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub engine: Arc<dyn TtsEngine>,
    pub registry: Arc<SessionManager>,
    pub session_params: SessionParams,
    pub metrics_handle: PrometheusHandle,
    started_at: Instant,
    /// Keeps the registry's reap task alive; dropping this sender would
    /// make the task's `watch::Receiver::changed()` resolve immediately
    /// and forever, spinning the reap loop.
    _reap_shutdown: Arc<watch::Sender<bool>>,
}

impl AppState {
    pub fn new(settings: Settings, engine: Arc<dyn TtsEngine>, metrics_handle: PrometheusHandle) -> Self {
        let admission = AdmissionParams {
            max_sessions: settings.admission.max_sessions,
            max_sessions_per_key: settings.admission.max_sessions_per_key,
        };
        let session_params = SessionParams {
            resume_grace: std::time::Duration::from_secs(settings.session.resume_grace_seconds),
            queue_capacity: settings.session.queue_capacity,
            backpressure_timeout: std::time::Duration::from_millis(
                settings.session.backpressure_timeout_ms,
            ),
            write_timeout: std::time::Duration::from_millis(settings.session.write_timeout_ms),
            idle_read_timeout: std::time::Duration::from_millis(
                settings.session.idle_read_timeout_ms,
            ),
            retention_ring_size: settings.session.retention_ring_size,
            retention_window: std::time::Duration::from_secs(
                settings.session.retention_window_seconds,
            ),
            chunk_max_millis: settings.session.chunk_max_millis,
        };
        let registry = Arc::new(SessionManager::new(admission));
        let reap_shutdown = registry.start_reap_task();

        Self {
            settings: Arc::new(settings),
            engine,
            registry,
            session_params,
            metrics_handle,
            started_at: Instant::now(),
            _reap_shutdown: Arc::new(reap_shutdown),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
