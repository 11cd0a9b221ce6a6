//! TTS streaming gateway entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use ws_tts_config::{EngineKind, Settings};
use ws_tts_core::{AudioEncoding, AudioSpec, Channels, TtsEngine};
use ws_tts_engine::{DummyEngine, PiperEngine};
use ws_tts_server::{create_router, init_metrics, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().unwrap_or_else(|err| {
        eprintln!("failed to load configuration: {err}. Using defaults.");
        Settings::default()
    });

    init_tracing();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting ws-tts-gateway");

    let metrics_handle = init_metrics();
    tracing::info!("Prometheus metrics initialized at /metrics");

    let engine = build_engine(&settings)?;
    tracing::info!(
        engine = engine.engine_kind(),
        native_sample_rate = engine.native_spec().sample_rate,
        "engine ready"
    );

    let addr = SocketAddr::from((
        settings
            .server
            .host
            .parse::<std::net::IpAddr>()
            .unwrap_or_else(|_| std::net::IpAddr::from([0, 0, 0, 0])),
        settings.server.port,
    ));
    let app = create_router(AppState::new(settings, engine, metrics_handle));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

/// Builds the configured `TtsEngine` (SPEC_FULL.md §10.6). `riva` is named
/// in the environment enum for forward compatibility but is not
/// implemented; selecting it is a fatal startup error rather than a silent
/// fallback.
fn build_engine(settings: &Settings) -> anyhow::Result<Arc<dyn TtsEngine>> {
    match settings.engine.kind {
        EngineKind::Dummy => Ok(Arc::new(DummyEngine::new(settings.engine.dummy_native_sample_rate))),
        EngineKind::Piper => {
            let native_spec = AudioSpec::new(
                settings.engine.piper_native_sample_rate,
                Channels::Mono,
                AudioEncoding::Pcm16Raw,
            )?;
            Ok(Arc::new(PiperEngine::new(
                settings.engine.piper_binary_path.clone(),
                settings.engine.piper_model_path.clone(),
                native_spec,
                num_cpus_hint(),
            )))
        }
        EngineKind::Riva => Err(ws_tts_engine::riva::unsupported().into()),
    }
}

/// Piper is single-threaded per subprocess; this bounds how many run
/// concurrently rather than letting every session spawn its own (spec §5).
fn num_cpus_hint() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "ws_tts=info,tower_http=info".into());

    let json = std::env::var("WS_TTS_LOG_JSON")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let fmt_layer = if json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry().with(env_filter).with(fmt_layer).init();
}
