//! End-to-end coverage driving the router through a real TCP socket with a
//! raw WebSocket client, matching the seed scenarios in spec §8.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

use ws_tts_config::Settings;
use ws_tts_engine::DummyEngine;
use ws_tts_server::{create_router, init_metrics, AppState};

// The Prometheus recorder is process-global (`metrics::set_global_recorder`
// can only succeed once); every test in this file shares one handle rather
// than each calling `init_metrics()` and panicking on the second install.
static METRICS: OnceLock<metrics_exporter_prometheus::PrometheusHandle> = OnceLock::new();

async fn spawn_gateway() -> String {
    let settings = Settings::default();
    let engine = Arc::new(DummyEngine::new(settings.engine.dummy_native_sample_rate));
    let metrics_handle = METRICS.get_or_init(init_metrics).clone();
    let app = create_router(AppState::new(settings, engine, metrics_handle));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("ws://{addr}/ws")
}

async fn recv_json(
    socket: &mut tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
) -> Value {
    loop {
        match socket.next().await.expect("stream ended early").unwrap() {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

/// S1: start -> text_delta -> text_end yields an ack, at least one audio
/// chunk whose unit range starts at zero, and a non-cancelled end.
#[tokio::test]
async fn baseline_stream_completes() {
    let url = spawn_gateway().await;
    let (mut socket, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

    socket
        .send(Message::Text(
            json!({
                "type": "start",
                "audio_format": "pcm16_raw",
                "sample_rate": 16000,
                "channels": 1
            })
            .to_string(),
        ))
        .await
        .unwrap();

    let ack = recv_json(&mut socket).await;
    assert_eq!(ack["type"], "start_ack");
    let session_id = ack["session_id"].as_str().unwrap().to_string();

    socket
        .send(Message::Text(
            json!({
                "type": "text_delta",
                "session_id": session_id,
                "seq": 1,
                "text": "hello world. this is a gateway test."
            })
            .to_string(),
        ))
        .await
        .unwrap();
    socket
        .send(Message::Text(
            json!({"type": "text_end", "session_id": session_id, "seq": 2}).to_string(),
        ))
        .await
        .unwrap();

    let mut saw_chunk = false;
    let mut first_unit_start = None;
    loop {
        let msg = recv_json(&mut socket).await;
        match msg["type"].as_str().unwrap() {
            "audio_chunk" => {
                saw_chunk = true;
                first_unit_start.get_or_insert(msg["unit_index_start"].as_u64().unwrap());
            }
            "tts_end" => {
                assert_eq!(msg["cancelled"], false);
                break;
            }
            "error" => panic!("unexpected error: {msg}"),
            other => panic!("unexpected message type: {other}"),
        }
    }

    assert!(saw_chunk, "expected at least one audio_chunk");
    assert_eq!(first_unit_start, Some(0));
}

/// S2: a cancel mid-stream ends the session with `cancelled: true` and no
/// further audio chunks follow.
#[tokio::test]
async fn cancel_mid_stream_stops_output() {
    let url = spawn_gateway().await;
    let (mut socket, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

    socket
        .send(Message::Text(
            json!({
                "type": "start",
                "audio_format": "pcm16_raw",
                "sample_rate": 16000,
                "channels": 1
            })
            .to_string(),
        ))
        .await
        .unwrap();
    let ack = recv_json(&mut socket).await;
    let session_id = ack["session_id"].as_str().unwrap().to_string();

    socket
        .send(Message::Text(
            json!({
                "type": "text_delta",
                "session_id": session_id,
                "seq": 1,
                "text": "a much longer passage of text so synthesis has time to be cancelled before it finishes emitting every chunk."
            })
            .to_string(),
        ))
        .await
        .unwrap();

    socket
        .send(Message::Text(
            json!({"type": "cancel", "session_id": session_id}).to_string(),
        ))
        .await
        .unwrap();

    // S2: subsequent messages (the final tts_end) stop within 500ms of the
    // cancel being sent, since the synthesis task now watches the inbound
    // transport concurrently with synthesis instead of only between units.
    let deadline = tokio::time::sleep(Duration::from_millis(500));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            msg = recv_json(&mut socket) => {
                if msg["type"] == "tts_end" {
                    assert_eq!(msg["cancelled"], true);
                    break;
                }
            }
            _ = &mut deadline => panic!("timed out waiting for cancelled tts_end within 500ms"),
        }
    }
}
