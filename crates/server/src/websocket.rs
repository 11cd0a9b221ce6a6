//! The gateway front door (spec §4.1): accepts the WebSocket upgrade,
//! reads the first message, routes it to `start` or `resume`, and attaches
//! the connection to a session's synthesis/send task pair.

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    http::{HeaderMap, Uri},
    response::Response,
};
use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use uuid::Uuid;

use ws_tts_core::{
    AudioEncoding, AudioSpec, Channels, ClientMessage, ErrorKind, ErrorPayload, ServerMessage,
};
use ws_tts_session::{InboundTransport, OutboundTransport, Session, SessionError};

use crate::auth::extract_candidate_key;
use crate::state::AppState;
use crate::ServerError;

/// Reads the first message within the idle-read timeout and requires it
/// be `start` or `resume` (spec §4.1); any other first message, or none at
/// all, is a `protocol_error`.
///
/// API-key enforcement itself happens one layer up, in `auth_middleware`,
/// since the upgrade request is still a plain HTTP request at that point —
/// a rejected key never reaches this handler at all. The key is extracted
/// again here only so a successfully authenticated connection can be
/// attributed to its key for per-API-key admission accounting (spec
/// §4.6), which applies even when auth enforcement itself is disabled.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    let api_key = extract_candidate_key(&headers, uri.query());
    ws.on_upgrade(move |socket| handle_socket(socket, state, api_key))
}

async fn handle_socket(socket: WebSocket, state: AppState, api_key: Option<String>) {
    let (mut sender, mut receiver) = socket.split();

    let first = tokio::time::timeout(state.session_params.idle_read_timeout, receiver.next()).await;
    let first_message = match first {
        Ok(Some(Ok(Message::Text(text)))) => match serde_json::from_str::<ClientMessage>(&text) {
            Ok(message) => message,
            Err(err) => {
                send_error(&mut sender, ErrorKind::ProtocolError, err.to_string()).await;
                return;
            }
        },
        Ok(Some(Ok(_))) => {
            send_error(
                &mut sender,
                ErrorKind::ProtocolError,
                "first frame must be a JSON text message".to_string(),
            )
            .await;
            return;
        }
        Ok(Some(Err(err))) => {
            tracing::debug!(error = %err, "websocket error reading first message");
            return;
        }
        Ok(None) | Err(_) => {
            send_error(
                &mut sender,
                ErrorKind::ProtocolError,
                "connection closed or idle before a start/resume message arrived".to_string(),
            )
            .await;
            return;
        }
    };

    match first_message {
        ClientMessage::Start {
            session_id,
            audio_format,
            sample_rate,
            channels,
        } => {
            handle_start(
                state,
                sender,
                receiver,
                session_id,
                audio_format,
                sample_rate,
                channels,
                api_key,
            )
            .await
        }
        ClientMessage::Resume {
            session_id,
            last_unit_index_received,
        } => handle_resume(state, sender, receiver, session_id, last_unit_index_received).await,
        _ => {
            send_error(
                &mut sender,
                ErrorKind::ProtocolError,
                "first message must be start or resume".to_string(),
            )
            .await;
        }
    }
}

type WsSender = futures::stream::SplitSink<WebSocket, Message>;

async fn handle_start(
    state: AppState,
    mut sender: WsSender,
    receiver: SplitStream<WebSocket>,
    session_id: Option<String>,
    audio_format: AudioEncoding,
    sample_rate: u32,
    channels: Channels,
    api_key: Option<String>,
) {
    let client_spec = match AudioSpec::new(sample_rate, channels, audio_format) {
        Ok(spec) => spec,
        Err(err) => {
            send_error(&mut sender, ErrorKind::UnsupportedSampleRate, err.to_string()).await;
            return;
        }
    };

    let native = state.engine.native_spec();
    if native.sample_rate != client_spec.sample_rate {
        send_error(
            &mut sender,
            ErrorKind::UnsupportedSampleRate,
            format!(
                "engine native sample rate is {}, cannot serve requested {} (no resampling)",
                native.sample_rate, client_spec.sample_rate
            ),
        )
        .await;
        return;
    }

    let session_id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());

    let (session, rx) = Session::new(
        session_id.clone(),
        client_spec,
        state.engine.clone(),
        state.session_params.clone(),
        api_key,
    );

    let session = match state.registry.create(session) {
        Ok(session) => session,
        Err(err) => {
            let message = err.to_string();
            let kind = ServerError::from(err).kind();
            send_error(&mut sender, kind, message).await;
            return;
        }
    };

    metrics::counter!(crate::metrics::SESSIONS_CREATED).increment(1);

    let ack = ServerMessage::start_ack(
        session_id.clone(),
        client_spec.encoding,
        client_spec.sample_rate,
        client_spec.channels,
    );
    if write_message(&mut sender, &ack).await.is_err() {
        session.handle_transport_gone();
        return;
    }

    let send_task = tokio::spawn(ws_tts_session::run_send_task(
        session.clone(),
        Box::new(WsOutbound { sender }) as Box<dyn OutboundTransport>,
        rx,
    ));
    let synthesis_task = tokio::spawn(ws_tts_session::run_synthesis_task(
        session.clone(),
        Box::new(WsInbound { receiver }) as Box<dyn InboundTransport>,
    ));
    session.attach_tasks(synthesis_task, send_task);
}

async fn handle_resume(
    state: AppState,
    mut sender: WsSender,
    receiver: SplitStream<WebSocket>,
    session_id: String,
    last_unit_index_received: u64,
) {
    let session = match state.registry.lookup(&session_id) {
        Some(session) => session,
        None => {
            send_error(
                &mut sender,
                ErrorKind::ResumeNotAvailable,
                format!("no session {session_id}"),
            )
            .await;
            return;
        }
    };

    let replay_chunks = match session.replay_from(last_unit_index_received) {
        Ok(chunks) => chunks,
        Err(_) => {
            send_error(
                &mut sender,
                ErrorKind::ResumeNotAvailable,
                "resume cursor predates retained chunks".to_string(),
            )
            .await;
            return;
        }
    };

    if state.registry.adopt(&session_id).is_err() {
        send_error(
            &mut sender,
            ErrorKind::ResumeNotAvailable,
            "session is not available to resume".to_string(),
        )
        .await;
        return;
    }

    let rx = session.reattach_outbound();
    let send_task = tokio::spawn(ws_tts_session::run_send_task(
        session.clone(),
        Box::new(WsOutbound { sender }) as Box<dyn OutboundTransport>,
        rx,
    ));

    for chunk in &replay_chunks {
        if session.replay_chunk(chunk).await.is_err() {
            break;
        }
    }

    let synthesis_task = tokio::spawn(ws_tts_session::run_synthesis_task(
        session.clone(),
        Box::new(WsInbound { receiver }) as Box<dyn InboundTransport>,
    ));
    session.attach_tasks(synthesis_task, send_task);
}

async fn write_message(sender: &mut WsSender, message: &ServerMessage) -> Result<(), ()> {
    let text = serde_json::to_string(message).map_err(|_| ())?;
    sender.send(Message::Text(text)).await.map_err(|_| ())
}

async fn send_error(sender: &mut WsSender, kind: ErrorKind, message: String) {
    let payload = ServerMessage::error(0, ErrorPayload { kind, message });
    let _ = write_message(sender, &payload).await;
    let _ = sender.close().await;
}

/// Adapts an axum WebSocket's read half to the session crate's transport
/// contract (spec §5: the synthesis task owns this exclusively).
struct WsInbound {
    receiver: SplitStream<WebSocket>,
}

#[async_trait::async_trait]
impl InboundTransport for WsInbound {
    async fn recv(&mut self) -> Result<Option<ClientMessage>, SessionError> {
        loop {
            return match self.receiver.next().await {
                Some(Ok(Message::Text(text))) => match serde_json::from_str(&text) {
                    Ok(message) => Ok(Some(message)),
                    Err(err) => Err(SessionError::Protocol(err.to_string())),
                },
                Some(Ok(Message::Close(_))) | None => Ok(None),
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(Message::Binary(_))) => Err(SessionError::Protocol(
                    "binary frames are not part of the wire protocol".to_string(),
                )),
                Some(Err(_)) => Ok(None),
            };
        }
    }
}

/// Adapts an axum WebSocket's write half to the session crate's transport
/// contract (spec §5: the send task is the only writer).
struct WsOutbound {
    sender: WsSender,
}

#[async_trait::async_trait]
impl OutboundTransport for WsOutbound {
    async fn send(&mut self, msg: ServerMessage) -> Result<(), SessionError> {
        let text = serde_json::to_string(&msg)
            .map_err(|err| SessionError::Protocol(err.to_string()))?;
        self.sender
            .send(Message::Text(text))
            .await
            .map_err(|_| SessionError::WriteTimeout)
    }

    async fn close(&mut self) {
        let _ = self.sender.close().await;
    }
}
