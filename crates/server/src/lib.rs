//! Axum-based front door for the TTS streaming gateway: the WebSocket
//! session handshake, auth middleware, and `/healthz`/`/metrics`
//! introspection (spec §4.1, §6, SPEC_FULL.md §10.1).

pub mod auth;
pub mod http;
pub mod metrics;
pub mod state;
pub mod websocket;

pub use auth::auth_middleware;
pub use http::create_router;
pub use metrics::init_metrics;
pub use state::AppState;

use axum::http::StatusCode;
use thiserror::Error;

use ws_tts_core::ErrorKind;

/// The single place a typed failure from any layer below is collapsed
/// into either a wire `error.kind` or an HTTP status code (SPEC_FULL.md
/// §10.2). Every crate below this one owns its own `thiserror` enum; this
/// is where they converge.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("authentication failed")]
    AuthFailed,

    #[error(transparent)]
    Session(#[from] ws_tts_session::SessionError),

    #[error(transparent)]
    Engine(#[from] ws_tts_engine::EngineError),

    #[error(transparent)]
    Config(#[from] ws_tts_config::ConfigError),

    #[error("malformed first message: {0}")]
    Protocol(String),
}

impl ServerError {
    /// Maps a typed failure to the wire `error.kind` a client-facing
    /// `error` message carries (spec §7). Used by the front door when a
    /// session can't be established at all (capacity, bad sample rate,
    /// resume unavailable) and has to report a `kind` before any `Session`
    /// exists to do it through.
    pub fn kind(&self) -> ErrorKind {
        use ws_tts_session::SessionError;
        match self {
            ServerError::AuthFailed => ErrorKind::AuthFailed,
            ServerError::Protocol(_) => ErrorKind::ProtocolError,
            ServerError::Session(SessionError::CapacityExhausted)
            | ServerError::Session(SessionError::PerKeyCapacityExhausted) => {
                ErrorKind::CapacityExhausted
            }
            ServerError::Session(SessionError::ResumeNotAvailable)
            | ServerError::Session(SessionError::NotFound(_))
            | ServerError::Session(SessionError::NotOrphan(_)) => ErrorKind::ResumeNotAvailable,
            ServerError::Session(SessionError::DuplicateSession(_)) => ErrorKind::ProtocolError,
            ServerError::Session(_) => ErrorKind::InternalError,
            ServerError::Engine(_) => ErrorKind::EngineError,
            ServerError::Config(_) => ErrorKind::InternalError,
        }
    }
}

impl From<ServerError> for StatusCode {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::AuthFailed => StatusCode::UNAUTHORIZED,
            ServerError::Protocol(_) => StatusCode::BAD_REQUEST,
            ServerError::Session(ref inner) => match inner {
                ws_tts_session::SessionError::NotFound(_) => StatusCode::NOT_FOUND,
                ws_tts_session::SessionError::CapacityExhausted
                | ws_tts_session::SessionError::PerKeyCapacityExhausted => {
                    StatusCode::TOO_MANY_REQUESTS
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ServerError::Engine(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
