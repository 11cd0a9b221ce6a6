use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session id already active: {0}")]
    DuplicateSession(String),

    #[error("session not found: {0}")]
    NotFound(String),

    #[error("session is not orphaned, cannot adopt: {0}")]
    NotOrphan(String),

    #[error("resume cursor is older than the oldest retained chunk")]
    ResumeNotAvailable,

    #[error("global session capacity exhausted")]
    CapacityExhausted,

    #[error("per-key session capacity exhausted")]
    PerKeyCapacityExhausted,

    #[error("send queue was full for longer than the backpressure timeout")]
    Backpressure,

    #[error("transport write timed out")]
    WriteTimeout,

    #[error("outbound channel closed; send task is no longer running")]
    ChannelClosed,

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error(transparent)]
    Engine(#[from] ws_tts_engine::EngineError),

    #[error(transparent)]
    Core(#[from] ws_tts_core::CoreError),
}
