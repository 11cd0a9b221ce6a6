use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine subprocess I/O failed: {0}")]
    Io(String),

    #[error("engine produced malformed PCM output: {0}")]
    MalformedOutput(String),

    #[error("engine kind is not implemented: {0}")]
    Unsupported(&'static str),

    #[error("synthesis was cancelled")]
    Cancelled,
}

impl EngineError {
    /// Transient engine I/O failures get one local retry (spec §7);
    /// everything else is treated as fatal for the unit.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Io(_))
    }
}
