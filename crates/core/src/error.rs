use thiserror::Error;

/// Errors that can arise from the audio/protocol/unit types themselves,
/// independent of any I/O or session state.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unsupported sample rate: {0} (must be one of {1:?})")]
    UnsupportedSampleRate(u32, &'static [u32]),

    #[error("unsupported channel count: {0} (must be 1 or 2)")]
    UnsupportedChannels(u8),

    #[error("pcm byte length {0} is not a whole number of frames for {1} channel(s)")]
    MisalignedPcm(usize, u8),

    #[error("malformed wire message: {0}")]
    MalformedMessage(String),

    #[error("engine failed to synthesize: {0}")]
    EngineFailure(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
