//! Core types shared by every crate in the TTS streaming gateway.
//!
//! This crate is intentionally free of I/O: it holds the audio/wire-format
//! types, the engine trait, the cancellation primitive, and the shared
//! error type. Nothing here spawns a task, opens a socket, or reads a file.

pub mod audio;
pub mod cancellation;
pub mod chunk;
pub mod engine_trait;
pub mod error;
pub mod metrics;
pub mod protocol;
pub mod unit;

pub use audio::{
    le_bytes_to_samples, samples_to_le_bytes, AudioEncoding, AudioSpec, Channels,
    SAMPLE_RATE_WHITELIST,
};
pub use cancellation::CancellationLatch;
pub use chunk::AudioChunk;
pub use engine_trait::{PcmFrame, TtsEngine};
pub use error::{CoreError, CoreResult};
pub use protocol::{ClientMessage, ErrorKind, ErrorPayload, ServerMessage};
pub use unit::Unit;
