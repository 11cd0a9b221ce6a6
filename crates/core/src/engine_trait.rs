use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::audio::AudioSpec;
use crate::cancellation::CancellationLatch;
use crate::error::CoreResult;
use crate::unit::Unit;

/// One block of PCM produced by an engine while synthesizing a single
/// `Unit`. The emitter uses `unit_index` to decide when the synthesizing
/// unit has advanced (spec §4.4 rule b).
#[derive(Debug, Clone)]
pub struct PcmFrame {
    pub unit_index: u64,
    pub samples: Vec<i16>,
}

/// The abstract TTS synthesis contract (spec §4, §9): given a unit of text
/// and a cancellation signal, stream PCM frames back; declare the sample
/// rate the engine actually produces at. Implementations are free to pool
/// subprocesses, call a remote model, or generate silence — the core only
/// ever sees this contract.
#[async_trait]
pub trait TtsEngine: Send + Sync {
    /// The sample rate/channel layout this engine actually produces.
    /// `start` fails closed with `unsupported_sample_rate` if this doesn't
    /// match the client's requested spec; there is no implicit resampling.
    fn native_spec(&self) -> AudioSpec;

    /// A human-readable identifier for `/healthz` (e.g. `"piper"`,
    /// `"dummy"`) and the resolved model name, if any.
    fn engine_kind(&self) -> &'static str;

    fn resolved_model(&self) -> Option<String> {
        None
    }

    /// Streams PCM for `unit`, checking `cancel` between frames. The
    /// returned receiver is closed (no further `Ok` frames) once synthesis
    /// completes, fails, or `cancel` is observed. Implementations must
    /// check `cancel` at least once per emitted frame (spec §5).
    async fn synth(
        &self,
        unit: Unit,
        cancel: CancellationLatch,
    ) -> CoreResult<mpsc::Receiver<CoreResult<PcmFrame>>>;
}
