use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};

use ws_tts_core::{AudioEncoding, AudioSpec, CancellationLatch, Channels, CoreResult, PcmFrame, TtsEngine, Unit};

const CHANNEL_CAPACITY: usize = 8;
/// How long one frame of synthesized audio represents; small enough that a
/// long unit yields several frames for cancellation to land mid-synthesis
/// (spec scenario S2).
const FRAME_MILLIS: u32 = 40;
/// Roughly how long it takes the dummy engine to "synthesize" a character,
/// tuned so a modest sentence takes long enough to observe a mid-stream
/// cancel in tests without making the suite slow.
const MILLIS_PER_CHAR: u32 = 15;
const MIN_MILLIS: u32 = FRAME_MILLIS;
const TONE_HZ: f32 = 220.0;
const AMPLITUDE: f32 = 0.2;

/// Synthesizes deterministic low-volume tone PCM instead of calling out to
/// a real voice model. This is what makes the repository runnable and
/// testable without any external binary (SPEC_FULL.md §10.6).
pub struct DummyEngine {
    native_spec: AudioSpec,
}

impl DummyEngine {
    pub fn new(native_sample_rate: u32) -> Self {
        let native_spec = AudioSpec::new(native_sample_rate, Channels::Mono, AudioEncoding::Pcm16Raw)
            .expect("dummy engine configured with a sample rate outside the whitelist");
        Self { native_spec }
    }
}

#[async_trait]
impl TtsEngine for DummyEngine {
    fn native_spec(&self) -> AudioSpec {
        self.native_spec
    }

    fn engine_kind(&self) -> &'static str {
        "dummy"
    }

    async fn synth(
        &self,
        unit: Unit,
        cancel: CancellationLatch,
    ) -> CoreResult<mpsc::Receiver<CoreResult<PcmFrame>>> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let spec = self.native_spec;

        tokio::spawn(async move {
            let total_millis = (unit.text.chars().count() as u32 * MILLIS_PER_CHAR).max(MIN_MILLIS);
            let mut remaining_millis = total_millis;
            let mut phase: f32 = 0.0;
            let phase_step = 2.0 * std::f32::consts::PI * TONE_HZ / spec.sample_rate as f32;

            while remaining_millis > 0 {
                if cancel.is_cancelled() {
                    return;
                }

                let frame_millis = remaining_millis.min(FRAME_MILLIS);
                let sample_count = (spec.sample_rate as u64 * frame_millis as u64 / 1000) as usize;
                let mut samples = Vec::with_capacity(sample_count);
                for _ in 0..sample_count {
                    let value = (phase.sin() * AMPLITUDE * i16::MAX as f32) as i16;
                    samples.push(value);
                    phase += phase_step;
                }

                if tx
                    .send(Ok(PcmFrame {
                        unit_index: unit.unit_index,
                        samples,
                    }))
                    .await
                    .is_err()
                {
                    return; // receiver dropped, nothing left to do
                }

                // Simulate synthesis latency so cancellation has a window to land.
                sleep(Duration::from_millis(frame_millis as u64)).await;
                remaining_millis -= frame_millis;
            }
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn produces_frames_for_the_whole_unit() {
        let engine = DummyEngine::new(16_000);
        let unit = Unit::new(0, "Hello, world.".to_string(), false);
        let mut rx = engine
            .synth(unit, CancellationLatch::new())
            .await
            .unwrap();

        let mut total_samples = 0usize;
        while let Some(frame) = rx.recv().await {
            total_samples += frame.unwrap().samples.len();
        }
        assert!(total_samples > 0);
    }

    #[tokio::test]
    async fn stops_emitting_once_cancelled() {
        let engine = DummyEngine::new(16_000);
        let unit = Unit::new(0, "A".repeat(200), false);
        let cancel = CancellationLatch::new();
        let mut rx = engine.synth(unit, cancel.clone()).await.unwrap();

        assert!(rx.recv().await.is_some());
        cancel.cancel();

        // Draining until closed must terminate promptly; no frame should
        // arrive long after cancellation since the loop checks every frame.
        let deadline = tokio::time::Instant::now() + Duration::from_millis(500);
        while tokio::time::Instant::now() < deadline {
            if rx.recv().await.is_none() {
                return;
            }
        }
        panic!("engine kept emitting past cancellation");
    }
}
