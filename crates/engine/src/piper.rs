use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::{sleep, Duration};
use tracing::warn;

use ws_tts_core::{le_bytes_to_samples, AudioSpec, CancellationLatch, CoreError, CoreResult, PcmFrame, TtsEngine, Unit};

use crate::error::EngineError;

const CHANNEL_CAPACITY: usize = 8;
const READ_CHUNK_BYTES: usize = 4096;
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Drives a Piper-compatible CLI binary as a subprocess: text goes to
/// stdin, raw PCM16 comes back on stdout. Binary discovery, model-file
/// paths and voice selection live in configuration, not in this contract
/// (SPEC_FULL.md §10.6).
pub struct PiperEngine {
    binary_path: String,
    model_path: String,
    native_spec: AudioSpec,
    /// Piper itself is single-threaded per process; the spec requires
    /// serializing synthesis calls behind a semaphore rather than letting
    /// sessions race for the same subprocess slot (spec §5).
    concurrency: Arc<Semaphore>,
}

impl PiperEngine {
    pub fn new(binary_path: String, model_path: String, native_spec: AudioSpec, max_concurrency: usize) -> Self {
        Self {
            binary_path,
            model_path,
            native_spec,
            concurrency: Arc::new(Semaphore::new(max_concurrency.max(1))),
        }
    }

    async fn run_subprocess(
        binary_path: &str,
        model_path: &str,
        text: &str,
        tx: &mpsc::Sender<CoreResult<PcmFrame>>,
        unit_index: u64,
        cancel: &CancellationLatch,
    ) -> Result<(), EngineError> {
        let mut child = Command::new(binary_path)
            .arg("--model")
            .arg(model_path)
            .arg("--output-raw")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| EngineError::Io(e.to_string()))?;

        let mut stdin = child.stdin.take().ok_or_else(|| {
            EngineError::Io("piper subprocess did not expose stdin".to_string())
        })?;
        let mut stdout = child.stdout.take().ok_or_else(|| {
            EngineError::Io("piper subprocess did not expose stdout".to_string())
        })?;

        stdin
            .write_all(text.as_bytes())
            .await
            .map_err(|e| EngineError::Io(e.to_string()))?;
        drop(stdin);

        let mut buf = vec![0u8; READ_CHUNK_BYTES];
        loop {
            if cancel.is_cancelled() {
                let _ = child.kill().await;
                return Ok(());
            }

            let read = stdout
                .read(&mut buf)
                .await
                .map_err(|e| EngineError::Io(e.to_string()))?;
            if read == 0 {
                break;
            }

            let samples = le_bytes_to_samples(&buf[..read], 1).map_err(|e| match e {
                CoreError::MisalignedPcm(..) => {
                    EngineError::MalformedOutput("odd number of PCM bytes from piper".to_string())
                }
                other => EngineError::MalformedOutput(other.to_string()),
            })?;

            if tx
                .send(Ok(PcmFrame { unit_index, samples }))
                .await
                .is_err()
            {
                let _ = child.kill().await;
                return Ok(());
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| EngineError::Io(e.to_string()))?;
        if !status.success() {
            return Err(EngineError::Io(format!(
                "piper exited with status {status}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl TtsEngine for PiperEngine {
    fn native_spec(&self) -> AudioSpec {
        self.native_spec
    }

    fn engine_kind(&self) -> &'static str {
        "piper"
    }

    fn resolved_model(&self) -> Option<String> {
        Some(self.model_path.clone())
    }

    async fn synth(
        &self,
        unit: Unit,
        cancel: CancellationLatch,
    ) -> CoreResult<mpsc::Receiver<CoreResult<PcmFrame>>> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let binary_path = self.binary_path.clone();
        let model_path = self.model_path.clone();
        let concurrency = self.concurrency.clone();

        tokio::spawn(async move {
            let _permit = match concurrency.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return, // semaphore closed at shutdown
            };

            let mut attempt = 0;
            loop {
                attempt += 1;
                match Self::run_subprocess(
                    &binary_path,
                    &model_path,
                    &unit.text,
                    &tx,
                    unit.unit_index,
                    &cancel,
                )
                .await
                {
                    Ok(()) => return,
                    Err(err) if err.is_retryable() && attempt == 1 => {
                        warn!(error = %err, "piper synthesis failed, retrying once");
                        sleep(RETRY_BACKOFF).await;
                        continue;
                    }
                    Err(err) => {
                        let _ = tx
                            .send(Err(CoreError::EngineFailure(err.to_string())))
                            .await;
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }
}
