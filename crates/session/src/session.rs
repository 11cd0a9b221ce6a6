use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use ws_tts_core::{
    AudioSpec, CancellationLatch, ClientMessage, CoreResult, ErrorKind, ErrorPayload, PcmFrame,
    ServerMessage, TtsEngine, Unit,
};
use ws_tts_segmenter::{Segmenter, SegmenterConfig};

use crate::emitter::ChunkEmitter;
use crate::error::SessionError;
use crate::params::SessionParams;
use crate::retention::RetentionRing;
use crate::state::SessionState;
use crate::transport::{InboundTransport, OutboundTransport};

/// A session's full state: declared audio spec, engine handle, segmenter,
/// emitter, retention ring, outbound queue and the cancellation latch
/// shared between its two tasks (spec §3, §5).
pub struct Session {
    pub session_id: String,
    pub client_spec: AudioSpec,
    pub api_key: Option<String>,
    engine: Arc<dyn TtsEngine>,
    segmenter: Segmenter,
    state: Mutex<SessionState>,
    cancel: CancellationLatch,
    retention: Mutex<RetentionRing>,
    emitter: Mutex<ChunkEmitter>,
    outbound_tx: Mutex<mpsc::Sender<ServerMessage>>,
    server_seq: AtomicU64,
    draining_requested: AtomicBool,
    created_at: Instant,
    last_activity: Mutex<Instant>,
    params: SessionParams,
    synthesis_task: Mutex<Option<JoinHandle<()>>>,
    send_task: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    pub fn new(
        session_id: String,
        client_spec: AudioSpec,
        engine: Arc<dyn TtsEngine>,
        params: SessionParams,
        api_key: Option<String>,
    ) -> (Arc<Self>, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(params.queue_capacity);
        let session = Arc::new(Self {
            session_id,
            client_spec,
            api_key,
            engine,
            segmenter: Segmenter::new(SegmenterConfig::default()),
            state: Mutex::new(SessionState::Idle),
            cancel: CancellationLatch::new(),
            retention: Mutex::new(RetentionRing::new(
                params.retention_ring_size,
                params.retention_window,
            )),
            emitter: Mutex::new(ChunkEmitter::new(client_spec, params.chunk_max_millis)),
            outbound_tx: Mutex::new(tx),
            // `start_ack` is always sent with the hard-coded `seq: 0`
            // (spec §6); starting the counter at 1 keeps every
            // subsequently enqueued message's `seq` distinct from it
            // instead of `next_seq()`'s first `fetch_add` also yielding 0.
            server_seq: AtomicU64::new(1),
            draining_requested: AtomicBool::new(false),
            created_at: Instant::now(),
            last_activity: Mutex::new(Instant::now()),
            params,
            synthesis_task: Mutex::new(None),
            send_task: Mutex::new(None),
        });
        (session, rx)
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    fn set_state(&self, new: SessionState) {
        *self.state.lock() = new;
        debug!(session_id = %self.session_id, state = ?new, "session state transition");
    }

    pub fn cancel_latch(&self) -> CancellationLatch {
        self.cancel.clone()
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    /// Whether this session is an `ORPHAN` that has sat past its resume
    /// grace window — the registry's `reap()` sweeps these.
    pub fn is_expired_orphan(&self) -> bool {
        self.state() == SessionState::Orphan
            && self.last_activity.lock().elapsed() > self.params.resume_grace
    }

    fn next_seq(&self) -> u64 {
        self.server_seq.fetch_add(1, Ordering::SeqCst)
    }

    /// Swaps in a fresh outbound channel for a resumed session and returns
    /// the new receiver half for the caller to hand to a fresh send task.
    /// The old channel (and whatever send task was draining it) is
    /// abandoned — it already observed the transport as gone.
    pub fn reattach_outbound(&self) -> mpsc::Receiver<ServerMessage> {
        let (tx, rx) = mpsc::channel(self.params.queue_capacity);
        *self.outbound_tx.lock() = tx;
        rx
    }

    /// Atomically transitions `ORPHAN` → `RUNNING`/`DRAINING`, rejecting
    /// the adoption if another resume already won the race (spec §4.6:
    /// `adopt` is atomic and rejects if not `ORPHAN`).
    pub fn try_adopt(&self) -> bool {
        let mut state = self.state.lock();
        if *state != SessionState::Orphan {
            return false;
        }
        *state = if self.draining_requested.load(Ordering::SeqCst) {
            SessionState::Draining
        } else {
            SessionState::Running
        };
        drop(state);
        self.touch();
        debug!(session_id = %self.session_id, "session adopted out of orphan state");
        true
    }

    /// Chunks retained for replay past `cursor`, or `Err` if the cursor
    /// predates what's retained (caller must reply `resume_not_available`).
    pub fn replay_from(&self, cursor: u64) -> Result<Vec<ws_tts_core::AudioChunk>, SessionError> {
        self.retention
            .lock()
            .replay_from(cursor)
            .ok_or(SessionError::ResumeNotAvailable)
    }

    /// Re-enqueues a retained chunk under a fresh server `seq` during
    /// resume replay (spec §4.1).
    pub async fn replay_chunk(&self, chunk: &ws_tts_core::AudioChunk) -> Result<(), SessionError> {
        let seq = self.next_seq();
        self.enqueue(ServerMessage::audio_chunk(seq, chunk)).await
    }

    pub fn attach_tasks(&self, synthesis: JoinHandle<()>, send: JoinHandle<()>) {
        *self.synthesis_task.lock() = Some(synthesis);
        *self.send_task.lock() = Some(send);
    }

    /// Aborts both owning tasks. Used by the registry when reaping an
    /// expired orphan — the transport is already gone, there is nothing
    /// left for either task to do.
    pub fn abort_tasks(&self) {
        if let Some(handle) = self.synthesis_task.lock().take() {
            handle.abort();
        }
        if let Some(handle) = self.send_task.lock().take() {
            handle.abort();
        }
    }

    async fn enqueue(&self, msg: ServerMessage) -> Result<(), SessionError> {
        let tx = self.outbound_tx.lock().clone();
        match tokio::time::timeout(self.params.backpressure_timeout, tx.send(msg)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(SessionError::ChannelClosed),
            Err(_) => Err(SessionError::Backpressure),
        }
    }

    async fn emit_chunk(&self, chunk: ws_tts_core::AudioChunk) -> Result<(), SessionError> {
        self.retention.lock().push(chunk.clone());
        let seq = self.next_seq();
        let result = self.enqueue(ServerMessage::audio_chunk(seq, &chunk)).await;
        if result.is_ok() {
            metrics::counter!(ws_tts_core::metrics::CHUNKS_EMITTED).increment(1);
        }
        result
    }

    async fn emit_terminal(&self, cancelled: bool) {
        if cancelled {
            metrics::counter!(ws_tts_core::metrics::SESSIONS_CANCELLED).increment(1);
        }
        let seq = self.next_seq();
        let _ = self.enqueue(ServerMessage::tts_end(seq, cancelled)).await;
        self.set_state(SessionState::Closed);
    }

    async fn terminate_with_error(&self, kind: ErrorKind, message: String) {
        if kind == ErrorKind::EngineError {
            metrics::counter!(ws_tts_core::metrics::ENGINE_ERRORS).increment(1);
        }
        self.cancel.cancel();
        // Any fatal termination passes through CANCELLING on its way to
        // CLOSED (spec §4.3: "any → CANCELLING: on cancel message or
        // fatal engine error"), not just the client-initiated `cancel`.
        self.set_state(SessionState::Cancelling);
        let seq = self.next_seq();
        let _ = self
            .enqueue(ServerMessage::error(seq, ErrorPayload { kind, message }))
            .await;
        self.emit_terminal(true).await;
    }

    /// Transitions to `ORPHAN` unless already terminal. Exposed so the
    /// registry's `mark_orphan` (spec §4.6) and the tasks above share one
    /// code path.
    pub fn handle_transport_gone(&self) {
        if !self.state().is_terminal() {
            self.set_state(SessionState::Orphan);
            self.touch();
        }
    }

    /// Opens the engine's PCM stream for `unit`. `None` means the engine
    /// failed to start synthesis at all (as opposed to failing mid-stream,
    /// which surfaces through the stream itself) — the session has already
    /// been terminated with `engine_error` by the time this returns it.
    async fn start_unit(&self, unit: Unit) -> Option<mpsc::Receiver<CoreResult<PcmFrame>>> {
        match self.engine.synth(unit, self.cancel.clone()).await {
            Ok(rx) => Some(rx),
            Err(err) => {
                self.terminate_with_error(ErrorKind::EngineError, err.to_string())
                    .await;
                None
            }
        }
    }

    /// Cuts whatever partial audio remains buffered in the emitter and
    /// emits the terminal `tts_end`, once every queued unit has finished
    /// synthesizing (spec §4.3: DRAINING → CLOSED "when segmenter queue
    /// empty AND engine has flushed AND last chunk sent").
    async fn finish_draining(&self) {
        if let Some(chunk) = self.emitter.lock().flush() {
            if let Err(err) = self.emit_chunk(chunk).await {
                self.on_enqueue_failure(err).await;
                return;
            }
        }
        self.emit_terminal(self.cancel.is_cancelled()).await;
    }

    async fn on_enqueue_failure(&self, err: SessionError) {
        match err {
            SessionError::Backpressure => {
                metrics::counter!(ws_tts_core::metrics::SESSIONS_BACKPRESSURE).increment(1);
                warn!(session_id = %self.session_id, "backpressure timeout exceeded, terminating session");
                self.terminate_with_error(
                    ErrorKind::Backpressure,
                    "send queue exceeded the backpressure timeout".to_string(),
                )
                .await;
            }
            _ => {
                self.handle_transport_gone();
            }
        }
    }
}

/// Polls the current unit's frame stream, if any. Used as a `tokio::select!`
/// branch guarded by `current.is_some()`; when there is no unit in flight it
/// never resolves, keeping the branch well-typed regardless of the guard.
async fn recv_current(current: &mut Option<mpsc::Receiver<CoreResult<PcmFrame>>>) -> Option<CoreResult<PcmFrame>> {
    match current {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// The synthesis task (spec §5.1): reads the inbound transport, drives the
/// segmenter and engine, hands PCM to the emitter, and enqueues chunks.
/// Owns all session state mutation; the send task never writes here.
///
/// The inbound read and the in-flight unit's frame stream are raced with
/// `tokio::select!` rather than read sequentially — a `cancel` queued up
/// behind a long `text_delta` must preempt synthesis, not wait for it to
/// drain (spec §5: latch "checked between every emitted frame"). Units not
/// yet started sit in `queue`; at most one is in flight in `current`.
#[instrument(skip_all, fields(session_id = %session.session_id))]
pub async fn run_synthesis_task(session: Arc<Session>, mut inbound: Box<dyn InboundTransport>) {
    let mut queue: VecDeque<Unit> = VecDeque::new();
    let mut current: Option<mpsc::Receiver<CoreResult<PcmFrame>>> = None;
    let mut draining = false;

    loop {
        if draining && queue.is_empty() && current.is_none() {
            session.finish_draining().await;
            return;
        }

        tokio::select! {
            received = tokio::time::timeout(session.params.idle_read_timeout, inbound.recv()) => {
                let message = match received {
                    Ok(Ok(Some(message))) => message,
                    Ok(Ok(None)) => {
                        session.handle_transport_gone();
                        return;
                    }
                    Ok(Err(SessionError::Protocol(detail))) => {
                        session
                            .terminate_with_error(ErrorKind::ProtocolError, detail)
                            .await;
                        return;
                    }
                    Ok(Err(_)) => {
                        session.handle_transport_gone();
                        return;
                    }
                    Err(_) => {
                        session
                            .terminate_with_error(ErrorKind::ProtocolError, "idle read timeout".to_string())
                            .await;
                        return;
                    }
                };

                session.touch();

                match message {
                    ClientMessage::TextDelta { text, .. } => {
                        if draining {
                            continue; // stray delta after text_end; drop it
                        }
                        if session.state() == SessionState::Idle {
                            session.set_state(SessionState::Running);
                        }
                        if session.state() != SessionState::Running {
                            continue; // stray delta after cancelling; drop it
                        }
                        queue.extend(session.segmenter.push_text(&text));
                    }
                    ClientMessage::TextEnd { .. } => {
                        session.draining_requested.store(true, Ordering::SeqCst);
                        session.set_state(SessionState::Draining);
                        queue.push_back(session.segmenter.flush_terminal());
                        draining = true;
                    }
                    ClientMessage::Cancel { .. } => {
                        session.cancel.cancel();
                        session.set_state(SessionState::Cancelling);
                        session.emit_terminal(true).await;
                        return;
                    }
                    ClientMessage::Start { .. } | ClientMessage::Resume { .. } => {
                        session
                            .terminate_with_error(
                                ErrorKind::ProtocolError,
                                "start/resume is only valid as the first message".to_string(),
                            )
                            .await;
                        return;
                    }
                }
            }

            frame = recv_current(&mut current), if current.is_some() => {
                match frame {
                    Some(Ok(frame)) => {
                        let chunks = session.emitter.lock().push_frame(frame);
                        for chunk in chunks {
                            if let Err(err) = session.emit_chunk(chunk).await {
                                session.on_enqueue_failure(err).await;
                                return;
                            }
                        }
                    }
                    Some(Err(err)) => {
                        session
                            .terminate_with_error(ErrorKind::EngineError, err.to_string())
                            .await;
                        return;
                    }
                    None => {
                        current = None;
                    }
                }
            }
        }

        if session.cancel.is_cancelled() && session.state() != SessionState::Closed {
            session.set_state(SessionState::Cancelling);
            session.emit_terminal(true).await;
            return;
        }

        if current.is_none() {
            if let Some(unit) = queue.pop_front() {
                match session.start_unit(unit).await {
                    Some(rx) => current = Some(rx),
                    None => return, // start_unit already terminated the session
                }
            }
        }
    }
}

/// The send task (spec §5.2): drains the outbound queue to the transport
/// in FIFO order, enforcing the per-write timeout.
#[instrument(skip_all, fields(session_id = %session.session_id))]
pub async fn run_send_task(
    session: Arc<Session>,
    mut outbound: Box<dyn OutboundTransport>,
    mut rx: mpsc::Receiver<ServerMessage>,
) {
    while let Some(message) = rx.recv().await {
        let is_terminal = matches!(message, ServerMessage::TtsEnd { .. });
        let outcome = tokio::time::timeout(session.params.write_timeout, outbound.send(message)).await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!(session_id = %session.session_id, error = %err, "transport write failed");
                session.handle_transport_gone();
                break;
            }
            Err(_) => {
                warn!(session_id = %session.session_id, "transport write timed out");
                session.handle_transport_gone();
                break;
            }
        }
        if is_terminal {
            info!(session_id = %session.session_id, "tts_end delivered, closing send task");
            break;
        }
    }
    outbound.close().await;
}
