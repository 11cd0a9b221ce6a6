//! Names for the Prometheus metrics emitted across the workspace
//! (SPEC_FULL.md §10.4). Kept here, rather than duplicated in each crate
//! that records one, so the exporter and the emitters never drift apart.

pub const SESSIONS_CREATED: &str = "ws_tts_sessions_created_total";
pub const SESSIONS_ACTIVE: &str = "ws_tts_sessions_active";
/// Same session count as `SESSIONS_ACTIVE`, broken down by the `state`
/// label (spec state machine §4.3) rather than reported as one total.
pub const SESSIONS_ACTIVE_BY_STATE: &str = "ws_tts_sessions_active_by_state";
pub const SESSIONS_CANCELLED: &str = "ws_tts_sessions_cancelled_total";
pub const SESSIONS_BACKPRESSURE: &str = "ws_tts_sessions_backpressure_total";
pub const CHUNKS_EMITTED: &str = "ws_tts_chunks_emitted_total";
pub const ENGINE_ERRORS: &str = "ws_tts_engine_errors_total";
