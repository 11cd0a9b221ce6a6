use std::time::Duration;

/// Tunables a session is built with (spec §4.5, §5, §9 defaults). Kept as
/// plain durations/counts here rather than depending on `ws-tts-config`
/// directly — `ws-tts-server` is the only crate that knows about layered
/// configuration loading; this crate just needs the resolved numbers.
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub resume_grace: Duration,
    pub queue_capacity: usize,
    pub backpressure_timeout: Duration,
    pub write_timeout: Duration,
    pub idle_read_timeout: Duration,
    pub retention_ring_size: usize,
    pub retention_window: Duration,
    pub chunk_max_millis: u32,
}

impl Default for SessionParams {
    fn default() -> Self {
        Self {
            resume_grace: Duration::from_secs(30),
            queue_capacity: 64,
            backpressure_timeout: Duration::from_secs(2),
            write_timeout: Duration::from_secs(5),
            idle_read_timeout: Duration::from_secs(60),
            retention_ring_size: 256,
            retention_window: Duration::from_secs(30),
            chunk_max_millis: 20,
        }
    }
}

/// Admission caps enforced by the registry (spec §4.6).
#[derive(Debug, Clone, Copy)]
pub struct AdmissionParams {
    pub max_sessions: usize,
    pub max_sessions_per_key: usize,
}

impl Default for AdmissionParams {
    fn default() -> Self {
        Self {
            max_sessions: 1000,
            max_sessions_per_key: 50,
        }
    }
}
