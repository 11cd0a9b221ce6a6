use std::time::Instant;

use chrono::{DateTime, Utc};

/// One outbound `audio_chunk` message. `chunk_seq` is dense and 1-based
/// within a session; `unit_index_start`/`unit_index_end` are the inclusive
/// range of units that contributed samples to this chunk.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub chunk_seq: u64,
    pub unit_index_start: u64,
    pub unit_index_end: u64,
    pub audio_bytes: Vec<u8>,
    /// Present only on the first chunk of a `pcm16_wav` session.
    pub wav_header: Option<[u8; 44]>,
    /// Monotonic instant used for retention-window eviction math (spec
    /// §3/§4.4); not meaningful across process restarts.
    pub emitted_at: Instant,
    /// Wall-clock emit time (spec §3: "wall-clock emit time (for TTFA
    /// measurement...)"), suitable for logging or reporting alongside the
    /// monotonic `emitted_at` used internally for eviction.
    pub emitted_at_utc: DateTime<Utc>,
}

impl AudioChunk {
    pub fn new(
        chunk_seq: u64,
        unit_index_start: u64,
        unit_index_end: u64,
        audio_bytes: Vec<u8>,
        wav_header: Option<[u8; 44]>,
    ) -> Self {
        Self {
            chunk_seq,
            unit_index_start,
            unit_index_end,
            audio_bytes,
            wav_header,
            emitted_at: Instant::now(),
            emitted_at_utc: Utc::now(),
        }
    }

    pub fn age(&self) -> std::time::Duration {
        self.emitted_at.elapsed()
    }
}
