use std::collections::VecDeque;
use std::time::Duration;

use ws_tts_core::AudioChunk;

/// A session's bounded store of recently emitted chunks, available for
/// `resume` replay (spec §4.4, §9). Holds at most `capacity` chunks or
/// chunks younger than `window`, whichever is tighter — both bounds are
/// enforced on every push, so neither can be exceeded even transiently.
pub struct RetentionRing {
    capacity: usize,
    window: Duration,
    chunks: VecDeque<AudioChunk>,
}

impl RetentionRing {
    pub fn new(capacity: usize, window: Duration) -> Self {
        Self {
            capacity,
            window,
            chunks: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, chunk: AudioChunk) {
        self.chunks.push_back(chunk);
        self.evict();
    }

    fn evict(&mut self) {
        while self.chunks.len() > self.capacity {
            self.chunks.pop_front();
        }
        while self
            .chunks
            .front()
            .map(|c| c.age() > self.window)
            .unwrap_or(false)
        {
            self.chunks.pop_front();
        }
    }

    /// The oldest `unit_index_end` still retained, if any. A resume cursor
    /// older than this value means the requested replay range has already
    /// been evicted.
    pub fn oldest_unit_index_end(&self) -> Option<u64> {
        self.chunks.front().map(|c| c.unit_index_end)
    }

    /// Chunks with `unit_index_start > cursor`, in original emission
    /// order, suitable for direct resume replay. Returns `None` if the
    /// cursor is older than what's retained (the caller must reply
    /// `resume_not_available`): either nothing is retained and the client
    /// claims to have already seen units, or the oldest retained chunk
    /// starts more than one unit past the cursor, meaning the units in
    /// between were evicted.
    pub fn replay_from(&mut self, cursor: u64) -> Option<Vec<AudioChunk>> {
        self.evict();
        match self.chunks.front() {
            None if cursor > 0 => None,
            None => Some(Vec::new()),
            Some(oldest) if cursor + 1 < oldest.unit_index_start => None,
            Some(_) => Some(
                self.chunks
                    .iter()
                    .filter(|c| c.unit_index_start > cursor)
                    .cloned()
                    .collect(),
            ),
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(seq: u64, start: u64, end: u64) -> AudioChunk {
        AudioChunk::new(seq, start, end, vec![0, 0], None)
    }

    #[test]
    fn evicts_past_capacity() {
        let mut ring = RetentionRing::new(2, Duration::from_secs(30));
        ring.push(chunk(1, 0, 0));
        ring.push(chunk(2, 1, 1));
        ring.push(chunk(3, 2, 2));
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.oldest_unit_index_end(), Some(1));
    }

    #[test]
    fn replay_returns_only_chunks_after_cursor() {
        let mut ring = RetentionRing::new(10, Duration::from_secs(30));
        for i in 0..5u64 {
            ring.push(chunk(i + 1, i, i));
        }
        let replay = ring.replay_from(2).unwrap();
        assert_eq!(replay.len(), 2);
        assert_eq!(replay[0].unit_index_start, 3);
        assert_eq!(replay[1].unit_index_start, 4);
    }

    #[test]
    fn replay_fails_when_cursor_predates_retention() {
        let mut ring = RetentionRing::new(2, Duration::from_secs(30));
        for i in 0..5u64 {
            ring.push(chunk(i + 1, i, i));
        }
        // Cursor 0 is long evicted; oldest retained starts at unit 3.
        assert!(ring.replay_from(0).is_none());
    }
}
