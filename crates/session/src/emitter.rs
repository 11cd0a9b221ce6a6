use ws_tts_core::{samples_to_le_bytes, AudioChunk, AudioSpec, PcmFrame};

/// Assembles PCM produced by the engine into size-bounded `audio_chunk`
/// records (spec §4.4). Owned exclusively by a session's synthesis task —
/// no locking needed.
pub struct ChunkEmitter {
    spec: AudioSpec,
    chunk_max_bytes: usize,
    next_chunk_seq: u64,
    buffer: Vec<i16>,
    current_unit: Option<u64>,
    wav_header_emitted: bool,
}

impl ChunkEmitter {
    pub fn new(spec: AudioSpec, chunk_max_millis: u32) -> Self {
        Self {
            spec,
            chunk_max_bytes: spec.bytes_for_millis(chunk_max_millis).max(spec.frame_bytes()),
            next_chunk_seq: 1,
            buffer: Vec::new(),
            current_unit: None,
            wav_header_emitted: false,
        }
    }

    fn buffer_bytes(&self) -> usize {
        self.buffer.len() * 2
    }

    fn cut(&mut self, sample_count: usize) -> AudioChunk {
        let unit = self
            .current_unit
            .expect("cut called with no current unit; caller must check buffer is non-empty");
        let samples: Vec<i16> = self.buffer.drain(..sample_count).collect();
        let header = if !self.wav_header_emitted && self.spec.encoding.wants_wav_header() {
            self.wav_header_emitted = true;
            Some(self.spec.wav_header(None))
        } else {
            None
        };
        let chunk = AudioChunk::new(
            self.next_chunk_seq,
            unit,
            unit,
            samples_to_le_bytes(&samples),
            header,
        );
        self.next_chunk_seq += 1;
        chunk
    }

    /// Feeds one PCM frame from the engine, returning any chunks it caused
    /// to be cut: one when the synthesizing unit advances past a non-empty
    /// buffer, plus zero or more when the byte threshold is crossed.
    pub fn push_frame(&mut self, frame: PcmFrame) -> Vec<AudioChunk> {
        let mut emitted = Vec::new();

        if let Some(current) = self.current_unit {
            if current != frame.unit_index && !self.buffer.is_empty() {
                let len = self.buffer.len();
                emitted.push(self.cut(len));
            }
        }
        self.current_unit = Some(frame.unit_index);
        self.buffer.extend_from_slice(&frame.samples);

        let samples_per_chunk = self.chunk_max_bytes / 2;
        while samples_per_chunk > 0 && self.buffer.len() >= samples_per_chunk {
            emitted.push(self.cut(samples_per_chunk));
        }

        emitted
    }

    /// Cuts whatever remains in the buffer as a final chunk for the
    /// current unit. Call when the engine signals end-of-stream for a unit
    /// it is known won't receive more frames, or when cancelling.
    pub fn flush(&mut self) -> Option<AudioChunk> {
        if self.buffer.is_empty() {
            None
        } else {
            let len = self.buffer.len();
            Some(self.cut(len))
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ws_tts_core::{AudioEncoding, Channels};

    fn spec() -> AudioSpec {
        AudioSpec::new(16_000, Channels::Mono, AudioEncoding::Pcm16Raw).unwrap()
    }

    fn frame(unit_index: u64, sample_count: usize) -> PcmFrame {
        PcmFrame {
            unit_index,
            samples: vec![1; sample_count],
        }
    }

    #[test]
    fn cuts_on_unit_advance() {
        let mut emitter = ChunkEmitter::new(spec(), 1000); // huge threshold so only unit-advance cuts
        let mut chunks = emitter.push_frame(frame(0, 10));
        assert!(chunks.is_empty());
        chunks.extend(emitter.push_frame(frame(1, 10)));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].unit_index_start, 0);
        assert_eq!(chunks[0].unit_index_end, 0);
    }

    #[test]
    fn cuts_on_byte_threshold_mid_unit() {
        // 20ms @ 16kHz mono = 320 samples.
        let mut emitter = ChunkEmitter::new(spec(), 20);
        let chunks = emitter.push_frame(frame(0, 400));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].audio_bytes.len(), 320 * 2);
    }

    #[test]
    fn chunk_seq_is_dense_and_increasing() {
        let mut emitter = ChunkEmitter::new(spec(), 20);
        let mut seqs = Vec::new();
        for u in 0..3u64 {
            for c in emitter.push_frame(frame(u, 400)) {
                seqs.push(c.chunk_seq);
            }
        }
        for c in emitter.flush() {
            seqs.push(c.chunk_seq);
        }
        let expected: Vec<u64> = (1..=seqs.len() as u64).collect();
        assert_eq!(seqs, expected);
    }

    #[test]
    fn first_wav_chunk_carries_header_others_dont() {
        let wav_spec = AudioSpec::new(16_000, Channels::Mono, AudioEncoding::Pcm16Wav).unwrap();
        let mut emitter = ChunkEmitter::new(wav_spec, 20);
        let mut chunks = emitter.push_frame(frame(0, 320));
        chunks.extend(emitter.push_frame(frame(1, 320)));
        assert!(chunks[0].wav_header.is_some());
        assert!(chunks[1].wav_header.is_none());
    }

    #[test]
    fn flush_emits_remaining_partial_buffer() {
        let mut emitter = ChunkEmitter::new(spec(), 1000);
        emitter.push_frame(frame(0, 5));
        let flushed = emitter.flush().unwrap();
        assert_eq!(flushed.audio_bytes.len(), 10);
        assert!(emitter.flush().is_none());
    }
}
