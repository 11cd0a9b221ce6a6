//! Breaks an inbound text stream into scheduling *units* (spec §4.2).
//!
//! Adapted from the buffer-and-threshold idiom the teacher uses for
//! sentence detection: a lock-guarded buffer accumulates characters as they
//! arrive and is flushed into a `Unit` either when it ends on a terminator
//! or once it grows past a minimum length. Punctuation always takes
//! precedence over length when both conditions are met on the same
//! character, since flushing on the terminator already consumes the whole
//! buffer up to that point.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use ws_tts_core::Unit;

/// The literal terminator set from spec §4.2: ASCII sentence/clause
/// punctuation plus its CJK full-width counterparts.
const TERMINATORS: &[char] = &[
    '.', '!', '?', ';', ',', ':', '。', '!', '?', '；', '，', '、',
];

#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    pub flush_on_punct: bool,
    pub flush_min_chars: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            flush_on_punct: true,
            flush_min_chars: 12,
        }
    }
}

struct Buffer {
    text: String,
    len_chars: usize,
}

impl Buffer {
    fn new() -> Self {
        Self {
            text: String::new(),
            len_chars: 0,
        }
    }

    fn push(&mut self, ch: char) {
        self.text.push(ch);
        self.len_chars += 1;
    }

    fn take(&mut self) -> String {
        self.len_chars = 0;
        std::mem::take(&mut self.text)
    }
}

/// Consumes text fragments in arrival order and produces a dense,
/// index-ordered sequence of `Unit`s. Never reorders characters: the
/// concatenation of all emitted unit texts equals the concatenation of all
/// text ever pushed.
pub struct Segmenter {
    config: SegmenterConfig,
    buffer: Mutex<Buffer>,
    next_index: AtomicU64,
}

impl Segmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self {
            config,
            buffer: Mutex::new(Buffer::new()),
            next_index: AtomicU64::new(0),
        }
    }

    fn next_unit(&self, text: String, terminal: bool) -> Unit {
        let index = self.next_index.fetch_add(1, Ordering::SeqCst);
        Unit::new(index, text, terminal)
    }

    /// Appends `text` and returns any units it completed, in order. Holds
    /// the lock only across this call, not across the caller's own
    /// suspension points.
    pub fn push_text(&self, text: &str) -> Vec<Unit> {
        let mut units = Vec::new();
        let mut buffer = self.buffer.lock();

        for ch in text.chars() {
            buffer.push(ch);

            let ends_on_terminator = self.config.flush_on_punct && TERMINATORS.contains(&ch);
            let over_min_length = buffer.len_chars >= self.config.flush_min_chars;

            if ends_on_terminator || over_min_length {
                let unit = self.next_unit(buffer.take(), false);
                tracing::trace!(unit_index = unit.unit_index, chars = unit.text.chars().count(), "unit flushed");
                units.push(unit);
            }
        }

        units
    }

    /// Flushes whatever remains in the buffer as the final, `terminal`
    /// unit, even if it is empty (spec §4.2 rule 4). Call exactly once, on
    /// `text_end`.
    pub fn flush_terminal(&self) -> Unit {
        let mut buffer = self.buffer.lock();
        self.next_unit(buffer.take(), true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flushes_on_terminator_regardless_of_length() {
        let seg = Segmenter::new(SegmenterConfig::default());
        let units = seg.push_text("Hi.");
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].text, "Hi.");
        assert_eq!(units[0].unit_index, 0);
        assert!(!units[0].terminal);
    }

    #[test]
    fn flushes_on_min_length_without_punctuation() {
        let seg = Segmenter::new(SegmenterConfig::default());
        let units = seg.push_text("abcdefghijkl"); // exactly 12 chars, no terminator
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].text, "abcdefghijkl");
    }

    #[test]
    fn punctuation_takes_precedence_before_min_length_reached() {
        let seg = Segmenter::new(SegmenterConfig::default());
        let units = seg.push_text("Hi, there! More text that keeps going on.");
        // "Hi," flushes at 3 chars (comma), "there!" flushes at 6 chars (bang),
        // remainder accumulates until its own terminator.
        assert_eq!(units[0].text, "Hi,");
        assert_eq!(units[1].text, " there!");
        assert!(units.iter().all(|u| !u.terminal));
    }

    #[test]
    fn terminal_flush_emits_residual_even_if_empty() {
        let seg = Segmenter::new(SegmenterConfig::default());
        seg.push_text("Hi.");
        let terminal = seg.flush_terminal();
        assert_eq!(terminal.text, "");
        assert!(terminal.terminal);
        assert_eq!(terminal.unit_index, 1);
    }

    #[test]
    fn concatenation_preserves_all_characters() {
        let seg = Segmenter::new(SegmenterConfig::default());
        let input = "Hello, world! This keeps going without punctuation for a while";
        let mut units = seg.push_text(input);
        units.push(seg.flush_terminal());
        let joined: String = units.iter().map(|u| u.text.as_str()).collect();
        assert_eq!(joined, input);
    }

    #[test]
    fn unit_indices_are_dense_and_ordered() {
        let seg = Segmenter::new(SegmenterConfig::default());
        let mut units = seg.push_text("One. Two. Three.");
        units.push(seg.flush_terminal());
        for (i, unit) in units.iter().enumerate() {
            assert_eq!(unit.unit_index, i as u64);
        }
    }
}
