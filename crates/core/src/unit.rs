/// A segmentation record produced by the text segmenter. Once a `Unit` is
/// assigned a `unit_index` the index never changes; units are produced in
/// strictly increasing index order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    pub unit_index: u64,
    pub text: String,
    /// Set when the unit was flushed because `text_end` was received
    /// (i.e. it is the last unit of the session, possibly empty).
    pub terminal: bool,
}

impl Unit {
    pub fn new(unit_index: u64, text: String, terminal: bool) -> Self {
        Self {
            unit_index,
            text,
            terminal,
        }
    }
}
