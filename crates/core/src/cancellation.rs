use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The single out-of-band signal shared between a session's synthesis task
/// and send task (spec §5). Setting it is idempotent; every consumer polls
/// it at well-defined suspension points rather than being interrupted.
#[derive(Debug, Clone, Default)]
pub struct CancellationLatch {
    cancelled: Arc<AtomicBool>,
}

impl CancellationLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the latch. Returns `true` if this call was the one that
    /// transitioned it (useful for "only log the race once" callers).
    pub fn cancel(&self) -> bool {
        !self.cancelled.swap(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_idempotent() {
        let latch = CancellationLatch::new();
        assert!(latch.cancel());
        assert!(!latch.cancel());
        assert!(latch.is_cancelled());
    }

    #[test]
    fn clones_share_state() {
        let latch = CancellationLatch::new();
        let clone = latch.clone();
        clone.cancel();
        assert!(latch.is_cancelled());
    }
}
