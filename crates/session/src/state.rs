/// Per-session lifecycle state (spec §4.3). Mutated only by the owning
/// synthesis task; the send task only reads it to decide when to exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, awaiting the first `text_delta`.
    Idle,
    /// Actively synthesizing and emitting.
    Running,
    /// `text_end` received, flushing residual units.
    Draining,
    /// `cancel` received or a fatal engine error occurred; abandoning
    /// in-flight work.
    Cancelling,
    /// Terminal; removed from the registry after the resume grace window
    /// has nothing left to offer (an immediate remove, since `CLOSED`
    /// sessions never resume).
    Closed,
    /// Transport gone, awaiting `resume` within the grace window.
    Orphan,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed)
    }

    /// Whether a `resume` is meaningful from this state.
    pub fn is_resumable(self) -> bool {
        matches!(self, SessionState::Orphan)
    }

    /// Lowercase label used as the `state` dimension on the `/metrics`
    /// per-state session gauge (SPEC_FULL.md §10.4).
    pub fn metric_label(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Running => "running",
            SessionState::Draining => "draining",
            SessionState::Cancelling => "cancelling",
            SessionState::Closed => "closed",
            SessionState::Orphan => "orphan",
        }
    }
}
