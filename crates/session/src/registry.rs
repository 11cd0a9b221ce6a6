use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::info;

use crate::error::SessionError;
use crate::params::AdmissionParams;
use crate::session::Session;

/// Process-wide concurrent map of `session_id` → `Session`, with admission
/// control and periodic reaping of expired orphans (spec §4.6). Backed by
/// a sharded concurrent map rather than a single `RwLock<HashMap>` so one
/// session's lookup or insert never blocks another's (spec §9: "prefer
/// fine-grained locking over a single global lock to preserve isolation
/// under load").
pub struct SessionManager {
    sessions: DashMap<String, Arc<Session>>,
    per_key_counts: DashMap<String, usize>,
    admission: AdmissionParams,
    reap_interval: Duration,
}

impl SessionManager {
    pub fn new(admission: AdmissionParams) -> Self {
        Self {
            sessions: DashMap::new(),
            per_key_counts: DashMap::new(),
            admission,
            reap_interval: Duration::from_secs(5),
        }
    }

    pub fn with_reap_interval(mut self, reap_interval: Duration) -> Self {
        self.reap_interval = reap_interval;
        self
    }

    /// Registers a freshly built session, enforcing the global and
    /// per-API-key admission caps and rejecting a duplicate active id.
    /// The global capacity check is best-effort under concurrent `create`
    /// calls racing on distinct shards — the same tradeoff a sharded map
    /// always makes against a single global lock.
    pub fn create(&self, session: Arc<Session>) -> Result<Arc<Session>, SessionError> {
        if self.sessions.len() >= self.admission.max_sessions {
            return Err(SessionError::CapacityExhausted);
        }

        if let Some(key) = &session.api_key {
            match self.per_key_counts.entry(key.clone()) {
                Entry::Occupied(mut occupied) => {
                    if *occupied.get() >= self.admission.max_sessions_per_key {
                        return Err(SessionError::PerKeyCapacityExhausted);
                    }
                    *occupied.get_mut() += 1;
                }
                Entry::Vacant(vacant) => {
                    vacant.insert(1);
                }
            }
        }

        match self.sessions.entry(session.session_id.clone()) {
            Entry::Occupied(_) => {
                self.release_key_slot(&session);
                Err(SessionError::DuplicateSession(session.session_id.clone()))
            }
            Entry::Vacant(vacant) => {
                vacant.insert(session.clone());
                info!(session_id = %session.session_id, total = self.sessions.len(), "session created");
                Ok(session)
            }
        }
    }

    fn release_key_slot(&self, session: &Session) {
        if let Some(key) = &session.api_key {
            if let Some(mut count) = self.per_key_counts.get_mut(key) {
                *count = count.saturating_sub(1);
            }
        }
    }

    pub fn lookup(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.get(session_id).map(|entry| entry.value().clone())
    }

    pub fn mark_orphan(&self, session_id: &str) {
        if let Some(session) = self.lookup(session_id) {
            session.handle_transport_gone();
        }
    }

    /// Atomically adopts an orphaned session for resume, rejecting the
    /// attempt if it is not (or no longer) `ORPHAN`.
    pub fn adopt(&self, session_id: &str) -> Result<Arc<Session>, SessionError> {
        let session = self
            .lookup(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        if !session.try_adopt() {
            return Err(SessionError::NotOrphan(session_id.to_string()));
        }
        Ok(session)
    }

    fn remove(&self, session_id: &str) {
        if let Some((_, session)) = self.sessions.remove(session_id) {
            self.release_key_slot(&session);
            session.abort_tasks();
            info!(session_id = %session_id, "session reaped");
        }
    }

    /// Sweeps sessions that are done with the registry: `CLOSED` sessions
    /// are removed immediately (they never resume), orphans once their
    /// grace window has elapsed. Safe to call concurrently with `create`.
    pub fn reap(&self) {
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().state().is_terminal() || entry.value().is_expired_orphan())
            .map(|entry| entry.key().clone())
            .collect();
        for id in expired {
            self.remove(&id);
        }
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    /// Session counts bucketed by lifecycle state, for the `/metrics`
    /// per-state gauge (SPEC_FULL.md §10.4).
    pub fn counts_by_state(&self) -> [(crate::state::SessionState, usize); 6] {
        use crate::state::SessionState::*;
        let mut counts = [
            (Idle, 0usize),
            (Running, 0),
            (Draining, 0),
            (Cancelling, 0),
            (Closed, 0),
            (Orphan, 0),
        ];
        for entry in self.sessions.iter() {
            let state = entry.value().state();
            if let Some((_, count)) = counts.iter_mut().find(|(s, _)| *s == state) {
                *count += 1;
            }
        }
        counts
    }

    /// Spawns the periodic reap sweep. Returns a shutdown sender; dropping
    /// or signalling it stops the task.
    pub fn start_reap_task(self: &Arc<Self>) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let manager = Arc::clone(self);
        let period = manager.reap_interval;

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        manager.reap();
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!("session reap task shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;
    use ws_tts_core::{AudioEncoding, AudioSpec, Channels, TtsEngine};
    use ws_tts_engine::DummyEngine;

    use crate::params::SessionParams;

    fn new_session(id: &str, api_key: Option<&str>) -> Arc<Session> {
        let engine: Arc<dyn TtsEngine> = Arc::new(DummyEngine::new(16_000));
        let spec = AudioSpec::new(16_000, Channels::Mono, AudioEncoding::Pcm16Raw).unwrap();
        let (session, _rx) = Session::new(
            id.to_string(),
            spec,
            engine,
            SessionParams::default(),
            api_key.map(|k| k.to_string()),
        );
        session
    }

    #[test]
    fn rejects_duplicate_session_id() {
        let manager = SessionManager::new(AdmissionParams::default());
        manager.create(new_session("s1", None)).unwrap();
        let err = manager.create(new_session("s1", None)).unwrap_err();
        assert!(matches!(err, SessionError::DuplicateSession(_)));
    }

    #[test]
    fn enforces_global_capacity() {
        let admission = AdmissionParams {
            max_sessions: 1,
            max_sessions_per_key: 50,
        };
        let manager = SessionManager::new(admission);
        manager.create(new_session("s1", None)).unwrap();
        let err = manager.create(new_session("s2", None)).unwrap_err();
        assert!(matches!(err, SessionError::CapacityExhausted));
    }

    #[test]
    fn enforces_per_key_capacity_and_releases_on_duplicate_rejection() {
        let admission = AdmissionParams {
            max_sessions: 1000,
            max_sessions_per_key: 1,
        };
        let manager = SessionManager::new(admission);
        manager.create(new_session("s1", Some("key-a"))).unwrap();
        let err = manager.create(new_session("s2", Some("key-a"))).unwrap_err();
        assert!(matches!(err, SessionError::PerKeyCapacityExhausted));
    }

    #[test]
    fn lookup_and_adopt_round_trip() {
        let manager = SessionManager::new(AdmissionParams::default());
        let session = manager.create(new_session("s1", None)).unwrap();
        assert!(manager.lookup("s1").is_some());

        session.handle_transport_gone();
        assert!(manager.adopt("s1").is_ok());
        // Not orphaned anymore, so a second adopt attempt must fail.
        session.handle_transport_gone();
        assert_eq!(session.state(), crate::state::SessionState::Orphan);
    }

    #[test]
    fn reap_leaves_fresh_orphans_inside_the_grace_window() {
        let manager = SessionManager::new(AdmissionParams::default());
        let session = manager.create(new_session("s1", None)).unwrap();
        session.handle_transport_gone();

        manager.reap();
        assert_eq!(manager.active_count(), 1, "default 30s grace window has not elapsed yet");
    }

    #[test]
    fn reap_removes_orphans_once_their_grace_window_elapses() {
        // Built directly (rather than via `new_session`) so the grace
        // window can be a few milliseconds instead of the 30s default.
        let engine: Arc<dyn TtsEngine> = Arc::new(DummyEngine::new(16_000));
        let spec = AudioSpec::new(16_000, Channels::Mono, AudioEncoding::Pcm16Raw).unwrap();
        let mut params = SessionParams::default();
        params.resume_grace = StdDuration::from_millis(1);
        let (session, _rx) = Session::new("short-grace".to_string(), spec, engine, params, None);

        let manager = SessionManager::new(AdmissionParams::default());
        manager.create(session.clone()).unwrap();
        session.handle_transport_gone();

        std::thread::sleep(StdDuration::from_millis(20));
        manager.reap();
        assert_eq!(manager.active_count(), 0);
    }

    #[test]
    fn counts_by_state_reflects_idle_and_orphan_sessions() {
        let manager = SessionManager::new(AdmissionParams::default());
        manager.create(new_session("idle", None)).unwrap();
        let orphaned = manager.create(new_session("will-orphan", None)).unwrap();
        orphaned.handle_transport_gone();

        let counts = manager.counts_by_state();
        let idle = counts.iter().find(|(s, _)| *s == crate::state::SessionState::Idle).unwrap().1;
        let orphan = counts.iter().find(|(s, _)| *s == crate::state::SessionState::Orphan).unwrap().1;
        assert_eq!(idle, 1);
        assert_eq!(orphan, 1);
    }
}
