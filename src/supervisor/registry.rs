//! Shared session store.
//!
//! The registry is the single source of truth mapping session keys to
//! records. The supervisor is the only component that inserts or removes
//! entries; telemetry readers only rewrite the metrics field of an existing
//! entry. Every access is a short lock over one record, so readers never
//! observe a torn snapshot.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::session::{Lifecycle, MetricsSnapshot, SessionKey, SessionRecord};

/// Monotonic ticket tying asynchronous mutators (monitor and telemetry
/// tasks) to the session instance they were spawned for. A stale task whose
/// generation no longer matches the stored entry mutates nothing, so a
/// stop immediately followed by a start on the same key never observes
/// residual state from the prior process.
pub(crate) type Generation = u64;

struct Entry {
    record: SessionRecord,
    generation: Generation,
}

/// Concurrency-safe map: session key -> session record.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<Mutex<State>>,
}

struct State {
    entries: HashMap<SessionKey, Entry>,
    next_generation: Generation,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(State {
                entries: HashMap::new(),
                next_generation: 0,
            })),
        }
    }

    /// Reserve `key` with a `Starting` record.
    ///
    /// Returns the generation ticket for the new session, or `None` when an
    /// active record already holds the key. A terminal record left behind by
    /// a previous session is replaced.
    pub(crate) fn try_reserve(
        &self,
        key: &SessionKey,
        binary: std::path::PathBuf,
    ) -> Option<Generation> {
        let mut state = self.inner.lock();
        if let Some(entry) = state.entries.get(key)
            && entry.record.state.is_active()
        {
            return None;
        }
        state.next_generation += 1;
        let generation = state.next_generation;
        state.entries.insert(
            key.clone(),
            Entry {
                record: SessionRecord::starting(key.clone(), binary),
                generation,
            },
        );
        Some(generation)
    }

    /// Promote a reserved record to `Running` with the spawned pid.
    pub(crate) fn promote(&self, key: &SessionKey, generation: Generation, pid: Option<u32>) {
        let mut state = self.inner.lock();
        if let Some(entry) = state.entries.get_mut(key)
            && entry.generation == generation
        {
            entry.record.state = Lifecycle::Running;
            entry.record.pid = pid;
        }
    }

    /// Drop a reservation after a failed spawn. The record never existed as
    /// far as callers are concerned.
    pub(crate) fn abort_start(&self, key: &SessionKey, generation: Generation) {
        let mut state = self.inner.lock();
        let owned = state
            .entries
            .get(key)
            .is_some_and(|entry| entry.generation == generation);
        if owned {
            state.entries.remove(key);
        }
    }

    /// Transition to `Exited` after the process terminated on its own.
    /// Returns false when the session was already removed (stopped) or
    /// superseded.
    pub(crate) fn mark_exited(
        &self,
        key: &SessionKey,
        generation: Generation,
        exit_code: Option<i32>,
    ) -> bool {
        let mut state = self.inner.lock();
        match state.entries.get_mut(key) {
            Some(entry) if entry.generation == generation && entry.record.state.is_active() => {
                entry.record.state = Lifecycle::Exited;
                entry.record.exit_code = exit_code;
                entry.record.metrics.active = false;
                true
            }
            _ => false,
        }
    }

    /// Transition to `Failed` when observing the process broke down.
    pub(crate) fn mark_failed(&self, key: &SessionKey, generation: Generation, error: String) {
        let mut state = self.inner.lock();
        if let Some(entry) = state.entries.get_mut(key)
            && entry.generation == generation
            && entry.record.state.is_active()
        {
            entry.record.state = Lifecycle::Failed;
            entry.record.error = Some(error);
            entry.record.metrics.active = false;
        }
    }

    /// Remove the record for `key`, returning it. Used by stop.
    pub(crate) fn remove(&self, key: &SessionKey) -> Option<SessionRecord> {
        self.inner.lock().entries.remove(key).map(|e| e.record)
    }

    /// Rewrite the metrics snapshot of a live session in place.
    ///
    /// The sole mutation path granted to the telemetry extractor; lifecycle
    /// fields are out of its reach.
    pub(crate) fn update_metrics(
        &self,
        key: &SessionKey,
        generation: Generation,
        apply: impl FnOnce(&mut MetricsSnapshot),
    ) {
        let mut state = self.inner.lock();
        if let Some(entry) = state.entries.get_mut(key)
            && entry.generation == generation
            && entry.record.state.is_active()
        {
            apply(&mut entry.record.metrics);
        }
    }

    /// Clone of the record for `key`, terminal records included.
    pub fn get(&self, key: &SessionKey) -> Option<SessionRecord> {
        self.inner.lock().entries.get(key).map(|e| e.record.clone())
    }

    /// Whether an active (starting or running) session holds `key`.
    pub fn is_running(&self, key: &SessionKey) -> bool {
        self.inner
            .lock()
            .entries
            .get(key)
            .is_some_and(|e| e.record.state.is_active())
    }

    /// Snapshot of every record, active and terminal.
    pub fn snapshot(&self) -> Vec<SessionRecord> {
        self.inner
            .lock()
            .entries
            .values()
            .map(|e| e.record.clone())
            .collect()
    }

    /// Keys of all active sessions.
    pub fn active_keys(&self) -> Vec<SessionKey> {
        self.inner
            .lock()
            .entries
            .values()
            .filter(|e| e.record.state.is_active())
            .map(|e| e.record.key.clone())
            .collect()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn key() -> SessionKey {
        SessionKey::miner("monero", "mainnet")
    }

    fn bin() -> PathBuf {
        PathBuf::from("/usr/bin/true")
    }

    #[test]
    fn reserve_blocks_second_active_session() {
        let reg = SessionRegistry::new();
        let generation = reg.try_reserve(&key(), bin()).unwrap();
        assert!(reg.try_reserve(&key(), bin()).is_none());

        reg.promote(&key(), generation, Some(42));
        assert!(reg.try_reserve(&key(), bin()).is_none());
        assert!(reg.is_running(&key()));
    }

    #[test]
    fn terminal_record_is_replaced_by_next_reserve() {
        let reg = SessionRegistry::new();
        let generation = reg.try_reserve(&key(), bin()).unwrap();
        reg.promote(&key(), generation, Some(42));
        assert!(reg.mark_exited(&key(), generation, Some(0)));
        assert!(!reg.is_running(&key()));

        // Exited record stays queryable until the next start.
        let rec = reg.get(&key()).unwrap();
        assert_eq!(rec.state, Lifecycle::Exited);
        assert_eq!(rec.exit_code, Some(0));

        let next = reg.try_reserve(&key(), bin()).unwrap();
        assert!(next > generation);
        assert_eq!(reg.get(&key()).unwrap().state, Lifecycle::Starting);
    }

    #[test]
    fn stale_generation_mutates_nothing() {
        let reg = SessionRegistry::new();
        let old = reg.try_reserve(&key(), bin()).unwrap();
        reg.promote(&key(), old, Some(1));
        reg.remove(&key());

        let fresh = reg.try_reserve(&key(), bin()).unwrap();
        reg.promote(&key(), fresh, Some(2));

        // The first session's monitor reports an exit; it must not touch the
        // replacement record.
        assert!(!reg.mark_exited(&key(), old, Some(9)));
        reg.update_metrics(&key(), old, |m| m.hashrate = 999.0);

        let rec = reg.get(&key()).unwrap();
        assert_eq!(rec.state, Lifecycle::Running);
        assert_eq!(rec.metrics.hashrate, 0.0);
        assert_eq!(rec.pid, Some(2));
    }

    #[test]
    fn abort_start_removes_only_own_reservation() {
        let reg = SessionRegistry::new();
        let generation = reg.try_reserve(&key(), bin()).unwrap();
        reg.abort_start(&key(), generation);
        assert!(reg.get(&key()).is_none());

        let fresh = reg.try_reserve(&key(), bin()).unwrap();
        reg.abort_start(&key(), fresh + 1);
        assert!(reg.get(&key()).is_some());
    }

    #[test]
    fn metrics_update_requires_active_record() {
        let reg = SessionRegistry::new();
        let generation = reg.try_reserve(&key(), bin()).unwrap();
        reg.promote(&key(), generation, None);
        reg.update_metrics(&key(), generation, |m| m.hashrate = 512.3);
        assert_eq!(reg.get(&key()).unwrap().metrics.hashrate, 512.3);

        reg.mark_exited(&key(), generation, None);
        reg.update_metrics(&key(), generation, |m| m.hashrate = 1.0);
        assert_eq!(reg.get(&key()).unwrap().metrics.hashrate, 512.3);
    }

    #[test]
    fn snapshot_lists_all_records() {
        let reg = SessionRegistry::new();
        let a = SessionKey::miner("monero", "mainnet");
        let b = SessionKey::node("quai", "testnet");
        reg.try_reserve(&a, bin()).unwrap();
        reg.try_reserve(&b, bin()).unwrap();
        assert_eq!(reg.snapshot().len(), 2);
        assert_eq!(reg.active_keys().len(), 2);
    }
}
