//! Snapshot cache with TTL expiry and a per-key clone lock
//!
//! The cache holds at most one live snapshot per key. A request that misses
//! either becomes the single owner of the clone for that key or subscribes to
//! the owner's outcome, so concurrent requests never clone the same key twice.
//! Evicting an entry only drops the cache's reference; requests still holding
//! a [`SnapshotHandle`] keep the directory alive until they finish.

use super::{CacheKey, SnapshotHandle};
use crate::clock::Clock;
use crate::error::SnapshotError;
use crate::types::CacheStatus;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;

/// Outcome of one clone, shared with every waiter on the key
pub type CloneOutcome = Result<SnapshotHandle, SnapshotError>;

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, SnapshotHandle>,
    in_flight: HashMap<CacheKey, broadcast::Sender<CloneOutcome>>,
}

/// Result of looking up a key
pub enum Lookup {
    /// A live snapshot is cached
    Hit(SnapshotHandle),
    /// The caller owns the clone for this key and must complete the guard
    Acquired(CloneGuard),
    /// Another request is cloning this key, wait for its outcome
    WaitForResult(broadcast::Receiver<CloneOutcome>),
}

/// Process-wide snapshot cache
pub struct SnapshotCache {
    state: Mutex<CacheState>,
    ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl SnapshotCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        Self {
            state: Mutex::new(CacheState::default()),
            ttl,
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_live(&self, handle: &SnapshotHandle, now: DateTime<Utc>) -> bool {
        now - handle.created_at() < self.ttl
    }

    /// Look up `key`, taking the clone lock on a miss if nobody holds it
    pub fn lookup(self: &Arc<Self>, key: &CacheKey) -> Lookup {
        let now = self.now();
        let mut state = self.state();

        if let Some(handle) = state.entries.get(key) {
            if self.is_live(handle, now) {
                return Lookup::Hit(handle.clone());
            }
            tracing::info!("Snapshot {} expired, evicting", key);
            state.entries.remove(key);
        }

        if let Some(tx) = state.in_flight.get(key) {
            return Lookup::WaitForResult(tx.subscribe());
        }

        let (tx, _) = broadcast::channel(1);
        state.in_flight.insert(key.clone(), tx.clone());
        Lookup::Acquired(CloneGuard {
            key: key.clone(),
            cache: Arc::clone(self),
            result_tx: tx,
            completed: false,
        })
    }

    /// The live snapshot for `key`, if any
    pub fn get(&self, key: &CacheKey) -> Option<SnapshotHandle> {
        let now = self.now();
        self.state()
            .entries
            .get(key)
            .filter(|h| self.is_live(h, now))
            .cloned()
    }

    /// Whether a clone for `key` is currently running
    pub fn is_cloning(&self, key: &CacheKey) -> bool {
        self.state().in_flight.contains_key(key)
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = self.now();
        let mut state = self.state();
        let before = state.entries.len();
        state.entries.retain(|_, handle| now - handle.created_at() < self.ttl);
        let removed = before - state.entries.len();
        if removed > 0 {
            tracing::info!("Evicted {} expired snapshots", removed);
        }
        removed
    }

    /// Drop every entry; clones in flight are unaffected
    pub fn clear(&self) -> usize {
        let mut state = self.state();
        let removed = state.entries.len();
        state.entries.clear();
        tracing::info!("Cleared {} cached snapshots", removed);
        removed
    }

    /// Count and age of live entries
    pub fn status(&self) -> CacheStatus {
        let now = self.now();
        let state = self.state();
        let live: Vec<&SnapshotHandle> = state
            .entries
            .values()
            .filter(|h| self.is_live(h, now))
            .collect();

        CacheStatus {
            entry_count: live.len(),
            oldest_age_seconds: live
                .iter()
                .map(|h| (now - h.created_at()).num_seconds().max(0) as u64)
                .max(),
        }
    }
}

/// Exclusive right to populate one cache key
///
/// Dropping the guard without completing it releases the lock and tells
/// waiters the attempt was interrupted, so one of them can take over.
pub struct CloneGuard {
    key: CacheKey,
    cache: Arc<SnapshotCache>,
    result_tx: broadcast::Sender<CloneOutcome>,
    completed: bool,
}

impl CloneGuard {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Publish the clone outcome, caching it on success
    ///
    /// The entry is inserted before the lock is released, so a request arriving
    /// afterwards sees a hit rather than starting a second clone.
    pub fn complete(mut self, outcome: CloneOutcome) -> CloneOutcome {
        {
            let mut state = self.cache.state();
            if let Ok(handle) = &outcome {
                state.entries.insert(self.key.clone(), handle.clone());
            }
            state.in_flight.remove(&self.key);
        }
        self.completed = true;

        // No receivers is fine
        let _ = self.result_tx.send(outcome.clone());
        outcome
    }
}

impl Drop for CloneGuard {
    fn drop(&mut self) {
        if !self.completed {
            tracing::warn!(
                "Clone of snapshot {} dropped before completing, releasing lock",
                self.key
            );
            self.cache.state().in_flight.remove(&self.key);
            let _ = self.result_tx.send(Err(SnapshotError::Interrupted));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::git::test_support::ts;

    fn setup(ttl_secs: u64) -> (Arc<SnapshotCache>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(ts(2024, 1, 1)));
        let cache = Arc::new(SnapshotCache::new(
            Duration::from_secs(ttl_secs),
            clock.clone(),
        ));
        (cache, clock)
    }

    fn handle(cache: &SnapshotCache, key: &CacheKey) -> SnapshotHandle {
        let dir = tempfile::tempdir().unwrap();
        SnapshotHandle::new(
            key.clone(),
            dir,
            "https://github.com/a/b".to_string(),
            "auth".to_string(),
            cache.now(),
        )
    }

    fn acquire(cache: &Arc<SnapshotCache>, key: &CacheKey) -> CloneGuard {
        match cache.lookup(key) {
            Lookup::Acquired(guard) => guard,
            _ => panic!("expected to acquire the clone lock"),
        }
    }

    #[test]
    fn test_miss_then_hit() {
        let (cache, _) = setup(60);
        let key = CacheKey::new("https://github.com/a/b", "auth");

        let guard = acquire(&cache, &key);
        let stored = guard.complete(Ok(handle(&cache, &key))).unwrap();

        match cache.lookup(&key) {
            Lookup::Hit(hit) => assert_eq!(hit.path(), stored.path()),
            _ => panic!("expected a cache hit"),
        }
    }

    #[test]
    fn test_second_lookup_waits_for_owner() {
        let (cache, _) = setup(60);
        let key = CacheKey::new("https://github.com/a/b", "auth");

        let guard = acquire(&cache, &key);
        let mut rx = match cache.lookup(&key) {
            Lookup::WaitForResult(rx) => rx,
            _ => panic!("expected to wait on the owner"),
        };
        assert!(cache.is_cloning(&key));

        let stored = guard.complete(Ok(handle(&cache, &key))).unwrap();
        let received = rx.try_recv().unwrap().unwrap();
        assert_eq!(received.path(), stored.path());
        assert!(!cache.is_cloning(&key));
    }

    #[test]
    fn test_failed_clone_is_not_cached() {
        let (cache, _) = setup(60);
        let key = CacheKey::new("https://github.com/a/missing", "auth");

        let guard = acquire(&cache, &key);
        let mut rx = match cache.lookup(&key) {
            Lookup::WaitForResult(rx) => rx,
            _ => panic!("expected to wait on the owner"),
        };
        let err = SnapshotError::NotFound {
            url: "https://github.com/a/missing".to_string(),
        };
        assert!(guard.complete(Err(err.clone())).is_err());

        assert_eq!(rx.try_recv().unwrap().unwrap_err(), err);
        assert!(cache.get(&key).is_none());
        // The next request retries
        assert!(matches!(cache.lookup(&key), Lookup::Acquired(_)));
    }

    #[test]
    fn test_dropped_guard_interrupts_waiters() {
        let (cache, _) = setup(60);
        let key = CacheKey::new("https://github.com/a/b", "auth");

        let guard = acquire(&cache, &key);
        let mut rx = match cache.lookup(&key) {
            Lookup::WaitForResult(rx) => rx,
            _ => panic!("expected to wait on the owner"),
        };
        drop(guard);

        assert_eq!(rx.try_recv().unwrap().unwrap_err(), SnapshotError::Interrupted);
        assert!(!cache.is_cloning(&key));
    }

    #[test]
    fn test_entry_expires_after_ttl() {
        let (cache, clock) = setup(1800);
        let key = CacheKey::new("https://github.com/a/b", "auth");
        acquire(&cache, &key)
            .complete(Ok(handle(&cache, &key)))
            .unwrap();

        clock.advance(chrono::Duration::seconds(1799));
        assert!(cache.get(&key).is_some());

        clock.advance(chrono::Duration::seconds(1));
        assert!(cache.get(&key).is_none());
        assert!(matches!(cache.lookup(&key), Lookup::Acquired(_)));
    }

    #[test]
    fn test_eviction_keeps_directory_for_active_holders() {
        let (cache, _) = setup(60);
        let key = CacheKey::new("https://github.com/a/b", "auth");
        let held = acquire(&cache, &key)
            .complete(Ok(handle(&cache, &key)))
            .unwrap();
        let path = held.path().to_path_buf();

        assert_eq!(cache.clear(), 1);
        assert!(path.exists());

        drop(held);
        assert!(!path.exists());
    }

    #[test]
    fn test_status_and_purge() {
        let (cache, clock) = setup(100);
        assert_eq!(cache.status(), CacheStatus::default());

        let a = CacheKey::new("https://github.com/a/a", "auth");
        acquire(&cache, &a).complete(Ok(handle(&cache, &a))).unwrap();
        clock.advance(chrono::Duration::seconds(40));

        let b = CacheKey::new("https://github.com/a/b", "auth");
        acquire(&cache, &b).complete(Ok(handle(&cache, &b))).unwrap();
        clock.advance(chrono::Duration::seconds(10));

        assert_eq!(
            cache.status(),
            CacheStatus {
                entry_count: 2,
                oldest_age_seconds: Some(50),
            }
        );

        clock.advance(chrono::Duration::seconds(50));
        assert_eq!(cache.status().entry_count, 1);
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.status().oldest_age_seconds, Some(60));
    }
}
