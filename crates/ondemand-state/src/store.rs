//! ExpiringStore: name-keyed values with independent, resettable TTLs.
//!
//! Entries live in a single map guarded by a short-lived lock; no backend
//! call or handler ever runs while that lock is held. Expiry is enforced
//! by a periodic sweep rather than per-entry timers, so an entry fires at
//! most one sweep interval after its deadline.
//!
//! Per-key ordering is provided by [`ExpiringStore::lock_key`]. The sweep
//! takes the key lock of every entry it evicts and re-checks the deadline
//! under it, so a renewal that lands first always wins and an eviction is
//! never applied to a concurrently renewed entry.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, watch};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Receives every entry whose TTL elapsed, exactly once per entry.
///
/// Invoked from the sweep task while the evicted key's lock is held, so
/// it serializes with activations of the same name only.
#[async_trait]
pub trait EvictionHandler<V>: Send + Sync {
    async fn on_evict(&self, key: String, value: V);
}

/// One entry of a store snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotEntry<V> {
    pub key: String,
    pub value: V,
    /// Time left until the entry expires, zero if already overdue.
    pub remaining: Duration,
}

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

struct KeyLock {
    mutex: Arc<AsyncMutex<()>>,
    /// `lock_key` callers currently waiting on or holding `mutex`.
    users: usize,
}

type LockMap = Mutex<HashMap<String, KeyLock>>;

struct Inner<V> {
    entries: Mutex<HashMap<String, Entry<V>>>,
    locks: Arc<LockMap>,
    /// Keys with an eviction task in flight.
    evicting: Arc<Mutex<HashSet<String>>>,
    handler: Arc<dyn EvictionHandler<V>>,
    sweep_interval: Duration,
}

/// Thread-safe expiring key/value store.
pub struct ExpiringStore<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for ExpiringStore<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// One registered `lock_key` caller. The map entry goes away with the
/// last registration, whether it was holding the lock or still waiting.
struct Registration {
    key: String,
    locks: Arc<LockMap>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        let mut locks = lock(&self.locks);
        if let Some(entry) = locks.get_mut(&self.key) {
            entry.users -= 1;
            if entry.users == 0 {
                locks.remove(&self.key);
            }
        }
    }
}

/// Holds the per-key lock for one name. Released on drop.
pub struct KeyGuard {
    guard: Option<OwnedMutexGuard<()>>,
    registration: Registration,
}

impl KeyGuard {
    pub fn key(&self) -> &str {
        &self.registration.key
    }
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        // Unlock before the registration can retire the map entry.
        drop(self.guard.take());
    }
}

/// Marks a key as having an eviction task in flight until dropped.
struct EvictionClaim {
    key: String,
    evicting: Arc<Mutex<HashSet<String>>>,
}

impl Drop for EvictionClaim {
    fn drop(&mut self) {
        lock(&self.evicting).remove(&self.key);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<V> ExpiringStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a store that sweeps every `sweep_interval` and hands expired
    /// entries to `handler`.
    pub fn new(sweep_interval: Duration, handler: Arc<dyn EvictionHandler<V>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                locks: Arc::new(Mutex::new(HashMap::new())),
                evicting: Arc::new(Mutex::new(HashSet::new())),
                handler,
                sweep_interval: sweep_interval.max(Duration::from_millis(1)),
            }),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        self.inner.sweep_interval
    }

    /// Current value for `key`.
    ///
    /// An entry past its deadline but not yet swept is still returned;
    /// removal is the sweep's job alone.
    pub fn get(&self, key: &str) -> Option<V> {
        lock(&self.inner.entries)
            .get(key)
            .map(|entry| entry.value.clone())
    }

    /// Insert or replace `key`, atomically resetting its deadline to `ttl`
    /// from now.
    pub fn put(&self, key: &str, value: V, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        lock(&self.inner.entries).insert(key.to_string(), Entry { value, expires_at });
        debug!(%key, ttl_ms = ttl.as_millis() as u64, "entry stored");
    }

    /// Time left before `key` expires.
    pub fn remaining(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        lock(&self.inner.entries)
            .get(key)
            .map(|entry| entry.expires_at.saturating_duration_since(now))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        lock(&self.inner.entries).contains_key(key)
    }

    pub fn len(&self) -> usize {
        lock(&self.inner.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Acquire the lock for a single key.
    ///
    /// Operations on other keys never wait on this lock. Dropping the
    /// returned future while it waits leaves nothing behind.
    pub async fn lock_key(&self, key: &str) -> KeyGuard {
        let (mutex, registration) = {
            let mut locks = lock(&self.inner.locks);
            let entry = locks.entry(key.to_string()).or_insert_with(|| KeyLock {
                mutex: Arc::new(AsyncMutex::new(())),
                users: 0,
            });
            entry.users += 1;
            let registration = Registration {
                key: key.to_string(),
                locks: Arc::clone(&self.inner.locks),
            };
            (Arc::clone(&entry.mutex), registration)
        };
        let guard = mutex.lock_owned().await;
        KeyGuard {
            guard: Some(guard),
            registration,
        }
    }

    // ── Snapshot support ───────────────────────────────────────────

    /// Enumerate every entry with its remaining TTL.
    pub fn entries(&self) -> Vec<SnapshotEntry<V>> {
        let now = Instant::now();
        lock(&self.inner.entries)
            .iter()
            .map(|(key, entry)| SnapshotEntry {
                key: key.clone(),
                value: entry.value.clone(),
                remaining: entry.expires_at.saturating_duration_since(now),
            })
            .collect()
    }

    /// Load entries, each expiring `remaining` from now. Returns the count.
    ///
    /// Overdue entries are kept and evicted by the next sweep.
    pub fn restore(&self, snapshot: Vec<SnapshotEntry<V>>) -> usize {
        let now = Instant::now();
        let mut entries = lock(&self.inner.entries);
        let count = snapshot.len();
        for item in snapshot {
            entries.insert(
                item.key,
                Entry {
                    value: item.value,
                    expires_at: now + item.remaining,
                },
            );
        }
        debug!(count, "entries restored");
        count
    }

    // ── Expiry ─────────────────────────────────────────────────────

    fn expired_keys(&self) -> Vec<String> {
        let now = Instant::now();
        lock(&self.inner.entries)
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Claim the eviction of `key`, unless a task already owns it.
    fn claim_eviction(&self, key: &str) -> Option<EvictionClaim> {
        let mut evicting = lock(&self.inner.evicting);
        evicting.insert(key.to_string()).then(|| EvictionClaim {
            key: key.to_string(),
            evicting: Arc::clone(&self.inner.evicting),
        })
    }

    /// Remove `key` if it is still expired once its lock is held, then
    /// fire the handler. Returns true if the handler fired.
    async fn evict(&self, key: String) -> bool {
        let _guard = self.lock_key(&key).await;

        let value = {
            let mut entries = lock(&self.inner.entries);
            let now = Instant::now();
            if entries.get(&key).is_some_and(|entry| entry.expires_at <= now) {
                entries.remove(&key).map(|entry| entry.value)
            } else {
                None
            }
        };

        match value {
            Some(value) => {
                debug!(%key, "entry expired");
                self.inner.handler.on_evict(key, value).await;
                true
            }
            None => false,
        }
    }

    /// Evict every entry past its deadline. Returns the number evicted.
    ///
    /// Each eviction runs in its own task, so a slow handler for one key
    /// does not hold back the others. A key whose eviction is still in
    /// flight from an earlier sweep is skipped.
    pub async fn sweep(&self) -> usize {
        let expired = self.expired_keys();
        if expired.is_empty() {
            return 0;
        }

        let mut tasks = JoinSet::new();
        for key in expired {
            let Some(claim) = self.claim_eviction(&key) else {
                debug!(%key, "eviction already in flight");
                continue;
            };
            let store = self.clone();
            tasks.spawn(async move {
                let _claim = claim;
                store.evict(key).await
            });
        }

        let mut evicted = 0;
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(true) => evicted += 1,
                Ok(false) => {}
                Err(e) => warn!(error = %e, "eviction task failed"),
            }
        }
        evicted
    }

    /// Run the sweep loop until shutdown signal.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = self.inner.sweep_interval.as_millis() as u64,
            "expiry sweeper started"
        );

        let mut ticker = tokio::time::interval(self.inner.sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let store = self.clone();
                    tokio::spawn(async move {
                        let evicted = store.sweep().await;
                        if evicted > 0 {
                            debug!(evicted, "sweep complete");
                        }
                    });
                }
                _ = shutdown.changed() => {
                    info!("expiry sweeper shutting down");
                    break;
                }
            }
        }
    }

    #[cfg(test)]
    fn lock_count(&self) -> usize {
        lock(&self.inner.locks).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct Recorder {
        evicted: Mutex<Vec<(String, u32)>>,
        gate: Option<Arc<Notify>>,
    }

    impl Recorder {
        fn gated(gate: Arc<Notify>) -> Self {
            Self {
                evicted: Mutex::new(Vec::new()),
                gate: Some(gate),
            }
        }

        fn evicted(&self) -> Vec<(String, u32)> {
            self.evicted.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EvictionHandler<u32> for Recorder {
        async fn on_evict(&self, key: String, value: u32) {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.evicted.lock().unwrap().push((key, value));
        }
    }

    fn test_store() -> (ExpiringStore<u32>, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let store = ExpiringStore::new(Duration::from_secs(1), recorder.clone());
        (store, recorder)
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn put_and_get() {
        let (store, _) = test_store();
        store.put("svc1", 7, Duration::from_secs(30));

        assert_eq!(store.get("svc1"), Some(7));
        assert_eq!(store.get("svc2"), None);
        assert_eq!(store.remaining("svc1"), Some(Duration::from_secs(30)));
    }

    #[tokio::test(start_paused = true)]
    async fn put_replaces_value_and_deadline() {
        let (store, _) = test_store();
        store.put("svc1", 1, Duration::from_secs(30));
        tokio::time::advance(Duration::from_secs(10)).await;
        store.put("svc1", 2, Duration::from_secs(60));

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("svc1"), Some(2));
        assert_eq!(store.remaining("svc1"), Some(Duration::from_secs(60)));
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_evicts_expired_entry_once() {
        let (store, recorder) = test_store();
        store.put("svc1", 1, Duration::from_secs(30));
        store.put("svc2", 2, Duration::from_secs(90));

        assert_eq!(store.sweep().await, 0);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(store.sweep().await, 1);
        assert_eq!(store.sweep().await, 0);

        assert_eq!(recorder.evicted(), vec![("svc1".to_string(), 1)]);
        assert!(!store.contains_key("svc1"));
        assert!(store.contains_key("svc2"));
    }

    #[tokio::test(start_paused = true)]
    async fn renewal_before_sweep_survives_old_deadline() {
        let (store, recorder) = test_store();
        store.put("svc1", 1, Duration::from_secs(10));

        tokio::time::advance(Duration::from_secs(8)).await;
        store.put("svc1", 1, Duration::from_secs(10));

        // Past the original deadline, before the renewed one.
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(store.sweep().await, 0);
        assert!(store.contains_key("svc1"));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(store.sweep().await, 1);
        assert_eq!(recorder.evicted().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn eviction_waits_for_key_lock_and_rechecks_deadline() {
        let (store, recorder) = test_store();
        store.put("svc1", 1, Duration::from_secs(10));

        let guard = store.lock_key("svc1").await;
        tokio::time::advance(Duration::from_secs(11)).await;

        let sweeper = {
            let store = store.clone();
            tokio::spawn(async move { store.sweep().await })
        };
        settle().await;
        assert!(recorder.evicted().is_empty());

        // Renewal under the key lock, while the sweep is parked on it.
        store.put("svc1", 2, Duration::from_secs(10));
        drop(guard);

        assert_eq!(sweeper.await.unwrap(), 0);
        assert!(recorder.evicted().is_empty());
        assert_eq!(store.get("svc1"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_eviction_does_not_block_other_keys() {
        let gate = Arc::new(Notify::new());
        let recorder = Arc::new(Recorder::gated(gate.clone()));
        let store: ExpiringStore<u32> =
            ExpiringStore::new(Duration::from_secs(1), recorder.clone());
        store.put("slow", 1, Duration::from_secs(1));

        tokio::time::advance(Duration::from_secs(2)).await;
        let sweeper = {
            let store = store.clone();
            tokio::spawn(async move { store.sweep().await })
        };
        settle().await;

        // The handler for "slow" is parked; other keys stay usable.
        store.put("other", 2, Duration::from_secs(30));
        assert_eq!(store.get("other"), Some(2));
        let other = store.lock_key("other").await;
        drop(other);
        assert!(!store.contains_key("slow"));

        gate.notify_one();
        assert_eq!(sweeper.await.unwrap(), 1);
        assert_eq!(recorder.evicted(), vec![("slow".to_string(), 1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn key_lock_serializes_same_key() {
        let (store, _) = test_store();
        let first = store.lock_key("svc1").await;

        let waiter = {
            let store = store.clone();
            tokio::spawn(async move {
                let _guard = store.lock_key("svc1").await;
            })
        };
        settle().await;
        assert!(!waiter.is_finished());

        drop(first);
        waiter.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn key_locks_are_released_when_unused() {
        let (store, _) = test_store();
        {
            let _a = store.lock_key("a").await;
            let _b = store.lock_key("b").await;
            assert_eq!(store.lock_count(), 2);
        }
        assert_eq!(store.lock_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_and_restore_keep_remaining_ttl() {
        let (store, _) = test_store();
        store.put("svc1", 1, Duration::from_secs(30));
        store.put("svc2", 2, Duration::from_secs(90));
        tokio::time::advance(Duration::from_secs(10)).await;

        let mut snapshot = store.entries();
        snapshot.sort_by(|a, b| a.key.cmp(&b.key));
        assert_eq!(snapshot[0].remaining, Duration::from_secs(20));
        assert_eq!(snapshot[1].remaining, Duration::from_secs(80));

        let (restored, _) = test_store();
        assert_eq!(restored.restore(snapshot), 2);
        assert_eq!(restored.get("svc2"), Some(2));
        assert_eq!(restored.remaining("svc1"), Some(Duration::from_secs(20)));
    }

    #[tokio::test(start_paused = true)]
    async fn overdue_restored_entry_is_evicted_on_next_sweep() {
        let (store, recorder) = test_store();
        store.restore(vec![SnapshotEntry {
            key: "svc1".to_string(),
            value: 5,
            remaining: Duration::ZERO,
        }]);

        assert_eq!(store.sweep().await, 1);
        assert_eq!(recorder.evicted(), vec![("svc1".to_string(), 5)]);
    }

    #[tokio::test(start_paused = true)]
    async fn run_loop_fires_within_one_interval() {
        let (store, recorder) = test_store();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let runner = {
            let store = store.clone();
            tokio::spawn(async move { store.run(shutdown_rx).await })
        };

        store.put("svc1", 1, Duration::from_secs(3));
        tokio::time::sleep(Duration::from_secs(5)).await;
        settle().await;

        assert_eq!(recorder.evicted(), vec![("svc1".to_string(), 1)]);

        shutdown_tx.send(true).unwrap();
        runner.await.unwrap();
    }

    #[tokio::test]
    async fn cancelled_waiter_leaves_no_lock_entry() {
        let (store, _) = test_store();
        let held = store.lock_key("svc1").await;

        let mut waiter = Box::pin(store.lock_key("svc1"));
        tokio::select! {
            biased;
            _ = &mut waiter => panic!("lock acquired while held"),
            _ = tokio::task::yield_now() => {}
        }
        assert_eq!(store.lock_count(), 1);

        // Holder leaves first, then the waiter gives up before its turn.
        drop(held);
        drop(waiter);
        assert_eq!(store.lock_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_sweeps_evict_a_key_once() {
        let (store, recorder) = test_store();
        store.put("svc1", 1, Duration::from_secs(1));
        tokio::time::advance(Duration::from_secs(2)).await;

        // A long activation holds the key while sweeps keep ticking.
        let held = store.lock_key("svc1").await;
        let first = {
            let store = store.clone();
            tokio::spawn(async move { store.sweep().await })
        };
        settle().await;

        let second = tokio::time::timeout(Duration::from_secs(1), store.sweep()).await;
        assert_eq!(second, Ok(0));

        drop(held);
        assert_eq!(first.await.unwrap(), 1);
        assert_eq!(recorder.evicted(), vec![("svc1".to_string(), 1)]);
        assert!(store.claim_eviction("svc1").is_some());
    }
}
