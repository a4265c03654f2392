//! Timed key-value storage backing circuit state
//!
//! Every entry carries its own expiry deadline. Expired entries read as
//! absent and are evicted lazily the next time their key is touched, so the
//! store needs no background sweeper.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::ops::AddAssign;
use std::time::{Duration, Instant};

/// Hard ceiling on any entry's lifetime, whatever window the caller asks for.
pub const MAX_SAMPLE_WINDOW: Duration = Duration::from_secs(180);

/// A stored value together with its expiry deadline.
#[derive(Debug, Clone)]
struct Bucket<V> {
    value: V,
    expires_at: Instant,
}

impl<V> Bucket<V> {
    fn expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Mutex-protected map from string keys to values with per-entry expiry.
///
/// All mutation happens under a single lock, so read-modify-write operations
/// like [`increment`](TimedStore::increment) are atomic with respect to
/// concurrent callers. Deadlines use [`Instant`] to stay immune to wall-clock
/// adjustments.
#[derive(Debug)]
pub struct TimedStore<V> {
    buckets: Mutex<HashMap<String, Bucket<V>>>,
    sample_window: Duration,
}

impl<V> TimedStore<V> {
    /// Create a store whose entries live at most `sample_window`, itself
    /// capped at [`MAX_SAMPLE_WINDOW`].
    pub fn new(sample_window: Duration) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            sample_window: sample_window.min(MAX_SAMPLE_WINDOW),
        }
    }

    /// The effective per-entry lifetime ceiling.
    pub fn sample_window(&self) -> Duration {
        self.sample_window
    }

    /// Whether a live entry exists at `key`.
    pub fn exists(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut buckets = self.buckets.lock();
        Self::evict_if_expired(&mut buckets, key, now);
        buckets.contains_key(key)
    }

    /// Remove the entry at `key`, returning its value only if it was still
    /// live. Absent and already-expired entries both yield `None`.
    pub fn delete(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut buckets = self.buckets.lock();
        buckets
            .remove(key)
            .filter(|bucket| !bucket.expired(now))
            .map(|bucket| bucket.value)
    }

    /// Drop every entry, live or expired.
    pub fn reset(&self) {
        self.buckets.lock().clear();
    }

    fn deadline(&self, now: Instant, ttl: Duration) -> Instant {
        now + ttl.min(self.sample_window)
    }

    fn evict_if_expired(buckets: &mut HashMap<String, Bucket<V>>, key: &str, now: Instant) {
        if let Some(bucket) = buckets.get(key)
            && bucket.expired(now)
        {
            buckets.remove(key);
        }
    }
}

impl<V: Clone> TimedStore<V> {
    /// Fetch the live value at `key`, if any.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut buckets = self.buckets.lock();
        Self::evict_if_expired(&mut buckets, key, now);
        buckets.get(key).map(|bucket| bucket.value.clone())
    }

    /// Store `value` at `key` for `ttl` (capped at the sample window),
    /// replacing whatever was there. Returns the stored value.
    pub fn set(&self, key: &str, value: V, ttl: Duration) -> V {
        let now = Instant::now();
        let expires_at = self.deadline(now, ttl);
        let mut buckets = self.buckets.lock();
        buckets.insert(
            key.to_string(),
            Bucket {
                value: value.clone(),
                expires_at,
            },
        );
        value
    }
}

impl<V: Copy + AddAssign> TimedStore<V> {
    /// Add `delta` to the live value at `key`, seeding from `delta` when the
    /// entry is absent or expired. Every call pushes the expiry out to `ttl`
    /// from now (capped at the sample window), so a key that keeps getting
    /// traffic keeps its count. Returns the value after the addition.
    pub fn increment(&self, key: &str, delta: V, ttl: Duration) -> V {
        let now = Instant::now();
        let expires_at = self.deadline(now, ttl);
        let mut buckets = self.buckets.lock();
        Self::evict_if_expired(&mut buckets, key, now);
        match buckets.get_mut(key) {
            Some(bucket) => {
                bucket.value += delta;
                bucket.expires_at = expires_at;
                bucket.value
            }
            None => {
                buckets.insert(
                    key.to_string(),
                    Bucket {
                        value: delta,
                        expires_at,
                    },
                );
                delta
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_sample_window_capped_at_max() {
        let store: TimedStore<u64> = TimedStore::new(Duration::from_secs(600));
        assert_eq!(store.sample_window(), MAX_SAMPLE_WINDOW);
    }

    #[test]
    fn test_sample_window_below_max_kept() {
        let store: TimedStore<u64> = TimedStore::new(Duration::from_secs(45));
        assert_eq!(store.sample_window(), Duration::from_secs(45));
    }

    #[test]
    fn test_set_and_get() {
        let store = TimedStore::new(Duration::from_secs(60));

        assert_eq!(store.set("answer", 42, Duration::from_secs(10)), 42);
        assert_eq!(store.get("answer"), Some(42));
        assert_eq!(store.get("missing"), None);
    }

    #[test]
    fn test_set_replaces_existing_value() {
        let store = TimedStore::new(Duration::from_secs(60));

        store.set("key", 1, Duration::from_secs(10));
        store.set("key", 2, Duration::from_secs(10));

        assert_eq!(store.get("key"), Some(2));
    }

    #[test]
    fn test_entry_expires_after_ttl() {
        let store = TimedStore::new(Duration::from_secs(60));

        store.set("short", 7, Duration::from_millis(40));
        assert_eq!(store.get("short"), Some(7));

        thread::sleep(Duration::from_millis(80));
        assert_eq!(store.get("short"), None);
    }

    #[test]
    fn test_ttl_capped_by_sample_window() {
        let store = TimedStore::new(Duration::from_millis(50));

        // Requested ttl far exceeds the window; the window wins.
        store.set("capped", 1, Duration::from_secs(3600));
        thread::sleep(Duration::from_millis(100));

        assert_eq!(store.get("capped"), None);
    }

    #[test]
    fn test_increment_seeds_and_accumulates() {
        let store = TimedStore::new(Duration::from_secs(60));

        assert_eq!(store.increment("count", 1, Duration::from_secs(10)), 1);
        assert_eq!(store.increment("count", 1, Duration::from_secs(10)), 2);
        assert_eq!(store.increment("count", 5, Duration::from_secs(10)), 7);
        assert_eq!(store.get("count"), Some(7));
    }

    #[test]
    fn test_increment_restarts_after_expiry() {
        let store = TimedStore::new(Duration::from_secs(60));

        store.increment("count", 3, Duration::from_millis(40));
        thread::sleep(Duration::from_millis(80));

        // The old count is gone; the increment seeds a fresh entry.
        assert_eq!(store.increment("count", 1, Duration::from_secs(10)), 1);
    }

    #[test]
    fn test_increment_refreshes_expiry() {
        let store = TimedStore::new(Duration::from_secs(60));

        store.increment("count", 1, Duration::from_millis(150));
        thread::sleep(Duration::from_millis(100));
        store.increment("count", 1, Duration::from_millis(150));
        thread::sleep(Duration::from_millis(100));

        // 200ms after the first write, but only 100ms after the refresh.
        assert_eq!(store.get("count"), Some(2));

        thread::sleep(Duration::from_millis(150));
        assert_eq!(store.get("count"), None);
    }

    #[test]
    fn test_exists_reflects_liveness() {
        let store = TimedStore::new(Duration::from_secs(60));

        assert!(!store.exists("flag"));
        store.set("flag", 1, Duration::from_millis(40));
        assert!(store.exists("flag"));

        thread::sleep(Duration::from_millis(80));
        assert!(!store.exists("flag"));
    }

    #[test]
    fn test_delete_returns_live_value_only() {
        let store = TimedStore::new(Duration::from_secs(60));

        store.set("live", 9, Duration::from_secs(10));
        assert_eq!(store.delete("live"), Some(9));
        assert_eq!(store.get("live"), None);

        assert_eq!(store.delete("absent"), None);

        store.set("stale", 9, Duration::from_millis(30));
        thread::sleep(Duration::from_millis(70));
        assert_eq!(store.delete("stale"), None);
    }

    #[test]
    fn test_expired_entry_is_evicted_on_access() {
        let store = TimedStore::new(Duration::from_secs(60));

        store.set("stale", 1, Duration::from_millis(30));
        thread::sleep(Duration::from_millis(70));

        assert!(!store.exists("stale"));
        assert!(!store.buckets.lock().contains_key("stale"));
    }

    #[test]
    fn test_reset_clears_everything() {
        let store = TimedStore::new(Duration::from_secs(60));

        store.set("a", 1, Duration::from_secs(10));
        store.increment("b", 2, Duration::from_secs(10));
        store.reset();

        assert_eq!(store.get("a"), None);
        assert_eq!(store.get("b"), None);
        assert!(store.buckets.lock().is_empty());
    }

    #[test]
    fn test_concurrent_increments_are_atomic() {
        let store = Arc::new(TimedStore::new(Duration::from_secs(60)));
        let mut handles = Vec::new();

        for _ in 0..8 {
            let store = store.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    store.increment("count", 1u64, Duration::from_secs(30));
                }
            }));
        }

        for handle in handles {
            handle.join().expect("incrementing thread panicked");
        }

        assert_eq!(store.get("count"), Some(800));
    }
}
