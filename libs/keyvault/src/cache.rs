//! Cache-aside store with lazily evaluated freshness
//!
//! A generic key→value store where every entry carries its insertion
//! time and the freshness horizon is supplied by the *reader*: an entry
//! is fresh iff less than `expires_in` has elapsed since it was
//! inserted, checked at the moment of each get-or-build call. There is
//! no background sweep; stale entries are overwritten on the next
//! access or stay put until explicitly removed.
//!
//! The store is an explicitly constructed component, shared via the
//! client that owns it. Concurrent readers and writers are safe on the
//! entry table, but there is no single-flight deduplication: two
//! callers racing on the same stale key may both run the builder and
//! both write, last write winning. Builds are idempotent re-fetches,
//! so this is an accepted inefficiency rather than a correctness
//! problem.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::debug;

/// Compose a cache key from ordered parts.
///
/// Each part is lower-cased and the parts are joined with `:`, so the
/// same parts (case-insensitively, in the same order) always produce
/// the same key. The separator is not escaped: a part containing a
/// literal `:` is indistinguishable from two parts split at that
/// boundary. Callers own their part vocabulary; this is a documented
/// ambiguity, not a collision-free scheme.
pub fn compose_key(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.to_lowercase())
        .collect::<Vec<_>>()
        .join(":")
}

struct Entry<T> {
    value: T,
    inserted_at: Instant,
}

/// Generic cache-aside store.
///
/// `get_or_build` / `get_or_build_async` return a cached value when it
/// is still fresh and otherwise invoke the supplied builder exactly
/// once, storing its result. Builder errors propagate unchanged and
/// nothing is cached for them.
pub struct Cache<T> {
    entries: RwLock<HashMap<String, Entry<T>>>,
}

impl<T> Default for Cache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Cache<T> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Delete any entry for `key`; no-op when absent.
    pub fn remove(&self, key: &str) {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if entries.remove(key).is_some() {
            debug!(key = %key, "Removed cache entry");
        }
    }

    /// Drop every entry. Next access rebuilds from the backend.
    pub fn clear(&self) {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let count = entries.len();
        entries.clear();
        debug!(count = count, "Cleared cache");
    }

    /// Number of entries currently held, fresh or not.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> Cache<T> {
    /// Unconditionally insert or overwrite an entry.
    ///
    /// The entry has no freshness horizon of its own; it stays until
    /// removed or overwritten. A later `get_or_build` still applies
    /// its caller-supplied window against the entry's insertion time.
    pub fn put(&self, key: &str, value: T) {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            key.to_string(),
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    fn get_if_fresh(&self, key: &str, expires_in: Duration) -> Option<T> {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        match entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < expires_in => {
                debug!(key = %key, "Cache hit");
                Some(entry.value.clone())
            }
            Some(_) => {
                debug!(key = %key, "Cache entry stale");
                None
            }
            None => {
                debug!(key = %key, "Cache miss");
                None
            }
        }
    }

    /// Return the fresh cached value for `key`, or invoke `build`
    /// exactly once and cache its result.
    ///
    /// The same `expires_in` should be supplied by all writers of a
    /// given key; freshness is elapsed-time-since-insert compared
    /// against the window the *current* caller passes, so disagreeing
    /// callers will disagree about freshness.
    pub fn get_or_build<E, F>(&self, key: &str, expires_in: Duration, build: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        if let Some(value) = self.get_if_fresh(key, expires_in) {
            return Ok(value);
        }

        let value = build()?;
        self.put(key, value.clone());
        Ok(value)
    }

    /// Same contract as [`get_or_build`](Self::get_or_build), with a
    /// builder that may suspend on I/O.
    ///
    /// The builder future is awaited inline on the caller's task, so a
    /// failure inside it reaches the caller as the original error with
    /// no scheduler-imposed wrapping. The lock is never held across
    /// the await.
    pub async fn get_or_build_async<E, F, Fut>(
        &self,
        key: &str,
        expires_in: Duration,
        build: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get_if_fresh(key, expires_in) {
            return Ok(value);
        }

        let value = build().await?;
        self.put(key, value.clone());
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counted_builder(
        counter: &Arc<AtomicUsize>,
        value: &str,
    ) -> impl FnOnce() -> Result<String, Infallible> {
        let counter = Arc::clone(counter);
        let value = value.to_string();
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(value)
        }
    }

    #[test]
    fn second_call_within_window_does_not_rebuild() {
        let cache: Cache<String> = Cache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let window = Duration::from_secs(60);

        let first = cache
            .get_or_build("k", window, counted_builder(&calls, "v"))
            .unwrap();
        let second = cache
            .get_or_build("k", window, counted_builder(&calls, "other"))
            .unwrap();

        assert_eq!(first, "v");
        assert_eq!(second, "v");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stale_entry_is_rebuilt_and_replaced() {
        let cache: Cache<String> = Cache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let window = Duration::from_millis(50);

        let first = cache
            .get_or_build("k", window, counted_builder(&calls, "v1"))
            .unwrap();
        assert_eq!(first, "v1");

        std::thread::sleep(Duration::from_millis(80));

        let second = cache
            .get_or_build("k", window, counted_builder(&calls, "v2"))
            .unwrap();
        assert_eq!(second, "v2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // Replacement is fresh again
        let third = cache
            .get_or_build("k", window, counted_builder(&calls, "v3"))
            .unwrap();
        assert_eq!(third, "v2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn remove_forces_rebuild() {
        let cache: Cache<String> = Cache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let window = Duration::from_secs(60);

        cache
            .get_or_build("k", window, counted_builder(&calls, "v1"))
            .unwrap();
        cache.remove("k");

        let rebuilt = cache
            .get_or_build("k", window, counted_builder(&calls, "v2"))
            .unwrap();
        assert_eq!(rebuilt, "v2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn remove_missing_key_is_noop() {
        let cache: Cache<String> = Cache::new();
        cache.remove("never-inserted");
        assert!(cache.is_empty());
    }

    #[test]
    fn builder_error_is_not_cached() {
        let cache: Cache<String> = Cache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let window = Duration::from_secs(60);

        let failing = {
            let calls = Arc::clone(&calls);
            move || -> Result<String, String> {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("backend down".to_string())
            }
        };
        let err = cache.get_or_build("k", window, failing).unwrap_err();
        assert_eq!(err, "backend down");
        assert!(cache.is_empty());

        // A later call runs the builder again
        let ok = cache
            .get_or_build("k", window, counted_builder(&calls, "v"))
            .unwrap();
        assert_eq!(ok, "v");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn put_overwrites_and_get_or_build_sees_it() {
        let cache: Cache<String> = Cache::new();
        cache.put("k", "pinned".to_string());

        let calls = Arc::new(AtomicUsize::new(0));
        let got = cache
            .get_or_build("k", Duration::from_secs(60), counted_builder(&calls, "x"))
            .unwrap();
        assert_eq!(got, "pinned");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn clear_drops_everything() {
        let cache: Cache<String> = Cache::new();
        cache.put("a", "1".to_string());
        cache.put("b", "2".to_string());
        assert_eq!(cache.len(), 2);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn compose_key_is_case_insensitive_and_order_preserving() {
        assert_eq!(compose_key(&["A", "b"]), compose_key(&["a", "B"]));
        assert_eq!(compose_key(&["secret", "MySecret"]), "secret:mysecret");
        assert_ne!(compose_key(&["a", "b"]), compose_key(&["b", "a"]));
        // Note: compose_key(&["a", "b"]) == compose_key(&["a:b"]) — the
        // separator is not escaped. Documented, deliberately unasserted.
    }

    #[tokio::test]
    async fn async_builder_runs_once_within_window() {
        let cache: Cache<String> = Cache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let window = Duration::from_secs(60);

        for _ in 0..3 {
            let calls = Arc::clone(&calls);
            let value = cache
                .get_or_build_async("k", window, || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, Infallible>("v".to_string())
                })
                .await
                .unwrap();
            assert_eq!(value, "v");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn async_builder_error_propagates_unwrapped() {
        let cache: Cache<String> = Cache::new();
        let err = cache
            .get_or_build_async("k", Duration::from_secs(60), || async {
                Err::<String, _>("original cause".to_string())
            })
            .await
            .unwrap_err();
        assert_eq!(err, "original cause");
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn concurrent_builds_may_race_but_store_one_output() {
        let cache: Arc<Cache<String>> = Arc::new(Cache::new());
        let window = Duration::from_secs(60);

        let mut handles = Vec::new();
        for i in 0..8 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_build_async("k", window, move || async move {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        Ok::<_, Infallible>(format!("built-{i}"))
                    })
                    .await
                    .unwrap()
            }));
        }
        let mut outputs = Vec::new();
        for handle in handles {
            outputs.push(handle.await.unwrap());
        }

        // Whatever won the race, the stored entry is one of the
        // builders' outputs, never interleaved state, and it is fresh
        // so the probe builder does not run.
        let probe_calls = Arc::new(AtomicUsize::new(0));
        let stored = {
            let probe_calls = Arc::clone(&probe_calls);
            cache
                .get_or_build_async("k", window, move || async move {
                    probe_calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, Infallible>("rebuilt".to_string())
                })
                .await
                .unwrap()
        };
        assert_eq!(probe_calls.load(Ordering::SeqCst), 0);
        assert!(outputs.contains(&stored));
    }
}
