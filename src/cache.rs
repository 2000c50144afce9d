//! Read-through caching of search pages and letter counts.
//!
//! Backend failures never reach callers: they are logged and the value is
//! computed directly.

use std::{
    collections::{HashMap, hash_map::DefaultHasher},
    hash::{Hash, Hasher},
    sync::{
        Arc,
        Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use serde::{Serialize, de::DeserializeOwned};

use crate::{error::Result, query_plan::QueryPlan};

const LETTER_COUNTS_KEY: &str = "wordbank:letter_counts";

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache lock poisoned")]
    Poisoned,

    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
}

/// Key/value storage for serialized values with a time to live.
pub trait CacheBackend: Send + Sync {
    fn get(&self, key: &str) -> std::result::Result<Option<Vec<u8>>, CacheError>;

    fn set(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> std::result::Result<(), CacheError>;

    fn delete(&self, key: &str) -> std::result::Result<(), CacheError>;
}

/// In-process backend. Expired entries are dropped when read.
#[derive(Default)]
pub struct MemoryCache {
    /// Value plus expiry; `None` for a TTL past what `Instant` can hold.
    entries: Mutex<HashMap<String, (Option<Instant>, Vec<u8>)>>,
}

fn is_expired(expires_at: Option<Instant>, now: Instant) -> bool {
    expires_at.is_some_and(|at| at <= now)
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheBackend for MemoryCache {
    fn get(&self, key: &str) -> std::result::Result<Option<Vec<u8>>, CacheError> {
        let mut entries =
            self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        match entries.get(key) {
            Some((expires_at, _)) if is_expired(*expires_at, Instant::now()) => {
                entries.remove(key);
                Ok(None)
            }
            Some((_, value)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    fn set(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> std::result::Result<(), CacheError> {
        let mut entries =
            self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        let now = Instant::now();
        entries.retain(|_, (expires_at, _)| !is_expired(*expires_at, now));
        entries.insert(key.to_string(), (now.checked_add(ttl), value.to_vec()));
        Ok(())
    }

    fn delete(&self, key: &str) -> std::result::Result<(), CacheError> {
        self.entries
            .lock()
            .map_err(|_| CacheError::Poisoned)?
            .remove(key);
        Ok(())
    }
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache").finish_non_exhaustive()
    }
}

/// Stable fingerprint of a normalized search plan.
pub fn plan_fingerprint(plan: &QueryPlan) -> u64 {
    let mut hasher = DefaultHasher::new();
    plan.hash(&mut hasher);
    hasher.finish()
}

/// Cache policy for dictionary reads.
///
/// Search keys embed a generation number that every write bumps, so a
/// page cached before a write is never served after it.
pub struct QueryCache {
    backend: Arc<dyn CacheBackend>,
    generation: AtomicU64,
}

impl QueryCache {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend,
            generation: AtomicU64::new(0),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryCache::new()))
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn search_key(&self, plan: &QueryPlan) -> String {
        format!(
            "wordbank:search:{}:{:016x}",
            self.generation(),
            plan_fingerprint(plan)
        )
    }

    /// Cached search page for `plan`, computing it on a miss.
    pub fn search<T, F>(&self, plan: &QueryPlan, ttl: Duration, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T>,
    {
        let key = self.search_key(plan);
        self.read_through(&key, ttl, compute)
    }

    /// Cached letter counts, computing them on a miss.
    pub fn letter_counts<T, F>(&self, ttl: Duration, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T>,
    {
        self.read_through(LETTER_COUNTS_KEY, ttl, compute)
    }

    /// Forget everything derived from the current dictionary contents.
    pub fn invalidate(&self) {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        if let Err(e) = self.backend.delete(LETTER_COUNTS_KEY) {
            tracing::warn!(error = %e, "failed to drop cached letter counts");
        }
        tracing::debug!(generation, "cache invalidated");
    }

    fn read_through<T, F>(&self, key: &str, ttl: Duration, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T>,
    {
        match self.backend.get(key) {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(value) => {
                    tracing::debug!(key, "cache hit");
                    return Ok(value);
                }
                Err(e) => {
                    tracing::warn!(key, error = %e, "discarding unreadable cache entry");
                }
            },
            Ok(None) => {}
            Err(e) => tracing::warn!(key, error = %e, "cache read failed"),
        }

        let generation = self.generation();
        let value = compute()?;
        // A write landed while computing; the value may predate it.
        if self.generation() != generation {
            return Ok(value);
        }

        match serde_json::to_vec(&value) {
            Ok(bytes) => {
                if let Err(e) = self.backend.set(key, &bytes, ttl) {
                    tracing::warn!(key, error = %e, "cache write failed");
                }
            }
            Err(e) => tracing::warn!(key, error = %e, "cache encode failed"),
        }

        Ok(value)
    }
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache")
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, thread::sleep};

    use super::*;
    use crate::query_plan::{SearchRequest, plan};

    struct BrokenCache;

    impl CacheBackend for BrokenCache {
        fn get(
            &self,
            _key: &str,
        ) -> std::result::Result<Option<Vec<u8>>, CacheError> {
            Err(CacheError::Unavailable("down".into()))
        }

        fn set(
            &self,
            _key: &str,
            _value: &[u8],
            _ttl: Duration,
        ) -> std::result::Result<(), CacheError> {
            Err(CacheError::Unavailable("down".into()))
        }

        fn delete(&self, _key: &str) -> std::result::Result<(), CacheError> {
            Err(CacheError::Unavailable("down".into()))
        }
    }

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn memory_cache_expires() {
        let cache = MemoryCache::new();
        cache.set("a", b"1", Duration::from_millis(20)).unwrap();
        assert_eq!(cache.get("a").unwrap(), Some(b"1".to_vec()));

        sleep(Duration::from_millis(40));
        assert_eq!(cache.get("a").unwrap(), None);

        cache.set("b", b"2", HOUR).unwrap();
        cache.delete("b").unwrap();
        assert_eq!(cache.get("b").unwrap(), None);
    }

    #[test]
    fn huge_ttl_never_expires() {
        let cache = MemoryCache::new();
        cache.set("a", b"1", Duration::from_secs(u64::MAX)).unwrap();
        assert_eq!(cache.get("a").unwrap(), Some(b"1".to_vec()));

        cache.set("b", b"2", Duration::MAX).unwrap();
        assert_eq!(cache.get("a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(cache.get("b").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn read_through_computes_once() {
        let cache = QueryCache::in_memory();
        let p = plan(&SearchRequest::query("akoro")).unwrap();
        let calls = Cell::new(0);

        for _ in 0..3 {
            let v: u32 = cache
                .search(&p, HOUR, || {
                    calls.set(calls.get() + 1);
                    Ok(7)
                })
                .unwrap();
            assert_eq!(v, 7);
        }
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn invalidate_changes_search_keys() {
        let cache = QueryCache::in_memory();
        let p = plan(&SearchRequest::query("akoro")).unwrap();

        let before = cache.search_key(&p);
        cache.invalidate();
        assert_ne!(before, cache.search_key(&p));

        let v: u32 = cache.search(&p, HOUR, || Ok(1)).unwrap();
        assert_eq!(v, 1);
        cache.invalidate();
        let v: u32 = cache.search(&p, HOUR, || Ok(2)).unwrap();
        assert_eq!(v, 2);
    }

    #[test]
    fn invalidate_drops_letter_counts() {
        let cache = QueryCache::in_memory();
        let v: u32 = cache.letter_counts(HOUR, || Ok(1)).unwrap();
        assert_eq!(v, 1);
        let v: u32 = cache.letter_counts(HOUR, || Ok(2)).unwrap();
        assert_eq!(v, 1);

        cache.invalidate();
        let v: u32 = cache.letter_counts(HOUR, || Ok(3)).unwrap();
        assert_eq!(v, 3);
    }

    #[test]
    fn value_computed_across_a_write_is_not_stored() {
        let cache = QueryCache::in_memory();
        let v: u32 = cache
            .letter_counts(HOUR, || {
                cache.invalidate();
                Ok(1)
            })
            .unwrap();
        assert_eq!(v, 1);

        let v: u32 = cache.letter_counts(HOUR, || Ok(2)).unwrap();
        assert_eq!(v, 2);
    }

    #[test]
    fn backend_failures_fall_back_to_compute() {
        let cache = QueryCache::new(Arc::new(BrokenCache));
        let p = plan(&SearchRequest::default()).unwrap();

        let v: String = cache.search(&p, HOUR, || Ok("fresh".into())).unwrap();
        assert_eq!(v, "fresh");
        let v: u32 = cache.letter_counts(HOUR, || Ok(26)).unwrap();
        assert_eq!(v, 26);
        cache.invalidate();
    }

    #[test]
    fn compute_errors_propagate() {
        let cache = QueryCache::in_memory();
        let result: Result<u32> = cache.letter_counts(HOUR, || {
            Err(crate::error::Error::Config("boom".into()))
        });
        assert!(result.is_err());
    }

    #[test]
    fn fingerprint_tracks_every_parameter() {
        let mut req = SearchRequest::query("akoro");
        let a = plan_fingerprint(&plan(&req).unwrap());
        assert_eq!(a, plan_fingerprint(&plan(&req).unwrap()));

        req.page = Some(2);
        assert_ne!(a, plan_fingerprint(&plan(&req).unwrap()));

        let mut other = SearchRequest::query("akoro");
        other.letter = "a".into();
        assert_ne!(a, plan_fingerprint(&plan(&other).unwrap()));
    }
}
