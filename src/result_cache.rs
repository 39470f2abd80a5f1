//! Bounded memoization of matching results keyed by normalized request.
use std::{
    num::NonZeroUsize,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use lru::LruCache;

use crate::model::DeliveryResponse;

/// A cached matching result. Shared between the cache and every caller that hits it.
pub type CachedResult = Arc<Vec<DeliveryResponse>>;

/// Least-recently-used cache of matching results.
///
/// Every entry belongs to the snapshot version it was computed against. The cache only ever
/// holds entries of a single version: observing a newer version drops all entries at once, and
/// results computed against an older version are neither served nor stored.
///
/// A lookup refreshes the recency of the entry, so lookups take the same exclusive lock as
/// inserts. The critical section is a hash lookup and a list splice.
pub struct ResultCache {
    state: Mutex<CacheState>,
    hits: AtomicU64,
    misses: AtomicU64,
}

struct CacheState {
    version: u64,
    entries: LruCache<String, CachedResult>,
}

impl CacheState {
    /// Move the cache to `version`, discarding older entries. Returns `false` if the cache
    /// already holds a newer version.
    fn advance_to(&mut self, version: u64) -> bool {
        if version < self.version {
            return false;
        }
        if version > self.version {
            self.entries.clear();
            self.version = version;
        }
        true
    }
}

impl ResultCache {
    /// Create an empty cache holding at most `capacity` entries.
    pub fn new(capacity: NonZeroUsize) -> ResultCache {
        ResultCache {
            state: Mutex::new(CacheState {
                version: 0,
                entries: LruCache::new(capacity),
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up `key` as computed against snapshot `version`.
    pub fn get(&self, version: u64, key: &str) -> Option<CachedResult> {
        let mut state = self.lock();
        let found = if state.version == version {
            state.entries.get(key).cloned()
        } else {
            None
        };
        drop(state);

        match found {
            Some(result) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                log::trace!(target: "targeting", cache_key = key; "result cache hit");
                Some(result)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                log::trace!(target: "targeting", cache_key = key; "result cache miss");
                None
            }
        }
    }

    /// Store `result` computed against snapshot `version`.
    ///
    /// When the cache is full, exactly the least-recently-used entry is evicted first.
    pub fn put(&self, version: u64, key: String, result: CachedResult) {
        let mut state = self.lock();
        if !state.advance_to(version) {
            log::trace!(target: "targeting", cache_key:display = key; "discarding result computed against a superseded snapshot");
            return;
        }

        let replaced = state.entries.contains(&key);
        if let Some((evicted, _)) = state.entries.push(key, result) {
            if !replaced {
                log::trace!(target: "targeting", cache_key:display = evicted; "evicted result cache entry");
            }
        }
    }

    /// Drop every entry and start accepting results for snapshot `version`.
    pub fn invalidate(&self, version: u64) {
        let mut state = self.lock();
        state.advance_to(version);
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Returns `true` if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.lock().entries.cap().get()
    }

    /// Number of lookups served from the cache.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Number of lookups that required a matching pass.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheState> {
        self.state
            .lock()
            .expect("thread holding result cache lock should not panic")
    }
}

#[cfg(test)]
mod tests {
    use std::{num::NonZeroUsize, sync::Arc};

    use super::{CachedResult, ResultCache};
    use crate::model::DeliveryResponse;

    fn cache(capacity: usize) -> ResultCache {
        ResultCache::new(NonZeroUsize::new(capacity).unwrap())
    }

    fn result(cid: &str) -> CachedResult {
        Arc::new(vec![DeliveryResponse {
            cid: cid.to_owned(),
            img: format!("https://{cid}"),
            cta: "Install".to_owned(),
        }])
    }

    #[test]
    fn returns_stored_result() {
        let cache = cache(4);
        cache.put(1, "a|US|android".to_owned(), result("spotify"));

        let hit = cache.get(1, "a|US|android").unwrap();

        assert_eq!(hit[0].cid, "spotify");
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 0);
    }

    #[test]
    fn counts_misses() {
        let cache = cache(4);

        assert!(cache.get(1, "missing").is_none());
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = cache(2);
        cache.put(1, "a".to_owned(), result("a"));
        cache.put(1, "b".to_owned(), result("b"));
        // Touch "a" so that "b" becomes the eviction candidate.
        assert!(cache.get(1, "a").is_some());

        cache.put(1, "c".to_owned(), result("c"));

        assert_eq!(cache.len(), 2);
        assert!(cache.get(1, "a").is_some());
        assert!(cache.get(1, "b").is_none());
        assert!(cache.get(1, "c").is_some());
    }

    #[test]
    fn overwriting_key_does_not_evict() {
        let cache = cache(2);
        cache.put(1, "a".to_owned(), result("a"));
        cache.put(1, "b".to_owned(), result("b"));
        cache.put(1, "a".to_owned(), result("a2"));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(1, "a").unwrap()[0].cid, "a2");
        assert!(cache.get(1, "b").is_some());
    }

    #[test]
    fn invalidate_drops_everything() {
        let cache = cache(4);
        cache.put(1, "a".to_owned(), result("a"));
        cache.put(1, "b".to_owned(), result("b"));

        cache.invalidate(2);

        assert!(cache.is_empty());
        assert!(cache.get(2, "a").is_none());
    }

    #[test]
    fn ignores_results_from_superseded_snapshot() {
        let cache = cache(4);
        cache.invalidate(2);

        cache.put(1, "a".to_owned(), result("a"));

        assert!(cache.is_empty());
    }

    #[test]
    fn newer_result_replaces_older_entries() {
        let cache = cache(4);
        cache.put(1, "a".to_owned(), result("a"));

        cache.put(2, "b".to_owned(), result("b"));

        assert_eq!(cache.len(), 1);
        assert!(cache.get(1, "a").is_none());
        assert!(cache.get(2, "b").is_some());
    }

    #[test]
    fn never_serves_entries_to_other_versions() {
        let cache = cache(4);
        cache.put(1, "a".to_owned(), result("a"));

        assert!(cache.get(2, "a").is_none());
        assert!(cache.get(1, "a").is_some());
    }
}
