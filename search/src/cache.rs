//! Response cache capability and a bounded in-memory implementation.

use crate::model::SearchResponse;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

pub trait SearchCache: Send + Sync {
    fn get(&self, key: &str) -> Option<SearchResponse>;
    fn set(&self, key: &str, value: SearchResponse, ttl: Duration);
    fn clear(&self);
}

struct Entry {
    expires_at: Instant,
    value: SearchResponse,
}

/// LRU-bounded map with per-entry expiry. Expired entries are dropped when
/// read or when evicted by newer ones.
pub struct MemoryCache {
    entries: Mutex<LruCache<String, Entry>>,
}

impl MemoryCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self { entries: Mutex::new(LruCache::new(capacity)) }
    }

    pub fn len(&self) -> usize { self.entries.lock().len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

impl Default for MemoryCache {
    fn default() -> Self { Self::new(DEFAULT_CACHE_CAPACITY) }
}

impl SearchCache for MemoryCache {
    fn get(&self, key: &str) -> Option<SearchResponse> {
        let mut entries = self.entries.lock();
        let fresh = entries.peek(key)?.expires_at > Instant::now();
        if !fresh {
            entries.pop(key);
            return None;
        }
        entries.get(key).map(|entry| entry.value.clone())
    }

    fn set(&self, key: &str, value: SearchResponse, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        self.entries.lock().put(key.to_string(), Entry { expires_at, value });
    }

    fn clear(&self) { self.entries.lock().clear(); }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SearchMode;

    fn response(q: &str) -> SearchResponse {
        let mut r = SearchResponse::empty(q, SearchMode::Local, "");
        r.metadata.error = None;
        r
    }

    #[test]
    fn entries_expire() {
        let cache = MemoryCache::new(4);
        cache.set("k", response("q"), Duration::from_millis(20));
        assert_eq!(cache.get("k").map(|r| r.query), Some("q".to_string()));
        std::thread::sleep(Duration::from_millis(40));
        assert!(cache.get("k").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn least_recently_used_is_evicted() {
        let cache = MemoryCache::new(2);
        let ttl = Duration::from_secs(60);
        cache.set("a", response("a"), ttl);
        cache.set("b", response("b"), ttl);
        cache.get("a");
        cache.set("c", response("c"), ttl);
        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        cache.clear();
        assert!(cache.is_empty());
    }
}
