//! Search Cache: LRU with TTL, keyed on
//! `(normalized_query, k, sorted_filter, mode)`.
//!
//! Single mutex, O(1) amortized critical sections. Any ingestion
//! invalidates the entire cache — correctness over hit rate.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

use lru::LruCache;
use rustc_hash::FxHasher;
use tokio::sync::Mutex;

use crate::retrieval::SearchResult;

/// Retrieval mode, part of the cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchMode {
    Dense,
    Hybrid,
}

/// Stable hash over `(normalized_query, k, sorted_filter, mode)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey(u64);

impl CacheKey {
    #[must_use]
    pub fn new(query: &str, k: usize, filter: Option<&BTreeMap<String, String>>, mode: SearchMode) -> Self {
        let normalized_query = query.trim().to_lowercase();
        let mut hasher = FxHasher::default();
        normalized_query.hash(&mut hasher);
        k.hash(&mut hasher);
        mode.hash(&mut hasher);
        if let Some(filter) = filter {
            for (key, value) in filter {
                key.hash(&mut hasher);
                value.hash(&mut hasher);
            }
        }
        Self(hasher.finish())
    }
}

struct Entry {
    results: Vec<SearchResult>,
    inserted_at: Instant,
}

/// LRU+TTL cache fronting the Hybrid Retriever.
pub struct SearchCache {
    ttl: Duration,
    inner: Mutex<LruCache<CacheKey, Entry>>,
}

impl SearchCache {
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = std::num::NonZeroUsize::new(capacity.max(1)).expect("capacity > 0");
        Self {
            ttl,
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Returns the cached value only if it has not expired; an expired or
    /// absent entry is treated as a miss.
    pub async fn get(&self, key: CacheKey) -> Option<Vec<SearchResult>> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        match inner.get(&key) {
            Some(entry) if now.duration_since(entry.inserted_at) <= self.ttl => {
                Some(entry.results.clone())
            }
            Some(_) => {
                inner.pop(&key);
                None
            }
            None => None,
        }
    }

    /// Insert or replace a cached value, evicting least-recently-used at
    /// capacity.
    pub async fn set(&self, key: CacheKey, results: Vec<SearchResult>) {
        self.inner.lock().await.put(
            key,
            Entry {
                results,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Drop every cached entry. Called on successful upsert/delete so stale
    /// hits never outlive the write that invalidated them.
    pub async fn invalidate_all(&self) {
        self.inner.lock().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::SearchResult;

    fn sample_result() -> SearchResult {
        SearchResult {
            chunk_id: "c1".into(),
            source_doc_id: "d1".into(),
            text: "hello".into(),
            metadata: serde_json::json!({}),
            relevance_score: 0.9,
            raw_rerank_score: Some(2.0),
        }
    }

    #[tokio::test]
    async fn hit_within_ttl_returns_value() {
        let cache = SearchCache::new(10, Duration::from_secs(300));
        let key = CacheKey::new("hello", 5, None, SearchMode::Hybrid);
        cache.set(key, vec![sample_result()]).await;
        assert!(cache.get(key).await.is_some());
    }

    #[tokio::test]
    async fn expired_entry_is_a_miss() {
        let cache = SearchCache::new(10, Duration::from_millis(1));
        let key = CacheKey::new("hello", 5, None, SearchMode::Hybrid);
        cache.set(key, vec![sample_result()]).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cache.get(key).await.is_none());
    }

    #[tokio::test]
    async fn invalidate_all_clears_every_entry() {
        let cache = SearchCache::new(10, Duration::from_secs(300));
        let key = CacheKey::new("hello", 5, None, SearchMode::Hybrid);
        cache.set(key, vec![sample_result()]).await;
        cache.invalidate_all().await;
        assert!(cache.get(key).await.is_none());
    }

    #[test]
    fn distinct_queries_produce_distinct_keys() {
        let a = CacheKey::new("hello", 5, None, SearchMode::Hybrid);
        let b = CacheKey::new("world", 5, None, SearchMode::Hybrid);
        assert_ne!(a, b);
    }

    #[test]
    fn normalized_query_case_and_whitespace_insensitive() {
        let a = CacheKey::new("  Hello World  ", 5, None, SearchMode::Hybrid);
        let b = CacheKey::new("hello world", 5, None, SearchMode::Hybrid);
        assert_eq!(a, b);
    }
}
