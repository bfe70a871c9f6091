//! Per-session query cache.
//!
//! A cache hit must be observationally indistinguishable from a miss, so the
//! fingerprint covers both the normalized question and the schema version:
//! any DDL advances the version and orphans every earlier entry. Orphaned
//! entries are additionally evicted in bulk to bound memory.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};

/// Deterministic cache key for a (question, schema version) pair.
#[must_use]
pub fn fingerprint(question: &str, schema_version: u64) -> String {
    let normalized = question.trim().to_lowercase();
    let normalized = normalized.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hasher.update(b"\x00");
    hasher.update(schema_version.to_le_bytes());
    format!("{:x}", hasher.finalize())
}

/// A cached successful query result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Cache key.
    pub fingerprint: String,
    /// Original question.
    pub question: String,
    /// Generated SQL.
    pub sql: String,
    /// Result column names.
    pub columns: Vec<String>,
    /// Result rows.
    pub rows: Vec<JsonValue>,
    /// When the entry was stored.
    pub created_at: DateTime<Utc>,
    /// Schema version the result was computed at.
    pub schema_version: u64,
}

#[derive(Debug, Default)]
struct CacheInner {
    map: HashMap<String, CacheEntry>,
    order: VecDeque<String>,
}

/// Bounded LRU cache of question results for one session.
#[derive(Debug)]
pub struct QueryCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
    enabled: bool,
}

impl QueryCache {
    /// Create a cache with the given capacity.
    #[must_use]
    pub fn new(enabled: bool, capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            capacity: capacity.max(1),
            enabled,
        }
    }

    /// Look up a question at the given schema version.
    #[must_use]
    pub fn get(&self, question: &str, schema_version: u64) -> Option<CacheEntry> {
        if !self.enabled {
            return None;
        }
        let key = fingerprint(question, schema_version);
        let mut inner = self.inner.lock();
        let entry = inner.map.get(&key)?.clone();
        // Touch for LRU ordering.
        inner.order.retain(|k| k != &key);
        inner.order.push_back(key);
        Some(entry)
    }

    /// Store a successful result.
    pub fn put(&self, entry: CacheEntry) {
        if !self.enabled {
            return;
        }
        let mut inner = self.inner.lock();
        let key = entry.fingerprint.clone();
        if inner.map.insert(key.clone(), entry).is_none() {
            inner.order.push_back(key);
        } else {
            inner.order.retain(|k| k != &key);
            inner.order.push_back(key);
        }
        while inner.order.len() > self.capacity {
            if let Some(evicted) = inner.order.pop_front() {
                inner.map.remove(&evicted);
            }
        }
    }

    /// Evict every entry older than the given schema version.
    pub fn invalidate_before(&self, schema_version: u64) {
        let mut inner = self.inner.lock();
        inner.map.retain(|_, e| e.schema_version >= schema_version);
        let map = &inner.map;
        let retained: VecDeque<String> = inner
            .order
            .iter()
            .filter(|k| map.contains_key(*k))
            .cloned()
            .collect();
        inner.order = retained;
    }

    /// Drop everything.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.map.clear();
        inner.order.clear();
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(question: &str, version: u64) -> CacheEntry {
        CacheEntry {
            fingerprint: fingerprint(question, version),
            question: question.to_string(),
            sql: format!("SELECT /* {question} */ 1"),
            columns: vec!["c".to_string()],
            rows: vec![serde_json::json!({"c": 1})],
            created_at: Utc::now(),
            schema_version: version,
        }
    }

    #[test]
    fn test_fingerprint_normalizes_whitespace_and_case() {
        assert_eq!(
            fingerprint("Show  Me   Rows", 1),
            fingerprint("show me rows", 1)
        );
        assert_ne!(fingerprint("show me rows", 1), fingerprint("show me rows", 2));
    }

    #[test]
    fn test_put_get_round_trip() {
        let cache = QueryCache::new(true, 8);
        cache.put(entry("q1", 1));
        let hit = cache.get("q1", 1).unwrap();
        assert_eq!(hit.rows.len(), 1);
        assert!(cache.get("q1", 2).is_none());
    }

    #[test]
    fn test_disabled_cache_never_hits() {
        let cache = QueryCache::new(false, 8);
        cache.put(entry("q1", 1));
        assert!(cache.get("q1", 1).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_lru_eviction() {
        let cache = QueryCache::new(true, 2);
        cache.put(entry("a", 1));
        cache.put(entry("b", 1));
        // Touch "a" so "b" becomes least recently used.
        assert!(cache.get("a", 1).is_some());
        cache.put(entry("c", 1));
        assert!(cache.get("b", 1).is_none());
        assert!(cache.get("a", 1).is_some());
        assert!(cache.get("c", 1).is_some());
    }

    #[test]
    fn test_invalidate_before() {
        let cache = QueryCache::new(true, 8);
        cache.put(entry("old", 1));
        cache.put(entry("new", 2));
        cache.invalidate_before(2);
        assert!(cache.get("old", 1).is_none());
        assert!(cache.get("new", 2).is_some());
        assert_eq!(cache.len(), 1);
    }
}
