//! Per-session state and the session registry.
//!
//! A session owns its query cache, result-table registry, probe cache, and
//! edit-mode flag; conversation memory is scoped to the session id inside
//! the shared store. Two concurrent turns in one session serialize on the
//! session's turn mutex. Idle sessions are evicted after a TTL and rebuilt
//! lazily on the next turn.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::cache::QueryCache;
use crate::error::{ErrorKind, QueryError};

/// A materialized result set addressable by `table_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultTable {
    /// Canonical handle.
    pub table_id: String,
    /// SQL that produced the rows.
    pub sql: String,
    /// Column names.
    pub columns: Vec<String>,
    /// Full row set, in original order.
    pub rows: Vec<JsonValue>,
    /// Total row count (`rows.len()`).
    pub total_rows: usize,
    /// Page size chosen at creation.
    pub page_size: usize,
    /// Creation timestamp.
    pub generated_at: DateTime<Utc>,
}

/// One page of a result table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageView {
    /// Rows of this page, in original order.
    pub rows: Vec<JsonValue>,
    /// 1-indexed page number.
    pub page: usize,
    /// Page size used.
    pub page_size: usize,
    /// Total pages at this page size.
    pub total_pages: usize,
    /// Total rows in the table.
    pub total_rows: usize,
    /// Whether a next page exists.
    pub has_next: bool,
    /// Whether a previous page exists.
    pub has_prev: bool,
}

impl ResultTable {
    /// Extract one page. Pages are 1-indexed; requests outside
    /// `[1, total_pages]` fail with `invalid_page`.
    pub fn page(&self, page: usize, page_size: usize) -> Result<PageView, QueryError> {
        let page_size = page_size.max(1);
        let total_pages = self.total_rows.div_ceil(page_size);

        if page == 0 || page > total_pages {
            return Err(QueryError::new(
                ErrorKind::InvalidPage,
                format!(
                    "page {page} is outside the valid range [1, {total_pages}] for table {}",
                    self.table_id
                ),
            ));
        }

        let start = (page - 1) * page_size;
        let end = (start + page_size).min(self.total_rows);
        Ok(PageView {
            rows: self.rows[start..end].to_vec(),
            page,
            page_size,
            total_pages,
            total_rows: self.total_rows,
            has_next: page < total_pages,
            has_prev: page > 1,
        })
    }
}

/// Cached distinct-value probe for one column.
#[derive(Debug, Clone)]
pub struct CachedProbe {
    /// Schema version the probe was taken at.
    pub schema_version: u64,
    /// Distinct values with frequencies, highest frequency first.
    pub values: Vec<(String, i64)>,
    /// Total distinct count in the column.
    pub total_distinct: i64,
}

/// Context carried from the most recent successful turn, used to resolve
/// follow-up references ("those results", "the same filter").
#[derive(Debug, Clone, Default)]
pub struct RecentTurn {
    /// Previous question.
    pub question: String,
    /// Previous SQL.
    pub sql: String,
    /// First few rows of the previous result.
    pub sample_rows: Vec<JsonValue>,
}

/// Per-session state.
pub struct SessionContext {
    /// Opaque session id.
    pub id: String,
    /// Per-session query cache.
    pub cache: QueryCache,
    /// Serializes turns within the session.
    pub turn_lock: tokio::sync::Mutex<()>,
    tables: RwLock<HashMap<String, Arc<ResultTable>>>,
    probe_cache: Mutex<HashMap<String, CachedProbe>>,
    recent: Mutex<Option<RecentTurn>>,
    edit_mode: AtomicBool,
    last_activity: Mutex<DateTime<Utc>>,
}

impl SessionContext {
    fn new(id: String, cache_enabled: bool, cache_capacity: usize, edit_mode: bool) -> Self {
        Self {
            id,
            cache: QueryCache::new(cache_enabled, cache_capacity),
            turn_lock: tokio::sync::Mutex::new(()),
            tables: RwLock::new(HashMap::new()),
            probe_cache: Mutex::new(HashMap::new()),
            recent: Mutex::new(None),
            edit_mode: AtomicBool::new(edit_mode),
            last_activity: Mutex::new(Utc::now()),
        }
    }

    /// Register a result table, returning its id.
    pub fn store_table(&self, table: ResultTable) -> String {
        let id = table.table_id.clone();
        self.tables.write().insert(id.clone(), Arc::new(table));
        id
    }

    /// Look up a result table.
    #[must_use]
    pub fn table(&self, table_id: &str) -> Option<Arc<ResultTable>> {
        self.tables.read().get(table_id).cloned()
    }

    /// Number of registered tables.
    #[must_use]
    pub fn table_count(&self) -> usize {
        self.tables.read().len()
    }

    /// Fetch a cached probe valid at the given schema version.
    #[must_use]
    pub fn probe(&self, column: &str, schema_version: u64) -> Option<CachedProbe> {
        self.probe_cache
            .lock()
            .get(column)
            .filter(|p| p.schema_version == schema_version)
            .cloned()
    }

    /// Store a probe result.
    pub fn store_probe(&self, column: &str, probe: CachedProbe) {
        self.probe_cache.lock().insert(column.to_string(), probe);
    }

    /// Most recent successful turn, if any.
    #[must_use]
    pub fn recent_turn(&self) -> Option<RecentTurn> {
        self.recent.lock().clone()
    }

    /// Record the most recent successful turn.
    pub fn set_recent_turn(&self, turn: RecentTurn) {
        *self.recent.lock() = Some(turn);
    }

    /// Whether edit mode is enabled for this session.
    #[must_use]
    pub fn edit_mode(&self) -> bool {
        self.edit_mode.load(Ordering::SeqCst)
    }

    /// Flip the edit-mode flag.
    pub fn set_edit_mode(&self, enabled: bool) {
        self.edit_mode.store(enabled, Ordering::SeqCst);
    }

    /// Mark activity, resetting the idle clock.
    pub fn touch(&self) {
        *self.last_activity.lock() = Utc::now();
    }

    fn idle_since(&self) -> DateTime<Utc> {
        *self.last_activity.lock()
    }
}

/// Registry of live sessions.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<SessionContext>>>,
    cache_enabled: bool,
    cache_capacity: usize,
    default_edit_mode: bool,
    idle_ttl: Duration,
}

impl SessionRegistry {
    /// Create a registry.
    #[must_use]
    pub fn new(
        cache_enabled: bool,
        cache_capacity: usize,
        default_edit_mode: bool,
        idle_ttl_minutes: i64,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            cache_enabled,
            cache_capacity,
            default_edit_mode,
            idle_ttl: Duration::minutes(idle_ttl_minutes.max(1)),
        }
    }

    /// Get a session, creating it lazily on first use.
    pub fn get_or_create(&self, session_id: &str) -> Arc<SessionContext> {
        if let Some(session) = self.sessions.read().get(session_id) {
            session.touch();
            return session.clone();
        }
        let mut sessions = self.sessions.write();
        let session = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                tracing::info!(session_id, "session created");
                Arc::new(SessionContext::new(
                    session_id.to_string(),
                    self.cache_enabled,
                    self.cache_capacity,
                    self.default_edit_mode,
                ))
            })
            .clone();
        session.touch();
        session
    }

    /// Look up a session without creating it.
    #[must_use]
    pub fn get(&self, session_id: &str) -> Option<Arc<SessionContext>> {
        self.sessions.read().get(session_id).cloned()
    }

    /// Remove a session. Returns whether it existed.
    pub fn remove(&self, session_id: &str) -> bool {
        self.sessions.write().remove(session_id).is_some()
    }

    /// Evict sessions idle past the TTL. Returns the evicted ids.
    pub fn evict_idle(&self) -> Vec<String> {
        let cutoff = Utc::now() - self.idle_ttl;
        let mut sessions = self.sessions.write();
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, s)| s.idle_since() < cutoff)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            sessions.remove(id);
            tracing::info!(session_id = %id, "session evicted after idle TTL");
        }
        expired
    }

    /// Evict stale cache entries in every session after a schema change.
    pub fn invalidate_caches_before(&self, schema_version: u64) {
        for session in self.sessions.read().values() {
            session.cache.invalidate_before(schema_version);
        }
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with_rows(n: usize) -> ResultTable {
        ResultTable {
            table_id: "t1".to_string(),
            sql: "SELECT * FROM t ORDER BY id".to_string(),
            columns: vec!["id".to_string()],
            rows: (0..n).map(|i| serde_json::json!({"id": i})).collect(),
            total_rows: n,
            page_size: 10,
            generated_at: Utc::now(),
        }
    }

    #[test]
    fn test_page_three_of_237_rows() {
        let table = table_with_rows(237);
        let page = table.page(3, 50).unwrap();
        assert_eq!(page.total_pages, 5);
        assert_eq!(page.rows.len(), 50);
        assert_eq!(page.rows[0]["id"], 100);
        assert_eq!(page.rows[49]["id"], 149);
        assert!(page.has_next);
        assert!(page.has_prev);
    }

    #[test]
    fn test_page_zero_and_overflow_fail() {
        let table = table_with_rows(30);
        assert_eq!(table.page(0, 10).unwrap_err().kind, ErrorKind::InvalidPage);
        assert_eq!(table.page(4, 10).unwrap_err().kind, ErrorKind::InvalidPage);
        assert!(table.page(3, 10).is_ok());
    }

    #[test]
    fn test_page_retrieval_is_idempotent() {
        let table = table_with_rows(42);
        let first = table.page(2, 10).unwrap();
        let second = table.page(2, 10).unwrap();
        assert_eq!(first.rows, second.rows);
        assert!(!second.rows.is_empty());
    }

    #[test]
    fn test_empty_table_has_no_valid_pages() {
        let table = table_with_rows(0);
        assert_eq!(table.page(1, 10).unwrap_err().kind, ErrorKind::InvalidPage);
    }

    #[test]
    fn test_last_partial_page() {
        let table = table_with_rows(25);
        let page = table.page(3, 10).unwrap();
        assert_eq!(page.rows.len(), 5);
        assert!(!page.has_next);
    }

    #[test]
    fn test_registry_create_and_remove() {
        let registry = SessionRegistry::new(true, 64, false, 60);
        let s1 = registry.get_or_create("a");
        let again = registry.get_or_create("a");
        assert!(Arc::ptr_eq(&s1, &again));
        assert_eq!(registry.len(), 1);
        assert!(registry.remove("a"));
        assert!(!registry.remove("a"));
    }

    #[test]
    fn test_probe_cache_respects_schema_version() {
        let registry = SessionRegistry::new(true, 64, false, 60);
        let session = registry.get_or_create("s");
        session.store_probe(
            "country",
            CachedProbe {
                schema_version: 1,
                values: vec![("IND".to_string(), 10)],
                total_distinct: 1,
            },
        );
        assert!(session.probe("country", 1).is_some());
        assert!(session.probe("country", 2).is_none());
    }

    #[test]
    fn test_edit_mode_default_and_toggle() {
        let registry = SessionRegistry::new(true, 64, false, 60);
        let session = registry.get_or_create("s");
        assert!(!session.edit_mode());
        session.set_edit_mode(true);
        assert!(session.edit_mode());
    }
}
