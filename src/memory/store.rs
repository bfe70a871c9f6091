//! Vector store backing conversation memory.
//!
//! The [`VectorStore`] trait is the swap point per deployment; the bundled
//! [`FileVectorStore`] keeps one JSONL file per session under the configured
//! persist directory and an in-memory index for search. Sessions are fully
//! isolated: search never crosses a session boundary and deleting a session
//! removes its records and file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::embeddings::cosine_similarity;

/// Author of a remembered turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryRole {
    /// The user's question.
    User,
    /// The assistant's answer.
    Assistant,
}

/// Structured metadata attached to a memory record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryMetadata {
    /// The question this record belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    /// SQL generated for the turn, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    /// Result row count, if the turn returned rows.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_rowcount: Option<usize>,
    /// When the turn happened.
    pub timestamp: DateTime<Utc>,
}

/// One embedded conversation turn. Immutable after insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Unique record id.
    pub id: String,
    /// Owning session.
    pub session_id: String,
    /// Author role.
    pub role: MemoryRole,
    /// Stored text.
    pub text: String,
    /// Structured metadata.
    pub metadata: MemoryMetadata,
    /// Embedding vector.
    pub embedding: Vec<f32>,
}

/// Capability interface for per-session vector persistence.
pub trait VectorStore: Send + Sync {
    /// Insert a record.
    fn upsert(&self, record: MemoryRecord) -> anyhow::Result<()>;

    /// Return up to `k` records of the session nearest to `embedding`,
    /// best first.
    fn search(&self, session_id: &str, embedding: &[f32], k: usize) -> Vec<MemoryRecord>;

    /// Remove every record of a session.
    fn delete_session(&self, session_id: &str) -> anyhow::Result<()>;

    /// Number of records stored for a session.
    fn session_len(&self, session_id: &str) -> usize;
}

/// File-backed vector store: one JSONL file per session plus an in-memory
/// index.
pub struct FileVectorStore {
    dir: PathBuf,
    sessions: RwLock<HashMap<String, Vec<MemoryRecord>>>,
}

impl FileVectorStore {
    /// Open (or create) a store rooted at `dir`.
    pub fn open(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    fn session_path(&self, session_id: &str) -> PathBuf {
        let safe: String = session_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("session_{safe}.jsonl"))
    }

    fn load_session(&self, session_id: &str) {
        {
            let sessions = self.sessions.read();
            if sessions.contains_key(session_id) {
                return;
            }
        }
        let path = self.session_path(session_id);
        let records = std::fs::read_to_string(&path)
            .map(|content| {
                content
                    .lines()
                    .filter_map(|line| serde_json::from_str::<MemoryRecord>(line).ok())
                    .filter(|r| r.session_id == session_id)
                    .collect()
            })
            .unwrap_or_default();
        self.sessions
            .write()
            .entry(session_id.to_string())
            .or_insert(records);
    }
}

impl VectorStore for FileVectorStore {
    fn upsert(&self, record: MemoryRecord) -> anyhow::Result<()> {
        self.load_session(&record.session_id);

        let path = self.session_path(&record.session_id);
        let line = serde_json::to_string(&record)?;
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        writeln!(file, "{line}")?;

        self.sessions
            .write()
            .entry(record.session_id.clone())
            .or_default()
            .push(record);
        Ok(())
    }

    fn search(&self, session_id: &str, embedding: &[f32], k: usize) -> Vec<MemoryRecord> {
        self.load_session(session_id);
        let sessions = self.sessions.read();
        let Some(records) = sessions.get(session_id) else {
            return Vec::new();
        };

        let mut scored: Vec<(f32, &MemoryRecord)> = records
            .iter()
            .filter(|r| !r.embedding.is_empty())
            .map(|r| (cosine_similarity(embedding, &r.embedding), r))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().take(k).map(|(_, r)| r.clone()).collect()
    }

    fn delete_session(&self, session_id: &str) -> anyhow::Result<()> {
        self.sessions.write().remove(session_id);
        let path = self.session_path(session_id);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    fn session_len(&self, session_id: &str) -> usize {
        self.load_session(session_id);
        self.sessions
            .read()
            .get(session_id)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(session: &str, text: &str, embedding: Vec<f32>) -> MemoryRecord {
        MemoryRecord {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session.to_string(),
            role: MemoryRole::User,
            text: text.to_string(),
            metadata: MemoryMetadata {
                timestamp: Utc::now(),
                ..MemoryMetadata::default()
            },
            embedding,
        }
    }

    #[test]
    fn test_upsert_search_ranks_by_similarity() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileVectorStore::open(dir.path()).unwrap();

        store.upsert(record("s1", "about rates", vec![1.0, 0.0])).unwrap();
        store.upsert(record("s1", "about countries", vec![0.0, 1.0])).unwrap();

        let hits = store.search("s1", &[0.9, 0.1], 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "about rates");
    }

    #[test]
    fn test_sessions_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileVectorStore::open(dir.path()).unwrap();

        store.upsert(record("s1", "one", vec![1.0])).unwrap();
        store.upsert(record("s2", "two", vec![1.0])).unwrap();

        let hits = store.search("s1", &[1.0], 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].session_id, "s1");
    }

    #[test]
    fn test_persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileVectorStore::open(dir.path()).unwrap();
            store.upsert(record("s1", "persisted", vec![1.0])).unwrap();
        }
        let store = FileVectorStore::open(dir.path()).unwrap();
        assert_eq!(store.session_len("s1"), 1);
        assert_eq!(store.search("s1", &[1.0], 1)[0].text, "persisted");
    }

    #[test]
    fn test_delete_session_removes_records_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileVectorStore::open(dir.path()).unwrap();
        store.upsert(record("s1", "gone", vec![1.0])).unwrap();
        store.delete_session("s1").unwrap();
        assert_eq!(store.session_len("s1"), 0);
        assert!(store.search("s1", &[1.0], 5).is_empty());
    }

    #[test]
    fn test_session_path_sanitizes_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileVectorStore::open(dir.path()).unwrap();
        let path = store.session_path("../evil/../../id");
        assert!(path.starts_with(dir.path()));
        assert!(!path.to_string_lossy().contains(".."));
    }
}
