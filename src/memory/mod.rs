//! Conversation memory.
//!
//! Each user and assistant turn is embedded and persisted per session;
//! retrieval returns the top-k semantically similar prior turns as a single
//! prompt-ready blob, truncated to a token budget. Disabled memory returns
//! empty context and stores nothing.

pub mod store;

use std::sync::Arc;

use chrono::Utc;
use regex::Regex;

use crate::embeddings::EmbeddingClient;
use store::{MemoryMetadata, MemoryRecord, MemoryRole, VectorStore};

/// Separator between retrieved turns in the context blob.
const BLOB_SEPARATOR: &str = "\n\n";

/// Heading prepended to a non-empty context blob.
const BLOB_HEADER: &str = "### RELEVANT MEMORY CONTEXT:\n";

/// Vector-backed conversation memory shared by all sessions.
pub struct ConversationMemory {
    embedder: Arc<dyn EmbeddingClient>,
    store: Arc<dyn VectorStore>,
    enabled: bool,
    retrieval_k: usize,
    token_budget: usize,
}

impl ConversationMemory {
    /// Create a memory over the given embedder and store.
    #[must_use]
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        store: Arc<dyn VectorStore>,
        enabled: bool,
        retrieval_k: usize,
        token_budget: usize,
    ) -> Self {
        Self {
            embedder,
            store,
            enabled,
            retrieval_k: retrieval_k.max(1),
            token_budget,
        }
    }

    /// Whether memory is active.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Store one turn. Embedding failures are logged and swallowed; a lost
    /// memory must not fail the turn.
    pub async fn store(
        &self,
        session_id: &str,
        role: MemoryRole,
        text: &str,
        metadata: MemoryMetadata,
    ) {
        if !self.enabled {
            return;
        }

        let mut content = text.to_string();
        if role == MemoryRole::User {
            let personal = extract_personal_info(text);
            if !personal.is_empty() {
                content = format!("{personal}\n\n{content}");
            }
        }

        let embedding = match self.embedder.embed(&content).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(session_id, error = %e, "embedding failed, memory turn dropped");
                return;
            }
        };

        let record = MemoryRecord {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            role,
            text: content,
            metadata,
            embedding,
        };

        if let Err(e) = self.store.upsert(record) {
            tracing::warn!(session_id, error = %e, "memory upsert failed");
        }
    }

    /// Convenience wrapper that records a completed turn (question plus
    /// answer, with SQL metadata on the assistant side).
    pub async fn store_turn(
        &self,
        session_id: &str,
        question: &str,
        answer: &str,
        sql: Option<&str>,
        result_rowcount: Option<usize>,
    ) {
        let now = Utc::now();
        self.store(
            session_id,
            MemoryRole::User,
            question,
            MemoryMetadata {
                question: Some(question.to_string()),
                timestamp: now,
                ..MemoryMetadata::default()
            },
        )
        .await;

        let mut text = format!("Question: {question}\nResponse: {answer}");
        if let Some(sql) = sql {
            text.push_str(&format!("\nSQL: {sql}"));
        }
        if let Some(n) = result_rowcount {
            text.push_str(&format!("\nReturned {n} rows"));
        }
        self.store(
            session_id,
            MemoryRole::Assistant,
            &text,
            MemoryMetadata {
                question: Some(question.to_string()),
                sql: sql.map(String::from),
                result_rowcount,
                timestamp: now,
            },
        )
        .await;
    }

    /// Retrieve the memory context blob for a question. Empty sessions and
    /// disabled memory both return the empty string.
    pub async fn retrieve(&self, session_id: &str, query: &str) -> String {
        self.retrieve_k(session_id, query, self.retrieval_k).await
    }

    /// Retrieve with an explicit k.
    pub async fn retrieve_k(&self, session_id: &str, query: &str, k: usize) -> String {
        if !self.enabled {
            return String::new();
        }

        let embedding = match self.embedder.embed(query).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(session_id, error = %e, "query embedding failed");
                return String::new();
            }
        };

        let hits = self.store.search(session_id, &embedding, k);
        if hits.is_empty() {
            return String::new();
        }

        let mut blob = String::from(BLOB_HEADER);
        let char_budget = self.token_budget.saturating_mul(4);
        let mut first = true;
        for hit in hits {
            let candidate_len = blob.len() + hit.text.len() + BLOB_SEPARATOR.len();
            if !first && candidate_len > char_budget {
                break;
            }
            if !first {
                blob.push_str(BLOB_SEPARATOR);
            }
            blob.push_str(&hit.text);
            first = false;
        }
        blob
    }

    /// Remove all records of a session.
    pub fn delete_session(&self, session_id: &str) {
        if let Err(e) = self.store.delete_session(session_id) {
            tracing::warn!(session_id, error = %e, "memory session delete failed");
        }
    }
}

/// Pull durable personal facts out of a user turn so later retrieval can
/// personalize queries ("my supplier id", "I am in Germany").
#[must_use]
pub fn extract_personal_info(question: &str) -> String {
    let mut facts = Vec::new();

    let name_patterns = [
        r"(?i)my name is (?P<v>[\w\s]+)",
        r"(?i)call me (?P<v>[\w\s]+)",
    ];
    for pattern in name_patterns {
        if let Some(cap) = Regex::new(pattern).ok().and_then(|re| re.captures(question)) {
            facts.push(format!("User name: {}", cap["v"].trim()));
            break;
        }
    }

    if question.to_lowercase().contains("my ") {
        let id_re = Regex::new(
            r"(?i)my (?P<t>user|customer|employee|account|order|client|supplier|vendor) (?:id |number )?(?:is )?(?P<v>\w+)",
        )
        .ok();
        if let Some(cap) = id_re.and_then(|re| re.captures(question)) {
            facts.push(format!("User {} ID: {}", cap["t"].to_lowercase(), cap["v"].trim()));
        }
    }

    let role_re = Regex::new(r"(?i)I (?:am a|'m a|work as a) (?P<v>[\w\s]+)").ok();
    if let Some(cap) = role_re.and_then(|re| re.captures(question)) {
        facts.push(format!("User role: {}", cap["v"].trim()));
    }

    let location_re = Regex::new(r"(?i)I (?:am in|'m in|work in) (?P<v>[\w\s]+)").ok();
    if let Some(cap) = location_re.and_then(|re| re.captures(question)) {
        facts.push(format!("User location: {}", cap["v"].trim()));
    }

    facts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Deterministic embedder: maps text to a 2-d vector by keyword.
    struct KeywordEmbedder;

    #[async_trait]
    impl EmbeddingClient for KeywordEmbedder {
        async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            let rate = text.to_lowercase().contains("rate") as u8 as f32;
            let country = text.to_lowercase().contains("country") as u8 as f32;
            Ok(vec![rate, country, 0.1])
        }

        fn model(&self) -> &str {
            "keyword-test"
        }
    }

    fn memory(dir: &std::path::Path) -> ConversationMemory {
        let store = Arc::new(store::FileVectorStore::open(dir).unwrap());
        ConversationMemory::new(Arc::new(KeywordEmbedder), store, true, 3, 1500)
    }

    #[tokio::test]
    async fn test_cold_start_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mem = memory(dir.path());
        assert_eq!(mem.retrieve("fresh", "anything").await, "");
    }

    #[tokio::test]
    async fn test_store_and_retrieve_relevant_turn() {
        let dir = tempfile::tempdir().unwrap();
        let mem = memory(dir.path());

        mem.store_turn("s1", "what are the rates?", "rates range 10-20", Some("SELECT 1"), Some(3))
            .await;
        mem.store_turn("s1", "which country is cheapest?", "IND", None, None)
            .await;

        let blob = mem.retrieve("s1", "tell me about rate levels").await;
        assert!(blob.starts_with(BLOB_HEADER));
        assert!(blob.contains("rates range 10-20"));
    }

    #[tokio::test]
    async fn test_retrieval_is_session_scoped() {
        let dir = tempfile::tempdir().unwrap();
        let mem = memory(dir.path());

        mem.store_turn("s1", "rate question", "answer one", None, None).await;
        let blob = mem.retrieve("s2", "rate question").await;
        assert_eq!(blob, "");
    }

    #[tokio::test]
    async fn test_disabled_memory_is_inert() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(store::FileVectorStore::open(dir.path()).unwrap());
        let mem = ConversationMemory::new(Arc::new(KeywordEmbedder), store.clone(), false, 3, 1500);

        mem.store_turn("s1", "q", "a", None, None).await;
        assert_eq!(store.session_len("s1"), 0);
        assert_eq!(mem.retrieve("s1", "q").await, "");
    }

    #[tokio::test]
    async fn test_delete_session_clears_memory() {
        let dir = tempfile::tempdir().unwrap();
        let mem = memory(dir.path());
        mem.store_turn("s1", "rate question", "answer", None, None).await;
        mem.delete_session("s1");
        assert_eq!(mem.retrieve("s1", "rate question").await, "");
    }

    #[test]
    fn test_extract_personal_info() {
        let info = extract_personal_info("My name is Dana and I am a procurement manager");
        assert!(info.contains("User name: Dana"));
        assert!(info.contains("User role: procurement manager"));
        assert_eq!(extract_personal_info("show me 5 rows"), "");
    }
}
