//! Error taxonomy for the query workflow.
//!
//! Node functions never panic across the public boundary: they return a
//! [`QueryError`] and the orchestrator routes on its [`ErrorKind`]. Every
//! kind maps to a user-visible envelope at the `handle_error` terminal.

use serde::{Deserialize, Serialize};

/// Classified failure modes of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Router failed; surfaced as a conversational apology.
    RoutingFailed,
    /// SQL generation produced nothing usable.
    GenerationFailed,
    /// LLM JSON unreadable after one repair attempt.
    ParseFailed,
    /// Database rejected the statement.
    SqlExecutionFailed,
    /// Multi-statement transaction aborted and rolled back.
    TransactionFailed,
    /// Pagination request outside the valid range.
    InvalidPage,
    /// Incremental schema refresh failed; full re-analysis was attempted.
    SchemaRefreshFailed,
    /// Every analytical sub-question failed.
    AnalyticalAllFailed,
    /// An LLM, DB, or whole-turn timeout fired.
    Timeout,
    /// The caller cancelled the turn.
    Cancelled,
}

impl ErrorKind {
    /// Stable snake_case label used in logs and envelopes.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoutingFailed => "routing_failed",
            Self::GenerationFailed => "generation_failed",
            Self::ParseFailed => "parse_failed",
            Self::SqlExecutionFailed => "sql_execution_failed",
            Self::TransactionFailed => "transaction_failed",
            Self::InvalidPage => "invalid_page",
            Self::SchemaRefreshFailed => "schema_refresh_failed",
            Self::AnalyticalAllFailed => "analytical_all_failed",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified workflow error carrying a user-presentable message.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct QueryError {
    /// Which failure mode occurred.
    pub kind: ErrorKind,
    /// Human-readable description, safe to surface verbatim.
    pub message: String,
    /// The SQL involved, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
}

impl QueryError {
    /// Create an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            sql: None,
        }
    }

    /// Attach the SQL statement the error relates to.
    #[must_use]
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }

    /// Shorthand for a generation failure.
    pub fn generation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::GenerationFailed, message)
    }

    /// Shorthand for an execution failure.
    pub fn execution(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SqlExecutionFailed, message)
    }

    /// Shorthand for a parse failure, truncating the raw excerpt.
    pub fn parse(raw: &str) -> Self {
        let excerpt: String = raw.chars().take(200).collect();
        Self::new(
            ErrorKind::ParseFailed,
            format!("could not parse model output: {excerpt}"),
        )
    }

    /// Shorthand for a timeout at a named stage.
    pub fn timeout(stage: &str) -> Self {
        Self::new(ErrorKind::Timeout, format!("timed out during {stage}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_labels_are_snake_case() {
        assert_eq!(ErrorKind::SqlExecutionFailed.as_str(), "sql_execution_failed");
        assert_eq!(ErrorKind::AnalyticalAllFailed.as_str(), "analytical_all_failed");
        assert_eq!(ErrorKind::InvalidPage.as_str(), "invalid_page");
    }

    #[test]
    fn test_parse_error_truncates_excerpt() {
        let raw = "x".repeat(500);
        let err = QueryError::parse(&raw);
        assert!(err.message.len() < 300);
        assert_eq!(err.kind, ErrorKind::ParseFailed);
    }

    #[test]
    fn test_with_sql_round_trips() {
        let err = QueryError::execution("relation does not exist").with_sql("SELECT 1");
        assert_eq!(err.sql.as_deref(), Some("SELECT 1"));
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "sql_execution_failed");
    }
}
