//! Turn state threaded through the graph.
//!
//! A [`TurnState`] is created on entry, transformed by node functions (each
//! consumes the state and returns a new one), and discarded at END. Nodes
//! never mutate shared state through it.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::QueryError;
use crate::execution::SelectOutcome;

/// Which workflow the router chose for the turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowType {
    /// No data retrieval needed.
    Conversational,
    /// One generated query.
    #[default]
    Standard,
    /// Planned multi-query analysis.
    Analytical,
    /// Routing itself failed.
    Error,
}

/// How the generator classified its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationKind {
    /// A read query.
    Select,
    /// A DML/DDL statement.
    Edit,
    /// Several statements joined by the multi-statement separator.
    Multi,
}

/// One planned analytical sub-question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticalQuestion {
    /// The sub-question text.
    pub question: String,
    /// Facet label ("distribution", "ranking", "trend", "comparison").
    pub intent: String,
    /// Columns most relevant to answering it.
    #[serde(default)]
    pub focus_columns: Vec<String>,
}

/// One executed analytical sub-result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticalResult {
    /// The sub-question.
    pub sub_question: String,
    /// SQL that ran (or the last attempted SQL on failure).
    pub sql: String,
    /// What the query shows.
    pub description: String,
    /// Result rows.
    pub rows: Vec<JsonValue>,
    /// Execution time.
    pub elapsed_ms: u64,
    /// Error text when the sub-question failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnalyticalResult {
    /// Whether the sub-question produced usable rows.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Immutable per-turn state.
#[derive(Debug, Clone, Default)]
pub struct TurnState {
    /// The user's question.
    pub question: String,
    /// Caller-supplied role label.
    pub user_role: String,
    /// Whether edit mode is active for the session.
    pub edit_mode: bool,
    /// Rendered schema context blob.
    pub schema_context: String,
    /// Retrieved memory context blob.
    pub memory_context: String,
    /// Chosen workflow.
    pub workflow_type: WorkflowType,
    /// Generated statements (one for standard, many for multi).
    pub sql: Vec<String>,
    /// Generator classification of the statements.
    pub sql_kind: Option<GenerationKind>,
    /// Generator rationale, when one was produced.
    pub rationale: Option<String>,
    /// Execution results for the standard path.
    pub results: Option<SelectOutcome>,
    /// The error that routed the turn to `handle_error`.
    pub error: Option<QueryError>,
    /// Fix attempts consumed so far.
    pub validation_attempts: u32,
    /// Router classification flags.
    pub is_conversational: bool,
    /// Router classification flags.
    pub requires_analysis: bool,
    /// Planned sub-questions (analytical path).
    pub analytical_questions: Vec<AnalyticalQuestion>,
    /// Executed sub-results (analytical path).
    pub analytical_results: Vec<AnalyticalResult>,
    /// Synthesized narrative (analytical path).
    pub comprehensive_analysis: String,
    /// Final natural-language message.
    pub response_text: String,
}

impl TurnState {
    /// Create the entry state for a turn.
    #[must_use]
    pub fn new(question: impl Into<String>, user_role: impl Into<String>, edit_mode: bool) -> Self {
        Self {
            question: question.into(),
            user_role: user_role.into(),
            edit_mode,
            ..Self::default()
        }
    }

    /// Transition: record an error.
    #[must_use]
    pub fn with_error(mut self, error: QueryError) -> Self {
        self.error = Some(error);
        self
    }

    /// Transition: record generated SQL.
    #[must_use]
    pub fn with_sql(mut self, sql: Vec<String>, kind: GenerationKind) -> Self {
        self.sql = sql;
        self.sql_kind = Some(kind);
        self
    }

    /// The single statement of the standard path, when exactly one exists.
    #[must_use]
    pub fn single_sql(&self) -> Option<&str> {
        match self.sql.as_slice() {
            [one] => Some(one.as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_state_defaults() {
        let state = TurnState::new("show me rows", "viewer", false);
        assert_eq!(state.workflow_type, WorkflowType::Standard);
        assert_eq!(state.validation_attempts, 0);
        assert!(state.sql.is_empty());
        assert!(state.error.is_none());
    }

    #[test]
    fn test_single_sql() {
        let state = TurnState::new("q", "viewer", false)
            .with_sql(vec!["SELECT 1".to_string()], GenerationKind::Select);
        assert_eq!(state.single_sql(), Some("SELECT 1"));

        let multi = TurnState::new("q", "viewer", false).with_sql(
            vec!["SELECT 1".to_string(), "SELECT 2".to_string()],
            GenerationKind::Multi,
        );
        assert_eq!(multi.single_sql(), None);
    }

    #[test]
    fn test_workflow_type_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&WorkflowType::Analytical).unwrap(),
            "\"analytical\""
        );
    }
}
