//! Query response envelope.
//!
//! Every turn, including every error path, ends in a [`QueryResponse`] the
//! HTTP layer can return verbatim. The core never panics or throws across
//! this boundary.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::QueryError;
use crate::execution::StatementReport;
use crate::session::PageView;
use crate::workflow::charts::ChartReport;
use crate::workflow::verifier::VerificationReport;

/// Envelope classification of a completed turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    /// Conversational reply, no query ran.
    Conversational,
    /// A SELECT ran and returned rows.
    Sql,
    /// Edit SQL was generated and awaits confirmation.
    EditSql,
    /// Multi-query analytical report.
    Analysis,
    /// A confirmed edit batch was executed.
    EditExecution,
}

/// Pagination descriptor for a materialized result table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pagination {
    /// Canonical table handle.
    pub table_id: String,
    /// 1-indexed current page.
    pub current_page: usize,
    /// Total pages at this page size.
    pub total_pages: usize,
    /// Total rows in the table.
    pub total_rows: usize,
    /// Page size used.
    pub page_size: usize,
    /// Whether a next page exists.
    pub has_next: bool,
    /// Whether a previous page exists.
    pub has_prev: bool,
}

impl Pagination {
    /// Build from a page view.
    #[must_use]
    pub fn from_page(table_id: &str, page: &PageView) -> Self {
        Self {
            table_id: table_id.to_string(),
            current_page: page.page,
            total_pages: page.total_pages,
            total_rows: page.total_rows,
            page_size: page.page_size,
            has_next: page.has_next,
            has_prev: page.has_prev,
        }
    }
}

/// One table of an analytical report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisTable {
    /// Sub-question the table answers.
    pub name: String,
    /// What the query shows.
    pub description: String,
    /// SQL that produced the rows.
    pub sql: String,
    /// First page of rows.
    pub results: Vec<JsonValue>,
    /// Total row count.
    pub row_count: usize,
    /// Handle for further pagination.
    pub table_id: String,
    /// Pagination descriptor.
    pub pagination: Pagination,
}

/// The response envelope for one processed turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    /// Envelope classification.
    pub query_type: QueryType,
    /// Whether the turn succeeded.
    pub success: bool,
    /// Natural-language message.
    pub text: String,
    /// Generated SQL (joined with the multi-statement separator).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    /// Result rows (first page).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<JsonValue>>,
    /// Pagination for `results`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    /// Analytical report tables.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tables: Option<Vec<AnalysisTable>>,
    /// Free-form analysis label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_type: Option<String>,
    /// Edit verification demands review before execution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requires_confirmation: Option<bool>,
    /// Verifier output for edit SQL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_result: Option<VerificationReport>,
    /// Chart recommendations for the result set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visualization_recommendations: Option<ChartReport>,
    /// Whether an edit batch ran inside a transaction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_mode: Option<bool>,
    /// Whether a rollback was performed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback_performed: Option<bool>,
    /// 1-indexed failing statement of an edit batch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at_query: Option<usize>,
    /// Per-statement reports of an edit batch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_results: Option<Vec<StatementReport>>,
    /// Structured error, present on failed turns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<QueryError>,
}

impl QueryResponse {
    fn base(query_type: QueryType, success: bool, text: String) -> Self {
        Self {
            query_type,
            success,
            text,
            sql: None,
            results: None,
            pagination: None,
            tables: None,
            analysis_type: None,
            requires_confirmation: None,
            verification_result: None,
            visualization_recommendations: None,
            transaction_mode: None,
            rollback_performed: None,
            failed_at_query: None,
            query_results: None,
            error: None,
        }
    }

    /// Conversational reply.
    #[must_use]
    pub fn conversational(text: impl Into<String>) -> Self {
        Self::base(QueryType::Conversational, true, text.into())
    }

    /// Failed turn. Every error path produces this shape; the message is
    /// user-presentable.
    #[must_use]
    pub fn from_error(error: QueryError) -> Self {
        let mut response = Self::base(
            QueryType::Conversational,
            false,
            format!("I encountered an error: {}", error.message),
        );
        response.sql = error.sql.clone();
        response.error = Some(error);
        response
    }

    /// Successful SELECT result.
    #[must_use]
    pub fn sql_result(
        text: impl Into<String>,
        sql: impl Into<String>,
        results: Vec<JsonValue>,
        pagination: Pagination,
    ) -> Self {
        let mut response = Self::base(QueryType::Sql, true, text.into());
        response.sql = Some(sql.into());
        response.results = Some(results);
        response.pagination = Some(pagination);
        response
    }

    /// Edit SQL awaiting confirmation.
    #[must_use]
    pub fn edit_pending(
        text: impl Into<String>,
        sql: impl Into<String>,
        verification: VerificationReport,
        requires_confirmation: bool,
    ) -> Self {
        let mut response = Self::base(QueryType::EditSql, true, text.into());
        response.sql = Some(sql.into());
        response.requires_confirmation = Some(requires_confirmation);
        response.verification_result = Some(verification);
        response
    }

    /// Analytical report.
    #[must_use]
    pub fn analysis(
        text: impl Into<String>,
        tables: Vec<AnalysisTable>,
        analysis_type: impl Into<String>,
    ) -> Self {
        let mut response = Self::base(QueryType::Analysis, true, text.into());
        response.tables = Some(tables);
        response.analysis_type = Some(analysis_type.into());
        response
    }

    /// Executed edit batch.
    #[must_use]
    pub fn edit_execution(
        text: impl Into<String>,
        outcome: &crate::execution::EditOutcome,
        sql: impl Into<String>,
    ) -> Self {
        let mut response = Self::base(QueryType::EditExecution, outcome.success(), text.into());
        response.sql = Some(sql.into());
        response.transaction_mode = Some(outcome.transaction);
        response.rollback_performed = Some(outcome.rollback_performed);
        response.failed_at_query = outcome.failed_at_query;
        response.query_results = Some(outcome.per_statement.clone());
        if !outcome.success() {
            response.error = Some(QueryError::new(
                crate::error::ErrorKind::TransactionFailed,
                outcome
                    .first_error()
                    .unwrap_or("transaction aborted")
                    .to_string(),
            ));
        }
        response
    }
}
