//! SQL execution engine.
//!
//! Runs generated SQL against the target database: single SELECTs, and
//! multi-statement edits with transactional rollback. Detected DDL triggers
//! a schema refresh and version bump so dependent caches invalidate.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::database::{self, Database};
use crate::error::QueryError;
use crate::schema::SchemaAnalyzer;

/// Outcome of a row-returning statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectOutcome {
    /// Column names (empty for an empty result set).
    pub columns: Vec<String>,
    /// Result rows, in database order.
    pub rows: Vec<JsonValue>,
    /// Total rows returned.
    pub total_rows: usize,
    /// Wall-clock execution time.
    pub elapsed_ms: u64,
}

/// How a batch of edit statements is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditMode {
    /// Single statement runs directly; multiple statements still promote to
    /// a transaction.
    Auto,
    /// Force a transaction even for one statement.
    Transaction,
}

/// Result of one statement inside an edit batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatementReport {
    /// The statement.
    pub sql: String,
    /// Whether it executed without error.
    pub success: bool,
    /// Affected rows for non-returning statements.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affected_rows: Option<u64>,
    /// Returned rows, when the statement had a RETURNING clause or was a
    /// SELECT.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<JsonValue>>,
    /// Error text for the failing statement.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Executed but undone by the rollback.
    pub rolled_back: bool,
    /// Never executed because an earlier statement failed.
    pub skipped: bool,
}

/// Outcome of an edit batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditOutcome {
    /// Per-statement reports, in input order.
    pub per_statement: Vec<StatementReport>,
    /// Whether the batch ran inside a transaction.
    pub transaction: bool,
    /// Whether a rollback was performed.
    pub rollback_performed: bool,
    /// 1-indexed position of the failing statement, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at_query: Option<usize>,
    /// Whether any committed statement was DDL.
    pub schema_changed: bool,
}

impl EditOutcome {
    /// True when every statement committed.
    #[must_use]
    pub fn success(&self) -> bool {
        self.failed_at_query.is_none()
    }

    /// Error text of the failing statement, if any.
    #[must_use]
    pub fn first_error(&self) -> Option<&str> {
        self.per_statement
            .iter()
            .find_map(|s| s.error.as_deref())
    }
}

/// Seam between the workflow and the database, mockable in tests.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Run a row-returning statement.
    async fn execute_select(&self, sql: &str) -> Result<SelectOutcome, QueryError>;

    /// Run an edit batch.
    async fn execute_edit(&self, sqls: &[String], mode: EditMode) -> Result<EditOutcome, QueryError>;
}

/// Postgres-backed executor.
pub struct ExecutionEngine {
    db: Database,
    analyzer: Arc<SchemaAnalyzer>,
    statement_timeout: Duration,
}

impl ExecutionEngine {
    /// Create an engine over the shared database and analyzer.
    #[must_use]
    pub fn new(db: Database, analyzer: Arc<SchemaAnalyzer>, statement_timeout_secs: u64) -> Self {
        Self {
            db,
            analyzer,
            statement_timeout: Duration::from_secs(statement_timeout_secs),
        }
    }

    async fn refresh_after_ddl(&self, sql: &str) {
        let version = self.analyzer.bump_version();
        tracing::info!(version, "DDL detected, schema version bumped");
        if let Err(e) = self.analyzer.refresh(Some(sql)).await {
            tracing::warn!(error = %e, "schema refresh after DDL failed");
        }
    }

    async fn run_in_transaction(&self, sqls: &[String]) -> Result<EditOutcome, QueryError> {
        let mut tx = self
            .db
            .pool()
            .begin()
            .await
            .map_err(|e| QueryError::execution(format!("failed to open transaction: {e}")))?;

        let mut reports: Vec<StatementReport> = Vec::with_capacity(sqls.len());
        let mut failed_at: Option<usize> = None;
        let mut ddl_seen = false;

        for (idx, sql) in sqls.iter().enumerate() {
            if failed_at.is_some() {
                reports.push(StatementReport {
                    sql: sql.clone(),
                    success: false,
                    affected_rows: None,
                    rows: None,
                    error: None,
                    rolled_back: false,
                    skipped: true,
                });
                continue;
            }

            let result = if database::returns_rows(sql) {
                let fut = sqlx::query(sql).fetch_all(&mut *tx);
                match tokio::time::timeout(self.statement_timeout, fut).await {
                    Err(_) => Err("statement timed out".to_string()),
                    Ok(Err(e)) => Err(e.to_string()),
                    Ok(Ok(rows)) => {
                        let converted: Vec<JsonValue> =
                            rows.iter().map(database::row_to_json).collect();
                        Ok((Some(converted.len() as u64), Some(converted)))
                    }
                }
            } else {
                let fut = sqlx::query(sql).execute(&mut *tx);
                match tokio::time::timeout(self.statement_timeout, fut).await {
                    Err(_) => Err("statement timed out".to_string()),
                    Ok(Err(e)) => Err(e.to_string()),
                    Ok(Ok(done)) => Ok((Some(done.rows_affected()), None)),
                }
            };

            match result {
                Ok((affected, rows)) => {
                    if database::is_ddl_statement(sql) {
                        ddl_seen = true;
                    }
                    reports.push(StatementReport {
                        sql: sql.clone(),
                        success: true,
                        affected_rows: affected,
                        rows,
                        error: None,
                        rolled_back: false,
                        skipped: false,
                    });
                }
                Err(message) => {
                    failed_at = Some(idx + 1);
                    reports.push(StatementReport {
                        sql: sql.clone(),
                        success: false,
                        affected_rows: None,
                        rows: None,
                        error: Some(message),
                        rolled_back: false,
                        skipped: false,
                    });
                }
            }
        }

        if let Some(position) = failed_at {
            tx.rollback()
                .await
                .map_err(|e| QueryError::execution(format!("rollback failed: {e}")))?;
            for report in reports.iter_mut().take(position.saturating_sub(1)) {
                report.rolled_back = true;
            }
            tracing::warn!(
                failed_at = position,
                statements = sqls.len(),
                "transaction rolled back"
            );
            return Ok(EditOutcome {
                per_statement: reports,
                transaction: true,
                rollback_performed: true,
                failed_at_query: Some(position),
                schema_changed: false,
            });
        }

        tx.commit()
            .await
            .map_err(|e| QueryError::execution(format!("commit failed: {e}")))?;

        if ddl_seen {
            if let Some(sql) = sqls.iter().find(|s| database::is_ddl_statement(s)) {
                self.refresh_after_ddl(sql).await;
            }
        }

        tracing::info!(statements = sqls.len(), "transaction committed");
        Ok(EditOutcome {
            per_statement: reports,
            transaction: true,
            rollback_performed: false,
            failed_at_query: None,
            schema_changed: ddl_seen,
        })
    }

    async fn run_single_edit(&self, sql: &str) -> Result<EditOutcome, QueryError> {
        let report = if database::returns_rows(sql) {
            match self.db.fetch_rows(sql).await {
                Ok((_, rows)) => StatementReport {
                    sql: sql.to_string(),
                    success: true,
                    affected_rows: Some(rows.len() as u64),
                    rows: Some(rows),
                    error: None,
                    rolled_back: false,
                    skipped: false,
                },
                Err(e) => StatementReport {
                    sql: sql.to_string(),
                    success: false,
                    affected_rows: None,
                    rows: None,
                    error: Some(e.message),
                    rolled_back: false,
                    skipped: false,
                },
            }
        } else {
            match self.db.execute(sql).await {
                Ok(affected) => StatementReport {
                    sql: sql.to_string(),
                    success: true,
                    affected_rows: Some(affected),
                    rows: None,
                    error: None,
                    rolled_back: false,
                    skipped: false,
                },
                Err(e) => StatementReport {
                    sql: sql.to_string(),
                    success: false,
                    affected_rows: None,
                    rows: None,
                    error: Some(e.message),
                    rolled_back: false,
                    skipped: false,
                },
            }
        };

        let success = report.success;
        let schema_changed = success && database::is_ddl_statement(sql);
        if schema_changed {
            self.refresh_after_ddl(sql).await;
        }

        Ok(EditOutcome {
            failed_at_query: if success { None } else { Some(1) },
            per_statement: vec![report],
            transaction: false,
            rollback_performed: false,
            schema_changed,
        })
    }
}

#[async_trait]
impl QueryExecutor for ExecutionEngine {
    async fn execute_select(&self, sql: &str) -> Result<SelectOutcome, QueryError> {
        let start = Instant::now();
        let (columns, rows) = self.db.fetch_rows(sql).await?;
        let elapsed_ms = start.elapsed().as_millis() as u64;
        tracing::info!(rows = rows.len(), elapsed_ms, "select executed");
        Ok(SelectOutcome {
            columns,
            total_rows: rows.len(),
            rows,
            elapsed_ms,
        })
    }

    async fn execute_edit(&self, sqls: &[String], mode: EditMode) -> Result<EditOutcome, QueryError> {
        if sqls.is_empty() {
            return Err(QueryError::execution("empty edit batch"));
        }

        if mode == EditMode::Transaction || sqls.len() > 1 {
            self.run_in_transaction(sqls).await
        } else {
            self.run_single_edit(&sqls[0]).await
        }
    }
}
