//! Column-value exploration.
//!
//! Grounds generation in real data: before writing SQL, the workflow probes
//! the distinct values of the columns relevant to the question and injects
//! them into the prompt as an observed-values section. Probes are cached per
//! session for the current schema version; numeric columns are skipped (a
//! thousand rate values add nothing but context bloat).

use std::sync::Arc;

use crate::error::QueryError;
use crate::execution::QueryExecutor;
use crate::schema::SchemaContext;
use crate::session::{CachedProbe, SessionContext};

/// Default number of distinct values fetched per column.
const PROBE_LIMIT: i64 = 30;

/// Wider limit for geography-like columns, which commonly need full coverage.
const PROBE_LIMIT_WIDE: i64 = 50;

/// Observed values for one column.
#[derive(Debug, Clone)]
pub struct ColumnValues {
    /// Column name.
    pub column: String,
    /// Values with frequencies, highest frequency first.
    pub values: Vec<(String, i64)>,
    /// Total distinct values in the column.
    pub total_distinct: i64,
}

/// Exploration output for a set of columns.
#[derive(Debug, Clone, Default)]
pub struct Exploration {
    /// Per-column observations, in probe order.
    pub columns: Vec<ColumnValues>,
}

impl Exploration {
    /// Whether anything was observed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Render the observed-values prompt section. Values whose text overlaps
    /// the question are marked so the model prefers them.
    #[must_use]
    pub fn render(&self, question: &str) -> String {
        if self.columns.is_empty() {
            return String::new();
        }

        let question_words: Vec<String> = question
            .to_lowercase()
            .split_whitespace()
            .filter(|w| w.len() > 2)
            .map(String::from)
            .collect();

        let mut out = Vec::new();
        out.push("### OBSERVED VALUES (actual database contents):".to_string());

        for col in &self.columns {
            out.push(format!(
                "- {}: {} total distinct values (showing top {}):",
                col.column,
                col.total_distinct,
                col.values.len()
            ));

            let mut matching = Vec::new();
            let mut others = Vec::new();
            for (value, frequency) in &col.values {
                let value_lower = value.to_lowercase();
                let is_match = question_words.iter().any(|w| {
                    value_lower.contains(w.as_str())
                        || value_lower
                            .split_whitespace()
                            .any(|vw| vw.contains(w.as_str()) || w.contains(vw))
                });
                let line = format!("    '{value}' (frequency: {frequency})");
                if is_match {
                    matching.push(format!("{line} [MATCHES QUESTION]"));
                } else {
                    others.push(line);
                }
            }
            out.extend(matching);
            out.extend(others.into_iter().take(5));
        }

        out.push(String::new());
        out.push("Use these exact values with equality operators (=). Do not expand, rephrase, or re-case them, and do not fall back to LIKE patterns when an exact value is listed.".to_string());
        out.join("\n")
    }
}

/// Column explorer probing through the shared executor.
pub struct ColumnExplorer {
    executor: Arc<dyn QueryExecutor>,
}

impl ColumnExplorer {
    /// Create an explorer.
    #[must_use]
    pub fn new(executor: Arc<dyn QueryExecutor>) -> Self {
        Self { executor }
    }

    /// Probe the given columns, reusing session-cached probes taken at the
    /// current schema version. Unknown and numeric columns are skipped.
    pub async fn explore(
        &self,
        session: &SessionContext,
        schema: &SchemaContext,
        columns: &[String],
        schema_version: u64,
    ) -> Exploration {
        let mut exploration = Exploration::default();

        for column in columns {
            if !schema.has_column(column) {
                tracing::debug!(column, "skipping unknown column");
                continue;
            }
            if schema.is_numeric_column(column) {
                tracing::debug!(column, "skipping numeric column probe");
                continue;
            }

            if let Some(cached) = session.probe(column, schema_version) {
                exploration.columns.push(ColumnValues {
                    column: column.clone(),
                    values: cached.values,
                    total_distinct: cached.total_distinct,
                });
                continue;
            }

            match self.probe_column(schema, column).await {
                Ok(values) => {
                    session.store_probe(
                        column,
                        CachedProbe {
                            schema_version,
                            values: values.values.clone(),
                            total_distinct: values.total_distinct,
                        },
                    );
                    exploration.columns.push(values);
                }
                Err(e) => {
                    tracing::warn!(column, error = %e, "column probe failed");
                }
            }
        }

        exploration
    }

    async fn probe_column(
        &self,
        schema: &SchemaContext,
        column: &str,
    ) -> Result<ColumnValues, QueryError> {
        let limit = probe_limit(column);
        let qualified = schema.qualified_table();

        let sql = format!(
            "SELECT \"{column}\"::text AS value, COUNT(*) AS frequency \
             FROM {qualified} \
             WHERE \"{column}\" IS NOT NULL \
             GROUP BY \"{column}\" \
             ORDER BY frequency DESC, value \
             LIMIT {limit}"
        );
        let outcome = self.executor.execute_select(&sql).await?;

        let values: Vec<(String, i64)> = outcome
            .rows
            .iter()
            .filter_map(|row| {
                Some((
                    row["value"].as_str()?.to_string(),
                    row["frequency"].as_i64().unwrap_or(0),
                ))
            })
            .collect();

        let distinct_sql = format!(
            "SELECT COUNT(DISTINCT \"{column}\") AS total FROM {qualified} \
             WHERE \"{column}\" IS NOT NULL"
        );
        let distinct_outcome = self.executor.execute_select(&distinct_sql).await?;
        let total_distinct = distinct_outcome
            .rows
            .first()
            .and_then(|r| r["total"].as_i64())
            .unwrap_or(values.len() as i64);

        tracing::info!(column, values = values.len(), total_distinct, "column probed");

        Ok(ColumnValues {
            column: column.to_string(),
            values,
            total_distinct,
        })
    }
}

fn probe_limit(column: &str) -> i64 {
    let lower = column.to_lowercase();
    if ["country", "region", "location", "city", "site"]
        .iter()
        .any(|w| lower.contains(w))
    {
        PROBE_LIMIT_WIDE
    } else {
        PROBE_LIMIT
    }
}
