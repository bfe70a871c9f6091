//! Analytical multi-query workflow.
//!
//! Decomposes a broad question into a small portfolio of sub-questions,
//! grounds each in column exploration, generates and executes SQL per
//! sub-question, and synthesizes one narrative over the collected results.
//! Sub-questions are independent: one failure never aborts the others, and
//! the report keeps planner order.

use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::error::{ErrorKind, QueryError};
use crate::execution::QueryExecutor;
use crate::llm::{parse, LlmClient, LlmRequest};
use crate::prompts::PromptLibrary;
use crate::schema::SchemaContext;
use crate::session::SessionContext;
use crate::workflow::exploration::ColumnExplorer;
use crate::workflow::state::{AnalyticalQuestion, AnalyticalResult};

/// Queries kept per sub-question.
const MAX_QUERIES_PER_QUESTION: usize = 3;

/// Q3-Q1 spread below this is treated as a single-value range when sampling.
const MEANINGFUL_RANGE_THRESHOLD: f64 = 2.0;

/// One generated query for a sub-question.
#[derive(Debug, Clone)]
struct PlannedQuery {
    sql: String,
    description: String,
}

/// Manager for the analytical path.
pub struct AnalyticalManager {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLibrary>,
    explorer: Arc<ColumnExplorer>,
    executor: Arc<dyn QueryExecutor>,
    min_questions: usize,
    max_questions: usize,
}

impl AnalyticalManager {
    /// Create a manager.
    #[must_use]
    pub fn new(
        llm: Arc<dyn LlmClient>,
        prompts: Arc<PromptLibrary>,
        explorer: Arc<ColumnExplorer>,
        executor: Arc<dyn QueryExecutor>,
        min_questions: usize,
        max_questions: usize,
    ) -> Self {
        Self {
            llm,
            prompts,
            explorer,
            executor,
            min_questions: min_questions.max(1),
            max_questions: max_questions.max(2),
        }
    }

    /// Minimum sub-questions before the turn degrades to the standard path.
    #[must_use]
    pub fn min_questions(&self) -> usize {
        self.min_questions
    }

    /// Plan sub-questions for a broad question.
    ///
    /// Duplicates are removed and the list is capped at the configured
    /// maximum. A result below the minimum is returned as-is; the caller
    /// decides whether to degrade.
    pub async fn plan(
        &self,
        question: &str,
        schema_context: &str,
        memory_context: &str,
    ) -> Result<Vec<AnalyticalQuestion>, QueryError> {
        let memory = render_memory(memory_context);
        let min = self.min_questions.to_string();
        let max = self.max_questions.to_string();

        let messages = self
            .prompts
            .analytical_questions
            .render(&[
                ("memory", memory.as_str()),
                ("schema", schema_context),
                ("question", question),
                ("min_questions", min.as_str()),
                ("max_questions", max.as_str()),
            ])
            .map_err(|e| QueryError::generation(e.to_string()))?;

        let response = self
            .llm
            .complete(LlmRequest::new(messages))
            .await
            .map_err(|e| QueryError::generation(format!("planner call failed: {e}")))?;

        let value = parse::extract_json_with_key(&response.content, "questions")
            .ok_or_else(|| QueryError::parse(&response.content))?;

        let mut questions = Vec::new();
        let mut seen = Vec::new();
        for item in value["questions"].as_array().cloned().unwrap_or_default() {
            let Some(text) = item.get("question").and_then(JsonValue::as_str) else {
                continue;
            };
            let normalized = text.trim().to_lowercase();
            if normalized.is_empty() || seen.contains(&normalized) {
                continue;
            }
            seen.push(normalized);
            questions.push(AnalyticalQuestion {
                question: text.trim().to_string(),
                intent: item
                    .get("intent")
                    .and_then(JsonValue::as_str)
                    .unwrap_or("analysis")
                    .to_string(),
                focus_columns: item
                    .get("focus_columns")
                    .and_then(JsonValue::as_array)
                    .map(|arr| {
                        arr.iter()
                            .filter_map(|c| c.as_str().map(String::from))
                            .collect()
                    })
                    .unwrap_or_default(),
            });
            if questions.len() == self.max_questions {
                break;
            }
        }

        tracing::info!(planned = questions.len(), "analytical questions planned");
        Ok(questions)
    }

    /// Execute every sub-question sequentially in planner order.
    ///
    /// Returns `analytical_all_failed` only when no sub-question produced
    /// usable rows.
    pub async fn execute(
        &self,
        session: &SessionContext,
        schema: &SchemaContext,
        schema_blob: &str,
        questions: &[AnalyticalQuestion],
        schema_version: u64,
    ) -> Result<Vec<AnalyticalResult>, QueryError> {
        let mut results = Vec::new();
        let mut previous_questions: Vec<String> = Vec::new();
        let mut first_error: Option<String> = None;

        for (index, question) in questions.iter().enumerate() {
            tracing::info!(
                index = index + 1,
                total = questions.len(),
                sub_question = %question.question,
                "executing analytical sub-question"
            );

            let exploration = self
                .explorer
                .explore(session, schema, &question.focus_columns, schema_version)
                .await;
            let observed = exploration.render(&question.question);
            let enhanced_schema = if observed.is_empty() {
                schema_blob.to_string()
            } else {
                format!("{schema_blob}\n\n{observed}")
            };

            let queries = self
                .generate_queries(&question.question, &enhanced_schema, &previous_questions)
                .await;
            previous_questions.push(question.question.clone());

            if queries.is_empty() {
                let message = "no queries generated for sub-question".to_string();
                first_error.get_or_insert(message.clone());
                results.push(AnalyticalResult {
                    sub_question: question.question.clone(),
                    sql: String::new(),
                    description: question.intent.clone(),
                    rows: Vec::new(),
                    elapsed_ms: 0,
                    error: Some(message),
                });
                continue;
            }

            let mut any_success = false;
            let mut last_failure: Option<(String, String)> = None;

            for query in &queries {
                match self.run_query(&query.sql, &enhanced_schema).await {
                    Ok((rows, elapsed_ms, fixed_sql)) => {
                        if rows.is_empty() || has_null_aggregates(&rows) {
                            last_failure = Some((
                                query.sql.clone(),
                                "query returned no usable rows".to_string(),
                            ));
                            continue;
                        }
                        any_success = true;
                        previous_questions.push(query.description.clone());
                        results.push(AnalyticalResult {
                            sub_question: question.question.clone(),
                            sql: fixed_sql,
                            description: query.description.clone(),
                            rows,
                            elapsed_ms,
                            error: None,
                        });
                    }
                    Err(e) => {
                        last_failure = Some((query.sql.clone(), e.message.clone()));
                    }
                }
            }

            if !any_success {
                let (sql, message) =
                    last_failure.unwrap_or_else(|| (String::new(), "no results".to_string()));
                first_error.get_or_insert(message.clone());
                tracing::warn!(sub_question = %question.question, error = %message, "sub-question failed");
                results.push(AnalyticalResult {
                    sub_question: question.question.clone(),
                    sql,
                    description: question.intent.clone(),
                    rows: Vec::new(),
                    elapsed_ms: 0,
                    error: Some(message),
                });
            }
        }

        if results.iter().all(|r| !r.succeeded()) {
            return Err(QueryError::new(
                ErrorKind::AnalyticalAllFailed,
                first_error.unwrap_or_else(|| "all analytical sub-questions failed".to_string()),
            ));
        }

        Ok(results)
    }

    async fn generate_queries(
        &self,
        question: &str,
        schema_context: &str,
        previous_questions: &[String],
    ) -> Vec<PlannedQuery> {
        let previous = if previous_questions.is_empty() {
            "No previous questions generated yet.".to_string()
        } else {
            previous_questions
                .iter()
                .map(|q| format!("- {q}"))
                .collect::<Vec<_>>()
                .join("\n")
        };

        let messages = match self.prompts.flexible_queries.render(&[
            ("schema", schema_context),
            ("question", question),
            ("previous_questions", previous.as_str()),
        ]) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(error = %e, "flexible query prompt failed");
                return Vec::new();
            }
        };

        let response = match self.llm.complete(LlmRequest::new(messages)).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "flexible query call failed");
                return Vec::new();
            }
        };

        let Some(value) = parse::extract_json_with_key(&response.content, "queries") else {
            tracing::warn!("flexible query response unparseable");
            return Vec::new();
        };

        let mut queries = Vec::new();
        for (i, item) in value["queries"]
            .as_array()
            .cloned()
            .unwrap_or_default()
            .iter()
            .enumerate()
        {
            let Some(sql) = item.get("sql").and_then(JsonValue::as_str) else {
                continue;
            };
            if sql.trim().is_empty() {
                continue;
            }
            queries.push(PlannedQuery {
                sql: sql.trim().to_string(),
                description: item
                    .get("description")
                    .and_then(JsonValue::as_str)
                    .map(String::from)
                    .unwrap_or_else(|| format!("Query {} for {question}", i + 1)),
            });
            if queries.len() == MAX_QUERIES_PER_QUESTION {
                break;
            }
        }
        queries
    }

    /// Execute a query with one fix attempt. Returns rows, elapsed time, and
    /// the SQL that finally ran.
    async fn run_query(
        &self,
        sql: &str,
        schema_context: &str,
    ) -> Result<(Vec<JsonValue>, u64, String), QueryError> {
        match self.executor.execute_select(sql).await {
            Ok(outcome) => Ok((outcome.rows, outcome.elapsed_ms, sql.to_string())),
            Err(first) => {
                tracing::warn!(error = %first.message, "analytical query failed, attempting fix");
                let fixed = self.fix_query(sql, &first.message, schema_context).await?;
                let outcome = self.executor.execute_select(&fixed).await?;
                Ok((outcome.rows, outcome.elapsed_ms, fixed))
            }
        }
    }

    async fn fix_query(
        &self,
        sql: &str,
        error: &str,
        schema_context: &str,
    ) -> Result<String, QueryError> {
        let messages = self
            .prompts
            .sql_fix
            .render(&[
                ("memory", ""),
                ("schema", schema_context),
                ("sql", sql),
                ("error", error),
            ])
            .map_err(|e| QueryError::generation(e.to_string()))?;

        let response = self
            .llm
            .complete(LlmRequest::new(messages))
            .await
            .map_err(|e| QueryError::generation(format!("fix call failed: {e}")))?;

        let fixed = parse::extract_sql(&response.content);
        if fixed.trim().is_empty() {
            return Err(QueryError::execution(error.to_string()).with_sql(sql));
        }
        Ok(fixed)
    }

    /// Synthesize the narrative over all sub-results.
    pub async fn synthesize(
        &self,
        question: &str,
        results: &[AnalyticalResult],
        schema_context: &str,
        memory_context: &str,
    ) -> Result<String, QueryError> {
        let mut summary = Vec::new();
        for result in results {
            if result.succeeded() {
                let sampled = smart_sample(&result.rows);
                summary.push(serde_json::json!({
                    "sub_question": result.sub_question,
                    "description": result.description,
                    "sql": result.sql,
                    "results": sampled.rows,
                    "row_count": result.rows.len(),
                    "sampling_info": sampled.info,
                    "elapsed_ms": result.elapsed_ms,
                }));
            } else {
                summary.push(serde_json::json!({
                    "sub_question": result.sub_question,
                    "error": result.error,
                }));
            }
        }

        let results_json = serde_json::to_string_pretty(&summary)
            .map_err(|e| QueryError::generation(e.to_string()))?;
        let memory = render_memory(memory_context);

        let messages = self
            .prompts
            .comprehensive_analysis
            .render(&[
                ("memory", memory.as_str()),
                ("schema", schema_context),
                ("question", question),
                ("analytical_results", results_json.as_str()),
            ])
            .map_err(|e| QueryError::generation(e.to_string()))?;

        let response = self
            .llm
            .complete(LlmRequest::new(messages))
            .await
            .map_err(|e| QueryError::generation(format!("synthesis call failed: {e}")))?;

        if response.content.trim().is_empty() {
            return Err(QueryError::generation("synthesis produced no text"));
        }
        Ok(response.content)
    }
}

fn render_memory(memory_context: &str) -> String {
    if memory_context.is_empty() {
        String::new()
    } else {
        format!("{memory_context}\n\n")
    }
}

/// Sampled view of one sub-result.
#[derive(Debug, Clone)]
pub struct SampledRows {
    /// Rows kept for the synthesizer.
    pub rows: Vec<JsonValue>,
    /// Human-readable description of what was kept.
    pub info: String,
    /// Whether anything was dropped.
    pub applied: bool,
}

/// Sampling before synthesis: small sets pass through (filtered to
/// meaningful ranges when enough exist), large sets keep the extremes
/// (top 5 + bottom 5), preferring rows whose Q3-Q1 spread is meaningful.
#[must_use]
pub fn smart_sample(rows: &[JsonValue]) -> SampledRows {
    if rows.is_empty() {
        return SampledRows {
            rows: Vec::new(),
            info: "no results available".to_string(),
            applied: false,
        };
    }

    let total = rows.len();
    let meaningful: Vec<JsonValue> = rows
        .iter()
        .filter(|r| has_meaningful_range(r))
        .cloned()
        .collect();

    if total <= 10 {
        if meaningful.len() >= 5 && meaningful.len() < total {
            return SampledRows {
                info: format!(
                    "{} rows with meaningful ranges kept of {total} total",
                    meaningful.len()
                ),
                applied: true,
                rows: meaningful,
            };
        }
        return SampledRows {
            rows: rows.to_vec(),
            info: format!("all {total} rows included"),
            applied: false,
        };
    }

    let pick_extremes = |source: &[JsonValue]| -> Vec<JsonValue> {
        let mut sampled: Vec<JsonValue> = source[..5].to_vec();
        sampled.extend_from_slice(&source[source.len() - 5..]);
        sampled
    };

    if meaningful.len() >= 10 {
        SampledRows {
            rows: pick_extremes(&meaningful),
            info: format!(
                "top 5 + bottom 5 of {} meaningful ranges ({total} rows total)",
                meaningful.len()
            ),
            applied: true,
        }
    } else if meaningful.len() >= 5 {
        let mut sampled = meaningful.clone();
        for row in rows {
            if sampled.len() >= 10 {
                break;
            }
            if !has_meaningful_range(row) {
                sampled.push(row.clone());
            }
        }
        SampledRows {
            info: format!(
                "{} meaningful ranges plus fill rows ({total} rows total)",
                meaningful.len()
            ),
            rows: sampled,
            applied: true,
        }
    } else {
        SampledRows {
            rows: pick_extremes(rows),
            info: format!("top 5 + bottom 5 of {total} rows"),
            applied: true,
        }
    }
}

/// A row has a meaningful range when its Q1/Q3 values spread wider than the
/// threshold. Rows without quartile columns pass by default.
#[must_use]
pub fn has_meaningful_range(row: &JsonValue) -> bool {
    let Some(object) = row.as_object() else {
        return true;
    };

    let mut q1 = None;
    let mut q3 = None;
    for (key, value) in object {
        let lower = key.to_lowercase();
        if lower.contains("q1") {
            q1 = value.as_f64();
        } else if lower.contains("q3") {
            q3 = value.as_f64();
        }
    }

    match (q1, q3) {
        (Some(a), Some(b)) => (b - a).abs() > MEANINGFUL_RANGE_THRESHOLD,
        _ => true,
    }
}

/// Aggregation columns (avg/sum/count/min/max/total/mean) that came back
/// NULL signal a filter that matched nothing.
#[must_use]
pub fn has_null_aggregates(rows: &[JsonValue]) -> bool {
    let aggregate_markers = ["avg", "sum", "count", "min", "max", "total", "mean"];
    rows.iter().any(|row| {
        row.as_object().is_some_and(|object| {
            object.iter().any(|(key, value)| {
                let lower = key.to_lowercase();
                aggregate_markers.iter().any(|m| lower.contains(m)) && value.is_null()
            })
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quartile_row(q1: f64, q3: f64) -> JsonValue {
        serde_json::json!({"supplier": "S", "q1": q1, "q2_median": (q1 + q3) / 2.0, "q3": q3})
    }

    #[test]
    fn test_meaningful_range_threshold() {
        assert!(has_meaningful_range(&quartile_row(10.0, 20.0)));
        assert!(!has_meaningful_range(&quartile_row(10.0, 11.0)));
        assert!(has_meaningful_range(&serde_json::json!({"x": 1})));
    }

    #[test]
    fn test_small_sets_pass_through() {
        let rows: Vec<JsonValue> = (0..4).map(|i| quartile_row(10.0, 30.0 + f64::from(i))).collect();
        let sampled = smart_sample(&rows);
        assert_eq!(sampled.rows.len(), 4);
        assert!(!sampled.applied);
    }

    #[test]
    fn test_large_sets_keep_extremes() {
        let rows: Vec<JsonValue> = (0..30).map(|i| quartile_row(10.0, 40.0 + f64::from(i))).collect();
        let sampled = smart_sample(&rows);
        assert_eq!(sampled.rows.len(), 10);
        assert!(sampled.applied);
        assert_eq!(sampled.rows[0], rows[0]);
        assert_eq!(sampled.rows[9], rows[29]);
    }

    #[test]
    fn test_sampling_prefers_meaningful_ranges() {
        let mut rows: Vec<JsonValue> = (0..12).map(|_| quartile_row(10.0, 10.5)).collect();
        rows.extend((0..12).map(|i| quartile_row(10.0, 50.0 + f64::from(i))));
        let sampled = smart_sample(&rows);
        assert_eq!(sampled.rows.len(), 10);
        assert!(sampled.rows.iter().all(has_meaningful_range));
    }

    #[test]
    fn test_null_aggregate_detection() {
        let rows = vec![serde_json::json!({"avg_rate": null, "supplier": "S"})];
        assert!(has_null_aggregates(&rows));

        let ok = vec![serde_json::json!({"avg_rate": 52.3})];
        assert!(!has_null_aggregates(&ok));

        let plain_null = vec![serde_json::json!({"supplier": null})];
        assert!(!has_null_aggregates(&plain_null));
    }
}
