//! SQL generation from natural language.
//!
//! Wraps the generation, repair, and column-identification prompts. The
//! generator asks for a structured `{kind, sql, explanation}` response; when
//! a model answers with bare SQL instead, one repair pass salvages it before
//! the turn fails with `parse_failed`.

use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::database::{split_statements, MULTI_STATEMENT_SEPARATOR};
use crate::error::{ErrorKind, QueryError};
use crate::llm::{parse, LlmClient, LlmRequest};
use crate::prompts::PromptLibrary;
use crate::workflow::state::GenerationKind;

/// Generator output for one question.
#[derive(Debug, Clone)]
pub struct GeneratedSql {
    /// Classification of the statements.
    pub kind: GenerationKind,
    /// Ordered statements (one unless `kind` is `Multi`).
    pub statements: Vec<String>,
    /// Model explanation, when given.
    pub rationale: Option<String>,
    /// Caller must confirm before execution.
    pub needs_edit_confirmation: bool,
}

impl GeneratedSql {
    /// Statements joined back with the wire separator.
    #[must_use]
    pub fn joined(&self) -> String {
        self.statements.join(&format!("\n{MULTI_STATEMENT_SEPARATOR}\n"))
    }
}

/// LLM-backed SQL generator.
pub struct SqlGenerator {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLibrary>,
}

impl SqlGenerator {
    /// Create a generator.
    #[must_use]
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLibrary>) -> Self {
        Self { llm, prompts }
    }

    /// Generate SQL for a question.
    ///
    /// `exploration` is an optional observed-values section appended to the
    /// schema context.
    pub async fn generate(
        &self,
        question: &str,
        schema_context: &str,
        memory_context: &str,
        exploration: Option<&str>,
    ) -> Result<GeneratedSql, QueryError> {
        let schema = match exploration {
            Some(observed) if !observed.is_empty() => {
                format!("{schema_context}\n\n{observed}")
            }
            _ => schema_context.to_string(),
        };
        let memory = render_memory(memory_context);

        let messages = self
            .prompts
            .sql_generation
            .render(&[
                ("memory", memory.as_str()),
                ("schema", schema.as_str()),
                ("question", question),
            ])
            .map_err(|e| QueryError::generation(e.to_string()))?;

        let response = self
            .llm
            .complete(LlmRequest::new(messages))
            .await
            .map_err(|e| QueryError::generation(format!("model call failed: {e}")))?;

        self.parse_generation(&response.content)
    }

    fn parse_generation(&self, raw: &str) -> Result<GeneratedSql, QueryError> {
        if let Some(value) = parse::extract_json(raw) {
            if let Some(parsed) = Self::from_structured(&value) {
                return parsed;
            }
        }

        // Repair attempt: treat the whole response as bare SQL.
        let sql = parse::extract_sql(raw);
        if validate_sql(&sql).is_ok() {
            let kind = if crate::database::is_write_statement(&sql) {
                GenerationKind::Edit
            } else {
                GenerationKind::Select
            };
            return Ok(GeneratedSql {
                needs_edit_confirmation: kind == GenerationKind::Edit,
                kind,
                statements: vec![sql],
                rationale: None,
            });
        }

        if raw.trim().is_empty() {
            Err(QueryError::generation("model produced no SQL"))
        } else {
            Err(QueryError::parse(raw))
        }
    }

    fn from_structured(value: &JsonValue) -> Option<Result<GeneratedSql, QueryError>> {
        let sql = value.get("sql")?.as_str()?.trim().to_string();
        let kind = match value.get("kind").and_then(JsonValue::as_str) {
            Some("edit") => GenerationKind::Edit,
            Some("multi") => GenerationKind::Multi,
            _ => GenerationKind::Select,
        };
        let rationale = value
            .get("explanation")
            .and_then(JsonValue::as_str)
            .map(String::from);

        if sql.is_empty() {
            return Some(Err(QueryError::generation("model produced no SQL")));
        }

        let statements = if kind == GenerationKind::Multi || sql.contains(MULTI_STATEMENT_SEPARATOR)
        {
            split_statements(&sql)
        } else {
            vec![sql]
        };
        if statements.is_empty() {
            return Some(Err(QueryError::generation("model produced no SQL")));
        }

        let kind = if statements.len() > 1 {
            GenerationKind::Multi
        } else {
            kind
        };
        let is_edit = kind == GenerationKind::Edit
            || statements.iter().any(|s| crate::database::is_write_statement(s));

        Some(Ok(GeneratedSql {
            kind: if is_edit && statements.len() == 1 {
                GenerationKind::Edit
            } else {
                kind
            },
            statements,
            rationale,
            needs_edit_confirmation: is_edit,
        }))
    }

    /// Generate edit-mode SQL (plain statements, `<----->`-separated).
    pub async fn generate_edit(
        &self,
        question: &str,
        schema_context: &str,
        memory_context: &str,
    ) -> Result<GeneratedSql, QueryError> {
        let memory = render_memory(memory_context);
        let messages = self
            .prompts
            .edit_sql
            .render(&[
                ("memory", memory.as_str()),
                ("schema", schema_context),
                ("question", question),
            ])
            .map_err(|e| QueryError::generation(e.to_string()))?;

        let response = self
            .llm
            .complete(LlmRequest::new(messages))
            .await
            .map_err(|e| QueryError::generation(format!("model call failed: {e}")))?;

        let sql = parse::extract_sql(&response.content);
        let statements = split_statements(&sql);
        if statements.is_empty() {
            return Err(QueryError::generation("model produced no SQL"));
        }

        Ok(GeneratedSql {
            kind: if statements.len() > 1 {
                GenerationKind::Multi
            } else {
                GenerationKind::Edit
            },
            statements,
            rationale: None,
            needs_edit_confirmation: true,
        })
    }

    /// Repair a statement given the database error it produced.
    pub async fn fix(
        &self,
        sql: &str,
        error: &str,
        schema_context: &str,
        memory_context: &str,
    ) -> Result<String, QueryError> {
        let memory = render_memory(memory_context);
        let messages = self
            .prompts
            .sql_fix
            .render(&[
                ("memory", memory.as_str()),
                ("schema", schema_context),
                ("sql", sql),
                ("error", error),
            ])
            .map_err(|e| QueryError::generation(e.to_string()))?;

        let response = self
            .llm
            .complete(LlmRequest::new(messages))
            .await
            .map_err(|e| QueryError::generation(format!("model call failed: {e}")))?;

        let fixed = parse::extract_sql(&response.content);
        validate_sql(&fixed).map_err(|reason| {
            QueryError::new(ErrorKind::GenerationFailed, reason).with_sql(fixed.clone())
        })?;
        Ok(fixed)
    }

    /// Ask which columns matter for filtering this question. Failures are
    /// soft: exploration is an enhancement, not a requirement.
    pub async fn identify_relevant_columns(
        &self,
        question: &str,
        schema_context: &str,
    ) -> Vec<String> {
        let messages = match self
            .prompts
            .column_identification
            .render(&[("schema", schema_context), ("question", question)])
        {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(error = %e, "column identification prompt failed");
                return Vec::new();
            }
        };

        let response = match self.llm.complete(LlmRequest::new(messages)).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "column identification call failed");
                return Vec::new();
            }
        };

        parse::extract_json_with_key(&response.content, "columns")
            .and_then(|v| v.get("columns").cloned())
            .and_then(|cols| {
                cols.as_array().map(|arr| {
                    arr.iter()
                        .filter_map(|c| c.as_str().map(String::from))
                        .collect()
                })
            })
            .unwrap_or_default()
    }
}

fn render_memory(memory_context: &str) -> String {
    if memory_context.is_empty() {
        String::new()
    } else {
        format!("{memory_context}\n\n")
    }
}

/// Syntactic validation of a generated statement.
///
/// # Errors
///
/// Returns the reason the statement is rejected.
pub fn validate_sql(sql: &str) -> Result<(), String> {
    let cleaned = crate::database::strip_leading_comments(sql).trim();
    if cleaned.is_empty() {
        return Err("empty SQL query".to_string());
    }

    let upper = cleaned.to_uppercase();
    let valid_starts = ["SELECT", "INSERT", "UPDATE", "DELETE", "WITH", "CREATE", "DROP", "ALTER", "TRUNCATE"];
    if !valid_starts.iter().any(|s| upper.starts_with(s)) {
        return Err("SQL must start with a valid command".to_string());
    }

    if cleaned.matches('(').count() != cleaned.matches(')').count() {
        return Err("unbalanced parentheses in SQL".to_string());
    }
    if cleaned.matches('\'').count() % 2 != 0 {
        return Err("unbalanced single quotes in SQL".to_string());
    }
    if cleaned.matches('"').count() % 2 != 0 {
        return Err("unbalanced double quotes in SQL".to_string());
    }

    let statements: Vec<&str> = cleaned
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if statements.len() > 1 {
        return Err("multiple SQL statements not allowed".to_string());
    }

    if upper.starts_with("SELECT") && !upper.contains("FROM") {
        return Err("SELECT statement must include a FROM clause".to_string());
    }
    if upper.starts_with("INSERT") && !upper.contains("VALUES") && !upper.contains("SELECT") {
        return Err("INSERT statement must include VALUES or a SELECT".to_string());
    }
    if (upper.starts_with("UPDATE") || upper.starts_with("DELETE")) && !upper.contains("WHERE") {
        return Err("UPDATE/DELETE statements must include a WHERE clause".to_string());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_select() {
        assert!(validate_sql("SELECT * FROM public.\"T\" LIMIT 5").is_ok());
        assert!(validate_sql("WITH c AS (SELECT 1 FROM t) SELECT * FROM c").is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_and_prose() {
        assert!(validate_sql("").is_err());
        assert!(validate_sql("-- only a comment").is_err());
        assert!(validate_sql("here is your query").is_err());
    }

    #[test]
    fn test_validate_rejects_unbalanced() {
        assert!(validate_sql("SELECT count( FROM t").is_err());
        assert!(validate_sql("SELECT 'oops FROM t").is_err());
    }

    #[test]
    fn test_validate_rejects_multiple_statements() {
        assert!(validate_sql("SELECT 1 FROM t; SELECT 2 FROM t").is_err());
    }

    #[test]
    fn test_validate_requires_where_on_mutation() {
        assert!(validate_sql("DELETE FROM t").is_err());
        assert!(validate_sql("DELETE FROM t WHERE id = 1").is_ok());
        assert!(validate_sql("UPDATE t SET x = 1").is_err());
    }

    #[test]
    fn test_validate_select_requires_from() {
        assert!(validate_sql("SELECT 1").is_err());
    }

    #[test]
    fn test_from_structured_select() {
        let value = serde_json::json!({
            "kind": "select",
            "sql": "SELECT * FROM t LIMIT 5",
            "explanation": "first five rows"
        });
        let generated = SqlGenerator::from_structured(&value).unwrap().unwrap();
        assert_eq!(generated.kind, GenerationKind::Select);
        assert!(!generated.needs_edit_confirmation);
        assert_eq!(generated.rationale.as_deref(), Some("first five rows"));
    }

    #[test]
    fn test_from_structured_multi_splits_on_separator() {
        let value = serde_json::json!({
            "kind": "multi",
            "sql": "INSERT INTO t VALUES (1)\n<----->\nINSERT INTO t VALUES (2)"
        });
        let generated = SqlGenerator::from_structured(&value).unwrap().unwrap();
        assert_eq!(generated.kind, GenerationKind::Multi);
        assert_eq!(generated.statements.len(), 2);
        assert!(generated.needs_edit_confirmation);
    }

    #[test]
    fn test_from_structured_edit_flags_confirmation() {
        let value = serde_json::json!({
            "kind": "edit",
            "sql": "DELETE FROM t WHERE country = 'ZZ'"
        });
        let generated = SqlGenerator::from_structured(&value).unwrap().unwrap();
        assert_eq!(generated.kind, GenerationKind::Edit);
        assert!(generated.needs_edit_confirmation);
    }

    #[test]
    fn test_from_structured_rejects_empty_sql() {
        let value = serde_json::json!({"kind": "select", "sql": ""});
        assert!(SqlGenerator::from_structured(&value).unwrap().is_err());
    }

    #[test]
    fn test_joined_round_trip() {
        let generated = GeneratedSql {
            kind: GenerationKind::Multi,
            statements: vec!["SELECT 1 FROM t".to_string(), "SELECT 2 FROM t".to_string()],
            rationale: None,
            needs_edit_confirmation: false,
        };
        let joined = generated.joined();
        assert_eq!(split_statements(&joined), generated.statements);
    }
}
