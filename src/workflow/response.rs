//! Natural-language response synthesis.
//!
//! Turns a result set into the envelope's `text`. A model failure degrades
//! to a deterministic summary rather than failing the turn: by this point
//! the data exists and the user should see it.

use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::llm::{LlmClient, LlmRequest};
use crate::prompts::PromptLibrary;

/// Rows above this count are summarized rather than inlined in the prompt.
const PROMPT_ROW_LIMIT: usize = 50;

/// LLM-backed response synthesizer.
pub struct ResponseSynthesizer {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLibrary>,
}

impl ResponseSynthesizer {
    /// Create a synthesizer.
    #[must_use]
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLibrary>) -> Self {
        Self { llm, prompts }
    }

    /// Produce the answer text for a completed query.
    pub async fn narrative(
        &self,
        question: &str,
        sql: &str,
        rows: &[JsonValue],
        schema_context: &str,
        memory_context: &str,
    ) -> String {
        let results_text = format_rows_for_prompt(rows);
        let memory = if memory_context.is_empty() {
            String::new()
        } else {
            format!("{memory_context}\n\n")
        };

        let messages = match self.prompts.text_response.render(&[
            ("memory", memory.as_str()),
            ("schema", schema_context),
            ("question", question),
            ("sql", sql),
            ("results", results_text.as_str()),
        ]) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(error = %e, "text response prompt failed");
                return fallback_response(question, rows);
            }
        };

        match self.llm.complete(LlmRequest::new(messages)).await {
            Ok(response) if !response.content.trim().is_empty() => response.content,
            Ok(_) => fallback_response(question, rows),
            Err(e) => {
                tracing::warn!(error = %e, "text response call failed, using fallback");
                fallback_response(question, rows)
            }
        }
    }
}

fn format_rows_for_prompt(rows: &[JsonValue]) -> String {
    if rows.is_empty() {
        return "No results found.".to_string();
    }
    if rows.len() <= PROMPT_ROW_LIMIT {
        return serde_json::to_string_pretty(rows).unwrap_or_else(|_| format!("{rows:?}"));
    }

    let head = &rows[..PROMPT_ROW_LIMIT / 2];
    let tail = &rows[rows.len() - PROMPT_ROW_LIMIT / 2..];
    format!(
        "{} rows total; first {} and last {} shown:\n{}\n...\n{}",
        rows.len(),
        head.len(),
        tail.len(),
        serde_json::to_string_pretty(head).unwrap_or_default(),
        serde_json::to_string_pretty(tail).unwrap_or_default()
    )
}

/// Deterministic answer used when the model is unavailable.
#[must_use]
pub fn fallback_response(question: &str, rows: &[JsonValue]) -> String {
    if rows.is_empty() {
        return format!(
            "No rows matched \"{question}\". Try broadening the filters or checking the spelling of specific values."
        );
    }

    let columns: Vec<String> = rows
        .first()
        .and_then(|r| r.as_object())
        .map(|o| o.keys().cloned().collect())
        .unwrap_or_default();

    let mut text = format!(
        "The query returned {} row{} with columns: {}.",
        rows.len(),
        if rows.len() == 1 { "" } else { "s" },
        columns.join(", ")
    );

    if let Some(first) = rows.first() {
        text.push_str(&format!(" First row: {first}."));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_empty_rows() {
        let text = fallback_response("show expensive roles", &[]);
        assert!(text.contains("No rows matched"));
        assert!(text.contains("show expensive roles"));
    }

    #[test]
    fn test_fallback_lists_columns_and_count() {
        let rows = vec![
            serde_json::json!({"role": "Developer", "rate": 55.0}),
            serde_json::json!({"role": "Consultant", "rate": 80.0}),
        ];
        let text = fallback_response("q", &rows);
        assert!(text.contains("2 rows"));
        assert!(text.contains("role"));
        assert!(text.contains("rate"));
    }

    #[test]
    fn test_format_rows_samples_large_sets() {
        let rows: Vec<JsonValue> = (0..200).map(|i| serde_json::json!({"id": i})).collect();
        let formatted = format_rows_for_prompt(&rows);
        assert!(formatted.contains("200 rows total"));
        assert!(formatted.contains("\"id\": 0"));
        assert!(formatted.contains("\"id\": 199"));
        assert!(!formatted.contains("\"id\": 100"));
    }
}
