//! Edit-statement verification.
//!
//! Every DML/DDL statement gets a structured safety assessment before it can
//! run. The LLM produces the report; deterministic hard rules then clamp the
//! verdict so a lenient model answer can never downgrade an unsafe
//! statement. The core never auto-executes a `DO_NOT_EXECUTE`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::database::strip_leading_comments;
use crate::llm::{parse, LlmClient, LlmRequest};
use crate::prompts::PromptLibrary;

/// Final verification verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    /// Safe to run without review.
    #[serde(rename = "SAFE_TO_EXECUTE")]
    SafeToExecute,
    /// A human should confirm first.
    #[serde(rename = "REQUIRES_REVIEW")]
    RequiresReview,
    /// Never run automatically.
    #[serde(rename = "DO_NOT_EXECUTE")]
    DoNotExecute,
}

/// Structured safety/correctness assessment of an edit statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    /// Statement is safe to run.
    pub is_safe: bool,
    /// Statement is syntactically and semantically correct.
    pub is_correct: bool,
    /// Safety findings.
    pub safety_issues: Vec<String>,
    /// Correctness findings.
    pub correctness_issues: Vec<String>,
    /// What the statement will do.
    pub impact_assessment: String,
    /// Estimated affected row count ("unknown" when indeterminable).
    pub estimated_affected_records: String,
    /// Reviewer recommendations.
    pub recommendations: Vec<String>,
    /// Final verdict.
    pub verdict: Verdict,
    /// One-line explanation of the verdict.
    pub explanation: String,
}

/// LLM-backed verifier with deterministic hard rules.
pub struct Verifier {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLibrary>,
}

impl Verifier {
    /// Create a verifier.
    #[must_use]
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLibrary>) -> Self {
        Self { llm, prompts }
    }

    /// Verify an edit statement (or `<----->`-joined batch).
    ///
    /// Verification itself never fails the turn: unreadable model output
    /// falls back to the heuristic report.
    pub async fn verify(&self, question: &str, sql: &str, schema_context: &str) -> VerificationReport {
        let report = match self.llm_verify(question, sql, schema_context).await {
            Some(report) => report,
            None => {
                tracing::warn!("verification response unusable, using heuristic report");
                heuristic_report(sql)
            }
        };
        apply_hard_rules(sql, report)
    }

    async fn llm_verify(
        &self,
        question: &str,
        sql: &str,
        schema_context: &str,
    ) -> Option<VerificationReport> {
        let messages = self
            .prompts
            .edit_verification
            .render(&[("schema", schema_context), ("question", question), ("sql", sql)])
            .ok()?;

        let response = match self.llm.complete(LlmRequest::new(messages)).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "verification call failed");
                return None;
            }
        };

        let value = parse::extract_json(&response.content)?;
        Some(report_from_value(&value)?)
    }
}

fn report_from_value(value: &JsonValue) -> Option<VerificationReport> {
    let verdict = match value.get("overall_verdict").and_then(JsonValue::as_str) {
        Some("SAFE_TO_EXECUTE") => Verdict::SafeToExecute,
        Some("DO_NOT_EXECUTE") => Verdict::DoNotExecute,
        Some(_) => Verdict::RequiresReview,
        None => return None,
    };

    let string_list = |key: &str| -> Vec<String> {
        value
            .get(key)
            .and_then(JsonValue::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    };

    Some(VerificationReport {
        is_safe: value.get("is_safe").and_then(JsonValue::as_bool).unwrap_or(false),
        is_correct: value
            .get("is_correct")
            .and_then(JsonValue::as_bool)
            .unwrap_or(false),
        safety_issues: string_list("safety_issues"),
        correctness_issues: string_list("correctness_issues"),
        impact_assessment: value
            .get("impact_assessment")
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
            .to_string(),
        estimated_affected_records: value
            .get("estimated_affected_records")
            .map(|v| match v {
                JsonValue::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| "unknown".to_string()),
        recommendations: string_list("recommendations"),
        verdict,
        explanation: value
            .get("explanation")
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
            .to_string(),
    })
}

/// Deterministic checks a model answer can never override.
fn apply_hard_rules(sql: &str, mut report: VerificationReport) -> VerificationReport {
    for statement in crate::database::split_statements(sql) {
        let head = strip_leading_comments(&statement).to_uppercase();
        let head_joined = head.split_whitespace().collect::<Vec<_>>().join(" ");

        let unrestricted_mutation = (head_joined.starts_with("UPDATE")
            || head_joined.starts_with("DELETE"))
            && !head_joined.contains(" WHERE ")
            && !head_joined.ends_with(" WHERE");
        if unrestricted_mutation {
            report.verdict = Verdict::DoNotExecute;
            report.is_safe = false;
            report
                .safety_issues
                .push("unrestricted UPDATE/DELETE without a WHERE clause".to_string());
        }

        if head_joined.starts_with("DROP TABLE") || head_joined.starts_with("DROP SCHEMA") {
            report.verdict = Verdict::DoNotExecute;
            report.is_safe = false;
            report
                .safety_issues
                .push("statement drops a table or schema".to_string());
        }

        if head_joined.contains("DISABLE TRIGGER") || head_joined.contains("DISABLE CONSTRAINT")
        {
            report.verdict = Verdict::DoNotExecute;
            report.is_safe = false;
            report
                .safety_issues
                .push("statement disables constraints or triggers".to_string());
        }
    }

    if report.verdict == Verdict::SafeToExecute {
        let large_estimate = report
            .estimated_affected_records
            .parse::<i64>()
            .map(|n| n > 1000)
            .unwrap_or(false);
        if large_estimate || !report.correctness_issues.is_empty() || !report.is_correct {
            report.verdict = Verdict::RequiresReview;
        }
    }

    report
}

/// Fallback report when the model answer is unreadable.
fn heuristic_report(sql: &str) -> VerificationReport {
    let mut safety_issues = Vec::new();
    for statement in crate::database::split_statements(sql) {
        let upper = strip_leading_comments(&statement).to_uppercase();
        if (upper.starts_with("UPDATE") || upper.starts_with("DELETE")) && !upper.contains("WHERE")
        {
            safety_issues.push("missing WHERE clause in UPDATE/DELETE".to_string());
        }
    }

    let is_safe = safety_issues.is_empty();
    VerificationReport {
        is_safe,
        is_correct: !sql.trim().is_empty(),
        safety_issues,
        correctness_issues: Vec::new(),
        impact_assessment: "heuristic assessment only; model verification unavailable".to_string(),
        estimated_affected_records: "unknown".to_string(),
        recommendations: vec!["manual review recommended".to_string()],
        verdict: Verdict::RequiresReview,
        explanation: "model verification unavailable, defaulting to review".to_string(),
    }
}
