//! End-to-end turn processing over the graph with scripted components.

mod common;

use common::{harness, id_rows, MockExecutor, MockLlm};
use tabletalk::api::envelope::QueryType;
use tabletalk::error::ErrorKind;
use tabletalk::workflow::verifier::Verdict;

const GENERATION_MARKER: &str = "Translate natural language questions";
const FIX_MARKER: &str = "Fix broken SQL queries";
const TEXT_MARKER: &str = "turns SQL results into clear, direct answers";
const EDIT_MARKER: &str = "EDIT MODE ENABLED";
const VERIFY_MARKER: &str = "database safety reviewer";

#[tokio::test]
async fn conversational_turn_skips_the_database() {
    let llm = MockLlm::new();
    let executor = MockExecutor::new(|_| Ok(Vec::new()));
    let h = harness(llm, executor);

    let response = h
        .graph
        .process_turn(h.session.clone(), "hi, what can you do?", "viewer")
        .await;

    assert_eq!(response.query_type, QueryType::Conversational);
    assert!(response.success);
    assert!(!response.text.is_empty());
    assert!(response.sql.is_none());
    assert!(h.executor.select_calls.lock().unwrap().is_empty());
    assert!(h.executor.edit_calls.lock().unwrap().is_empty());
    // No LLM call either: conversational replies are canned.
    assert!(h.llm.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn simple_select_returns_rows_and_pagination() {
    let llm = MockLlm::new();
    llm.add_rule(
        GENERATION_MARKER,
        "",
        r#"{"kind": "select", "sql": "SELECT * FROM public.\"IT_Professional_Services\" LIMIT 5", "explanation": "first five rows"}"#,
    );
    llm.add_rule(TEXT_MARKER, "", "Here are the **first 5 rows** of the table.");

    let executor = MockExecutor::new(|sql| {
        assert!(sql.contains("LIMIT 5"));
        Ok(id_rows(5))
    });
    let h = harness(llm, executor);

    let response = h
        .graph
        .process_turn(h.session.clone(), "show me 5 rows", "viewer")
        .await;

    assert_eq!(response.query_type, QueryType::Sql);
    assert!(response.success);
    assert!(response.sql.as_deref().unwrap().starts_with("SELECT"));
    assert_eq!(response.results.as_ref().unwrap().len(), 5);
    let pagination = response.pagination.as_ref().unwrap();
    assert_eq!(pagination.total_rows, 5);
    assert_eq!(pagination.current_page, 1);
    assert!(response.text.contains("first 5 rows"));
    assert!(response.visualization_recommendations.is_some());
}

#[tokio::test]
async fn paged_result_preserves_original_ordering() {
    let llm = MockLlm::new();
    llm.add_rule(
        GENERATION_MARKER,
        "",
        r#"{"kind": "select", "sql": "SELECT * FROM public.\"IT_Professional_Services\" ORDER BY id", "explanation": ""}"#,
    );
    llm.add_rule(TEXT_MARKER, "", "All orders listed.");

    let executor = MockExecutor::new(|_| Ok(id_rows(237)));
    let h = harness(llm, executor);

    let response = h
        .graph
        .process_turn(h.session.clone(), "list all orders by date", "viewer")
        .await;

    let pagination = response.pagination.clone().unwrap();
    assert_eq!(pagination.total_rows, 237);
    assert_eq!(response.results.as_ref().unwrap().len(), 10);

    // Round trip: page 3 at size 50 returns rows 100..150 in original order.
    let table = h.session.table(&pagination.table_id).unwrap();
    let page = table.page(3, 50).unwrap();
    assert_eq!(page.total_pages, 5);
    assert_eq!(page.rows[0]["id"], 100);
    assert_eq!(page.rows[49]["id"], 149);
    assert!(page.has_next);
    assert!(page.has_prev);

    // And page 1 returns the first rows of the original result set.
    let first = table.page(1, 7).unwrap();
    assert_eq!(first.rows[0]["id"], 0);
    assert_eq!(first.rows[6]["id"], 6);
}

#[tokio::test]
async fn execution_error_triggers_auto_fix() {
    let llm = MockLlm::new();
    llm.add_rule(
        GENERATION_MARKER,
        "",
        r#"{"kind": "select", "sql": "SELECT bad FROM public.\"IT_Professional_Services\"", "explanation": ""}"#,
    );
    llm.add_rule(
        FIX_MARKER,
        "",
        "SELECT id FROM public.\"IT_Professional_Services\" LIMIT 3",
    );
    llm.add_rule(TEXT_MARKER, "", "Fixed and fetched.");

    let executor = MockExecutor::new(|sql| {
        if sql.contains("bad") {
            Err("column \"bad\" does not exist".to_string())
        } else {
            Ok(id_rows(3))
        }
    });
    let h = harness(llm, executor);

    let response = h
        .graph
        .process_turn(h.session.clone(), "show me a few ids", "viewer")
        .await;

    assert!(response.success);
    assert_eq!(response.results.as_ref().unwrap().len(), 3);
    assert!(response.sql.as_deref().unwrap().contains("SELECT id"));
    assert_eq!(h.executor.select_calls.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn exhausted_fixes_surface_the_database_error() {
    let llm = MockLlm::new();
    llm.add_rule(
        GENERATION_MARKER,
        "",
        r#"{"kind": "select", "sql": "SELECT bad FROM public.\"IT_Professional_Services\"", "explanation": ""}"#,
    );
    // The fix returns the same broken statement, so every retry fails too.
    llm.add_rule(FIX_MARKER, "", "SELECT bad FROM public.\"IT_Professional_Services\"");

    let executor = MockExecutor::new(|_| Err("column \"bad\" does not exist".to_string()));
    let h = harness(llm, executor);

    let response = h
        .graph
        .process_turn(h.session.clone(), "show me data", "viewer")
        .await;

    assert!(!response.success);
    assert_eq!(response.query_type, QueryType::Conversational);
    let error = response.error.as_ref().unwrap();
    assert_eq!(error.kind, ErrorKind::SqlExecutionFailed);
    assert!(error.message.contains("does not exist"));
    // Initial attempt plus max_validation_attempts retries.
    assert_eq!(h.executor.select_calls.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn second_identical_turn_hits_the_cache() {
    let llm = MockLlm::new();
    llm.add_rule(
        GENERATION_MARKER,
        "",
        r#"{"kind": "select", "sql": "SELECT * FROM public.\"IT_Professional_Services\" LIMIT 4", "explanation": ""}"#,
    );
    llm.add_rule(TEXT_MARKER, "", "Four rows.");

    let executor = MockExecutor::new(|_| Ok(id_rows(4)));
    let h = harness(llm, executor);

    let first = h
        .graph
        .process_turn(h.session.clone(), "show me 4 rows", "viewer")
        .await;
    let second = h
        .graph
        .process_turn(h.session.clone(), "show me 4 rows", "viewer")
        .await;

    // One execution total: the second turn was served from the cache and is
    // observationally identical.
    assert_eq!(h.executor.select_calls.lock().unwrap().len(), 1);
    assert_eq!(first.results, second.results);
    assert_eq!(first.sql, second.sql);
    assert!(second.success);
}

#[tokio::test]
async fn generation_failure_produces_error_envelope() {
    // No scripted generation response: the model call fails.
    let llm = MockLlm::new();
    let executor = MockExecutor::new(|_| Ok(Vec::new()));
    let h = harness(llm, executor);

    let response = h
        .graph
        .process_turn(h.session.clone(), "show me the rates", "viewer")
        .await;

    assert!(!response.success);
    assert_eq!(response.query_type, QueryType::Conversational);
    assert_eq!(response.error.as_ref().unwrap().kind, ErrorKind::GenerationFailed);
    assert!(!response.text.is_empty());
}

#[tokio::test]
async fn empty_result_set_is_not_an_error() {
    let llm = MockLlm::new();
    llm.add_rule(
        GENERATION_MARKER,
        "",
        r#"{"kind": "select", "sql": "SELECT * FROM public.\"IT_Professional_Services\" WHERE country_of_work = 'ZZ'", "explanation": ""}"#,
    );
    llm.add_rule(TEXT_MARKER, "", "No rows matched that filter.");

    let executor = MockExecutor::new(|_| Ok(Vec::new()));
    let h = harness(llm, executor);

    let response = h
        .graph
        .process_turn(h.session.clone(), "show rows for country ZZ", "viewer")
        .await;

    assert!(response.success);
    assert_eq!(response.results.as_ref().unwrap().len(), 0);
    assert_eq!(response.pagination.as_ref().unwrap().total_rows, 0);
}

#[tokio::test]
async fn edit_request_requires_confirmation_and_runs_nothing() {
    let llm = MockLlm::new();
    llm.add_rule(
        EDIT_MARKER,
        "",
        "DELETE FROM public.\"IT_Professional_Services\" WHERE country_of_work = 'ZZ'",
    );
    llm.add_rule(
        VERIFY_MARKER,
        "",
        r#"{"is_safe": true, "is_correct": true, "safety_issues": [], "correctness_issues": [], "impact_assessment": "removes rows for one country", "estimated_affected_records": "4200", "recommendations": ["back up first"], "overall_verdict": "REQUIRES_REVIEW", "explanation": "large deletion"}"#,
    );

    let executor = MockExecutor::new(|_| Ok(Vec::new()));
    let h = harness(llm, executor);
    h.session.set_edit_mode(true);

    let response = h
        .graph
        .process_turn(
            h.session.clone(),
            "delete all rows where country='ZZ'",
            "admin",
        )
        .await;

    assert_eq!(response.query_type, QueryType::EditSql);
    assert_eq!(response.requires_confirmation, Some(true));
    let verification = response.verification_result.as_ref().unwrap();
    assert!(matches!(
        verification.verdict,
        Verdict::RequiresReview | Verdict::DoNotExecute
    ));
    assert!(response.sql.as_deref().unwrap().starts_with("DELETE"));
    // No mutation happened yet.
    assert!(h.executor.select_calls.lock().unwrap().is_empty());
    assert!(h.executor.edit_calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn edit_request_without_edit_mode_is_refused() {
    let llm = MockLlm::new();
    let executor = MockExecutor::new(|_| Ok(Vec::new()));
    let h = harness(llm, executor);

    let response = h
        .graph
        .process_turn(h.session.clone(), "delete the rows for country ZZ", "viewer")
        .await;

    assert_eq!(response.query_type, QueryType::Conversational);
    assert!(response.success);
    assert!(response.text.to_lowercase().contains("edit mode"));
    assert!(h.executor.edit_calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unsafe_edit_is_clamped_to_do_not_execute() {
    let llm = MockLlm::new();
    llm.add_rule(EDIT_MARKER, "", "DELETE FROM public.\"IT_Professional_Services\"");
    // The model claims it is safe; hard rules must override.
    llm.add_rule(
        VERIFY_MARKER,
        "",
        r#"{"is_safe": true, "is_correct": true, "safety_issues": [], "correctness_issues": [], "impact_assessment": "deletes everything", "estimated_affected_records": "5000", "recommendations": [], "overall_verdict": "SAFE_TO_EXECUTE", "explanation": "fine"}"#,
    );

    let executor = MockExecutor::new(|_| Ok(Vec::new()));
    let h = harness(llm, executor);
    h.session.set_edit_mode(true);

    let response = h
        .graph
        .process_turn(h.session.clone(), "delete every row", "admin")
        .await;

    let verification = response.verification_result.as_ref().unwrap();
    assert_eq!(verification.verdict, Verdict::DoNotExecute);
    assert_eq!(response.requires_confirmation, Some(true));
}
