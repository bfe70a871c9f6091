//! Graph orchestrator: the state machine that processes one user turn.
//!
//! Single entry `route_query`; terminal nodes are `handle_conversational`,
//! `generate_response`, `generate_comprehensive_analysis`, and
//! `handle_error`. Node functions are pure over [`TurnState`]; the
//! orchestrator holds the current state and routes on each transition. The
//! whole turn runs under one timeout, and exactly one terminal node is
//! reached per turn.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value as JsonValue;

use crate::api::envelope::{AnalysisTable, Pagination, QueryResponse};
use crate::cache::{fingerprint, CacheEntry};
use crate::config::{PaginationConfig, WorkflowConfig};
use crate::error::{ErrorKind, QueryError};
use crate::execution::{QueryExecutor, SelectOutcome};
use crate::logging::NodeTimer;
use crate::memory::ConversationMemory;
use crate::schema::SchemaProvider;
use crate::session::{RecentTurn, ResultTable, SessionContext};
use crate::workflow::analytical::AnalyticalManager;
use crate::workflow::charts::ChartRecommender;
use crate::workflow::generation::{validate_sql, GeneratedSql, SqlGenerator};
use crate::workflow::response::ResponseSynthesizer;
use crate::workflow::router::QueryRouter;
use crate::workflow::state::{GenerationKind, TurnState, WorkflowType};
use crate::workflow::verifier::{Verdict, Verifier};

/// Graph nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Node {
    RouteQuery,
    HandleConversational,
    GenerateSql,
    ValidateSql,
    ExecuteQuery,
    GenerateResponse,
    GenerateAnalyticalQuestions,
    ExecuteAnalyticalWorkflow,
    GenerateComprehensiveAnalysis,
    HandleError,
}

impl Node {
    fn name(self) -> &'static str {
        match self {
            Self::RouteQuery => "route_query",
            Self::HandleConversational => "handle_conversational",
            Self::GenerateSql => "generate_sql",
            Self::ValidateSql => "validate_sql",
            Self::ExecuteQuery => "execute_query",
            Self::GenerateResponse => "generate_response",
            Self::GenerateAnalyticalQuestions => "generate_analytical_questions",
            Self::ExecuteAnalyticalWorkflow => "execute_analytical_workflow",
            Self::GenerateComprehensiveAnalysis => "generate_comprehensive_analysis",
            Self::HandleError => "handle_error",
        }
    }
}

/// Transition result: either the next node or a terminal envelope.
enum Step {
    Next(TurnState, Node),
    Done(QueryResponse),
}

/// The per-turn state machine over all workflow components.
pub struct GraphOrchestrator {
    router: QueryRouter,
    generator: Arc<SqlGenerator>,
    analytical: Arc<AnalyticalManager>,
    verifier: Arc<Verifier>,
    synthesizer: Arc<ResponseSynthesizer>,
    charts: Arc<ChartRecommender>,
    executor: Arc<dyn QueryExecutor>,
    memory: Arc<ConversationMemory>,
    schema: Arc<dyn SchemaProvider>,
    workflow: WorkflowConfig,
    pagination: PaginationConfig,
}

impl GraphOrchestrator {
    /// Wire the orchestrator.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        generator: Arc<SqlGenerator>,
        analytical: Arc<AnalyticalManager>,
        verifier: Arc<Verifier>,
        synthesizer: Arc<ResponseSynthesizer>,
        charts: Arc<ChartRecommender>,
        executor: Arc<dyn QueryExecutor>,
        memory: Arc<ConversationMemory>,
        schema: Arc<dyn SchemaProvider>,
        workflow: WorkflowConfig,
        pagination: PaginationConfig,
    ) -> Self {
        Self {
            router: QueryRouter::new(),
            generator,
            analytical,
            verifier,
            synthesizer,
            charts,
            executor,
            memory,
            schema,
            workflow,
            pagination,
        }
    }

    /// Process one user turn end to end. Never fails across this boundary:
    /// every outcome, including timeout, is an envelope.
    pub async fn process_turn(
        &self,
        session: Arc<SessionContext>,
        question: &str,
        user_role: &str,
    ) -> QueryResponse {
        let _turn = session.turn_lock.lock().await;
        session.touch();

        let timeout = Duration::from_secs(self.workflow.turn_timeout_secs);
        match tokio::time::timeout(timeout, self.run_turn(&session, question, user_role)).await {
            Ok(response) => response,
            Err(_) => {
                tracing::error!(question, "turn timed out");
                QueryResponse::from_error(QueryError::timeout("turn"))
            }
        }
    }

    async fn run_turn(
        &self,
        session: &SessionContext,
        question: &str,
        user_role: &str,
    ) -> QueryResponse {
        // Cache lookup bypasses generation and execution entirely.
        if let Some(hit) = session.cache.get(question, self.schema.version()) {
            tracing::info!(question, "query cache hit");
            return self.respond_from_cache(session, hit).await;
        }

        let mut state = TurnState::new(question, user_role, session.edit_mode());
        let mut node = Node::RouteQuery;

        loop {
            let timer = NodeTimer::new(node.name());
            let step = match node {
                Node::RouteQuery => self.route_query(state),
                Node::HandleConversational => self.handle_conversational(session, state).await,
                Node::GenerateSql => self.generate_sql(session, state).await,
                Node::ValidateSql => self.validate_sql_node(state).await,
                Node::ExecuteQuery => self.execute_query(state).await,
                Node::GenerateResponse => self.generate_response(session, state).await,
                Node::GenerateAnalyticalQuestions => {
                    self.generate_analytical_questions(session, state).await
                }
                Node::ExecuteAnalyticalWorkflow => {
                    self.execute_analytical_workflow(session, state).await
                }
                Node::GenerateComprehensiveAnalysis => {
                    self.generate_comprehensive_analysis(session, state).await
                }
                Node::HandleError => self.handle_error(state),
            };

            match step {
                Step::Next(next_state, next_node) => {
                    timer.finish(next_state.error.as_ref().map(|e| e.kind.as_str()));
                    state = next_state;
                    node = next_node;
                }
                Step::Done(response) => {
                    timer.finish(response.error.as_ref().map(|e| e.kind.as_str()));
                    return response;
                }
            }
        }
    }

    // --- nodes -----------------------------------------------------------

    fn route_query(&self, mut state: TurnState) -> Step {
        let decision = self.router.route(&state.question);
        state.is_conversational = decision.is_conversational;
        state.requires_analysis = decision.requires_analysis;

        let (workflow_type, next) = if decision.is_conversational {
            (WorkflowType::Conversational, Node::HandleConversational)
        } else if decision.requires_analysis {
            (WorkflowType::Analytical, Node::GenerateAnalyticalQuestions)
        } else {
            (WorkflowType::Standard, Node::GenerateSql)
        };
        state.workflow_type = workflow_type;

        tracing::info!(
            workflow = ?workflow_type,
            intent = decision.intent,
            "query routed"
        );
        Step::Next(state, next)
    }

    async fn handle_conversational(&self, session: &SessionContext, state: TurnState) -> Step {
        let text = "I'm a data assistant for your database. Ask me a question about the data and I'll generate the SQL, run it, and explain the results. Broad questions get a full multi-angle analysis.".to_string();

        self.memory
            .store_turn(&session.id, &state.question, &text, None, None)
            .await;

        Step::Done(QueryResponse::conversational(text))
    }

    async fn generate_sql(&self, session: &SessionContext, mut state: TurnState) -> Step {
        let schema_blob = match self.schema.context().await {
            Ok(ctx) => ctx.llm_context(),
            Err(e) => return Step::Next(state.with_error(e), Node::HandleError),
        };
        state.schema_context = schema_blob;

        if state.memory_context.is_empty() {
            state.memory_context = self.memory.retrieve(&session.id, &state.question).await;
        }
        let memory_with_recent = self.memory_with_recent_turn(session, &state.memory_context);

        let decision = self.router.route(&state.question);
        if decision.is_edit && !state.edit_mode {
            return Step::Done(QueryResponse::conversational(
                "Edit mode is disabled for this session, so I can't modify data. Enable edit mode to run INSERT, UPDATE, or DELETE statements.",
            ));
        }

        let generated = if decision.is_edit {
            self.generator
                .generate_edit(&state.question, &state.schema_context, &memory_with_recent)
                .await
        } else {
            self.generator
                .generate(&state.question, &state.schema_context, &memory_with_recent, None)
                .await
        };

        match generated {
            Ok(generated) if generated.needs_edit_confirmation => {
                if !state.edit_mode {
                    return Step::Done(QueryResponse::conversational(
                        "That request would modify data, but edit mode is disabled for this session.",
                    ));
                }
                self.verify_edit(session, state, generated).await
            }
            Ok(generated) => {
                state.rationale = generated.rationale.clone();
                let next = state.with_sql(generated.statements, generated.kind);
                Step::Next(next, Node::ValidateSql)
            }
            Err(e) => Step::Next(state.with_error(e), Node::HandleError),
        }
    }

    async fn verify_edit(
        &self,
        session: &SessionContext,
        state: TurnState,
        generated: GeneratedSql,
    ) -> Step {
        let joined = generated.joined();
        let report = self
            .verifier
            .verify(&state.question, &joined, &state.schema_context)
            .await;

        let requires_confirmation = report.verdict != Verdict::SafeToExecute;
        let text = match report.verdict {
            Verdict::SafeToExecute => format!(
                "I generated the statements below. {} Review and confirm to execute.",
                report.impact_assessment
            ),
            Verdict::RequiresReview => format!(
                "This change needs review before it runs: {}",
                report.explanation
            ),
            Verdict::DoNotExecute => format!(
                "I won't execute this automatically: {} The statement is shown for reference only.",
                report.explanation
            ),
        };

        self.memory
            .store_turn(&session.id, &state.question, &text, Some(&joined), None)
            .await;

        Step::Done(QueryResponse::edit_pending(
            text,
            joined,
            report,
            requires_confirmation,
        ))
    }

    async fn validate_sql_node(&self, mut state: TurnState) -> Step {
        let Some(sql) = state.single_sql().map(String::from) else {
            // Multi-statement read batches are not a standard-path shape.
            return Step::Next(state, Node::ExecuteQuery);
        };

        match validate_sql(&sql) {
            Ok(()) => Step::Next(state, Node::ExecuteQuery),
            Err(reason) if state.validation_attempts < self.workflow.max_validation_attempts => {
                tracing::warn!(reason = %reason, attempt = state.validation_attempts + 1, "SQL invalid, regenerating");
                state.validation_attempts += 1;
                match self
                    .generator
                    .fix(&sql, &reason, &state.schema_context, &state.memory_context)
                    .await
                {
                    Ok(fixed) => {
                        let next = state.with_sql(vec![fixed], GenerationKind::Select);
                        Step::Next(next, Node::ValidateSql)
                    }
                    Err(e) => Step::Next(state.with_error(e), Node::HandleError),
                }
            }
            Err(reason) => {
                // Attempts exhausted: let the database have the final word.
                tracing::warn!(reason = %reason, "validation attempts exhausted, executing anyway");
                Step::Next(state, Node::ExecuteQuery)
            }
        }
    }

    async fn execute_query(&self, mut state: TurnState) -> Step {
        let Some(sql) = state.single_sql().map(String::from) else {
            let err = QueryError::generation("standard path requires exactly one statement");
            return Step::Next(state.with_error(err), Node::HandleError);
        };

        match self.executor.execute_select(&sql).await {
            Ok(outcome) => {
                state.results = Some(outcome);
                Step::Next(state, Node::GenerateResponse)
            }
            Err(e)
                if self.workflow.auto_fix
                    && state.validation_attempts < self.workflow.max_validation_attempts =>
            {
                state.validation_attempts += 1;
                tracing::warn!(
                    error = %e.message,
                    attempt = state.validation_attempts,
                    "execution failed, attempting fix"
                );
                match self
                    .generator
                    .fix(&sql, &e.message, &state.schema_context, &state.memory_context)
                    .await
                {
                    Ok(fixed) => {
                        let next = state.with_sql(vec![fixed], GenerationKind::Select);
                        Step::Next(next, Node::ExecuteQuery)
                    }
                    Err(_) => Step::Next(state.with_error(e), Node::HandleError),
                }
            }
            Err(e) => Step::Next(state.with_error(e), Node::HandleError),
        }
    }

    async fn generate_response(&self, session: &SessionContext, mut state: TurnState) -> Step {
        let Some(outcome) = state.results.take() else {
            let err = QueryError::execution("no results to respond with");
            return Step::Next(state.with_error(err), Node::HandleError);
        };
        let sql = state.single_sql().unwrap_or_default().to_string();

        let (_table_id, pagination, first_page) = self.materialize(session, &sql, &outcome);

        let text = self
            .synthesizer
            .narrative(
                &state.question,
                &sql,
                &outcome.rows,
                &state.schema_context,
                &state.memory_context,
            )
            .await;

        let charts = self.charts.recommend(&state.question, &outcome.rows).await;

        session.cache.put(CacheEntry {
            fingerprint: fingerprint(&state.question, self.schema.version()),
            question: state.question.clone(),
            sql: sql.clone(),
            columns: outcome.columns.clone(),
            rows: outcome.rows.clone(),
            created_at: chrono::Utc::now(),
            schema_version: self.schema.version(),
        });

        session.set_recent_turn(RecentTurn {
            question: state.question.clone(),
            sql: sql.clone(),
            sample_rows: outcome.rows.iter().take(3).cloned().collect(),
        });

        self.memory
            .store_turn(
                &session.id,
                &state.question,
                &text,
                Some(&sql),
                Some(outcome.total_rows),
            )
            .await;

        let mut response = QueryResponse::sql_result(text, sql, first_page, pagination);
        response.visualization_recommendations = Some(charts);
        Step::Done(response)
    }

    async fn generate_analytical_questions(
        &self,
        session: &SessionContext,
        mut state: TurnState,
    ) -> Step {
        let schema_blob = match self.schema.context().await {
            Ok(ctx) => ctx.llm_context(),
            Err(e) => return Step::Next(state.with_error(e), Node::HandleError),
        };
        state.schema_context = schema_blob;
        if state.memory_context.is_empty() {
            state.memory_context = self.memory.retrieve(&session.id, &state.question).await;
        }

        match self
            .analytical
            .plan(&state.question, &state.schema_context, &state.memory_context)
            .await
        {
            Ok(questions) if questions.len() >= self.analytical.min_questions() => {
                state.analytical_questions = questions;
                Step::Next(state, Node::ExecuteAnalyticalWorkflow)
            }
            Ok(questions) => {
                // Too few facets to be worth a portfolio; degrade to standard.
                tracing::info!(
                    planned = questions.len(),
                    "planner returned too few sub-questions, degrading to standard path"
                );
                state.workflow_type = WorkflowType::Standard;
                state.requires_analysis = false;
                Step::Next(state, Node::GenerateSql)
            }
            Err(e) => Step::Next(state.with_error(e), Node::HandleError),
        }
    }

    async fn execute_analytical_workflow(
        &self,
        session: &SessionContext,
        mut state: TurnState,
    ) -> Step {
        let schema = match self.schema.context().await {
            Ok(ctx) => ctx,
            Err(e) => return Step::Next(state.with_error(e), Node::HandleError),
        };

        match self
            .analytical
            .execute(
                session,
                &schema,
                &state.schema_context,
                &state.analytical_questions,
                self.schema.version(),
            )
            .await
        {
            Ok(results) => {
                state.analytical_results = results;
                Step::Next(state, Node::GenerateComprehensiveAnalysis)
            }
            Err(e) => Step::Next(state.with_error(e), Node::HandleError),
        }
    }

    async fn generate_comprehensive_analysis(
        &self,
        session: &SessionContext,
        mut state: TurnState,
    ) -> Step {
        let narrative = match self
            .analytical
            .synthesize(
                &state.question,
                &state.analytical_results,
                &state.schema_context,
                &state.memory_context,
            )
            .await
        {
            Ok(text) => text,
            Err(e) => {
                // Partial results are still worth returning.
                tracing::warn!(error = %e.message, "synthesis failed, building fallback report");
                self.fallback_report(&state)
            }
        };
        state.comprehensive_analysis = narrative.clone();

        let mut tables = Vec::new();
        for result in state.analytical_results.iter().filter(|r| r.succeeded()) {
            let outcome = SelectOutcome {
                columns: result
                    .rows
                    .first()
                    .and_then(|r| r.as_object())
                    .map(|o| o.keys().cloned().collect())
                    .unwrap_or_default(),
                rows: result.rows.clone(),
                total_rows: result.rows.len(),
                elapsed_ms: result.elapsed_ms,
            };
            let (table_id, pagination, first_page) =
                self.materialize(session, &result.sql, &outcome);
            tables.push(AnalysisTable {
                name: result.sub_question.clone(),
                description: result.description.clone(),
                sql: result.sql.clone(),
                results: first_page,
                row_count: result.rows.len(),
                table_id,
                pagination,
            });
        }

        self.memory
            .store_turn(&session.id, &state.question, &narrative, None, None)
            .await;

        let failed: Vec<&str> = state
            .analytical_results
            .iter()
            .filter(|r| !r.succeeded())
            .map(|r| r.sub_question.as_str())
            .collect();
        let mut text = narrative;
        if !failed.is_empty() {
            text.push_str(&format!(
                "\n\n_Note: {} sub-question(s) could not be answered: {}._",
                failed.len(),
                failed.join("; ")
            ));
        }

        Step::Done(QueryResponse::analysis(text, tables, "comprehensive"))
    }

    fn handle_error(&self, state: TurnState) -> Step {
        let error = state
            .error
            .unwrap_or_else(|| QueryError::new(ErrorKind::RoutingFailed, "unknown error"));
        tracing::error!(kind = %error.kind, message = %error.message, "turn failed");
        Step::Done(QueryResponse::from_error(error))
    }

    // --- helpers ---------------------------------------------------------

    /// Register the result set as a session table and cut its first page.
    fn materialize(
        &self,
        session: &SessionContext,
        sql: &str,
        outcome: &SelectOutcome,
    ) -> (String, Pagination, Vec<JsonValue>) {
        let page_size = self.pagination.page_size_default;
        let table = ResultTable {
            table_id: uuid::Uuid::new_v4().to_string(),
            sql: sql.to_string(),
            columns: outcome.columns.clone(),
            rows: outcome.rows.clone(),
            total_rows: outcome.total_rows,
            page_size,
            generated_at: chrono::Utc::now(),
        };
        let table_id = session.store_table(table.clone());

        match table.page(1, page_size) {
            Ok(page) => {
                let pagination = Pagination::from_page(&table_id, &page);
                (table_id, pagination, page.rows)
            }
            Err(_) => {
                // Empty result set: one empty page, not an error.
                let pagination = Pagination {
                    table_id: table_id.clone(),
                    current_page: 1,
                    total_pages: 0,
                    total_rows: 0,
                    page_size,
                    has_next: false,
                    has_prev: false,
                };
                (table_id, pagination, Vec::new())
            }
        }
    }

    async fn respond_from_cache(
        &self,
        session: &SessionContext,
        hit: CacheEntry,
    ) -> QueryResponse {
        let outcome = SelectOutcome {
            columns: hit.columns.clone(),
            total_rows: hit.rows.len(),
            rows: hit.rows.clone(),
            elapsed_ms: 0,
        };
        let (_, pagination, first_page) = self.materialize(session, &hit.sql, &outcome);

        let text = self
            .synthesizer
            .narrative(&hit.question, &hit.sql, &hit.rows, "", "")
            .await;

        let mut response = QueryResponse::sql_result(text, hit.sql, first_page, pagination);
        response.visualization_recommendations =
            Some(self.charts.recommend(&hit.question, &hit.rows).await);
        response
    }

    fn memory_with_recent_turn(&self, session: &SessionContext, memory_context: &str) -> String {
        let Some(recent) = session.recent_turn() else {
            return memory_context.to_string();
        };

        let mut parts = Vec::new();
        if !memory_context.is_empty() {
            parts.push(memory_context.to_string());
        }
        parts.push(format!(
            "### PREVIOUS TURN:\nQuestion: {}\nSQL: {}\nSample rows: {}",
            recent.question,
            recent.sql,
            serde_json::to_string(&recent.sample_rows).unwrap_or_default()
        ));
        parts.join("\n\n")
    }

    fn fallback_report(&self, state: &TurnState) -> String {
        let mut out = vec![format!(
            "Analysis of \"{}\" completed with {} of {} sub-questions answered.",
            state.question,
            state.analytical_results.iter().filter(|r| r.succeeded()).count(),
            state.analytical_results.len()
        )];
        for result in state.analytical_results.iter().filter(|r| r.succeeded()) {
            out.push(format!(
                "- {} ({} rows)",
                result.description,
                result.rows.len()
            ));
        }
        out.join("\n")
    }
}
