//! Process-wide engine: explicit initialization, session lifecycle, and the
//! public entry points the HTTP layer calls.
//!
//! All shared state lives behind this handle; there are no module-level
//! globals. `init` wires the database pool, schema analyzer, providers, and
//! workflow graph; `shutdown` closes the pool.

use std::sync::Arc;

use crate::api::envelope::{Pagination, QueryResponse};
use crate::config::AppConfig;
use crate::database::{split_statements, Database};
use crate::embeddings::create_embedder;
use crate::error::{ErrorKind, QueryError};
use crate::execution::{EditMode, ExecutionEngine, QueryExecutor};
use crate::llm::create_client;
use crate::memory::store::FileVectorStore;
use crate::memory::ConversationMemory;
use crate::prompts::{PromptLibrary, PROMPT_VERSION};
use crate::schema::SchemaAnalyzer;
use crate::session::SessionRegistry;
use crate::workflow::analytical::AnalyticalManager;
use crate::workflow::charts::ChartRecommender;
use crate::workflow::exploration::ColumnExplorer;
use crate::workflow::generation::SqlGenerator;
use crate::workflow::graph::GraphOrchestrator;
use crate::workflow::response::ResponseSynthesizer;
use crate::workflow::verifier::Verifier;

/// The assembled engine.
pub struct Engine {
    config: AppConfig,
    db: Database,
    sessions: Arc<SessionRegistry>,
    memory: Arc<ConversationMemory>,
    analyzer: Arc<SchemaAnalyzer>,
    executor: Arc<dyn QueryExecutor>,
    graph: GraphOrchestrator,
}

impl Engine {
    /// Initialize all shared state from configuration.
    ///
    /// Performs the initial table analysis so the first turn does not pay
    /// for it.
    ///
    /// # Errors
    ///
    /// Returns an error when the database is unreachable, the target table
    /// does not exist, or the memory store cannot be opened.
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        crate::logging::init_tracing(&config.logging.level);
        tracing::info!(
            table = %config.database.table,
            model = %config.llm.model,
            prompt_version = PROMPT_VERSION,
            "initializing engine"
        );

        let db = Database::connect(&config.database).await?;

        let analyzer = Arc::new(SchemaAnalyzer::new(
            db.clone(),
            config.database.schema.clone(),
            config.database.table.clone(),
            config.database.enum_threshold,
        ));
        analyzer
            .analyze()
            .await
            .map_err(|e| anyhow::anyhow!("initial table analysis failed: {e}"))?;

        let llm = create_client(&config.llm);
        let embedder = create_embedder(&config.embeddings);
        let prompts = Arc::new(PromptLibrary::new());

        let store = Arc::new(FileVectorStore::open(&config.memory.persist_dir)?);
        let memory = Arc::new(ConversationMemory::new(
            embedder,
            store,
            config.memory.use_memory,
            config.memory.retrieval_k,
            config.memory.token_budget,
        ));

        let executor: Arc<dyn QueryExecutor> = Arc::new(ExecutionEngine::new(
            db.clone(),
            analyzer.clone(),
            config.database.statement_timeout_secs,
        ));

        let explorer = Arc::new(ColumnExplorer::new(executor.clone()));
        let generator = Arc::new(SqlGenerator::new(llm.clone(), prompts.clone()));
        let analytical = Arc::new(AnalyticalManager::new(
            llm.clone(),
            prompts.clone(),
            explorer,
            executor.clone(),
            config.workflow.analytical_subquestions_min,
            config.workflow.analytical_subquestions_max,
        ));
        let verifier = Arc::new(Verifier::new(llm.clone(), prompts.clone()));
        let synthesizer = Arc::new(ResponseSynthesizer::new(llm.clone(), prompts.clone()));
        let charts = Arc::new(ChartRecommender::new(llm, prompts));

        let graph = GraphOrchestrator::new(
            generator,
            analytical,
            verifier,
            synthesizer,
            charts,
            executor.clone(),
            memory.clone(),
            analyzer.clone(),
            config.workflow.clone(),
            config.pagination.clone(),
        );

        let sessions = Arc::new(SessionRegistry::new(
            config.cache.use_cache,
            config.cache.capacity,
            config.workflow.edit_mode_enabled,
            config.session.idle_ttl_minutes,
        ));

        tracing::info!("engine initialized");
        Ok(Self {
            config,
            db,
            sessions,
            memory,
            analyzer,
            executor,
            graph,
        })
    }

    /// Release shared resources.
    pub async fn shutdown(self) {
        self.db.pool().close().await;
        tracing::info!("engine shut down");
    }

    /// Create a session and return its id.
    pub fn create_session(&self) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.sessions.get_or_create(&id);
        id
    }

    /// Delete a session, its tables, cache, and memory.
    pub fn delete_session(&self, session_id: &str) -> bool {
        self.memory.delete_session(session_id);
        self.sessions.remove(session_id)
    }

    /// Evict sessions idle past the TTL.
    pub fn evict_idle_sessions(&self) -> Vec<String> {
        self.sessions.evict_idle()
    }

    /// Process one user turn.
    ///
    /// `edit_mode` overrides the session flag for this and later turns;
    /// `None` keeps the current (role-based default) setting.
    pub async fn process_turn(
        &self,
        session_id: &str,
        question: &str,
        user_role: &str,
        edit_mode: Option<bool>,
    ) -> QueryResponse {
        let session = self.sessions.get_or_create(session_id);
        if let Some(enabled) = edit_mode {
            session.set_edit_mode(enabled && user_role != "viewer");
        }
        self.graph.process_turn(session, question, user_role).await
    }

    /// Retrieve one page of a materialized result table.
    pub fn get_page(
        &self,
        session_id: &str,
        table_id: &str,
        page: usize,
        page_size: Option<usize>,
    ) -> QueryResponse {
        let page_size = page_size
            .unwrap_or(self.config.pagination.page_size_default)
            .clamp(1, self.config.pagination.page_size_max);

        let Some(session) = self.sessions.get(session_id) else {
            return QueryResponse::from_error(QueryError::new(
                ErrorKind::InvalidPage,
                format!("unknown session {session_id}"),
            ));
        };
        session.touch();

        let Some(table) = session.table(table_id) else {
            return QueryResponse::from_error(QueryError::new(
                ErrorKind::InvalidPage,
                format!("unknown table {table_id}"),
            ));
        };

        match table.page(page, page_size) {
            Ok(view) => QueryResponse::sql_result(
                format!(
                    "Page {} of {} ({} rows total).",
                    view.page, view.total_pages, view.total_rows
                ),
                table.sql.clone(),
                view.rows.clone(),
                Pagination::from_page(table_id, &view),
            ),
            Err(e) => QueryResponse::from_error(e),
        }
    }

    /// Execute a confirmed edit batch.
    ///
    /// This is the second half of the edit-confirmation contract: the caller
    /// re-submits the statements from an `edit_sql` envelope.
    pub async fn execute_edit(
        &self,
        session_id: &str,
        sql_blob: &str,
        mode: EditMode,
    ) -> QueryResponse {
        let session = self.sessions.get_or_create(session_id);
        if !session.edit_mode() {
            return QueryResponse::conversational(
                "Edit mode is disabled for this session; nothing was executed.",
            );
        }

        let statements = split_statements(sql_blob);
        if statements.is_empty() {
            return QueryResponse::from_error(QueryError::execution("empty edit request"));
        }

        match self.executor.execute_edit(&statements, mode).await {
            Ok(outcome) => {
                if outcome.schema_changed {
                    self.sessions
                        .invalidate_caches_before(self.analyzer.version());
                }
                let text = if outcome.success() {
                    let affected: u64 = outcome
                        .per_statement
                        .iter()
                        .filter_map(|s| s.affected_rows)
                        .sum();
                    format!(
                        "Executed {} statement{} affecting {} row{}.{}",
                        outcome.per_statement.len(),
                        if outcome.per_statement.len() == 1 { "" } else { "s" },
                        affected,
                        if affected == 1 { "" } else { "s" },
                        if outcome.schema_changed {
                            " The schema changed; the table analysis was refreshed."
                        } else {
                            ""
                        }
                    )
                } else {
                    format!(
                        "Statement {} failed and the transaction was rolled back: {}",
                        outcome.failed_at_query.unwrap_or(0),
                        outcome.first_error().unwrap_or("unknown error")
                    )
                };

                self.memory
                    .store_turn(session_id, "confirmed edit execution", &text, Some(sql_blob), None)
                    .await;

                QueryResponse::edit_execution(text, &outcome, sql_blob)
            }
            Err(e) => QueryResponse::from_error(e),
        }
    }

    /// Current configuration.
    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}
