//! Shared test harness: scripted LLM, in-memory executor, fixed schema.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use tabletalk::config::{LlmProviderKind, PaginationConfig, WorkflowConfig};
use tabletalk::embeddings::EmbeddingClient;
use tabletalk::error::QueryError;
use tabletalk::execution::{EditMode, EditOutcome, QueryExecutor, SelectOutcome};
use tabletalk::llm::{LlmClient, LlmRequest, LlmResponse};
use tabletalk::memory::store::FileVectorStore;
use tabletalk::memory::ConversationMemory;
use tabletalk::prompts::PromptLibrary;
use tabletalk::schema::{ColumnInfo, ColumnProbe, SchemaContext, SchemaProvider};
use tabletalk::session::{SessionContext, SessionRegistry};
use tabletalk::workflow::analytical::AnalyticalManager;
use tabletalk::workflow::charts::ChartRecommender;
use tabletalk::workflow::exploration::ColumnExplorer;
use tabletalk::workflow::generation::SqlGenerator;
use tabletalk::workflow::graph::GraphOrchestrator;
use tabletalk::workflow::response::ResponseSynthesizer;
use tabletalk::workflow::verifier::Verifier;

/// One scripted response: matches on a system-prompt marker and an optional
/// user-prompt substring.
struct Rule {
    system_marker: String,
    user_marker: String,
    content: String,
}

/// LLM double that answers from scripted rules and records which prompts
/// were exercised.
#[derive(Default)]
pub struct MockLlm {
    rules: Mutex<Vec<Rule>>,
    pub calls: Mutex<Vec<String>>,
}

impl MockLlm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a response for prompts whose system text contains
    /// `system_marker` and whose user text contains `user_marker`
    /// (empty matches anything).
    pub fn add_rule(&self, system_marker: &str, user_marker: &str, content: &str) {
        self.rules.lock().unwrap().push(Rule {
            system_marker: system_marker.to_string(),
            user_marker: user_marker.to_string(),
            content: content.to_string(),
        });
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn complete(&self, req: LlmRequest) -> anyhow::Result<LlmResponse> {
        let system = req.messages.first().map(|m| m.content.clone()).unwrap_or_default();
        let user = req.messages.last().map(|m| m.content.clone()).unwrap_or_default();

        let rules = self.rules.lock().unwrap();
        for rule in rules.iter() {
            if system.contains(&rule.system_marker)
                && (rule.user_marker.is_empty() || user.contains(&rule.user_marker))
            {
                self.calls.lock().unwrap().push(rule.system_marker.clone());
                return Ok(LlmResponse {
                    content: rule.content.clone(),
                    model: Some("mock".to_string()),
                    prompt_tokens: None,
                    completion_tokens: None,
                });
            }
        }
        anyhow::bail!("no scripted response for prompt: {}", &system[..system.len().min(60)]);
    }

    fn provider(&self) -> LlmProviderKind {
        LlmProviderKind::OpenAi
    }

    fn model(&self) -> &str {
        "mock"
    }
}

type SelectHandler = Box<dyn Fn(&str) -> Result<Vec<JsonValue>, String> + Send + Sync>;

/// Executor double: routes SELECTs through a handler function and records
/// every statement.
pub struct MockExecutor {
    handler: SelectHandler,
    pub select_calls: Mutex<Vec<String>>,
    pub edit_calls: Mutex<Vec<Vec<String>>>,
}

impl MockExecutor {
    pub fn new(handler: impl Fn(&str) -> Result<Vec<JsonValue>, String> + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            select_calls: Mutex::new(Vec::new()),
            edit_calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl QueryExecutor for MockExecutor {
    async fn execute_select(&self, sql: &str) -> Result<SelectOutcome, QueryError> {
        self.select_calls.lock().unwrap().push(sql.to_string());
        match (self.handler)(sql) {
            Ok(rows) => Ok(SelectOutcome {
                columns: rows
                    .first()
                    .and_then(|r| r.as_object())
                    .map(|o| o.keys().cloned().collect())
                    .unwrap_or_default(),
                total_rows: rows.len(),
                rows,
                elapsed_ms: 1,
            }),
            Err(message) => Err(QueryError::execution(message).with_sql(sql)),
        }
    }

    async fn execute_edit(&self, sqls: &[String], _mode: EditMode) -> Result<EditOutcome, QueryError> {
        self.edit_calls.lock().unwrap().push(sqls.to_vec());
        Ok(EditOutcome {
            per_statement: Vec::new(),
            transaction: sqls.len() > 1,
            rollback_performed: false,
            failed_at_query: None,
            schema_changed: false,
        })
    }
}

/// Fixed-schema provider.
pub struct FixedSchema {
    context: Arc<SchemaContext>,
}

impl FixedSchema {
    pub fn new() -> Self {
        Self {
            context: Arc::new(sample_schema()),
        }
    }
}

#[async_trait]
impl SchemaProvider for FixedSchema {
    async fn context(&self) -> Result<Arc<SchemaContext>, QueryError> {
        Ok(self.context.clone())
    }

    fn version(&self) -> u64 {
        1
    }
}

/// Deterministic embedder keyed on a few topic words.
pub struct TopicEmbedder;

#[async_trait]
impl EmbeddingClient for TopicEmbedder {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let lower = text.to_lowercase();
        Ok(vec![
            lower.contains("rate") as u8 as f32,
            lower.contains("supplier") as u8 as f32,
            lower.contains("country") as u8 as f32,
            0.1,
        ])
    }

    fn model(&self) -> &str {
        "topic-mock"
    }
}

pub fn sample_schema() -> SchemaContext {
    let mut probes = BTreeMap::new();
    probes.insert(
        "country_of_work".to_string(),
        ColumnProbe {
            distinct_count: 3,
            enum_values: vec!["DEU".into(), "IND".into(), "USA".into()],
            ..ColumnProbe::default()
        },
    );

    let column = |name: &str, data_type: &str, pk: bool| ColumnInfo {
        name: name.to_string(),
        data_type: data_type.to_string(),
        nullable: !pk,
        default: None,
        primary_key: pk,
        references: None,
    };

    SchemaContext {
        schema: "public".to_string(),
        table: "IT_Professional_Services".to_string(),
        columns: vec![
            column("id", "integer", true),
            column("supplier_company", "text", false),
            column("country_of_work", "text", false),
            column("normalized_role_title", "text", false),
            column("hourly_rate_in_usd", "numeric", false),
        ],
        indexes: vec![],
        row_count: 5000,
        table_size: "4 MB".to_string(),
        sample_rows: vec![serde_json::json!({"id": 1, "supplier_company": "TCS"})],
        probes,
        analyzed_at: chrono::Utc::now(),
        version: 1,
    }
}

/// Fully wired orchestrator over mocks.
pub struct Harness {
    pub graph: GraphOrchestrator,
    pub session: Arc<SessionContext>,
    pub llm: Arc<MockLlm>,
    pub executor: Arc<MockExecutor>,
    _memory_dir: tempfile::TempDir,
}

pub fn harness(llm: MockLlm, executor: MockExecutor) -> Harness {
    let llm = Arc::new(llm);
    let executor = Arc::new(executor);
    let prompts = Arc::new(PromptLibrary::new());

    let memory_dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileVectorStore::open(memory_dir.path()).unwrap());
    let memory = Arc::new(ConversationMemory::new(
        Arc::new(TopicEmbedder),
        store,
        true,
        3,
        1500,
    ));

    let generator = Arc::new(SqlGenerator::new(llm.clone(), prompts.clone()));
    let explorer = Arc::new(ColumnExplorer::new(executor.clone()));
    let analytical = Arc::new(AnalyticalManager::new(
        llm.clone(),
        prompts.clone(),
        explorer,
        executor.clone(),
        2,
        6,
    ));
    let verifier = Arc::new(Verifier::new(llm.clone(), prompts.clone()));
    let synthesizer = Arc::new(ResponseSynthesizer::new(llm.clone(), prompts.clone()));
    let charts = Arc::new(ChartRecommender::new(llm.clone(), prompts));

    let graph = GraphOrchestrator::new(
        generator,
        analytical,
        verifier,
        synthesizer,
        charts,
        executor.clone(),
        memory,
        Arc::new(FixedSchema::new()),
        WorkflowConfig::default(),
        PaginationConfig::default(),
    );

    let registry = SessionRegistry::new(true, 64, false, 60);
    let session = registry.get_or_create("test-session");

    Harness {
        graph,
        session,
        llm,
        executor,
        _memory_dir: memory_dir,
    }
}

/// Rows `{"id": 0..n, "country_of_work": "IND"}` in order.
pub fn id_rows(n: usize) -> Vec<JsonValue> {
    (0..n)
        .map(|i| serde_json::json!({"id": i, "country_of_work": "IND"}))
        .collect()
}
