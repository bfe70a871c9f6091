//! Configuration management.
//!
//! Configuration is loaded in layers: built-in defaults, then an optional
//! `config/tabletalk.{yaml,toml,json}` file, then `TABLETALK`-prefixed
//! environment variables with `__` as the section separator. Provider API
//! keys and the database URL are also picked up from their conventional
//! environment variable names.

use serde::{Deserialize, Serialize};

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Target database connection settings.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Chat model settings.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Embedding provider settings.
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
    /// Conversation memory settings.
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Query cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Workflow limits and timeouts.
    #[serde(default)]
    pub workflow: WorkflowConfig,
    /// Result pagination settings.
    #[serde(default)]
    pub pagination: PaginationConfig,
    /// Session lifecycle settings.
    #[serde(default)]
    pub session: SessionConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from defaults, config files, and environment.
    pub fn load() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        let builder = config::Config::builder()
            .set_default("llm.model", "gpt-4o")?
            .set_default("llm.temperature", 0.0)?
            .set_default("workflow.max_validation_attempts", 2)?
            .add_source(config::File::with_name("config/tabletalk").required(false))
            .add_source(
                config::Environment::with_prefix("TABLETALK")
                    .separator("__")
                    .try_parsing(true),
            );

        let mut cfg: AppConfig = builder.build()?.try_deserialize().unwrap_or_default();

        if let Ok(url) = std::env::var("DATABASE_URL") {
            cfg.database.url = Some(url);
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            cfg.llm.api_key.get_or_insert(key.clone());
            cfg.embeddings.api_key.get_or_insert(key);
        }
        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
            if cfg.llm.provider == LlmProviderKind::Anthropic {
                cfg.llm.api_key = Some(key);
            }
        }
        if let Ok(endpoint) = std::env::var("AZURE_OPENAI_ENDPOINT") {
            cfg.llm.base_url = Some(endpoint);
            cfg.llm.provider = LlmProviderKind::Azure;
            if let Ok(key) = std::env::var("AZURE_OPENAI_API_KEY") {
                cfg.llm.api_key = Some(key);
            }
            if let Ok(deployment) = std::env::var("AZURE_OPENAI_DEPLOYMENT_NAME") {
                cfg.llm.deployment = Some(deployment);
            }
        }

        Ok(cfg)
    }
}

/// Supported chat-model providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProviderKind {
    /// OpenAI and OpenAI-compatible APIs.
    #[default]
    OpenAi,
    /// Azure OpenAI deployments.
    Azure,
    /// Anthropic Claude.
    Anthropic,
}

/// Target database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL.
    pub url: Option<String>,
    /// Analyzed schema name.
    #[serde(default = "default_schema")]
    pub schema: String,
    /// Analyzed table name.
    #[serde(default = "default_table")]
    pub table: String,
    /// Minimum pool connections.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Maximum pool connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Per-statement timeout in seconds.
    #[serde(default = "default_db_timeout")]
    pub statement_timeout_secs: u64,
    /// Distinct-count threshold under which a column is treated as enum-like.
    #[serde(default = "default_enum_threshold")]
    pub enum_threshold: i64,
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_table() -> String {
    "IT_Professional_Services".to_string()
}

fn default_min_connections() -> u32 {
    5
}

fn default_max_connections() -> u32 {
    20
}

fn default_db_timeout() -> u64 {
    60
}

fn default_enum_threshold() -> i64 {
    50
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            schema: default_schema(),
            table: default_table(),
            min_connections: default_min_connections(),
            max_connections: default_max_connections(),
            statement_timeout_secs: default_db_timeout(),
            enum_threshold: default_enum_threshold(),
        }
    }
}

/// Chat model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider type.
    #[serde(default)]
    pub provider: LlmProviderKind,
    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,
    /// API key.
    pub api_key: Option<String>,
    /// Base URL override (required for Azure).
    pub base_url: Option<String>,
    /// Azure deployment name.
    pub deployment: Option<String>,
    /// Sampling temperature.
    #[serde(default)]
    pub temperature: f32,
    /// Maximum tokens to generate.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Per-call timeout in seconds.
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_llm_timeout() -> u64 {
    60
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProviderKind::default(),
            model: default_model(),
            api_key: None,
            base_url: None,
            deployment: None,
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

/// Embedding provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    /// Embedding model identifier.
    #[serde(default = "default_embeddings_model")]
    pub model: String,
    /// API key.
    pub api_key: Option<String>,
    /// Base URL override.
    pub base_url: Option<String>,
    /// Per-call timeout in seconds.
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

fn default_embeddings_model() -> String {
    "text-embedding-3-small".to_string()
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            model: default_embeddings_model(),
            api_key: None,
            base_url: None,
            timeout_secs: default_llm_timeout(),
        }
    }
}

/// Conversation memory configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Enable/disable conversation memory.
    #[serde(default = "default_true")]
    pub use_memory: bool,
    /// Directory for per-session vector stores.
    #[serde(default = "default_memory_dir")]
    pub persist_dir: String,
    /// Neighbors fetched per retrieval.
    #[serde(default = "default_retrieval_k")]
    pub retrieval_k: usize,
    /// Approximate token budget for the retrieved blob.
    #[serde(default = "default_memory_budget")]
    pub token_budget: usize,
}

fn default_true() -> bool {
    true
}

fn default_memory_dir() -> String {
    "./memory_store".to_string()
}

fn default_retrieval_k() -> usize {
    3
}

fn default_memory_budget() -> usize {
    1500
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            use_memory: true,
            persist_dir: default_memory_dir(),
            retrieval_k: default_retrieval_k(),
            token_budget: default_memory_budget(),
        }
    }
}

/// Query cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Enable/disable the query cache.
    #[serde(default = "default_true")]
    pub use_cache: bool,
    /// Per-session LRU capacity.
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

fn default_cache_capacity() -> usize {
    64
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            use_cache: true,
            capacity: default_cache_capacity(),
        }
    }
}

/// Workflow limits and timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Maximum SQL validation/fix attempts.
    #[serde(default = "default_validation_attempts")]
    pub max_validation_attempts: u32,
    /// Re-generate on execution errors.
    #[serde(default = "default_true")]
    pub auto_fix: bool,
    /// Minimum analytical sub-questions before degrading to standard.
    #[serde(default = "default_subq_min")]
    pub analytical_subquestions_min: usize,
    /// Maximum analytical sub-questions retained from the planner.
    #[serde(default = "default_subq_max")]
    pub analytical_subquestions_max: usize,
    /// Whole-turn timeout in seconds.
    #[serde(default = "default_turn_timeout")]
    pub turn_timeout_secs: u64,
    /// Allow DML/DDL generation by default for new sessions.
    #[serde(default)]
    pub edit_mode_enabled: bool,
}

fn default_validation_attempts() -> u32 {
    2
}

fn default_subq_min() -> usize {
    2
}

fn default_subq_max() -> usize {
    6
}

fn default_turn_timeout() -> u64 {
    300
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_validation_attempts: default_validation_attempts(),
            auto_fix: true,
            analytical_subquestions_min: default_subq_min(),
            analytical_subquestions_max: default_subq_max(),
            turn_timeout_secs: default_turn_timeout(),
            edit_mode_enabled: false,
        }
    }
}

/// Result pagination configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationConfig {
    /// Default page size.
    #[serde(default = "default_page_size")]
    pub page_size_default: usize,
    /// Maximum page size (requests are clamped).
    #[serde(default = "default_page_size_max")]
    pub page_size_max: usize,
}

fn default_page_size() -> usize {
    10
}

fn default_page_size_max() -> usize {
    200
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_size_default: default_page_size(),
            page_size_max: default_page_size_max(),
        }
    }
}

/// Session lifecycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Idle minutes before a session is evicted.
    #[serde(default = "default_idle_ttl")]
    pub idle_ttl_minutes: i64,
}

fn default_idle_ttl() -> i64 {
    60
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_ttl_minutes: default_idle_ttl(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_contract() {
        let cfg = AppConfig::default();
        assert!(cfg.memory.use_memory);
        assert!(cfg.cache.use_cache);
        assert_eq!(cfg.cache.capacity, 64);
        assert_eq!(cfg.workflow.max_validation_attempts, 2);
        assert_eq!(cfg.pagination.page_size_default, 10);
        assert_eq!(cfg.pagination.page_size_max, 200);
        assert_eq!(cfg.database.min_connections, 5);
        assert_eq!(cfg.database.max_connections, 20);
        assert_eq!(cfg.workflow.turn_timeout_secs, 300);
        assert_eq!(cfg.session.idle_ttl_minutes, 60);
    }

    #[test]
    fn test_config_deserializes_partial_input() {
        let cfg: AppConfig =
            serde_json::from_str(r#"{"llm": {"model": "gpt-4.1", "temperature": 0.2}}"#).unwrap();
        assert_eq!(cfg.llm.model, "gpt-4.1");
        assert_eq!(cfg.workflow.analytical_subquestions_max, 6);
    }
}
