//! tabletalk - Conversational SQL analytics engine.
//!
//! Converts natural-language questions about one PostgreSQL table into
//! executable SQL, runs it, and returns either a direct tabular answer with
//! a narrative, a conversational reply, or a multi-query analytical report.
//! The core is an LLM-orchestrated state machine: graph nodes are LLM calls
//! and database actions wired with conditional routing, retry, memory
//! retrieval, and result synthesis.
//!
//! # Architecture
//!
//! - [`config`]: layered configuration loading
//! - [`llm`] / [`embeddings`]: provider clients behind trait seams
//! - [`database`] / [`schema`]: pool access and target-table analysis
//! - [`prompts`]: versioned parameterized templates
//! - [`memory`] / [`cache`] / [`session`]: per-session state
//! - [`execution`]: SELECT and transactional edit execution
//! - [`workflow`]: the routing graph and its nodes
//! - [`api`]: the response envelope the HTTP layer returns verbatim
//! - [`engine`]: process-wide wiring with explicit init/shutdown
//!
//! # Example
//!
//! ```rust,ignore
//! use tabletalk::{config::AppConfig, engine::Engine};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let engine = Engine::init(AppConfig::load()?).await?;
//!     let session = engine.create_session();
//!     let response = engine
//!         .process_turn(&session, "show me 5 rows", "viewer", None)
//!         .await;
//!     println!("{}", response.text);
//!     engine.shutdown().await;
//!     Ok(())
//! }
//! ```

#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod api;
pub mod cache;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod engine;
pub mod error;
pub mod execution;
pub mod llm;
pub mod logging;
pub mod memory;
pub mod prompts;
pub mod schema;
pub mod session;
pub mod workflow;

pub use api::envelope::{QueryResponse, QueryType};
pub use engine::Engine;
pub use error::{ErrorKind, QueryError};
