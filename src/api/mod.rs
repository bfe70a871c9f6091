//! Public response types consumed by the HTTP layer.

pub mod envelope;

pub use envelope::{AnalysisTable, Pagination, QueryResponse, QueryType};
