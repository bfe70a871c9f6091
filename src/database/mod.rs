//! Target-database access.
//!
//! Wraps a Postgres connection pool with per-statement timeouts, a single
//! reconnect retry on connection-level failures, and dynamic row-to-JSON
//! conversion (generated SQL has no compile-time row type).

use std::time::Duration;

use serde_json::{json, Value as JsonValue};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Row, TypeInfo};

use crate::config::DatabaseConfig;
use crate::error::QueryError;

/// Sentinel that splits one incoming SQL blob into an ordered statement
/// list that must run as a single transaction.
pub const MULTI_STATEMENT_SEPARATOR: &str = "<----->";

/// Handle to the analyzed database.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
    statement_timeout: Duration,
}

impl Database {
    /// Connect a pool using the configured bounds.
    ///
    /// # Errors
    ///
    /// Returns an error when no URL is configured or the pool cannot reach
    /// the server.
    pub async fn connect(config: &DatabaseConfig) -> anyhow::Result<Self> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("database.url is not configured"))?;

        let pool = PgPoolOptions::new()
            .min_connections(config.min_connections)
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(url)
            .await?;

        tracing::info!(
            min = config.min_connections,
            max = config.max_connections,
            "database pool connected"
        );

        Ok(Self {
            pool,
            statement_timeout: Duration::from_secs(config.statement_timeout_secs),
        })
    }

    /// Wrap an existing pool (used by the schema analyzer in tests).
    #[must_use]
    pub fn from_pool(pool: PgPool, statement_timeout: Duration) -> Self {
        Self {
            pool,
            statement_timeout,
        }
    }

    /// Underlying pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run a row-returning statement, converting every row to a JSON object.
    ///
    /// Returns the column names (empty for an empty result set) and rows.
    pub async fn fetch_rows(&self, sql: &str) -> Result<(Vec<String>, Vec<JsonValue>), QueryError> {
        let rows = self.fetch_raw(sql).await?;
        let columns = rows
            .first()
            .map(|row| {
                row.columns()
                    .iter()
                    .map(|c| c.name().to_string())
                    .collect()
            })
            .unwrap_or_default();
        let converted = rows.iter().map(row_to_json).collect();
        Ok((columns, converted))
    }

    /// Run a non-returning statement; yields the affected row count.
    pub async fn execute(&self, sql: &str) -> Result<u64, QueryError> {
        let fut = sqlx::query(sql).execute(&self.pool);
        match tokio::time::timeout(self.statement_timeout, fut).await {
            Err(_) => Err(QueryError::timeout("database statement").with_sql(sql)),
            Ok(Ok(done)) => Ok(done.rows_affected()),
            Ok(Err(e)) if is_connection_error(&e) => {
                tracing::warn!(error = %e, "connection-level failure, retrying once");
                sqlx::query(sql)
                    .execute(&self.pool)
                    .await
                    .map(|done| done.rows_affected())
                    .map_err(|e| QueryError::execution(e.to_string()).with_sql(sql))
            }
            Ok(Err(e)) => Err(QueryError::execution(e.to_string()).with_sql(sql)),
        }
    }

    async fn fetch_raw(&self, sql: &str) -> Result<Vec<PgRow>, QueryError> {
        let fut = sqlx::query(sql).fetch_all(&self.pool);
        match tokio::time::timeout(self.statement_timeout, fut).await {
            Err(_) => Err(QueryError::timeout("database statement").with_sql(sql)),
            Ok(Ok(rows)) => Ok(rows),
            Ok(Err(e)) if is_connection_error(&e) => {
                tracing::warn!(error = %e, "connection-level failure, retrying once");
                sqlx::query(sql)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| QueryError::execution(e.to_string()).with_sql(sql))
            }
            Ok(Err(e)) => Err(QueryError::execution(e.to_string()).with_sql(sql)),
        }
    }
}

fn is_connection_error(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::Io(_) | sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut
    )
}

/// Convert one Postgres row into a JSON object keyed by column name.
#[must_use]
pub fn row_to_json(row: &PgRow) -> JsonValue {
    let mut map = serde_json::Map::new();

    for column in row.columns() {
        let name = column.name();
        let type_name = column.type_info().name();

        let value: Option<JsonValue> = match type_name {
            "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME" => row
                .try_get::<Option<String>, _>(name)
                .ok()
                .flatten()
                .map(|s| json!(s)),
            "INT2" => row
                .try_get::<Option<i16>, _>(name)
                .ok()
                .flatten()
                .map(|i| json!(i)),
            "INT4" => row
                .try_get::<Option<i32>, _>(name)
                .ok()
                .flatten()
                .map(|i| json!(i)),
            "INT8" => row
                .try_get::<Option<i64>, _>(name)
                .ok()
                .flatten()
                .map(|i| json!(i)),
            "FLOAT4" | "FLOAT8" => row
                .try_get::<Option<f64>, _>(name)
                .ok()
                .flatten()
                .map(|f| json!(f)),
            "NUMERIC" => row
                .try_get::<Option<rust_decimal::Decimal>, _>(name)
                .ok()
                .flatten()
                .and_then(|d| {
                    use std::str::FromStr;
                    f64::from_str(&d.to_string()).ok()
                })
                .map(|f| json!(f)),
            "BOOL" => row
                .try_get::<Option<bool>, _>(name)
                .ok()
                .flatten()
                .map(|b| json!(b)),
            "UUID" => row
                .try_get::<Option<uuid::Uuid>, _>(name)
                .ok()
                .flatten()
                .map(|u| json!(u.to_string())),
            "JSON" | "JSONB" => row.try_get::<Option<JsonValue>, _>(name).ok().flatten(),
            "TIMESTAMPTZ" => row
                .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name)
                .ok()
                .flatten()
                .map(|dt| json!(dt.to_rfc3339())),
            "TIMESTAMP" => row
                .try_get::<Option<chrono::NaiveDateTime>, _>(name)
                .ok()
                .flatten()
                .map(|dt| json!(dt.to_string())),
            "DATE" => row
                .try_get::<Option<chrono::NaiveDate>, _>(name)
                .ok()
                .flatten()
                .map(|d| json!(d.to_string())),
            _ => row
                .try_get::<Option<String>, _>(name)
                .ok()
                .flatten()
                .map(|s| json!(s)),
        };

        map.insert(name.to_string(), value.unwrap_or(JsonValue::Null));
    }

    JsonValue::Object(map)
}

/// Strip leading whitespace and SQL comments from a statement.
#[must_use]
pub fn strip_leading_comments(sql: &str) -> &str {
    let mut rest = sql.trim_start();
    loop {
        if let Some(stripped) = rest.strip_prefix("--") {
            rest = stripped
                .split_once('\n')
                .map(|(_, tail)| tail)
                .unwrap_or("")
                .trim_start();
        } else if let Some(stripped) = rest.strip_prefix("/*") {
            rest = stripped
                .split_once("*/")
                .map(|(_, tail)| tail)
                .unwrap_or("")
                .trim_start();
        } else {
            return rest;
        }
    }
}

/// True when the statement mutates data or schema.
#[must_use]
pub fn is_write_statement(sql: &str) -> bool {
    let head = strip_leading_comments(sql).to_uppercase();
    ["INSERT", "UPDATE", "DELETE", "ALTER", "DROP", "CREATE", "TRUNCATE", "MERGE", "RENAME"]
        .iter()
        .any(|op| head.starts_with(op))
}

/// True when the statement changes the schema and invalidates the cached
/// schema context.
///
/// A statement is schema-changing iff it begins (after whitespace and
/// comments) with one of: CREATE/DROP TABLE|INDEX|VIEW|SCHEMA|SEQUENCE,
/// ALTER TABLE, TRUNCATE TABLE, RENAME.
#[must_use]
pub fn is_ddl_statement(sql: &str) -> bool {
    let head = strip_leading_comments(sql).to_uppercase();
    let head = head.split_whitespace().collect::<Vec<_>>().join(" ");

    const OBJECTS: [&str; 5] = ["TABLE", "INDEX", "VIEW", "SCHEMA", "SEQUENCE"];

    for verb in ["CREATE", "DROP"] {
        for object in OBJECTS {
            if head.starts_with(&format!("{verb} {object}"))
                || head.starts_with(&format!("{verb} UNIQUE {object}"))
            {
                return true;
            }
        }
    }

    head.starts_with("ALTER TABLE")
        || head.starts_with("TRUNCATE TABLE")
        || head.starts_with("RENAME")
}

/// True when the statement returns rows.
#[must_use]
pub fn returns_rows(sql: &str) -> bool {
    let head = strip_leading_comments(sql).to_uppercase();
    head.starts_with("SELECT") || head.starts_with("WITH") || head.contains("RETURNING")
}

/// Split an incoming blob on the multi-statement separator, dropping empty
/// segments.
#[must_use]
pub fn split_statements(blob: &str) -> Vec<String> {
    blob.split(MULTI_STATEMENT_SEPARATOR)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
