//! Schema analysis for the target table.
//!
//! Introspects one table through information_schema-style queries, probes
//! column values (all distinct values for enum-like columns, min/max/avg for
//! numeric ones), and renders the LLM-ready context blob every prompt embeds.
//!
//! The analyzer is process-scoped and read-mostly; the version counter
//! advances whenever DDL forces a refresh, invalidating dependent caches.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::database::Database;
use crate::error::{ErrorKind, QueryError};

/// Seam between the workflow and schema analysis, mockable in tests.
#[async_trait]
pub trait SchemaProvider: Send + Sync {
    /// Current schema context, built lazily on first use.
    async fn context(&self) -> Result<Arc<SchemaContext>, QueryError>;

    /// Current schema version.
    fn version(&self) -> u64;
}

/// One column of the analyzed table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,
    /// Declared data type.
    pub data_type: String,
    /// Whether NULLs are allowed.
    pub nullable: bool,
    /// Column default expression, if any.
    pub default: Option<String>,
    /// Member of the primary key.
    pub primary_key: bool,
    /// `schema.table(column)` this column references, if a foreign key.
    pub references: Option<String>,
}

impl ColumnInfo {
    /// True for numeric SQL types.
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        let upper = self.data_type.to_uppercase();
        ["INT", "SERIAL", "FLOAT", "DOUBLE", "REAL", "NUMERIC", "DECIMAL", "MONEY"]
            .iter()
            .any(|t| upper.contains(t))
    }

    /// True for date/timestamp types.
    #[must_use]
    pub fn is_temporal(&self) -> bool {
        let upper = self.data_type.to_uppercase();
        upper.contains("DATE") || upper.contains("TIMESTAMP") || upper.contains("TIME")
    }
}

/// Value statistics for one column.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnProbe {
    /// Number of distinct non-null values.
    pub distinct_count: i64,
    /// All distinct values, present only for enum-like columns.
    pub enum_values: Vec<String>,
    /// Minimum, for numeric/temporal columns.
    pub min: Option<f64>,
    /// Maximum, for numeric/temporal columns.
    pub max: Option<f64>,
    /// Average, for numeric columns.
    pub avg: Option<f64>,
}

impl ColumnProbe {
    /// Enum-like means every distinct value is known and listed.
    #[must_use]
    pub fn is_enum_like(&self) -> bool {
        !self.enum_values.is_empty()
    }
}

/// An index on the analyzed table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexInfo {
    /// Index name.
    pub name: String,
    /// Full index definition.
    pub definition: String,
}

/// Derived schema artifact for the analyzed table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaContext {
    /// Schema name.
    pub schema: String,
    /// Table name.
    pub table: String,
    /// Ordered columns.
    pub columns: Vec<ColumnInfo>,
    /// Indexes.
    pub indexes: Vec<IndexInfo>,
    /// Total row count at analysis time.
    pub row_count: i64,
    /// Human-readable table size.
    pub table_size: String,
    /// Representative sample rows (at most 10).
    pub sample_rows: Vec<JsonValue>,
    /// Per-column probes, keyed by column name.
    pub probes: BTreeMap<String, ColumnProbe>,
    /// Analysis timestamp.
    pub analyzed_at: chrono::DateTime<chrono::Utc>,
    /// Schema version this context was built at.
    pub version: u64,
}

impl SchemaContext {
    /// Schema-qualified, quoted table reference for generated SQL.
    #[must_use]
    pub fn qualified_table(&self) -> String {
        format!("{}.\"{}\"", self.schema, self.table)
    }

    /// Names of all columns.
    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Names of numeric columns.
    #[must_use]
    pub fn numeric_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.is_numeric())
            .map(|c| c.name.clone())
            .collect()
    }

    /// Whether the named column is numeric.
    #[must_use]
    pub fn is_numeric_column(&self, name: &str) -> bool {
        self.columns
            .iter()
            .any(|c| c.name == name && c.is_numeric())
    }

    /// Whether the named column exists.
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    /// Render the LLM-ready context blob.
    ///
    /// The section layout is load-bearing: prompts and the column-value
    /// extraction in generation both rely on it.
    #[must_use]
    pub fn llm_context(&self) -> String {
        let mut out = Vec::new();

        out.push(format!(
            "DATABASE TABLE ANALYSIS: {}.{}",
            self.schema, self.table
        ));
        out.push("=".repeat(80));
        out.push(String::new());

        out.push("BASIC INFORMATION:".to_string());
        out.push(format!("- Table: {}.{}", self.schema, self.table));
        out.push(format!("- Analysis Date: {}", self.analyzed_at.to_rfc3339()));
        out.push(String::new());

        out.push("TABLE STRUCTURE:".to_string());
        out.push(format!("- Total Columns: {}", self.columns.len()));
        let mut types: Vec<&str> = self.columns.iter().map(|c| c.data_type.as_str()).collect();
        types.sort_unstable();
        types.dedup();
        out.push(format!("- Data Types: {types:?}"));
        out.push(String::new());

        out.push("COLUMNS:".to_string());
        for col in &self.columns {
            let mut line = format!(
                "  - {}: {} (Nullable: {})",
                col.name, col.data_type, col.nullable
            );
            if col.primary_key {
                line.push_str(" [pk]");
            }
            if let Some(ref target) = col.references {
                line.push_str(&format!(" [fk->{target}]"));
            }
            out.push(line);
        }
        out.push(String::new());

        let enum_probes: Vec<(&String, &ColumnProbe)> = self
            .probes
            .iter()
            .filter(|(_, p)| p.is_enum_like())
            .collect();
        if !enum_probes.is_empty() {
            out.push("ENUM-LIKE COLUMNS (Low Cardinality):".to_string());
            for (name, probe) in &enum_probes {
                out.push(format!(
                    "  - {}: {} unique values",
                    name,
                    probe.enum_values.len()
                ));
                let values_str = if probe.enum_values.len() <= 10 {
                    probe
                        .enum_values
                        .iter()
                        .map(|v| format!("'{v}'"))
                        .collect::<Vec<_>>()
                        .join(", ")
                } else {
                    let shown = probe.enum_values[..8]
                        .iter()
                        .map(|v| format!("'{v}'"))
                        .collect::<Vec<_>>()
                        .join(", ");
                    format!("{shown}, ... (+{} more)", probe.enum_values.len() - 8)
                };
                out.push(format!("    Values: {values_str}"));
            }
            out.push(String::new());
        }

        out.push("OTHER COLUMN STATISTICS:".to_string());
        for (name, probe) in &self.probes {
            if probe.is_enum_like() {
                continue;
            }
            out.push(format!("  - {}: {} distinct values", name, probe.distinct_count));
            if let (Some(min), Some(max)) = (probe.min, probe.max) {
                let avg = probe
                    .avg
                    .map(|a| format!(", Average: {a:.2}"))
                    .unwrap_or_default();
                out.push(format!("    Range: {min} to {max}{avg}"));
            }
        }
        out.push(String::new());

        out.push("DATA ANALYSIS:".to_string());
        out.push(format!("- Total Rows: {}", self.row_count));
        out.push(format!("- Table Size: {}", self.table_size));
        out.push(String::new());

        out.push("CONSTRAINTS AND INDEXES:".to_string());
        let pk: Vec<&str> = self
            .columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect();
        out.push(format!(
            "- Primary Key: {}",
            if pk.is_empty() { "None".to_string() } else { pk.join(", ") }
        ));
        out.push(format!("- Indexes: {}", self.indexes.len()));
        for idx in &self.indexes {
            out.push(format!("  - {}", idx.name));
        }
        out.push(String::new());

        out.push("RELATIONSHIPS:".to_string());
        let fks: Vec<String> = self
            .columns
            .iter()
            .filter_map(|c| {
                c.references
                    .as_ref()
                    .map(|t| format!("  - {} -> {}", c.name, t))
            })
            .collect();
        if fks.is_empty() {
            out.push("- None".to_string());
        } else {
            out.extend(fks);
        }
        out.push(String::new());

        if !self.sample_rows.is_empty() {
            out.push("SAMPLE DATA:".to_string());
            for (i, row) in self.sample_rows.iter().take(10).enumerate() {
                out.push(format!("  Row {}: {}", i + 1, row));
            }
            out.push(String::new());
        }

        out.push("RECOMMENDATIONS:".to_string());
        if !enum_probes.is_empty() {
            out.push(
                "  - When filtering by enum-like columns, use the exact values listed above."
                    .to_string(),
            );
        }
        if pk.is_empty() {
            out.push("  - Table has no primary key; avoid assuming row identity.".to_string());
        }
        out.push("  - Quote the table name in every query to preserve its case.".to_string());

        out.join("\n")
    }
}

/// Process-scoped schema analyzer.
pub struct SchemaAnalyzer {
    db: Database,
    schema: String,
    table: String,
    enum_threshold: i64,
    version: AtomicU64,
    current: RwLock<Option<Arc<SchemaContext>>>,
}

impl SchemaAnalyzer {
    /// Create an analyzer for one table.
    #[must_use]
    pub fn new(db: Database, schema: impl Into<String>, table: impl Into<String>, enum_threshold: i64) -> Self {
        Self {
            db,
            schema: schema.into(),
            table: table.into(),
            enum_threshold,
            version: AtomicU64::new(1),
            current: RwLock::new(None),
        }
    }

    /// Current schema version.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Bump the version after detected DDL. Returns the new value.
    pub fn bump_version(&self) -> u64 {
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Cached context, if one was built.
    #[must_use]
    pub fn current(&self) -> Option<Arc<SchemaContext>> {
        self.current.read().clone()
    }

    /// Cached context, building it on first use.
    pub async fn context(&self) -> Result<Arc<SchemaContext>, QueryError> {
        if let Some(ctx) = self.current() {
            return Ok(ctx);
        }
        self.analyze().await
    }

    /// Perform a full analysis and replace the cached context.
    pub async fn analyze(&self) -> Result<Arc<SchemaContext>, QueryError> {
        tracing::info!(schema = %self.schema, table = %self.table, "analyzing table");

        let columns = self.introspect_columns().await?;
        if columns.is_empty() {
            return Err(QueryError::new(
                ErrorKind::SchemaRefreshFailed,
                format!("table {}.{} does not exist", self.schema, self.table),
            ));
        }

        let qualified = format!("{}.\"{}\"", self.schema, self.table);

        let row_count = self.scalar_i64(&format!("SELECT COUNT(*) FROM {qualified}")).await?;

        let table_size = self
            .scalar_string(&format!(
                "SELECT pg_size_pretty(pg_total_relation_size('{qualified}'))"
            ))
            .await
            .unwrap_or_else(|_| "Unknown".to_string());

        let (_, sample_rows) = self
            .db
            .fetch_rows(&format!("SELECT * FROM {qualified} LIMIT 10"))
            .await?;

        let indexes = self.introspect_indexes().await.unwrap_or_default();

        let mut probes = BTreeMap::new();
        for col in &columns {
            match self.probe_column(col, &qualified).await {
                Ok(probe) => {
                    probes.insert(col.name.clone(), probe);
                }
                Err(e) => {
                    tracing::warn!(column = %col.name, error = %e, "column probe failed");
                }
            }
        }

        let ctx = Arc::new(SchemaContext {
            schema: self.schema.clone(),
            table: self.table.clone(),
            columns,
            indexes,
            row_count,
            table_size,
            sample_rows,
            probes,
            analyzed_at: chrono::Utc::now(),
            version: self.version(),
        });

        *self.current.write() = Some(ctx.clone());
        tracing::info!(
            columns = ctx.columns.len(),
            rows = ctx.row_count,
            version = ctx.version,
            "table analysis complete"
        );
        Ok(ctx)
    }

    /// Incremental refresh: re-introspect structure and row count, keeping
    /// existing probes for columns that survived. Falls back to a full
    /// analysis when the incremental pass fails.
    pub async fn refresh(&self, hint: Option<&str>) -> Result<Arc<SchemaContext>, QueryError> {
        tracing::info!(hint = hint.unwrap_or("none"), "refreshing schema context");

        match self.incremental_refresh().await {
            Ok(ctx) => Ok(ctx),
            Err(e) => {
                tracing::warn!(error = %e, "incremental refresh failed, running full analysis");
                self.analyze().await.map_err(|full| {
                    QueryError::new(
                        ErrorKind::SchemaRefreshFailed,
                        format!("incremental refresh failed ({e}); full re-analysis failed ({full})"),
                    )
                })
            }
        }
    }

    async fn incremental_refresh(&self) -> Result<Arc<SchemaContext>, QueryError> {
        let columns = self.introspect_columns().await?;
        if columns.is_empty() {
            return Err(QueryError::new(
                ErrorKind::SchemaRefreshFailed,
                "table disappeared during refresh",
            ));
        }

        let qualified = format!("{}.\"{}\"", self.schema, self.table);
        let row_count = self.scalar_i64(&format!("SELECT COUNT(*) FROM {qualified}")).await?;

        let previous = self.current();
        let mut probes = BTreeMap::new();
        if let Some(prev) = &previous {
            for col in &columns {
                if let Some(probe) = prev.probes.get(&col.name) {
                    probes.insert(col.name.clone(), probe.clone());
                }
            }
        }

        let ctx = Arc::new(SchemaContext {
            schema: self.schema.clone(),
            table: self.table.clone(),
            columns,
            indexes: previous.as_ref().map(|p| p.indexes.clone()).unwrap_or_default(),
            row_count,
            table_size: previous
                .as_ref()
                .map(|p| p.table_size.clone())
                .unwrap_or_else(|| "Unknown".to_string()),
            sample_rows: previous
                .as_ref()
                .map(|p| p.sample_rows.clone())
                .unwrap_or_default(),
            probes,
            analyzed_at: chrono::Utc::now(),
            version: self.version(),
        });

        *self.current.write() = Some(ctx.clone());
        Ok(ctx)
    }

    async fn introspect_columns(&self) -> Result<Vec<ColumnInfo>, QueryError> {
        let sql = format!(
            "SELECT column_name, data_type, is_nullable, column_default \
             FROM information_schema.columns \
             WHERE table_schema = '{}' AND table_name = '{}' \
             ORDER BY ordinal_position",
            self.schema, self.table
        );
        let (_, rows) = self.db.fetch_rows(&sql).await?;

        let pk_columns = self.introspect_primary_key().await.unwrap_or_default();
        let fk_map = self.introspect_foreign_keys().await.unwrap_or_default();

        let columns = rows
            .iter()
            .filter_map(|row| {
                let name = row["column_name"].as_str()?.to_string();
                Some(ColumnInfo {
                    data_type: row["data_type"].as_str().unwrap_or("unknown").to_string(),
                    nullable: row["is_nullable"].as_str() == Some("YES"),
                    default: row["column_default"].as_str().map(String::from),
                    primary_key: pk_columns.contains(&name),
                    references: fk_map.get(&name).cloned(),
                    name,
                })
            })
            .collect();

        Ok(columns)
    }

    async fn introspect_primary_key(&self) -> Result<Vec<String>, QueryError> {
        let sql = format!(
            "SELECT kcu.column_name \
             FROM information_schema.table_constraints tc \
             JOIN information_schema.key_column_usage kcu \
               ON tc.constraint_name = kcu.constraint_name \
              AND tc.table_schema = kcu.table_schema \
             WHERE tc.constraint_type = 'PRIMARY KEY' \
               AND tc.table_schema = '{}' AND tc.table_name = '{}'",
            self.schema, self.table
        );
        let (_, rows) = self.db.fetch_rows(&sql).await?;
        Ok(rows
            .iter()
            .filter_map(|r| r["column_name"].as_str().map(String::from))
            .collect())
    }

    async fn introspect_foreign_keys(&self) -> Result<BTreeMap<String, String>, QueryError> {
        let sql = format!(
            "SELECT kcu.column_name, \
                    ccu.table_schema AS ref_schema, \
                    ccu.table_name AS ref_table, \
                    ccu.column_name AS ref_column \
             FROM information_schema.table_constraints tc \
             JOIN information_schema.key_column_usage kcu \
               ON tc.constraint_name = kcu.constraint_name \
              AND tc.table_schema = kcu.table_schema \
             JOIN information_schema.constraint_column_usage ccu \
               ON tc.constraint_name = ccu.constraint_name \
              AND tc.table_schema = ccu.table_schema \
             WHERE tc.constraint_type = 'FOREIGN KEY' \
               AND tc.table_schema = '{}' AND tc.table_name = '{}'",
            self.schema, self.table
        );
        let (_, rows) = self.db.fetch_rows(&sql).await?;
        let mut map = BTreeMap::new();
        for row in &rows {
            if let (Some(col), Some(schema), Some(table), Some(ref_col)) = (
                row["column_name"].as_str(),
                row["ref_schema"].as_str(),
                row["ref_table"].as_str(),
                row["ref_column"].as_str(),
            ) {
                map.insert(col.to_string(), format!("{schema}.{table}({ref_col})"));
            }
        }
        Ok(map)
    }

    async fn introspect_indexes(&self) -> Result<Vec<IndexInfo>, QueryError> {
        let sql = format!(
            "SELECT indexname, indexdef FROM pg_indexes \
             WHERE schemaname = '{}' AND tablename = '{}'",
            self.schema, self.table
        );
        let (_, rows) = self.db.fetch_rows(&sql).await?;
        Ok(rows
            .iter()
            .filter_map(|r| {
                Some(IndexInfo {
                    name: r["indexname"].as_str()?.to_string(),
                    definition: r["indexdef"].as_str().unwrap_or("").to_string(),
                })
            })
            .collect())
    }

    async fn probe_column(
        &self,
        col: &ColumnInfo,
        qualified: &str,
    ) -> Result<ColumnProbe, QueryError> {
        let mut probe = ColumnProbe {
            distinct_count: self
                .scalar_i64(&format!(
                    "SELECT COUNT(DISTINCT \"{}\") FROM {qualified} WHERE \"{}\" IS NOT NULL",
                    col.name, col.name
                ))
                .await?,
            ..ColumnProbe::default()
        };

        if col.is_numeric() {
            let sql = format!(
                "SELECT MIN(\"{0}\")::float8 AS min_val, MAX(\"{0}\")::float8 AS max_val, \
                        AVG(\"{0}\")::float8 AS avg_val \
                 FROM {qualified} WHERE \"{0}\" IS NOT NULL",
                col.name
            );
            if let Ok((_, rows)) = self.db.fetch_rows(&sql).await {
                if let Some(row) = rows.first() {
                    probe.min = row["min_val"].as_f64();
                    probe.max = row["max_val"].as_f64();
                    probe.avg = row["avg_val"].as_f64();
                }
            }
        } else if probe.distinct_count > 0 && probe.distinct_count <= self.enum_threshold {
            let sql = format!(
                "SELECT DISTINCT \"{0}\"::text AS v FROM {qualified} \
                 WHERE \"{0}\" IS NOT NULL ORDER BY v",
                col.name
            );
            if let Ok((_, rows)) = self.db.fetch_rows(&sql).await {
                probe.enum_values = rows
                    .iter()
                    .filter_map(|r| r["v"].as_str().map(String::from))
                    .collect();
            }
        }

        Ok(probe)
    }

    async fn scalar_i64(&self, sql: &str) -> Result<i64, QueryError> {
        let (_, rows) = self.db.fetch_rows(sql).await?;
        Ok(rows
            .first()
            .and_then(|r| r.as_object())
            .and_then(|o| o.values().next())
            .and_then(JsonValue::as_i64)
            .unwrap_or(0))
    }

    async fn scalar_string(&self, sql: &str) -> Result<String, QueryError> {
        let (_, rows) = self.db.fetch_rows(sql).await?;
        rows.first()
            .and_then(|r| r.as_object())
            .and_then(|o| o.values().next())
            .and_then(JsonValue::as_str)
            .map(String::from)
            .ok_or_else(|| QueryError::execution("scalar query returned nothing"))
    }
}

#[async_trait]
impl SchemaProvider for SchemaAnalyzer {
    async fn context(&self) -> Result<Arc<SchemaContext>, QueryError> {
        SchemaAnalyzer::context(self).await
    }

    fn version(&self) -> u64 {
        SchemaAnalyzer::version(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_context() -> SchemaContext {
        let mut probes = BTreeMap::new();
        probes.insert(
            "country_of_work".to_string(),
            ColumnProbe {
                distinct_count: 3,
                enum_values: vec!["DEU".into(), "IND".into(), "USA".into()],
                ..ColumnProbe::default()
            },
        );
        probes.insert(
            "hourly_rate_in_usd".to_string(),
            ColumnProbe {
                distinct_count: 800,
                min: Some(12.0),
                max: Some(250.0),
                avg: Some(74.5),
                ..ColumnProbe::default()
            },
        );

        SchemaContext {
            schema: "public".to_string(),
            table: "IT_Professional_Services".to_string(),
            columns: vec![
                ColumnInfo {
                    name: "id".to_string(),
                    data_type: "integer".to_string(),
                    nullable: false,
                    default: None,
                    primary_key: true,
                    references: None,
                },
                ColumnInfo {
                    name: "country_of_work".to_string(),
                    data_type: "text".to_string(),
                    nullable: true,
                    default: None,
                    primary_key: false,
                    references: None,
                },
                ColumnInfo {
                    name: "hourly_rate_in_usd".to_string(),
                    data_type: "numeric".to_string(),
                    nullable: true,
                    default: None,
                    primary_key: false,
                    references: None,
                },
            ],
            indexes: vec![],
            row_count: 5000,
            table_size: "2 MB".to_string(),
            sample_rows: vec![serde_json::json!({"id": 1, "country_of_work": "IND"})],
            probes,
            analyzed_at: chrono::Utc::now(),
            version: 1,
        }
    }

    #[test]
    fn test_numeric_classification() {
        let ctx = sample_context();
        assert!(ctx.is_numeric_column("hourly_rate_in_usd"));
        assert!(ctx.is_numeric_column("id"));
        assert!(!ctx.is_numeric_column("country_of_work"));
        assert_eq!(ctx.numeric_columns(), vec!["id", "hourly_rate_in_usd"]);
    }

    #[test]
    fn test_qualified_table_is_quoted() {
        let ctx = sample_context();
        assert_eq!(ctx.qualified_table(), "public.\"IT_Professional_Services\"");
    }

    #[test]
    fn test_llm_context_sections() {
        let blob = sample_context().llm_context();
        for section in [
            "DATABASE TABLE ANALYSIS: public.IT_Professional_Services",
            "BASIC INFORMATION:",
            "TABLE STRUCTURE:",
            "COLUMNS:",
            "DATA ANALYSIS:",
            "CONSTRAINTS AND INDEXES:",
            "RELATIONSHIPS:",
            "SAMPLE DATA:",
            "RECOMMENDATIONS:",
        ] {
            assert!(blob.contains(section), "missing section: {section}");
        }
        assert!(blob.contains("'IND'"));
        assert!(blob.contains("- Total Rows: 5000"));
        assert!(blob.contains("[pk]"));
    }

    #[test]
    fn test_enum_probe_listing_truncates() {
        let probe = ColumnProbe {
            distinct_count: 20,
            enum_values: (0..20).map(|i| format!("v{i}")).collect(),
            ..ColumnProbe::default()
        };
        let mut ctx = sample_context();
        ctx.probes.insert("many".to_string(), probe);
        ctx.columns.push(ColumnInfo {
            name: "many".to_string(),
            data_type: "text".to_string(),
            nullable: true,
            default: None,
            primary_key: false,
            references: None,
        });
        let blob = ctx.llm_context();
        assert!(blob.contains("(+12 more)"));
    }
}
