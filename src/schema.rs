//! schema.rs
//!
//! Read-only schema snapshots consumed by the pipeline. Schema inference
//! itself is out of scope (spec.md §1); in production these come from
//! HarbourBridge's session file, so here they are loaded once at startup
//! through a small `SchemaSource` trait with a JSON-file-backed
//! implementation, the way `connection::DynamoSpannerConfig` loads its own
//! TOML file independently of `appconfig::AppConfig`.

use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::fs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum KeyType {
    Hash,
    Range,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PkColumn {
    pub name: String,
    pub key_type: KeyType,
}

/// Source-table schema: DynamoDB column names plus the declared primary
/// key, in the hash-then-range order the table was created with.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceSchema {
    pub table: String,
    pub columns: Vec<String>,
    pub primary_key: Vec<PkColumn>,
}

impl SourceSchema {
    /// The declared first primary-key column (HASH key, or the lone key if
    /// the table has no range key). spec.md §4.5's REMOVE-mutation ordering
    /// rule pivots on this.
    pub fn first_key_column(&self) -> Option<&str> {
        self.primary_key.first().map(|c| c.name.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpannerType {
    Bool,
    Int64,
    Float64,
    String,
    Bytes,
    Timestamp,
    Numeric,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetColumn {
    pub name: String,
    pub spanner_type: SpannerType,
    /// True if this column is part of the Spanner table's primary key.
    #[serde(default)]
    pub is_primary_key: bool,
}

/// Target-table schema: Spanner column names, types, and declared column
/// order (the order mutations must present values in).
#[derive(Debug, Clone, Deserialize)]
pub struct TargetSchema {
    pub table: String,
    pub columns: Vec<TargetColumn>,
    /// Maps a source column name to the target column name it feeds.
    pub source_to_target_column: std::collections::HashMap<String, String>,
}

impl TargetSchema {
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

/// A pair of schema snapshots for one source table, loaded once at pipeline
/// start and never mutated during streaming.
#[derive(Debug, Clone)]
pub struct TableSchemas {
    pub source: SourceSchema,
    pub target: TargetSchema,
}

#[async_trait]
pub trait SchemaSource: Send + Sync {
    async fn load(&self, table: &str) -> AppResult<TableSchemas>;
}

/// File-backed implementation: reads `{source,target}_schema_path}` as JSON
/// maps keyed by source table name. Standalone-operation substitute for
/// HarbourBridge's session-file-backed schema catalog.
pub struct FileSchemaSource {
    source_path: String,
    target_path: String,
}

impl FileSchemaSource {
    pub fn new(source_path: impl Into<String>, target_path: impl Into<String>) -> Self {
        Self {
            source_path: source_path.into(),
            target_path: target_path.into(),
        }
    }
}

#[async_trait]
impl SchemaSource for FileSchemaSource {
    async fn load(&self, table: &str) -> AppResult<TableSchemas> {
        let source_raw = fs::read_to_string(&self.source_path)?;
        let target_raw = fs::read_to_string(&self.target_path)?;

        let sources: std::collections::HashMap<String, SourceSchema> =
            serde_json::from_str(&source_raw)?;
        let targets: std::collections::HashMap<String, TargetSchema> =
            serde_json::from_str(&target_raw)?;

        let source = sources.get(table).cloned().ok_or_else(|| {
            AppError::SchemaMismatch {
                table: table.to_string(),
                details: "no source schema entry for table".into(),
            }
        })?;
        let target = targets.get(table).cloned().ok_or_else(|| {
            AppError::SchemaMismatch {
                table: table.to_string(),
                details: "no target schema entry for table".into(),
            }
        })?;

        Ok(TableSchemas { source, target })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_key_column_prefers_hash_over_range_order() {
        let schema = SourceSchema {
            table: "Orders".into(),
            columns: vec!["pk".into(), "sk".into(), "name".into()],
            primary_key: vec![
                PkColumn {
                    name: "pk".into(),
                    key_type: KeyType::Hash,
                },
                PkColumn {
                    name: "sk".into(),
                    key_type: KeyType::Range,
                },
            ],
        };
        assert_eq!(schema.first_key_column(), Some("pk"));
    }

    #[test]
    fn column_index_finds_target_column() {
        let target = TargetSchema {
            table: "Orders".into(),
            columns: vec![
                TargetColumn {
                    name: "pk".into(),
                    spanner_type: SpannerType::String,
                    is_primary_key: true,
                },
                TargetColumn {
                    name: "name".into(),
                    spanner_type: SpannerType::String,
                    is_primary_key: false,
                },
            ],
            source_to_target_column: std::collections::HashMap::new(),
        };
        assert_eq!(target.column_index("name"), Some(1));
        assert_eq!(target.column_index("missing"), None);
    }
}
