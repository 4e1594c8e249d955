//! connection.rs
//!
//! External-system connection configuration: which DynamoDB table/region to
//! tail, which Spanner project/instance/database to write into, and where
//! the source/target schema snapshot files live. Split out from
//! `appconfig.rs` the way the teacher splits `TimescaleDbConfig` out of its
//! own `AppConfig` — app-level knobs vs. external-system specifics.

use crate::error::{AppError, AppResult};
use serde::Deserialize;
use std::fs;

#[derive(Debug, Clone, Deserialize)]
pub struct DynamoSpannerConfig {
    pub dynamo: DynamoConfig,
    pub spanner: SpannerConfig,
    pub schema: SchemaConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DynamoConfig {
    pub table: String,
    pub region: String,
    /// Override for local/testing endpoints (DynamoDB Local, etc). Empty
    /// string means "use the SDK's default endpoint resolution".
    #[serde(default)]
    pub endpoint_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpannerConfig {
    pub project: String,
    pub instance: String,
    pub database: String,
    /// Identifies this migration run in the `cloud-spanner-migration-metadata`
    /// header (see spanner::mutation::migration_metadata_header).
    pub migration_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchemaConfig {
    pub source_schema_path: String,
    pub target_schema_path: String,
}

impl DynamoSpannerConfig {
    pub fn load() -> AppResult<Self> {
        let path = std::env::var("DYNAMOSTREAM_DB_CONFIG")
            .unwrap_or_else(|_| "config/dynamo_spanner.toml".to_string());

        let raw = fs::read_to_string(&path)?;
        let cfg: Self = toml::from_str(&raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.dynamo.table.trim().is_empty() {
            return Err(AppError::InvalidConfig(
                "dynamo_spanner.toml: dynamo.table must not be empty".into(),
            ));
        }
        if self.dynamo.region.trim().is_empty() {
            return Err(AppError::InvalidConfig(
                "dynamo_spanner.toml: dynamo.region must not be empty".into(),
            ));
        }

        if self.spanner.project.trim().is_empty() {
            return Err(AppError::InvalidConfig(
                "dynamo_spanner.toml: spanner.project must not be empty".into(),
            ));
        }
        if self.spanner.instance.trim().is_empty() {
            return Err(AppError::InvalidConfig(
                "dynamo_spanner.toml: spanner.instance must not be empty".into(),
            ));
        }
        if self.spanner.database.trim().is_empty() {
            return Err(AppError::InvalidConfig(
                "dynamo_spanner.toml: spanner.database must not be empty".into(),
            ));
        }
        if self.spanner.migration_id.trim().is_empty() {
            return Err(AppError::InvalidConfig(
                "dynamo_spanner.toml: spanner.migration_id must not be empty".into(),
            ));
        }

        if self.schema.source_schema_path.trim().is_empty() {
            return Err(AppError::InvalidConfig(
                "dynamo_spanner.toml: schema.source_schema_path must not be empty".into(),
            ));
        }
        if self.schema.target_schema_path.trim().is_empty() {
            return Err(AppError::InvalidConfig(
                "dynamo_spanner.toml: schema.target_schema_path must not be empty".into(),
            ));
        }

        Ok(())
    }

    pub fn spanner_database_path(&self) -> String {
        format!(
            "projects/{}/instances/{}/databases/{}",
            self.spanner.project, self.spanner.instance, self.spanner.database
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DynamoSpannerConfig {
        DynamoSpannerConfig {
            dynamo: DynamoConfig {
                table: "Orders".into(),
                region: "us-east-1".into(),
                endpoint_url: String::new(),
            },
            spanner: SpannerConfig {
                project: "my-project".into(),
                instance: "my-instance".into(),
                database: "my-database".into(),
                migration_id: "run-1".into(),
            },
            schema: SchemaConfig {
                source_schema_path: "schema/source.json".into(),
                target_schema_path: "schema/target.json".into(),
            },
        }
    }

    #[test]
    fn sample_config_validates() {
        sample().validate().expect("sample config should be valid");
    }

    #[test]
    fn rejects_empty_table() {
        let mut cfg = sample();
        cfg.dynamo.table = String::new();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn spanner_database_path_is_formatted() {
        let cfg = sample();
        assert_eq!(
            cfg.spanner_database_path(),
            "projects/my-project/instances/my-instance/databases/my-database"
        );
    }
}
