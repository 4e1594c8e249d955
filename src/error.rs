use thiserror::Error;

/// Crate-wide result type.
pub type AppResult<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    // =========
    // Config / startup
    // =========
    #[error("Configuration file IO error: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("Failed to parse TOML config: {0}")]
    ConfigToml(#[from] toml::de::Error),

    #[error("Missing configuration field: {0}")]
    MissingConfig(&'static str),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // =========
    // Serialization / deserialization
    // =========
    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    // =========
    // DynamoDB / DynamoDB Streams
    // =========
    #[error("DynamoDB control-plane error: {0}")]
    DynamoDbControl(#[from] aws_sdk_dynamodb::Error),

    #[error("DynamoDB Streams error: {0}")]
    DynamoDbStreams(#[from] aws_sdk_dynamodbstreams::Error),

    /// C1: the table's stream exists but its view type cannot carry enough
    /// data to replicate writes (`KEYS_ONLY` or `OLD_IMAGE`).
    #[error("stream view type unsupported for table '{table}': {view_type}")]
    StreamViewTypeUnsupported { table: String, view_type: String },

    #[error("trimmed-data retries exhausted for shard '{shard_id}'")]
    TrimRetriesExhausted { shard_id: String },

    // =========
    // Cloud Spanner
    // =========
    #[error("Spanner error: {0}")]
    Spanner(#[from] tonic::Status),

    // =========
    // Metrics / Prometheus
    // =========
    #[error("Prometheus registry error: {0}")]
    Prometheus(#[from] prometheus::Error),

    // =========
    // Application-domain errors
    // =========

    /// C5: the source/target schema snapshots for a table don't agree
    /// (missing column mapping, key-column count mismatch, etc).
    #[error("schema mismatch for table '{table}': {details}")]
    SchemaMismatch { table: String, details: String },

    /// C2 invariant violation: a shard worker tried to write before the
    /// writer callback was installed.
    #[error("writer not configured")]
    WriterNotConfigured,

    #[error("stream not found: {0}")]
    StreamNotFound(String),

    #[error("failed to spawn task: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),

    #[error("shutdown requested")]
    Shutdown,

    #[error("internal error: {0}")]
    Internal(String),
}
