//! dynamo/provisioner.rs — C1 Stream Provisioner
//!
//! `EnsureStream(table)`: the source table must end up with a stream whose
//! view type can carry enough data to replicate writes. spec.md §4.1.

use crate::dynamo::client::DynamoStreamsClient;
use crate::dynamo::shard::StreamIdentifier;
use crate::error::{AppError, AppResult};
use tracing::info;

/// Ensures `table` has a stream with a sufficient view type, returning its
/// identifier.
///
/// 1. If a stream exists with `KEYS_ONLY`/`OLD_IMAGE` -> fatal: neither can
///    carry enough data for INSERT/MODIFY replication.
/// 2. If a stream exists with `NEW_IMAGE`/`NEW_AND_OLD_IMAGES` -> reuse it.
/// 3. If no stream exists -> enable one with `NEW_AND_OLD_IMAGES`.
pub async fn ensure_stream(
    dynamo: &dyn DynamoStreamsClient,
    table: &str,
) -> AppResult<StreamIdentifier> {
    match dynamo.describe_table_stream(table).await? {
        Some(info) if info.view_type.sufficient() => {
            info!(table, stream_id = %info.stream_id, view_type = info.view_type.as_str(), "reusing existing stream");
            Ok(info.stream_id)
        }
        Some(info) => Err(AppError::StreamViewTypeUnsupported {
            table: table.to_string(),
            view_type: info.view_type.as_str().to_string(),
        }),
        None => {
            let stream_id = dynamo.enable_stream(table).await?;
            info!(table, stream_id = %stream_id, "enabled NEW_AND_OLD_IMAGES stream");
            Ok(stream_id)
        }
    }
}
