//! pipeline/worker.rs — C4 Shard Worker
//!
//! Per-shard iterator management, record fetch, trimmed-data recovery, and
//! parent-wait gating (spec.md §4.4). Structurally the closest analogue to
//! the teacher's `WsClient::connect_loop` (`ws_client.rs`): an outer
//! "acquire a cursor" loop, an inner "consume until the cursor invalidates"
//! loop, and a close-reason-driven decision to loop again or return.

use crate::appconfig::{RetryConfig, TimingsConfig};
use crate::dynamo::client::DynamoStreamsClient;
use crate::dynamo::errors::is_trimmed_data_access;
use crate::dynamo::shard::{Shard, ShardIteratorRequest, StreamIdentifier};
use crate::error::AppResult;
use crate::pipeline::state::SharedStreamState;
use crate::pipeline::TableContext;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// `ProcessShard(shard)`. Always returns `Ok(())`: every failure path is a
/// recorded anomaly plus a loop break, never a propagated error, per
/// spec.md §7's "per-record and per-shard errors never bubble out" policy.
pub async fn process_shard(
    state: Arc<SharedStreamState>,
    dynamo: Arc<dyn DynamoStreamsClient>,
    stream_id: StreamIdentifier,
    shard: Shard,
    table: TableContext,
    timings: TimingsConfig,
    retry: RetryConfig,
) -> AppResult<()> {
    state.metrics.shard_started();

    if let Some(parent_id) = &shard.parent_shard_id {
        while !state.shard_done(parent_id) {
            tokio::time::sleep(Duration::from_secs(timings.parent_gate_poll_secs)).await;
        }
    }

    state.set_shard_status(&shard.shard_id, false);
    info!(shard_id = %shard.shard_id, "shard worker starting");

    let mut last_seq: Option<String> = None;
    let mut pass_after_user_exit = false;
    let mut trim_retry = 0u32;

    'shard_loop: loop {
        let iterator = 'acquire: loop {
            let request = match &last_seq {
                None => ShardIteratorRequest::TrimHorizon,
                Some(seq) => ShardIteratorRequest::AfterSequenceNumber(seq.clone()),
            };
            match dynamo
                .get_shard_iterator(&stream_id, &shard.shard_id, request)
                .await
            {
                Ok(it) => break 'acquire it,
                Err(e) if is_trimmed_data_access(&e) => {
                    last_seq = None;
                    state.metrics.inc_trim_reset();
                    warn!(shard_id = %shard.shard_id, "trimmed data on get_shard_iterator, resetting to trim horizon");
                    continue 'acquire;
                }
                Err(e) => {
                    state.unexpected(format!(
                        "{}: get_shard_iterator failed: {e}",
                        shard.shard_id
                    ));
                    break 'shard_loop;
                }
            }
        };

        let page = match dynamo.get_records(&iterator).await {
            Ok(page) => {
                trim_retry = 0;
                page
            }
            Err(e) if is_trimmed_data_access(&e) => {
                if trim_retry < retry.trim_retry_max {
                    trim_retry += 1;
                    last_seq = None;
                    state.metrics.inc_trim_reset();
                    warn!(shard_id = %shard.shard_id, trim_retry, "trimmed data on get_records, retrying from trim horizon");
                    continue 'shard_loop;
                } else {
                    state.unexpected(format!(
                        "{}: trimmed-data retries exhausted",
                        shard.shard_id
                    ));
                    break 'shard_loop;
                }
            }
            Err(e) => {
                state.unexpected(format!("{}: get_records failed: {e}", shard.shard_id));
                break 'shard_loop;
            }
        };

        let batch_was_empty = page.records.is_empty();
        let next_iterator = page.next_shard_iterator;

        for record in page.records {
            let seq = record.sequence_number.clone();
            crate::pipeline::convert::process_record(&state, record, &table, &retry).await;
            last_seq = Some(seq);
        }

        if next_iterator.is_none() || pass_after_user_exit {
            break 'shard_loop;
        }

        if state.user_exit() {
            pass_after_user_exit = true;
            continue 'shard_loop;
        }

        if batch_was_empty {
            tokio::time::sleep(Duration::from_secs(timings.empty_batch_sleep_secs)).await;
        }
    }

    state.set_shard_status(&shard.shard_id, true);
    state.metrics.shard_finished();
    info!(shard_id = %shard.shard_id, "shard worker exiting");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamo::client::{DescribeStreamPage, GetRecordsPage, StreamViewType, TableStreamInfo};
    use crate::dynamo::shard::{AttributeMap, EventKind, StreamRecord};
    use crate::metrics::PipelineMetrics;
    use crate::schema::{KeyType, PkColumn, SourceSchema, SpannerType, TableSchemas, TargetColumn, TargetSchema};
    use crate::spanner::client::SpannerWriter;
    use crate::spanner::mutation::Mutation;
    use async_trait::async_trait;
    use aws_sdk_dynamodbstreams::types::AttributeValue;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct RecordingWriter {
        applied: Mutex<Vec<Mutation>>,
    }

    #[async_trait]
    impl SpannerWriter for RecordingWriter {
        async fn write(&self, mutation: Mutation) -> AppResult<()> {
            self.applied.lock().unwrap().push(mutation);
            Ok(())
        }
    }

    struct ScriptedClient {
        iterator_errors: Mutex<Vec<bool>>, // true = trimmed-data error
        records_errors: Mutex<Vec<bool>>,
        batches: Mutex<Vec<GetRecordsPage>>,
    }

    #[derive(Debug)]
    struct TrimmedError;
    impl std::fmt::Display for TrimmedError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "operation error GetRecords: TrimmedDataAccessException")
        }
    }
    impl std::error::Error for TrimmedError {}

    #[async_trait]
    impl DynamoStreamsClient for ScriptedClient {
        async fn describe_table_stream(&self, _table: &str) -> AppResult<Option<TableStreamInfo>> {
            Ok(Some(TableStreamInfo {
                stream_id: StreamIdentifier("s".into()),
                view_type: StreamViewType::NewAndOldImages,
            }))
        }

        async fn enable_stream(&self, _table: &str) -> AppResult<StreamIdentifier> {
            Ok(StreamIdentifier("s".into()))
        }

        async fn describe_stream(
            &self,
            _stream_id: &StreamIdentifier,
            _exclusive_start_shard_id: Option<&str>,
        ) -> AppResult<DescribeStreamPage> {
            Ok(DescribeStreamPage::default())
        }

        async fn get_shard_iterator(
            &self,
            _stream_id: &StreamIdentifier,
            _shard_id: &str,
            _request: ShardIteratorRequest,
        ) -> AppResult<String> {
            let mut errs = self.iterator_errors.lock().unwrap();
            if !errs.is_empty() && errs.remove(0) {
                return Err(crate::error::AppError::Internal(TrimmedError.to_string()));
            }
            Ok("iter".into())
        }

        async fn get_records(&self, _iterator: &str) -> AppResult<GetRecordsPage> {
            let mut errs = self.records_errors.lock().unwrap();
            if !errs.is_empty() && errs.remove(0) {
                return Err(crate::error::AppError::Internal(TrimmedError.to_string()));
            }
            Ok(self.batches.lock().unwrap().remove(0))
        }
    }

    fn table_context() -> TableContext {
        let source = SourceSchema {
            table: "Orders".into(),
            columns: vec!["pk".into(), "name".into()],
            primary_key: vec![PkColumn {
                name: "pk".into(),
                key_type: KeyType::Hash,
            }],
        };
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
            source_to_target_column: HashMap::from([
                ("pk".to_string(), "pk".to_string()),
                ("name".to_string(), "name".to_string()),
            ]),
        };
        TableContext {
            schemas: TableSchemas { source, target },
        }
    }

    fn insert_record(seq: &str, pk: &str) -> StreamRecord {
        let mut image: AttributeMap = HashMap::new();
        image.insert("pk".to_string(), AttributeValue::S(pk.to_string()));
        image.insert("name".to_string(), AttributeValue::S("a".to_string()));
        StreamRecord {
            event_kind: EventKind::Insert,
            sequence_number: seq.to_string(),
            keys: HashMap::new(),
            new_image: Some(image),
            old_image: None,
        }
    }

    #[tokio::test]
    async fn single_shard_closed_stream_applies_records_in_order() {
        let state = Arc::new(SharedStreamState::new(PipelineMetrics::new().unwrap()));
        let writer = Arc::new(RecordingWriter {
            applied: Mutex::new(Vec::new()),
        });
        state.set_writer(writer.clone());

        let client = Arc::new(ScriptedClient {
            iterator_errors: Mutex::new(vec![]),
            records_errors: Mutex::new(vec![]),
            batches: Mutex::new(vec![GetRecordsPage {
                records: vec![insert_record("1", "1"), insert_record("2", "2")],
                next_shard_iterator: None,
            }]),
        });

        process_shard(
            state.clone(),
            client,
            StreamIdentifier("s".into()),
            Shard {
                shard_id: "shard-1".into(),
                parent_shard_id: None,
            },
            table_context(),
            TimingsConfig::default(),
            RetryConfig::default(),
        )
        .await
        .unwrap();

        assert!(state.shard_done("shard-1"));
        assert_eq!(writer.applied.lock().unwrap().len(), 2);
        assert_eq!(state.records_processed(), 2);
    }

    #[tokio::test]
    async fn trimmed_data_on_get_records_exhausts_retry_budget_and_records_anomaly() {
        let state = Arc::new(SharedStreamState::new(PipelineMetrics::new().unwrap()));
        let client = Arc::new(ScriptedClient {
            iterator_errors: Mutex::new(vec![]),
            records_errors: Mutex::new(vec![true, true, true, true, true, true]),
            batches: Mutex::new(vec![]),
        });

        let mut retry = RetryConfig::default();
        retry.trim_retry_max = 5;

        process_shard(
            state.clone(),
            client,
            StreamIdentifier("s".into()),
            Shard {
                shard_id: "shard-1".into(),
                parent_shard_id: None,
            },
            table_context(),
            TimingsConfig::default(),
            retry,
        )
        .await
        .unwrap();

        assert!(state.shard_done("shard-1"));
        assert_eq!(
            state
                .unexpecteds()
                .get("shard-1: trimmed-data retries exhausted"),
            Some(&1)
        );
    }
}
