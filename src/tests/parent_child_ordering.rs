// S2 (spec.md §8): a child shard's records must never be applied before
// its parent's, even when the child's worker starts first. Two
// `process_shard` tasks are spawned concurrently against a shared
// `SharedStreamState` and a `RecordingWriter`; the parent-gate poll in C4
// is the only thing allowed to enforce the ordering.

use crate::appconfig::{RetryConfig, TimingsConfig};
use crate::dynamo::client::{DescribeStreamPage, DynamoStreamsClient, GetRecordsPage, TableStreamInfo};
use crate::dynamo::shard::{AttributeMap, EventKind, Shard, ShardIteratorRequest, StreamIdentifier, StreamRecord};
use crate::error::AppResult;
use crate::metrics::PipelineMetrics;
use crate::pipeline::state::SharedStreamState;
use crate::pipeline::worker::process_shard;
use crate::pipeline::TableContext;
use crate::schema::{KeyType, PkColumn, SourceSchema, SpannerType, TableSchemas, TargetColumn, TargetSchema};
use crate::spanner::client::SpannerWriter;
use crate::spanner::mutation::Mutation;
use async_trait::async_trait;
use aws_sdk_dynamodbstreams::types::AttributeValue;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

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

/// One shard's records, handed out once then exhausted (`NextShardIterator`
/// nil on the second `GetRecords` call), matching a closed shard.
struct SingleBatchClient {
    batch: Mutex<Option<GetRecordsPage>>,
}

#[async_trait]
impl DynamoStreamsClient for SingleBatchClient {
    async fn describe_table_stream(&self, _table: &str) -> AppResult<Option<TableStreamInfo>> {
        unimplemented!("not exercised by this scenario")
    }

    async fn enable_stream(&self, _table: &str) -> AppResult<StreamIdentifier> {
        unimplemented!("not exercised by this scenario")
    }

    async fn describe_stream(
        &self,
        _stream_id: &StreamIdentifier,
        _exclusive_start_shard_id: Option<&str>,
    ) -> AppResult<DescribeStreamPage> {
        unimplemented!("not exercised by this scenario")
    }

    async fn get_shard_iterator(
        &self,
        _stream_id: &StreamIdentifier,
        _shard_id: &str,
        _request: ShardIteratorRequest,
    ) -> AppResult<String> {
        Ok("iter".into())
    }

    async fn get_records(&self, _iterator: &str) -> AppResult<GetRecordsPage> {
        match self.batch.lock().unwrap().take() {
            Some(page) => Ok(page),
            None => Ok(GetRecordsPage::default()),
        }
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

fn record(kind: EventKind, seq: &str, name: &str) -> StreamRecord {
    let mut image: AttributeMap = HashMap::new();
    image.insert("pk".to_string(), AttributeValue::S("1".to_string()));
    image.insert("name".to_string(), AttributeValue::S(name.to_string()));
    StreamRecord {
        event_kind: kind,
        sequence_number: seq.to_string(),
        keys: image.clone(),
        new_image: Some(image),
        old_image: None,
    }
}

#[tokio::test]
async fn modify_on_child_shard_applies_strictly_after_insert_on_parent() {
    let state = Arc::new(SharedStreamState::new(PipelineMetrics::new().unwrap()));
    let writer = Arc::new(RecordingWriter {
        applied: Mutex::new(Vec::new()),
    });
    state.set_writer(writer.clone());

    let parent = Shard {
        shard_id: "shard-a".into(),
        parent_shard_id: None,
    };
    let child = Shard {
        shard_id: "shard-b".into(),
        parent_shard_id: Some("shard-a".into()),
    };

    let parent_client = Arc::new(SingleBatchClient {
        batch: Mutex::new(Some(GetRecordsPage {
            records: vec![record(EventKind::Insert, "1", "a")],
            next_shard_iterator: None,
        })),
    });
    let child_client = Arc::new(SingleBatchClient {
        batch: Mutex::new(Some(GetRecordsPage {
            records: vec![record(EventKind::Modify, "1", "x")],
            next_shard_iterator: None,
        })),
    });

    // The child worker is spawned first and given a head start so that,
    // absent the parent gate, it would race ahead of the parent.
    let child_task = tokio::spawn(process_shard(
        state.clone(),
        child_client,
        StreamIdentifier("s".into()),
        child,
        table_context(),
        TimingsConfig {
            parent_gate_poll_secs: 0,
            ..TimingsConfig::default()
        },
        RetryConfig::default(),
    ));

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(
        writer.applied.lock().unwrap().is_empty(),
        "child must not apply anything before the parent is done"
    );

    let parent_task = tokio::spawn(process_shard(
        state.clone(),
        parent_client,
        StreamIdentifier("s".into()),
        parent,
        table_context(),
        TimingsConfig::default(),
        RetryConfig::default(),
    ));

    parent_task.await.unwrap().unwrap();
    child_task.await.unwrap().unwrap();

    let applied = writer.applied.lock().unwrap();
    assert_eq!(applied.len(), 2);
    assert!(matches!(applied[0], Mutation::Insert { .. }));
    assert!(matches!(applied[1], Mutation::InsertOrUpdate { .. }));
}
