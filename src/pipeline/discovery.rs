//! pipeline/discovery.rs — C3 Shard Discovery Loop
//!
//! `ProcessStream(stream_id, table)`: repeatedly enumerates shards and
//! spawns one C4 worker per newly observed shard, joining them all before
//! returning (spec.md §4.3). `JoinSet` is the Rust idiom for "internal wait
//! group over dynamically spawned tasks" — generalizing the teacher's
//! `tokio::spawn` + `JoinError` (`error.rs`'s `TaskJoin` variant) to an
//! unbounded, dynamically-growing set of handles.

use crate::appconfig::{RetryConfig, TimingsConfig};
use crate::dynamo::client::DynamoStreamsClient;
use crate::dynamo::shard::StreamIdentifier;
use crate::pipeline::state::SharedStreamState;
use crate::pipeline::worker::process_shard;
use crate::pipeline::TableContext;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info};

/// `ProcessStream(stream_id, table)`.
pub async fn process_stream(
    state: Arc<SharedStreamState>,
    dynamo: Arc<dyn DynamoStreamsClient>,
    stream_id: StreamIdentifier,
    table: TableContext,
    timings: TimingsConfig,
    retry: RetryConfig,
) {
    let mut last_processed_shard_id: Option<String> = None;
    let mut pass_after_user_exit = false;
    let mut dispatched: HashSet<String> = HashSet::new();
    let mut workers: JoinSet<()> = JoinSet::new();

    loop {
        let page = match dynamo
            .describe_stream(&stream_id, last_processed_shard_id.as_deref())
            .await
        {
            Ok(page) => page,
            Err(e) => {
                state.unexpected(format!("describe_stream failed: {e}"));
                break;
            }
        };

        for shard in &page.shards {
            last_processed_shard_id = Some(shard.shard_id.clone());

            if dispatched.insert(shard.shard_id.clone()) {
                info!(shard_id = %shard.shard_id, parent = ?shard.parent_shard_id, "dispatching shard worker");

                let state = state.clone();
                let dynamo = dynamo.clone();
                let stream_id = stream_id.clone();
                let shard = shard.clone();
                let table = table.clone();
                let timings = timings.clone();
                let retry = retry.clone();

                workers.spawn(async move {
                    if let Err(e) =
                        process_shard(state.clone(), dynamo, stream_id, shard, table, timings, retry)
                            .await
                    {
                        state.unexpected(format!("shard worker failed: {e}"));
                    }
                });
            }
        }

        if page.last_evaluated_shard_id.is_none() && pass_after_user_exit {
            break;
        }

        if state.user_exit() {
            pass_after_user_exit = true;
            continue;
        }

        if page.shards.is_empty() {
            tokio::time::sleep(Duration::from_secs(timings.discovery_empty_pass_sleep_secs)).await;
        }
    }

    while let Some(result) = workers.join_next().await {
        if let Err(e) = result {
            error!("shard worker task panicked or was cancelled: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamo::client::{DescribeStreamPage, GetRecordsPage, StreamViewType, TableStreamInfo};
    use crate::dynamo::shard::{Shard, ShardIteratorRequest};
    use crate::metrics::PipelineMetrics;
    use crate::schema::{KeyType, PkColumn, SourceSchema, SpannerType, TableSchemas, TargetColumn, TargetSchema};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FakeClient {
        pages: Mutex<Vec<DescribeStreamPage>>,
    }

    #[async_trait]
    impl DynamoStreamsClient for FakeClient {
        async fn describe_table_stream(
            &self,
            _table: &str,
        ) -> crate::error::AppResult<Option<TableStreamInfo>> {
            unimplemented!()
        }

        async fn enable_stream(
            &self,
            _table: &str,
        ) -> crate::error::AppResult<StreamIdentifier> {
            unimplemented!()
        }

        async fn describe_stream(
            &self,
            _stream_id: &StreamIdentifier,
            _exclusive_start_shard_id: Option<&str>,
        ) -> crate::error::AppResult<DescribeStreamPage> {
            let mut pages = self.pages.lock().unwrap();
            if pages.is_empty() {
                Ok(DescribeStreamPage::default())
            } else {
                Ok(pages.remove(0))
            }
        }

        async fn get_shard_iterator(
            &self,
            _stream_id: &StreamIdentifier,
            _shard_id: &str,
            _request: ShardIteratorRequest,
        ) -> crate::error::AppResult<String> {
            Ok("iter".into())
        }

        async fn get_records(&self, _iterator: &str) -> crate::error::AppResult<GetRecordsPage> {
            Ok(GetRecordsPage::default())
        }
    }

    fn table_context() -> TableContext {
        TableContext {
            schemas: TableSchemas {
                source: SourceSchema {
                    table: "Orders".into(),
                    columns: vec!["pk".into()],
                    primary_key: vec![PkColumn {
                        name: "pk".into(),
                        key_type: KeyType::Hash,
                    }],
                },
                target: TargetSchema {
                    table: "Orders".into(),
                    columns: vec![TargetColumn {
                        name: "pk".into(),
                        spanner_type: SpannerType::String,
                        is_primary_key: true,
                    }],
                    source_to_target_column: HashMap::from([("pk".to_string(), "pk".to_string())]),
                },
            },
        }
    }

    #[tokio::test]
    async fn dedups_shards_already_dispatched_across_passes() {
        let state = Arc::new(SharedStreamState::new(PipelineMetrics::new().unwrap()));
        state.set_user_exit(); // avoid the 10s empty-pass sleep in the test

        let shard = Shard {
            shard_id: "shard-1".into(),
            parent_shard_id: None,
        };
        let client = Arc::new(FakeClient {
            pages: Mutex::new(vec![
                DescribeStreamPage {
                    shards: vec![shard.clone()],
                    last_evaluated_shard_id: Some("shard-1".into()),
                },
                DescribeStreamPage {
                    shards: vec![shard],
                    last_evaluated_shard_id: None,
                },
            ]),
        });

        process_stream(
            state.clone(),
            client,
            StreamIdentifier("s".into()),
            table_context(),
            TimingsConfig::default(),
            RetryConfig::default(),
        )
        .await;

        assert!(state.shard_done("shard-1"));
    }
}
