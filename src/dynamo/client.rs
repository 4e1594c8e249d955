//! dynamo/client.rs
//!
//! The SDK surface C1/C3/C4 depend on, behind a trait so tests can inject a
//! scripted fake the way the teacher's `RedisProbe` (`redis/health/poller.rs`)
//! lets a health poller be tested without a real Redis.

use crate::dynamo::shard::{Shard, ShardIteratorRequest, StreamIdentifier, StreamRecord};
use crate::error::AppResult;
use async_trait::async_trait;

/// Stream view type as reported by `DescribeTable`. spec.md §4.1/§6: only
/// `NewImage` / `NewAndOldImages` can serve this pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamViewType {
    KeysOnly,
    OldImage,
    NewImage,
    NewAndOldImages,
}

impl StreamViewType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamViewType::KeysOnly => "KEYS_ONLY",
            StreamViewType::OldImage => "OLD_IMAGE",
            StreamViewType::NewImage => "NEW_IMAGE",
            StreamViewType::NewAndOldImages => "NEW_AND_OLD_IMAGES",
        }
    }

    /// Can this view type carry enough data for C5 to build mutations?
    pub fn sufficient(&self) -> bool {
        matches!(self, StreamViewType::NewImage | StreamViewType::NewAndOldImages)
    }
}

#[derive(Debug, Clone)]
pub struct TableStreamInfo {
    pub stream_id: StreamIdentifier,
    pub view_type: StreamViewType,
}

#[derive(Debug, Clone, Default)]
pub struct DescribeStreamPage {
    pub shards: Vec<Shard>,
    pub last_evaluated_shard_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct GetRecordsPage {
    pub records: Vec<StreamRecord>,
    pub next_shard_iterator: Option<String>,
}

/// Everything C1/C3/C4 need from DynamoDB + DynamoDB Streams.
#[async_trait]
pub trait DynamoStreamsClient: Send + Sync {
    /// `None` if the table has no stream enabled at all.
    async fn describe_table_stream(&self, table: &str) -> AppResult<Option<TableStreamInfo>>;

    /// Enables a `NEW_AND_OLD_IMAGES` stream on `table`, returning its id.
    async fn enable_stream(&self, table: &str) -> AppResult<StreamIdentifier>;

    async fn describe_stream(
        &self,
        stream_id: &StreamIdentifier,
        exclusive_start_shard_id: Option<&str>,
    ) -> AppResult<DescribeStreamPage>;

    async fn get_shard_iterator(
        &self,
        stream_id: &StreamIdentifier,
        shard_id: &str,
        request: ShardIteratorRequest,
    ) -> AppResult<String>;

    async fn get_records(&self, iterator: &str) -> AppResult<GetRecordsPage>;
}

/// Real implementation backed by `aws-sdk-dynamodb` (control plane) and
/// `aws-sdk-dynamodbstreams` (data plane) — the same "one real client
/// wrapped behind the app's own trait" shape the teacher uses for
/// `DbHandler` wrapping `sqlx::PgPool`.
pub struct AwsDynamoStreamsClient {
    control: aws_sdk_dynamodb::Client,
    streams: aws_sdk_dynamodbstreams::Client,
}

impl AwsDynamoStreamsClient {
    pub fn new(
        control: aws_sdk_dynamodb::Client,
        streams: aws_sdk_dynamodbstreams::Client,
    ) -> Self {
        Self { control, streams }
    }

    pub async fn from_env(region: &str, endpoint_url: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()));
        if let Some(url) = endpoint_url {
            loader = loader.endpoint_url(url.to_string());
        }
        let shared = loader.load().await;

        Self {
            control: aws_sdk_dynamodb::Client::new(&shared),
            streams: aws_sdk_dynamodbstreams::Client::new(&shared),
        }
    }

    fn parse_view_type(raw: &aws_sdk_dynamodb::types::StreamViewType) -> StreamViewType {
        use aws_sdk_dynamodb::types::StreamViewType as Sdk;
        match raw {
            Sdk::KeysOnly => StreamViewType::KeysOnly,
            Sdk::OldImage => StreamViewType::OldImage,
            Sdk::NewImage => StreamViewType::NewImage,
            Sdk::NewAndOldImages => StreamViewType::NewAndOldImages,
            _ => StreamViewType::KeysOnly,
        }
    }
}

#[async_trait]
impl DynamoStreamsClient for AwsDynamoStreamsClient {
    async fn describe_table_stream(&self, table: &str) -> AppResult<Option<TableStreamInfo>> {
        let out = self
            .control
            .describe_table()
            .table_name(table)
            .send()
            .await
            .map_err(aws_sdk_dynamodb::Error::from)?;

        let Some(desc) = out.table else {
            return Ok(None);
        };
        let Some(arn) = desc.latest_stream_arn else {
            return Ok(None);
        };
        let view_type = desc
            .stream_specification
            .and_then(|s| s.stream_view_type)
            .map(|v| Self::parse_view_type(&v))
            .unwrap_or(StreamViewType::KeysOnly);

        Ok(Some(TableStreamInfo {
            stream_id: StreamIdentifier(arn),
            view_type,
        }))
    }

    async fn enable_stream(&self, table: &str) -> AppResult<StreamIdentifier> {
        use aws_sdk_dynamodb::types::{StreamSpecification, StreamViewType as SdkViewType};

        let out = self
            .control
            .update_table()
            .table_name(table)
            .stream_specification(
                StreamSpecification::builder()
                    .stream_enabled(true)
                    .stream_view_type(SdkViewType::NewAndOldImages)
                    .build(),
            )
            .send()
            .await
            .map_err(aws_sdk_dynamodb::Error::from)?;

        let arn = out
            .table_description
            .and_then(|d| d.latest_stream_arn)
            .ok_or_else(|| {
                crate::error::AppError::Internal(
                    "UpdateTable succeeded but returned no stream arn".into(),
                )
            })?;

        Ok(StreamIdentifier(arn))
    }

    async fn describe_stream(
        &self,
        stream_id: &StreamIdentifier,
        exclusive_start_shard_id: Option<&str>,
    ) -> AppResult<DescribeStreamPage> {
        let mut req = self
            .streams
            .describe_stream()
            .stream_arn(stream_id.0.clone());
        if let Some(id) = exclusive_start_shard_id {
            req = req.exclusive_start_shard_id(id);
        }

        let out = req
            .send()
            .await
            .map_err(aws_sdk_dynamodbstreams::Error::from)?;

        let Some(desc) = out.stream_description else {
            return Ok(DescribeStreamPage::default());
        };

        let shards = desc
            .shards
            .unwrap_or_default()
            .into_iter()
            .filter_map(|s| {
                s.shard_id.map(|shard_id| Shard {
                    shard_id,
                    parent_shard_id: s.parent_shard_id,
                })
            })
            .collect();

        Ok(DescribeStreamPage {
            shards,
            last_evaluated_shard_id: desc.last_evaluated_shard_id,
        })
    }

    async fn get_shard_iterator(
        &self,
        stream_id: &StreamIdentifier,
        shard_id: &str,
        request: ShardIteratorRequest,
    ) -> AppResult<String> {
        use aws_sdk_dynamodbstreams::types::ShardIteratorType;

        let mut req = self
            .streams
            .get_shard_iterator()
            .stream_arn(stream_id.0.clone())
            .shard_id(shard_id);

        req = match request {
            ShardIteratorRequest::TrimHorizon => {
                req.shard_iterator_type(ShardIteratorType::TrimHorizon)
            }
            ShardIteratorRequest::AfterSequenceNumber(seq) => req
                .shard_iterator_type(ShardIteratorType::AfterSequenceNumber)
                .sequence_number(seq),
        };

        let out = req
            .send()
            .await
            .map_err(aws_sdk_dynamodbstreams::Error::from)?;

        out.shard_iterator.ok_or_else(|| {
            crate::error::AppError::Internal("GetShardIterator returned no iterator".into())
        })
    }

    async fn get_records(&self, iterator: &str) -> AppResult<GetRecordsPage> {
        use crate::dynamo::shard::{AttributeMap, EventKind};

        let out = self
            .streams
            .get_records()
            .shard_iterator(iterator)
            .send()
            .await
            .map_err(aws_sdk_dynamodbstreams::Error::from)?;

        let mut records = Vec::new();
        for rec in out.records.unwrap_or_default() {
            let Some(dynamodb) = rec.dynamodb else {
                continue;
            };
            let Some(event_name) = rec.event_name.map(|e| e.as_str().to_string()) else {
                continue;
            };
            let Some(event_kind) = EventKind::parse(&event_name) else {
                continue;
            };
            let Some(sequence_number) = dynamodb.sequence_number else {
                continue;
            };
            let keys: AttributeMap = dynamodb.keys.unwrap_or_default();
            let new_image: Option<AttributeMap> = dynamodb.new_image;
            let old_image: Option<AttributeMap> = dynamodb.old_image;

            records.push(StreamRecord {
                event_kind,
                sequence_number,
                keys,
                new_image,
                old_image,
            });
        }

        Ok(GetRecordsPage {
            records,
            next_shard_iterator: out.next_shard_iterator,
        })
    }
}
