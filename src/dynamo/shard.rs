//! dynamo/shard.rs
//!
//! Data model shared by the provisioner, discovery loop, and shard worker:
//! §3 of spec.md expressed as Rust types.

use aws_sdk_dynamodbstreams::types::AttributeValue;
use std::collections::HashMap;
use std::fmt;

pub type AttributeMap = HashMap<String, AttributeValue>;

/// Opaque stream identifier returned by the provisioner. Immutable for the
/// lifetime of a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamIdentifier(pub String);

impl fmt::Display for StreamIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A DynamoDB Stream shard: a contiguous, sequence-number-ordered partition
/// with at most one parent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shard {
    pub shard_id: String,
    pub parent_shard_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Insert,
    Modify,
    Remove,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Insert => "INSERT",
            EventKind::Modify => "MODIFY",
            EventKind::Remove => "REMOVE",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "INSERT" => Some(EventKind::Insert),
            "MODIFY" => Some(EventKind::Modify),
            "REMOVE" => Some(EventKind::Remove),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An immutable stream record: {event kind, sequence number, new image or
/// keys, old image}. For REMOVE events only the key image is meaningful.
#[derive(Debug, Clone)]
pub struct StreamRecord {
    pub event_kind: EventKind,
    pub sequence_number: String,
    pub keys: AttributeMap,
    pub new_image: Option<AttributeMap>,
    #[allow(dead_code)] // never read: REMOVE only needs keys, INSERT/MODIFY only need new_image (spec.md §4.1)
    pub old_image: Option<AttributeMap>,
}

impl StreamRecord {
    /// The image C5 converts: the key image for REMOVE, the new image
    /// otherwise.
    pub fn image_to_convert(&self) -> Option<&AttributeMap> {
        match self.event_kind {
            EventKind::Remove => Some(&self.keys),
            EventKind::Insert | EventKind::Modify => self.new_image.as_ref(),
        }
    }
}

/// The cursor kind requested from `GetShardIterator` (spec.md §4.4 step a).
#[derive(Debug, Clone)]
pub enum ShardIteratorRequest {
    TrimHorizon,
    AfterSequenceNumber(String),
}
