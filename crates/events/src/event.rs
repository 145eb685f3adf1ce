//! The feed event union.

use serde::{Deserialize, Serialize};

/// One row change as delivered by a transport.
///
/// `None` and `Some(vec![])` are distinct: a transport may deliver a present-but-empty
/// column. At least one of `key`/`value` is present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowEvent {
    pub topic: String,
    pub partition: String,
    pub key: Option<Vec<u8>>,
    pub value: Option<Vec<u8>>,
}

impl RowEvent {
    pub fn new(
        topic: impl Into<String>,
        partition: impl Into<String>,
        key: Option<Vec<u8>>,
        value: Option<Vec<u8>>,
    ) -> Self {
        Self {
            topic: topic.into(),
            partition: partition.into(),
            key,
            value,
        }
    }

    /// `"<topic>: <key>-><value>"`, with absent columns rendered empty.
    pub fn describe(&self) -> String {
        format!(
            "{}: {}->{}",
            self.topic,
            lossy(self.key.as_deref()),
            lossy(self.value.as_deref())
        )
    }
}

/// A resolved-timestamp notification. The payload is opaque until decoded with
/// [`crate::decode_resolved`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedEvent {
    pub topic: String,
    pub partition: String,
    pub payload: Vec<u8>,
}

/// Either a row change or a resolved notification. End-of-stream is `Ok(None)` from
/// [`crate::FeedReader::next`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum FeedEvent {
    Row(RowEvent),
    Resolved(ResolvedEvent),
}

impl FeedEvent {
    /// Builds an event from raw transport columns.
    ///
    /// A record with neither key nor value is a resolved notification carrying `payload`;
    /// anything else is a row, and `payload` is dropped.
    pub fn classify(
        topic: impl Into<String>,
        partition: impl Into<String>,
        key: Option<Vec<u8>>,
        value: Option<Vec<u8>>,
        payload: Option<Vec<u8>>,
    ) -> Self {
        if key.is_some() || value.is_some() {
            return Self::Row(RowEvent::new(topic, partition, key, value));
        }
        Self::Resolved(ResolvedEvent {
            topic: topic.into(),
            partition: partition.into(),
            payload: payload.unwrap_or_default(),
        })
    }

    pub fn resolved(
        topic: impl Into<String>,
        partition: impl Into<String>,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self::Resolved(ResolvedEvent {
            topic: topic.into(),
            partition: partition.into(),
            payload: payload.into(),
        })
    }

    pub fn topic(&self) -> &str {
        match self {
            Self::Row(r) => &r.topic,
            Self::Resolved(r) => &r.topic,
        }
    }

    pub fn partition(&self) -> &str {
        match self {
            Self::Row(r) => &r.partition,
            Self::Resolved(r) => &r.partition,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }

    pub fn as_row(&self) -> Option<&RowEvent> {
        match self {
            Self::Row(r) => Some(r),
            Self::Resolved(_) => None,
        }
    }

    pub fn as_resolved(&self) -> Option<&ResolvedEvent> {
        match self {
            Self::Resolved(r) => Some(r),
            Self::Row(_) => None,
        }
    }
}

impl From<RowEvent> for FeedEvent {
    fn from(row: RowEvent) -> Self {
        Self::Row(row)
    }
}

fn lossy(bytes: Option<&[u8]>) -> String {
    bytes
        .map(|b| String::from_utf8_lossy(b).into_owned())
        .unwrap_or_default()
}
