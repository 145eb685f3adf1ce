//! Row and resolved-timestamp encoding.

use feedcheck_core::{FeedResult, Timestamp};
use serde_json::{Map, Value};

use super::buffer::ChangeRow;

pub trait Encoder: Send + Sync {
    fn encode_key(&self, row: &ChangeRow) -> FeedResult<Vec<u8>>;

    fn encode_value(&self, row: &ChangeRow) -> FeedResult<Vec<u8>>;

    /// Encodes a resolved notification. `topic` is empty for notifications that cover
    /// every topic.
    fn encode_resolved(&self, topic: &str, ts: Timestamp) -> FeedResult<Vec<u8>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Envelope {
    /// The row value as-is.
    Row,
    /// `{"after": <value>}`, plus `"updated"` when requested.
    Wrapped { updated: bool },
}

#[derive(Debug, Clone, Copy)]
pub struct JsonEncoder {
    envelope: Envelope,
}

impl JsonEncoder {
    pub fn new(envelope: Envelope) -> Self {
        Self { envelope }
    }
}

impl Default for JsonEncoder {
    fn default() -> Self {
        Self::new(Envelope::Wrapped { updated: false })
    }
}

impl Encoder for JsonEncoder {
    fn encode_key(&self, row: &ChangeRow) -> FeedResult<Vec<u8>> {
        Ok(row.key.clone())
    }

    fn encode_value(&self, row: &ChangeRow) -> FeedResult<Vec<u8>> {
        match self.envelope {
            Envelope::Row => Ok(row.value.clone()),
            Envelope::Wrapped { updated } => {
                let after = if row.value.is_empty() {
                    Value::Null
                } else {
                    serde_json::from_slice(&row.value)?
                };
                let mut out = Map::new();
                out.insert("after".to_string(), after);
                if updated {
                    out.insert("updated".to_string(), Value::String(row.updated.to_decimal()));
                }
                Ok(serde_json::to_vec(&out)?)
            }
        }
    }

    fn encode_resolved(&self, _topic: &str, ts: Timestamp) -> FeedResult<Vec<u8>> {
        feedcheck_events::encode_resolved(ts)
    }
}
