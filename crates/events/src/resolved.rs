//! Resolved-timestamp payload codec.
//!
//! The payload is a record with a single `resolved` field holding the decimal form of a
//! [`Timestamp`]. Avro-encoded feeds, once converted to their native JSON form, wrap the
//! string in a union: `{"resolved": {"string": "<decimal>"}}`. Both shapes decode here.

use feedcheck_core::{FeedError, FeedResult, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ResolvedField {
    Plain(String),
    Union {
        #[serde(rename = "string")]
        value: String,
    },
}

#[derive(Debug, Deserialize)]
struct ResolvedPayload {
    resolved: ResolvedField,
}

#[derive(Serialize)]
struct ResolvedOut<'a> {
    resolved: &'a str,
}

/// Decodes a resolved notification payload into a timestamp.
pub fn decode_resolved(payload: &[u8]) -> FeedResult<Timestamp> {
    if payload.is_empty() {
        return Err(FeedError::decode("empty resolved payload"));
    }
    let parsed: ResolvedPayload = serde_json::from_slice(payload)?;
    let decimal = match parsed.resolved {
        ResolvedField::Plain(s) => s,
        ResolvedField::Union { value } => value,
    };
    Timestamp::from_decimal(&decimal)
}

/// Encodes `{"resolved":"<decimal>"}`.
pub fn encode_resolved(ts: Timestamp) -> FeedResult<Vec<u8>> {
    let decimal = ts.to_decimal();
    Ok(serde_json::to_vec(&ResolvedOut { resolved: &decimal })?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_plain_json() {
        let ts = decode_resolved(br#"{"resolved":"1546300800000000000.0000000003"}"#).unwrap();
        assert_eq!(ts, Timestamp::new(1546300800000000000, 3));
    }

    #[test]
    fn decodes_avro_union_form() {
        let ts = decode_resolved(br#"{"resolved":{"string":"12.0000000001"}}"#).unwrap();
        assert_eq!(ts, Timestamp::new(12, 1));
    }

    #[test]
    fn encode_then_decode() {
        let ts = Timestamp::new(99, 7);
        let bytes = encode_resolved(ts).unwrap();
        assert_eq!(bytes, br#"{"resolved":"99.0000000007"}"#);
        assert_eq!(decode_resolved(&bytes).unwrap(), ts);
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(decode_resolved(b""), Err(FeedError::Decode(_))));
        assert!(matches!(decode_resolved(b"{}"), Err(FeedError::Decode(_))));
        assert!(matches!(
            decode_resolved(br#"{"resolved":"-1"}"#),
            Err(FeedError::Decode(_))
        ));
        assert!(matches!(
            decode_resolved(br#"{"resolved":5}"#),
            Err(FeedError::Decode(_))
        ));
    }
}
