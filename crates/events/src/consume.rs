//! Verification helpers over any [`FeedReader`].

use feedcheck_core::{FeedError, FeedResult, Timestamp};
use tracing::debug;

use crate::event::FeedEvent;
use crate::reader::FeedReader;
use crate::resolved::decode_resolved;

/// Reads the next `expected.len()` rows (skipping resolved notifications) and checks that
/// they match `expected` as an unordered collection of `"<topic>: <key>-><value>"` lines.
pub async fn assert_payloads<R>(feed: &mut R, expected: &[&str]) -> FeedResult<()>
where
    R: FeedReader + ?Sized,
{
    let mut actual = Vec::with_capacity(expected.len());
    while actual.len() < expected.len() {
        match feed.next().await? {
            Some(FeedEvent::Row(row)) => {
                let line = row.describe();
                debug!(row = %line, "read row");
                actual.push(line);
            }
            Some(FeedEvent::Resolved(_)) => {}
            None => {
                let cause = feed
                    .err()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "end of stream".to_string());
                return Err(FeedError::exhausted(format!(
                    "expected another row after {} of {}: {cause}",
                    actual.len(),
                    expected.len()
                )));
            }
        }
    }

    let mut expected: Vec<String> = expected.iter().map(|s| s.to_string()).collect();
    expected.sort();
    actual.sort();
    if expected != actual {
        return Err(FeedError::PayloadMismatch { expected, actual });
    }
    Ok(())
}

/// The next event must be a resolved notification; returns its decoded timestamp.
pub async fn expect_resolved_timestamp<R>(feed: &mut R) -> FeedResult<Timestamp>
where
    R: FeedReader + ?Sized,
{
    match feed.next().await? {
        Some(FeedEvent::Resolved(resolved)) => decode_resolved(&resolved.payload),
        Some(FeedEvent::Row(row)) => Err(FeedError::UnexpectedRow(row.describe())),
        None => Err(FeedError::exhausted(
            "expected a resolved timestamp notification",
        )),
    }
}

/// Drains the feed to end-of-stream, failing on the first row.
pub async fn skip_resolved_timestamps<R>(feed: &mut R) -> FeedResult<()>
where
    R: FeedReader + ?Sized,
{
    while let Some(event) = feed.next().await? {
        if let FeedEvent::Row(row) = event {
            return Err(FeedError::UnexpectedRow(row.describe()));
        }
    }
    Ok(())
}
