//! Stream feed: a live subscription cursor.
//!
//! Rows arrive as `(topic, key, value)`. A null or empty topic marks a resolved
//! notification whose payload is carried in the value column.

use async_trait::async_trait;
use feedcheck_core::{FeedError, FeedId, FeedResult};
use feedcheck_events::{Deduplicator, FeedEvent, FeedReader, FirstError, RowEvent};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Row};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{debug, info};

use crate::pg::map_sqlx_error;

/// Partition label for every stream event; a direct subscription has no partitions.
pub const STREAM_PARTITION: &str = "sinkless";

/// One raw row from a subscription cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRow {
    pub topic: Option<String>,
    pub key: Option<Vec<u8>>,
    pub value: Option<Vec<u8>>,
}

impl StreamRow {
    pub fn change(topic: impl Into<String>, key: &[u8], value: &[u8]) -> Self {
        Self {
            topic: Some(topic.into()),
            key: Some(key.to_vec()),
            value: Some(value.to_vec()),
        }
    }

    pub fn resolved(payload: &[u8]) -> Self {
        Self {
            topic: None,
            key: None,
            value: Some(payload.to_vec()),
        }
    }
}

/// An order-preserving cursor over subscription rows.
#[async_trait]
pub trait RowCursor: Send {
    /// `Ok(None)` once the subscription ended.
    async fn next_row(&mut self) -> FeedResult<Option<StreamRow>>;

    async fn close(&mut self) -> FeedResult<()>;
}

/// Cursor fed through a bounded channel, usually by a producer task it owns.
#[derive(Debug)]
pub struct ChannelCursor {
    rx: mpsc::Receiver<FeedResult<StreamRow>>,
    producer: Option<JoinHandle<()>>,
}

impl ChannelCursor {
    /// A cursor and the sender that feeds it.
    pub fn channel(capacity: usize) -> (mpsc::Sender<FeedResult<StreamRow>>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self { rx, producer: None })
    }

    /// Ties a producer task to this cursor; it is aborted on close.
    pub fn with_producer(mut self, producer: JoinHandle<()>) -> Self {
        self.producer = Some(producer);
        self
    }
}

#[async_trait]
impl RowCursor for ChannelCursor {
    async fn next_row(&mut self) -> FeedResult<Option<StreamRow>> {
        self.rx.recv().await.transpose()
    }

    async fn close(&mut self) -> FeedResult<()> {
        self.rx.close();
        if let Some(producer) = self.producer.take() {
            producer.abort();
            if let Err(err) = producer.await {
                if !err.is_cancelled() {
                    return Err(FeedError::transport(format!("cursor producer: {err}")));
                }
            }
        }
        Ok(())
    }
}

/// Subscription cursor over a dedicated Postgres-wire connection.
///
/// The statement runs in a background task that owns the connection and pushes rows into a
/// channel of `buffer` slots, so the server is never more than `buffer` rows ahead of the
/// reader. Closing the cursor drops the connection.
#[derive(Debug)]
pub struct PgRowCursor {
    inner: ChannelCursor,
}

impl PgRowCursor {
    pub fn spawn(mut conn: PgConnection, statement: impl Into<String>, buffer: usize) -> Self {
        let statement = statement.into();
        let (tx, cursor) = ChannelCursor::channel(buffer);
        let producer = tokio::spawn(async move {
            let mut rows = sqlx::query(&statement).fetch(&mut conn);
            while let Some(next) = rows.next().await {
                let item = next
                    .map_err(|e| map_sqlx_error("stream", e))
                    .and_then(|row| decode_row(&row));
                let failed = item.is_err();
                if tx.send(item).await.is_err() || failed {
                    break;
                }
            }
        });
        Self {
            inner: cursor.with_producer(producer),
        }
    }
}

fn decode_row(row: &PgRow) -> FeedResult<StreamRow> {
    let decode = |e| map_sqlx_error("stream", e);
    Ok(StreamRow {
        topic: row.try_get(0).map_err(decode)?,
        key: row.try_get(1).map_err(decode)?,
        value: row.try_get(2).map_err(decode)?,
    })
}

#[async_trait]
impl RowCursor for PgRowCursor {
    async fn next_row(&mut self) -> FeedResult<Option<StreamRow>> {
        self.inner.next_row().await
    }

    async fn close(&mut self) -> FeedResult<()> {
        self.inner.close().await
    }
}

/// Reader over a [`RowCursor`]. Errors come from the cursor itself.
pub struct StreamFeed<C> {
    feed_id: FeedId,
    cursor: C,
    seen: Deduplicator,
    first_error: FirstError,
    closed: bool,
}

impl<C: RowCursor> StreamFeed<C> {
    pub fn new(cursor: C) -> Self {
        Self {
            feed_id: FeedId::new(),
            cursor,
            seen: Deduplicator::new(),
            first_error: FirstError::default(),
            closed: false,
        }
    }

    pub fn feed_id(&self) -> FeedId {
        self.feed_id
    }

    async fn read(&mut self) -> FeedResult<Option<FeedEvent>> {
        loop {
            let Some(row) = self.cursor.next_row().await? else {
                return Ok(None);
            };
            match row.topic.filter(|t| !t.is_empty()) {
                Some(topic) => {
                    let event = RowEvent::new(topic, STREAM_PARTITION, row.key, row.value);
                    if self.seen.seen_row(&event) {
                        debug!(feed_id = %self.feed_id, topic = %event.topic, "skipping redelivered row");
                        continue;
                    }
                    return Ok(Some(event.into()));
                }
                None => {
                    let payload = row.value.unwrap_or_default();
                    return Ok(Some(FeedEvent::resolved("", STREAM_PARTITION, payload)));
                }
            }
        }
    }
}

#[async_trait]
impl<C: RowCursor> FeedReader for StreamFeed<C> {
    fn partitions(&self) -> Vec<String> {
        vec![STREAM_PARTITION.to_string()]
    }

    async fn next(&mut self) -> FeedResult<Option<FeedEvent>> {
        self.first_error.check()?;
        if self.closed {
            return Ok(None);
        }
        let result = self.read().await;
        self.first_error.record(result)
    }

    fn err(&self) -> Option<&FeedError> {
        self.first_error.get()
    }

    async fn close(&mut self) -> FeedResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        info!(feed_id = %self.feed_id, rows = self.seen.len(), "closing stream feed");
        self.cursor.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rows_resolved_and_end_of_stream() {
        let (tx, cursor) = ChannelCursor::channel(8);
        tx.send(Ok(StreamRow::change("foo", b"[1]", b"{\"a\":1}"))).await.unwrap();
        tx.send(Ok(StreamRow::resolved(b"{\"resolved\":\"1.0\"}"))).await.unwrap();
        drop(tx);

        let mut feed = StreamFeed::new(cursor);
        let row = feed.next().await.unwrap().unwrap();
        assert_eq!(row.as_row().unwrap().describe(), "foo: [1]->{\"a\":1}");
        assert_eq!(row.partition(), STREAM_PARTITION);

        let resolved = feed.next().await.unwrap().unwrap();
        assert_eq!(
            resolved.as_resolved().unwrap().payload,
            b"{\"resolved\":\"1.0\"}"
        );
        assert!(feed.next().await.unwrap().is_none());
        assert!(feed.err().is_none());
    }

    #[tokio::test]
    async fn duplicates_are_suppressed_but_resolved_never_is() {
        let (tx, cursor) = ChannelCursor::channel(8);
        for _ in 0..2 {
            tx.send(Ok(StreamRow::change("foo", b"[1]", b"v"))).await.unwrap();
            tx.send(Ok(StreamRow::resolved(b"r"))).await.unwrap();
        }
        drop(tx);

        let mut feed = StreamFeed::new(cursor);
        let mut kinds = Vec::new();
        while let Some(ev) = feed.next().await.unwrap() {
            kinds.push(ev.is_resolved());
        }
        assert_eq!(kinds, [false, true, true]);
    }

    #[tokio::test]
    async fn empty_topic_is_resolved() {
        let (tx, cursor) = ChannelCursor::channel(1);
        tx.send(Ok(StreamRow {
            topic: Some(String::new()),
            key: None,
            value: Some(b"p".to_vec()),
        }))
        .await
        .unwrap();
        drop(tx);
        let mut feed = StreamFeed::new(cursor);
        assert!(feed.next().await.unwrap().unwrap().is_resolved());
    }

    #[tokio::test]
    async fn cursor_error_is_sticky() {
        let (tx, cursor) = ChannelCursor::channel(4);
        tx.send(Err(FeedError::transport("connection reset"))).await.unwrap();
        tx.send(Ok(StreamRow::change("foo", b"[1]", b"v"))).await.unwrap();
        drop(tx);

        let mut feed = StreamFeed::new(cursor);
        assert_eq!(
            feed.next().await.unwrap_err(),
            FeedError::transport("connection reset")
        );
        assert_eq!(feed.err(), Some(&FeedError::transport("connection reset")));
        assert!(feed.next().await.is_err());
    }

    #[tokio::test]
    async fn close_stops_the_producer() {
        let (tx, cursor) = ChannelCursor::channel(1);
        let producer = tokio::spawn(async move {
            loop {
                if tx.send(Ok(StreamRow::resolved(b"r"))).await.is_err() {
                    break;
                }
            }
        });
        let mut feed = StreamFeed::new(cursor.with_producer(producer));
        assert!(feed.next().await.unwrap().is_some());
        feed.close().await.unwrap();
        feed.close().await.unwrap();
        assert!(feed.next().await.unwrap().is_none());
    }
}
