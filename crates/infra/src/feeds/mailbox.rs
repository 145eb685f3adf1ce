//! Mailbox feed: a table the sink writes into and the reader drains.
//!
//! The sink inserts `(topic, partition, message_id, key, value, payload)` rows, primary key
//! `(topic, partition, message_id)`. Message ids only order rows within one
//! `(topic, partition)`. The reader repeatedly deletes everything currently in the table
//! and pages through the deleted batch in key order, so within a partition events come out
//! in message-id order across batches.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use feedcheck_core::{FeedError, FeedId, FeedResult};
use feedcheck_events::{Deduplicator, FeedEvent, FeedReader, FirstError};
use sqlx::{PgPool, Row};
use tracing::{debug, info, instrument};

use crate::jobs::{JobErrorGate, JobHandle};
use crate::pg::{map_sqlx_error, validate_identifier};

/// One row of the mailbox table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxRow {
    pub topic: String,
    pub partition: String,
    pub message_id: i64,
    pub key: Option<Vec<u8>>,
    pub value: Option<Vec<u8>>,
    pub payload: Option<Vec<u8>>,
}

impl MailboxRow {
    pub fn change(
        topic: impl Into<String>,
        partition: impl Into<String>,
        message_id: i64,
        key: &[u8],
        value: &[u8],
    ) -> Self {
        Self {
            topic: topic.into(),
            partition: partition.into(),
            message_id,
            key: Some(key.to_vec()),
            value: Some(value.to_vec()),
            payload: None,
        }
    }

    pub fn resolved(
        topic: impl Into<String>,
        partition: impl Into<String>,
        message_id: i64,
        payload: &[u8],
    ) -> Self {
        Self {
            topic: topic.into(),
            partition: partition.into(),
            message_id,
            key: None,
            value: None,
            payload: Some(payload.to_vec()),
        }
    }

    fn sort_key(&self) -> (&str, &str, i64) {
        (&self.topic, &self.partition, self.message_id)
    }

    /// A NULL column is `None`; a present-but-empty column stays `Some(vec![])`.
    fn into_event(self) -> FeedEvent {
        FeedEvent::classify(self.topic, self.partition, self.key, self.value, self.payload)
    }
}

/// A table that can be drained destructively.
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// Atomically removes and returns every row currently stored.
    async fn drain(&self) -> FeedResult<Vec<MailboxRow>>;
}

#[async_trait]
impl<M: Mailbox + ?Sized> Mailbox for Arc<M> {
    async fn drain(&self) -> FeedResult<Vec<MailboxRow>> {
        (**self).drain().await
    }
}

/// Mailbox table reached over a Postgres-wire connection pool.
#[derive(Debug, Clone)]
pub struct PgMailbox {
    pool: PgPool,
    table: String,
}

impl PgMailbox {
    pub fn new(pool: PgPool, table: impl Into<String>) -> FeedResult<Self> {
        let table = table.into();
        validate_identifier(&table)?;
        Ok(Self { pool, table })
    }
}

#[async_trait]
impl Mailbox for PgMailbox {
    #[instrument(skip(self), fields(table = %self.table), err)]
    async fn drain(&self) -> FeedResult<Vec<MailboxRow>> {
        let statement = format!(
            "WITH d AS (DELETE FROM {} RETURNING *) \
             SELECT topic, partition, message_id, key, value, payload FROM d \
             ORDER BY topic, partition, message_id",
            self.table
        );
        let rows = sqlx::query(&statement)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("drain_mailbox", e))?;

        rows.iter()
            .map(|row| -> FeedResult<MailboxRow> {
                let decode = |e| map_sqlx_error("drain_mailbox", e);
                Ok(MailboxRow {
                    topic: row.try_get("topic").map_err(decode)?,
                    partition: row.try_get("partition").map_err(decode)?,
                    message_id: row.try_get("message_id").map_err(decode)?,
                    key: row.try_get("key").map_err(decode)?,
                    value: row.try_get("value").map_err(decode)?,
                    payload: row.try_get("payload").map_err(decode)?,
                })
            })
            .collect()
    }
}

/// In-memory mailbox for tests and local pipelines.
#[derive(Debug, Default)]
pub struct InMemoryMailbox {
    rows: Mutex<BTreeMap<(String, String, i64), MailboxRow>>,
}

impl InMemoryMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the row with the same primary key.
    pub fn insert(&self, row: MailboxRow) {
        let key = (row.topic.clone(), row.partition.clone(), row.message_id);
        self.rows.lock().unwrap().insert(key, row);
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Mailbox for InMemoryMailbox {
    async fn drain(&self) -> FeedResult<Vec<MailboxRow>> {
        let rows = std::mem::take(&mut *self.rows.lock().unwrap());
        Ok(rows.into_values().collect())
    }
}

/// Reader over a [`Mailbox`], gated on its producing job.
pub struct MailboxFeed<M> {
    feed_id: FeedId,
    mailbox: M,
    gate: JobErrorGate,
    partitions: Vec<String>,
    batch: VecDeque<MailboxRow>,
    seen: Deduplicator,
    first_error: FirstError,
    closed: bool,
}

impl<M: Mailbox> MailboxFeed<M> {
    pub fn new(mailbox: M, gate: JobErrorGate) -> Self {
        Self {
            feed_id: FeedId::new(),
            mailbox,
            gate,
            partitions: vec!["0".to_string(), "1".to_string(), "2".to_string()],
            batch: VecDeque::new(),
            seen: Deduplicator::new(),
            first_error: FirstError::default(),
            closed: false,
        }
    }

    /// Overrides the partition labels the sink writes under.
    pub fn with_partitions(mut self, partitions: Vec<String>) -> Self {
        self.partitions = partitions;
        self
    }

    pub fn feed_id(&self) -> FeedId {
        self.feed_id
    }

    pub fn job(&self) -> &JobHandle {
        self.gate.handle()
    }

    async fn read(&mut self) -> FeedResult<Option<FeedEvent>> {
        loop {
            while let Some(row) = self.batch.pop_front() {
                let event = row.into_event();
                if let FeedEvent::Row(row) = &event {
                    if self.seen.seen_row(row) {
                        debug!(feed_id = %self.feed_id, topic = %row.topic, "skipping redelivered row");
                        continue;
                    }
                }
                return Ok(Some(event));
            }

            self.gate.fetch_error().await?;

            let mut rows = self.mailbox.drain().await?;
            rows.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
            debug!(feed_id = %self.feed_id, rows = rows.len(), "drained mailbox");
            self.batch.extend(rows);
        }
    }
}

#[async_trait]
impl<M: Mailbox> FeedReader for MailboxFeed<M> {
    fn partitions(&self) -> Vec<String> {
        self.partitions.clone()
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
        self.batch.clear();
        let job_id = self.gate.handle().id();
        if let Err(err) = self.gate.cancel_job().await {
            info!(feed_id = %self.feed_id, %job_id, error = %err, "could not cancel feed job");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use feedcheck_core::JobId;

    use super::*;
    use crate::jobs::{FlushNotifier, InMemoryJobRegistry, JobStatus};

    struct Fixture {
        mailbox: Arc<InMemoryMailbox>,
        registry: Arc<InMemoryJobRegistry>,
        job_id: JobId,
    }

    impl Fixture {
        fn new() -> Self {
            let registry = Arc::new(InMemoryJobRegistry::new());
            let job_id = JobId::new(11);
            registry.start(job_id);
            Self {
                mailbox: Arc::new(InMemoryMailbox::new()),
                registry,
                job_id,
            }
        }

        fn feed(&self) -> MailboxFeed<Arc<InMemoryMailbox>> {
            let gate = JobErrorGate::new(self.job_id, self.registry.clone(), FlushNotifier::new())
                .with_flush_wait(Duration::from_millis(1));
            MailboxFeed::new(self.mailbox.clone(), gate)
        }
    }

    async fn drain_until_error(
        feed: &mut MailboxFeed<Arc<InMemoryMailbox>>,
    ) -> (Vec<String>, FeedError) {
        let mut seen = Vec::new();
        loop {
            match feed.next().await {
                Ok(Some(FeedEvent::Row(row))) => seen.push(row.describe()),
                Ok(Some(FeedEvent::Resolved(r))) => {
                    seen.push(format!("resolved {}", String::from_utf8_lossy(&r.payload)))
                }
                Ok(None) => panic!("mailbox feed never ends on its own"),
                Err(err) => return (seen, err),
            }
        }
    }

    #[tokio::test]
    async fn rows_before_failure_are_delivered_first() {
        let fx = Fixture::new();
        for id in 1..=3 {
            fx.mailbox
                .insert(MailboxRow::change("orders", "0", id, format!("[{id}]").as_bytes(), b"{}"));
        }
        fx.registry.fail(fx.job_id, "boom");

        let mut feed = fx.feed();
        let (rows, err) = drain_until_error(&mut feed).await;
        assert_eq!(rows, ["orders: [1]->{}", "orders: [2]->{}", "orders: [3]->{}"]);
        assert_eq!(err, FeedError::job_failed(fx.job_id, "boom"));
        assert_eq!(feed.err(), Some(&err));
        assert_eq!(feed.job().cached_error(), Some(&err));
    }

    #[tokio::test]
    async fn message_ids_are_ordered_per_partition() {
        let fx = Fixture::new();
        fx.mailbox.insert(MailboxRow::change("t", "1", 20, b"b", b"2"));
        fx.mailbox.insert(MailboxRow::change("t", "0", 7, b"c", b"3"));
        fx.mailbox.insert(MailboxRow::change("t", "1", 10, b"a", b"1"));

        let mut feed = fx.feed();
        let first = feed.next().await.unwrap().unwrap();
        assert_eq!(first.partition(), "0");

        // Later writes land in a fresh batch but still after earlier ids.
        fx.mailbox.insert(MailboxRow::change("t", "1", 30, b"d", b"4"));
        fx.registry.fail(fx.job_id, "stop");

        let (rows, _) = drain_until_error(&mut feed).await;
        assert_eq!(rows, ["t: a->1", "t: b->2", "t: d->4"]);
    }

    #[tokio::test]
    async fn null_columns_become_resolved_events_and_duplicates_drop() {
        let fx = Fixture::new();
        fx.mailbox
            .insert(MailboxRow::resolved("t", "2", 1, b"{\"resolved\":\"1.0\"}"));
        fx.mailbox.insert(MailboxRow::change("t", "2", 2, b"k", b"v"));
        fx.mailbox.insert(MailboxRow::change("t", "2", 3, b"k", b"v"));
        fx.registry.fail(fx.job_id, "done");

        let mut feed = fx.feed();
        let (rows, _) = drain_until_error(&mut feed).await;
        assert_eq!(rows, ["resolved {\"resolved\":\"1.0\"}", "t: k->v"]);
    }

    #[tokio::test]
    async fn empty_columns_are_still_a_row() {
        let fx = Fixture::new();
        fx.mailbox.insert(MailboxRow {
            topic: "t".to_string(),
            partition: "0".to_string(),
            message_id: 1,
            key: Some(Vec::new()),
            value: Some(Vec::new()),
            payload: None,
        });
        fx.mailbox.insert(MailboxRow::change("t", "0", 2, b"k", b""));
        fx.registry.fail(fx.job_id, "done");

        let mut feed = fx.feed();
        let first = feed.next().await.unwrap().unwrap();
        let row = first.as_row().unwrap();
        assert_eq!(row.key, Some(Vec::new()));
        assert_eq!(row.value, Some(Vec::new()));

        let second = feed.next().await.unwrap().unwrap();
        assert_eq!(second.as_row().unwrap().value, Some(Vec::new()));
    }

    #[tokio::test]
    async fn close_cancels_the_job() {
        let fx = Fixture::new();
        let mut feed = fx.feed();
        feed.close().await.unwrap();
        assert_eq!(fx.registry.get(fx.job_id), Some(JobStatus::Cancelled));

        // A second close does not try again, and a failing cancel is not an error.
        feed.close().await.unwrap();
        let mut other = fx.feed();
        other.close().await.unwrap();
        assert!(other.next().await.unwrap().is_none());
    }

    #[test]
    fn default_partitions() {
        let fx = Fixture::new();
        assert_eq!(fx.feed().partitions(), ["0", "1", "2"]);
    }
}
