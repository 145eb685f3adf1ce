//! Output sinks.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use feedcheck_core::FeedResult;

use crate::feeds::{InMemoryMailbox, MailboxRow};
use crate::jobs::FlushNotifier;

#[async_trait]
pub trait Sink: Send + Sync {
    async fn emit_row(&self, topic: &str, key: &[u8], value: &[u8]) -> FeedResult<()>;

    async fn emit_resolved(&self, payload: &[u8]) -> FeedResult<()>;

    /// Makes everything emitted so far durable.
    async fn flush(&self) -> FeedResult<()>;

    async fn close(&self) -> FeedResult<()>;
}

#[async_trait]
impl<S: Sink + ?Sized> Sink for Arc<S> {
    async fn emit_row(&self, topic: &str, key: &[u8], value: &[u8]) -> FeedResult<()> {
        (**self).emit_row(topic, key, value).await
    }

    async fn emit_resolved(&self, payload: &[u8]) -> FeedResult<()> {
        (**self).emit_resolved(payload).await
    }

    async fn flush(&self) -> FeedResult<()> {
        (**self).flush().await
    }

    async fn close(&self) -> FeedResult<()> {
        (**self).close().await
    }
}

/// Emission counters accumulated by a [`BenchSink`] since the last wait.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BenchCounts {
    pub emits: u64,
    /// Key plus value bytes for rows, payload bytes for resolved records.
    pub bytes: u64,
}

/// Discards output, counting emissions for throughput measurement.
#[derive(Debug, Default)]
pub struct BenchSink {
    counts: Mutex<BenchCounts>,
    emitted: Condvar,
}

impl BenchSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until at least one emission happened, then returns and resets the counters.
    pub fn wait_for_emit(&self) -> BenchCounts {
        let mut counts = self.counts.lock().unwrap();
        while counts.emits == 0 {
            counts = self.emitted.wait(counts).unwrap();
        }
        std::mem::take(&mut *counts)
    }

    /// Like [`Self::wait_for_emit`], giving up after `timeout`.
    pub fn wait_for_emit_timeout(&self, timeout: Duration) -> Option<BenchCounts> {
        let counts = self.counts.lock().unwrap();
        let (mut counts, _) = self
            .emitted
            .wait_timeout_while(counts, timeout, |c| c.emits == 0)
            .unwrap();
        (counts.emits > 0).then(|| std::mem::take(&mut *counts))
    }

    fn record(&self, bytes: usize) {
        let mut counts = self.counts.lock().unwrap();
        counts.emits += 1;
        counts.bytes += bytes as u64;
        self.emitted.notify_all();
    }
}

#[async_trait]
impl Sink for BenchSink {
    async fn emit_row(&self, _topic: &str, key: &[u8], value: &[u8]) -> FeedResult<()> {
        self.record(key.len() + value.len());
        Ok(())
    }

    async fn emit_resolved(&self, payload: &[u8]) -> FeedResult<()> {
        self.record(payload.len());
        Ok(())
    }

    async fn flush(&self) -> FeedResult<()> {
        Ok(())
    }

    async fn close(&self) -> FeedResult<()> {
        Ok(())
    }
}

/// One row recorded by a [`MemorySink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedRow {
    pub topic: String,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

#[derive(Debug, Default)]
struct MemoryState {
    rows: Vec<EmittedRow>,
    resolved: Vec<Vec<u8>>,
    flushes: usize,
    closed: bool,
}

/// Records everything it is given.
#[derive(Debug, Default)]
pub struct MemorySink {
    state: Mutex<MemoryState>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> Vec<EmittedRow> {
        self.state.lock().unwrap().rows.clone()
    }

    pub fn resolved(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().resolved.clone()
    }

    pub fn flushes(&self) -> usize {
        self.state.lock().unwrap().flushes
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }
}

#[async_trait]
impl Sink for MemorySink {
    async fn emit_row(&self, topic: &str, key: &[u8], value: &[u8]) -> FeedResult<()> {
        self.state.lock().unwrap().rows.push(EmittedRow {
            topic: topic.to_string(),
            key: key.to_vec(),
            value: value.to_vec(),
        });
        Ok(())
    }

    async fn emit_resolved(&self, payload: &[u8]) -> FeedResult<()> {
        self.state.lock().unwrap().resolved.push(payload.to_vec());
        Ok(())
    }

    async fn flush(&self) -> FeedResult<()> {
        self.state.lock().unwrap().flushes += 1;
        Ok(())
    }

    async fn close(&self) -> FeedResult<()> {
        self.state.lock().unwrap().closed = true;
        Ok(())
    }
}

/// Writes into an [`InMemoryMailbox`] the way a table sink would.
///
/// Rows go to a partition chosen from the key; resolved records go to every partition,
/// since a reader of any single partition must see them. Message ids increase per
/// `(topic, partition)`. Every flush raises the [`FlushNotifier`].
#[derive(Debug)]
pub struct MailboxSink {
    mailbox: Arc<InMemoryMailbox>,
    partitions: Vec<String>,
    flush: FlushNotifier,
    next_ids: Mutex<HashMap<(String, String), i64>>,
}

impl MailboxSink {
    pub fn new(mailbox: Arc<InMemoryMailbox>, partitions: Vec<String>, flush: FlushNotifier) -> Self {
        Self {
            mailbox,
            partitions,
            flush,
            next_ids: Mutex::new(HashMap::new()),
        }
    }

    fn next_id(&self, topic: &str, partition: &str) -> i64 {
        let mut ids = self.next_ids.lock().unwrap();
        let id = ids
            .entry((topic.to_string(), partition.to_string()))
            .or_insert(0);
        *id += 1;
        *id
    }

    fn partition_for(&self, key: &[u8]) -> &str {
        if self.partitions.is_empty() {
            return "0";
        }
        let hash = key
            .iter()
            .fold(0u64, |h, b| h.wrapping_mul(31).wrapping_add(u64::from(*b)));
        &self.partitions[(hash % self.partitions.len() as u64) as usize]
    }
}

#[async_trait]
impl Sink for MailboxSink {
    async fn emit_row(&self, topic: &str, key: &[u8], value: &[u8]) -> FeedResult<()> {
        let partition = self.partition_for(key);
        let id = self.next_id(topic, partition);
        self.mailbox
            .insert(MailboxRow::change(topic, partition, id, key, value));
        Ok(())
    }

    async fn emit_resolved(&self, payload: &[u8]) -> FeedResult<()> {
        for partition in &self.partitions {
            let id = self.next_id("", partition);
            self.mailbox
                .insert(MailboxRow::resolved("", partition.as_str(), id, payload));
        }
        Ok(())
    }

    async fn flush(&self) -> FeedResult<()> {
        self.flush.notify();
        Ok(())
    }

    async fn close(&self) -> FeedResult<()> {
        self.flush.notify();
        Ok(())
    }
}
