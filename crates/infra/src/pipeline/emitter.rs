//! The emit stage: buffer entries out to the sink.

use std::sync::Arc;

use async_trait::async_trait;
use feedcheck_core::{FeedError, FeedResult};
use tokio_util::sync::CancellationToken;

use super::buffer::{BufferEntry, BufferReader, ResolvedSpan};
use super::encoder::Encoder;
use super::sink::Sink;

/// Produces batches of resolved spans for the frontier loop.
#[async_trait]
pub trait Aggregator: Send {
    /// Waits for work and handles one batch. `Ok(None)` means no more input will arrive.
    async fn tick(&mut self, cancel: &CancellationToken) -> FeedResult<Option<Vec<ResolvedSpan>>>;
}

const DEFAULT_MAX_BATCH: usize = 512;

/// Emits rows from the change buffer and collects resolved spans.
///
/// Rows covered by a resolved span must be durable before the frontier moves, so the sink
/// is flushed before any batch containing resolved spans is returned.
pub struct EntryEmitter<E, S> {
    buffer: BufferReader,
    encoder: Arc<E>,
    sink: Arc<S>,
    max_batch: usize,
}

impl<E: Encoder, S: Sink> EntryEmitter<E, S> {
    pub fn new(buffer: BufferReader, encoder: Arc<E>, sink: Arc<S>) -> Self {
        Self {
            buffer,
            encoder,
            sink,
            max_batch: DEFAULT_MAX_BATCH,
        }
    }

    /// Caps how many buffered entries one tick handles.
    pub fn with_max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch.max(1);
        self
    }
}

async fn emit_entry<E, S>(
    encoder: &E,
    sink: &S,
    entry: BufferEntry,
    resolved: &mut Vec<ResolvedSpan>,
) -> FeedResult<()>
where
    E: Encoder + ?Sized,
    S: Sink + ?Sized,
{
    match entry {
        BufferEntry::Row(row) => {
            let key = encoder.encode_key(&row)?;
            let value = encoder.encode_value(&row)?;
            sink.emit_row(&row.topic, &key, &value).await
        }
        BufferEntry::Resolved(span) => {
            resolved.push(span);
            Ok(())
        }
    }
}

#[async_trait]
impl<E: Encoder, S: Sink> Aggregator for EntryEmitter<E, S> {
    async fn tick(&mut self, cancel: &CancellationToken) -> FeedResult<Option<Vec<ResolvedSpan>>> {
        let first = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FeedError::Cancelled),
            entry = self.buffer.recv() => entry,
        };
        let Some(first) = first else {
            return Ok(None);
        };

        let mut resolved = Vec::new();
        emit_entry(&*self.encoder, &*self.sink, first, &mut resolved).await?;
        for _ in 1..self.max_batch {
            let Some(entry) = self.buffer.try_recv() else {
                break;
            };
            emit_entry(&*self.encoder, &*self.sink, entry, &mut resolved).await?;
        }

        if !resolved.is_empty() {
            self.sink.flush().await?;
        }
        Ok(Some(resolved))
    }
}
