//! The change buffer between discovery and emission.

use feedcheck_core::{FeedError, FeedResult, Span, Timestamp};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

/// A discovered row change, already rendered to key/value bytes by the row converter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRow {
    pub topic: String,
    pub key: Vec<u8>,
    /// Empty for a deletion.
    pub value: Vec<u8>,
    pub updated: Timestamp,
}

/// Every change in `span` up to `ts` has been discovered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedSpan {
    pub span: Span,
    pub ts: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferEntry {
    Row(ChangeRow),
    Resolved(ResolvedSpan),
}

/// A bounded buffer of `capacity` entries. The reader sees end-of-stream once every writer
/// is dropped.
pub fn change_buffer(capacity: usize) -> (BufferWriter, BufferReader) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (BufferWriter { tx }, BufferReader { rx })
}

#[derive(Debug, Clone)]
pub struct BufferWriter {
    tx: mpsc::Sender<BufferEntry>,
}

impl BufferWriter {
    /// Appends an entry, waiting for space.
    pub async fn add(&self, entry: BufferEntry) -> FeedResult<()> {
        self.tx
            .send(entry)
            .await
            .map_err(|_| FeedError::transport("change buffer closed"))
    }
}

#[derive(Debug)]
pub struct BufferReader {
    rx: mpsc::Receiver<BufferEntry>,
}

impl BufferReader {
    /// Next entry, or `None` once the buffer is closed and empty.
    pub async fn recv(&mut self) -> Option<BufferEntry> {
        self.rx.recv().await
    }

    /// Next entry if one is ready right now.
    pub fn try_recv(&mut self) -> Option<BufferEntry> {
        match self.rx.try_recv() {
            Ok(entry) => Some(entry),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn closes_when_writers_drop() {
        let (writer, mut reader) = change_buffer(4);
        let row = ChangeRow {
            topic: "foo".to_string(),
            key: b"[1]".to_vec(),
            value: b"{}".to_vec(),
            updated: Timestamp::new(1, 0),
        };
        writer.add(BufferEntry::Row(row.clone())).await.unwrap();
        drop(writer);
        assert_eq!(reader.recv().await, Some(BufferEntry::Row(row)));
        assert_eq!(reader.recv().await, None);
    }

    #[tokio::test]
    async fn add_fails_once_reader_is_gone() {
        let (writer, reader) = change_buffer(1);
        drop(reader);
        let entry = BufferEntry::Resolved(ResolvedSpan {
            span: Span::new("a", "b").unwrap(),
            ts: Timestamp::new(1, 0),
        });
        assert!(matches!(writer.add(entry).await, Err(FeedError::Transport(_))));
    }
}
