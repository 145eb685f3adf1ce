//! Change discovery.

use async_trait::async_trait;
use feedcheck_core::{FeedError, FeedResult};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::buffer::{BufferEntry, BufferWriter};

/// Finds changes and appends them to the change buffer until done or cancelled.
///
/// Returning drops `buffer`; once every writer is gone the emit stage sees end-of-stream.
#[async_trait]
pub trait ChangeDiscovery: Send + 'static {
    async fn run(&mut self, buffer: BufferWriter, cancel: CancellationToken) -> FeedResult<()>;
}

/// Replays a fixed list of entries.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDiscovery {
    entries: Vec<BufferEntry>,
    fail_with: Option<FeedError>,
    hold_open: bool,
}

impl ScriptedDiscovery {
    pub fn new(entries: Vec<BufferEntry>) -> Self {
        Self {
            entries,
            ..Self::default()
        }
    }

    /// Fails with `err` after replaying every entry.
    pub fn then_fail(mut self, err: FeedError) -> Self {
        self.fail_with = Some(err);
        self
    }

    /// Keeps running after replay until cancelled, like a live poller.
    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }
}

#[async_trait]
impl ChangeDiscovery for ScriptedDiscovery {
    async fn run(&mut self, buffer: BufferWriter, cancel: CancellationToken) -> FeedResult<()> {
        let entries = std::mem::take(&mut self.entries);
        let total = entries.len();
        for entry in entries {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FeedError::Cancelled),
                added = buffer.add(entry) => added?,
            }
        }
        debug!(entries = total, "replayed discovery script");

        if let Some(err) = self.fail_with.take() {
            return Err(err);
        }
        if self.hold_open {
            cancel.cancelled().await;
            return Err(FeedError::Cancelled);
        }
        Ok(())
    }
}
