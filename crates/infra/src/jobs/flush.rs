//! Flush notifications from the producing sink.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

/// Signal raised by a sink after it flushes output to the transport.
///
/// Clones share the same signal. A notification raised while nobody waits is kept (one
/// permit), so a reader that starts waiting just after a flush still wakes immediately.
#[derive(Debug, Clone, Default)]
pub struct FlushNotifier {
    inner: Arc<Notify>,
}

impl FlushNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify(&self) {
        self.inner.notify_one();
    }

    /// Waits for the next flush, at most `timeout`. Returns true if a flush was signalled.
    pub async fn wait(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.inner.notified())
            .await
            .is_ok()
    }
}
