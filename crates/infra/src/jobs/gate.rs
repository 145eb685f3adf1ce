//! The job error gate.
//!
//! Readers call [`JobErrorGate::fetch_error`] before every transport cycle:
//!
//! 1. If a failure is already cached, it is returned and the reader stops
//! 2. Otherwise the gate waits for a flush notification (bounded by `flush_wait`) and
//!    queries the job status once
//! 3. A newly observed failure is cached but *not* returned: the reader performs one more
//!    cycle, which picks up everything the job flushed before it stopped, and only the
//!    next call surfaces the error

use std::sync::Arc;
use std::time::Duration;

use feedcheck_core::{FeedError, FeedResult, JobId};
use tracing::{debug, warn};

use super::flush::FlushNotifier;
use super::status::JobStatusSource;
use super::types::JobHandle;

pub const DEFAULT_FLUSH_WAIT: Duration = Duration::from_millis(30);

pub struct JobErrorGate {
    handle: JobHandle,
    source: Arc<dyn JobStatusSource>,
    flush: FlushNotifier,
    flush_wait: Duration,
}

impl JobErrorGate {
    pub fn new(job_id: JobId, source: Arc<dyn JobStatusSource>, flush: FlushNotifier) -> Self {
        Self {
            handle: JobHandle::new(job_id),
            source,
            flush,
            flush_wait: DEFAULT_FLUSH_WAIT,
        }
    }

    pub fn with_flush_wait(mut self, flush_wait: Duration) -> Self {
        self.flush_wait = flush_wait;
        self
    }

    pub fn handle(&self) -> &JobHandle {
        &self.handle
    }

    /// `Err` means the reader must stop: either the cached job failure or a failed status
    /// query. `Ok` means run another transport cycle.
    pub async fn fetch_error(&mut self) -> FeedResult<()> {
        if let Some(err) = self.handle.cached_error() {
            return Err(err.clone());
        }

        let flushed = self.flush.wait(self.flush_wait).await;
        let job_id = self.handle.id();
        let status = self.source.status(job_id).await?;
        debug!(%job_id, flushed, ?status, "polled job status");

        if let Some(message) = status.failure() {
            warn!(%job_id, error = message, "job failed; draining remaining output");
            self.handle
                .cache_error(FeedError::job_failed(job_id, message));
        }
        Ok(())
    }

    /// Cancels the job. Failures are returned to the caller, which decides whether they
    /// matter.
    pub async fn cancel_job(&self) -> FeedResult<()> {
        self.source.cancel(self.handle.id()).await
    }
}

impl core::fmt::Debug for JobErrorGate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("JobErrorGate")
            .field("handle", &self.handle)
            .field("flush_wait", &self.flush_wait)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::InMemoryJobRegistry;

    fn gate(registry: &Arc<InMemoryJobRegistry>, id: JobId) -> JobErrorGate {
        JobErrorGate::new(id, registry.clone(), FlushNotifier::new())
            .with_flush_wait(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn failure_is_withheld_for_one_cycle() {
        let registry = Arc::new(InMemoryJobRegistry::new());
        let id = JobId::new(3);
        registry.start(id);
        let mut gate = gate(&registry, id);

        assert!(gate.fetch_error().await.is_ok());
        registry.fail(id, "boom");

        // First observation caches, does not surface.
        assert!(gate.fetch_error().await.is_ok());
        assert!(gate.handle().cached_error().is_some());

        let err = gate.fetch_error().await.unwrap_err();
        assert_eq!(err, FeedError::job_failed(id, "boom"));
    }

    #[tokio::test]
    async fn cached_error_survives_status_changes() {
        let registry = Arc::new(InMemoryJobRegistry::new());
        let id = JobId::new(4);
        registry.fail(id, "first");
        let mut gate = gate(&registry, id);
        gate.fetch_error().await.unwrap();

        registry.fail(id, "second");
        assert_eq!(
            gate.fetch_error().await.unwrap_err(),
            FeedError::job_failed(id, "first")
        );
    }

    #[tokio::test]
    async fn status_query_failure_is_returned_directly() {
        let registry = Arc::new(InMemoryJobRegistry::new());
        let mut gate = gate(&registry, JobId::new(99));
        assert!(matches!(
            gate.fetch_error().await,
            Err(FeedError::Transport(_))
        ));
        assert!(gate.handle().cached_error().is_none());
    }

    #[tokio::test]
    async fn flush_signal_cuts_the_wait_short() {
        let registry = Arc::new(InMemoryJobRegistry::new());
        let id = JobId::new(5);
        registry.start(id);
        let flush = FlushNotifier::new();
        let mut gate = JobErrorGate::new(id, registry.clone(), flush.clone())
            .with_flush_wait(Duration::from_secs(30));

        flush.notify();
        tokio::time::timeout(Duration::from_secs(5), gate.fetch_error())
            .await
            .expect("flush should wake the gate")
            .unwrap();
    }
}
