//! Job status sources.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use feedcheck_core::{FeedError, FeedResult, JobId};

use super::types::JobStatus;

/// Read access to a job's status, plus cancellation.
#[async_trait]
pub trait JobStatusSource: Send + Sync {
    async fn status(&self, job_id: JobId) -> FeedResult<JobStatus>;

    async fn cancel(&self, job_id: JobId) -> FeedResult<()>;
}

#[async_trait]
impl<S: JobStatusSource + ?Sized> JobStatusSource for Arc<S> {
    async fn status(&self, job_id: JobId) -> FeedResult<JobStatus> {
        (**self).status(job_id).await
    }

    async fn cancel(&self, job_id: JobId) -> FeedResult<()> {
        (**self).cancel(job_id).await
    }
}

/// In-memory job table for tests and local runs.
#[derive(Debug, Default)]
pub struct InMemoryJobRegistry {
    jobs: RwLock<HashMap<JobId, JobStatus>>,
}

impl InMemoryJobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a running job.
    pub fn start(&self, job_id: JobId) {
        self.set(job_id, JobStatus::Running);
    }

    pub fn set(&self, job_id: JobId, status: JobStatus) {
        self.jobs.write().unwrap().insert(job_id, status);
    }

    pub fn fail(&self, job_id: JobId, error: impl Into<String>) {
        self.set(
            job_id,
            JobStatus::Failed {
                error: error.into(),
            },
        );
    }

    pub fn get(&self, job_id: JobId) -> Option<JobStatus> {
        self.jobs.read().unwrap().get(&job_id).cloned()
    }
}

#[async_trait]
impl JobStatusSource for InMemoryJobRegistry {
    async fn status(&self, job_id: JobId) -> FeedResult<JobStatus> {
        self.get(job_id)
            .ok_or_else(|| FeedError::transport(format!("job {job_id} not found")))
    }

    async fn cancel(&self, job_id: JobId) -> FeedResult<()> {
        let mut jobs = self.jobs.write().unwrap();
        match jobs.get_mut(&job_id) {
            Some(status) if status.is_terminal() => Err(FeedError::transport(format!(
                "job {job_id} is already {status:?}"
            ))),
            Some(status) => {
                *status = JobStatus::Cancelled;
                Ok(())
            }
            None => Err(FeedError::transport(format!("job {job_id} not found"))),
        }
    }
}
