//! Job status over a Postgres-wire connection pool.
//!
//! The producing cluster exposes jobs through `SHOW JOBS`, which can be queried as a
//! relation (`[SHOW JOBS]`), and accepts `CANCEL JOB <id>`.

use async_trait::async_trait;
use feedcheck_core::{FeedError, FeedResult, JobId};
use sqlx::{PgPool, Row};
use tracing::instrument;

use super::status::JobStatusSource;
use super::types::JobStatus;
use crate::pg::map_sqlx_error;

#[derive(Debug, Clone)]
pub struct PgJobStatus {
    pool: PgPool,
}

impl PgJobStatus {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStatusSource for PgJobStatus {
    #[instrument(skip(self, job_id), fields(job_id = %job_id), err)]
    async fn status(&self, job_id: JobId) -> FeedResult<JobStatus> {
        let row = sqlx::query("SELECT status, error FROM [SHOW JOBS] WHERE job_id = $1")
            .bind(job_id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("job_status", e))?
            .ok_or_else(|| FeedError::transport(format!("job {job_id} not found")))?;

        let status: String = row
            .try_get("status")
            .map_err(|e| map_sqlx_error("job_status", e))?;
        let error: Option<String> = row
            .try_get("error")
            .map_err(|e| map_sqlx_error("job_status", e))?;
        Ok(JobStatus::from_parts(&status, error.as_deref()))
    }

    #[instrument(skip(self, job_id), fields(job_id = %job_id), err)]
    async fn cancel(&self, job_id: JobId) -> FeedResult<()> {
        sqlx::query("CANCEL JOB $1")
            .bind(job_id.get())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("cancel_job", e))?;
        Ok(())
    }
}
