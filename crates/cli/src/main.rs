//! Follows a file-sink directory and logs what arrives.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context;
use feedcheck_core::JobId;
use feedcheck_events::{decode_resolved, FeedEvent, FeedReader};
use feedcheck_infra::feeds::FileFeed;
use feedcheck_infra::jobs::{
    FlushNotifier, InMemoryJobRegistry, JobErrorGate, JobStatusSource, PgJobStatus,
};
use feedcheck_infra::{FeedConfig, LogFormat};
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

/// Job id used when no job is being watched; it stays running forever.
const LOCAL_JOB: JobId = JobId::new(0);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = FeedConfig::from_env().context("loading FEEDCHECK_* configuration")?;
    match config.log_format {
        LogFormat::Json => feedcheck_observability::init(),
        LogFormat::Pretty => feedcheck_observability::init_pretty(),
    }

    let dir = config
        .sink_dir
        .clone()
        .context("FEEDCHECK_SINK_DIR must name the sink directory to follow")?;
    let gate = job_gate(&config).await?;
    let mut feed = FileFeed::new(dir, gate);
    info!(
        feed_id = %feed.feed_id(),
        path = %feed.dir().display(),
        job_id = %feed.job().id(),
        "following sink directory"
    );

    let mut rows_by_topic: BTreeMap<String, u64> = BTreeMap::new();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let outcome = loop {
        let event = tokio::select! {
            _ = &mut shutdown => {
                info!("interrupted");
                break Ok(());
            }
            event = feed.next() => event,
        };
        match event {
            Ok(Some(FeedEvent::Row(row))) => {
                let count = rows_by_topic.entry(row.topic.clone()).or_default();
                *count += 1;
                info!(topic = %row.topic, count = *count, row = %row.describe(), "row");
            }
            Ok(Some(FeedEvent::Resolved(resolved))) => match decode_resolved(&resolved.payload) {
                Ok(ts) => info!(resolved = %ts, "resolved"),
                Err(err) => warn!(error = %err, "undecodable resolved payload"),
            },
            Ok(None) => break Ok(()),
            Err(err) => break Err(err),
        }
    };

    feed.close().await?;
    for (topic, rows) in &rows_by_topic {
        info!(%topic, rows, "topic total");
    }
    outcome.context("reading sink directory")
}

async fn job_gate(config: &FeedConfig) -> anyhow::Result<JobErrorGate> {
    let (job_id, source): (JobId, Arc<dyn JobStatusSource>) =
        match (&config.database_url, config.job_id) {
            (Some(url), Some(job_id)) => {
                let pool = PgPoolOptions::new()
                    .max_connections(2)
                    .connect(url)
                    .await
                    .context("connecting to the job database")?;
                let source: Arc<dyn JobStatusSource> = Arc::new(PgJobStatus::new(pool));
                (job_id, source)
            }
            (_, job_id) => {
                if job_id.is_some() {
                    warn!("FEEDCHECK_JOB_ID is set without FEEDCHECK_DATABASE_URL; not watching the job");
                }
                let registry = InMemoryJobRegistry::new();
                registry.start(LOCAL_JOB);
                let source: Arc<dyn JobStatusSource> = Arc::new(registry);
                (LOCAL_JOB, source)
            }
        };
    Ok(JobErrorGate::new(job_id, source, FlushNotifier::new()).with_flush_wait(config.flush_wait))
}
