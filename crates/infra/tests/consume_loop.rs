//! End-to-end: pipeline output read back through the mailbox and file feeds.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use feedcheck_core::{FeedError, JobId, Span, Timestamp};
use feedcheck_events::{assert_payloads, expect_resolved_timestamp, skip_resolved_timestamps, FeedReader};
use feedcheck_infra::feeds::{FileFeed, InMemoryMailbox, MailboxFeed};
use feedcheck_infra::jobs::{FlushNotifier, InMemoryJobRegistry, JobErrorGate, JobStatus};
use feedcheck_infra::pipeline::{
    BufferEntry, ChangeRow, Envelope, JsonEncoder, MailboxSink, PipelineHarness, ResolvedSpan,
    ScriptedDiscovery,
};
use tempfile::TempDir;

fn partitions() -> Vec<String> {
    vec!["0".to_string(), "1".to_string()]
}

fn row(key: &str, value: &str) -> BufferEntry {
    BufferEntry::Row(ChangeRow {
        topic: "foo".to_string(),
        key: key.as_bytes().to_vec(),
        value: value.as_bytes().to_vec(),
        updated: Timestamp::new(1, 0),
    })
}

fn resolved(start: &str, end: &str, wall: i64) -> BufferEntry {
    BufferEntry::Resolved(ResolvedSpan {
        span: Span::new(start, end).unwrap(),
        ts: Timestamp::new(wall, 0),
    })
}

fn gate(registry: &Arc<InMemoryJobRegistry>, job_id: JobId, flush: FlushNotifier) -> JobErrorGate {
    registry.start(job_id);
    JobErrorGate::new(job_id, registry.clone(), flush).with_flush_wait(Duration::from_millis(5))
}

#[tokio::test]
async fn pipeline_output_reads_back_through_the_mailbox_feed() {
    let mailbox = Arc::new(InMemoryMailbox::new());
    let flush = FlushNotifier::new();
    let sink = Arc::new(MailboxSink::new(mailbox.clone(), partitions(), flush.clone()));

    let discovery = ScriptedDiscovery::new(vec![
        row("[1]", r#"{"a":1}"#),
        row("[2]", r#"{"a":2}"#),
        resolved("a", "m", 5),
        row("[1]", r#"{"a":1}"#),
        resolved("m", "z", 6),
    ]);
    let harness = PipelineHarness::new(
        Arc::new(JsonEncoder::new(Envelope::Row)),
        sink,
        [Span::new("a", "m").unwrap(), Span::new("m", "z").unwrap()],
    )
    .unwrap();
    harness.spawn(discovery).join().await.unwrap();

    let registry = Arc::new(InMemoryJobRegistry::new());
    let job_id = JobId::new(100);
    let mut feed =
        MailboxFeed::new(mailbox.clone(), gate(&registry, job_id, flush)).with_partitions(partitions());

    // Resolved records carry the empty topic and sort ahead of rows, one per partition.
    for _ in partitions() {
        assert_eq!(expect_resolved_timestamp(&mut feed).await.unwrap(), Timestamp::new(5, 0));
    }
    // The re-emitted [1] row is a duplicate and never shows up.
    assert_payloads(&mut feed, &[r#"foo: [2]->{"a":2}"#, r#"foo: [1]->{"a":1}"#])
        .await
        .unwrap();
    assert!(mailbox.is_empty());

    registry.fail(job_id, "sink unavailable");
    let err = skip_resolved_timestamps(&mut feed).await.unwrap_err();
    assert_eq!(err, FeedError::job_failed(job_id, "sink unavailable"));
    assert_eq!(feed.err(), Some(&err));
}

#[tokio::test]
async fn assert_payloads_reports_the_job_failure_when_rows_run_out() {
    let mailbox = Arc::new(InMemoryMailbox::new());
    let registry = Arc::new(InMemoryJobRegistry::new());
    let job_id = JobId::new(101);
    let mut feed = MailboxFeed::new(mailbox, gate(&registry, job_id, FlushNotifier::new()));
    registry.fail(job_id, "boom");

    let err = assert_payloads(&mut feed, &["foo: [1]->{}"]).await.unwrap_err();
    assert_eq!(err, FeedError::job_failed(job_id, "boom"));
}

#[tokio::test]
async fn file_feed_delivers_rows_then_the_sentinel() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join(format!("{:033}-orders-1-0.ndjson", 1)),
        "{\"id\":1}\n{\"id\":2}\n",
    )
    .unwrap();
    fs::write(
        dir.path().join(format!("{:033}.RESOLVED", 2)),
        "{\"resolved\":\"7.0000000003\"}",
    )
    .unwrap();

    let registry = Arc::new(InMemoryJobRegistry::new());
    let job_id = JobId::new(102);
    let mut feed = FileFeed::new(dir.path(), gate(&registry, job_id, FlushNotifier::new()));

    assert_payloads(&mut feed, &["orders: ->{\"id\":2}", "orders: ->{\"id\":1}"])
        .await
        .unwrap();
    assert_eq!(expect_resolved_timestamp(&mut feed).await.unwrap(), Timestamp::new(7, 3));

    feed.close().await.unwrap();
    assert_eq!(registry.get(job_id), Some(JobStatus::Cancelled));
    assert_eq!(feed.next().await, Ok(None));
}

#[tokio::test]
async fn a_row_where_a_resolved_timestamp_was_expected() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(format!("{:033}-orders-1-0.ndjson", 1)), "x\n").unwrap();

    let registry = Arc::new(InMemoryJobRegistry::new());
    let mut feed = FileFeed::new(
        dir.path(),
        gate(&registry, JobId::new(103), FlushNotifier::new()),
    );
    let err = expect_resolved_timestamp(&mut feed).await.unwrap_err();
    assert_eq!(err, FeedError::UnexpectedRow("orders: ->x".to_string()));
}
