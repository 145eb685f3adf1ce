//! Task wiring for the pipeline: discovery in one task, emit and frontier tracking in another.

use std::sync::Arc;

use feedcheck_core::{FeedError, FeedResult, Span, Timestamp};
use feedcheck_frontier::SpanFrontier;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::buffer::change_buffer;
use super::discovery::ChangeDiscovery;
use super::emitter::{Aggregator, EntryEmitter};
use super::encoder::Encoder;
use super::sink::Sink;

const DEFAULT_BUFFER_CAPACITY: usize = 1024;

/// Encodes `ts` as a resolved record covering every topic and hands it to the sink.
pub async fn emit_resolved_timestamp<E, S>(encoder: &E, sink: &S, ts: Timestamp) -> FeedResult<()>
where
    E: Encoder + ?Sized,
    S: Sink + ?Sized,
{
    let payload = encoder.encode_resolved("", ts)?;
    sink.emit_resolved(&payload).await
}

/// Drives `aggregator` until its input ends, forwarding every resolved span into `frontier`.
///
/// Each time the frontier advances a resolved record is emitted and the new value published on
/// `progress`. Returns `Ok(())` once the aggregator reports no more input.
pub async fn run_frontier_loop<A, E, S>(
    aggregator: &mut A,
    frontier: &mut SpanFrontier,
    encoder: &E,
    sink: &S,
    cancel: &CancellationToken,
    progress: &watch::Sender<Timestamp>,
) -> FeedResult<()>
where
    A: Aggregator + ?Sized,
    E: Encoder + ?Sized,
    S: Sink + ?Sized,
{
    loop {
        if cancel.is_cancelled() {
            return Err(FeedError::Cancelled);
        }
        let Some(spans) = aggregator.tick(cancel).await? else {
            return Ok(());
        };
        for resolved in spans {
            if frontier.forward(&resolved.span, resolved.ts)? {
                let ts = frontier.frontier();
                emit_resolved_timestamp(encoder, sink, ts).await?;
                progress.send_replace(ts);
                debug!(frontier = %ts, "frontier advanced");
            }
        }
    }
}

/// Builds and starts a pipeline over a fixed set of spans.
pub struct PipelineHarness<E, S> {
    encoder: Arc<E>,
    sink: Arc<S>,
    frontier: SpanFrontier,
    buffer_capacity: usize,
}

impl<E, S> PipelineHarness<E, S>
where
    E: Encoder + 'static,
    S: Sink + 'static,
{
    /// Fails if `spans` overlap or any span is empty.
    pub fn new(
        encoder: Arc<E>,
        sink: Arc<S>,
        spans: impl IntoIterator<Item = Span>,
    ) -> FeedResult<Self> {
        Ok(Self {
            encoder,
            sink,
            frontier: SpanFrontier::new(spans)?,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        })
    }

    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    /// Spawns the discovery and foreground tasks. Must be called from within a tokio runtime.
    pub fn spawn<D: ChangeDiscovery>(self, discovery: D) -> HarnessHandle {
        let Self {
            encoder,
            sink,
            mut frontier,
            buffer_capacity,
        } = self;

        let cancel = CancellationToken::new();
        let (writer, reader) = change_buffer(buffer_capacity);
        let (progress_tx, progress_rx) = watch::channel(frontier.frontier());

        let discovery_task = {
            let cancel = cancel.clone();
            let mut discovery = discovery;
            tokio::spawn(async move { discovery.run(writer, cancel).await })
        };

        let foreground_task = {
            let cancel = cancel.clone();
            let sink = sink.clone();
            tokio::spawn(async move {
                let mut emitter = EntryEmitter::new(reader, encoder.clone(), sink.clone());
                let result = run_frontier_loop(
                    &mut emitter,
                    &mut frontier,
                    &*encoder,
                    &*sink,
                    &cancel,
                    &progress_tx,
                )
                .await;
                if let Err(err) = &result {
                    if !err.is_cancelled() {
                        warn!(error = %err, "pipeline foreground failed");
                        cancel.cancel();
                    }
                }
                result
            })
        };

        info!(buffer_capacity, "pipeline started");
        HarnessHandle {
            cancel,
            discovery: Some(discovery_task),
            foreground: Some(foreground_task),
            progress: progress_rx,
            sink,
        }
    }
}

/// A running pipeline.
///
/// Finish with [`HarnessHandle::shutdown`] or [`HarnessHandle::join`]: only those wait for
/// both tasks and close the sink. Dropping the handle just cancels the tasks and leaves them
/// to wind down detached, with the sink unclosed.
#[must_use = "await `shutdown` or `join` to stop the tasks and close the sink"]
pub struct HarnessHandle {
    cancel: CancellationToken,
    discovery: Option<JoinHandle<FeedResult<()>>>,
    foreground: Option<JoinHandle<FeedResult<()>>>,
    progress: watch::Receiver<Timestamp>,
    sink: Arc<dyn Sink>,
}

impl HarnessHandle {
    /// The latest frontier published by the foreground task.
    pub fn frontier(&self) -> Timestamp {
        *self.progress.borrow()
    }

    pub fn progress(&self) -> watch::Receiver<Timestamp> {
        self.progress.clone()
    }

    /// Waits until the frontier reaches at least `ts`.
    ///
    /// Fails with [`FeedError::Exhausted`] if the foreground stops first.
    pub async fn wait_for_frontier(&self, ts: Timestamp) -> FeedResult<Timestamp> {
        let mut progress = self.progress.clone();
        let reached = progress
            .wait_for(|frontier| *frontier >= ts)
            .await
            .map_err(|_| FeedError::exhausted(format!("pipeline stopped before frontier {ts}")))?;
        Ok(*reached)
    }

    /// Cancels both tasks and waits for them.
    pub async fn shutdown(self) -> FeedResult<()> {
        self.cancel.cancel();
        self.finish().await
    }

    /// Waits for the pipeline to run to completion on its own.
    pub async fn join(self) -> FeedResult<()> {
        self.finish().await
    }

    /// Joins the foreground, then stops and joins discovery, then closes the sink.
    ///
    /// Reports the foreground's error first, then discovery's, then the sink's. Cancellation
    /// is not an error here.
    async fn finish(mut self) -> FeedResult<()> {
        let foreground = join_task(self.foreground.take()).await;
        self.cancel.cancel();
        let discovery = join_task(self.discovery.take()).await;
        let closed = self.sink.close().await;

        let foreground = ignore_cancelled(foreground);
        let discovery = ignore_cancelled(discovery);
        if let Err(err) = &discovery {
            debug!(error = %err, "discovery failed");
        }
        foreground.and(discovery).and(closed)?;
        info!(frontier = %self.frontier(), "pipeline stopped");
        Ok(())
    }
}

impl Drop for HarnessHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn join_task(task: Option<JoinHandle<FeedResult<()>>>) -> FeedResult<()> {
    match task {
        Some(task) => task.await.map_err(panicked)?,
        None => Ok(()),
    }
}

fn panicked(err: JoinError) -> FeedError {
    FeedError::transport(format!("pipeline task failed: {err}"))
}

fn ignore_cancelled(result: FeedResult<()>) -> FeedResult<()> {
    match result {
        Err(err) if err.is_cancelled() => Ok(()),
        other => other,
    }
}
