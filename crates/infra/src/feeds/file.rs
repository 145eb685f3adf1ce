//! File feed: a directory written by a cloud-storage style sink.
//!
//! The sink writes one newline-delimited file per `(topic, batch)` plus `RESOLVED` sentinel
//! files. File names sort by the time they were written, and a sentinel sorts after every
//! data file it covers. Data file basenames look like
//! `<33 digits>-<topic>-<schema id>-<rest>`.
//!
//! Each walk visits every file in full-path order and skips anything at or before the last
//! sentinel already delivered. Data files written after that sentinel are re-read on every
//! walk until the next sentinel passes them; the deduplicator hides the repeats.

use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use async_trait::async_trait;
use feedcheck_core::{FeedError, FeedId, FeedResult};
use feedcheck_events::{Deduplicator, FeedEvent, FeedReader, FirstError, RowEvent};
use regex::Regex;
use tracing::{debug, info};

use crate::jobs::{JobErrorGate, JobHandle};

/// Partition label for file events; the file layout does not expose partitions.
pub const FILE_PARTITION: &str = "";

const RESOLVED_SUFFIX: &str = "RESOLVED";

static DATA_FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{33}-(.+?)-(\d+)-").expect("valid data file regex"));

/// Result of one directory walk.
#[derive(Debug, Default)]
struct Walk {
    events: Vec<FeedEvent>,
    marker: Option<String>,
}

/// Walks `dir`, skipping paths `<= marker`. Either the whole walk succeeds or nothing is
/// returned.
fn walk_dir(dir: &Path, marker: Option<String>) -> FeedResult<Walk> {
    let mut files = Vec::new();
    collect_files(dir, &mut files)?;
    files.sort();

    let mut walk = Walk {
        events: Vec::new(),
        marker,
    };
    for (path_str, path) in files {
        if walk.marker.as_deref().is_some_and(|m| path_str.as_str() <= m) {
            continue;
        }

        if path_str.ends_with(RESOLVED_SUFFIX) {
            let payload = fs::read(&path).map_err(|e| io_error(&path, e))?;
            walk.events
                .push(FeedEvent::resolved("", FILE_PARTITION, payload));
            walk.marker = Some(path_str);
            continue;
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let topic = DATA_FILE_RE
            .captures(&name)
            .map(|caps| caps[1].to_string())
            .ok_or_else(|| FeedError::malformed(format!("unexpected file: {path_str}")))?;

        let contents = fs::read(&path).map_err(|e| io_error(&path, e))?;
        for line in contents.split(|b| *b == b'\n') {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.is_empty() {
                continue;
            }
            walk.events.push(
                RowEvent::new(topic.as_str(), FILE_PARTITION, None, Some(line.to_vec())).into(),
            );
        }
    }
    Ok(walk)
}

/// Regular files under `dir`, recursively, as `(path string, path)`. A missing root is
/// treated as empty: the sink creates it lazily.
fn collect_files(dir: &Path, out: &mut Vec<(String, PathBuf)>) -> FeedResult<()> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(io_error(dir, e)),
    };
    for entry in entries {
        let entry = entry.map_err(|e| io_error(dir, e))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| io_error(&path, e))?;
        if file_type.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push((path.to_string_lossy().into_owned(), path));
        }
    }
    Ok(())
}

fn io_error(path: &Path, err: io::Error) -> FeedError {
    FeedError::transport(format!("{}: {err}", path.display()))
}

/// Reader over a sink directory, gated on its producing job.
pub struct FileFeed {
    feed_id: FeedId,
    dir: PathBuf,
    gate: JobErrorGate,
    pending: VecDeque<FeedEvent>,
    resolved_marker: Option<String>,
    seen: Deduplicator,
    first_error: FirstError,
    closed: bool,
}

impl FileFeed {
    pub fn new(dir: impl Into<PathBuf>, gate: JobErrorGate) -> Self {
        Self {
            feed_id: FeedId::new(),
            dir: dir.into(),
            gate,
            pending: VecDeque::new(),
            resolved_marker: None,
            seen: Deduplicator::new(),
            first_error: FirstError::default(),
            closed: false,
        }
    }

    pub fn feed_id(&self) -> FeedId {
        self.feed_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn job(&self) -> &JobHandle {
        self.gate.handle()
    }

    /// Path of the last sentinel delivered.
    pub fn resolved_marker(&self) -> Option<&str> {
        self.resolved_marker.as_deref()
    }

    async fn read(&mut self) -> FeedResult<Option<FeedEvent>> {
        loop {
            while let Some(event) = self.pending.pop_front() {
                if let FeedEvent::Row(row) = &event {
                    if self.seen.seen_row(row) {
                        continue;
                    }
                }
                return Ok(Some(event));
            }

            self.gate.fetch_error().await?;

            let dir = self.dir.clone();
            let marker = self.resolved_marker.clone();
            let walk = tokio::task::spawn_blocking(move || walk_dir(&dir, marker))
                .await
                .map_err(|e| FeedError::transport(format!("directory walk: {e}")))??;

            debug!(
                feed_id = %self.feed_id,
                path = %self.dir.display(),
                events = walk.events.len(),
                "walked sink directory"
            );
            self.resolved_marker = walk.marker;
            self.pending.extend(walk.events);
        }
    }
}

#[async_trait]
impl FeedReader for FileFeed {
    fn partitions(&self) -> Vec<String> {
        vec![FILE_PARTITION.to_string()]
    }

    async fn next(&mut self) -> FeedResult<Option<FeedEvent>> {
        self.first_error.check()?;
        if self.closed {
            return Ok(None);
        }
        let result = self.read().await;
        self.first_error.record(result)
    }

    fn err(&self) -> Option<&FeedError> {
        self.first_error.get()
    }

    async fn close(&mut self) -> FeedResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.pending.clear();
        let job_id = self.gate.handle().id();
        if let Err(err) = self.gate.cancel_job().await {
            info!(feed_id = %self.feed_id, %job_id, error = %err, "could not cancel feed job");
        }
        Ok(())
    }
}
