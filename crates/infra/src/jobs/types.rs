//! Job status and the reader-side job handle.

use feedcheck_core::{FeedError, JobId};
use serde::{Deserialize, Serialize};

/// Status of the background job producing a feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Queued, not yet running
    Pending,
    Running,
    /// Paused by an operator; may resume
    Paused,
    Succeeded,
    /// Stopped with an error message
    Failed { error: String },
    Cancelled,
}

impl JobStatus {
    /// Builds a status from the `(status, error)` columns a scheduler reports.
    ///
    /// A non-empty error wins over whatever the status column says: jobs report their error
    /// before they finish transitioning to a terminal state.
    pub fn from_parts(status: &str, error: Option<&str>) -> Self {
        if let Some(error) = error.filter(|e| !e.is_empty()) {
            return Self::Failed {
                error: error.to_string(),
            };
        }
        match status.trim().to_ascii_lowercase().as_str() {
            "pending" => Self::Pending,
            "paused" => Self::Paused,
            "succeeded" => Self::Succeeded,
            "canceled" | "cancelled" => Self::Cancelled,
            "failed" => Self::Failed {
                error: "job failed without an error message".to_string(),
            },
            _ => Self::Running,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed { .. } | JobStatus::Cancelled
        )
    }

    /// The failure message, if the job failed.
    pub fn failure(&self) -> Option<&str> {
        match self {
            JobStatus::Failed { error } => Some(error),
            _ => None,
        }
    }
}

/// What a reader knows about its job: the id and, once observed, the failure.
///
/// The cached error is set at most once and never cleared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    id: JobId,
    cached_error: Option<FeedError>,
}

impl JobHandle {
    pub fn new(id: JobId) -> Self {
        Self {
            id,
            cached_error: None,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn cached_error(&self) -> Option<&FeedError> {
        self.cached_error.as_ref()
    }

    /// Stores `err` unless an error is already cached. Returns true if it was stored.
    pub(crate) fn cache_error(&mut self, err: FeedError) -> bool {
        if self.cached_error.is_some() {
            return false;
        }
        self.cached_error = Some(err);
        true
    }
}
