//! Error model for changefeed consumption.

use thiserror::Error;

use crate::id::JobId;

/// Result type used across the consumption layer.
pub type FeedResult<T> = Result<T, FeedError>;

/// Consumption-level error.
///
/// Every variant is fatal to the operation that produced it: readers stop at the first
/// error and keep reporting it from `err()`. Nothing here is retried internally.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FeedError {
    /// The underlying connection, query, cursor or file system failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The background job producing the feed reported a failure.
    #[error("job {job_id} failed: {message}")]
    JobFailed { job_id: JobId, message: String },

    /// A file or row did not match the expected naming/shape convention.
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// A span outside the tracked set was forwarded.
    #[error("frontier misuse: {0}")]
    FrontierMisuse(String),

    /// A span was constructed with `start >= end`.
    #[error("invalid span: {0}")]
    InvalidSpan(String),

    /// A payload (resolved timestamp, encoded row) could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),

    /// The feed ended before the caller got what it asked for.
    #[error("feed exhausted: {0}")]
    Exhausted(String),

    /// A row change arrived where only resolved notifications were expected.
    #[error("unexpected row {0}")]
    UnexpectedRow(String),

    /// The rows read from a feed differ from the expected set.
    #[error("expected\n  {}\ngot\n  {}", expected.join("\n  "), actual.join("\n  "))]
    PayloadMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    /// The operation was stopped through its cancellation token.
    #[error("cancelled")]
    Cancelled,
}

impl FeedError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn job_failed(job_id: JobId, msg: impl Into<String>) -> Self {
        Self::JobFailed {
            job_id,
            message: msg.into(),
        }
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedRecord(msg.into())
    }

    pub fn frontier_misuse(msg: impl Into<String>) -> Self {
        Self::FrontierMisuse(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn exhausted(msg: impl Into<String>) -> Self {
        Self::Exhausted(msg.into())
    }

    /// True for the generic cancellation result (as opposed to a real failure).
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<std::io::Error> for FeedError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}
