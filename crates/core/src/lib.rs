//! `feedcheck-core`: value types shared by every changefeed consumer.
//!
//! This crate contains **pure** primitives (no IO): key spans, hybrid-logical-clock
//! timestamps, identifiers and the error taxonomy used across the workspace.

pub mod error;
pub mod id;
pub mod span;
pub mod timestamp;

pub use error::{FeedError, FeedResult};
pub use id::{FeedId, JobId};
pub use span::Span;
pub use timestamp::Timestamp;
