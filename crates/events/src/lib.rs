//! `feedcheck-events`: the normalized event model every feed reader produces.
//!
//! Transports differ (a live cursor, a mailbox table, a directory of files) but all of
//! them surface the same [`FeedEvent`] union through the [`FeedReader`] trait. This crate
//! also holds the redelivery filter and the resolved-timestamp payload codec, which are
//! transport-independent.

pub mod consume;
pub mod dedup;
pub mod event;
pub mod reader;
pub mod resolved;

pub use consume::{assert_payloads, expect_resolved_timestamp, skip_resolved_timestamps};
pub use dedup::{Deduplicator, SeenKey};
pub use event::{FeedEvent, ResolvedEvent, RowEvent};
pub use reader::{FeedReader, FirstError};
pub use resolved::{decode_resolved, encode_resolved};
