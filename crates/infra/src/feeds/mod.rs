//! Transport-specific feed readers.
//!
//! Each reader normalizes one delivery mechanism into [`feedcheck_events::FeedEvent`]s:
//!
//! - [`StreamFeed`]: a live, order-preserving row cursor; no job involved
//! - [`MailboxFeed`]: a table drained destructively in `(topic, partition, message_id)` order
//! - [`FileFeed`]: a directory of data files and `RESOLVED` sentinels
//!
//! Mailbox and file readers are paired with a [`crate::jobs::JobErrorGate`] so that a job
//! failure is only surfaced after the output it flushed has been read.

pub mod file;
pub mod mailbox;
pub mod stream;

pub use file::{FileFeed, FILE_PARTITION};
pub use mailbox::{InMemoryMailbox, Mailbox, MailboxFeed, MailboxRow, PgMailbox};
pub use stream::{ChannelCursor, PgRowCursor, RowCursor, StreamFeed, StreamRow, STREAM_PARTITION};
