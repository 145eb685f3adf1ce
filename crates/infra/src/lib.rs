//! Feed readers, the job error gate, and the pipeline harness.
//!
//! - `feeds`: readers over a streaming cursor, a mailbox table, and a sink directory
//! - `jobs`: job status lookup and the error gate feeds consult after each flush
//! - `pipeline`: a small discovery/emit/frontier pipeline used for end-to-end and
//!   throughput checks
//! - `config`: environment-driven settings

pub mod config;
pub mod feeds;
pub mod jobs;
pub mod pipeline;

mod pg;

pub use config::{FeedConfig, LogFormat};
