//! Background job status and the job error gate.
//!
//! ## Design
//!
//! - The job producing a feed runs elsewhere; readers only observe it through a
//!   [`JobStatusSource`] (status query + cancel)
//! - A failed job may still have output in flight. The [`JobErrorGate`] makes readers
//!   drain one more transport cycle after the failure is first observed, so every record
//!   flushed before the job stopped is delivered before the error
//! - Polling between cycles is paced by a [`FlushNotifier`] that the producing sink
//!   signals after each flush, with a short timeout as a fallback
//!
//! ## Components
//!
//! - `JobStatus` / `JobHandle`: what the reader knows about its job
//! - `InMemoryJobRegistry`: test double driven directly by the test
//! - `PgJobStatus`: `SHOW JOBS` / `CANCEL JOB` over a Postgres-wire connection pool

pub mod flush;
pub mod gate;
pub mod postgres;
pub mod status;
pub mod types;

pub use flush::FlushNotifier;
pub use gate::JobErrorGate;
pub use postgres::PgJobStatus;
pub use status::{InMemoryJobRegistry, JobStatusSource};
pub use types::{JobHandle, JobStatus};
