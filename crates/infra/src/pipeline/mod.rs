//! Miniature change pipeline for throughput measurement.
//!
//! ## Design
//!
//! - A [`ChangeDiscovery`] task appends rows and resolved spans to a bounded change buffer
//! - The [`EntryEmitter`] drains the buffer, encodes and emits rows through a [`Sink`], and
//!   flushes the sink before handing resolved spans on
//! - A foreground loop feeds resolved spans into a `SpanFrontier` and emits one resolved
//!   record each time the frontier advances
//! - Both tasks share a cancellation token; [`HarnessHandle::shutdown`] stops and joins both
//!   and reports the foreground error first
//!
//! ## Components
//!
//! - `buffer`: the change buffer and its entry types
//! - `encoder`: [`Encoder`] and the JSON implementation
//! - `sink`: [`Sink`], the benchmark sink and in-memory sinks
//! - `emitter`: the per-tick emit stage ([`Aggregator`])
//! - `harness`: task wiring and shutdown

pub mod buffer;
pub mod discovery;
pub mod emitter;
pub mod encoder;
pub mod harness;
pub mod sink;

pub use buffer::{change_buffer, BufferEntry, BufferReader, BufferWriter, ChangeRow, ResolvedSpan};
pub use discovery::{ChangeDiscovery, ScriptedDiscovery};
pub use emitter::{Aggregator, EntryEmitter};
pub use encoder::{Encoder, Envelope, JsonEncoder};
pub use harness::{emit_resolved_timestamp, run_frontier_loop, HarnessHandle, PipelineHarness};
pub use sink::{BenchCounts, BenchSink, EmittedRow, MailboxSink, MemorySink, Sink};
