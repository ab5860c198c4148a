//! Training metrics and logging.
//!
//! ## Sinks
//!
//! - [`LogSink`]: scalars through the `log` facade
//! - [`CsvSink`]: one metric per CSV row, e.g. evaluation returns
//! - [`MemorySink`]: in-memory record, used by tests and callers that plot
//! - [`MultiSink`]: fan-out to several sinks
//!
//! ## Progress
//!
//! - [`TrainingProgress`]: env-step, update and episode counters

pub mod progress;
pub mod sink;

pub use progress::TrainingProgress;
pub use sink::{CsvSink, LogSink, MemorySink, MetricsSink, MultiSink, EVAL_RETURN};
