//! Event sink system for observability.
//!
//! The scheduler reports lifecycle transitions to the pipeline's
//! [`EventSink`]. Event payloads are JSON objects that always carry the
//! pipeline name and run id, plus a `step` field for step events.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// A run started.
pub const PIPELINE_STARTED: &str = "pipeline.started";
/// A run finished with every step succeeded or skipped.
pub const PIPELINE_COMPLETED: &str = "pipeline.completed";
/// A run finished after a terminal step failure.
pub const PIPELINE_FAILED: &str = "pipeline.failed";
/// A run was aborted by its timeout.
pub const PIPELINE_TIMEOUT: &str = "pipeline.timeout";
/// A step was dispatched.
pub const STEP_STARTED: &str = "step.started";
/// A step succeeded.
pub const STEP_COMPLETED: &str = "step.completed";
/// A step's condition evaluated false.
pub const STEP_SKIPPED: &str = "step.skipped";
/// A step attempt failed and will be retried.
pub const STEP_RETRYING: &str = "step.retrying";
/// A step failed terminally.
pub const STEP_FAILED: &str = "step.failed";
