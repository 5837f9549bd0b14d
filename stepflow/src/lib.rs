//! # Stepflow
//!
//! A dependency-driven workflow engine.
//!
//! Stepflow executes a set of named steps in an order that respects their
//! declared dependencies, with support for:
//!
//! - **Sequential or parallel execution**: steps start the moment their
//!   dependencies are satisfied, optionally capped by a concurrency limit
//! - **Retries and a pipeline timeout**: per-step attempts with configurable
//!   backoff, and a deadline for the whole run
//! - **Data flow**: transforms build a step's params from earlier results,
//!   conditions skip steps without failing the run
//! - **Composition**: sub-pipelines flatten into one dependency graph
//! - **Event-driven observability**: lifecycle events plus `tracing` logs
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stepflow::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn run(invoker: Arc<dyn Invoker>) -> Result<(), GraphError> {
//! let pipeline = Pipeline::new("review")
//!     .with_invoker(invoker)
//!     .with_options(PipelineOptions::new().with_parallel(true))
//!     .step(Step::new("review", "code-review", "analyze"))?
//!     .step(Step::new("test-gen", "test-gen", "generate").with_dependency("review"))?
//!     .step(Step::new("security", "security", "scan").with_dependency("review"))?;
//!
//! let result = pipeline.execute().await?;
//! assert_eq!(result.execution_order.first().map(String::as_str), Some("review"));
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod core;
pub mod errors;
pub mod events;
pub mod invoker;
pub mod observability;
pub mod pipeline;
pub mod steps;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::core::{PipelineResult, StepResult, StepResults, StepStatus, Value};
    pub use crate::errors::{ContractErrorInfo, GraphError, StepError, StepflowError};
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::invoker::{InvocationResult, Invoker, NoOpInvoker, RegistryInvoker};
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::pipeline::{BackoffStrategy, Pipeline, PipelineOptions};
    pub use crate::steps::{Step, StepAction, StepTarget};
}

pub use errors::{GraphError, StepError, StepflowError};
pub use pipeline::{Pipeline, PipelineOptions};
