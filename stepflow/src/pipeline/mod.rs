//! Pipeline building and execution.
//!
//! This module provides:
//! - The [`Pipeline`] façade (`add_step`, `add_sub_pipeline`, `execute`)
//! - Dependency graph validation over a flat step arena
//! - Sub-pipeline flattening
//! - The reactive scheduler, retry policy and result aggregation
//! - Execution options

mod aggregator;
mod builder;
mod composer;
mod config;
mod graph;
mod retry;
mod scheduler;

#[cfg(test)]
mod integration_tests;

pub use aggregator::ResultAggregator;
pub use builder::Pipeline;
pub use config::{
    BackoffStrategy, PipelineOptions, ENV_MAX_CONCURRENCY, ENV_MAX_RETRIES, ENV_PARALLEL,
    ENV_TIMEOUT_MS,
};
pub use graph::DependencyGraph;
pub use retry::{RetryOutcome, RetryPolicy};
