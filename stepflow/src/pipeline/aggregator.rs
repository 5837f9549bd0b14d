//! Result aggregation for one pipeline run.
//!
//! The aggregator is owned by the scheduler's dispatch loop and is the only
//! writer of step results, so no locking is needed.

use crate::core::{PipelineResult, StepResult, StepResults, Value};
use std::time::Instant;
use uuid::Uuid;

#[derive(Debug)]
struct Failure {
    step: String,
    params: Value,
    error: String,
}

/// Collects step outcomes in completion order and builds the final
/// [`PipelineResult`].
#[derive(Debug)]
pub struct ResultAggregator {
    run_id: Uuid,
    started: Instant,
    results: StepResults,
    execution_order: Vec<String>,
    skipped: Vec<String>,
    failure: Option<Failure>,
    aborted: Option<String>,
    timed_out: bool,
}

impl ResultAggregator {
    /// Creates an empty aggregator for a new run.
    #[must_use]
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            started: Instant::now(),
            results: StepResults::new(),
            execution_order: Vec::new(),
            skipped: Vec::new(),
            failure: None,
            aborted: None,
            timed_out: false,
        }
    }

    /// Returns the results recorded so far.
    #[must_use]
    pub fn results(&self) -> &StepResults {
        &self.results
    }

    /// Returns true once a terminal failure, timeout or abort is recorded.
    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.failure.is_some() || self.aborted.is_some() || self.timed_out
    }

    /// Records a completed step, successful or not.
    ///
    /// The first failed step becomes the run's attributed failure; later
    /// failures (from steps already in flight) are recorded but not attributed.
    pub fn record(&mut self, name: &str, params: Value, result: StepResult) {
        if !result.success && self.failure.is_none() {
            self.failure = Some(Failure {
                step: name.to_string(),
                params,
                error: result.error.clone().unwrap_or_default(),
            });
        }
        self.execution_order.push(name.to_string());
        self.results.insert(name.to_string(), result);
    }

    /// Records a step skipped by its condition.
    pub fn record_skip(&mut self, name: &str) {
        self.skipped.push(name.to_string());
    }

    /// Marks the run as aborted by its timeout.
    pub fn record_timeout(&mut self) {
        self.timed_out = true;
    }

    /// Marks the run as aborted for an internal reason.
    pub fn record_abort(&mut self, reason: impl Into<String>) {
        if self.aborted.is_none() {
            self.aborted = Some(reason.into());
        }
    }

    /// Builds the final result.
    #[must_use]
    pub fn finish(self, timeout_ms: Option<u64>) -> PipelineResult {
        let duration_ms = self.started.elapsed().as_secs_f64() * 1000.0;

        let (failed_step, failed_params, failure_error) = match self.failure {
            Some(failure) => (Some(failure.step), Some(failure.params), Some(failure.error)),
            None => (None, None, None),
        };

        let error = if self.timed_out {
            Some(timeout_ms.map_or_else(
                || "Pipeline timed out".to_string(),
                |ms| format!("Pipeline timed out after {ms}ms"),
            ))
        } else {
            failure_error.or(self.aborted)
        };

        PipelineResult {
            run_id: self.run_id,
            success: error.is_none(),
            results: self.results,
            execution_order: self.execution_order,
            skipped: self.skipped,
            error,
            failed_step,
            failed_params,
            timed_out: self.timed_out,
            duration_ms,
        }
    }
}
