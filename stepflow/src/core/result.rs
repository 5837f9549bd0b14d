//! Step and pipeline result types.

use super::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Results recorded so far, keyed by step name.
pub type StepResults = HashMap<String, StepResult>;

/// Outcome of one executed step.
///
/// Only created for steps that actually ran. Skipped steps have no result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    /// Whether the step succeeded.
    pub success: bool,
    /// Payload returned by the action or collaborator.
    #[serde(default)]
    pub data: Value,
    /// Failure message of the last attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock duration across all attempts.
    pub duration_ms: f64,
    /// Number of attempts made.
    pub attempts: u32,
    /// When the first attempt started.
    pub started_at: DateTime<Utc>,
    /// When the last attempt ended.
    pub ended_at: DateTime<Utc>,
}

impl StepResult {
    /// Creates a successful step result.
    #[must_use]
    pub fn success(data: Value, started_at: DateTime<Utc>, ended_at: DateTime<Utc>, attempts: u32) -> Self {
        Self {
            success: true,
            data,
            error: None,
            duration_ms: span_ms(started_at, ended_at),
            attempts,
            started_at,
            ended_at,
        }
    }

    /// Creates a failed step result.
    #[must_use]
    pub fn failure(
        error: impl Into<String>,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        attempts: u32,
    ) -> Self {
        Self {
            success: false,
            data: Value::Null,
            error: Some(error.into()),
            duration_ms: span_ms(started_at, ended_at),
            attempts,
            started_at,
            ended_at,
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn span_ms(started_at: DateTime<Utc>, ended_at: DateTime<Utc>) -> f64 {
    (ended_at - started_at)
        .num_microseconds()
        .map_or(0.0, |us| us as f64 / 1000.0)
}

/// Aggregated outcome of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    /// Identifier of this run.
    pub run_id: Uuid,
    /// True iff every step succeeded or was skipped.
    pub success: bool,
    /// Results of executed steps.
    pub results: StepResults,
    /// Step names in completion order.
    pub execution_order: Vec<String>,
    /// Steps whose condition evaluated false, in the order they were skipped.
    #[serde(default)]
    pub skipped: Vec<String>,
    /// Failure message, if the run failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The first step that failed terminally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<String>,
    /// Effective params the failed step was invoked with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_params: Option<Value>,
    /// Whether the run was aborted by the pipeline timeout.
    #[serde(default)]
    pub timed_out: bool,
    /// Total run duration in milliseconds.
    pub duration_ms: f64,
}

impl PipelineResult {
    /// Returns the result of a step, if it executed.
    #[must_use]
    pub fn step(&self, name: &str) -> Option<&StepResult> {
        self.results.get(name)
    }

    /// Returns the payload of a step, if it executed.
    #[must_use]
    pub fn data(&self, name: &str) -> Option<&Value> {
        self.results.get(name).map(|r| &r.data)
    }

    /// Returns true if the step was skipped by its condition.
    #[must_use]
    pub fn is_skipped(&self, name: &str) -> bool {
        self.skipped.iter().any(|s| s == name)
    }

    /// Returns the position of a step in the completion order.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.execution_order.iter().position(|s| s == name)
    }

    /// Serializes the result to pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if a payload cannot be serialized.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
