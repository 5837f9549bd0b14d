//! Error types for the stepflow engine.
//!
//! Errors fall into three groups:
//! - [`GraphError`]: the step graph is malformed. Raised before any step runs.
//! - [`StepError`]: a single step attempt failed. Retried per policy, then
//!   folded into the [`PipelineResult`](crate::core::PipelineResult).
//! - [`StepflowError`]: crate-level umbrella used by configuration loading and
//!   other fallible entry points.
//!
//! A pipeline timeout is not an error value: it surfaces as a failed
//! `PipelineResult` with `timed_out` set.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for stepflow operations.
#[derive(Debug, Error)]
pub enum StepflowError {
    /// The step graph failed validation.
    #[error("{0}")]
    Graph(#[from] GraphError),

    /// A step failed terminally.
    #[error("Step execution error: {0}")]
    Step(#[from] StepError),

    /// The pipeline exceeded its timeout.
    #[error("Pipeline timed out after {0}ms")]
    Timeout(u64),

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Metadata about a graph error for better diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "GRAPH-CYCLE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when the step graph is malformed.
///
/// Always raised before execution starts, so a malformed graph never
/// partially runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// A step or sub-pipeline was given an empty name.
    #[error("Step name cannot be empty or whitespace-only")]
    EmptyName,

    /// Two steps (or a step and a sub-pipeline) share a name.
    #[error("Duplicate step name '{name}'")]
    DuplicateStep {
        /// The duplicated name.
        name: String,
    },

    /// A step depends on a name that is not in the graph.
    #[error("Unknown dependency: step '{step}' depends on unknown step '{dependency}'")]
    UnknownDependency {
        /// The step declaring the dependency.
        step: String,
        /// The missing dependency.
        dependency: String,
    },

    /// The dependency relation contains a cycle.
    #[error("Cycle detected: {}", cycle.join(" -> "))]
    CycleDetected {
        /// The steps forming the cycle, first step repeated at the end.
        cycle: Vec<String>,
    },
}

impl GraphError {
    /// Returns structured diagnostics for this error.
    #[must_use]
    pub fn error_info(&self) -> ContractErrorInfo {
        match self {
            Self::EmptyName => ContractErrorInfo::new("GRAPH-EMPTY-NAME", "Step has an empty name")
                .with_fix_hint("Give every step and sub-pipeline a non-empty name."),
            Self::DuplicateStep { name } => ContractErrorInfo::new(
                "GRAPH-DUPLICATE",
                format!("Name '{name}' is used more than once"),
            )
            .with_fix_hint("Step names must be unique across the pipeline and all sub-pipelines.")
            .with_context_entry("name", name.clone()),
            Self::UnknownDependency { step, dependency } => ContractErrorInfo::new(
                "GRAPH-UNKNOWN-DEP",
                format!("Dependency '{dependency}' not found"),
            )
            .with_fix_hint("Add the dependency as a step or sub-pipeline, or remove it.")
            .with_context_entry("step", step.clone())
            .with_context_entry("dependency", dependency.clone()),
            Self::CycleDetected { cycle } => ContractErrorInfo::new(
                "GRAPH-CYCLE",
                format!("Pipeline contains a dependency cycle: {}", cycle.join(" -> ")),
            )
            .with_fix_hint("Remove one of the dependencies in the cycle to break it."),
        }
    }

    /// Returns the step names involved in the error.
    #[must_use]
    pub fn steps(&self) -> Vec<String> {
        match self {
            Self::EmptyName => Vec::new(),
            Self::DuplicateStep { name } => vec![name.clone()],
            Self::UnknownDependency { step, dependency } => vec![step.clone(), dependency.clone()],
            Self::CycleDetected { cycle } => cycle.clone(),
        }
    }
}

/// Error raised by a single step attempt.
#[derive(Debug, Error)]
pub enum StepError {
    /// The invoker reported a failed call.
    #[error("{message}")]
    Failed {
        /// The failure message reported by the collaborator.
        message: String,
    },

    /// A custom action returned an error.
    #[error("{0:#}")]
    Action(#[from] anyhow::Error),

    /// No invoker handles the step's target.
    #[error("Unknown target '{collaborator}.{operation}'")]
    UnknownTarget {
        /// The collaborator id.
        collaborator: String,
        /// The operation id.
        operation: String,
    },

    /// The step invokes a collaborator but the pipeline has no invoker.
    #[error("No invoker configured for target '{collaborator}.{operation}'")]
    NoInvoker {
        /// The collaborator id.
        collaborator: String,
        /// The operation id.
        operation: String,
    },

    /// The step task panicked.
    #[error("Step panicked: {0}")]
    Panicked(String),
}

impl StepError {
    /// Creates a failure from a collaborator message.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}
