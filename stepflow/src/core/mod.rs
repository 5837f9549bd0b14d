//! Core domain model types for stepflow.
//!
//! This module contains the fundamental types used throughout the engine:
//! - Step status enum
//! - Per-step and per-pipeline result types
//! - The opaque payload alias passed between steps

mod result;
mod status;

pub use result::{PipelineResult, StepResult, StepResults};
pub use status::StepStatus;

/// Opaque structured payload exchanged between steps and collaborators.
///
/// The engine never inspects its shape.
pub type Value = serde_json::Value;
