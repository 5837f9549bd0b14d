//! Testing utilities for stepflow pipelines.
//!
//! This module provides:
//! - A recording mock invoker with scripted responses
//! - Scripted custom actions (flaky, failing, sleeping, echo)
//! - Assertions over pipeline results

mod actions;
mod assertions;
mod mocks;

pub use actions::{echo_action, failing_action, flaky_action, sleeping_action, CallCounter};
pub use assertions::{
    assert_pipeline_failed_at, assert_pipeline_succeeded, assert_respects_dependencies,
    assert_step_skipped, assert_step_succeeded,
};
pub use mocks::{RecordedCall, RecordingInvoker};
