//! Test assertions for pipeline results.

use crate::core::PipelineResult;
use crate::steps::Step;

/// Asserts that the pipeline succeeded.
pub fn assert_pipeline_succeeded(result: &PipelineResult) {
    assert!(
        result.success,
        "Expected pipeline success, got error {:?} (failed step {:?})",
        result.error, result.failed_step
    );
}

/// Asserts that the pipeline failed at `step`.
pub fn assert_pipeline_failed_at(result: &PipelineResult, step: &str) {
    assert!(!result.success, "Expected pipeline failure, but it succeeded");
    assert_eq!(
        result.failed_step.as_deref(),
        Some(step),
        "Expected failure at '{}', got {:?} ({:?})",
        step,
        result.failed_step,
        result.error
    );
}

/// Asserts that `step` ran and succeeded.
pub fn assert_step_succeeded(result: &PipelineResult, step: &str) {
    match result.step(step) {
        Some(r) => assert!(r.success, "Expected step '{}' to succeed, got {:?}", step, r.error),
        None => panic!(
            "Expected step '{}' to have run; executed: {:?}",
            step, result.execution_order
        ),
    }
}

/// Asserts that `step` was skipped by its condition.
pub fn assert_step_skipped(result: &PipelineResult, step: &str) {
    assert!(
        result.is_skipped(step),
        "Expected step '{}' to be skipped; skipped: {:?}",
        step,
        result.skipped
    );
    assert!(
        result.step(step).is_none(),
        "Skipped step '{step}' must not have a result"
    );
}

/// Asserts that no executed step started before any of its executed
/// dependencies finished.
///
/// Dependencies that were skipped or never ran are ignored.
pub fn assert_respects_dependencies(result: &PipelineResult, steps: &[Step]) {
    for step in steps {
        let (Some(position), Some(step_result)) = (result.position(&step.name), result.step(&step.name))
        else {
            continue;
        };

        for dep in &step.depends_on {
            let (Some(dep_position), Some(dep_result)) = (result.position(dep), result.step(dep)) else {
                continue;
            };
            assert!(
                dep_position < position,
                "Step '{}' completed before its dependency '{}': {:?}",
                step.name,
                dep,
                result.execution_order
            );
            assert!(
                dep_result.ended_at <= step_result.started_at,
                "Step '{}' started at {} before dependency '{}' ended at {}",
                step.name,
                step_result.started_at,
                dep,
                dep_result.ended_at
            );
        }
    }
}
