//! Step definitions.
//!
//! Steps are the fundamental units of work in a stepflow pipeline. Each step
//! either invokes an external collaborator through the pipeline's
//! [`Invoker`](crate::invoker::Invoker) or runs a custom action.

mod action;
mod step;

pub use action::{ActionFuture, CustomActionFn, StepAction, StepTarget};
pub use step::{ConditionFn, Step, TransformFn};
