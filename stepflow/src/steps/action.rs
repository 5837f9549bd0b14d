//! What a step does when dispatched.

use crate::core::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Future returned by a custom action.
pub type ActionFuture = Pin<Box<dyn Future<Output = anyhow::Result<Value>> + Send>>;

/// A custom action: receives the step's effective params.
pub type CustomActionFn = Arc<dyn Fn(Value) -> ActionFuture + Send + Sync>;

/// Address of an external capability: a (collaborator, operation) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StepTarget {
    /// Collaborator (service) id.
    pub collaborator: String,
    /// Operation id within the collaborator.
    pub operation: String,
}

impl StepTarget {
    /// Creates a new target.
    #[must_use]
    pub fn new(collaborator: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            collaborator: collaborator.into(),
            operation: operation.into(),
        }
    }
}

impl fmt::Display for StepTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.collaborator, self.operation)
    }
}

/// The action run when a step is dispatched.
#[derive(Clone)]
pub enum StepAction {
    /// Call the pipeline's invoker with the step's target.
    Invoke(StepTarget),
    /// Run a custom callable instead of the invoker.
    Custom(CustomActionFn),
}

impl StepAction {
    /// Wraps an async closure as a custom action.
    pub fn custom<F, Fut>(f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self::Custom(Arc::new(move |params| Box::pin(f(params))))
    }

    /// Returns the invoker target, if this action calls one.
    #[must_use]
    pub fn target(&self) -> Option<&StepTarget> {
        match self {
            Self::Invoke(target) => Some(target),
            Self::Custom(_) => None,
        }
    }
}

impl fmt::Debug for StepAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invoke(target) => f.debug_tuple("Invoke").field(target).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
