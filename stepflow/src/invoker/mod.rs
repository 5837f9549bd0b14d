//! The boundary between the engine and external collaborators.
//!
//! A step's default action calls [`Invoker::call`] with its target and
//! effective params. Concrete invokers are supplied by the caller; the engine
//! only ships [`RegistryInvoker`], which routes targets to registered handlers.

mod registry;

pub use registry::{HandlerFn, HandlerFuture, RegistryInvoker};

use crate::core::Value;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Outcome of one collaborator call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationResult {
    /// Whether the call succeeded.
    pub success: bool,
    /// Opaque payload handed to dependents.
    #[serde(default)]
    pub data: Value,
    /// Failure message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InvocationResult {
    /// Creates a successful result.
    #[must_use]
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    /// Creates a failed result.
    #[must_use]
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Value::Null,
            error: Some(error.into()),
        }
    }
}

/// Calls an external capability by (collaborator, operation, params).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Invoker: Send + Sync {
    /// Invokes `operation` on `collaborator`.
    ///
    /// Failures are reported through [`InvocationResult::success`], never by
    /// panicking.
    async fn call(&self, collaborator: &str, operation: &str, params: Value) -> InvocationResult;
}

/// An invoker that succeeds every call with a `null` payload.
///
/// Useful for dry runs that only exercise ordering, conditions and transforms.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpInvoker;

#[async_trait]
impl Invoker for NoOpInvoker {
    async fn call(&self, _collaborator: &str, _operation: &str, _params: Value) -> InvocationResult {
        InvocationResult::ok(Value::Null)
    }
}
