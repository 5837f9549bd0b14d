//! Invoker that routes targets to registered handlers.

use super::{InvocationResult, Invoker};
use crate::core::Value;
use crate::errors::StepError;
use crate::steps::StepTarget;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Future returned by a registered handler.
pub type HandlerFuture = Pin<Box<dyn Future<Output = InvocationResult> + Send>>;

/// A registered collaborator operation.
pub type HandlerFn = Arc<dyn Fn(Value) -> HandlerFuture + Send + Sync>;

/// Registry of collaborator operations keyed by target.
///
/// Calls to an unregistered target fail with an "unknown target" message
/// instead of erroring out of the pipeline.
#[derive(Default)]
pub struct RegistryInvoker {
    handlers: RwLock<HashMap<StepTarget, HandlerFn>>,
}

impl RegistryInvoker {
    /// Creates a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for `collaborator.operation`, replacing any previous one.
    pub fn register<F, Fut>(&self, collaborator: impl Into<String>, operation: impl Into<String>, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = InvocationResult> + Send + 'static,
    {
        let handler: HandlerFn = Arc::new(move |params| Box::pin(handler(params)));
        self.handlers
            .write()
            .insert(StepTarget::new(collaborator, operation), handler);
    }

    /// Checks if a target has a handler.
    #[must_use]
    pub fn is_registered(&self, collaborator: &str, operation: &str) -> bool {
        self.handlers
            .read()
            .contains_key(&StepTarget::new(collaborator, operation))
    }

    /// Lists registered targets in sorted order.
    #[must_use]
    pub fn targets(&self) -> Vec<StepTarget> {
        let mut targets: Vec<_> = self.handlers.read().keys().cloned().collect();
        targets.sort();
        targets
    }
}

impl std::fmt::Debug for RegistryInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryInvoker")
            .field("targets", &self.targets())
            .finish()
    }
}

#[async_trait]
impl Invoker for RegistryInvoker {
    async fn call(&self, collaborator: &str, operation: &str, params: Value) -> InvocationResult {
        let handler = self
            .handlers
            .read()
            .get(&StepTarget::new(collaborator, operation))
            .cloned();

        match handler {
            Some(handler) => handler(params).await,
            None => {
                tracing::warn!(collaborator, operation, "No handler registered for target");
                InvocationResult::fail(
                    StepError::UnknownTarget {
                        collaborator: collaborator.to_string(),
                        operation: operation.to_string(),
                    }
                    .to_string(),
                )
            }
        }
    }
}
