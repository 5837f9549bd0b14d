//! Step definition.

use super::{StepAction, StepTarget};
use crate::core::{StepResults, Value};
use crate::errors::GraphError;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Derives a step's effective params from the results recorded so far.
pub type TransformFn = Arc<dyn Fn(&StepResults) -> Value + Send + Sync>;

/// Decides whether a step runs. `false` skips it.
pub type ConditionFn = Arc<dyn Fn(&StepResults) -> bool + Send + Sync>;

/// Definition of a single step in a pipeline.
#[derive(Clone)]
pub struct Step {
    /// The unique name of the step.
    pub name: String,
    /// What the step runs when dispatched.
    pub action: StepAction,
    /// Static params, replaced by `transform` when one is set.
    pub params: Value,
    /// Names of steps (or sub-pipelines) this step depends on, in declaration order.
    pub depends_on: Vec<String>,
    /// Optional params transform applied immediately before dispatch.
    pub transform: Option<TransformFn>,
    /// Optional gate evaluated once dependencies are satisfied.
    pub condition: Option<ConditionFn>,
}

impl Step {
    /// Creates a step that invokes `collaborator.operation` with empty params.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        collaborator: impl Into<String>,
        operation: impl Into<String>,
    ) -> Self {
        Self::with_step_action(name, StepAction::Invoke(StepTarget::new(collaborator, operation)))
    }

    /// Creates a step that runs a custom action.
    pub fn custom<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self::with_step_action(name, StepAction::custom(f))
    }

    fn with_step_action(name: impl Into<String>, action: StepAction) -> Self {
        Self {
            name: name.into(),
            action,
            params: Value::Object(serde_json::Map::new()),
            depends_on: Vec::new(),
            transform: None,
            condition: None,
        }
    }

    /// Sets the static params.
    #[must_use]
    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    /// Adds a dependency. Duplicates are ignored.
    #[must_use]
    pub fn with_dependency(mut self, dep: impl Into<String>) -> Self {
        let dep = dep.into();
        if !self.depends_on.contains(&dep) {
            self.depends_on.push(dep);
        }
        self
    }

    /// Adds several dependencies.
    #[must_use]
    pub fn with_dependencies(self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        deps.into_iter().fold(self, |step, dep| step.with_dependency(dep))
    }

    /// Sets the params transform.
    #[must_use]
    pub fn with_transform<F>(mut self, f: F) -> Self
    where
        F: Fn(&StepResults) -> Value + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(f));
        self
    }

    /// Sets the run condition.
    #[must_use]
    pub fn with_condition<F>(mut self, f: F) -> Self
    where
        F: Fn(&StepResults) -> bool + Send + Sync + 'static,
    {
        self.condition = Some(Arc::new(f));
        self
    }

    /// Replaces the collaborator invocation with a custom action.
    #[must_use]
    pub fn with_action<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.action = StepAction::custom(f);
        self
    }

    /// Returns the invoker target, if the step calls one.
    #[must_use]
    pub fn target(&self) -> Option<&StepTarget> {
        self.action.target()
    }

    /// Computes the params this step runs with, given the results so far.
    #[must_use]
    pub fn effective_params(&self, results: &StepResults) -> Value {
        self.transform
            .as_ref()
            .map_or_else(|| self.params.clone(), |transform| transform(results))
    }

    /// Returns false if the condition rejects the step.
    #[must_use]
    pub fn should_run(&self, results: &StepResults) -> bool {
        self.condition.as_ref().map_or(true, |condition| condition(results))
    }

    /// Validates the step in isolation.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is blank or the step depends on itself.
    pub fn validate(&self) -> Result<(), GraphError> {
        if self.name.trim().is_empty() {
            return Err(GraphError::EmptyName);
        }
        if self.depends_on.contains(&self.name) {
            return Err(GraphError::CycleDetected {
                cycle: vec![self.name.clone(), self.name.clone()],
            });
        }
        Ok(())
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("action", &self.action)
            .field("params", &self.params)
            .field("depends_on", &self.depends_on)
            .field("transform", &self.transform.is_some())
            .field("condition", &self.condition.is_some())
            .finish()
    }
}
