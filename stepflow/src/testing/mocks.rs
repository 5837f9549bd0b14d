//! Mock invokers for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use crate::core::Value;
use crate::invoker::{InvocationResult, Invoker};
use crate::steps::StepTarget;

/// One call observed by a [`RecordingInvoker`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// The collaborator called.
    pub collaborator: String,
    /// The operation called.
    pub operation: String,
    /// The params passed.
    pub params: Value,
}

impl RecordedCall {
    /// Returns the call's target.
    #[must_use]
    pub fn target(&self) -> StepTarget {
        StepTarget::new(&self.collaborator, &self.operation)
    }
}

/// An invoker that records every call and returns scripted results.
///
/// Scripted responses for a target are consumed in order; once they run out
/// (or when none were scripted) the default response is returned.
#[derive(Debug)]
pub struct RecordingInvoker {
    scripted: Mutex<HashMap<StepTarget, VecDeque<InvocationResult>>>,
    default: InvocationResult,
    delay: Option<Duration>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl Default for RecordingInvoker {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingInvoker {
    /// Creates an invoker that succeeds every call with a `null` payload.
    #[must_use]
    pub fn new() -> Self {
        Self {
            scripted: Mutex::new(HashMap::new()),
            default: InvocationResult::ok(Value::Null),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Sets the response used when nothing is scripted.
    #[must_use]
    pub fn with_default(mut self, response: InvocationResult) -> Self {
        self.default = response;
        self
    }

    /// Sleeps for `delay` before answering each call.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queues a response for `collaborator.operation`.
    #[must_use]
    pub fn with_response(
        self,
        collaborator: &str,
        operation: &str,
        response: InvocationResult,
    ) -> Self {
        self.scripted
            .lock()
            .entry(StepTarget::new(collaborator, operation))
            .or_default()
            .push_back(response);
        self
    }

    /// Returns every call in the order it arrived.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Returns the number of calls received.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Returns the calls made to `collaborator.operation`.
    #[must_use]
    pub fn calls_to(&self, collaborator: &str, operation: &str) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.collaborator == collaborator && c.operation == operation)
            .cloned()
            .collect()
    }

    /// Returns the called targets as `collaborator.operation` strings.
    #[must_use]
    pub fn operations(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .map(|c| c.target().to_string())
            .collect()
    }

    /// Forgets recorded calls. Scripted responses are kept.
    pub fn reset(&self) {
        self.calls.lock().clear();
    }
}

#[async_trait]
impl Invoker for RecordingInvoker {
    async fn call(&self, collaborator: &str, operation: &str, params: Value) -> InvocationResult {
        self.calls.lock().push(RecordedCall {
            collaborator: collaborator.to_string(),
            operation: operation.to_string(),
            params,
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self
            .scripted
            .lock()
            .get_mut(&StepTarget::new(collaborator, operation))
            .and_then(VecDeque::pop_front);
        scripted.unwrap_or_else(|| self.default.clone())
    }
}
