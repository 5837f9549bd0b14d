//! Scripted custom actions for tests.
//!
//! Each helper returns a closure usable with [`Step::custom`] or
//! [`Step::with_action`].
//!
//! [`Step::custom`]: crate::steps::Step::custom
//! [`Step::with_action`]: crate::steps::Step::with_action

use crate::core::Value;
use crate::steps::ActionFuture;
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Shared count of how many times an action ran.
#[derive(Debug, Clone, Default)]
pub struct CallCounter(Arc<AtomicU32>);

impl CallCounter {
    /// Creates a counter at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current count.
    #[must_use]
    pub fn count(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }

    /// Increments and returns the new count.
    pub fn increment(&self) -> u32 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// An action that fails until its `succeed_on`-th call, then returns
/// `{"attempt": n}`.
pub fn flaky_action(
    succeed_on: u32,
) -> (impl Fn(Value) -> ActionFuture + Send + Sync + 'static, CallCounter) {
    let counter = CallCounter::new();
    let calls = counter.clone();
    let action = move |_params: Value| -> ActionFuture {
        let attempt = calls.increment();
        Box::pin(async move {
            if attempt < succeed_on {
                anyhow::bail!("transient failure on attempt {attempt}");
            }
            Ok(json!({ "attempt": attempt }))
        })
    };
    (action, counter)
}

/// An action that always fails with `message`.
pub fn failing_action(
    message: impl Into<String>,
) -> impl Fn(Value) -> ActionFuture + Send + Sync + 'static {
    let message: Arc<str> = Arc::from(message.into());
    move |_params: Value| -> ActionFuture {
        let message = Arc::clone(&message);
        Box::pin(async move { Err(anyhow::anyhow!("{message}")) })
    }
}

/// An action that sleeps for `delay`, then returns `data`.
pub fn sleeping_action(
    delay: Duration,
    data: Value,
) -> impl Fn(Value) -> ActionFuture + Send + Sync + 'static {
    move |_params: Value| -> ActionFuture {
        let data = data.clone();
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            Ok(data)
        })
    }
}

/// An action that returns the params it was called with.
pub fn echo_action() -> impl Fn(Value) -> ActionFuture + Send + Sync + 'static {
    |params: Value| -> ActionFuture { Box::pin(async move { Ok(params) }) }
}
