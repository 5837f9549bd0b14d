//! Reactive step scheduler.
//!
//! One dispatch loop owns every piece of mutable run state: step statuses,
//! the ready set and the [`ResultAggregator`]. Step actions run as tokio
//! tasks in a [`JoinSet`] and hand their outcome back through it; the loop
//! records each outcome and immediately dispatches whatever became ready.
//!
//! Sequential mode is the same loop with a concurrency limit of one, always
//! picking the ready step with the lowest declaration index.

use super::{DependencyGraph, PipelineOptions, ResultAggregator, RetryPolicy};
use crate::core::{PipelineResult, StepResult, StepStatus, Value};
use crate::errors::StepError;
use crate::events::{self, EventSink};
use crate::invoker::Invoker;
use crate::steps::StepAction;
use chrono::Utc;
use futures::FutureExt;
use serde_json::json;
use std::any::Any;
use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

/// Outcome handed back by a step task.
#[derive(Debug)]
struct TaskOutcome {
    index: usize,
    params: Value,
    result: StepResult,
}

enum Next {
    Joined(Option<Result<TaskOutcome, JoinError>>),
    TimedOut,
}

/// Emits lifecycle events tagged with the pipeline name and run id.
#[derive(Clone)]
struct EventEmitter {
    pipeline: Arc<str>,
    run_id: Uuid,
    sink: Arc<dyn EventSink>,
}

impl EventEmitter {
    fn emit(&self, event_type: &str, step: Option<&str>, fields: Value) {
        let mut data = json!({
            "pipeline": &*self.pipeline,
            "run_id": self.run_id.to_string(),
        });
        if let Some(step) = step {
            data["step"] = json!(step);
        }
        if let (Some(data), Value::Object(fields)) = (data.as_object_mut(), fields) {
            data.extend(fields);
        }
        self.sink.try_emit(event_type, Some(data));
    }
}

/// Per-run dispatch bookkeeping, indexed like the graph arena.
#[derive(Debug)]
struct DispatchState {
    statuses: Vec<StepStatus>,
    remaining: Vec<usize>,
    ready: BTreeSet<usize>,
    running: usize,
}

impl DispatchState {
    fn new(graph: &DependencyGraph) -> Self {
        let remaining: Vec<usize> = (0..graph.len()).map(|i| graph.dependencies(i).len()).collect();
        let mut statuses = vec![StepStatus::Pending; graph.len()];
        let ready: BTreeSet<usize> = graph.roots().into_iter().collect();
        for &i in &ready {
            statuses[i] = StepStatus::Ready;
        }
        Self {
            statuses,
            remaining,
            ready,
            running: 0,
        }
    }

    /// Records a terminal status, releasing dependents when it allows them.
    fn settle(&mut self, graph: &DependencyGraph, idx: usize, status: StepStatus) {
        self.statuses[idx] = status;
        if status.satisfies_dependents() {
            self.release_dependents(graph, idx);
        }
    }

    fn release_dependents(&mut self, graph: &DependencyGraph, idx: usize) {
        for &child in graph.dependents(idx) {
            self.remaining[child] = self.remaining[child].saturating_sub(1);
            if self.remaining[child] == 0 && self.statuses[child] == StepStatus::Pending {
                self.statuses[child] = StepStatus::Ready;
                self.ready.insert(child);
            }
        }
    }

    fn unfinished(&self, graph: &DependencyGraph) -> Vec<String> {
        self.statuses
            .iter()
            .enumerate()
            .filter(|(_, status)| !status.is_terminal())
            .map(|(i, _)| graph.name(i).to_string())
            .collect()
    }
}

/// Drives one run of a validated graph.
pub(crate) struct Scheduler {
    name: String,
    graph: DependencyGraph,
    options: PipelineOptions,
    invoker: Option<Arc<dyn Invoker>>,
    sink: Arc<dyn EventSink>,
}

impl Scheduler {
    pub(crate) fn new(
        name: String,
        graph: DependencyGraph,
        options: PipelineOptions,
        invoker: Option<Arc<dyn Invoker>>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            name,
            graph,
            options,
            invoker,
            sink,
        }
    }

    /// Runs every reachable step and returns the aggregated result.
    ///
    /// On timeout, in-flight step tasks are aborted and their outcomes are
    /// never recorded.
    pub(crate) async fn run(self) -> PipelineResult {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("pipeline", pipeline = %self.name, %run_id);
        self.run_inner(run_id).instrument(span).await
    }

    async fn run_inner(self, run_id: Uuid) -> PipelineResult {
        let emitter = EventEmitter {
            pipeline: Arc::from(self.name.as_str()),
            run_id,
            sink: Arc::clone(&self.sink),
        };
        let policy = RetryPolicy::from_options(&self.options);
        let limit = self.options.concurrency_limit();
        let deadline = self
            .options
            .timeout()
            .map(|timeout| tokio::time::Instant::now() + timeout);

        let mut state = DispatchState::new(&self.graph);
        let mut aggregator = ResultAggregator::new(run_id);
        let mut tasks: JoinSet<TaskOutcome> = JoinSet::new();

        info!(
            steps = self.graph.len(),
            parallel = self.options.parallel,
            max_attempts = policy.max_attempts,
            "Pipeline started"
        );
        emitter.emit(
            events::PIPELINE_STARTED,
            None,
            json!({
                "steps": self.graph.len(),
                "parallel": self.options.parallel,
            }),
        );

        loop {
            if !aggregator.is_halted() {
                self.dispatch_ready(&mut state, &mut aggregator, &mut tasks, limit, policy, &emitter);
            }
            if tasks.is_empty() {
                break;
            }

            let next = match deadline {
                Some(deadline) => tokio::select! {
                    joined = tasks.join_next() => Next::Joined(joined),
                    () = tokio::time::sleep_until(deadline) => Next::TimedOut,
                },
                None => Next::Joined(tasks.join_next().await),
            };

            match next {
                Next::Joined(Some(Ok(outcome))) => {
                    self.complete(outcome, &mut state, &mut aggregator, &emitter);
                }
                Next::Joined(Some(Err(err))) => {
                    warn!(error = %err, "Step task did not complete");
                    state.running = state.running.saturating_sub(1);
                    aggregator.record_abort(format!("Step task join error: {err}"));
                }
                Next::Joined(None) => break,
                Next::TimedOut => {
                    warn!(
                        timeout_ms = self.options.timeout_ms,
                        in_flight = tasks.len(),
                        "Pipeline timed out, aborting in-flight steps"
                    );
                    tasks.abort_all();
                    aggregator.record_timeout();
                    break;
                }
            }
        }

        if !aggregator.is_halted() {
            let pending = state.unfinished(&self.graph);
            if !pending.is_empty() {
                aggregator.record_abort(format!(
                    "Deadlocked step graph; remaining steps: {pending:?}"
                ));
            }
        }

        let result = aggregator.finish(self.options.timeout_ms);
        self.emit_finished(&result, &emitter);
        result
    }

    fn dispatch_ready(
        &self,
        state: &mut DispatchState,
        aggregator: &mut ResultAggregator,
        tasks: &mut JoinSet<TaskOutcome>,
        limit: usize,
        policy: RetryPolicy,
        emitter: &EventEmitter,
    ) {
        while state.running < limit {
            let Some(idx) = state.ready.pop_first() else {
                break;
            };
            let step = self.graph.step(idx);

            let gate = std::panic::catch_unwind(AssertUnwindSafe(|| {
                let results = aggregator.results();
                step.should_run(results).then(|| step.effective_params(results))
            }));

            let params = match gate {
                Ok(Some(params)) => params,
                Ok(None) => {
                    debug!(step = %step.name, "Condition false, skipping step");
                    state.settle(&self.graph, idx, StepStatus::Skip);
                    aggregator.record_skip(&step.name);
                    emitter.emit(events::STEP_SKIPPED, Some(&step.name), json!({}));
                    continue;
                }
                Err(panic) => {
                    // The action never ran, so the failure carries zero attempts
                    // and the static params.
                    let message = StepError::Panicked(panic_message(panic.as_ref())).to_string();
                    warn!(step = %step.name, error = %message, "Step condition or transform panicked");
                    let now = Utc::now();
                    state.settle(&self.graph, idx, StepStatus::Fail);
                    emitter.emit(
                        events::STEP_FAILED,
                        Some(&step.name),
                        json!({ "error": &message, "attempts": 0, "duration_ms": 0.0 }),
                    );
                    aggregator.record(
                        &step.name,
                        step.params.clone(),
                        StepResult::failure(message, now, now, 0),
                    );
                    break;
                }
            };

            state.statuses[idx] = StepStatus::Running;
            state.running += 1;

            debug!(step = %step.name, "Dispatching step");
            emitter.emit(
                events::STEP_STARTED,
                Some(&step.name),
                json!({ "target": step.target().map(ToString::to_string) }),
            );

            let span = tracing::debug_span!("step", step = %step.name);
            tasks.spawn(
                run_step(
                    idx,
                    step.name.clone(),
                    step.action.clone(),
                    params,
                    self.invoker.clone(),
                    policy,
                    emitter.clone(),
                )
                .instrument(span),
            );
        }
    }

    fn complete(
        &self,
        outcome: TaskOutcome,
        state: &mut DispatchState,
        aggregator: &mut ResultAggregator,
        emitter: &EventEmitter,
    ) {
        let TaskOutcome {
            index,
            params,
            result,
        } = outcome;
        let name = self.graph.name(index);
        state.running = state.running.saturating_sub(1);

        if result.success {
            debug!(step = %name, duration_ms = result.duration_ms, attempts = result.attempts, "Step completed");
            state.settle(&self.graph, index, StepStatus::Ok);
            emitter.emit(
                events::STEP_COMPLETED,
                Some(name),
                json!({
                    "duration_ms": result.duration_ms,
                    "attempts": result.attempts,
                }),
            );
        } else {
            warn!(
                step = %name,
                attempts = result.attempts,
                error = result.error.as_deref().unwrap_or_default(),
                "Step failed"
            );
            state.settle(&self.graph, index, StepStatus::Fail);
            emitter.emit(
                events::STEP_FAILED,
                Some(name),
                json!({
                    "error": result.error,
                    "attempts": result.attempts,
                    "duration_ms": result.duration_ms,
                }),
            );
        }

        aggregator.record(name, params, result);
    }

    fn emit_finished(&self, result: &PipelineResult, emitter: &EventEmitter) {
        let fields = json!({
            "duration_ms": result.duration_ms,
            "executed": result.execution_order.len(),
            "skipped": result.skipped.len(),
            "error": result.error,
            "failed_step": result.failed_step,
        });

        if result.success {
            info!(duration_ms = result.duration_ms, "Pipeline completed");
            emitter.emit(events::PIPELINE_COMPLETED, None, fields);
        } else if result.timed_out {
            emitter.emit(events::PIPELINE_TIMEOUT, None, fields);
        } else {
            warn!(
                failed_step = result.failed_step.as_deref(),
                error = result.error.as_deref(),
                "Pipeline failed"
            );
            emitter.emit(events::PIPELINE_FAILED, None, fields);
        }
    }
}

/// Body of one step task: runs the action under the retry policy.
async fn run_step(
    index: usize,
    name: String,
    action: StepAction,
    params: Value,
    invoker: Option<Arc<dyn Invoker>>,
    policy: RetryPolicy,
    emitter: EventEmitter,
) -> TaskOutcome {
    let started_at = Utc::now();
    let attempts = AtomicU32::new(0);

    let outcome = AssertUnwindSafe(policy.run(
        |_| {
            attempts.fetch_add(1, Ordering::SeqCst);
            invoke_once(&action, params.clone(), invoker.as_deref())
        },
        |attempt, err| {
            warn!(step = %name, attempt, error = %err, "Step attempt failed, retrying");
            emitter.emit(
                events::STEP_RETRYING,
                Some(&name),
                json!({ "attempt": attempt, "error": err.to_string() }),
            );
        },
    ))
    .catch_unwind()
    .await;

    let ended_at = Utc::now();
    let result = match outcome {
        Ok(outcome) => match outcome.result {
            Ok(data) => StepResult::success(data, started_at, ended_at, outcome.attempts),
            Err(err) => StepResult::failure(err.to_string(), started_at, ended_at, outcome.attempts),
        },
        Err(panic) => StepResult::failure(
            StepError::Panicked(panic_message(panic.as_ref())).to_string(),
            started_at,
            ended_at,
            attempts.load(Ordering::SeqCst),
        ),
    };

    TaskOutcome {
        index,
        params,
        result,
    }
}

async fn invoke_once(
    action: &StepAction,
    params: Value,
    invoker: Option<&dyn Invoker>,
) -> Result<Value, StepError> {
    match action {
        StepAction::Custom(action) => action(params).await.map_err(StepError::Action),
        StepAction::Invoke(target) => {
            let Some(invoker) = invoker else {
                return Err(StepError::NoInvoker {
                    collaborator: target.collaborator.clone(),
                    operation: target.operation.clone(),
                });
            };
            let response = invoker
                .call(&target.collaborator, &target.operation, params)
                .await;
            if response.success {
                Ok(response.data)
            } else {
                Err(StepError::failed(
                    response
                        .error
                        .unwrap_or_else(|| format!("{target} reported failure")),
                ))
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
