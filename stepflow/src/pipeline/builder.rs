//! The public pipeline façade.

use super::composer::{flatten, PipelineEntry};
use super::scheduler::Scheduler;
use super::{DependencyGraph, PipelineOptions};
use crate::core::PipelineResult;
use crate::errors::GraphError;
use crate::events::{EventSink, NoOpEventSink};
use crate::invoker::Invoker;
use crate::steps::Step;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// An ordered collection of steps and sub-pipelines, executed once as a
/// single dependency graph.
///
/// Dependencies may refer to steps declared later; the whole graph is
/// validated when [`execute`](Self::execute) (or [`validate`](Self::validate))
/// runs, before any step is dispatched.
pub struct Pipeline {
    name: String,
    entries: Vec<PipelineEntry>,
    options: PipelineOptions,
    invoker: Option<Arc<dyn Invoker>>,
    sink: Arc<dyn EventSink>,
}

impl Pipeline {
    /// Creates an empty pipeline with default options.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
            options: PipelineOptions::default(),
            invoker: None,
            sink: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the execution options.
    #[must_use]
    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the invoker used by steps that call a collaborator.
    #[must_use]
    pub fn with_invoker(mut self, invoker: Arc<dyn Invoker>) -> Self {
        self.invoker = Some(invoker);
        self
    }

    /// Sets the sink that receives lifecycle events.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Adds a step.
    ///
    /// # Errors
    ///
    /// Returns an error if the step name is blank, the step depends on
    /// itself, or the name is already declared in this pipeline.
    pub fn add_step(&mut self, step: Step) -> Result<(), GraphError> {
        step.validate()?;
        self.ensure_unique(&step.name)?;
        self.entries.push(PipelineEntry::Step(step));
        Ok(())
    }

    /// Adds a step, builder style.
    ///
    /// # Errors
    ///
    /// See [`add_step`](Self::add_step).
    pub fn step(mut self, step: Step) -> Result<Self, GraphError> {
        self.add_step(step)?;
        Ok(self)
    }

    /// Attaches `sub` as a named group of steps.
    ///
    /// Steps of `sub` keep their own dependencies; those without any also
    /// depend on every name in `depends_on`. Other steps may depend on `name`
    /// to wait for the whole group. The sub-pipeline's options, invoker and
    /// event sink are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if `name` is blank or already declared.
    pub fn add_sub_pipeline(
        &mut self,
        name: impl Into<String>,
        sub: Self,
        depends_on: &[&str],
    ) -> Result<(), GraphError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(GraphError::EmptyName);
        }
        self.ensure_unique(&name)?;

        let mut deps: Vec<String> = Vec::with_capacity(depends_on.len());
        for dep in depends_on {
            if !deps.iter().any(|d| d == dep) {
                deps.push((*dep).to_string());
            }
        }

        self.entries.push(PipelineEntry::SubPipeline {
            name,
            entries: sub.entries,
            depends_on: deps,
        });
        Ok(())
    }

    /// Attaches a sub-pipeline, builder style.
    ///
    /// # Errors
    ///
    /// See [`add_sub_pipeline`](Self::add_sub_pipeline).
    pub fn sub_pipeline(
        mut self,
        name: impl Into<String>,
        sub: Self,
        depends_on: &[&str],
    ) -> Result<Self, GraphError> {
        self.add_sub_pipeline(name, sub, depends_on)?;
        Ok(self)
    }

    /// Validates the flattened graph without running anything.
    ///
    /// # Errors
    ///
    /// Returns the first [`GraphError`] found.
    pub fn validate(&self) -> Result<(), GraphError> {
        self.graph().map(|_| ())
    }

    /// Returns the order a sequential run follows when nothing fails or is
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph is invalid.
    pub fn plan(&self) -> Result<Vec<String>, GraphError> {
        Ok(self.graph()?.plan())
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the execution options.
    #[must_use]
    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Returns the number of steps after flattening sub-pipelines.
    #[must_use]
    pub fn step_count(&self) -> usize {
        fn count(entries: &[PipelineEntry]) -> usize {
            entries
                .iter()
                .map(|entry| match entry {
                    PipelineEntry::Step(_) => 1,
                    PipelineEntry::SubPipeline { entries, .. } => count(entries),
                })
                .sum()
        }
        count(&self.entries)
    }

    /// Runs the pipeline to completion.
    ///
    /// Step failures, panics and timeouts are reported through the returned
    /// [`PipelineResult`]; only an invalid graph is an error, and in that
    /// case no step runs.
    ///
    /// # Errors
    ///
    /// Returns a [`GraphError`] if the graph is invalid.
    pub async fn execute(self) -> Result<PipelineResult, GraphError> {
        let graph = self.graph().map_err(|err| {
            warn!(pipeline = %self.name, code = %err.error_info().code, error = %err, "Pipeline graph rejected");
            err
        })?;

        let scheduler = Scheduler::new(self.name, graph, self.options, self.invoker, self.sink);
        Ok(scheduler.run().await)
    }

    fn graph(&self) -> Result<DependencyGraph, GraphError> {
        DependencyGraph::build(flatten(&self.entries)?)
    }

    fn ensure_unique(&self, name: &str) -> Result<(), GraphError> {
        if self.entries.iter().any(|entry| entry.name() == name) {
            return Err(GraphError::DuplicateStep {
                name: name.to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("entries", &self.entries)
            .field("options", &self.options)
            .field("has_invoker", &self.invoker.is_some())
            .finish_non_exhaustive()
    }
}
