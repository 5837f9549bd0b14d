//! Validated dependency graph over a flat arena of steps.
//!
//! Every step gets a stable index (its declaration position). Dependencies and
//! dependents are stored as index lists, so the scheduler never chases names
//! after validation.

use crate::errors::GraphError;
use crate::steps::Step;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Visiting,
    Done,
}

/// An acyclic graph of steps with resolved dependency edges.
#[derive(Debug)]
pub struct DependencyGraph {
    steps: Vec<Step>,
    index: HashMap<String, usize>,
    dependencies: Vec<Vec<usize>>,
    dependents: Vec<Vec<usize>>,
}

impl DependencyGraph {
    /// Builds and validates a graph from steps in declaration order.
    ///
    /// # Errors
    ///
    /// Returns an error if a name is blank or duplicated, a dependency is
    /// unknown, or the dependencies form a cycle.
    pub fn build(steps: Vec<Step>) -> Result<Self, GraphError> {
        let mut index = HashMap::with_capacity(steps.len());
        for (i, step) in steps.iter().enumerate() {
            if step.name.trim().is_empty() {
                return Err(GraphError::EmptyName);
            }
            if index.insert(step.name.clone(), i).is_some() {
                return Err(GraphError::DuplicateStep {
                    name: step.name.clone(),
                });
            }
        }

        let mut dependencies = Vec::with_capacity(steps.len());
        let mut dependents = vec![Vec::new(); steps.len()];
        for (i, step) in steps.iter().enumerate() {
            let mut deps = Vec::with_capacity(step.depends_on.len());
            for dep in &step.depends_on {
                let Some(&d) = index.get(dep) else {
                    return Err(GraphError::UnknownDependency {
                        step: step.name.clone(),
                        dependency: dep.clone(),
                    });
                };
                if !deps.contains(&d) {
                    deps.push(d);
                    dependents[d].push(i);
                }
            }
            dependencies.push(deps);
        }

        let graph = Self {
            steps,
            index,
            dependencies,
            dependents,
        };
        graph.detect_cycles()?;
        Ok(graph)
    }

    /// Returns the number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if the graph has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Returns the step at `idx`.
    #[must_use]
    pub fn step(&self, idx: usize) -> &Step {
        &self.steps[idx]
    }

    /// Returns the name of the step at `idx`.
    #[must_use]
    pub fn name(&self, idx: usize) -> &str {
        &self.steps[idx].name
    }

    /// Looks up a step index by name.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Returns the indices the step at `idx` depends on.
    #[must_use]
    pub fn dependencies(&self, idx: usize) -> &[usize] {
        &self.dependencies[idx]
    }

    /// Returns the indices that depend on the step at `idx`.
    #[must_use]
    pub fn dependents(&self, idx: usize) -> &[usize] {
        &self.dependents[idx]
    }

    /// Returns indices of steps with no dependencies, in declaration order.
    #[must_use]
    pub fn roots(&self) -> Vec<usize> {
        (0..self.len())
            .filter(|&i| self.dependencies[i].is_empty())
            .collect()
    }

    /// Returns a topological order, preferring lower declaration indices.
    ///
    /// This is exactly the order a sequential run follows when no step fails
    /// or is skipped.
    #[must_use]
    pub fn topological_order(&self) -> Vec<usize> {
        let mut remaining: Vec<usize> = self.dependencies.iter().map(Vec::len).collect();
        let mut ready: BinaryHeap<Reverse<usize>> = self.roots().into_iter().map(Reverse).collect();
        let mut order = Vec::with_capacity(self.len());

        while let Some(Reverse(i)) = ready.pop() {
            order.push(i);
            for &child in &self.dependents[i] {
                remaining[child] -= 1;
                if remaining[child] == 0 {
                    ready.push(Reverse(child));
                }
            }
        }

        order
    }

    /// Returns step names in [`topological_order`](Self::topological_order).
    #[must_use]
    pub fn plan(&self) -> Vec<String> {
        self.topological_order()
            .into_iter()
            .map(|i| self.steps[i].name.clone())
            .collect()
    }

    fn detect_cycles(&self) -> Result<(), GraphError> {
        let mut marks = vec![Mark::Unvisited; self.len()];
        let mut path = Vec::new();

        for i in 0..self.len() {
            if marks[i] == Mark::Unvisited {
                if let Some(cycle) = self.visit(i, &mut marks, &mut path) {
                    return Err(GraphError::CycleDetected {
                        cycle: cycle.into_iter().map(|c| self.steps[c].name.clone()).collect(),
                    });
                }
            }
        }

        Ok(())
    }

    fn visit(&self, node: usize, marks: &mut [Mark], path: &mut Vec<usize>) -> Option<Vec<usize>> {
        marks[node] = Mark::Visiting;
        path.push(node);

        for &dep in &self.dependencies[node] {
            match marks[dep] {
                Mark::Unvisited => {
                    if let Some(cycle) = self.visit(dep, marks, path) {
                        return Some(cycle);
                    }
                }
                Mark::Visiting => {
                    let start = path.iter().position(|&n| n == dep).unwrap_or(0);
                    let mut cycle = path[start..].to_vec();
                    cycle.push(dep);
                    return Some(cycle);
                }
                Mark::Done => {}
            }
        }

        path.pop();
        marks[node] = Mark::Done;
        None
    }
}
