//! Sub-pipeline flattening.
//!
//! Nested pipelines are collapsed into one flat step list before graph
//! validation:
//! - a sub-pipeline step with no declared dependencies (an entry step)
//!   inherits the dependencies given when the sub-pipeline was attached;
//! - a sub-pipeline's name can be used as a dependency and stands for every
//!   step inside it.

use crate::errors::GraphError;
use crate::steps::Step;
use std::collections::{HashMap, HashSet};

/// One declared member of a pipeline.
#[derive(Debug, Clone)]
pub(crate) enum PipelineEntry {
    /// A plain step.
    Step(Step),
    /// An attached sub-pipeline.
    SubPipeline {
        name: String,
        entries: Vec<PipelineEntry>,
        depends_on: Vec<String>,
    },
}

impl PipelineEntry {
    pub(crate) fn name(&self) -> &str {
        match self {
            Self::Step(step) => &step.name,
            Self::SubPipeline { name, .. } => name,
        }
    }
}

/// Steps contributed by one attached sub-pipeline.
#[derive(Debug)]
struct Group {
    members: Vec<String>,
    entry_deps: Vec<String>,
}

/// Flattens entries into steps in declaration order, with sub-pipeline
/// names expanded to their member steps.
pub(crate) fn flatten(entries: &[PipelineEntry]) -> Result<Vec<Step>, GraphError> {
    let mut steps = Vec::new();
    let mut groups: HashMap<String, Group> = HashMap::new();
    collect(entries, &[], &mut steps, &mut groups)?;

    let step_names: HashSet<&str> = steps.iter().map(|s| s.name.as_str()).collect();
    if let Some(name) = groups.keys().find(|g| step_names.contains(g.as_str())) {
        return Err(GraphError::DuplicateStep { name: name.clone() });
    }

    if !groups.is_empty() {
        for step in &mut steps {
            if step.depends_on.iter().any(|d| groups.contains_key(d)) {
                step.depends_on = expand(&step.depends_on, &groups);
            }
        }
    }

    Ok(steps)
}

fn collect(
    entries: &[PipelineEntry],
    inherited: &[String],
    steps: &mut Vec<Step>,
    groups: &mut HashMap<String, Group>,
) -> Result<(), GraphError> {
    for entry in entries {
        match entry {
            PipelineEntry::Step(step) => {
                let mut step = step.clone();
                if step.depends_on.is_empty() {
                    step.depends_on = inherited.to_vec();
                }
                steps.push(step);
            }
            PipelineEntry::SubPipeline {
                name,
                entries,
                depends_on,
            } => {
                if name.trim().is_empty() {
                    return Err(GraphError::EmptyName);
                }
                if groups.contains_key(name) {
                    return Err(GraphError::DuplicateStep { name: name.clone() });
                }

                // An attachment without dependencies leaves its entry steps as
                // entry steps of the enclosing pipeline.
                let entry_deps = if depends_on.is_empty() {
                    inherited
                } else {
                    depends_on.as_slice()
                };

                let start = steps.len();
                collect(entries, entry_deps, steps, groups)?;
                let members = steps[start..].iter().map(|s| s.name.clone()).collect();
                groups.insert(
                    name.clone(),
                    Group {
                        members,
                        entry_deps: entry_deps.to_vec(),
                    },
                );
            }
        }
    }
    Ok(())
}

fn expand(depends_on: &[String], groups: &HashMap<String, Group>) -> Vec<String> {
    let mut expanded: Vec<String> = Vec::with_capacity(depends_on.len());
    let mut visited: HashSet<&str> = HashSet::new();
    for dep in depends_on {
        resolve(dep, groups, &mut visited, &mut expanded);
    }
    expanded
}

/// Resolves one dependency name to step names. An empty group stands for
/// whatever it was attached after.
fn resolve<'a>(
    dep: &'a str,
    groups: &'a HashMap<String, Group>,
    visited: &mut HashSet<&'a str>,
    expanded: &mut Vec<String>,
) {
    let Some(group) = groups.get(dep) else {
        if !expanded.iter().any(|e| e == dep) {
            expanded.push(dep.to_string());
        }
        return;
    };
    if !visited.insert(dep) {
        return;
    }

    if group.members.is_empty() {
        for inner in &group.entry_deps {
            resolve(inner, groups, visited, expanded);
        }
    } else {
        for member in &group.members {
            if !expanded.contains(member) {
                expanded.push(member.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn step(name: &str, deps: &[&str]) -> PipelineEntry {
        PipelineEntry::Step(Step::new(name, "svc", "op").with_dependencies(deps.iter().copied()))
    }

    fn sub(name: &str, entries: Vec<PipelineEntry>, deps: &[&str]) -> PipelineEntry {
        PipelineEntry::SubPipeline {
            name: name.into(),
            entries,
            depends_on: deps.iter().map(|d| (*d).to_string()).collect(),
        }
    }

    fn deps_of<'a>(steps: &'a [Step], name: &str) -> &'a [String] {
        &steps.iter().find(|s| s.name == name).unwrap().depends_on
    }

    #[test]
    fn test_entry_steps_inherit_attachment_deps() {
        let steps = flatten(&[
            step("setup", &[]),
            sub("checks", vec![step("lint", &[]), step("format", &["lint"])], &["setup"]),
        ])
        .unwrap();

        let names: Vec<&str> = steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["setup", "lint", "format"]);
        assert_eq!(deps_of(&steps, "lint"), &["setup".to_string()]);
        assert_eq!(deps_of(&steps, "format"), &["lint".to_string()]);
    }

    #[test]
    fn test_group_name_expands_to_members() {
        let steps = flatten(&[
            sub("checks", vec![step("lint", &[]), step("format", &["lint"])], &[]),
            step("report", &["checks"]),
        ])
        .unwrap();

        assert_eq!(
            deps_of(&steps, "report"),
            &["lint".to_string(), "format".to_string()]
        );
    }

    #[test]
    fn test_nested_sub_pipeline_inherits_outer_deps() {
        let inner = sub("inner", vec![step("deep", &[])], &[]);
        let steps = flatten(&[
            step("root", &[]),
            sub("outer", vec![inner, step("after", &["inner"])], &["root"]),
        ])
        .unwrap();

        assert_eq!(deps_of(&steps, "deep"), &["root".to_string()]);
        assert_eq!(deps_of(&steps, "after"), &["deep".to_string()]);
    }

    #[test]
    fn test_group_name_collides_with_step() {
        let err = flatten(&[step("checks", &[]), sub("checks", vec![step("lint", &[])], &[])]).unwrap_err();
        assert_eq!(err, GraphError::DuplicateStep { name: "checks".into() });
    }

    #[test]
    fn test_empty_sub_pipeline_releases_dependents() {
        let steps = flatten(&[sub("nothing", Vec::new(), &[]), step("next", &["nothing"])]).unwrap();
        assert!(deps_of(&steps, "next").is_empty());
    }

    #[test]
    fn test_empty_sub_pipeline_stands_for_its_attachment_deps() {
        let steps = flatten(&[
            step("next", &["nothing"]),
            step("setup", &[]),
            sub("nothing", Vec::new(), &["setup"]),
        ])
        .unwrap();
        assert_eq!(deps_of(&steps, "next"), &["setup".to_string()]);
    }

    #[test]
    fn test_chained_empty_sub_pipelines_resolve_through() {
        let steps = flatten(&[
            step("setup", &[]),
            sub("checks", vec![step("lint", &[])], &["setup"]),
            sub("empty-a", Vec::new(), &["checks"]),
            sub("empty-b", Vec::new(), &["empty-a"]),
            step("report", &["empty-b"]),
        ])
        .unwrap();
        assert_eq!(deps_of(&steps, "report"), &["lint".to_string()]);
    }

    #[test]
    fn test_self_referencing_empty_sub_pipeline_terminates() {
        let steps = flatten(&[sub("loop", Vec::new(), &["loop"]), step("next", &["loop"])]).unwrap();
        assert!(deps_of(&steps, "next").is_empty());
    }
}
