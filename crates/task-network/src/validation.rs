//! Whole-graph invariant audit.
//!
//! Graphs built through the validating mutators always pass. The audit
//! exists for graphs assembled some other way and for tests.

// Rust 1.92 compiler bug: false positives for thiserror derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use crate::{NetworkGraph, NetworkView, TaskSet, Uid, UnconstrainedNetworkGraph};
use thiserror::Error;

/// A broken network invariant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// The two relations hold different tasks.
    #[error("Hierarchy and dependency graphs hold different tasks")]
    MismatchedTaskSets {
        /// Tasks present only in the hierarchy graph.
        hierarchy_only: TaskSet,
        /// Tasks present only in the dependency graph.
        dependency_only: TaskSet,
    },

    /// The hierarchy graph contains a cycle.
    #[error("Hierarchy graph contains a cycle")]
    HierarchyCycle,

    /// A hierarchy is implied by a longer hierarchy path.
    #[error("Hierarchy [{supertask}] -> [{subtask}] is redundant")]
    RedundantHierarchy {
        /// Supertask of the redundant hierarchy.
        supertask: Uid,
        /// Sub-task of the redundant hierarchy.
        subtask: Uid,
    },

    /// The dependency graph contains a cycle.
    #[error("Dependency graph contains a cycle")]
    DependencyCycle,

    /// A task is downstream of itself.
    #[error("Task [{task}] is downstream of itself")]
    StreamCycle {
        /// A task on the cycle.
        task: Uid,
    },

    /// Two dependencies whose dependees and dependents are each related by
    /// hierarchy, so one duplicates or crosses the other.
    #[error(
        "Dependencies [{first_dependee}] -> [{first_dependent}] and \
         [{second_dependee}] -> [{second_dependent}] overlap"
    )]
    OverlappingDependencies {
        /// Dependee of the first dependency.
        first_dependee: Uid,
        /// Dependent of the first dependency.
        first_dependent: Uid,
        /// Dependee of the second dependency.
        second_dependee: Uid,
        /// Dependent of the second dependency.
        second_dependent: Uid,
    },
}

/// Result of a network audit.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    /// Whether no invariant is broken.
    pub is_valid: bool,
    /// Every broken invariant found.
    pub violations: Vec<Violation>,
}

impl ValidationResult {
    /// Create a valid result.
    #[must_use]
    pub const fn valid() -> Self {
        Self {
            is_valid: true,
            violations: vec![],
        }
    }

    /// Create an invalid result with violations.
    #[must_use]
    pub const fn invalid(violations: Vec<Violation>) -> Self {
        Self {
            is_valid: false,
            violations,
        }
    }
}

impl From<Vec<Violation>> for ValidationResult {
    fn from(violations: Vec<Violation>) -> Self {
        if violations.is_empty() {
            Self::valid()
        } else {
            Self::invalid(violations)
        }
    }
}

fn network_violations<G: NetworkView + ?Sized>(graph: &G) -> Vec<Violation> {
    let mut violations = Vec::new();
    let hierarchy = graph.hierarchy_graph().digraph();
    let dependency = graph.dependency_graph().digraph();

    let hierarchy_tasks = hierarchy.node_set();
    let dependency_tasks = dependency.node_set();
    if hierarchy_tasks != dependency_tasks {
        violations.push(Violation::MismatchedTaskSets {
            hierarchy_only: hierarchy_tasks
                .difference(&dependency_tasks)
                .copied()
                .collect(),
            dependency_only: dependency_tasks
                .difference(&hierarchy_tasks)
                .copied()
                .collect(),
        });
    }

    if hierarchy.is_cyclic() {
        violations.push(Violation::HierarchyCycle);
    }
    for (supertask, subtask) in hierarchy.edges() {
        let redundant = hierarchy
            .successors(supertask)
            .any(|other| other != subtask && hierarchy.has_path(other, subtask));
        if redundant {
            violations.push(Violation::RedundantHierarchy { supertask, subtask });
        }
    }

    if dependency.is_cyclic() {
        violations.push(Violation::DependencyCycle);
    }

    for task in dependency.nodes() {
        let looped = graph
            .downstream_tasks([task])
            .is_ok_and(|mut downstream| downstream.any(|other| other == task));
        if looped {
            violations.push(Violation::StreamCycle { task });
        }
    }

    violations
}

fn overlapping_dependencies(graph: &NetworkGraph) -> Vec<Violation> {
    let hierarchy = graph.hierarchy_graph().digraph();
    let related = |a: Uid, b: Uid| a == b || hierarchy.has_path(a, b) || hierarchy.has_path(b, a);
    let dependencies: Vec<(Uid, Uid)> = graph.dependency_graph().digraph().edges().collect();

    let mut violations = Vec::new();
    for (index, &(first_dependee, first_dependent)) in dependencies.iter().enumerate() {
        for &(second_dependee, second_dependent) in &dependencies[index + 1..] {
            if related(first_dependee, second_dependee)
                && related(first_dependent, second_dependent)
            {
                violations.push(Violation::OverlappingDependencies {
                    first_dependee,
                    first_dependent,
                    second_dependee,
                    second_dependent,
                });
            }
        }
    }
    violations
}

impl UnconstrainedNetworkGraph {
    /// Audit the network's invariants.
    ///
    /// Checks for:
    /// - Different task sets in the two relations
    /// - Hierarchy cycles and redundant hierarchies
    /// - Dependency cycles
    /// - Tasks downstream of themselves
    #[must_use]
    pub fn validate(&self) -> ValidationResult {
        network_violations(self).into()
    }
}

impl NetworkGraph {
    /// Audit the network's invariants.
    ///
    /// Runs every check of [`UnconstrainedNetworkGraph::validate`] and also
    /// reports pairs of dependencies whose dependees and dependents are each
    /// related by hierarchy.
    #[must_use]
    pub fn validate(&self) -> ValidationResult {
        let mut violations = network_violations(self);
        violations.extend(overlapping_dependencies(self));
        violations.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digraph::TaskDigraph;

    fn uid(n: u64) -> Uid {
        Uid::new(n)
    }

    fn digraph(tasks: &[u64], edges: &[(u64, u64)]) -> TaskDigraph {
        let mut digraph = TaskDigraph::default();
        for &task in tasks {
            digraph.insert_node(uid(task));
        }
        for &(from, to) in edges {
            digraph.insert_edge(uid(from), uid(to));
        }
        digraph
    }

    #[test]
    fn test_validate_empty_graph() {
        let result = UnconstrainedNetworkGraph::new().validate();
        assert!(result.is_valid);
        assert!(result.violations.is_empty());
    }

    #[test]
    fn test_validate_built_graph() {
        let mut graph = NetworkGraph::new();
        for task in 1..=3 {
            graph.add_task(uid(task)).unwrap();
        }
        graph.add_hierarchy(uid(1), uid(2)).unwrap();
        graph.add_dependency(uid(2), uid(3)).unwrap();
        assert!(graph.validate().is_valid);
    }

    #[test]
    fn test_validate_reports_mismatched_tasks() {
        let graph = UnconstrainedNetworkGraph::from_digraphs(
            digraph(&[1, 2], &[]),
            digraph(&[1], &[]),
        );
        let result = graph.validate();
        assert!(!result.is_valid);
        assert!(result.violations.contains(&Violation::MismatchedTaskSets {
            hierarchy_only: TaskSet::from([uid(2)]),
            dependency_only: TaskSet::new(),
        }));
    }

    #[test]
    fn test_validate_reports_redundant_hierarchy() {
        let graph = UnconstrainedNetworkGraph::from_digraphs(
            digraph(&[1, 2, 3], &[(1, 2), (2, 3), (1, 3)]),
            digraph(&[1, 2, 3], &[]),
        );
        let result = graph.validate();
        assert_eq!(
            result.violations,
            vec![Violation::RedundantHierarchy {
                supertask: uid(1),
                subtask: uid(3),
            }]
        );
    }

    #[test]
    fn test_validate_reports_stream_cycle() {
        let graph = UnconstrainedNetworkGraph::from_digraphs(
            digraph(&[1, 2], &[(1, 2)]),
            digraph(&[1, 2], &[(1, 2)]),
        );
        let result = graph.validate();
        assert!(result.violations.contains(&Violation::StreamCycle { task: uid(2) }));
        assert!(!result.violations.contains(&Violation::HierarchyCycle));
    }

    #[test]
    fn test_validate_reports_dependency_cycle() {
        let graph = UnconstrainedNetworkGraph::from_digraphs(
            digraph(&[1, 2], &[]),
            digraph(&[1, 2], &[(1, 2), (2, 1)]),
        );
        let result = graph.validate();
        assert!(result.violations.contains(&Violation::DependencyCycle));
    }

    #[test]
    fn test_validate_reports_overlapping_dependencies() {
        let graph = NetworkGraph::from_unconstrained_unchecked(
            UnconstrainedNetworkGraph::from_digraphs(
                digraph(&[1, 2, 3], &[(1, 2)]),
                digraph(&[1, 2, 3], &[(1, 3), (2, 3)]),
            ),
        );
        let result = graph.validate();
        assert_eq!(result.violations.len(), 1);
        assert!(matches!(
            result.violations[0],
            Violation::OverlappingDependencies { .. }
        ));
        assert!(graph.as_unconstrained().validate().is_valid);
    }

    #[test]
    fn test_unrelated_dependencies_do_not_overlap() {
        let mut graph = NetworkGraph::new();
        for task in 1..=4 {
            graph.add_task(uid(task)).unwrap();
        }
        graph.add_dependency(uid(1), uid(2)).unwrap();
        graph.add_dependency(uid(3), uid(4)).unwrap();
        graph.add_dependency(uid(1), uid(4)).unwrap();
        assert!(graph.validate().is_valid);
    }
}
