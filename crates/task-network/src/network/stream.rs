//! Lazy downstream and upstream traversal.
//!
//! A task is downstream of another when it follows it through dependencies,
//! where a task inherits the dependencies of all of its superiors and passes
//! its downstream status on to all of its inferiors. Upstream is the mirror
//! relation.

use crate::{DependencyGraph, HierarchyGraph, Result, Uid};
use petgraph::Direction::{self, Incoming, Outgoing};
use std::collections::{BTreeSet, VecDeque};
use std::iter::FusedIterator;

/// Which way a stream traversal follows dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamDirection {
    /// Towards dependents.
    Downstream,
    /// Towards dependees.
    Upstream,
}

impl StreamDirection {
    pub(crate) const fn dependency_direction(self) -> Direction {
        match self {
            Self::Downstream => Outgoing,
            Self::Upstream => Incoming,
        }
    }
}

/// Iterator over the tasks downstream (or upstream) of a set of tasks.
///
/// Each task is yielded at most once. The starting tasks are yielded only
/// if they are reachable from one another. Supertasks reached while climbing
/// the hierarchy are not yielded unless they are reached some other way;
/// only their dependency neighbours are followed.
///
/// The iterator borrows the graph, so it must be consumed or dropped before
/// the graph can be mutated again.
#[derive(Debug, Clone)]
pub struct StreamTasks<'a> {
    hierarchy: &'a HierarchyGraph,
    dependency: &'a DependencyGraph,
    direction: Direction,
    via_dependency: VecDeque<Uid>,
    via_subtask: VecDeque<Uid>,
    via_supertask: VecDeque<Uid>,
    yielded: BTreeSet<Uid>,
    supertasks_checked: BTreeSet<Uid>,
}

impl<'a> StreamTasks<'a> {
    pub(crate) fn new(
        hierarchy: &'a HierarchyGraph,
        dependency: &'a DependencyGraph,
        tasks: impl IntoIterator<Item = Uid>,
        direction: StreamDirection,
    ) -> Result<Self> {
        let tasks = dependency.digraph().require_all(tasks)?;
        let direction = direction.dependency_direction();

        let mut walk = Self {
            hierarchy,
            dependency,
            direction,
            via_dependency: VecDeque::new(),
            via_subtask: VecDeque::new(),
            via_supertask: VecDeque::new(),
            yielded: BTreeSet::new(),
            supertasks_checked: BTreeSet::new(),
        };
        for task in tasks {
            walk.via_dependency
                .extend(dependency.digraph().neighbours(task, direction));
            walk.via_supertask.extend(hierarchy.supertasks_of(task));
        }
        Ok(walk)
    }

    fn visit(&mut self, task: Uid) {
        let hierarchy = self.hierarchy;
        let dependency = self.dependency.digraph();

        self.via_dependency
            .extend(dependency.neighbours(task, self.direction));
        self.via_subtask.extend(hierarchy.subtasks_of(task));
        self.via_supertask.extend(hierarchy.supertasks_of(task));
    }
}

impl Iterator for StreamTasks<'_> {
    type Item = Uid;

    fn next(&mut self) -> Option<Uid> {
        loop {
            if let Some(task) = self
                .via_dependency
                .pop_front()
                .or_else(|| self.via_subtask.pop_front())
            {
                if self.yielded.insert(task) {
                    self.visit(task);
                    return Some(task);
                }
                continue;
            }

            let supertask = self.via_supertask.pop_front()?;
            if self.supertasks_checked.insert(supertask) {
                let hierarchy = self.hierarchy;
                let dependency = self.dependency.digraph();
                self.via_supertask.extend(hierarchy.supertasks_of(supertask));
                self.via_dependency
                    .extend(dependency.neighbours(supertask, self.direction));
            }
        }
    }
}

impl FusedIterator for StreamTasks<'_> {}

#[cfg(test)]
mod tests {
    use crate::{NetworkView, TaskSet, Uid, UnconstrainedNetworkGraph};

    fn uid(n: u64) -> Uid {
        Uid::new(n)
    }

    fn set(tasks: &[u64]) -> TaskSet {
        tasks.iter().copied().map(Uid::new).collect()
    }

    fn network(
        tasks: u64,
        hierarchies: &[(u64, u64)],
        dependencies: &[(u64, u64)],
    ) -> UnconstrainedNetworkGraph {
        let mut graph = UnconstrainedNetworkGraph::new();
        for task in 1..=tasks {
            graph.add_task(uid(task)).unwrap();
        }
        for &(supertask, subtask) in hierarchies {
            graph.add_hierarchy(uid(supertask), uid(subtask)).unwrap();
        }
        for &(dependee, dependent) in dependencies {
            graph.add_dependency(uid(dependee), uid(dependent)).unwrap();
        }
        graph
    }

    #[test]
    fn test_subtasks_of_downstream_tasks_are_downstream() {
        let graph = network(4, &[(2, 3), (3, 4)], &[(1, 2)]);
        let downstream: TaskSet = graph.downstream_tasks([uid(1)]).unwrap().collect();
        assert_eq!(downstream, set(&[2, 3, 4]));
    }

    #[test]
    fn test_dependents_of_supertasks_are_downstream() {
        let graph = network(3, &[(1, 2)], &[(1, 3)]);
        let downstream: TaskSet = graph.downstream_tasks([uid(2)]).unwrap().collect();
        assert_eq!(downstream, set(&[3]));
    }

    #[test]
    fn test_supertasks_are_not_downstream_of_their_parts() {
        let graph = network(3, &[(3, 2)], &[(1, 2)]);
        let downstream: TaskSet = graph.downstream_tasks([uid(1)]).unwrap().collect();
        assert_eq!(downstream, set(&[2]));
    }

    #[test]
    fn test_own_subtasks_are_not_downstream() {
        let graph = network(2, &[(1, 2)], &[]);
        assert_eq!(graph.downstream_tasks([uid(1)]).unwrap().count(), 0);
    }

    #[test]
    fn test_upstream_mirrors_downstream() {
        let graph = network(5, &[(1, 2), (3, 4)], &[(1, 3), (4, 5)]);
        let upstream: TaskSet = graph.upstream_tasks([uid(5)]).unwrap().collect();
        assert_eq!(upstream, set(&[1, 2, 4]));

        let downstream: TaskSet = graph.downstream_tasks([uid(2)]).unwrap().collect();
        assert_eq!(downstream, set(&[3, 4, 5]));
    }

    #[test]
    fn test_unknown_task_is_rejected() {
        let graph = network(1, &[], &[]);
        assert!(graph.downstream_tasks([uid(9)]).is_err());
    }
}
