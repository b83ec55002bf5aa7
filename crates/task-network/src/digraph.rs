//! Adjacency storage shared by the hierarchy and dependency relations.
//!
//! Both relations are directed graphs over [`Uid`] nodes backed by a petgraph
//! [`DiGraphMap`]. This type knows nothing about the invariants either
//! relation enforces; it provides the traversals and sub-graph copies they
//! are built from.

use crate::{Error, Result, TaskSet, Uid};
use petgraph::Direction::{self, Incoming, Outgoing};
use petgraph::algo::{has_path_connecting, is_cyclic_directed, toposort};
use petgraph::graphmap::DiGraphMap;
use std::collections::VecDeque;

/// Predicate marking a task whose neighbours must not be traversed.
pub type StopCondition<'a> = &'a dyn Fn(Uid) -> bool;

#[derive(Debug, Clone, Default)]
pub(crate) struct TaskDigraph {
    graph: DiGraphMap<Uid, ()>,
}

impl TaskDigraph {
    pub(crate) fn contains(&self, task: Uid) -> bool {
        self.graph.contains_node(task)
    }

    pub(crate) fn require(&self, task: Uid) -> Result<()> {
        if self.contains(task) {
            Ok(())
        } else {
            Err(Error::task_does_not_exist(task))
        }
    }

    /// Collect `tasks` into a set, failing on the first one that is absent.
    pub(crate) fn require_all(&self, tasks: impl IntoIterator<Item = Uid>) -> Result<TaskSet> {
        let tasks: TaskSet = tasks.into_iter().collect();
        for &task in &tasks {
            self.require(task)?;
        }
        Ok(tasks)
    }

    pub(crate) fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub(crate) fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub(crate) fn nodes(&self) -> impl Iterator<Item = Uid> + '_ {
        self.graph.nodes()
    }

    pub(crate) fn node_set(&self) -> TaskSet {
        self.graph.nodes().collect()
    }

    pub(crate) fn edges(&self) -> impl Iterator<Item = (Uid, Uid)> + '_ {
        self.graph.all_edges().map(|(from, to, _)| (from, to))
    }

    /// Insert a node, returning `false` if it was already present.
    pub(crate) fn insert_node(&mut self, task: Uid) -> bool {
        if self.contains(task) {
            return false;
        }
        self.graph.add_node(task);
        true
    }

    pub(crate) fn remove_node(&mut self, task: Uid) -> bool {
        self.graph.remove_node(task)
    }

    /// Insert an edge, adding missing endpoints.
    pub(crate) fn insert_edge(&mut self, from: Uid, to: Uid) {
        self.graph.add_edge(from, to, ());
    }

    pub(crate) fn remove_edge(&mut self, from: Uid, to: Uid) -> bool {
        self.graph.remove_edge(from, to).is_some()
    }

    pub(crate) fn contains_edge(&self, from: Uid, to: Uid) -> bool {
        self.graph.contains_edge(from, to)
    }

    pub(crate) fn neighbours(&self, task: Uid, direction: Direction) -> impl Iterator<Item = Uid> + '_ {
        self.graph.neighbors_directed(task, direction)
    }

    pub(crate) fn successors(&self, task: Uid) -> impl Iterator<Item = Uid> + '_ {
        self.neighbours(task, Outgoing)
    }

    pub(crate) fn predecessors(&self, task: Uid) -> impl Iterator<Item = Uid> + '_ {
        self.neighbours(task, Incoming)
    }

    pub(crate) fn has_successors(&self, task: Uid) -> bool {
        self.successors(task).next().is_some()
    }

    pub(crate) fn has_predecessors(&self, task: Uid) -> bool {
        self.predecessors(task).next().is_some()
    }

    pub(crate) fn is_isolated(&self, task: Uid) -> bool {
        !self.has_successors(task) && !self.has_predecessors(task)
    }

    /// Whether a path of length one or more runs from `from` to `to`.
    pub(crate) fn has_path(&self, from: Uid, to: Uid) -> bool {
        if from == to {
            return self.successors(from).any(|next| self.has_path(next, to));
        }
        has_path_connecting(&self.graph, from, to, None)
    }

    pub(crate) fn is_cyclic(&self) -> bool {
        is_cyclic_directed(&self.graph)
    }

    /// Tasks in topological order, or a task on some cycle.
    pub(crate) fn topological_order(&self) -> std::result::Result<Vec<Uid>, Uid> {
        toposort(&self.graph, None).map_err(|cycle| cycle.node_id())
    }

    /// All tasks reachable from `tasks` in `direction`, excluding the starting
    /// tasks unless they are reachable from one another.
    pub(crate) fn reachable(&self, tasks: &TaskSet, direction: Direction) -> TaskSet {
        let mut reached = TaskSet::new();
        let mut to_visit: VecDeque<Uid> = tasks
            .iter()
            .flat_map(|&task| self.neighbours(task, direction))
            .collect();

        while let Some(task) = to_visit.pop_front() {
            if reached.insert(task) {
                to_visit.extend(self.neighbours(task, direction));
            }
        }
        reached
    }

    pub(crate) fn descendants(&self, tasks: &TaskSet) -> TaskSet {
        self.reachable(tasks, Outgoing)
    }

    pub(crate) fn ancestors(&self, tasks: &TaskSet) -> TaskSet {
        self.reachable(tasks, Incoming)
    }

    /// Copy the tasks reachable from `tasks` in `direction`, together with the
    /// edges traversed, out of `source`.
    ///
    /// Tasks matching `stop` are copied but not expanded. Returns every task
    /// visited, starting tasks included.
    pub(crate) fn copy_reachable(
        &mut self,
        source: &Self,
        tasks: &TaskSet,
        direction: Direction,
        stop: Option<StopCondition<'_>>,
    ) -> TaskSet {
        let mut to_check: VecDeque<Uid> = tasks.iter().copied().collect();
        let mut checked = TaskSet::new();

        for &task in tasks {
            self.insert_node(task);
        }

        while let Some(task) = to_check.pop_front() {
            if !checked.insert(task) {
                continue;
            }
            if stop.is_some_and(|stop| stop(task)) {
                continue;
            }
            for neighbour in source.neighbours(task, direction) {
                match direction {
                    Outgoing => self.insert_edge(task, neighbour),
                    Incoming => self.insert_edge(neighbour, task),
                }
                to_check.push_back(neighbour);
            }
        }
        checked
    }

    /// Copy every edge lying on a path from some source to some target.
    ///
    /// Fails when a target cannot be reached from any source. A task that is
    /// both a source and a target connects to itself.
    pub(crate) fn copy_connecting(
        &mut self,
        source: &Self,
        sources: &TaskSet,
        targets: &TaskSet,
    ) -> Result<TaskSet> {
        let mut downstream = Self::default();
        downstream.copy_reachable(source, sources, Outgoing, None);

        if targets.iter().any(|&target| !downstream.contains(target)) {
            return Err(Error::no_connecting_subgraph(
                sources.iter().copied(),
                targets.iter().copied(),
            ));
        }

        Ok(self.copy_reachable(&downstream, targets, Incoming, None))
    }

    /// Copy the weakly connected component containing `task`.
    pub(crate) fn copy_component(&mut self, source: &Self, task: Uid) -> TaskSet {
        let mut to_check = VecDeque::from([task]);
        let mut checked = TaskSet::new();
        self.insert_node(task);

        while let Some(task) = to_check.pop_front() {
            if !checked.insert(task) {
                continue;
            }
            for predecessor in source.predecessors(task) {
                self.insert_edge(predecessor, task);
                to_check.push_back(predecessor);
            }
            for successor in source.successors(task) {
                self.insert_edge(task, successor);
                to_check.push_back(successor);
            }
        }
        checked
    }
}

impl PartialEq for TaskDigraph {
    fn eq(&self, other: &Self) -> bool {
        self.node_count() == other.node_count()
            && self.edge_count() == other.edge_count()
            && self.nodes().all(|task| other.contains(task))
            && self.edges().all(|(from, to)| other.contains_edge(from, to))
    }
}

impl Eq for TaskDigraph {}

#[cfg(test)]
mod tests {
    use super::*;

    fn uid(n: u64) -> Uid {
        Uid::new(n)
    }

    fn set(tasks: &[u64]) -> TaskSet {
        tasks.iter().copied().map(Uid::new).collect()
    }

    fn chain(edges: &[(u64, u64)]) -> TaskDigraph {
        let mut graph = TaskDigraph::default();
        for &(from, to) in edges {
            graph.insert_edge(uid(from), uid(to));
        }
        graph
    }

    #[test]
    fn test_descendants_exclude_start() {
        let graph = chain(&[(1, 2), (2, 3), (1, 4)]);
        assert_eq!(graph.descendants(&set(&[1])), set(&[2, 3, 4]));
        assert_eq!(graph.ancestors(&set(&[3])), set(&[1, 2]));
    }

    #[test]
    fn test_has_path_requires_an_edge() {
        let graph = chain(&[(1, 2), (2, 3)]);
        assert!(graph.has_path(uid(1), uid(3)));
        assert!(!graph.has_path(uid(3), uid(1)));
        assert!(!graph.has_path(uid(1), uid(1)));
    }

    #[test]
    fn test_copy_connecting_keeps_only_paths_between() {
        let source = chain(&[(1, 2), (2, 3), (1, 4), (5, 3)]);
        let mut copy = TaskDigraph::default();
        let tasks = copy
            .copy_connecting(&source, &set(&[1]), &set(&[3]))
            .unwrap();

        assert_eq!(tasks, set(&[1, 2, 3]));
        assert_eq!(copy, chain(&[(1, 2), (2, 3)]));
    }

    #[test]
    fn test_copy_connecting_fails_for_unreachable_target() {
        let source = chain(&[(1, 2), (3, 4)]);
        let mut copy = TaskDigraph::default();
        let err = copy
            .copy_connecting(&source, &set(&[1]), &set(&[4]))
            .unwrap_err();
        assert!(matches!(err, Error::NoConnectingSubgraph { .. }));
    }

    #[test]
    fn test_copy_reachable_honours_stop_condition() {
        let source = chain(&[(1, 2), (2, 3)]);
        let mut copy = TaskDigraph::default();
        let stop = |task: Uid| task == uid(2);
        let visited = copy.copy_reachable(&source, &set(&[1]), Outgoing, Some(&stop));

        assert_eq!(visited, set(&[1, 2]));
        assert_eq!(copy, chain(&[(1, 2)]));
    }

    #[test]
    fn test_copy_component_is_undirected() {
        let source = chain(&[(1, 2), (3, 2), (4, 5)]);
        let mut copy = TaskDigraph::default();
        let tasks = copy.copy_component(&source, uid(1));
        assert_eq!(tasks, set(&[1, 2, 3]));
    }

    #[test]
    fn test_equality_ignores_insertion_order() {
        let left = chain(&[(1, 2), (3, 4)]);
        let right = chain(&[(3, 4), (1, 2)]);
        assert_eq!(left, right);
        assert_ne!(left, chain(&[(1, 2)]));
    }
}
