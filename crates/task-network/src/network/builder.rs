//! Incremental extraction of network sub-graphs.

use crate::digraph::{StopCondition, TaskDigraph};
use crate::network::stream::{StreamDirection, StreamTasks};
use crate::network::{NetworkGraph, UnconstrainedNetworkGraph};
use crate::{Error, NetworkView, Result, TaskSet, Uid};
use petgraph::Direction::{Incoming, Outgoing};
use std::collections::{BTreeMap, VecDeque};
use tracing::trace;

/// Accumulates a sub-graph of a source network.
///
/// The hierarchy and dependency halves are kept in lock-step: adding an edge
/// to one adds both of its tasks to the other, so [`Self::build`] always
/// yields a graph whose two relations share one task set. Every task and
/// edge added must exist in the source graph.
#[derive(Debug)]
pub struct SubgraphBuilder<'a, G: ?Sized> {
    graph: &'a G,
    hierarchy: TaskDigraph,
    dependency: TaskDigraph,
}

impl<'a, G: NetworkView + ?Sized> SubgraphBuilder<'a, G> {
    /// Start an empty sub-graph of `graph`.
    pub fn new(graph: &'a G) -> Self {
        Self {
            graph,
            hierarchy: TaskDigraph::default(),
            dependency: TaskDigraph::default(),
        }
    }

    fn source_hierarchy(&self) -> &'a TaskDigraph {
        let graph: &'a G = self.graph;
        graph.hierarchy_graph().digraph()
    }

    fn source_dependency(&self) -> &'a TaskDigraph {
        let graph: &'a G = self.graph;
        graph.dependency_graph().digraph()
    }

    /// Check if a task has been added.
    #[must_use]
    pub fn contains_task(&self, task: Uid) -> bool {
        self.dependency.contains(task)
    }

    /// Tasks added so far.
    #[must_use]
    pub fn tasks(&self) -> TaskSet {
        self.dependency.node_set()
    }

    fn insert_task(&mut self, task: Uid) {
        self.hierarchy.insert_node(task);
        self.dependency.insert_node(task);
    }

    fn insert_tasks(&mut self, tasks: &TaskSet) {
        for &task in tasks {
            self.insert_task(task);
        }
    }

    fn insert_hierarchy(&mut self, supertask: Uid, subtask: Uid) {
        self.hierarchy.insert_edge(supertask, subtask);
        self.dependency.insert_node(supertask);
        self.dependency.insert_node(subtask);
    }

    fn insert_dependency(&mut self, dependee_task: Uid, dependent_task: Uid) {
        self.dependency.insert_edge(dependee_task, dependent_task);
        self.hierarchy.insert_node(dependee_task);
        self.hierarchy.insert_node(dependent_task);
    }

    /// Add a single task.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDoesNotExist`] if the source graph lacks the task.
    pub fn add_task(&mut self, task: Uid) -> Result<()> {
        self.source_dependency().require(task)?;
        self.insert_task(task);
        Ok(())
    }

    /// Add a hierarchy and both of its tasks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDoesNotExist`] or [`Error::HierarchyDoesNotExist`]
    /// if the source graph lacks a task or the hierarchy.
    pub fn add_hierarchy(&mut self, supertask: Uid, subtask: Uid) -> Result<()> {
        let source = self.source_hierarchy();
        source.require(supertask)?;
        source.require(subtask)?;
        if !source.contains_edge(supertask, subtask) {
            return Err(Error::HierarchyDoesNotExist { supertask, subtask });
        }
        self.insert_hierarchy(supertask, subtask);
        Ok(())
    }

    /// Add a dependency and both of its tasks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDoesNotExist`] or [`Error::DependencyDoesNotExist`]
    /// if the source graph lacks a task or the dependency.
    pub fn add_dependency(&mut self, dependee_task: Uid, dependent_task: Uid) -> Result<()> {
        let source = self.source_dependency();
        source.require(dependee_task)?;
        source.require(dependent_task)?;
        if !source.contains_edge(dependee_task, dependent_task) {
            return Err(Error::DependencyDoesNotExist {
                dependee_task,
                dependent_task,
            });
        }
        self.insert_dependency(dependee_task, dependent_task);
        Ok(())
    }

    /// Copy a sub-graph of one relation and mirror its tasks into the other.
    fn copy_hierarchy_with<F>(&mut self, copy: F) -> Result<TaskSet>
    where
        F: FnOnce(&mut TaskDigraph, &TaskDigraph) -> Result<TaskSet>,
    {
        let source = self.source_hierarchy();
        let added = copy(&mut self.hierarchy, source)?;
        for &task in &added {
            self.dependency.insert_node(task);
        }
        Ok(added)
    }

    fn copy_dependency_with<F>(&mut self, copy: F) -> Result<TaskSet>
    where
        F: FnOnce(&mut TaskDigraph, &TaskDigraph) -> Result<TaskSet>,
    {
        let source = self.source_dependency();
        let added = copy(&mut self.dependency, source)?;
        for &task in &added {
            self.hierarchy.insert_node(task);
        }
        Ok(added)
    }

    /// Add the given tasks, all of their superiors, and the hierarchies between them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDoesNotExist`] if any task is absent.
    pub fn add_superior_subgraph(
        &mut self,
        tasks: impl IntoIterator<Item = Uid>,
        stop: Option<StopCondition<'_>>,
    ) -> Result<TaskSet> {
        let tasks = self.source_hierarchy().require_all(tasks)?;
        self.copy_hierarchy_with(|builder, source| {
            Ok(builder.copy_reachable(source, &tasks, Incoming, stop))
        })
    }

    /// Add the given tasks, all of their inferiors, and the hierarchies between them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDoesNotExist`] if any task is absent.
    pub fn add_inferior_subgraph(
        &mut self,
        tasks: impl IntoIterator<Item = Uid>,
        stop: Option<StopCondition<'_>>,
    ) -> Result<TaskSet> {
        let tasks = self.source_hierarchy().require_all(tasks)?;
        self.copy_hierarchy_with(|builder, source| {
            Ok(builder.copy_reachable(source, &tasks, Outgoing, stop))
        })
    }

    /// Add the hierarchies on every path from a source down to a target.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDoesNotExist`] for an absent task and
    /// [`Error::NoConnectingSubgraph`] if a target is not an inferior-or-self
    /// of any source.
    pub fn add_hierarchy_connecting_subgraph(
        &mut self,
        sources: impl IntoIterator<Item = Uid>,
        targets: impl IntoIterator<Item = Uid>,
    ) -> Result<TaskSet> {
        let hierarchy = self.source_hierarchy();
        let sources = hierarchy.require_all(sources)?;
        let targets = hierarchy.require_all(targets)?;
        self.copy_hierarchy_with(|builder, source| {
            builder.copy_connecting(source, &sources, &targets)
        })
    }

    /// Add every task connected to `task` through hierarchies.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDoesNotExist`] if the task is absent.
    pub fn add_hierarchy_component_subgraph(&mut self, task: Uid) -> Result<TaskSet> {
        self.source_hierarchy().require(task)?;
        self.copy_hierarchy_with(|builder, source| Ok(builder.copy_component(source, task)))
    }

    /// Add the given tasks, every task they transitively depend on, and the
    /// dependencies between them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDoesNotExist`] if any task is absent.
    pub fn add_proceeding_subgraph(
        &mut self,
        tasks: impl IntoIterator<Item = Uid>,
        stop: Option<StopCondition<'_>>,
    ) -> Result<TaskSet> {
        let tasks = self.source_dependency().require_all(tasks)?;
        self.copy_dependency_with(|builder, source| {
            Ok(builder.copy_reachable(source, &tasks, Incoming, stop))
        })
    }

    /// Add the given tasks, every task transitively depending on them, and the
    /// dependencies between them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDoesNotExist`] if any task is absent.
    pub fn add_following_subgraph(
        &mut self,
        tasks: impl IntoIterator<Item = Uid>,
        stop: Option<StopCondition<'_>>,
    ) -> Result<TaskSet> {
        let tasks = self.source_dependency().require_all(tasks)?;
        self.copy_dependency_with(|builder, source| {
            Ok(builder.copy_reachable(source, &tasks, Outgoing, stop))
        })
    }

    /// Add the dependencies on every path from a source to a target.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDoesNotExist`] for an absent task and
    /// [`Error::NoConnectingSubgraph`] if a target does not follow any source.
    pub fn add_dependency_connecting_subgraph(
        &mut self,
        sources: impl IntoIterator<Item = Uid>,
        targets: impl IntoIterator<Item = Uid>,
    ) -> Result<TaskSet> {
        let dependency = self.source_dependency();
        let sources = dependency.require_all(sources)?;
        let targets = dependency.require_all(targets)?;
        self.copy_dependency_with(|builder, source| {
            builder.copy_connecting(source, &sources, &targets)
        })
    }

    /// Add every task connected to `task` through dependencies.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDoesNotExist`] if the task is absent.
    pub fn add_dependency_component_subgraph(&mut self, task: Uid) -> Result<TaskSet> {
        self.source_dependency().require(task)?;
        self.copy_dependency_with(|builder, source| Ok(builder.copy_component(source, task)))
    }

    /// Add the given tasks and everything downstream of them.
    ///
    /// Supertasks that are not downstream themselves are added only where
    /// they carry a dependency that makes other tasks downstream, together
    /// with the hierarchies linking them back down to the tasks they contain.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDoesNotExist`] if any task is absent.
    pub fn add_downstream_subgraph(
        &mut self,
        tasks: impl IntoIterator<Item = Uid>,
    ) -> Result<TaskSet> {
        self.add_stream_subgraph(tasks, StreamDirection::Downstream)
    }

    /// Add the given tasks and everything upstream of them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDoesNotExist`] if any task is absent.
    pub fn add_upstream_subgraph(&mut self, tasks: impl IntoIterator<Item = Uid>) -> Result<TaskSet> {
        self.add_stream_subgraph(tasks, StreamDirection::Upstream)
    }

    fn add_stream_subgraph(
        &mut self,
        tasks: impl IntoIterator<Item = Uid>,
        direction: StreamDirection,
    ) -> Result<TaskSet> {
        let hierarchy = self.source_hierarchy();
        let dependency = self.source_dependency();
        let tasks = dependency.require_all(tasks)?;
        let dependency_direction = direction.dependency_direction();
        trace!(?direction, tasks = tasks.len(), "Adding stream sub-graph");

        self.insert_tasks(&tasks);

        let mut via_dependency: VecDeque<Uid> = tasks.iter().copied().collect();
        let mut via_subtask: VecDeque<Uid> = VecDeque::new();
        let mut via_supertask: VecDeque<Uid> = tasks.iter().copied().collect();
        let mut dependency_checked = TaskSet::new();
        let mut subtasks_checked = TaskSet::new();
        let mut supertasks_checked = TaskSet::new();

        // Tasks with dependency neighbours, and for each supertask met while
        // climbing, the tasks it was reached from.
        let mut linked_tasks: VecDeque<Uid> = VecDeque::new();
        let mut climbed_hierarchies: BTreeMap<Uid, TaskSet> = BTreeMap::new();

        while !(via_dependency.is_empty() && via_subtask.is_empty() && via_supertask.is_empty()) {
            while let Some(task) = via_dependency.pop_front() {
                if !dependency_checked.insert(task) {
                    continue;
                }
                let mut neighbours = dependency.neighbours(task, dependency_direction).peekable();
                if neighbours.peek().is_some() {
                    linked_tasks.push_back(task);
                }
                for neighbour in neighbours {
                    match direction {
                        StreamDirection::Downstream => self.insert_dependency(task, neighbour),
                        StreamDirection::Upstream => self.insert_dependency(neighbour, task),
                    }
                    via_dependency.push_back(neighbour);
                    via_subtask.push_back(neighbour);
                    via_supertask.push_back(neighbour);
                }
            }

            while let Some(task) = via_subtask.pop_front() {
                if !subtasks_checked.insert(task) {
                    continue;
                }
                for subtask in hierarchy.successors(task) {
                    self.insert_hierarchy(task, subtask);
                    via_dependency.push_back(subtask);
                    via_subtask.push_back(subtask);
                    via_supertask.push_back(subtask);
                }
            }

            while let Some(task) = via_supertask.pop_front() {
                if !supertasks_checked.insert(task) {
                    continue;
                }
                for supertask in hierarchy.predecessors(task) {
                    via_dependency.push_back(supertask);
                    via_supertask.push_back(supertask);
                    climbed_hierarchies.entry(supertask).or_default().insert(task);
                }
            }
        }

        // Keep a climbed supertask only when it carries a dependency, linking
        // it back down to the tasks it was reached from.
        let mut linked_checked = TaskSet::new();
        while let Some(supertask) = linked_tasks.pop_front() {
            if !linked_checked.insert(supertask) {
                continue;
            }
            let Some(subtasks) = climbed_hierarchies.get(&supertask) else {
                continue;
            };
            for &subtask in subtasks {
                self.insert_hierarchy(supertask, subtask);
                linked_tasks.push_back(subtask);
            }
        }

        Ok(dependency_checked
            .into_iter()
            .chain(subtasks_checked)
            .chain(supertasks_checked)
            .filter(|&task| self.contains_task(task))
            .collect())
    }

    /// Add the tasks and edges on every stream path from a source to a target.
    ///
    /// This is the upstream sub-graph of `targets` within the downstream
    /// sub-graph of `sources`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDoesNotExist`] for an absent task and
    /// [`Error::NoConnectingSubgraph`] if some target is not in the
    /// downstream sub-graph of the sources.
    pub fn add_connecting_subgraph(
        &mut self,
        sources: impl IntoIterator<Item = Uid>,
        targets: impl IntoIterator<Item = Uid>,
    ) -> Result<TaskSet> {
        let graph: &'a G = self.graph;
        let dependency = self.source_dependency();
        let sources = dependency.require_all(sources)?;
        let targets = dependency.require_all(targets)?;

        // Connector tasks also land in the downstream sub-graph, so reachability
        // is judged on the stream itself.
        let stream: TaskSet = graph.downstream_tasks(sources.iter().copied())?.collect();
        if targets
            .iter()
            .any(|target| !sources.contains(target) && !stream.contains(target))
        {
            return Err(Error::no_connecting_subgraph(sources, targets));
        }

        let mut downstream = SubgraphBuilder::new(graph);
        downstream.add_downstream_subgraph(sources.iter().copied())?;
        let downstream = downstream.build();

        let mut connecting = SubgraphBuilder::new(&downstream);
        connecting.add_upstream_subgraph(targets.iter().copied())?;
        let connecting = connecting.build();

        Ok(self.merge(&connecting))
    }

    /// Add every task connected to `task` through either relation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDoesNotExist`] if the task is absent.
    pub fn add_component_subgraph(&mut self, task: Uid) -> Result<TaskSet> {
        self.source_dependency().require(task)?;
        Ok(self.insert_component(task))
    }

    fn insert_component(&mut self, task: Uid) -> TaskSet {
        let hierarchy = self.source_hierarchy();
        let dependency = self.source_dependency();
        self.insert_task(task);

        let mut to_check = VecDeque::from([task]);
        let mut checked = TaskSet::new();

        while let Some(task) = to_check.pop_front() {
            if !checked.insert(task) {
                continue;
            }
            for supertask in hierarchy.predecessors(task) {
                self.insert_hierarchy(supertask, task);
                to_check.push_back(supertask);
            }
            for subtask in hierarchy.successors(task) {
                self.insert_hierarchy(task, subtask);
                to_check.push_back(subtask);
            }
            for dependee in dependency.predecessors(task) {
                self.insert_dependency(dependee, task);
                to_check.push_back(dependee);
            }
            for dependent in dependency.successors(task) {
                self.insert_dependency(task, dependent);
                to_check.push_back(dependent);
            }
        }
        checked
    }

    /// Add the whole source graph.
    pub fn add_all(&mut self) -> TaskSet {
        let hierarchy = self.source_hierarchy();
        let dependency = self.source_dependency();

        let tasks = dependency.node_set();
        self.insert_tasks(&tasks);
        for (supertask, subtask) in hierarchy.edges() {
            self.insert_hierarchy(supertask, subtask);
        }
        for (dependee, dependent) in dependency.edges() {
            self.insert_dependency(dependee, dependent);
        }
        tasks
    }

    fn merge(&mut self, subgraph: &UnconstrainedNetworkGraph) -> TaskSet {
        let tasks = subgraph.tasks();
        self.insert_tasks(&tasks);
        for (supertask, subtask) in subgraph.hierarchy_graph().digraph().edges() {
            self.insert_hierarchy(supertask, subtask);
        }
        for (dependee, dependent) in subgraph.dependency_graph().digraph().edges() {
            self.insert_dependency(dependee, dependent);
        }
        tasks
    }

    /// Finish the sub-graph.
    #[must_use]
    pub fn build(self) -> UnconstrainedNetworkGraph {
        UnconstrainedNetworkGraph::from_digraphs(self.hierarchy, self.dependency)
    }
}

impl SubgraphBuilder<'_, NetworkGraph> {
    /// Finish a sub-graph of a constrained network.
    ///
    /// Removing tasks and edges never introduces a cycle, a duplication or a
    /// crossover, so the result needs no further validation.
    #[must_use]
    pub fn build_network(self) -> NetworkGraph {
        NetworkGraph::from_unconstrained_unchecked(self.build())
    }
}

pub(crate) fn stream_subgraph<G: NetworkView + ?Sized>(
    graph: &G,
    tasks: impl IntoIterator<Item = Uid>,
    direction: StreamDirection,
) -> Result<UnconstrainedNetworkGraph> {
    let mut builder = SubgraphBuilder::new(graph);
    builder.add_stream_subgraph(tasks, direction)?;
    Ok(builder.build())
}

/// The stream sub-graph of `tasks` together with the tasks it holds that are
/// neither starting tasks nor in the stream themselves.
pub(crate) fn stream_subgraph_with_connectors<G: NetworkView + ?Sized>(
    graph: &G,
    tasks: impl IntoIterator<Item = Uid>,
    direction: StreamDirection,
) -> Result<(UnconstrainedNetworkGraph, TaskSet)> {
    let tasks = graph.dependency_graph().digraph().require_all(tasks)?;
    let subgraph = stream_subgraph(graph, tasks.iter().copied(), direction)?;
    let stream: TaskSet = StreamTasks::new(
        graph.hierarchy_graph(),
        graph.dependency_graph(),
        tasks.iter().copied(),
        direction,
    )?
    .collect();

    let connectors = subgraph
        .tasks()
        .into_iter()
        .filter(|task| !tasks.contains(task) && !stream.contains(task))
        .collect();
    Ok((subgraph, connectors))
}

pub(crate) fn connecting_subgraph<G: NetworkView + ?Sized>(
    graph: &G,
    sources: impl IntoIterator<Item = Uid>,
    targets: impl IntoIterator<Item = Uid>,
) -> Result<UnconstrainedNetworkGraph> {
    let mut builder = SubgraphBuilder::new(graph);
    builder.add_connecting_subgraph(sources, targets)?;
    Ok(builder.build())
}

pub(crate) fn component_subgraph<G: NetworkView + ?Sized>(
    graph: &G,
    task: Uid,
) -> Result<UnconstrainedNetworkGraph> {
    let mut builder = SubgraphBuilder::new(graph);
    builder.add_component_subgraph(task)?;
    Ok(builder.build())
}

pub(crate) fn component_subgraphs<G: NetworkView + ?Sized>(
    graph: &G,
) -> Vec<UnconstrainedNetworkGraph> {
    let mut covered = TaskSet::new();
    let mut components = Vec::new();

    for task in graph.tasks() {
        if covered.contains(&task) {
            continue;
        }
        let mut builder = SubgraphBuilder::new(graph);
        covered.extend(builder.insert_component(task));
        components.push(builder.build());
    }
    components
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn test_hierarchy_keeps_task_sets_in_step() {
        let graph = network(2, &[(1, 2)], &[]);
        let mut builder = SubgraphBuilder::new(&graph);
        builder.add_hierarchy(uid(1), uid(2)).unwrap();

        let subgraph = builder.build();
        assert_eq!(subgraph.dependency_graph().tasks(), set(&[1, 2]));
        assert_eq!(subgraph.hierarchy_graph().tasks(), set(&[1, 2]));
    }

    #[test]
    fn test_missing_edges_are_rejected() {
        let graph = network(2, &[], &[]);
        let mut builder = SubgraphBuilder::new(&graph);
        assert!(matches!(
            builder.add_hierarchy(uid(1), uid(2)),
            Err(Error::HierarchyDoesNotExist { .. })
        ));
        assert!(matches!(
            builder.add_dependency(uid(1), uid(2)),
            Err(Error::DependencyDoesNotExist { .. })
        ));
        assert!(matches!(
            builder.add_task(uid(3)),
            Err(Error::TaskDoesNotExist { .. })
        ));
    }

    #[test]
    fn test_downstream_subgraph_keeps_linking_supertasks_only() {
        // 4 contains 2 and carries the dependency 4 -> 5; 6 contains 2 but
        // carries nothing.
        let graph = network(6, &[(4, 2), (6, 2)], &[(1, 2), (4, 5), (3, 1)]);
        let mut builder = SubgraphBuilder::new(&graph);
        builder.add_downstream_subgraph([uid(1)]).unwrap();
        let subgraph = builder.build();

        assert_eq!(subgraph.tasks(), set(&[1, 2, 4, 5]));
        assert!(subgraph.hierarchy_graph().has_hierarchy(uid(4), uid(2)));
        assert!(subgraph.dependency_graph().has_dependency(uid(4), uid(5)));
    }

    #[test]
    fn test_component_subgraph_crosses_relations() {
        let graph = network(5, &[(1, 2)], &[(2, 3)]);
        let mut builder = SubgraphBuilder::new(&graph);
        let tasks = builder.add_component_subgraph(uid(3)).unwrap();
        assert_eq!(tasks, set(&[1, 2, 3]));
    }

    #[test]
    fn test_add_all_copies_everything() {
        let graph = network(4, &[(1, 2)], &[(2, 3)]);
        let mut builder = SubgraphBuilder::new(&graph);
        builder.add_all();
        assert_eq!(builder.build(), graph);
    }
}
