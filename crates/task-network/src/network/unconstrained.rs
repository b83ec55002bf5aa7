use crate::digraph::TaskDigraph;
use crate::network::builder::{self, SubgraphBuilder};
use crate::network::stream::StreamDirection;
use crate::snapshot::{self, NetworkSnapshot};
use crate::{DependencyGraph, Error, HierarchyGraph, NetworkView, Result, TaskSet, Uid};
use tracing::{debug, trace};

/// A hierarchy graph and a dependency graph sharing one task set, with no
/// stream cycles.
///
/// Every mutation first runs the owned graph's own checks and then the
/// network cycle check, so a rejected call leaves the graph untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnconstrainedNetworkGraph {
    hierarchy_graph: HierarchyGraph,
    dependency_graph: DependencyGraph,
}

impl UnconstrainedNetworkGraph {
    /// Create an empty network.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Combine an existing hierarchy graph and dependency graph.
    ///
    /// The dependencies are replayed through validation, so the result is
    /// guaranteed free of stream cycles.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MismatchedTaskSets`] if the graphs hold different
    /// tasks, or the error of the first dependency that would introduce a
    /// network cycle.
    pub fn from_parts(
        hierarchy_graph: HierarchyGraph,
        dependency_graph: DependencyGraph,
    ) -> Result<Self> {
        snapshot::check_task_sets(&hierarchy_graph.tasks(), &dependency_graph.tasks())?;

        let mut graph = Self {
            hierarchy_graph,
            dependency_graph: DependencyGraph::new(),
        };
        for task in graph.hierarchy_graph.tasks() {
            graph.dependency_graph.add_task(task)?;
        }
        for (dependee_task, dependent_task) in dependency_graph.dependencies() {
            graph.add_dependency(dependee_task, dependent_task)?;
        }
        Ok(graph)
    }

    /// Rebuild a network from its persisted form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MismatchedTaskSets`] if the two relations list
    /// different tasks, or the first validation error met while replaying
    /// hierarchies and then dependencies.
    pub fn from_snapshot(snapshot: &NetworkSnapshot) -> Result<Self> {
        snapshot::replay(snapshot)
    }

    /// Capture the network in its persisted form.
    #[must_use]
    pub fn to_snapshot(&self) -> NetworkSnapshot {
        NetworkSnapshot::of(self)
    }

    pub(crate) fn from_digraphs(hierarchy: TaskDigraph, dependency: TaskDigraph) -> Self {
        Self {
            hierarchy_graph: HierarchyGraph::from_digraph(hierarchy),
            dependency_graph: DependencyGraph::from_digraph(dependency),
        }
    }

    /// Add a task with no edges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskAlreadyExists`] if the task is present.
    pub fn add_task(&mut self, task: Uid) -> Result<()> {
        if self.dependency_graph.contains_task(task) {
            return Err(Error::TaskAlreadyExists { task });
        }
        self.hierarchy_graph.add_task(task)?;
        self.dependency_graph.add_task(task)?;
        Ok(())
    }

    /// Check that a task exists and has no hierarchies or dependencies.
    ///
    /// # Errors
    ///
    /// Hierarchy preconditions are checked before dependency ones:
    /// [`Error::TaskDoesNotExist`], [`Error::HasSuperTasks`],
    /// [`Error::HasSubTasks`] or [`Error::HasDependencyNeighbours`].
    pub fn validate_task_can_be_removed(&self, task: Uid) -> Result<()> {
        self.hierarchy_graph.validate_task_can_be_removed(task)?;
        self.dependency_graph.validate_task_can_be_removed(task)
    }

    /// Remove a task that has no edges.
    ///
    /// # Errors
    ///
    /// See [`Self::validate_task_can_be_removed`].
    pub fn remove_task(&mut self, task: Uid) -> Result<()> {
        self.validate_task_can_be_removed(task)?;
        self.hierarchy_graph.remove_task(task)?;
        self.dependency_graph.remove_task(task)
    }

    /// Check whether `supertask -> subtask` may be added.
    ///
    /// # Errors
    ///
    /// Returns any error of [`HierarchyGraph::validate_hierarchy_can_be_added`],
    /// then [`Error::HierarchyIntroducesNetworkCycle`] if some inferior-or-self
    /// of `subtask` is already downstream or upstream of `supertask`.
    pub fn validate_hierarchy_can_be_added(&self, supertask: Uid, subtask: Uid) -> Result<()> {
        self.hierarchy_graph
            .validate_hierarchy_can_be_added(supertask, subtask)?;
        self.check_hierarchy_network_cycle(supertask, subtask)
    }

    /// Add a hierarchy after validating it.
    ///
    /// # Errors
    ///
    /// See [`Self::validate_hierarchy_can_be_added`].
    pub fn add_hierarchy(&mut self, supertask: Uid, subtask: Uid) -> Result<()> {
        self.validate_hierarchy_can_be_added(supertask, subtask)
            .inspect_err(|err| debug!(%err, "Rejected network hierarchy"))?;
        self.insert_hierarchy_unchecked(supertask, subtask);
        Ok(())
    }

    pub(crate) fn insert_hierarchy_unchecked(&mut self, supertask: Uid, subtask: Uid) {
        self.hierarchy_graph
            .insert_hierarchy_unchecked(supertask, subtask);
    }

    /// Check whether `supertask -> subtask` may be removed.
    ///
    /// # Errors
    ///
    /// See [`HierarchyGraph::validate_hierarchy_can_be_removed`].
    pub fn validate_hierarchy_can_be_removed(&self, supertask: Uid, subtask: Uid) -> Result<()> {
        self.hierarchy_graph
            .validate_hierarchy_can_be_removed(supertask, subtask)
    }

    /// Remove an existing hierarchy.
    ///
    /// # Errors
    ///
    /// See [`HierarchyGraph::validate_hierarchy_can_be_removed`].
    pub fn remove_hierarchy(&mut self, supertask: Uid, subtask: Uid) -> Result<()> {
        self.hierarchy_graph.remove_hierarchy(supertask, subtask)
    }

    /// Check whether `dependee_task -> dependent_task` may be added.
    ///
    /// # Errors
    ///
    /// Returns any error of [`DependencyGraph::validate_dependency_can_be_added`],
    /// then [`Error::DependencyIntroducesNetworkCycle`] if the dependee would
    /// become downstream of itself.
    pub fn validate_dependency_can_be_added(
        &self,
        dependee_task: Uid,
        dependent_task: Uid,
    ) -> Result<()> {
        self.dependency_graph
            .validate_dependency_can_be_added(dependee_task, dependent_task)?;
        self.check_dependency_network_cycle(dependee_task, dependent_task)
    }

    /// Add a dependency after validating it.
    ///
    /// # Errors
    ///
    /// See [`Self::validate_dependency_can_be_added`].
    pub fn add_dependency(&mut self, dependee_task: Uid, dependent_task: Uid) -> Result<()> {
        self.validate_dependency_can_be_added(dependee_task, dependent_task)
            .inspect_err(|err| debug!(%err, "Rejected network dependency"))?;
        self.insert_dependency_unchecked(dependee_task, dependent_task);
        Ok(())
    }

    pub(crate) fn insert_dependency_unchecked(&mut self, dependee_task: Uid, dependent_task: Uid) {
        self.dependency_graph
            .insert_dependency_unchecked(dependee_task, dependent_task);
    }

    /// Check whether `dependee_task -> dependent_task` may be removed.
    ///
    /// # Errors
    ///
    /// See [`DependencyGraph::validate_dependency_can_be_removed`].
    pub fn validate_dependency_can_be_removed(
        &self,
        dependee_task: Uid,
        dependent_task: Uid,
    ) -> Result<()> {
        self.dependency_graph
            .validate_dependency_can_be_removed(dependee_task, dependent_task)
    }

    /// Remove an existing dependency.
    ///
    /// # Errors
    ///
    /// See [`DependencyGraph::validate_dependency_can_be_removed`].
    pub fn remove_dependency(&mut self, dependee_task: Uid, dependent_task: Uid) -> Result<()> {
        self.dependency_graph
            .remove_dependency(dependee_task, dependent_task)
    }

    /// The given tasks with everything downstream of them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDoesNotExist`] if any task is absent.
    #[tracing::instrument(level = "trace", skip_all)]
    pub fn downstream_subgraph(&self, tasks: impl IntoIterator<Item = Uid>) -> Result<Self> {
        builder::stream_subgraph(self, tasks, StreamDirection::Downstream)
    }

    /// The given tasks with everything upstream of them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDoesNotExist`] if any task is absent.
    #[tracing::instrument(level = "trace", skip_all)]
    pub fn upstream_subgraph(&self, tasks: impl IntoIterator<Item = Uid>) -> Result<Self> {
        builder::stream_subgraph(self, tasks, StreamDirection::Upstream)
    }

    /// Like [`Self::downstream_subgraph`], also returning the connector tasks:
    /// supertasks held only because they carry a dependency into the stream.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDoesNotExist`] if any task is absent.
    pub fn downstream_subgraph_with_connectors(
        &self,
        tasks: impl IntoIterator<Item = Uid>,
    ) -> Result<(Self, TaskSet)> {
        builder::stream_subgraph_with_connectors(self, tasks, StreamDirection::Downstream)
    }

    /// Like [`Self::upstream_subgraph`], also returning the connector tasks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDoesNotExist`] if any task is absent.
    pub fn upstream_subgraph_with_connectors(
        &self,
        tasks: impl IntoIterator<Item = Uid>,
    ) -> Result<(Self, TaskSet)> {
        builder::stream_subgraph_with_connectors(self, tasks, StreamDirection::Upstream)
    }

    /// Every task and edge on a stream path from a source to a target.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDoesNotExist`] for an absent task and
    /// [`Error::NoConnectingSubgraph`] if some target is not downstream of
    /// the sources.
    #[tracing::instrument(level = "trace", skip_all)]
    pub fn connecting_subgraph(
        &self,
        sources: impl IntoIterator<Item = Uid>,
        targets: impl IntoIterator<Item = Uid>,
    ) -> Result<Self> {
        builder::connecting_subgraph(self, sources, targets)
    }

    /// Every task connected to `task` through either relation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDoesNotExist`] if the task is absent.
    pub fn component_subgraph(&self, task: Uid) -> Result<Self> {
        builder::component_subgraph(self, task)
    }

    /// Partition the network into its connected components.
    #[must_use]
    pub fn component_subgraphs(&self) -> Vec<Self> {
        builder::component_subgraphs(self)
    }

    fn check_hierarchy_network_cycle(&self, supertask: Uid, subtask: Uid) -> Result<()> {
        let subtask_closure = self
            .hierarchy_graph
            .inferior_closure(&TaskSet::from([subtask]));
        let supertask_set = TaskSet::from([supertask]);

        // An inferior of the sub-task already downstream of the supertask
        // would inherit the supertask's dependencies and follow itself.
        let downstream: TaskSet = self
            .downstream_tasks([supertask])?
            .filter(|task| subtask_closure.contains(task))
            .collect();
        if !downstream.is_empty() {
            trace!(%supertask, %subtask, "Hierarchy closes a downstream cycle");
            let targets = self.entry_points(
                &downstream,
                &subtask_closure,
                &supertask_set,
                StreamDirection::Downstream,
            )?;
            let mut builder = SubgraphBuilder::new(self);
            builder.add_connecting_subgraph([supertask], targets.iter().copied())?;
            builder.add_hierarchy_connecting_subgraph([subtask], targets)?;
            return Err(Error::HierarchyIntroducesNetworkCycle {
                supertask,
                subtask,
                connecting_subgraph: Box::new(builder.build()),
            });
        }

        let upstream: TaskSet = self
            .upstream_tasks([supertask])?
            .filter(|task| subtask_closure.contains(task))
            .collect();
        if !upstream.is_empty() {
            trace!(%supertask, %subtask, "Hierarchy closes an upstream cycle");
            let sources = self.entry_points(
                &upstream,
                &subtask_closure,
                &supertask_set,
                StreamDirection::Upstream,
            )?;
            let mut builder = SubgraphBuilder::new(self);
            builder.add_connecting_subgraph(sources.iter().copied(), [supertask])?;
            builder.add_hierarchy_connecting_subgraph([subtask], sources)?;
            return Err(Error::HierarchyIntroducesNetworkCycle {
                supertask,
                subtask,
                connecting_subgraph: Box::new(builder.build()),
            });
        }
        Ok(())
    }

    fn check_dependency_network_cycle(&self, dependee_task: Uid, dependent_task: Uid) -> Result<()> {
        let hierarchy = &self.hierarchy_graph;
        let dependee_closure = hierarchy.inferior_closure(&TaskSet::from([dependee_task]));
        let dependent_closure = hierarchy.inferior_closure(&TaskSet::from([dependent_task]));

        // A dependency between a task and one of its own inferiors.
        let lineage = if dependee_closure.contains(&dependent_task) {
            Some((dependee_task, dependent_task))
        } else if dependent_closure.contains(&dependee_task) {
            Some((dependent_task, dependee_task))
        } else {
            None
        };
        if let Some((superior, inferior)) = lineage {
            let mut builder = SubgraphBuilder::new(self);
            builder.add_hierarchy_connecting_subgraph([superior], [inferior])?;
            return Err(Error::DependencyIntroducesNetworkCycle {
                dependee_task,
                dependent_task,
                connecting_subgraph: Box::new(builder.build()),
            });
        }

        // Everything the new dependency would make downstream of the
        // dependee must stay clear of the dependee's inferiors.
        let mut reached = dependent_closure.clone();
        reached.extend(self.downstream_tasks(dependent_closure.iter().copied())?);
        reached.retain(|task| dependee_closure.contains(task));
        if reached.is_empty() {
            return Ok(());
        }

        trace!(%dependee_task, %dependent_task, "Dependency closes a downstream cycle");
        let targets = self.entry_points(
            &reached,
            &dependee_closure,
            &dependent_closure,
            StreamDirection::Downstream,
        )?;
        let mut builder = SubgraphBuilder::new(self);
        let mut roots =
            builder.add_connecting_subgraph(dependent_closure.iter().copied(), targets.iter().copied())?;
        roots.retain(|task| dependent_closure.contains(task));
        builder.add_hierarchy_connecting_subgraph([dependent_task], roots)?;
        builder.add_hierarchy_connecting_subgraph([dependee_task], targets)?;
        Err(Error::DependencyIntroducesNetworkCycle {
            dependee_task,
            dependent_task,
            connecting_subgraph: Box::new(builder.build()),
        })
    }

    /// Narrow `candidates` to those entered from outside `closure` within the
    /// stream sub-graph of `seeds`, falling back to all candidates.
    fn entry_points(
        &self,
        candidates: &TaskSet,
        closure: &TaskSet,
        seeds: &TaskSet,
        direction: StreamDirection,
    ) -> Result<TaskSet> {
        let subgraph = builder::stream_subgraph(self, seeds.iter().copied(), direction)?;
        let hierarchy = subgraph.hierarchy_graph.digraph();
        let dependency = subgraph.dependency_graph.digraph();
        let inwards = direction.dependency_direction().opposite();

        let entries: TaskSet = candidates
            .iter()
            .copied()
            .filter(|&task| {
                dependency.neighbours(task, inwards).next().is_some()
                    || hierarchy
                        .predecessors(task)
                        .any(|supertask| !closure.contains(&supertask))
            })
            .collect();

        if entries.is_empty() {
            Ok(candidates.clone())
        } else {
            Ok(entries)
        }
    }
}

impl NetworkView for UnconstrainedNetworkGraph {
    fn hierarchy_graph(&self) -> &HierarchyGraph {
        &self.hierarchy_graph
    }

    fn dependency_graph(&self) -> &DependencyGraph {
        &self.dependency_graph
    }
}
