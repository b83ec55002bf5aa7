//! The dependency relation: dependees that must finish before their dependents.

use crate::digraph::{StopCondition, TaskDigraph};
use crate::{Error, Result, TaskSet, Uid};
use petgraph::Direction::{Incoming, Outgoing};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

/// DAG of dependee -> dependent edges.
///
/// Unlike [`HierarchyGraph`](crate::HierarchyGraph) this graph is not
/// transitively reduced: `a -> b`, `b -> c` and `a -> c` may coexist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    digraph: TaskDigraph,
}

impl DependencyGraph {
    /// Create an empty dependency graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) const fn from_digraph(digraph: TaskDigraph) -> Self {
        Self { digraph }
    }

    pub(crate) const fn digraph(&self) -> &TaskDigraph {
        &self.digraph
    }

    /// Check if a task exists in the graph.
    #[must_use]
    pub fn contains_task(&self, task: Uid) -> bool {
        self.digraph.contains(task)
    }

    /// Get the number of tasks in the graph.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.digraph.node_count()
    }

    /// All tasks, in identifier order.
    #[must_use]
    pub fn tasks(&self) -> TaskSet {
        self.digraph.node_set()
    }

    /// All (dependee, dependent) pairs.
    #[must_use]
    pub fn dependencies(&self) -> BTreeSet<(Uid, Uid)> {
        self.digraph.edges().collect()
    }

    /// Whether `dependent_task` directly depends on `dependee_task`.
    #[must_use]
    pub fn has_dependency(&self, dependee_task: Uid, dependent_task: Uid) -> bool {
        self.digraph.contains_edge(dependee_task, dependent_task)
    }

    /// Add a task with no dependencies.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskAlreadyExists`] if the task is present.
    pub fn add_task(&mut self, task: Uid) -> Result<()> {
        if !self.digraph.insert_node(task) {
            return Err(Error::TaskAlreadyExists { task });
        }
        debug!("Added task [{}] to dependency graph", task);
        Ok(())
    }

    /// Check that a task exists and has neither dependees nor dependents.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDoesNotExist`] or [`Error::HasDependencyNeighbours`].
    pub fn validate_task_can_be_removed(&self, task: Uid) -> Result<()> {
        self.digraph.require(task)?;

        if !self.digraph.is_isolated(task) {
            return Err(Error::HasDependencyNeighbours {
                task,
                dependee_tasks: self.digraph.predecessors(task).collect(),
                dependent_tasks: self.digraph.successors(task).collect(),
            });
        }
        Ok(())
    }

    /// Remove a task that has no dependencies.
    ///
    /// # Errors
    ///
    /// See [`Self::validate_task_can_be_removed`].
    pub fn remove_task(&mut self, task: Uid) -> Result<()> {
        self.validate_task_can_be_removed(task)?;
        self.digraph.remove_node(task);
        debug!("Removed task [{}] from dependency graph", task);
        Ok(())
    }

    /// Check whether `dependee_task -> dependent_task` may be added.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDoesNotExist`], [`Error::DependencyLoop`],
    /// [`Error::DependencyAlreadyExists`],
    /// [`Error::InverseDependencyAlreadyExists`], or
    /// [`Error::DependencyIntroducesCycle`] carrying the existing path from
    /// the dependent back to the dependee.
    pub fn validate_dependency_can_be_added(
        &self,
        dependee_task: Uid,
        dependent_task: Uid,
    ) -> Result<()> {
        self.digraph.require(dependee_task)?;
        self.digraph.require(dependent_task)?;

        if dependee_task == dependent_task {
            return Err(Error::DependencyLoop {
                task: dependee_task,
            });
        }
        if self.digraph.contains_edge(dependee_task, dependent_task) {
            return Err(Error::DependencyAlreadyExists {
                dependee_task,
                dependent_task,
            });
        }
        if self.digraph.contains_edge(dependent_task, dependee_task) {
            return Err(Error::InverseDependencyAlreadyExists {
                dependee_task,
                dependent_task,
            });
        }
        if self.digraph.has_path(dependent_task, dependee_task) {
            let connecting_subgraph = self.connecting_subgraph([dependent_task], [dependee_task])?;
            return Err(Error::DependencyIntroducesCycle {
                dependee_task,
                dependent_task,
                connecting_subgraph: Box::new(connecting_subgraph),
            });
        }
        Ok(())
    }

    /// Add a dependency after validating it.
    ///
    /// # Errors
    ///
    /// See [`Self::validate_dependency_can_be_added`].
    pub fn add_dependency(&mut self, dependee_task: Uid, dependent_task: Uid) -> Result<()> {
        self.validate_dependency_can_be_added(dependee_task, dependent_task)
            .inspect_err(|err| debug!(%err, "Rejected dependency"))?;
        self.insert_dependency_unchecked(dependee_task, dependent_task);
        Ok(())
    }

    pub(crate) fn insert_dependency_unchecked(&mut self, dependee_task: Uid, dependent_task: Uid) {
        self.digraph.insert_edge(dependee_task, dependent_task);
        debug!("Added dependency [{}] -> [{}]", dependee_task, dependent_task);
    }

    /// Check whether `dependee_task -> dependent_task` may be removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDoesNotExist`], [`Error::DependencyLoop`] or
    /// [`Error::DependencyDoesNotExist`].
    pub fn validate_dependency_can_be_removed(
        &self,
        dependee_task: Uid,
        dependent_task: Uid,
    ) -> Result<()> {
        self.digraph.require(dependee_task)?;
        self.digraph.require(dependent_task)?;

        if dependee_task == dependent_task {
            return Err(Error::DependencyLoop {
                task: dependee_task,
            });
        }
        if !self.digraph.contains_edge(dependee_task, dependent_task) {
            return Err(Error::DependencyDoesNotExist {
                dependee_task,
                dependent_task,
            });
        }
        Ok(())
    }

    /// Remove an existing dependency.
    ///
    /// # Errors
    ///
    /// See [`Self::validate_dependency_can_be_removed`].
    pub fn remove_dependency(&mut self, dependee_task: Uid, dependent_task: Uid) -> Result<()> {
        self.validate_dependency_can_be_removed(dependee_task, dependent_task)?;
        self.digraph.remove_edge(dependee_task, dependent_task);
        debug!(
            "Removed dependency [{}] -> [{}]",
            dependee_task, dependent_task
        );
        Ok(())
    }

    /// Tasks the given task directly depends on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDoesNotExist`] if the task is absent.
    pub fn dependee_tasks(&self, task: Uid) -> Result<TaskSet> {
        self.digraph.require(task)?;
        Ok(self.dependees_of(task).collect())
    }

    /// Tasks directly depending on the given task.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDoesNotExist`] if the task is absent.
    pub fn dependent_tasks(&self, task: Uid) -> Result<TaskSet> {
        self.digraph.require(task)?;
        Ok(self.dependents_of(task).collect())
    }

    pub(crate) fn dependees_of(&self, task: Uid) -> impl Iterator<Item = Uid> + '_ {
        self.digraph.predecessors(task)
    }

    pub(crate) fn dependents_of(&self, task: Uid) -> impl Iterator<Item = Uid> + '_ {
        self.digraph.successors(task)
    }

    /// Every task that transitively depends on one of the given tasks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDoesNotExist`] if any task is absent.
    pub fn following_tasks(&self, tasks: impl IntoIterator<Item = Uid>) -> Result<TaskSet> {
        let tasks = self.digraph.require_all(tasks)?;
        Ok(self.digraph.descendants(&tasks))
    }

    /// Every task one of the given tasks transitively depends on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDoesNotExist`] if any task is absent.
    pub fn proceeding_tasks(&self, tasks: impl IntoIterator<Item = Uid>) -> Result<TaskSet> {
        let tasks = self.digraph.require_all(tasks)?;
        Ok(self.digraph.ancestors(&tasks))
    }

    /// The given tasks with every following task and the dependencies between them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDoesNotExist`] if any task is absent.
    pub fn following_subgraph(
        &self,
        tasks: impl IntoIterator<Item = Uid>,
        stop: Option<StopCondition<'_>>,
    ) -> Result<Self> {
        let tasks = self.digraph.require_all(tasks)?;
        let mut builder = TaskDigraph::default();
        builder.copy_reachable(&self.digraph, &tasks, Outgoing, stop);
        Ok(Self::from_digraph(builder))
    }

    /// The given tasks with every proceeding task and the dependencies between them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDoesNotExist`] if any task is absent.
    pub fn proceeding_subgraph(
        &self,
        tasks: impl IntoIterator<Item = Uid>,
        stop: Option<StopCondition<'_>>,
    ) -> Result<Self> {
        let tasks = self.digraph.require_all(tasks)?;
        let mut builder = TaskDigraph::default();
        builder.copy_reachable(&self.digraph, &tasks, Incoming, stop);
        Ok(Self::from_digraph(builder))
    }

    /// Whether a dependency path runs from `dependee_task` to `dependent_task`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDoesNotExist`] if either task is absent.
    pub fn has_path(&self, dependee_task: Uid, dependent_task: Uid) -> Result<bool> {
        self.digraph.require(dependee_task)?;
        self.digraph.require(dependent_task)?;
        Ok(self.digraph.has_path(dependee_task, dependent_task))
    }

    /// The dependencies lying on any path from a source to a target.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDoesNotExist`] for an absent task and
    /// [`Error::NoConnectingSubgraph`] if some target does not follow any source.
    pub fn connecting_subgraph(
        &self,
        sources: impl IntoIterator<Item = Uid>,
        targets: impl IntoIterator<Item = Uid>,
    ) -> Result<Self> {
        let sources = self.digraph.require_all(sources)?;
        let targets = self.digraph.require_all(targets)?;
        let mut builder = TaskDigraph::default();
        builder.copy_connecting(&self.digraph, &sources, &targets)?;
        Ok(Self::from_digraph(builder))
    }

    /// The tasks connected to `task` through dependencies in either direction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDoesNotExist`] if the task is absent.
    pub fn component_subgraph(&self, task: Uid) -> Result<Self> {
        self.digraph.require(task)?;
        let mut builder = TaskDigraph::default();
        builder.copy_component(&self.digraph, task);
        Ok(Self::from_digraph(builder))
    }

    /// Partition the graph into its dependency components.
    #[must_use]
    pub fn component_subgraphs(&self) -> Vec<Self> {
        let mut covered = TaskSet::new();
        let mut components = Vec::new();

        for task in self.tasks() {
            if covered.contains(&task) {
                continue;
            }
            let mut builder = TaskDigraph::default();
            covered.extend(builder.copy_component(&self.digraph, task));
            components.push(Self::from_digraph(builder));
        }
        components
    }

    /// Whether a task has no dependees.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDoesNotExist`] if the task is absent.
    pub fn is_first(&self, task: Uid) -> Result<bool> {
        self.digraph.require(task)?;
        Ok(!self.digraph.has_predecessors(task))
    }

    /// Tasks with no dependees.
    #[must_use]
    pub fn first_tasks(&self) -> TaskSet {
        self.digraph
            .nodes()
            .filter(|&task| !self.digraph.has_predecessors(task))
            .collect()
    }

    /// Whether a task has no dependents.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDoesNotExist`] if the task is absent.
    pub fn is_last(&self, task: Uid) -> Result<bool> {
        self.digraph.require(task)?;
        Ok(!self.digraph.has_successors(task))
    }

    /// Tasks with no dependents.
    #[must_use]
    pub fn last_tasks(&self) -> TaskSet {
        self.digraph
            .nodes()
            .filter(|&task| !self.digraph.has_successors(task))
            .collect()
    }

    /// Whether a task has neither dependees nor dependents.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDoesNotExist`] if the task is absent.
    pub fn is_isolated(&self, task: Uid) -> Result<bool> {
        self.digraph.require(task)?;
        Ok(self.digraph.is_isolated(task))
    }

    /// Tasks with neither dependees nor dependents.
    #[must_use]
    pub fn isolated_tasks(&self) -> TaskSet {
        self.digraph
            .nodes()
            .filter(|&task| self.digraph.is_isolated(task))
            .collect()
    }

    /// Every task with its direct dependents.
    #[must_use]
    pub fn task_dependents_pairs(&self) -> BTreeMap<Uid, TaskSet> {
        self.digraph
            .nodes()
            .map(|task| (task, self.dependents_of(task).collect()))
            .collect()
    }

    /// Tasks ordered so every dependee comes before its dependents.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DependencyCycleDetected`] if the graph holds a cycle,
    /// which only a graph assembled outside the validating mutators can.
    pub fn topological_sort(&self) -> Result<Vec<Uid>> {
        self.digraph
            .topological_order()
            .map_err(|task| Error::DependencyCycleDetected { task })
    }

    /// Tasks grouped by dependency level.
    ///
    /// Tasks within one group do not depend on each other; every dependee of
    /// a task sits in an earlier group.
    ///
    /// # Errors
    ///
    /// See [`Self::topological_sort`].
    pub fn topological_groups(&self) -> Result<Vec<TaskSet>> {
        let mut groups: Vec<TaskSet> = Vec::new();
        let mut levels: HashMap<Uid, usize> = HashMap::new();

        for task in self.topological_sort()? {
            let level = self
                .dependees_of(task)
                .filter_map(|dependee| levels.get(&dependee))
                .map(|&dependee_level| dependee_level + 1)
                .max()
                .unwrap_or(0);

            if level >= groups.len() {
                groups.resize_with(level + 1, TaskSet::new);
            }
            groups[level].insert(task);
            levels.insert(task, level);
        }
        Ok(groups)
    }
}
