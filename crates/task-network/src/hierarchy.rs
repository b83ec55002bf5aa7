//! The hierarchy relation: supertasks composed of sub-tasks.
//!
//! A [`HierarchyGraph`] is a transitively reduced DAG. Besides rejecting
//! cycles it rejects any hierarchy that is already implied by a longer path,
//! and any hierarchy that would leave an existing one implied.

use crate::digraph::{StopCondition, TaskDigraph};
use crate::{Error, Result, TaskSet, Uid};
use petgraph::Direction::{Incoming, Outgoing};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Transitively reduced DAG of supertask -> sub-task edges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HierarchyGraph {
    digraph: TaskDigraph,
}

impl HierarchyGraph {
    /// Create an empty hierarchy graph.
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

    /// All (supertask, sub-task) pairs.
    #[must_use]
    pub fn hierarchies(&self) -> BTreeSet<(Uid, Uid)> {
        self.digraph.edges().collect()
    }

    /// Whether `subtask` is a direct sub-task of `supertask`.
    #[must_use]
    pub fn has_hierarchy(&self, supertask: Uid, subtask: Uid) -> bool {
        self.digraph.contains_edge(supertask, subtask)
    }

    /// Add a task with no hierarchies.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskAlreadyExists`] if the task is present.
    pub fn add_task(&mut self, task: Uid) -> Result<()> {
        if !self.digraph.insert_node(task) {
            return Err(Error::TaskAlreadyExists { task });
        }
        debug!("Added task [{}] to hierarchy graph", task);
        Ok(())
    }

    /// Check that a task exists and has neither supertasks nor sub-tasks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDoesNotExist`], [`Error::HasSuperTasks`] or
    /// [`Error::HasSubTasks`].
    pub fn validate_task_can_be_removed(&self, task: Uid) -> Result<()> {
        self.digraph.require(task)?;

        if self.digraph.has_predecessors(task) {
            return Err(Error::HasSuperTasks {
                task,
                supertasks: self.digraph.predecessors(task).collect(),
            });
        }
        if self.digraph.has_successors(task) {
            return Err(Error::HasSubTasks {
                task,
                subtasks: self.digraph.successors(task).collect(),
            });
        }
        Ok(())
    }

    /// Remove a task that has no hierarchies.
    ///
    /// # Errors
    ///
    /// See [`Self::validate_task_can_be_removed`].
    pub fn remove_task(&mut self, task: Uid) -> Result<()> {
        self.validate_task_can_be_removed(task)?;
        self.digraph.remove_node(task);
        debug!("Removed task [{}] from hierarchy graph", task);
        Ok(())
    }

    /// Check whether `supertask -> subtask` may be added.
    ///
    /// Checks run in this order: both tasks exist, the tasks differ, the
    /// hierarchy and its inverse are absent, no path runs from `subtask` to
    /// `supertask`, no path runs from `supertask` to `subtask`, and no
    /// existing hierarchy would become redundant.
    ///
    /// # Errors
    ///
    /// Returns the first failing check's error. Cycle and redundancy errors
    /// carry the sub-graph explaining the rejection.
    pub fn validate_hierarchy_can_be_added(&self, supertask: Uid, subtask: Uid) -> Result<()> {
        self.digraph.require(supertask)?;
        self.digraph.require(subtask)?;

        if supertask == subtask {
            return Err(Error::HierarchyLoop { task: supertask });
        }
        if self.digraph.contains_edge(supertask, subtask) {
            return Err(Error::HierarchyAlreadyExists { supertask, subtask });
        }
        if self.digraph.contains_edge(subtask, supertask) {
            return Err(Error::InverseHierarchyAlreadyExists { supertask, subtask });
        }

        if self.digraph.has_path(subtask, supertask) {
            let connecting_subgraph = self.connecting_subgraph([subtask], [supertask])?;
            return Err(Error::HierarchyIntroducesCycle {
                supertask,
                subtask,
                connecting_subgraph: Box::new(connecting_subgraph),
            });
        }
        if self.digraph.has_path(supertask, subtask) {
            let connecting_subgraph = self.connecting_subgraph([supertask], [subtask])?;
            return Err(Error::HierarchyPathAlreadyExists {
                supertask,
                subtask,
                connecting_subgraph: Box::new(connecting_subgraph),
            });
        }

        let redundant = self.hierarchies_made_redundant_by(supertask, subtask);
        if !redundant.is_empty() {
            let subgraph = self.redundancy_subgraph(supertask, subtask, &redundant)?;
            return Err(Error::HierarchyIntroducesRedundantHierarchy {
                supertask,
                subtask,
                subgraph: Box::new(subgraph),
            });
        }
        Ok(())
    }

    /// Add a hierarchy after validating it.
    ///
    /// # Errors
    ///
    /// See [`Self::validate_hierarchy_can_be_added`].
    pub fn add_hierarchy(&mut self, supertask: Uid, subtask: Uid) -> Result<()> {
        self.validate_hierarchy_can_be_added(supertask, subtask)
            .inspect_err(|err| debug!(%err, "Rejected hierarchy"))?;
        self.insert_hierarchy_unchecked(supertask, subtask);
        Ok(())
    }

    pub(crate) fn insert_hierarchy_unchecked(&mut self, supertask: Uid, subtask: Uid) {
        self.digraph.insert_edge(supertask, subtask);
        debug!("Added hierarchy [{}] -> [{}]", supertask, subtask);
    }

    /// Check whether `supertask -> subtask` may be removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDoesNotExist`], [`Error::HierarchyLoop`] or
    /// [`Error::HierarchyDoesNotExist`].
    pub fn validate_hierarchy_can_be_removed(&self, supertask: Uid, subtask: Uid) -> Result<()> {
        self.digraph.require(supertask)?;
        self.digraph.require(subtask)?;

        if supertask == subtask {
            return Err(Error::HierarchyLoop { task: supertask });
        }
        if !self.digraph.contains_edge(supertask, subtask) {
            return Err(Error::HierarchyDoesNotExist { supertask, subtask });
        }
        Ok(())
    }

    /// Remove an existing hierarchy.
    ///
    /// # Errors
    ///
    /// See [`Self::validate_hierarchy_can_be_removed`].
    pub fn remove_hierarchy(&mut self, supertask: Uid, subtask: Uid) -> Result<()> {
        self.validate_hierarchy_can_be_removed(supertask, subtask)?;
        self.digraph.remove_edge(supertask, subtask);
        debug!("Removed hierarchy [{}] -> [{}]", supertask, subtask);
        Ok(())
    }

    /// Direct supertasks of a task.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDoesNotExist`] if the task is absent.
    pub fn supertasks(&self, task: Uid) -> Result<TaskSet> {
        self.digraph.require(task)?;
        Ok(self.digraph.predecessors(task).collect())
    }

    /// Direct sub-tasks of a task.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDoesNotExist`] if the task is absent.
    pub fn subtasks(&self, task: Uid) -> Result<TaskSet> {
        self.digraph.require(task)?;
        Ok(self.digraph.successors(task).collect())
    }

    /// All ancestors of the given tasks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDoesNotExist`] if any task is absent.
    pub fn superior_tasks(&self, tasks: impl IntoIterator<Item = Uid>) -> Result<TaskSet> {
        let tasks = self.digraph.require_all(tasks)?;
        Ok(self.digraph.ancestors(&tasks))
    }

    /// All descendants of the given tasks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDoesNotExist`] if any task is absent.
    pub fn inferior_tasks(&self, tasks: impl IntoIterator<Item = Uid>) -> Result<TaskSet> {
        let tasks = self.digraph.require_all(tasks)?;
        Ok(self.digraph.descendants(&tasks))
    }

    pub(crate) fn supertasks_of(&self, task: Uid) -> impl Iterator<Item = Uid> + '_ {
        self.digraph.predecessors(task)
    }

    pub(crate) fn subtasks_of(&self, task: Uid) -> impl Iterator<Item = Uid> + '_ {
        self.digraph.successors(task)
    }

    /// `tasks` together with all of their superiors.
    pub(crate) fn superior_closure(&self, tasks: &TaskSet) -> TaskSet {
        let mut closure = self.digraph.ancestors(tasks);
        closure.extend(tasks.iter().copied());
        closure
    }

    /// `tasks` together with all of their inferiors.
    pub(crate) fn inferior_closure(&self, tasks: &TaskSet) -> TaskSet {
        let mut closure = self.digraph.descendants(tasks);
        closure.extend(tasks.iter().copied());
        closure
    }

    /// Whether a task has no supertasks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDoesNotExist`] if the task is absent.
    pub fn is_top_level(&self, task: Uid) -> Result<bool> {
        self.digraph.require(task)?;
        Ok(!self.digraph.has_predecessors(task))
    }

    /// Tasks with no supertasks.
    #[must_use]
    pub fn top_level_tasks(&self) -> TaskSet {
        self.digraph
            .nodes()
            .filter(|&task| !self.digraph.has_predecessors(task))
            .collect()
    }

    /// Whether a task has no sub-tasks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDoesNotExist`] if the task is absent.
    pub fn is_concrete(&self, task: Uid) -> Result<bool> {
        self.digraph.require(task)?;
        Ok(!self.digraph.has_successors(task))
    }

    /// Tasks with no sub-tasks.
    #[must_use]
    pub fn concrete_tasks(&self) -> TaskSet {
        self.digraph
            .nodes()
            .filter(|&task| !self.digraph.has_successors(task))
            .collect()
    }

    /// Whether a task has neither supertasks nor sub-tasks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDoesNotExist`] if the task is absent.
    pub fn is_isolated(&self, task: Uid) -> Result<bool> {
        self.digraph.require(task)?;
        Ok(self.digraph.is_isolated(task))
    }

    /// Whether `subtask` is an inferior of `supertask`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDoesNotExist`] if either task is absent.
    pub fn has_path(&self, supertask: Uid, subtask: Uid) -> Result<bool> {
        self.digraph.require(supertask)?;
        self.digraph.require(subtask)?;
        Ok(self.digraph.has_path(supertask, subtask))
    }

    /// The hierarchies lying on any path from a source to a target.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDoesNotExist`] for an absent task and
    /// [`Error::NoConnectingSubgraph`] if some target is not an inferior of
    /// any source.
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

    /// The given tasks with all of their superiors and the hierarchies between them.
    ///
    /// Tasks matching `stop` are included but their supertasks are not followed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDoesNotExist`] if any task is absent.
    pub fn superior_subgraph(
        &self,
        tasks: impl IntoIterator<Item = Uid>,
        stop: Option<StopCondition<'_>>,
    ) -> Result<Self> {
        let tasks = self.digraph.require_all(tasks)?;
        let mut builder = TaskDigraph::default();
        builder.copy_reachable(&self.digraph, &tasks, Incoming, stop);
        Ok(Self::from_digraph(builder))
    }

    /// The given tasks with all of their inferiors and the hierarchies between them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDoesNotExist`] if any task is absent.
    pub fn inferior_subgraph(
        &self,
        tasks: impl IntoIterator<Item = Uid>,
        stop: Option<StopCondition<'_>>,
    ) -> Result<Self> {
        let tasks = self.digraph.require_all(tasks)?;
        let mut builder = TaskDigraph::default();
        builder.copy_reachable(&self.digraph, &tasks, Outgoing, stop);
        Ok(Self::from_digraph(builder))
    }

    /// The tasks connected to `task` through hierarchies in either direction.
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

    /// Partition the graph into its hierarchy components.
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

    /// Every task with its direct sub-tasks.
    #[must_use]
    pub fn task_subtasks_pairs(&self) -> BTreeMap<Uid, TaskSet> {
        self.digraph
            .nodes()
            .map(|task| (task, self.digraph.successors(task).collect()))
            .collect()
    }

    /// Existing hierarchies (x, y) with x a superior-or-self of `supertask`
    /// and y an inferior-or-self of `subtask`.
    fn hierarchies_made_redundant_by(&self, supertask: Uid, subtask: Uid) -> Vec<(Uid, Uid)> {
        let uppers = self.superior_closure(&TaskSet::from([supertask]));
        let lowers = self.inferior_closure(&TaskSet::from([subtask]));

        uppers
            .iter()
            .flat_map(|&upper| {
                self.digraph
                    .successors(upper)
                    .filter(|lower| lowers.contains(lower))
                    .map(move |lower| (upper, lower))
            })
            .collect()
    }

    fn redundancy_subgraph(
        &self,
        supertask: Uid,
        subtask: Uid,
        redundant: &[(Uid, Uid)],
    ) -> Result<Self> {
        let uppers: TaskSet = redundant.iter().map(|&(upper, _)| upper).collect();
        let lowers: TaskSet = redundant.iter().map(|&(_, lower)| lower).collect();

        let mut builder = TaskDigraph::default();
        builder.copy_connecting(&self.digraph, &uppers, &TaskSet::from([supertask]))?;
        builder.copy_connecting(&self.digraph, &TaskSet::from([subtask]), &lowers)?;
        for &(upper, lower) in redundant {
            builder.insert_edge(upper, lower);
        }
        Ok(Self::from_digraph(builder))
    }
}
