//! Read-only query surfaces over the graphs.
//!
//! The owning graph types implement these traits directly. [`ReadOnly`]
//! wraps a borrowed or reference-counted graph and implements the same
//! traits without offering any mutator, so reporting and rendering code can
//! be handed a graph it cannot change.

use crate::network::stream::{StreamDirection, StreamTasks};
use crate::{DependencyGraph, HierarchyGraph, Result, TaskSet, Uid};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Deref;

/// Queries over a hierarchy graph.
pub trait HierarchyView {
    /// Check if a task exists.
    fn contains_task(&self, task: Uid) -> bool;
    /// All tasks.
    fn tasks(&self) -> TaskSet;
    /// All (supertask, sub-task) pairs.
    fn hierarchies(&self) -> BTreeSet<(Uid, Uid)>;
    /// Direct supertasks of a task.
    ///
    /// # Errors
    ///
    /// Fails if the task is absent.
    fn supertasks(&self, task: Uid) -> Result<TaskSet>;
    /// Direct sub-tasks of a task.
    ///
    /// # Errors
    ///
    /// Fails if the task is absent.
    fn subtasks(&self, task: Uid) -> Result<TaskSet>;
    /// All ancestors of the given tasks.
    ///
    /// # Errors
    ///
    /// Fails if any task is absent.
    fn superior_tasks(&self, tasks: &TaskSet) -> Result<TaskSet>;
    /// All descendants of the given tasks.
    ///
    /// # Errors
    ///
    /// Fails if any task is absent.
    fn inferior_tasks(&self, tasks: &TaskSet) -> Result<TaskSet>;
    /// Tasks with no supertasks.
    fn top_level_tasks(&self) -> TaskSet;
    /// Tasks with no sub-tasks.
    fn concrete_tasks(&self) -> TaskSet;
    /// Whether `subtask` is an inferior of `supertask`.
    ///
    /// # Errors
    ///
    /// Fails if either task is absent.
    fn has_path(&self, supertask: Uid, subtask: Uid) -> Result<bool>;
    /// Every task with its direct sub-tasks.
    fn task_subtasks_pairs(&self) -> BTreeMap<Uid, TaskSet>;
}

/// Queries over a dependency graph.
pub trait DependencyView {
    /// Check if a task exists.
    fn contains_task(&self, task: Uid) -> bool;
    /// All tasks.
    fn tasks(&self) -> TaskSet;
    /// All (dependee, dependent) pairs.
    fn dependencies(&self) -> BTreeSet<(Uid, Uid)>;
    /// Tasks the given task directly depends on.
    ///
    /// # Errors
    ///
    /// Fails if the task is absent.
    fn dependee_tasks(&self, task: Uid) -> Result<TaskSet>;
    /// Tasks directly depending on the given task.
    ///
    /// # Errors
    ///
    /// Fails if the task is absent.
    fn dependent_tasks(&self, task: Uid) -> Result<TaskSet>;
    /// Tasks transitively depending on the given tasks.
    ///
    /// # Errors
    ///
    /// Fails if any task is absent.
    fn following_tasks(&self, tasks: &TaskSet) -> Result<TaskSet>;
    /// Tasks the given tasks transitively depend on.
    ///
    /// # Errors
    ///
    /// Fails if any task is absent.
    fn proceeding_tasks(&self, tasks: &TaskSet) -> Result<TaskSet>;
    /// Tasks with no dependees.
    fn first_tasks(&self) -> TaskSet;
    /// Tasks with no dependents.
    fn last_tasks(&self) -> TaskSet;
    /// Whether a dependency path runs between two tasks.
    ///
    /// # Errors
    ///
    /// Fails if either task is absent.
    fn has_path(&self, dependee_task: Uid, dependent_task: Uid) -> Result<bool>;
    /// Every task with its direct dependents.
    fn task_dependents_pairs(&self) -> BTreeMap<Uid, TaskSet>;
}

/// Queries over a task network.
///
/// Implementors only expose their two relations; stream traversal is
/// provided on top of them.
pub trait NetworkView {
    /// The hierarchy relation.
    fn hierarchy_graph(&self) -> &HierarchyGraph;

    /// The dependency relation.
    fn dependency_graph(&self) -> &DependencyGraph;

    /// Check if a task exists.
    fn contains_task(&self, task: Uid) -> bool {
        self.dependency_graph().contains_task(task)
    }

    /// All tasks.
    fn tasks(&self) -> TaskSet {
        self.dependency_graph().tasks()
    }

    /// Get the number of tasks.
    fn task_count(&self) -> usize {
        self.dependency_graph().task_count()
    }

    /// Lazily walk every task downstream of the given tasks.
    ///
    /// # Errors
    ///
    /// Fails if any task is absent.
    fn downstream_tasks(&self, tasks: impl IntoIterator<Item = Uid>) -> Result<StreamTasks<'_>> {
        StreamTasks::new(
            self.hierarchy_graph(),
            self.dependency_graph(),
            tasks,
            StreamDirection::Downstream,
        )
    }

    /// Lazily walk every task upstream of the given tasks.
    ///
    /// # Errors
    ///
    /// Fails if any task is absent.
    fn upstream_tasks(&self, tasks: impl IntoIterator<Item = Uid>) -> Result<StreamTasks<'_>> {
        StreamTasks::new(
            self.hierarchy_graph(),
            self.dependency_graph(),
            tasks,
            StreamDirection::Upstream,
        )
    }

    /// Whether `target` is `source` or downstream of it.
    ///
    /// # Errors
    ///
    /// Fails if either task is absent.
    fn has_stream_path(&self, source: Uid, target: Uid) -> Result<bool> {
        self.dependency_graph().digraph().require(target)?;
        if source == target {
            self.dependency_graph().digraph().require(source)?;
            return Ok(true);
        }
        Ok(self.downstream_tasks([source])?.any(|task| task == target))
    }

    /// Whether a task has no hierarchies and no dependencies.
    ///
    /// # Errors
    ///
    /// Fails if the task is absent.
    fn is_isolated(&self, task: Uid) -> Result<bool> {
        Ok(self.hierarchy_graph().is_isolated(task)? && self.dependency_graph().is_isolated(task)?)
    }

    /// Tasks with no hierarchies and no dependencies.
    fn isolated_tasks(&self) -> TaskSet {
        let hierarchy = self.hierarchy_graph().digraph();
        self.dependency_graph()
            .isolated_tasks()
            .into_iter()
            .filter(|&task| hierarchy.is_isolated(task))
            .collect()
    }
}

impl HierarchyView for HierarchyGraph {
    fn contains_task(&self, task: Uid) -> bool {
        Self::contains_task(self, task)
    }

    fn tasks(&self) -> TaskSet {
        Self::tasks(self)
    }

    fn hierarchies(&self) -> BTreeSet<(Uid, Uid)> {
        Self::hierarchies(self)
    }

    fn supertasks(&self, task: Uid) -> Result<TaskSet> {
        Self::supertasks(self, task)
    }

    fn subtasks(&self, task: Uid) -> Result<TaskSet> {
        Self::subtasks(self, task)
    }

    fn superior_tasks(&self, tasks: &TaskSet) -> Result<TaskSet> {
        Self::superior_tasks(self, tasks.iter().copied())
    }

    fn inferior_tasks(&self, tasks: &TaskSet) -> Result<TaskSet> {
        Self::inferior_tasks(self, tasks.iter().copied())
    }

    fn top_level_tasks(&self) -> TaskSet {
        Self::top_level_tasks(self)
    }

    fn concrete_tasks(&self) -> TaskSet {
        Self::concrete_tasks(self)
    }

    fn has_path(&self, supertask: Uid, subtask: Uid) -> Result<bool> {
        Self::has_path(self, supertask, subtask)
    }

    fn task_subtasks_pairs(&self) -> BTreeMap<Uid, TaskSet> {
        Self::task_subtasks_pairs(self)
    }
}

impl DependencyView for DependencyGraph {
    fn contains_task(&self, task: Uid) -> bool {
        Self::contains_task(self, task)
    }

    fn tasks(&self) -> TaskSet {
        Self::tasks(self)
    }

    fn dependencies(&self) -> BTreeSet<(Uid, Uid)> {
        Self::dependencies(self)
    }

    fn dependee_tasks(&self, task: Uid) -> Result<TaskSet> {
        Self::dependee_tasks(self, task)
    }

    fn dependent_tasks(&self, task: Uid) -> Result<TaskSet> {
        Self::dependent_tasks(self, task)
    }

    fn following_tasks(&self, tasks: &TaskSet) -> Result<TaskSet> {
        Self::following_tasks(self, tasks.iter().copied())
    }

    fn proceeding_tasks(&self, tasks: &TaskSet) -> Result<TaskSet> {
        Self::proceeding_tasks(self, tasks.iter().copied())
    }

    fn first_tasks(&self) -> TaskSet {
        Self::first_tasks(self)
    }

    fn last_tasks(&self) -> TaskSet {
        Self::last_tasks(self)
    }

    fn has_path(&self, dependee_task: Uid, dependent_task: Uid) -> Result<bool> {
        Self::has_path(self, dependee_task, dependent_task)
    }

    fn task_dependents_pairs(&self) -> BTreeMap<Uid, TaskSet> {
        Self::task_dependents_pairs(self)
    }
}

/// Read-only adapter over a borrowed or shared graph.
///
/// ```ignore
/// let view = ReadOnly::new(&network);
/// let downstream: TaskSet = view.downstream_tasks([task])?.collect();
///
/// let shared = ReadOnly::new(Rc::new(network));
/// ```
#[derive(Debug, Clone)]
pub struct ReadOnly<P>(P);

impl<P: Deref> ReadOnly<P> {
    /// Wrap a reference to a graph.
    pub const fn new(graph: P) -> Self {
        Self(graph)
    }
}

impl<P> HierarchyView for ReadOnly<P>
where
    P: Deref,
    P::Target: HierarchyView,
{
    fn contains_task(&self, task: Uid) -> bool {
        self.0.deref().contains_task(task)
    }

    fn tasks(&self) -> TaskSet {
        self.0.deref().tasks()
    }

    fn hierarchies(&self) -> BTreeSet<(Uid, Uid)> {
        self.0.deref().hierarchies()
    }

    fn supertasks(&self, task: Uid) -> Result<TaskSet> {
        self.0.deref().supertasks(task)
    }

    fn subtasks(&self, task: Uid) -> Result<TaskSet> {
        self.0.deref().subtasks(task)
    }

    fn superior_tasks(&self, tasks: &TaskSet) -> Result<TaskSet> {
        self.0.deref().superior_tasks(tasks)
    }

    fn inferior_tasks(&self, tasks: &TaskSet) -> Result<TaskSet> {
        self.0.deref().inferior_tasks(tasks)
    }

    fn top_level_tasks(&self) -> TaskSet {
        self.0.deref().top_level_tasks()
    }

    fn concrete_tasks(&self) -> TaskSet {
        self.0.deref().concrete_tasks()
    }

    fn has_path(&self, supertask: Uid, subtask: Uid) -> Result<bool> {
        self.0.deref().has_path(supertask, subtask)
    }

    fn task_subtasks_pairs(&self) -> BTreeMap<Uid, TaskSet> {
        self.0.deref().task_subtasks_pairs()
    }
}

impl<P> DependencyView for ReadOnly<P>
where
    P: Deref,
    P::Target: DependencyView,
{
    fn contains_task(&self, task: Uid) -> bool {
        self.0.deref().contains_task(task)
    }

    fn tasks(&self) -> TaskSet {
        self.0.deref().tasks()
    }

    fn dependencies(&self) -> BTreeSet<(Uid, Uid)> {
        self.0.deref().dependencies()
    }

    fn dependee_tasks(&self, task: Uid) -> Result<TaskSet> {
        self.0.deref().dependee_tasks(task)
    }

    fn dependent_tasks(&self, task: Uid) -> Result<TaskSet> {
        self.0.deref().dependent_tasks(task)
    }

    fn following_tasks(&self, tasks: &TaskSet) -> Result<TaskSet> {
        self.0.deref().following_tasks(tasks)
    }

    fn proceeding_tasks(&self, tasks: &TaskSet) -> Result<TaskSet> {
        self.0.deref().proceeding_tasks(tasks)
    }

    fn first_tasks(&self) -> TaskSet {
        self.0.deref().first_tasks()
    }

    fn last_tasks(&self) -> TaskSet {
        self.0.deref().last_tasks()
    }

    fn has_path(&self, dependee_task: Uid, dependent_task: Uid) -> Result<bool> {
        self.0.deref().has_path(dependee_task, dependent_task)
    }

    fn task_dependents_pairs(&self) -> BTreeMap<Uid, TaskSet> {
        self.0.deref().task_dependents_pairs()
    }
}

impl<P> NetworkView for ReadOnly<P>
where
    P: Deref,
    P::Target: NetworkView,
{
    fn hierarchy_graph(&self) -> &HierarchyGraph {
        self.0.deref().hierarchy_graph()
    }

    fn dependency_graph(&self) -> &DependencyGraph {
        self.0.deref().dependency_graph()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::UnconstrainedNetworkGraph;
    use std::rc::Rc;

    fn uid(n: u64) -> Uid {
        Uid::new(n)
    }

    #[test]
    fn test_read_only_hierarchy_matches_owner() {
        let mut graph = HierarchyGraph::new();
        for task in 1..=3 {
            graph.add_task(uid(task)).unwrap();
        }
        graph.add_hierarchy(uid(1), uid(2)).unwrap();
        graph.add_hierarchy(uid(2), uid(3)).unwrap();

        let view = ReadOnly::new(&graph);
        assert_eq!(HierarchyView::tasks(&view), graph.tasks());
        assert_eq!(
            HierarchyView::inferior_tasks(&view, &TaskSet::from([uid(1)])).unwrap(),
            TaskSet::from([uid(2), uid(3)])
        );
        assert!(HierarchyView::has_path(&view, uid(1), uid(3)).unwrap());
    }

    #[test]
    fn test_shared_network_view_walks_stream() {
        let mut graph = UnconstrainedNetworkGraph::new();
        for task in 1..=3 {
            graph.add_task(uid(task)).unwrap();
        }
        graph.add_dependency(uid(1), uid(2)).unwrap();
        graph.add_hierarchy(uid(2), uid(3)).unwrap();

        let view = ReadOnly::new(Rc::new(graph));
        let downstream: TaskSet = view.downstream_tasks([uid(1)]).unwrap().collect();
        assert_eq!(downstream, TaskSet::from([uid(2), uid(3)]));
        assert!(view.has_stream_path(uid(1), uid(3)).unwrap());
        assert!(!view.has_stream_path(uid(3), uid(1)).unwrap());
    }
}
