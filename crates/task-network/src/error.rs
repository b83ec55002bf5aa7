//! Error types for task network operations.

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use crate::dependency::DependencyGraph;
use crate::hierarchy::HierarchyGraph;
use crate::network::UnconstrainedNetworkGraph;
use crate::{TaskSet, Uid};
use miette::Diagnostic;
use thiserror::Error;

/// Result type for task network operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Broad classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input that never reached a graph.
    InvalidInput,
    /// A referenced task or edge is missing, or one being created already exists.
    Existence,
    /// An edge from a task to itself.
    SelfReference,
    /// The edge would create a cycle.
    Structural,
    /// The edge would duplicate or cross an ordering already expressed elsewhere.
    Redundancy,
    /// A removal whose preconditions do not hold.
    Precondition,
}

/// Errors that can occur while querying or mutating task graphs.
///
/// Variants raised by a rejected mutation own a fully built diagnostic
/// sub-graph where one is meaningful, so callers can show why the
/// operation was refused without touching the source graph again.
#[derive(Error, Debug, Clone, Diagnostic)]
pub enum Error {
    /// A negative number was used as a task identifier.
    #[error("Invalid task identifier {number}: identifiers must be non-negative")]
    #[diagnostic(code(taskweave::uid::invalid_number))]
    InvalidUidNumber {
        /// The rejected number.
        number: i64,
    },

    /// Text that is not an integer was used as a task identifier.
    #[error("Invalid task identifier '{text}': expected a non-negative integer")]
    #[diagnostic(code(taskweave::uid::invalid_text))]
    InvalidUidText {
        /// The rejected text.
        text: String,
    },

    /// The task is already present.
    #[error("Task [{task}] already exists")]
    #[diagnostic(code(taskweave::network::task_already_exists))]
    TaskAlreadyExists {
        /// The duplicate task.
        task: Uid,
    },

    /// The task is not present.
    #[error("Task [{task}] does not exist")]
    #[diagnostic(
        code(taskweave::network::task_does_not_exist),
        help("Add the task before referring to it")
    )]
    TaskDoesNotExist {
        /// The missing task.
        task: Uid,
    },

    /// Hierarchy from a task to itself.
    #[error("Hierarchy loop: task [{task}] cannot be its own sub-task")]
    #[diagnostic(code(taskweave::hierarchy::self_loop))]
    HierarchyLoop {
        /// The task on both ends of the edge.
        task: Uid,
    },

    /// The hierarchy already exists.
    #[error("Hierarchy [{supertask}] -> [{subtask}] already exists")]
    #[diagnostic(code(taskweave::hierarchy::already_exists))]
    HierarchyAlreadyExists {
        /// Supertask of the existing hierarchy.
        supertask: Uid,
        /// Sub-task of the existing hierarchy.
        subtask: Uid,
    },

    /// The reverse of the requested hierarchy already exists.
    #[error(
        "Inverse hierarchy [{subtask}] -> [{supertask}] already exists, cannot add [{supertask}] -> [{subtask}]"
    )]
    #[diagnostic(code(taskweave::hierarchy::inverse_already_exists))]
    InverseHierarchyAlreadyExists {
        /// Requested supertask.
        supertask: Uid,
        /// Requested sub-task.
        subtask: Uid,
    },

    /// The hierarchy is not present.
    #[error("Hierarchy [{supertask}] -> [{subtask}] does not exist")]
    #[diagnostic(code(taskweave::hierarchy::does_not_exist))]
    HierarchyDoesNotExist {
        /// Requested supertask.
        supertask: Uid,
        /// Requested sub-task.
        subtask: Uid,
    },

    /// The sub-task is already a superior of the supertask.
    #[error("Hierarchy [{supertask}] -> [{subtask}] introduces a cycle")]
    #[diagnostic(
        code(taskweave::hierarchy::cycle),
        help("The attached sub-graph shows the existing path from the sub-task to the supertask")
    )]
    HierarchyIntroducesCycle {
        /// Requested supertask.
        supertask: Uid,
        /// Requested sub-task.
        subtask: Uid,
        /// Hierarchies on every path from `subtask` to `supertask`.
        connecting_subgraph: Box<HierarchyGraph>,
    },

    /// The sub-task is already an inferior of the supertask, so the edge would be redundant.
    #[error("Hierarchy path [{supertask}] -> ... -> [{subtask}] already exists")]
    #[diagnostic(
        code(taskweave::hierarchy::path_already_exists),
        help("The attached sub-graph shows the existing path from the supertask to the sub-task")
    )]
    HierarchyPathAlreadyExists {
        /// Requested supertask.
        supertask: Uid,
        /// Requested sub-task.
        subtask: Uid,
        /// Hierarchies on every path from `supertask` to `subtask`.
        connecting_subgraph: Box<HierarchyGraph>,
    },

    /// The new hierarchy would make an existing hierarchy transitively redundant.
    #[error("Hierarchy [{supertask}] -> [{subtask}] would make an existing hierarchy redundant")]
    #[diagnostic(
        code(taskweave::hierarchy::redundant),
        help("Remove the redundant hierarchy shown in the attached sub-graph first")
    )]
    HierarchyIntroducesRedundantHierarchy {
        /// Requested supertask.
        supertask: Uid,
        /// Requested sub-task.
        subtask: Uid,
        /// The hierarchies that would become redundant, with the paths replacing them.
        subgraph: Box<HierarchyGraph>,
    },

    /// The task still has supertasks.
    #[error("Task [{task}] has supertasks [{}]", format_tasks(supertasks))]
    #[diagnostic(
        code(taskweave::hierarchy::has_supertasks),
        help("Remove the task's hierarchies before removing the task")
    )]
    HasSuperTasks {
        /// The task being removed.
        task: Uid,
        /// Its supertasks.
        supertasks: TaskSet,
    },

    /// The task still has sub-tasks.
    #[error("Task [{task}] has sub-tasks [{}]", format_tasks(subtasks))]
    #[diagnostic(
        code(taskweave::hierarchy::has_subtasks),
        help("Remove the task's hierarchies before removing the task")
    )]
    HasSubTasks {
        /// The task being removed.
        task: Uid,
        /// Its sub-tasks.
        subtasks: TaskSet,
    },

    /// Dependency from a task to itself.
    #[error("Dependency loop: task [{task}] cannot depend on itself")]
    #[diagnostic(code(taskweave::dependency::self_loop))]
    DependencyLoop {
        /// The task on both ends of the edge.
        task: Uid,
    },

    /// The dependency already exists.
    #[error("Dependency [{dependee_task}] -> [{dependent_task}] already exists")]
    #[diagnostic(code(taskweave::dependency::already_exists))]
    DependencyAlreadyExists {
        /// Dependee of the existing dependency.
        dependee_task: Uid,
        /// Dependent of the existing dependency.
        dependent_task: Uid,
    },

    /// The reverse of the requested dependency already exists.
    #[error(
        "Inverse dependency [{dependent_task}] -> [{dependee_task}] already exists, cannot add [{dependee_task}] -> [{dependent_task}]"
    )]
    #[diagnostic(code(taskweave::dependency::inverse_already_exists))]
    InverseDependencyAlreadyExists {
        /// Requested dependee.
        dependee_task: Uid,
        /// Requested dependent.
        dependent_task: Uid,
    },

    /// The dependency is not present.
    #[error("Dependency [{dependee_task}] -> [{dependent_task}] does not exist")]
    #[diagnostic(code(taskweave::dependency::does_not_exist))]
    DependencyDoesNotExist {
        /// Requested dependee.
        dependee_task: Uid,
        /// Requested dependent.
        dependent_task: Uid,
    },

    /// The dependent already (transitively) precedes the dependee.
    #[error("Dependency [{dependee_task}] -> [{dependent_task}] introduces a cycle")]
    #[diagnostic(
        code(taskweave::dependency::cycle),
        help("The attached sub-graph shows the existing path from the dependent to the dependee")
    )]
    DependencyIntroducesCycle {
        /// Requested dependee.
        dependee_task: Uid,
        /// Requested dependent.
        dependent_task: Uid,
        /// Dependencies on every path from `dependent_task` to `dependee_task`.
        connecting_subgraph: Box<DependencyGraph>,
    },

    /// An existing dependency graph holds a cycle, so it has no topological order.
    #[error("Dependency graph contains a cycle through task [{task}]")]
    #[diagnostic(
        code(taskweave::dependency::cycle_detected),
        help("Graphs built through the validating mutators never hold a cycle")
    )]
    DependencyCycleDetected {
        /// A task on the cycle.
        task: Uid,
    },

    /// The task still has dependees or dependents.
    #[error(
        "Task [{task}] has dependee tasks [{}] and dependent tasks [{}]",
        format_tasks(dependee_tasks),
        format_tasks(dependent_tasks)
    )]
    #[diagnostic(
        code(taskweave::dependency::has_neighbours),
        help("Remove the task's dependencies before removing the task")
    )]
    HasDependencyNeighbours {
        /// The task being removed.
        task: Uid,
        /// Its dependees.
        dependee_tasks: TaskSet,
        /// Its dependents.
        dependent_tasks: TaskSet,
    },

    /// Some target is unreachable from the sources.
    #[error(
        "No connecting sub-graph from [{}] to [{}]",
        format_tasks(sources),
        format_tasks(targets)
    )]
    #[diagnostic(code(taskweave::network::no_connecting_subgraph))]
    NoConnectingSubgraph {
        /// Tasks the sub-graph starts from.
        sources: TaskSet,
        /// Tasks the sub-graph must reach.
        targets: TaskSet,
    },

    /// The hierarchy and dependency graphs disagree on the task set.
    #[error(
        "Hierarchy and dependency graphs have different tasks: hierarchy only [{}], dependency only [{}]",
        format_tasks(hierarchy_only),
        format_tasks(dependency_only)
    )]
    #[diagnostic(code(taskweave::network::mismatched_tasks))]
    MismatchedTaskSets {
        /// Tasks present only in the hierarchy graph.
        hierarchy_only: TaskSet,
        /// Tasks present only in the dependency graph.
        dependency_only: TaskSet,
    },

    /// The hierarchy would create a cycle through hierarchies and dependencies combined.
    #[error("Hierarchy [{supertask}] -> [{subtask}] introduces a network cycle")]
    #[diagnostic(
        code(taskweave::network::hierarchy_cycle),
        help(
            "The attached sub-graph shows how the sub-task is already upstream or downstream of the supertask"
        )
    )]
    HierarchyIntroducesNetworkCycle {
        /// Requested supertask.
        supertask: Uid,
        /// Requested sub-task.
        subtask: Uid,
        /// Tasks and edges forming the would-be cycle.
        connecting_subgraph: Box<UnconstrainedNetworkGraph>,
    },

    /// The dependency would create a cycle through hierarchies and dependencies combined.
    #[error("Dependency [{dependee_task}] -> [{dependent_task}] introduces a network cycle")]
    #[diagnostic(
        code(taskweave::network::dependency_cycle),
        help("The attached sub-graph shows how the dependent already leads back to the dependee")
    )]
    DependencyIntroducesNetworkCycle {
        /// Requested dependee.
        dependee_task: Uid,
        /// Requested dependent.
        dependent_task: Uid,
        /// Tasks and edges forming the would-be cycle.
        connecting_subgraph: Box<UnconstrainedNetworkGraph>,
    },

    /// The hierarchy would re-express a dependency already implied through another lineage.
    #[error("Hierarchy [{supertask}] -> [{subtask}] introduces dependency duplication")]
    #[diagnostic(code(taskweave::network::hierarchy_duplication))]
    HierarchyIntroducesDependencyDuplication {
        /// Requested supertask.
        supertask: Uid,
        /// Requested sub-task.
        subtask: Uid,
        /// Hierarchy paths and dependencies that would be duplicated.
        subgraph: Box<UnconstrainedNetworkGraph>,
    },

    /// The hierarchy would nest two dependency-linked lineages in a contradictory order.
    #[error("Hierarchy [{supertask}] -> [{subtask}] introduces dependency crossover")]
    #[diagnostic(code(taskweave::network::hierarchy_crossover))]
    HierarchyIntroducesDependencyCrossover {
        /// Requested supertask.
        supertask: Uid,
        /// Requested sub-task.
        subtask: Uid,
        /// Hierarchy paths and dependencies that would cross.
        subgraph: Box<UnconstrainedNetworkGraph>,
    },

    /// The dependency would re-express an ordering already implied through the hierarchy.
    #[error("Dependency [{dependee_task}] -> [{dependent_task}] introduces dependency duplication")]
    #[diagnostic(code(taskweave::network::dependency_duplication))]
    DependencyIntroducesDependencyDuplication {
        /// Requested dependee.
        dependee_task: Uid,
        /// Requested dependent.
        dependent_task: Uid,
        /// Hierarchy paths and dependencies that would be duplicated.
        subgraph: Box<UnconstrainedNetworkGraph>,
    },

    /// The dependency would cross an existing dependency between related lineages.
    #[error("Dependency [{dependee_task}] -> [{dependent_task}] introduces dependency crossover")]
    #[diagnostic(code(taskweave::network::dependency_crossover))]
    DependencyIntroducesDependencyCrossover {
        /// Requested dependee.
        dependee_task: Uid,
        /// Requested dependent.
        dependent_task: Uid,
        /// Hierarchy paths and dependencies that would cross.
        subgraph: Box<UnconstrainedNetworkGraph>,
    },
}

impl Error {
    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidUidNumber { .. } | Self::InvalidUidText { .. } => ErrorKind::InvalidInput,
            Self::TaskAlreadyExists { .. }
            | Self::TaskDoesNotExist { .. }
            | Self::HierarchyAlreadyExists { .. }
            | Self::InverseHierarchyAlreadyExists { .. }
            | Self::HierarchyDoesNotExist { .. }
            | Self::DependencyAlreadyExists { .. }
            | Self::InverseDependencyAlreadyExists { .. }
            | Self::DependencyDoesNotExist { .. }
            | Self::NoConnectingSubgraph { .. }
            | Self::MismatchedTaskSets { .. } => ErrorKind::Existence,
            Self::HierarchyLoop { .. } | Self::DependencyLoop { .. } => ErrorKind::SelfReference,
            Self::HierarchyIntroducesCycle { .. }
            | Self::DependencyIntroducesCycle { .. }
            | Self::DependencyCycleDetected { .. }
            | Self::HierarchyIntroducesNetworkCycle { .. }
            | Self::DependencyIntroducesNetworkCycle { .. } => ErrorKind::Structural,
            Self::HierarchyPathAlreadyExists { .. }
            | Self::HierarchyIntroducesRedundantHierarchy { .. }
            | Self::HierarchyIntroducesDependencyDuplication { .. }
            | Self::HierarchyIntroducesDependencyCrossover { .. }
            | Self::DependencyIntroducesDependencyDuplication { .. }
            | Self::DependencyIntroducesDependencyCrossover { .. } => ErrorKind::Redundancy,
            Self::HasSuperTasks { .. }
            | Self::HasSubTasks { .. }
            | Self::HasDependencyNeighbours { .. } => ErrorKind::Precondition,
        }
    }

    /// Create a missing-task error.
    #[must_use]
    pub const fn task_does_not_exist(task: Uid) -> Self {
        Self::TaskDoesNotExist { task }
    }

    /// Create a no-connecting-sub-graph error.
    #[must_use]
    pub fn no_connecting_subgraph(
        sources: impl IntoIterator<Item = Uid>,
        targets: impl IntoIterator<Item = Uid>,
    ) -> Self {
        Self::NoConnectingSubgraph {
            sources: sources.into_iter().collect(),
            targets: targets.into_iter().collect(),
        }
    }
}

fn format_tasks(tasks: &TaskSet) -> String {
    tasks
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
