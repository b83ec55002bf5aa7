//! Persistence boundary for network graphs.
//!
//! A snapshot lists every task with its direct sub-tasks and its direct
//! dependents. Decoding replays tasks, then hierarchies, then dependencies
//! through the same validation as live mutation, so a snapshot of a valid
//! graph always decodes and a corrupted one is rejected with the usual
//! errors.

use crate::{Error, NetworkGraph, NetworkView, Result, TaskSet, Uid, UnconstrainedNetworkGraph};
use std::collections::BTreeMap;
use tracing::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Order-independent encoding of a network graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NetworkSnapshot {
    /// Every task with its direct sub-tasks.
    pub hierarchy: BTreeMap<Uid, TaskSet>,
    /// Every task with its direct dependents.
    pub dependency: BTreeMap<Uid, TaskSet>,
}

impl NetworkSnapshot {
    /// Capture any network.
    #[must_use]
    pub fn of<G: NetworkView + ?Sized>(graph: &G) -> Self {
        Self {
            hierarchy: graph.hierarchy_graph().task_subtasks_pairs(),
            dependency: graph.dependency_graph().task_dependents_pairs(),
        }
    }

    /// Tasks listed by the hierarchy half.
    #[must_use]
    pub fn tasks(&self) -> TaskSet {
        self.hierarchy.keys().copied().collect()
    }
}

pub(crate) fn check_task_sets(hierarchy_tasks: &TaskSet, dependency_tasks: &TaskSet) -> Result<()> {
    if hierarchy_tasks == dependency_tasks {
        return Ok(());
    }
    Err(Error::MismatchedTaskSets {
        hierarchy_only: hierarchy_tasks
            .difference(dependency_tasks)
            .copied()
            .collect(),
        dependency_only: dependency_tasks
            .difference(hierarchy_tasks)
            .copied()
            .collect(),
    })
}

/// Graphs that can be rebuilt edge by edge through their validating mutators.
pub(crate) trait Replay: Default {
    fn replay_task(&mut self, task: Uid) -> Result<()>;
    fn replay_hierarchy(&mut self, supertask: Uid, subtask: Uid) -> Result<()>;
    fn replay_dependency(&mut self, dependee_task: Uid, dependent_task: Uid) -> Result<()>;
}

impl Replay for UnconstrainedNetworkGraph {
    fn replay_task(&mut self, task: Uid) -> Result<()> {
        self.add_task(task)
    }

    fn replay_hierarchy(&mut self, supertask: Uid, subtask: Uid) -> Result<()> {
        self.add_hierarchy(supertask, subtask)
    }

    fn replay_dependency(&mut self, dependee_task: Uid, dependent_task: Uid) -> Result<()> {
        self.add_dependency(dependee_task, dependent_task)
    }
}

impl Replay for NetworkGraph {
    fn replay_task(&mut self, task: Uid) -> Result<()> {
        self.add_task(task)
    }

    fn replay_hierarchy(&mut self, supertask: Uid, subtask: Uid) -> Result<()> {
        self.add_hierarchy(supertask, subtask)
    }

    fn replay_dependency(&mut self, dependee_task: Uid, dependent_task: Uid) -> Result<()> {
        self.add_dependency(dependee_task, dependent_task)
    }
}

pub(crate) fn replay<G: Replay>(snapshot: &NetworkSnapshot) -> Result<G> {
    let tasks = snapshot.tasks();
    check_task_sets(&tasks, &snapshot.dependency.keys().copied().collect())?;

    let mut graph = G::default();
    for &task in &tasks {
        graph.replay_task(task)?;
    }
    for (&supertask, subtasks) in &snapshot.hierarchy {
        for &subtask in subtasks {
            graph.replay_hierarchy(supertask, subtask)?;
        }
    }
    for (&dependee_task, dependent_tasks) in &snapshot.dependency {
        for &dependent_task in dependent_tasks {
            graph.replay_dependency(dependee_task, dependent_task)?;
        }
    }
    debug!(tasks = tasks.len(), "Decoded network snapshot");
    Ok(graph)
}
