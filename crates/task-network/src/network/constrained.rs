use crate::network::builder::{self, SubgraphBuilder};
use crate::network::stream::StreamDirection;
use crate::snapshot::{self, NetworkSnapshot};
use crate::{
    DependencyGraph, Error, HierarchyGraph, NetworkView, Result, TaskSet, Uid,
    UnconstrainedNetworkGraph,
};
use petgraph::Direction::{self, Incoming, Outgoing};
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// A network that also rejects duplicated and crossed dependencies.
///
/// A task inherits the dependencies of its superiors, so some edges would
/// restate an ordering the network already implies (duplication) or nest two
/// dependency-linked lineages against their order (crossover). Both are
/// rejected after the stream cycle check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkGraph {
    graph: UnconstrainedNetworkGraph,
}

/// How the neighbours of the two sides of a new edge may overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Overlap {
    Duplication,
    Crossover,
}

/// One end of a hierarchy lineage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lineage {
    Superiors,
    Inferiors,
}

/// Tasks of one side of a new edge, each with the neighbours that clash.
type Links = BTreeMap<Uid, TaskSet>;

impl NetworkGraph {
    /// Create an empty network.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Combine an existing hierarchy graph and dependency graph.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MismatchedTaskSets`] if the graphs hold different
    /// tasks, or the error of the first edge that fails validation.
    pub fn from_parts(
        hierarchy_graph: HierarchyGraph,
        dependency_graph: DependencyGraph,
    ) -> Result<Self> {
        Self::try_from(UnconstrainedNetworkGraph::from_parts(
            hierarchy_graph,
            dependency_graph,
        )?)
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

    pub(crate) const fn from_unconstrained_unchecked(graph: UnconstrainedNetworkGraph) -> Self {
        Self { graph }
    }

    /// The same network, viewed without the duplication and crossover rules.
    #[must_use]
    pub const fn as_unconstrained(&self) -> &UnconstrainedNetworkGraph {
        &self.graph
    }

    /// Give up the duplication and crossover rules.
    #[must_use]
    pub fn into_unconstrained(self) -> UnconstrainedNetworkGraph {
        self.graph
    }

    /// Add a task with no edges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskAlreadyExists`] if the task is present.
    pub fn add_task(&mut self, task: Uid) -> Result<()> {
        self.graph.add_task(task)
    }

    /// Check that a task exists and has no hierarchies or dependencies.
    ///
    /// # Errors
    ///
    /// See [`UnconstrainedNetworkGraph::validate_task_can_be_removed`].
    pub fn validate_task_can_be_removed(&self, task: Uid) -> Result<()> {
        self.graph.validate_task_can_be_removed(task)
    }

    /// Remove a task that has no edges.
    ///
    /// # Errors
    ///
    /// See [`UnconstrainedNetworkGraph::validate_task_can_be_removed`].
    pub fn remove_task(&mut self, task: Uid) -> Result<()> {
        self.graph.remove_task(task)
    }

    /// Check whether `supertask -> subtask` may be added.
    ///
    /// Runs every check of
    /// [`UnconstrainedNetworkGraph::validate_hierarchy_can_be_added`], then
    /// compares the dependees and then the dependents of the supertask's
    /// superiors against those of the sub-task's inferiors.
    ///
    /// # Errors
    ///
    /// Returns the first failing check's error, ending with
    /// [`Error::HierarchyIntroducesDependencyDuplication`] and
    /// [`Error::HierarchyIntroducesDependencyCrossover`].
    pub fn validate_hierarchy_can_be_added(&self, supertask: Uid, subtask: Uid) -> Result<()> {
        self.graph
            .validate_hierarchy_can_be_added(supertask, subtask)?;

        let hierarchy = self.graph.hierarchy_graph();
        let superiors = hierarchy.superior_closure(&TaskSet::from([supertask]));
        let inferiors = hierarchy.inferior_closure(&TaskSet::from([subtask]));

        for overlap in [Overlap::Duplication, Overlap::Crossover] {
            for direction in [Incoming, Outgoing] {
                let Some(subgraph) = self.hierarchy_overlap(
                    (supertask, &superiors),
                    (subtask, &inferiors),
                    direction,
                    overlap,
                )?
                else {
                    continue;
                };
                let subgraph = Box::new(subgraph);
                return Err(match overlap {
                    Overlap::Duplication => Error::HierarchyIntroducesDependencyDuplication {
                        supertask,
                        subtask,
                        subgraph,
                    },
                    Overlap::Crossover => Error::HierarchyIntroducesDependencyCrossover {
                        supertask,
                        subtask,
                        subgraph,
                    },
                });
            }
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
            .inspect_err(|err| debug!(%err, "Rejected constrained hierarchy"))?;
        self.graph.insert_hierarchy_unchecked(supertask, subtask);
        Ok(())
    }

    /// Check whether `supertask -> subtask` may be removed.
    ///
    /// # Errors
    ///
    /// See [`HierarchyGraph::validate_hierarchy_can_be_removed`].
    pub fn validate_hierarchy_can_be_removed(&self, supertask: Uid, subtask: Uid) -> Result<()> {
        self.graph
            .validate_hierarchy_can_be_removed(supertask, subtask)
    }

    /// Remove an existing hierarchy.
    ///
    /// # Errors
    ///
    /// See [`HierarchyGraph::validate_hierarchy_can_be_removed`].
    pub fn remove_hierarchy(&mut self, supertask: Uid, subtask: Uid) -> Result<()> {
        self.graph.remove_hierarchy(supertask, subtask)
    }

    /// Check whether `dependee_task -> dependent_task` may be added.
    ///
    /// Runs every check of
    /// [`UnconstrainedNetworkGraph::validate_dependency_can_be_added`], then
    /// looks for an existing dependency between the two tasks' lineages:
    /// superiors to superiors and inferiors to inferiors duplicate the new
    /// edge, superiors to inferiors and inferiors to superiors cross it.
    ///
    /// # Errors
    ///
    /// Returns the first failing check's error, ending with
    /// [`Error::DependencyIntroducesDependencyDuplication`] and
    /// [`Error::DependencyIntroducesDependencyCrossover`].
    pub fn validate_dependency_can_be_added(
        &self,
        dependee_task: Uid,
        dependent_task: Uid,
    ) -> Result<()> {
        self.graph
            .validate_dependency_can_be_added(dependee_task, dependent_task)?;

        let checks = [
            (Overlap::Duplication, Lineage::Superiors, Lineage::Superiors),
            (Overlap::Duplication, Lineage::Inferiors, Lineage::Inferiors),
            (Overlap::Crossover, Lineage::Superiors, Lineage::Inferiors),
            (Overlap::Crossover, Lineage::Inferiors, Lineage::Superiors),
        ];
        for (overlap, dependee_lineage, dependent_lineage) in checks {
            // Crossovers need both lineages to leave the new edge's ends.
            let strict = overlap == Overlap::Crossover;
            let dependees = self.lineage(dependee_task, dependee_lineage, strict);
            let dependents = self.lineage(dependent_task, dependent_lineage, strict);

            let links = self.links(&dependees, &dependents, Outgoing);
            if links.is_empty() {
                continue;
            }

            trace!(%dependee_task, %dependent_task, ?overlap, "Dependency overlaps lineage");
            let linked_dependents: TaskSet = links.values().flatten().copied().collect();
            let mut builder = SubgraphBuilder::new(&self.graph);
            connect_lineage(&mut builder, dependee_task, dependee_lineage, links.keys().copied())?;
            connect_lineage(&mut builder, dependent_task, dependent_lineage, linked_dependents)?;
            add_links(&mut builder, &links, Outgoing)?;

            let subgraph = Box::new(builder.build());
            return Err(match overlap {
                Overlap::Duplication => Error::DependencyIntroducesDependencyDuplication {
                    dependee_task,
                    dependent_task,
                    subgraph,
                },
                Overlap::Crossover => Error::DependencyIntroducesDependencyCrossover {
                    dependee_task,
                    dependent_task,
                    subgraph,
                },
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
            .inspect_err(|err| debug!(%err, "Rejected constrained dependency"))?;
        self.graph
            .insert_dependency_unchecked(dependee_task, dependent_task);
        Ok(())
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
        self.graph
            .validate_dependency_can_be_removed(dependee_task, dependent_task)
    }

    /// Remove an existing dependency.
    ///
    /// # Errors
    ///
    /// See [`DependencyGraph::validate_dependency_can_be_removed`].
    pub fn remove_dependency(&mut self, dependee_task: Uid, dependent_task: Uid) -> Result<()> {
        self.graph.remove_dependency(dependee_task, dependent_task)
    }

    /// The given tasks with everything downstream of them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDoesNotExist`] if any task is absent.
    pub fn downstream_subgraph(&self, tasks: impl IntoIterator<Item = Uid>) -> Result<Self> {
        builder::stream_subgraph(self, tasks, StreamDirection::Downstream)
            .map(Self::from_unconstrained_unchecked)
    }

    /// The given tasks with everything upstream of them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDoesNotExist`] if any task is absent.
    pub fn upstream_subgraph(&self, tasks: impl IntoIterator<Item = Uid>) -> Result<Self> {
        builder::stream_subgraph(self, tasks, StreamDirection::Upstream)
            .map(Self::from_unconstrained_unchecked)
    }

    /// Like [`Self::downstream_subgraph`], also returning the connector tasks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDoesNotExist`] if any task is absent.
    pub fn downstream_subgraph_with_connectors(
        &self,
        tasks: impl IntoIterator<Item = Uid>,
    ) -> Result<(Self, TaskSet)> {
        let (subgraph, connectors) =
            builder::stream_subgraph_with_connectors(self, tasks, StreamDirection::Downstream)?;
        Ok((Self::from_unconstrained_unchecked(subgraph), connectors))
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
        let (subgraph, connectors) =
            builder::stream_subgraph_with_connectors(self, tasks, StreamDirection::Upstream)?;
        Ok((Self::from_unconstrained_unchecked(subgraph), connectors))
    }

    /// Every task and edge on a stream path from a source to a target.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDoesNotExist`] for an absent task and
    /// [`Error::NoConnectingSubgraph`] if some target is not downstream of
    /// the sources.
    pub fn connecting_subgraph(
        &self,
        sources: impl IntoIterator<Item = Uid>,
        targets: impl IntoIterator<Item = Uid>,
    ) -> Result<Self> {
        builder::connecting_subgraph(self, sources, targets).map(Self::from_unconstrained_unchecked)
    }

    /// Every task connected to `task` through either relation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskDoesNotExist`] if the task is absent.
    pub fn component_subgraph(&self, task: Uid) -> Result<Self> {
        builder::component_subgraph(self, task).map(Self::from_unconstrained_unchecked)
    }

    /// Partition the network into its connected components.
    #[must_use]
    pub fn component_subgraphs(&self) -> Vec<Self> {
        builder::component_subgraphs(self)
            .into_iter()
            .map(Self::from_unconstrained_unchecked)
            .collect()
    }

    fn lineage(&self, task: Uid, lineage: Lineage, strict: bool) -> TaskSet {
        let hierarchy = self.graph.hierarchy_graph();
        let start = TaskSet::from([task]);
        let mut tasks = match lineage {
            Lineage::Superiors => hierarchy.superior_closure(&start),
            Lineage::Inferiors => hierarchy.inferior_closure(&start),
        };
        if strict {
            tasks.remove(&task);
        }
        tasks
    }

    /// Tasks of `side` with their dependency neighbours in `direction` that
    /// fall in `targets`.
    fn links(&self, side: &TaskSet, targets: &TaskSet, direction: Direction) -> Links {
        let dependency = self.graph.dependency_graph().digraph();
        side.iter()
            .filter_map(|&task| {
                let linked: TaskSet = dependency
                    .neighbours(task, direction)
                    .filter(|neighbour| targets.contains(neighbour))
                    .collect();
                (!linked.is_empty()).then_some((task, linked))
            })
            .collect()
    }

    /// Neighbours in `direction` of any task in `tasks`.
    fn neighbours(&self, tasks: &TaskSet, direction: Direction) -> TaskSet {
        let dependency = self.graph.dependency_graph().digraph();
        tasks
            .iter()
            .flat_map(|&task| dependency.neighbours(task, direction))
            .collect()
    }

    /// Compare the dependency neighbours of the supertask's superiors with
    /// those of the sub-task's inferiors, returning the diagnostic sub-graph
    /// on a clash.
    ///
    /// Once the hierarchy exists, every inferior of the sub-task inherits the
    /// neighbours of the supertask side. A neighbour of the sub-task side
    /// that is an inferior-or-self of an inherited one duplicates it; one
    /// that is a strict superior crosses it.
    fn hierarchy_overlap(
        &self,
        (supertask, superiors): (Uid, &TaskSet),
        (subtask, inferiors): (Uid, &TaskSet),
        direction: Direction,
        overlap: Overlap,
    ) -> Result<Option<UnconstrainedNetworkGraph>> {
        let hierarchy = self.graph.hierarchy_graph();
        let inherited = self.neighbours(superiors, direction);
        let existing = self.neighbours(inferiors, direction);
        if inherited.is_empty() || existing.is_empty() {
            return Ok(None);
        }

        // `upper` lies above `lower` in the hierarchy; which one the
        // supertask side links to depends on the overlap.
        let (upper, lower) = match overlap {
            Overlap::Duplication => {
                let mut lower = hierarchy.inferior_closure(&inherited);
                lower.retain(|task| existing.contains(task));
                let mut upper = hierarchy.superior_closure(&lower);
                upper.retain(|task| inherited.contains(task));
                (upper, lower)
            }
            Overlap::Crossover => {
                let mut upper = hierarchy.superior_closure(&inherited);
                upper.retain(|task| existing.contains(task));
                let mut lower = hierarchy.inferior_closure(&upper);
                lower.retain(|task| inherited.contains(task));
                (upper, lower)
            }
        };
        if upper.is_empty() || lower.is_empty() {
            return Ok(None);
        }

        trace!(%supertask, %subtask, ?direction, ?overlap, "Hierarchy overlaps dependencies");
        let (supertask_targets, subtask_targets) = match overlap {
            Overlap::Duplication => (&upper, &lower),
            Overlap::Crossover => (&lower, &upper),
        };
        let supertask_links = self.links(superiors, supertask_targets, direction);
        let subtask_links = self.links(inferiors, subtask_targets, direction);

        let mut builder = SubgraphBuilder::new(&self.graph);
        connect_lineage(
            &mut builder,
            supertask,
            Lineage::Superiors,
            supertask_links.keys().copied(),
        )?;
        connect_lineage(
            &mut builder,
            subtask,
            Lineage::Inferiors,
            subtask_links.keys().copied(),
        )?;
        builder.add_hierarchy_connecting_subgraph(upper, lower)?;
        add_links(&mut builder, &supertask_links, direction)?;
        add_links(&mut builder, &subtask_links, direction)?;
        Ok(Some(builder.build()))
    }
}

/// Add the hierarchy paths joining `task` to members of its lineage.
fn connect_lineage<G: NetworkView + ?Sized>(
    builder: &mut SubgraphBuilder<'_, G>,
    task: Uid,
    lineage: Lineage,
    members: impl IntoIterator<Item = Uid>,
) -> Result<()> {
    match lineage {
        Lineage::Superiors => builder.add_hierarchy_connecting_subgraph(members, [task])?,
        Lineage::Inferiors => builder.add_hierarchy_connecting_subgraph([task], members)?,
    };
    Ok(())
}

fn add_links<G: NetworkView + ?Sized>(
    builder: &mut SubgraphBuilder<'_, G>,
    links: &Links,
    direction: Direction,
) -> Result<()> {
    for (&task, neighbours) in links {
        for &neighbour in neighbours {
            match direction {
                Outgoing => builder.add_dependency(task, neighbour)?,
                Incoming => builder.add_dependency(neighbour, task)?,
            }
        }
    }
    Ok(())
}

impl NetworkView for NetworkGraph {
    fn hierarchy_graph(&self) -> &HierarchyGraph {
        self.graph.hierarchy_graph()
    }

    fn dependency_graph(&self) -> &DependencyGraph {
        self.graph.dependency_graph()
    }
}

impl From<NetworkGraph> for UnconstrainedNetworkGraph {
    fn from(graph: NetworkGraph) -> Self {
        graph.graph
    }
}

impl TryFrom<UnconstrainedNetworkGraph> for NetworkGraph {
    type Error = Error;

    /// Re-validate an unconstrained network against the duplication and
    /// crossover rules.
    fn try_from(graph: UnconstrainedNetworkGraph) -> Result<Self> {
        Self::from_snapshot(&graph.to_snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn uid(n: u64) -> Uid {
        Uid::new(n)
    }

    fn network(tasks: u64, hierarchies: &[(u64, u64)], dependencies: &[(u64, u64)]) -> NetworkGraph {
        let mut graph = NetworkGraph::new();
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
    fn test_dependency_duplicated_by_superior() {
        let mut graph = network(3, &[(1, 2)], &[(3, 1)]);
        let err = graph.add_dependency(uid(3), uid(2)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Redundancy);

        let Error::DependencyIntroducesDependencyDuplication { subgraph, .. } = err else {
            panic!("expected duplication, got {err:?}");
        };
        assert!(subgraph.dependency_graph().has_dependency(uid(3), uid(1)));
        assert!(subgraph.hierarchy_graph().has_hierarchy(uid(1), uid(2)));
    }

    #[test]
    fn test_dependency_duplicated_by_inferior() {
        let mut graph = network(3, &[(1, 2)], &[(2, 3)]);
        let err = graph.add_dependency(uid(1), uid(3)).unwrap_err();

        let Error::DependencyIntroducesDependencyDuplication { subgraph, .. } = err else {
            panic!("expected duplication, got {err:?}");
        };
        assert!(subgraph.dependency_graph().has_dependency(uid(2), uid(3)));
        assert!(subgraph.hierarchy_graph().has_hierarchy(uid(1), uid(2)));
    }

    #[test]
    fn test_dependency_crossover() {
        let mut graph = network(4, &[(1, 2), (3, 4)], &[(1, 4)]);
        let err = graph.add_dependency(uid(2), uid(3)).unwrap_err();

        let Error::DependencyIntroducesDependencyCrossover { subgraph, .. } = err else {
            panic!("expected crossover, got {err:?}");
        };
        assert_eq!(
            subgraph.tasks(),
            TaskSet::from([uid(1), uid(2), uid(3), uid(4)])
        );
        assert!(subgraph.dependency_graph().has_dependency(uid(1), uid(4)));
    }

    #[test]
    fn test_unconstrained_accepts_what_constrained_rejects() {
        let mut graph = network(3, &[(1, 2)], &[(3, 1)]);
        let mut unconstrained = graph.clone().into_unconstrained();
        assert!(graph.add_dependency(uid(3), uid(2)).is_err());
        unconstrained.add_dependency(uid(3), uid(2)).unwrap();
        assert!(NetworkGraph::try_from(unconstrained).is_err());
    }

    #[test]
    fn test_hierarchy_duplicates_downstream_dependency() {
        let mut graph = network(3, &[], &[(1, 2), (3, 2)]);
        let err = graph.add_hierarchy(uid(1), uid(3)).unwrap_err();

        let Error::HierarchyIntroducesDependencyDuplication { subgraph, .. } = err else {
            panic!("expected duplication, got {err:?}");
        };
        assert!(subgraph.dependency_graph().has_dependency(uid(1), uid(2)));
        assert!(subgraph.dependency_graph().has_dependency(uid(3), uid(2)));
    }

    #[test]
    fn test_hierarchy_duplicates_upstream_dependency() {
        let mut graph = network(3, &[], &[(2, 1), (2, 3)]);
        assert!(matches!(
            graph.add_hierarchy(uid(1), uid(3)),
            Err(Error::HierarchyIntroducesDependencyDuplication { .. })
        ));
    }

    #[test]
    fn test_hierarchy_crosses_downstream_dependency() {
        let mut graph = network(4, &[(4, 2)], &[(1, 2), (3, 4)]);
        let err = graph.add_hierarchy(uid(1), uid(3)).unwrap_err();

        let Error::HierarchyIntroducesDependencyCrossover { subgraph, .. } = err else {
            panic!("expected crossover, got {err:?}");
        };
        assert!(subgraph.hierarchy_graph().has_hierarchy(uid(4), uid(2)));
        assert!(subgraph.dependency_graph().has_dependency(uid(1), uid(2)));
        assert!(subgraph.dependency_graph().has_dependency(uid(3), uid(4)));
    }

    #[test]
    fn test_unrelated_lineages_are_accepted() {
        let mut graph = network(4, &[(1, 2)], &[(3, 4)]);
        graph.add_dependency(uid(2), uid(3)).unwrap();
        assert!(graph.validate().is_valid);
    }

    #[test]
    fn test_subgraphs_stay_constrained() {
        let graph = network(4, &[(1, 2)], &[(2, 3), (3, 4)]);
        let subgraph = graph.downstream_subgraph([uid(2)]).unwrap();
        assert_eq!(
            subgraph.tasks(),
            TaskSet::from([uid(2), uid(3), uid(4)])
        );
        assert_eq!(subgraph.as_unconstrained().task_count(), 3);
    }
}
