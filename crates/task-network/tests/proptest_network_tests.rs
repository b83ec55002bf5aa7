//! Property-based tests for task network invariants.
//!
//! These tests verify the behavioral contracts of the network graphs:
//! - Rejected mutations leave the graph unchanged
//! - Accepted graphs never contain cycles or redundant hierarchies
//! - Downstream and upstream are mirror relations
//! - Extracted sub-graphs contain what they claim to
//! - Snapshots decode back to the graph they were taken from

use proptest::prelude::*;
use taskweave_task_network::{
    NetworkGraph, NetworkView, Result, TaskSet, Uid, UnconstrainedNetworkGraph,
};

// =============================================================================
// Operations
// =============================================================================

/// A single mutation attempted on a network.
#[derive(Clone, Copy, Debug)]
enum Op {
    AddHierarchy(u64, u64),
    AddDependency(u64, u64),
    RemoveHierarchy(u64, u64),
    RemoveDependency(u64, u64),
}

/// Networks the operations can be applied to.
trait Mutate: NetworkView + Clone + PartialEq + std::fmt::Debug + Default {
    fn add_task(&mut self, task: Uid) -> Result<()>;
    fn remove_task(&mut self, task: Uid) -> Result<()>;
    fn apply(&mut self, op: Op) -> Result<()>;
}

macro_rules! impl_mutate {
    ($graph:ty) => {
        impl Mutate for $graph {
            fn add_task(&mut self, task: Uid) -> Result<()> {
                <$graph>::add_task(self, task)
            }

            fn remove_task(&mut self, task: Uid) -> Result<()> {
                <$graph>::remove_task(self, task)
            }

            fn apply(&mut self, op: Op) -> Result<()> {
                match op {
                    Op::AddHierarchy(a, b) => self.add_hierarchy(Uid::new(a), Uid::new(b)),
                    Op::AddDependency(a, b) => self.add_dependency(Uid::new(a), Uid::new(b)),
                    Op::RemoveHierarchy(a, b) => self.remove_hierarchy(Uid::new(a), Uid::new(b)),
                    Op::RemoveDependency(a, b) => {
                        self.remove_dependency(Uid::new(a), Uid::new(b))
                    }
                }
            }
        }
    };
}

impl_mutate!(NetworkGraph);
impl_mutate!(UnconstrainedNetworkGraph);

// =============================================================================
// Strategies for generating test data
// =============================================================================

/// Generate one operation over tasks `0..task_count`.
fn op_strategy(task_count: u64) -> impl Strategy<Value = Op> {
    let pair = (0..task_count, 0..task_count);
    prop_oneof![
        3 => pair.clone().prop_map(|(a, b)| Op::AddHierarchy(a, b)),
        3 => pair.clone().prop_map(|(a, b)| Op::AddDependency(a, b)),
        1 => pair.clone().prop_map(|(a, b)| Op::RemoveHierarchy(a, b)),
        1 => pair.prop_map(|(a, b)| Op::RemoveDependency(a, b)),
    ]
}

/// Generate a task count and a sequence of operations over those tasks.
fn scenario_strategy() -> impl Strategy<Value = (u64, Vec<Op>)> {
    (3..=8_u64).prop_flat_map(|task_count| {
        (
            Just(task_count),
            proptest::collection::vec(op_strategy(task_count), 0..40),
        )
    })
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Apply every operation, ignoring rejections.
fn build<G: Mutate>(task_count: u64, ops: &[Op]) -> G {
    let mut graph = G::default();
    for task in 0..task_count {
        graph
            .add_task(Uid::new(task))
            .expect("fresh task ids are unique");
    }
    for &op in ops {
        let _ = graph.apply(op);
    }
    graph
}

fn downstream<G: NetworkView>(graph: &G, task: Uid) -> TaskSet {
    graph
        .downstream_tasks([task])
        .expect("task exists")
        .collect()
}

fn upstream<G: NetworkView>(graph: &G, task: Uid) -> TaskSet {
    graph.upstream_tasks([task]).expect("task exists").collect()
}

// =============================================================================
// Mutation Properties
// =============================================================================

proptest! {
    /// Contract: A rejected operation leaves a constrained network unchanged.
    #[test]
    fn rejected_operations_leave_network_unchanged((task_count, ops) in scenario_strategy()) {
        let mut graph: NetworkGraph = build(task_count, &[]);
        for op in ops {
            let before = graph.clone();
            if graph.apply(op).is_err() {
                prop_assert_eq!(&graph, &before, "Rejected {:?} changed the graph", op);
            }
        }
    }

    /// Contract: A rejected operation leaves an unconstrained network unchanged.
    #[test]
    fn rejected_operations_leave_unconstrained_network_unchanged(
        (task_count, ops) in scenario_strategy()
    ) {
        let mut graph: UnconstrainedNetworkGraph = build(task_count, &[]);
        for op in ops {
            let before = graph.clone();
            if graph.apply(op).is_err() {
                prop_assert_eq!(&graph, &before, "Rejected {:?} changed the graph", op);
            }
        }
    }

    /// Contract: Every edge the constrained network accepts, the unconstrained one accepts.
    #[test]
    fn constrained_acceptance_implies_unconstrained_acceptance(
        (task_count, ops) in scenario_strategy()
    ) {
        let mut graph: NetworkGraph = build(task_count, &[]);
        for op in ops {
            let mut unconstrained = graph.as_unconstrained().clone();
            if graph.apply(op).is_ok() {
                prop_assert!(
                    unconstrained.apply(op).is_ok(),
                    "Unconstrained network rejected {:?}", op
                );
                prop_assert_eq!(&unconstrained, graph.as_unconstrained());
            }
        }
    }

    /// Contract: Removing an isolated task and re-adding it restores the graph.
    #[test]
    fn removing_isolated_task_is_reversible((task_count, ops) in scenario_strategy()) {
        let graph: NetworkGraph = build(task_count, &ops);
        for task in graph.isolated_tasks() {
            let mut changed = graph.clone();
            Mutate::remove_task(&mut changed, task).expect("isolated task can be removed");
            prop_assert!(!changed.contains_task(task));
            Mutate::add_task(&mut changed, task).expect("removed task can be re-added");
            prop_assert_eq!(&changed, &graph);
        }
    }
}

// =============================================================================
// Invariant Properties
// =============================================================================

proptest! {
    /// Contract: Accepted graphs pass the full invariant audit.
    #[test]
    fn accepted_graphs_are_valid((task_count, ops) in scenario_strategy()) {
        let graph: NetworkGraph = build(task_count, &ops);
        let result = graph.validate();
        prop_assert!(result.is_valid, "Violations: {:?}", result.violations);

        let graph: UnconstrainedNetworkGraph = build(task_count, &ops);
        let result = graph.validate();
        prop_assert!(result.is_valid, "Violations: {:?}", result.violations);
    }

    /// Contract: No task is downstream of itself.
    #[test]
    fn no_task_is_downstream_of_itself((task_count, ops) in scenario_strategy()) {
        let graph: UnconstrainedNetworkGraph = build(task_count, &ops);
        for task in graph.tasks() {
            prop_assert!(
                !downstream(&graph, task).contains(&task),
                "Task {} is downstream of itself", task
            );
        }
    }

    /// Contract: b is downstream of a exactly when a is upstream of b.
    #[test]
    fn downstream_and_upstream_are_dual((task_count, ops) in scenario_strategy()) {
        let graph: UnconstrainedNetworkGraph = build(task_count, &ops);
        let tasks = graph.tasks();
        for &a in &tasks {
            let downstream_of_a = downstream(&graph, a);
            for &b in &tasks {
                prop_assert_eq!(
                    downstream_of_a.contains(&b),
                    upstream(&graph, b).contains(&a),
                    "Duality broken for {} and {}", a, b
                );
            }
        }
    }

    /// Contract: Stream paths agree with the downstream relation.
    #[test]
    fn stream_paths_follow_downstream((task_count, ops) in scenario_strategy()) {
        let graph: NetworkGraph = build(task_count, &ops);
        let tasks = graph.tasks();
        for &a in &tasks {
            let downstream_of_a = downstream(&graph, a);
            for &b in &tasks {
                prop_assert_eq!(
                    graph.has_stream_path(a, b).expect("tasks exist"),
                    a == b || downstream_of_a.contains(&b)
                );
            }
        }
    }
}

// =============================================================================
// Extraction Properties
// =============================================================================

proptest! {
    /// Contract: A downstream sub-graph holds the task, everything downstream of
    /// it, and reports every other task it holds as a connector.
    #[test]
    fn downstream_subgraph_contains_downstream_tasks((task_count, ops) in scenario_strategy()) {
        let graph: UnconstrainedNetworkGraph = build(task_count, &ops);
        for task in graph.tasks() {
            let stream = downstream(&graph, task);
            let (subgraph, connectors) = graph
                .downstream_subgraph_with_connectors([task])
                .expect("task exists");

            let tasks = subgraph.tasks();
            prop_assert!(tasks.contains(&task));
            prop_assert!(tasks.is_superset(&stream));

            let mut expected_connectors = tasks;
            expected_connectors.remove(&task);
            expected_connectors.retain(|other| !stream.contains(other));
            prop_assert_eq!(connectors, expected_connectors);
        }
    }

    /// Contract: Stream relations inside a downstream sub-graph are preserved.
    #[test]
    fn downstream_subgraph_preserves_stream((task_count, ops) in scenario_strategy()) {
        let graph: NetworkGraph = build(task_count, &ops);
        for task in graph.tasks() {
            let subgraph = graph.downstream_subgraph([task]).expect("task exists");
            prop_assert_eq!(downstream(&subgraph, task), downstream(&graph, task));
        }
    }

    /// Contract: A connecting sub-graph exists exactly for downstream targets and
    /// holds both ends.
    #[test]
    fn connecting_subgraph_joins_source_and_target((task_count, ops) in scenario_strategy()) {
        let graph: UnconstrainedNetworkGraph = build(task_count, &ops);
        let tasks = graph.tasks();
        for &source in &tasks {
            let stream = downstream(&graph, source);
            for &target in &tasks {
                let connecting = graph.connecting_subgraph([source], [target]);
                if source == target || stream.contains(&target) {
                    let connecting = connecting.expect("target is reachable");
                    prop_assert!(connecting.contains_task(source));
                    prop_assert!(connecting.contains_task(target));
                } else {
                    prop_assert!(connecting.is_err());
                }
            }
        }
    }

    /// Contract: Components partition the task set.
    #[test]
    fn components_partition_tasks((task_count, ops) in scenario_strategy()) {
        let graph: NetworkGraph = build(task_count, &ops);
        let components = graph.component_subgraphs();

        let mut covered = TaskSet::new();
        for component in &components {
            let tasks = component.tasks();
            prop_assert!(covered.is_disjoint(&tasks), "Components overlap");
            covered.extend(tasks);
        }
        prop_assert_eq!(covered, graph.tasks());
    }
}

// =============================================================================
// Snapshot Properties
// =============================================================================

proptest! {
    /// Contract: Decoding a snapshot re-validates cleanly and restores the graph.
    #[test]
    fn snapshots_restore_graph((task_count, ops) in scenario_strategy()) {
        let graph: NetworkGraph = build(task_count, &ops);
        let restored = NetworkGraph::from_snapshot(&graph.to_snapshot())
            .expect("snapshot of a valid graph decodes");
        prop_assert_eq!(&restored, &graph);

        let graph: UnconstrainedNetworkGraph = build(task_count, &ops);
        let restored = UnconstrainedNetworkGraph::from_snapshot(&graph.to_snapshot())
            .expect("snapshot of a valid graph decodes");
        prop_assert_eq!(&restored, &graph);
    }

    /// Contract: A constrained network round-trips through the unconstrained type.
    #[test]
    fn constrained_network_survives_revalidation((task_count, ops) in scenario_strategy()) {
        let graph: NetworkGraph = build(task_count, &ops);
        let revalidated = NetworkGraph::try_from(graph.clone().into_unconstrained())
            .expect("constrained network revalidates");
        prop_assert_eq!(revalidated, graph);
    }
}
