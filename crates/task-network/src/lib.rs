//! Jointly consistent task hierarchy and dependency graphs.
//!
//! Tasks are related in two ways: a supertask is composed of its sub-tasks,
//! and a dependent task must wait for its dependee tasks. This crate keeps
//! both relations over one task set and rejects, at the moment of mutation,
//! any edge that would leave the combined network inconsistent.
//!
//! # Key Types
//!
//! - [`HierarchyGraph`]: Transitively reduced DAG of supertask → sub-task edges
//! - [`DependencyGraph`]: DAG of dependee → dependent edges
//! - [`UnconstrainedNetworkGraph`]: Both relations, with no task downstream of itself
//! - [`NetworkGraph`]: Additionally rejects duplicated and crossed dependencies
//! - [`SubgraphBuilder`]: Accumulates a consistent sub-graph of any network
//! - [`NetworkSnapshot`]: Order-independent persisted form of a network
//!
//! # Example
//!
//! ```ignore
//! use taskweave_task_network::{NetworkGraph, NetworkView, Uid};
//!
//! let (design, build, ship) = (Uid::new(1), Uid::new(2), Uid::new(3));
//!
//! let mut graph = NetworkGraph::new();
//! for task in [design, build, ship] {
//!     graph.add_task(task)?;
//! }
//! graph.add_hierarchy(design, build)?;
//! graph.add_dependency(build, ship)?;
//!
//! // `ship` waits for `build`, so it can never become part of `build`.
//! assert!(graph.add_hierarchy(build, ship).is_err());
//!
//! let downstream: Vec<Uid> = graph.downstream_tasks([build])?.collect();
//! assert_eq!(downstream, vec![ship]);
//! ```

mod dependency;
mod digraph;
mod error;
mod hierarchy;
mod network;
mod snapshot;
mod uid;
mod validation;
mod view;

pub use dependency::DependencyGraph;
pub use digraph::StopCondition;
pub use error::{Error, ErrorKind, Result};
pub use hierarchy::HierarchyGraph;
pub use network::{NetworkGraph, StreamTasks, SubgraphBuilder, UnconstrainedNetworkGraph};
pub use snapshot::NetworkSnapshot;
pub use uid::{TaskSet, Uid};
pub use validation::{ValidationResult, Violation};
pub use view::{DependencyView, HierarchyView, NetworkView, ReadOnly};
