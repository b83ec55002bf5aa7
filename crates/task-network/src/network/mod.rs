//! Networks combining a hierarchy graph and a dependency graph over one task set.
//!
//! [`UnconstrainedNetworkGraph`] rejects any edge that would let a task
//! become downstream of itself. [`NetworkGraph`] additionally rejects edges
//! that would duplicate or cross orderings already expressed through the
//! other relation.

mod builder;
mod constrained;
pub(crate) mod stream;
mod unconstrained;

pub use builder::SubgraphBuilder;
pub use constrained::NetworkGraph;
pub use stream::StreamTasks;
pub use unconstrained::UnconstrainedNetworkGraph;
