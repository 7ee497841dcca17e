//! Core graph data structures

mod edge;
mod events;
mod node;
mod store;
mod subgraph;

#[cfg(test)]
mod tests;

pub use edge::{Direction, Edge, EdgeId, EdgeSpec};
pub use events::{GraphEvent, RemovalReason};
pub use node::{is_flat_value, Node, NodeId, NodeMetadata, Properties, TypeKey};
pub use store::{GraphError, GraphResult, GraphStore};
pub use subgraph::Subgraph;
