//! SubgraphBuilder: the transactional handle passed into `extract`

use crate::graph::{EdgeSpec, NodeId, Properties, Subgraph};
use serde_json::Value;

/// Stages the edges and node properties one extraction declares.
///
/// Nothing touches the graph until the engine commits the finished
/// [`Subgraph`]; dropping a builder discards everything staged.
#[derive(Debug, Clone)]
pub struct SubgraphBuilder {
    subgraph: Subgraph,
}

impl SubgraphBuilder {
    pub fn new(owner: NodeId) -> Self {
        Self {
            subgraph: Subgraph::empty(owner),
        }
    }

    /// The node of the document being extracted
    pub fn node(&self) -> &NodeId {
        &self.subgraph.owner
    }

    /// Declare an edge between the current node and `(index, type, id)`.
    ///
    /// With `inward = false` the edge points from the current node to the
    /// other one; with `inward = true` it points from the other node to the
    /// current one.
    pub fn add_edge(
        &mut self,
        label: impl Into<String>,
        index: impl Into<String>,
        doc_type: impl Into<String>,
        id: impl Into<String>,
        inward: bool,
        properties: Properties,
    ) -> &mut Self {
        let other = NodeId::new(index, doc_type, id);
        self.link(label, other, inward, properties)
    }

    /// Outward edge to a document in the same index and type.
    pub fn add_edge_to(
        &mut self,
        label: impl Into<String>,
        other_id: impl Into<String>,
        properties: Option<Properties>,
    ) -> &mut Self {
        let other = self.subgraph.owner.sibling(other_id);
        self.link(label, other, false, properties.unwrap_or_default())
    }

    /// Inward edge from a document in the same index and type.
    pub fn add_edge_from(
        &mut self,
        label: impl Into<String>,
        other_id: impl Into<String>,
        properties: Option<Properties>,
    ) -> &mut Self {
        let other = self.subgraph.owner.sibling(other_id);
        self.link(label, other, true, properties.unwrap_or_default())
    }

    /// Declare an edge to an arbitrary node.
    pub fn link(&mut self, label: impl Into<String>, other: NodeId, inward: bool, properties: Properties) -> &mut Self {
        let owner = self.subgraph.owner.clone();
        let (from, to) = if inward { (other, owner) } else { (owner, other) };
        self.subgraph
            .edges
            .push(EdgeSpec::new(label, from, to).with_properties(properties));
        self
    }

    /// Set a property on the current node; last write wins.
    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.subgraph.properties.insert(key.into(), value.into());
        self
    }

    pub fn edge_count(&self) -> usize {
        self.subgraph.edges.len()
    }

    pub fn finish(self) -> Subgraph {
        self.subgraph
    }
}
