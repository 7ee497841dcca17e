//! Graph events fired when a subgraph is committed
//!
//! One event per mutation kind. The propagator reads them to decide which
//! target documents are affected by a commit.

use super::edge::Edge;
use super::node::NodeId;

/// Why edges left the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// A re-extraction of the owner no longer declares them
    Replaced,
    /// The owning document was deleted
    Deleted,
}

/// A graph event fired by a commit.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphEvent {
    /// Edges were added by the owner's extraction
    EdgesAdded { owner: NodeId, edges: Vec<Edge> },
    /// Edges owned by `owner` were removed
    EdgesRemoved {
        owner: NodeId,
        edges: Vec<Edge>,
        reason: RemovalReason,
    },
    /// Node properties changed value
    PropertiesChanged { node: NodeId, keys: Vec<String> },
}

impl GraphEvent {
    /// Every node whose neighbourhood or properties this event changed.
    pub fn touched_nodes(&self) -> Vec<&NodeId> {
        match self {
            GraphEvent::EdgesAdded { edges, .. } | GraphEvent::EdgesRemoved { edges, .. } => edges
                .iter()
                .flat_map(|e| [&e.from, &e.to])
                .collect(),
            GraphEvent::PropertiesChanged { node, .. } => vec![node],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EdgeId, EdgeSpec};

    #[test]
    fn edge_events_touch_both_endpoints() {
        let a = NodeId::new("i", "t", "a");
        let b = NodeId::new("i", "t", "b");
        let edge = Edge::from_spec(EdgeId::new(1), a.clone(), EdgeSpec::new("child", a.clone(), b.clone()));
        let event = GraphEvent::EdgesAdded {
            owner: a.clone(),
            edges: vec![edge],
        };
        let touched = event.touched_nodes();
        assert_eq!(touched, vec![&a, &b]);
    }

    #[test]
    fn property_events_touch_the_node() {
        let a = NodeId::new("i", "t", "a");
        let event = GraphEvent::PropertiesChanged {
            node: a.clone(),
            keys: vec!["test".to_string()],
        };
        assert_eq!(event.touched_nodes(), vec![&a]);
    }
}
