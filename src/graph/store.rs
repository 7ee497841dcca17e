//! GraphStore: the shared, in-memory property graph

use super::edge::{Direction, Edge, EdgeId, EdgeSpec};
use super::events::{GraphEvent, RemovalReason};
use super::node::{Node, NodeId};
use super::subgraph::Subgraph;
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

/// Errors that can occur in graph store operations
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("graph store lock poisoned")]
    Poisoned,
}

/// Result type for graph store operations
pub type GraphResult<T> = Result<T, GraphError>;

#[derive(Debug, Default)]
struct GraphState {
    nodes: HashMap<NodeId, Node>,
    edges: HashMap<EdgeId, Edge>,
    /// Edge ids per owning document, in declaration order
    owned: HashMap<NodeId, Vec<EdgeId>>,
    /// Edge ids leaving / entering each node. One owner's edges appear in
    /// its declaration order.
    outgoing: HashMap<NodeId, Vec<EdgeId>>,
    incoming: HashMap<NodeId, Vec<EdgeId>>,
    next_edge: u64,
}

impl GraphState {
    fn ensure_node(&mut self, id: &NodeId) -> &mut Node {
        self.nodes
            .entry(id.clone())
            .or_insert_with(|| Node::new(id.clone()))
    }

    fn insert_edge(&mut self, owner: &NodeId, spec: EdgeSpec) -> Edge {
        self.next_edge += 1;
        let edge = Edge::from_spec(EdgeId::new(self.next_edge), owner.clone(), spec);
        self.ensure_node(&edge.from);
        self.ensure_node(&edge.to);
        self.outgoing.entry(edge.from.clone()).or_default().push(edge.id);
        self.incoming.entry(edge.to.clone()).or_default().push(edge.id);
        self.edges.insert(edge.id, edge.clone());
        edge
    }

    fn remove_edge(&mut self, id: EdgeId) -> Option<Edge> {
        let edge = self.edges.remove(&id)?;
        if let Some(ids) = self.outgoing.get_mut(&edge.from) {
            ids.retain(|e| *e != id);
        }
        if let Some(ids) = self.incoming.get_mut(&edge.to) {
            ids.retain(|e| *e != id);
        }
        Some(edge)
    }

    /// Put the slots `order` occupies in each endpoint index into `order`'s
    /// sequence. Edges of other owners keep their positions.
    fn reorder(&mut self, order: &[EdgeId]) {
        let mut from_nodes: Vec<NodeId> = Vec::new();
        let mut to_nodes: Vec<NodeId> = Vec::new();
        for id in order {
            if let Some(edge) = self.edges.get(id) {
                if !from_nodes.contains(&edge.from) {
                    from_nodes.push(edge.from.clone());
                }
                if !to_nodes.contains(&edge.to) {
                    to_nodes.push(edge.to.clone());
                }
            }
        }
        for node in from_nodes {
            if let Some(ids) = self.outgoing.get_mut(&node) {
                reorder_slots(ids, order);
            }
        }
        for node in to_nodes {
            if let Some(ids) = self.incoming.get_mut(&node) {
                reorder_slots(ids, order);
            }
        }
    }
}

fn reorder_slots(ids: &mut [EdgeId], order: &[EdgeId]) {
    let wanted: Vec<EdgeId> = order.iter().copied().filter(|id| ids.contains(id)).collect();
    let mut wanted = wanted.into_iter();
    for slot in ids.iter_mut() {
        if order.contains(slot) {
            if let Some(id) = wanted.next() {
                *slot = id;
            }
        }
    }
}

/// The graph of documents and the edges their extractions declared.
///
/// The store is the only shared mutable resource of the engine. Writers
/// commit a whole [`Subgraph`] under one write lock; readers (walks) take
/// short read locks per lookup.
#[derive(Debug, Default)]
pub struct GraphStore {
    state: RwLock<GraphState>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically replace everything `subgraph.owner` previously committed.
    ///
    /// Edges identical to ones already owned (same label, endpoints and
    /// properties) are kept as-is, so re-committing an unchanged subgraph
    /// produces no events. Properties are merged into the owner node,
    /// last write wins per key. A reordered declaration reorders the
    /// owner's edges in the walk indexes without producing events.
    pub fn commit(&self, subgraph: Subgraph) -> GraphResult<Vec<GraphEvent>> {
        let mut state = self.state.write().map_err(|_| GraphError::Poisoned)?;
        let owner = subgraph.owner;
        state.ensure_node(&owner);

        let previous = state.owned.remove(&owner).unwrap_or_default();
        let mut unmatched: Vec<Option<EdgeId>> = previous.iter().copied().map(Some).collect();
        let mut kept: Vec<EdgeId> = Vec::new();
        let mut added: Vec<Edge> = Vec::new();

        for spec in subgraph.edges {
            let existing = unmatched.iter_mut().find(|slot| {
                slot.and_then(|id| state.edges.get(&id))
                    .is_some_and(|edge| edge.matches_spec(&spec))
            });
            match existing.and_then(Option::take) {
                Some(id) => kept.push(id),
                None => {
                    let edge = state.insert_edge(&owner, spec);
                    kept.push(edge.id);
                    added.push(edge);
                }
            }
        }

        let removed: Vec<Edge> = unmatched
            .into_iter()
            .flatten()
            .filter_map(|id| state.remove_edge(id))
            .collect();

        if !kept.is_empty() {
            state.reorder(&kept);
            state.owned.insert(owner.clone(), kept);
        }

        let node = state.ensure_node(&owner);
        let mut changed_keys = Vec::new();
        for (key, value) in subgraph.properties {
            if node.set_property(key.clone(), value) {
                changed_keys.push(key);
            }
        }

        let mut events = Vec::new();
        if !added.is_empty() {
            events.push(GraphEvent::EdgesAdded {
                owner: owner.clone(),
                edges: added,
            });
        }
        if !removed.is_empty() {
            events.push(GraphEvent::EdgesRemoved {
                owner: owner.clone(),
                edges: removed,
                reason: RemovalReason::Replaced,
            });
        }
        if !changed_keys.is_empty() {
            events.push(GraphEvent::PropertiesChanged {
                node: owner,
                keys: changed_keys,
            });
        }
        Ok(events)
    }

    /// Remove every edge owned by `owner`. The node itself stays.
    pub fn delete_owned(&self, owner: &NodeId) -> GraphResult<Vec<GraphEvent>> {
        let mut state = self.state.write().map_err(|_| GraphError::Poisoned)?;
        let ids = state.owned.remove(owner).unwrap_or_default();
        let removed: Vec<Edge> = ids.into_iter().filter_map(|id| state.remove_edge(id)).collect();
        if removed.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![GraphEvent::EdgesRemoved {
            owner: owner.clone(),
            edges: removed,
            reason: RemovalReason::Deleted,
        }])
    }

    /// Edges to follow from `node` when walking in `direction`, in insertion order.
    pub fn edges(&self, node: &NodeId, direction: Direction) -> GraphResult<Vec<Edge>> {
        let state = self.state.read().map_err(|_| GraphError::Poisoned)?;
        let index = match direction {
            Direction::Out => &state.outgoing,
            Direction::In => &state.incoming,
        };
        Ok(index
            .get(node)
            .map(|ids| ids.iter().filter_map(|id| state.edges.get(id).cloned()).collect())
            .unwrap_or_default())
    }

    /// Edges whose extraction owner is `owner`, in declaration order.
    pub fn owned_edges(&self, owner: &NodeId) -> GraphResult<Vec<Edge>> {
        let state = self.state.read().map_err(|_| GraphError::Poisoned)?;
        Ok(state
            .owned
            .get(owner)
            .map(|ids| ids.iter().filter_map(|id| state.edges.get(id).cloned()).collect())
            .unwrap_or_default())
    }

    pub fn node(&self, id: &NodeId) -> GraphResult<Option<Node>> {
        let state = self.state.read().map_err(|_| GraphError::Poisoned)?;
        Ok(state.nodes.get(id).cloned())
    }

    pub fn contains_node(&self, id: &NodeId) -> GraphResult<bool> {
        let state = self.state.read().map_err(|_| GraphError::Poisoned)?;
        Ok(state.nodes.contains_key(id))
    }

    pub fn node_count(&self) -> GraphResult<usize> {
        let state = self.state.read().map_err(|_| GraphError::Poisoned)?;
        Ok(state.nodes.len())
    }

    pub fn edge_count(&self) -> GraphResult<usize> {
        let state = self.state.read().map_err(|_| GraphError::Poisoned)?;
        Ok(state.edges.len())
    }
}
