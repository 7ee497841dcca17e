//! Subgraph: the unit of graph mutation produced by one extraction

use super::edge::EdgeSpec;
use super::node::{is_flat_value, NodeId, Properties};
use tracing::warn;

/// All edges and properties one document's extraction declares.
///
/// A subgraph is committed atomically and replaces everything its owner
/// committed before.
#[derive(Debug, Clone, PartialEq)]
pub struct Subgraph {
    pub owner: NodeId,
    pub edges: Vec<EdgeSpec>,
    pub properties: Properties,
}

impl Subgraph {
    pub fn empty(owner: NodeId) -> Self {
        Self {
            owner,
            edges: Vec::new(),
            properties: Properties::new(),
        }
    }

    /// Merge the subgraphs several rules extracted for the same owner.
    ///
    /// Duplicate edges and properties across parts are kept (later
    /// properties win) but logged, since two rules declaring the same
    /// relation is usually a configuration mistake.
    pub fn merge(owner: NodeId, parts: Vec<Subgraph>) -> Self {
        let mut merged = Subgraph::empty(owner);
        for part in parts {
            for edge in part.edges {
                if merged.edges.contains(&edge) {
                    warn!(
                        owner = %merged.owner,
                        label = %edge.label,
                        from = %edge.from,
                        to = %edge.to,
                        "duplicate edge while merging extracted subgraphs"
                    );
                }
                merged.edges.push(edge);
            }
            for (key, value) in part.properties {
                if merged.properties.contains_key(&key) {
                    warn!(owner = %merged.owner, key = %key, "duplicate property while merging extracted subgraphs");
                }
                merged.properties.insert(key, value);
            }
        }
        merged
    }

    /// Check that every edge touches the owner and every property is flat.
    ///
    /// Returns a description of the first violation.
    pub fn validate(&self) -> Result<(), String> {
        for edge in &self.edges {
            if edge.from != self.owner && edge.to != self.owner {
                return Err(format!(
                    "edge {} {}→{} does not touch its owner {}",
                    edge.label, edge.from, edge.to, self.owner
                ));
            }
            if let Some((key, _)) = edge.properties.iter().find(|(_, v)| !is_flat_value(v)) {
                return Err(format!("edge {} property '{}' is not a scalar or array", edge.label, key));
            }
        }
        if let Some((key, _)) = self.properties.iter().find(|(_, v)| !is_flat_value(v)) {
            return Err(format!("node property '{}' is not a scalar or array", key));
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty() && self.properties.is_empty()
    }
}
