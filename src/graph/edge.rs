//! Directed, labeled edges owned by the extraction that produced them

use super::node::{NodeId, Properties};
use serde::{Deserialize, Serialize};

/// Direction for walking edges.
///
/// `Out` follows edges whose `from` is the current node (children are the
/// `to` side); `In` follows edges whose `to` is the current node (children
/// are the `from` side).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    In,
    #[default]
    Out,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::In => Direction::Out,
            Direction::Out => Direction::In,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::In => write!(f, "IN"),
            Direction::Out => write!(f, "OUT"),
        }
    }
}

/// Unique identifier for a committed edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(u64);

impl EdgeId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for EdgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// An edge as declared by an extraction, before the store assigns it an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub label: String,
    pub from: NodeId,
    pub to: NodeId,
    pub properties: Properties,
}

impl EdgeSpec {
    pub fn new(label: impl Into<String>, from: NodeId, to: NodeId) -> Self {
        Self {
            label: label.into(),
            from,
            to,
            properties: Properties::new(),
        }
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }
}

/// A committed edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub label: String,
    pub from: NodeId,
    pub to: NodeId,
    /// The document whose extraction produced this edge
    pub owner: NodeId,
    pub properties: Properties,
}

impl Edge {
    pub(crate) fn from_spec(id: EdgeId, owner: NodeId, spec: EdgeSpec) -> Self {
        Self {
            id,
            label: spec.label,
            from: spec.from,
            to: spec.to,
            owner,
            properties: spec.properties,
        }
    }

    /// The node reached by following this edge in `direction`.
    pub fn endpoint(&self, direction: Direction) -> &NodeId {
        match direction {
            Direction::Out => &self.to,
            Direction::In => &self.from,
        }
    }

    /// The node on the other side of `node`
    pub fn other(&self, node: &NodeId) -> &NodeId {
        if &self.from == node {
            &self.to
        } else {
            &self.from
        }
    }

    /// Same label, endpoints and properties as a declared edge
    pub fn matches_spec(&self, spec: &EdgeSpec) -> bool {
        self.label == spec.label
            && self.from == spec.from
            && self.to == spec.to
            && self.properties == spec.properties
    }
}
