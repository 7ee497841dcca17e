//! Node representation in the document graph

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The `(index, type)` pair a document belongs to.
///
/// Rules are registered per source key and write to a target key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeKey {
    pub index: String,
    #[serde(rename = "type")]
    pub doc_type: String,
}

impl TypeKey {
    pub fn new(index: impl Into<String>, doc_type: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            doc_type: doc_type.into(),
        }
    }

    /// The node id of document `id` under this key
    pub fn node(&self, id: impl Into<String>) -> NodeId {
        NodeId::new(self.index.clone(), self.doc_type.clone(), id)
    }
}

impl std::fmt::Display for TypeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "/{}/{}", self.index, self.doc_type)
    }
}

/// Unique identifier for a node: one node per `(index, type, id)` document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    pub index: String,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub id: String,
}

impl NodeId {
    pub fn new(index: impl Into<String>, doc_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            doc_type: doc_type.into(),
            id: id.into(),
        }
    }

    /// Another document in the same index and type
    pub fn sibling(&self, id: impl Into<String>) -> Self {
        Self::new(self.index.clone(), self.doc_type.clone(), id)
    }

    pub fn type_key(&self) -> TypeKey {
        TypeKey::new(self.index.clone(), self.doc_type.clone())
    }

    /// The same document id placed under another `(index, type)`
    pub fn retarget(&self, key: &TypeKey) -> Self {
        Self::new(key.index.clone(), key.doc_type.clone(), self.id.clone())
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "/{}/{}/{}", self.index, self.doc_type, self.id)
    }
}

/// Flat key → scalar/array map carried by nodes and edges
pub type Properties = serde_json::Map<String, Value>;

/// True for values allowed in a [`Properties`] map: scalars and arrays of scalars.
pub fn is_flat_value(value: &Value) -> bool {
    match value {
        Value::Object(_) => false,
        Value::Array(items) => items
            .iter()
            .all(|v| !matches!(v, Value::Object(_) | Value::Array(_))),
        _ => true,
    }
}

/// Node metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeMetadata {
    /// When the node was first referenced
    pub created_at: Option<DateTime<Utc>>,
    /// When a property of the node last changed
    pub modified_at: Option<DateTime<Utc>>,
}

/// A node in the document graph.
///
/// Nodes are created on first reference (as an extraction owner or as an
/// edge endpoint) and are never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    /// Properties set by extractions; last write wins per key
    pub properties: Properties,
    pub metadata: NodeMetadata,
}

impl Node {
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            properties: Properties::new(),
            metadata: NodeMetadata {
                created_at: Some(Utc::now()),
                ..Default::default()
            },
        }
    }

    /// Set a property, returning true if the stored value changed.
    pub fn set_property(&mut self, key: impl Into<String>, value: Value) -> bool {
        let key = key.into();
        if self.properties.get(&key) == Some(&value) {
            return false;
        }
        self.properties.insert(key, value);
        self.metadata.modified_at = Some(Utc::now());
        true
    }
}
