//! Source documents: the latest version of every document the engine has seen
//!
//! Walks resolve graph nodes to documents through a [`DocumentSource`]; a
//! node with no document resolves to `None`, which the walk represents as
//! an `exists = false` value.

use crate::graph::{NodeId, TypeKey};
use dashmap::DashMap;
use serde_json::Value;

/// A fully parsed source or target document
pub type Document = Value;

/// Read access to source documents by node id.
pub trait DocumentSource: Send + Sync {
    fn get(&self, id: &NodeId) -> Option<Document>;
}

/// Concurrent in-memory document store.
#[derive(Debug, Default)]
pub struct DocumentStore {
    documents: DashMap<NodeId, Document>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the latest version of a document, returning true if it differs
    /// from the stored one.
    pub fn put(&self, id: NodeId, document: Document) -> bool {
        match self.documents.insert(id, document.clone()) {
            Some(previous) => previous != document,
            None => true,
        }
    }

    pub fn remove(&self, id: &NodeId) -> Option<Document> {
        self.documents.remove(id).map(|(_, doc)| doc)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.documents.contains_key(id)
    }

    /// Ids of stored documents of one `(index, type)`, sorted
    pub fn ids_of(&self, key: &TypeKey) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self
            .documents
            .iter()
            .filter(|entry| &entry.key().type_key() == key)
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl DocumentSource for DocumentStore {
    fn get(&self, id: &NodeId) -> Option<Document> {
        self.documents.get(id).map(|r| r.value().clone())
    }
}
