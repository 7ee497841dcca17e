//! IndexSink: where finished target documents go
//!
//! The search index is an external collaborator. `upsert` and `delete` are
//! async so an implementation can talk to a remote index; failures are
//! retried by the engine.

use crate::document::Document;
use crate::graph::NodeId;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum SinkError {
    #[error("index unavailable: {0}")]
    Unavailable(String),
    #[error("index rejected {target}: {reason}")]
    Rejected { target: NodeId, reason: String },
}

/// Receives target documents addressed by `(index, type, id)`.
#[async_trait]
pub trait IndexSink: Send + Sync {
    async fn upsert(&self, target: &NodeId, document: Document) -> Result<(), SinkError>;

    /// Remove a target document; removing an absent one is not an error.
    async fn delete(&self, target: &NodeId) -> Result<(), SinkError>;
}

/// In-memory index, used by the CLI and in tests.
#[derive(Debug, Default)]
pub struct MemoryIndexSink {
    documents: DashMap<NodeId, Document>,
    upserts: AtomicU64,
    deletes: AtomicU64,
}

impl MemoryIndexSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, target: &NodeId) -> Option<Document> {
        self.documents.get(target).map(|r| r.value().clone())
    }

    pub fn contains(&self, target: &NodeId) -> bool {
        self.documents.contains_key(target)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// All stored documents, sorted by target id
    pub fn snapshot(&self) -> Vec<(NodeId, Document)> {
        let mut all: Vec<_> = self
            .documents
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    pub fn upsert_count(&self) -> u64 {
        self.upserts.load(Ordering::Relaxed)
    }

    pub fn delete_count(&self) -> u64 {
        self.deletes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl IndexSink for MemoryIndexSink {
    async fn upsert(&self, target: &NodeId, document: Document) -> Result<(), SinkError> {
        self.upserts.fetch_add(1, Ordering::Relaxed);
        self.documents.insert(target.clone(), document);
        Ok(())
    }

    async fn delete(&self, target: &NodeId) -> Result<(), SinkError> {
        self.deletes.fetch_add(1, Ordering::Relaxed);
        self.documents.remove(target);
        Ok(())
    }
}
