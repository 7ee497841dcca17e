//! Change events: what enters the engine

use crate::document::Document;
use crate::graph::NodeId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
pub enum ChangeKind {
    /// A new version of the document
    Upsert(Document),
    Delete,
}

/// One source document changed.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub id: NodeId,
    pub kind: ChangeKind,
}

impl ChangeEvent {
    pub fn upsert(id: NodeId, document: Document) -> Self {
        Self {
            id,
            kind: ChangeKind::Upsert(document),
        }
    }

    pub fn delete(id: NodeId) -> Self {
        Self {
            id,
            kind: ChangeKind::Delete,
        }
    }
}

/// Line format of a change log: `{"index", "type", "id", "document"}`,
/// where a null or missing document means delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub index: String,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub id: String,
    #[serde(default)]
    pub document: Option<Document>,
}

impl From<ChangeRecord> for ChangeEvent {
    fn from(record: ChangeRecord) -> Self {
        let id = NodeId::new(record.index, record.doc_type, record.id);
        match record.document {
            Some(document) if !document.is_null() => ChangeEvent::upsert(id, document),
            _ => ChangeEvent::delete(id),
        }
    }
}
