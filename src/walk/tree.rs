//! DocTree: the arena-backed result of one walk
//!
//! The graph may be cyclic, so the tree never owns its children directly:
//! nodes live in one `Vec` and refer to each other by index. Reducers read
//! the tree through [`TreeView`], which can hide everything below a depth
//! limit so a non-nested property only sees the immediate children.

use crate::document::Document;
use crate::graph::{NodeId, Properties};
use serde_json::{json, Value};

/// The edge a tree node was reached through
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeRef {
    pub label: String,
    pub properties: Properties,
}

/// Why a tree node has no children even though the graph has more
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Truncation {
    /// The node already appears on the path from the root
    Cycle,
    /// The walk reached its depth ceiling
    Depth,
}

#[derive(Debug, Clone)]
pub struct TreeNode {
    pub id: NodeId,
    pub via: Option<EdgeRef>,
    /// `None` when the node has no resolvable document
    pub value: Option<Document>,
    /// Node properties set by extractions, empty when none were set
    pub properties: Properties,
    pub children: Vec<usize>,
    pub truncation: Option<Truncation>,
}

/// A walk result rooted at index 0.
#[derive(Debug, Clone)]
pub struct DocTree {
    nodes: Vec<TreeNode>,
}

impl DocTree {
    pub fn new(root: NodeId, value: Option<Document>) -> Self {
        Self {
            nodes: vec![TreeNode {
                id: root,
                via: None,
                value,
                properties: Properties::new(),
                children: Vec::new(),
                truncation: None,
            }],
        }
    }

    /// Append a child under `parent`, returning its index.
    pub fn push_child(&mut self, parent: usize, id: NodeId, via: EdgeRef, value: Option<Document>) -> usize {
        let index = self.nodes.len();
        self.nodes.push(TreeNode {
            id,
            via: Some(via),
            value,
            properties: Properties::new(),
            children: Vec::new(),
            truncation: None,
        });
        if let Some(node) = self.nodes.get_mut(parent) {
            node.children.push(index);
        }
        index
    }

    pub fn set_properties(&mut self, index: usize, properties: Properties) {
        if let Some(node) = self.nodes.get_mut(index) {
            node.properties = properties;
        }
    }

    pub(crate) fn truncate(&mut self, index: usize, reason: Truncation) {
        if let Some(node) = self.nodes.get_mut(index) {
            node.truncation = Some(reason);
        }
    }

    pub fn node(&self, index: usize) -> Option<&TreeNode> {
        self.nodes.get(index)
    }

    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The full tree
    pub fn root(&self) -> TreeView<'_> {
        TreeView {
            tree: self,
            index: 0,
            depth: 0,
            limit: None,
        }
    }

    /// The tree cut off below `limit` levels
    pub fn limited(&self, limit: usize) -> TreeView<'_> {
        TreeView {
            tree: self,
            index: 0,
            depth: 0,
            limit: Some(limit),
        }
    }
}

/// Read-only window onto one node of a [`DocTree`].
#[derive(Debug, Clone, Copy)]
pub struct TreeView<'a> {
    tree: &'a DocTree,
    index: usize,
    depth: usize,
    limit: Option<usize>,
}

impl<'a> TreeView<'a> {
    fn node(&self) -> &'a TreeNode {
        // Views are only created for indices pushed into the arena.
        &self.tree.nodes[self.index]
    }

    pub fn id(&self) -> &'a NodeId {
        &self.node().id
    }

    /// False for dangling references
    pub fn exists(&self) -> bool {
        self.node().value.is_some()
    }

    pub fn value(&self) -> Option<&'a Document> {
        self.node().value.as_ref()
    }

    pub fn properties(&self) -> &'a Properties {
        &self.node().properties
    }

    /// The edge this node was reached through; `None` for the root.
    pub fn via(&self) -> Option<&'a EdgeRef> {
        self.node().via.as_ref()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn truncation(&self) -> Option<Truncation> {
        self.node().truncation
    }

    pub fn is_leaf(&self) -> bool {
        self.children().is_empty()
    }

    /// Children in encounter order; empty at the view's depth limit.
    pub fn children(&self) -> Vec<TreeView<'a>> {
        if self.limit.is_some_and(|limit| self.depth >= limit) {
            return Vec::new();
        }
        self.node()
            .children
            .iter()
            .map(|&index| TreeView {
                tree: self.tree,
                index,
                depth: self.depth + 1,
                limit: self.limit,
            })
            .collect()
    }

    /// Children whose document resolved
    pub fn existing_children(&self) -> Vec<TreeView<'a>> {
        self.children().into_iter().filter(TreeView::exists).collect()
    }

    /// Every visible node below this one, depth first
    pub fn descendants(&self) -> Vec<TreeView<'a>> {
        let mut out = Vec::new();
        let mut stack: Vec<TreeView<'a>> = self.children().into_iter().rev().collect();
        while let Some(view) = stack.pop() {
            stack.extend(view.children().into_iter().rev());
            out.push(view);
        }
        out
    }

    /// `{ _id, _value: { exists, value }, _children: [...] }`
    pub fn to_json(&self) -> Value {
        let children: Vec<Value> = self.children().iter().map(TreeView::to_json).collect();
        json!({
            "_id": self.id().id,
            "_value": {
                "exists": self.exists(),
                "value": self.value().cloned().unwrap_or(Value::Null),
            },
            "_children": children,
        })
    }
}
