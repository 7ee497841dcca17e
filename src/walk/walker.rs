//! Walker: depth-first tree construction over the graph store

use super::cancel::CancellationToken;
use super::tree::{DocTree, EdgeRef, Truncation};
use super::WalkError;
use crate::document::DocumentSource;
use crate::graph::{Direction, GraphStore, NodeId, Properties};
use serde::Serialize;
use std::collections::HashSet;
use std::ops::AddAssign;

/// Counters collected while building trees
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WalkStats {
    pub nodes: usize,
    pub dangling: usize,
    pub cycles_truncated: usize,
    pub depth_truncated: usize,
}

impl AddAssign for WalkStats {
    fn add_assign(&mut self, other: Self) {
        self.nodes += other.nodes;
        self.dangling += other.dangling;
        self.cycles_truncated += other.cycles_truncated;
        self.depth_truncated += other.depth_truncated;
    }
}

/// A node the walk read, with the edge label it was reached through
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Visit {
    pub node: NodeId,
    pub label: Option<String>,
}

#[derive(Debug)]
pub struct WalkOutcome {
    pub tree: DocTree,
    pub visits: Vec<Visit>,
    pub stats: WalkStats,
}

enum Frame {
    Enter { index: usize, depth: usize },
    Leave(NodeId),
}

/// Builds [`DocTree`]s from the graph.
///
/// Each node on the current root-to-node path is remembered; meeting it
/// again produces a leaf marked [`Truncation::Cycle`]. The same node may
/// still appear on several sibling paths.
pub struct Walker<'a> {
    graph: &'a GraphStore,
    documents: &'a dyn DocumentSource,
    max_depth: usize,
    observer: Option<&'a (dyn Fn(&Visit) + 'a)>,
}

impl<'a> Walker<'a> {
    pub fn new(graph: &'a GraphStore, documents: &'a dyn DocumentSource, max_depth: usize) -> Self {
        Self {
            graph,
            documents,
            max_depth,
            observer: None,
        }
    }

    /// Report every node to `observer` before its document is read.
    pub fn with_observer(mut self, observer: &'a (dyn Fn(&Visit) + 'a)) -> Self {
        self.observer = Some(observer);
        self
    }

    fn visit(&self, visits: &mut Vec<Visit>, visit: Visit) {
        if let Some(observer) = self.observer {
            observer(&visit);
        }
        visits.push(visit);
    }

    fn properties(&self, id: &NodeId) -> Result<Properties, WalkError> {
        Ok(self.graph.node(id)?.map(|node| node.properties).unwrap_or_default())
    }

    /// Walk from `root` along `direction`.
    ///
    /// A flat walk stops after the immediate children; a nested walk
    /// descends until `max_depth`, marking nodes cut off there.
    pub fn walk(
        &self,
        root: &NodeId,
        direction: Direction,
        nested: bool,
        token: &CancellationToken,
    ) -> Result<WalkOutcome, WalkError> {
        let limit = if nested { self.max_depth } else { 1 };
        let mut visits = Vec::new();
        self.visit(
            &mut visits,
            Visit {
                node: root.clone(),
                label: None,
            },
        );
        let mut tree = DocTree::new(root.clone(), self.documents.get(root));
        tree.set_properties(0, self.properties(root)?);
        let mut stats = WalkStats {
            nodes: 1,
            ..Default::default()
        };
        let mut path: HashSet<NodeId> = HashSet::new();
        let mut stack = vec![Frame::Enter { index: 0, depth: 0 }];

        while let Some(frame) = stack.pop() {
            let (index, depth) = match frame {
                Frame::Leave(id) => {
                    path.remove(&id);
                    continue;
                }
                Frame::Enter { index, depth } => (index, depth),
            };
            token.check()?;

            let Some(id) = tree.node(index).map(|n| n.id.clone()) else {
                continue;
            };
            if path.contains(&id) {
                tree.truncate(index, Truncation::Cycle);
                stats.cycles_truncated += 1;
                continue;
            }
            if depth >= limit {
                if nested && !self.graph.edges(&id, direction)?.is_empty() {
                    tree.truncate(index, Truncation::Depth);
                    stats.depth_truncated += 1;
                }
                continue;
            }

            let edges = self.graph.edges(&id, direction)?;
            path.insert(id.clone());
            stack.push(Frame::Leave(id));

            let mut children = Vec::with_capacity(edges.len());
            for edge in edges {
                let other = edge.endpoint(direction).clone();
                self.visit(
                    &mut visits,
                    Visit {
                        node: other.clone(),
                        label: Some(edge.label.clone()),
                    },
                );
                let value = self.documents.get(&other);
                if value.is_none() {
                    stats.dangling += 1;
                }
                let properties = self.properties(&other)?;
                let via = EdgeRef {
                    label: edge.label,
                    properties: edge.properties,
                };
                let child = tree.push_child(index, other, via, value);
                tree.set_properties(child, properties);
                children.push(child);
                stats.nodes += 1;
            }
            for child in children.into_iter().rev() {
                stack.push(Frame::Enter {
                    index: child,
                    depth: depth + 1,
                });
            }
        }

        Ok(WalkOutcome { tree, visits, stats })
    }
}
