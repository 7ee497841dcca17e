//! Dependency propagation: from one change to the documents it invalidates
//!
//! A change to a document (its content or the edges it owns) invalidates
//! every walk that read the document or an endpoint of a changed edge.
//! The affected walkers are collected breadth-first through the reverse
//! index, bounded by a depth ceiling. One plan is one wave; its visited set
//! keeps a wave from re-triggering itself through edge cycles.

mod deps;

pub use deps::{DependencyIndex, Dependent};

use crate::graph::{GraphEvent, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{fence, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Identifier of one propagation wave
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WaveId(Uuid);

impl WaveId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WaveId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WaveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A document to recompute and how far from the change it was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recompute {
    pub id: NodeId,
    pub depth: usize,
}

#[derive(Debug, Clone)]
pub struct PropagationPlan {
    pub wave: WaveId,
    pub origin: NodeId,
    pub targets: Vec<Recompute>,
    /// True when the depth ceiling cut the cascade short
    pub truncated: bool,
}

impl PropagationPlan {
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Plans recomputation waves over a [`DependencyIndex`].
#[derive(Debug, Clone)]
pub struct Propagator {
    index: Arc<DependencyIndex>,
    max_depth: usize,
}

impl Propagator {
    pub fn new(index: Arc<DependencyIndex>, max_depth: usize) -> Self {
        Self { index, max_depth }
    }

    pub fn index(&self) -> &Arc<DependencyIndex> {
        &self.index
    }

    /// Collect every document invalidated by a change to `origin` that
    /// produced `events`.
    ///
    /// The origin itself is never a target: the change that caused the
    /// wave already recomputes it.
    pub fn plan(&self, origin: &NodeId, events: &[GraphEvent]) -> PropagationPlan {
        // Orders the caller's document and graph writes before the index
        // reads below; see `DependencyIndex::watch`.
        fence(Ordering::SeqCst);
        let mut seeds: Vec<NodeId> = vec![origin.clone()];
        for event in events {
            for node in event.touched_nodes() {
                if !seeds.contains(node) {
                    seeds.push(node.clone());
                }
            }
        }

        let mut visited: HashSet<NodeId> = HashSet::new();
        visited.insert(origin.clone());
        let mut queue: VecDeque<(NodeId, usize)> = seeds.into_iter().map(|n| (n, 0)).collect();
        let mut targets = Vec::new();
        let mut truncated = false;

        while let Some((node, depth)) = queue.pop_front() {
            for walker in self.index.walkers_of(&node) {
                if visited.contains(&walker) {
                    continue;
                }
                if depth >= self.max_depth {
                    truncated = true;
                    continue;
                }
                visited.insert(walker.clone());
                targets.push(Recompute {
                    id: walker.clone(),
                    depth: depth + 1,
                });
                queue.push_back((walker, depth + 1));
            }
        }

        let plan = PropagationPlan {
            wave: WaveId::new(),
            origin: origin.clone(),
            targets,
            truncated,
        };
        if plan.truncated {
            warn!(
                origin = %origin,
                wave = %plan.wave,
                max_depth = self.max_depth,
                "propagation depth exceeded, cascade truncated"
            );
        }
        debug!(origin = %origin, wave = %plan.wave, targets = plan.targets.len(), "propagation planned");
        plan
    }
}
