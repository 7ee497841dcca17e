//! DependencyIndex: which walkers read which nodes

use crate::graph::{Direction, NodeId};
use crate::walk::WalkDependency;
use dashmap::DashMap;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{fence, Ordering};

/// One walk of one document that read a node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Dependent {
    pub walker: NodeId,
    pub walk: String,
    pub direction: Direction,
    pub label: Option<String>,
}

/// Reverse index from a read node to the walks that read it.
///
/// A forward map per walker lets a recompute replace the walker's previous
/// dependencies instead of accumulating stale ones.
#[derive(Debug, Default)]
pub struct DependencyIndex {
    reverse: DashMap<NodeId, HashSet<Dependent>>,
    forward: DashMap<NodeId, HashSet<NodeId>>,
}

impl DependencyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace everything `walker` depended on with `dependencies`.
    ///
    /// Entries shared by the old and new sets are never removed, so a
    /// concurrent planner always sees a node that stays read.
    pub fn record(&self, walker: &NodeId, dependencies: &[WalkDependency]) {
        let mut wanted: HashMap<NodeId, HashSet<Dependent>> = HashMap::new();
        for dep in dependencies {
            wanted
                .entry(dep.node.clone())
                .or_default()
                .insert(Self::dependent(walker, dep));
        }
        for (node, deps) in &wanted {
            self.reverse.entry(node.clone()).or_default().extend(deps.iter().cloned());
        }

        let previous = self.forward.get(walker).map(|set| set.clone()).unwrap_or_default();
        for node in previous {
            let keep = wanted.get(&node);
            self.retain_walker(&node, walker, |d| keep.is_some_and(|set| set.contains(d)));
        }
        for node in wanted.keys() {
            let keep = &wanted[node];
            self.retain_walker(node, walker, |d| keep.contains(d));
        }

        if wanted.is_empty() {
            self.forward.remove(walker);
        } else {
            self.forward.insert(walker.clone(), wanted.into_keys().collect());
        }
    }

    /// Add one read while a walk is still running.
    ///
    /// Nothing is removed; the final [`record`](Self::record) prunes reads
    /// the finished walk no longer has.
    pub fn watch(&self, walker: &NodeId, dependency: &WalkDependency) {
        self.reverse
            .entry(dependency.node.clone())
            .or_default()
            .insert(Self::dependent(walker, dependency));
        self.forward
            .entry(walker.clone())
            .or_default()
            .insert(dependency.node.clone());
        // Pairs with the fence in `Propagator::plan`: either the planner
        // sees this read, or the walker sees the planner's writes.
        fence(Ordering::SeqCst);
    }

    fn dependent(walker: &NodeId, dep: &WalkDependency) -> Dependent {
        Dependent {
            walker: walker.clone(),
            walk: dep.walk.clone(),
            direction: dep.direction,
            label: dep.label.clone(),
        }
    }

    fn retain_walker(&self, node: &NodeId, walker: &NodeId, keep: impl Fn(&Dependent) -> bool) {
        let now_empty = match self.reverse.get_mut(node) {
            Some(mut set) => {
                set.retain(|d| &d.walker != walker || keep(d));
                set.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.reverse.remove_if(node, |_, set| set.is_empty());
        }
    }

    /// Forget every dependency recorded for `walker`.
    pub fn clear_walker(&self, walker: &NodeId) {
        let Some((_, nodes)) = self.forward.remove(walker) else {
            return;
        };
        for node in nodes {
            self.retain_walker(&node, walker, |_| false);
        }
    }

    /// Walks that read `node`
    pub fn dependents_of(&self, node: &NodeId) -> Vec<Dependent> {
        let mut out: Vec<Dependent> = self
            .reverse
            .get(node)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        out.sort();
        out
    }

    /// Distinct walker documents that read `node`, sorted
    pub fn walkers_of(&self, node: &NodeId) -> Vec<NodeId> {
        self.reverse
            .get(node)
            .map(|set| set.iter().map(|d| d.walker.clone()).collect::<BTreeSet<_>>())
            .unwrap_or_default()
            .into_iter()
            .collect()
    }

    /// Nodes `walker` read during its last computation
    pub fn reads_of(&self, walker: &NodeId) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = self
            .forward
            .get(walker)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        out.sort();
        out
    }

    /// Number of walkers with recorded dependencies
    pub fn walker_count(&self) -> usize {
        self.forward.len()
    }
}
