//! Walk engine: traverse, build a DocTree, reduce into target properties

mod cancel;
mod tree;
mod walker;

pub use cancel::CancellationToken;
pub use tree::{DocTree, EdgeRef, TreeNode, TreeView, Truncation};
pub use walker::{Visit, WalkOutcome, WalkStats, Walker};

use crate::document::DocumentSource;
use crate::graph::{Direction, GraphError, GraphStore, NodeId, Properties};
use crate::rules::{RuleError, WalkSpec};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that abort a walk. Dangling references and truncations are not
/// errors.
#[derive(Debug, Error)]
pub enum WalkError {
    #[error("walk cancelled by a newer change")]
    Cancelled,
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// A node one named walk read while computing a target document
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WalkDependency {
    pub walk: String,
    pub direction: Direction,
    pub node: NodeId,
    pub label: Option<String>,
}

/// A reducer that failed; its property is left out of the target document.
#[derive(Debug, Clone)]
pub struct ReduceFailure {
    pub walk: String,
    pub property: String,
    pub error: RuleError,
}

/// Everything the walks of one rule produced for one document
#[derive(Debug, Default)]
pub struct WalkResult {
    pub properties: Properties,
    pub dependencies: Vec<WalkDependency>,
    pub failures: Vec<ReduceFailure>,
    pub stats: WalkStats,
}

/// Runs the configured walks of a rule against the shared graph.
#[derive(Clone)]
pub struct WalkEngine {
    graph: Arc<GraphStore>,
    documents: Arc<dyn DocumentSource>,
    max_depth: usize,
}

impl WalkEngine {
    pub fn new(graph: Arc<GraphStore>, documents: Arc<dyn DocumentSource>, max_depth: usize) -> Self {
        Self {
            graph,
            documents,
            max_depth: max_depth.max(1),
        }
    }

    /// Walk from `root` once per configured walk and reduce every property.
    ///
    /// Later properties overwrite earlier ones with the same name.
    pub fn run(
        &self,
        root: &NodeId,
        walks: &BTreeMap<String, WalkSpec>,
        token: &CancellationToken,
    ) -> Result<WalkResult, WalkError> {
        self.run_watched(root, walks, token, &|_: &WalkDependency| {})
    }

    /// Like [`run`](Self::run), reporting each read to `watch` as soon as
    /// the walk reaches the node, before any reduce runs.
    pub fn run_watched(
        &self,
        root: &NodeId,
        walks: &BTreeMap<String, WalkSpec>,
        token: &CancellationToken,
        watch: &dyn Fn(&WalkDependency),
    ) -> Result<WalkResult, WalkError> {
        let mut result = WalkResult::default();

        for (walk_name, spec) in walks {
            let observer = |visit: &Visit| {
                watch(&WalkDependency {
                    walk: walk_name.clone(),
                    direction: spec.direction,
                    node: visit.node.clone(),
                    label: visit.label.clone(),
                })
            };
            let walker = Walker::new(&self.graph, self.documents.as_ref(), self.max_depth)
                .with_observer(&observer);
            let outcome = walker.walk(root, spec.direction, spec.needs_nested(), token)?;
            debug!(
                node = %root,
                walk = %walk_name,
                direction = %spec.direction,
                nodes = outcome.stats.nodes,
                "walk complete"
            );

            for (property, reduce) in &spec.properties {
                let view = if reduce.nested {
                    outcome.tree.root()
                } else {
                    outcome.tree.limited(1)
                };
                match (reduce.reduce)(&view) {
                    Ok(value) => {
                        result.properties.insert(property.clone(), value);
                    }
                    Err(error) => {
                        warn!(
                            node = %root,
                            walk = %walk_name,
                            property = %property,
                            error = %error,
                            "reduce failed, property omitted"
                        );
                        result.failures.push(ReduceFailure {
                            walk: walk_name.clone(),
                            property: property.clone(),
                            error,
                        });
                    }
                }
            }

            result.stats += outcome.stats;
            result
                .dependencies
                .extend(outcome.visits.into_iter().map(|visit| WalkDependency {
                    walk: walk_name.clone(),
                    direction: spec.direction,
                    node: visit.node,
                    label: visit.label,
                }));
        }

        Ok(result)
    }
}
