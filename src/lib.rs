//! Degraph: graph-walk-and-reduce denormalization engine
//!
//! Source documents reference each other. Degraph keeps a property graph of
//! those references and turns every source document into flat, search-ready
//! target documents carrying fields pulled from related documents.
//!
//! # Core Concepts
//!
//! - **Rules**: per `(index, type)` descriptors with a filter, an extractor,
//!   a transform and named walks
//! - **Graph**: nodes per document, labeled edges owned by the extraction
//!   that declared them
//! - **Walks**: depth-first traversals in one direction, reduced into
//!   target document properties
//! - **Propagation**: when a document changes, every target document whose
//!   walks read it is recomputed
//!
//! # Example
//!
//! ```no_run
//! use degraph::{parse_rules, DegraphEngine, MemoryIndexSink, NodeId};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = parse_rules(&std::fs::read_to_string("conf/media.rules.yaml")?)?;
//! let sink = Arc::new(MemoryIndexSink::new());
//! let engine = DegraphEngine::builder(registry).sink(sink.clone()).start()?;
//!
//! engine.upsert(NodeId::new("poms", "poms", "p1"), json!({"urn": "p1"}))?;
//! engine.drain().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod document;
pub mod extract;
pub mod graph;
pub mod pipeline;
pub mod propagate;
pub mod rules;
pub mod walk;

pub use config::{ConfigError, EngineConfig, SinkConfig};
pub use document::{Document, DocumentSource, DocumentStore};
pub use extract::{extract_subgraph, SubgraphBuilder};
pub use graph::{Direction, Edge, EdgeSpec, GraphError, GraphEvent, GraphStore, NodeId, Properties, Subgraph, TypeKey};
pub use pipeline::{
    ChangeEvent, ChangeKind, ChangeRecord, DeadLetter, DegraphEngine, EngineBuilder, EngineError, IndexSink,
    MemoryIndexSink, ReloadReport, SinkError, StatsSnapshot,
};
pub use propagate::{DependencyIndex, PropagationPlan, Propagator};
pub use rules::{
    load_rules, parse_rules, ReduceSpec, RuleDescriptor, RuleError, RuleFileWatcher, RuleRegistry, RuleStage, WalkSpec,
};
pub use walk::{CancellationToken, DocTree, TreeView, WalkEngine, WalkError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
