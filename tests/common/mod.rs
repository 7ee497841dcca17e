//! Common test utilities for degraph integration tests
//!
//! Media rules written as Rust closures, a sink that fails on demand, and
//! helpers for building documents and starting engines.

#![allow(dead_code, unused_imports)]

pub mod media;
pub mod sinks;

pub use media::{
    group, media_registry, program, program_rule, segment, segment_rule, slow_segment_registry, slow_segment_rule,
    target_of, titled_segment, PROGRAM_TARGET, SEGMENT_TARGET,
};
pub use sinks::FlakySink;

use degraph::{DegraphEngine, EngineConfig, IndexSink, NodeId, RuleRegistry};
use std::sync::Arc;

/// Node id in the shared `poms/poms` source index
pub fn poms(id: &str) -> NodeId {
    NodeId::new("poms", "poms", id)
}

/// Engine config with fast retries for tests
pub fn test_config() -> EngineConfig {
    EngineConfig::default().with_workers(4).with_retries(2, 1)
}

pub fn start(registry: RuleRegistry, sink: Arc<dyn IndexSink>, config: EngineConfig) -> DegraphEngine {
    DegraphEngine::builder(registry)
        .config(config)
        .sink(sink)
        .start()
        .expect("engine should start")
}
