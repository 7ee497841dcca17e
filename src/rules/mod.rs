//! Rules: per-type descriptors driving extraction, filtering, transformation
//! and walks

mod declarative;
mod descriptor;
mod registry;
pub mod resolve;
mod watch;

pub use declarative::{load_rules, parse_rules, RuleFile};
pub use descriptor::{
    ExtractFn, FilterFn, ReduceFn, ReduceSpec, RuleDescriptor, RuleError, RuleStage, TransformFn, WalkSpec,
};
pub use registry::RuleRegistry;
pub use watch::RuleFileWatcher;
