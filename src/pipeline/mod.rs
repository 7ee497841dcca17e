//! Pipeline: change events in, target documents out
//!
//! A change runs extract → filter/transform → commit → propagate → walk →
//! write as one unit of work. Recomputes triggered by propagation skip the
//! extraction and commit steps.

mod change;
mod engine;
mod error;
mod sink;
mod stats;

pub use change::{ChangeEvent, ChangeKind, ChangeRecord};
pub use engine::{DegraphEngine, EngineBuilder, ReloadReport};
pub use error::EngineError;
pub use sink::{IndexSink, MemoryIndexSink, SinkError};
pub use stats::{DeadLetter, EngineStats, StatsSnapshot};
