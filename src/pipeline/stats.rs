//! Engine counters and dead letters

use crate::graph::NodeId;
use crate::walk::WalkStats;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// An event that exhausted its retries and needs manual intervention.
#[derive(Debug, Clone, Serialize)]
pub struct DeadLetter {
    pub id: NodeId,
    pub job: &'static str,
    pub attempts: u32,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

macro_rules! counters {
    ($($name:ident),* $(,)?) => {
        /// Live counters, updated by the workers.
        #[derive(Debug, Default)]
        pub struct EngineStats {
            $(pub(crate) $name: AtomicU64,)*
        }

        /// Point-in-time copy of [`EngineStats`]
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
        pub struct StatsSnapshot {
            $(pub $name: u64,)*
        }

        impl EngineStats {
            pub fn snapshot(&self) -> StatsSnapshot {
                StatsSnapshot {
                    $($name: self.$name.load(Ordering::Relaxed),)*
                }
            }
        }
    };
}

counters!(
    submitted,
    processed,
    recomputed,
    deleted,
    superseded,
    cancelled,
    written,
    retracted,
    stale_writes,
    retries,
    dead_lettered,
    rule_failures,
    reduce_failures,
    waves,
    propagation_truncated,
    walk_nodes,
    dangling,
    cycles_truncated,
    depth_truncated,
);

impl EngineStats {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_walk(&self, walk: &WalkStats) {
        Self::add(&self.walk_nodes, walk.nodes);
        Self::add(&self.dangling, walk.dangling);
        Self::add(&self.cycles_truncated, walk.cycles_truncated);
        Self::add(&self.depth_truncated, walk.depth_truncated);
    }
}
