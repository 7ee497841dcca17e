//! Index sinks for failure scenarios

use async_trait::async_trait;
use degraph::{Document, IndexSink, MemoryIndexSink, NodeId, SinkError};
use std::sync::atomic::{AtomicU32, Ordering};

/// Fails the first `failures` upserts, then behaves like a memory sink.
pub struct FlakySink {
    pub inner: MemoryIndexSink,
    failures_left: AtomicU32,
    attempts: AtomicU32,
}

impl FlakySink {
    pub fn failing(failures: u32) -> Self {
        Self {
            inner: MemoryIndexSink::new(),
            failures_left: AtomicU32::new(failures),
            attempts: AtomicU32::new(0),
        }
    }

    pub fn always_failing() -> Self {
        Self::failing(u32::MAX)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IndexSink for FlakySink {
    async fn upsert(&self, target: &NodeId, document: Document) -> Result<(), SinkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failed {
            return Err(SinkError::Unavailable("index is down".to_string()));
        }
        self.inner.upsert(target, document).await
    }

    async fn delete(&self, target: &NodeId) -> Result<(), SinkError> {
        self.inner.delete(target).await
    }
}
