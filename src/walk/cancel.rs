//! Cooperative cancellation for superseded work
//!
//! When a newer change arrives for a document id, the engine cancels the
//! token of the run still in flight. Walks check the token at every node
//! boundary; a cancelled run never reaches the index sink.

use super::WalkError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A shared, one-way cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Signal cancellation to every clone of this token.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// `Err(WalkError::Cancelled)` once cancellation has been requested.
    pub fn check(&self) -> Result<(), WalkError> {
        if self.is_cancelled() {
            Err(WalkError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_starts_uncancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.check().is_ok());
    }

    #[test]
    fn cancelling_a_clone_cancels_the_original() {
        let token = CancellationToken::new();
        let superseded = token.clone();
        superseded.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(WalkError::Cancelled)));
    }
}
