//! Cooperative cancellation for a settlement attempt.
//!
//! Cancellation is only honoured before leg 1 is submitted. Once a leg is
//! in flight the attempt runs to commit or abort.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// Shared flag a caller flips to cancel a pending attempt.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
