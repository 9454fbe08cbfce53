//! Cooperative cancellation
//!
//! Long reads and retention check a token between pages or partitions.
//! Cancelling never interrupts a commit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use labcore_core::{LabError, LabResult};

/// Shared cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// New, not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; every clone observes it
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// `Err(Cancelled)` once cancellation was requested
    #[inline]
    pub fn check(&self) -> LabResult<()> {
        if self.is_cancelled() {
            Err(LabError::Cancelled)
        } else {
            Ok(())
        }
    }
}
