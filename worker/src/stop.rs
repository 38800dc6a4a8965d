//! Cooperative stop signal.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A shared, set-once stop request.
///
/// Workers check the flag at their own checkpoints; setting it never
/// interrupts a call that is already blocked.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    /// Creates a flag that has not been raised.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a stop. Raising the flag twice has no further effect.
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Returns true once [`stop`](StopFlag::stop) has been called on any clone.
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
