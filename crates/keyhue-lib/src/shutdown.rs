//! Idempotent shutdown latch.
//!
//! Every cancellation entry point (signal handler, console handler, drop)
//! funnels through one [`ShutdownGuard`]; the compare-exchange makes sure
//! teardown logic downstream of [`ShutdownGuard::request`] runs exactly once
//! no matter how many triggers fire concurrently.

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct ShutdownGuard {
    requested: AtomicBool,
}

impl ShutdownGuard {
    pub const fn new() -> Self {
        ShutdownGuard {
            requested: AtomicBool::new(false),
        }
    }

    /// Latch the shutdown request. Returns `true` for the single caller that
    /// won the race and should perform teardown.
    pub fn request(&self) -> bool {
        self.requested
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}
