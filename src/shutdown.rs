//! Cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

/// Returned by [`ShutdownNotifier::check`] once a shutdown was requested.
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
#[error("Shutdown requested")]
pub struct Interrupted;

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct ShutdownNotifier {
    flag: Arc<AtomicBool>,
}

impl ShutdownNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn should_shutdown(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<(), Interrupted> {
        if self.should_shutdown() {
            Err(Interrupted)
        } else {
            Ok(())
        }
    }
}
