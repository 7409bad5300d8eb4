//! Watch-layer error types.
//!
//! Only resource and lifecycle failures live here; probe failures never leave
//! the element that observed them.

use thiserror::Error;

/// Errors that can cross the watcher's public boundary.
#[derive(Debug, Error)]
pub enum WatchError {
    /// Every watch-loop slot of the shared context is taken.
    #[error("watch capacity exhausted ({capacity} watch loops already running)")]
    CapacityExhausted { capacity: usize },

    /// The shared context has been shut down.
    #[error("watch context has been shut down")]
    ContextClosed,

    /// The worker pool could not be created.
    #[error("failed to build watch runtime: {0}")]
    Runtime(#[source] std::io::Error),
}
