//! Watch Layer
//!
//! Periodic availability tracking for remote endpoints such as streaming
//! servers.
//!
//! # Architecture
//!
//! - [`WatchContext`]: process-wide scheduling resource (worker pool plus a
//!   bounded number of watch loops), created by [`WatchContext::setup`] and
//!   torn down by [`WatchContext::shutdown`]
//! - [`RemoteWatcher`]: registry of endpoints and the recurring watch loop
//! - [`RemoteElement`]: last-known state of one endpoint
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use relaywatch::probe::{CommandProbe, CommandProbeConfig};
//! use relaywatch::watch::{Address, ContextSettings, RemoteWatcher, WatchContext};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let context = WatchContext::setup(ContextSettings::default())?;
//! let probe = Arc::new(CommandProbe::new(CommandProbeConfig::default()));
//! let watcher = RemoteWatcher::new(&context, probe);
//!
//! let element = watcher.add_watcher(Address::new("127.0.0.1", 8000));
//! watcher.start()?;
//! // ... later, from any thread
//! let state = element.get_state();
//! println!("available: {}", state.available);
//!
//! watcher.stop();
//! context.shutdown();
//! # Ok(())
//! # }
//! ```

mod address;
mod context;
mod element;
mod error;
mod watcher;

pub use address::{Address, AddressParseError};
pub use context::{
    ContextSettings, DEFAULT_CAPACITY, DEFAULT_MAX_CONCURRENT_PROBES, DEFAULT_SHUTDOWN_TIMEOUT,
    DEFAULT_WORKERS, WatchContext,
};
pub use element::{ElementState, HOSTNAME_LOOKUP_TIMEOUT, RemoteElement};
pub use error::WatchError;
pub use watcher::{DEFAULT_INTERVAL, MIN_INTERVAL, RemoteWatcher};
