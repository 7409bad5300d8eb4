//! Relaywatch - Remote Endpoint Availability Watcher
//!
//! This crate keeps a continuously refreshed view of whether a set of remote
//! endpoints (typically streaming relays) are reachable. It can be embedded as
//! a library, or run as a standalone binary with the `relaywatch` executable.
//!
//! # Architecture
//!
//! - **Watch**: shared worker context, endpoint registry and the periodic watch loop
//! - **Probe**: bounded-time reachability checks (external utility or TCP connect)
//! - **Config**: YAML configuration with environment expansion
//!
//! # Example
//!
//! ```rust,no_run
//! use relaywatch::{Address, AppConfig, RemoteWatcher, WatchContext};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load("configs/relaywatch.yaml")?;
//!     let context = WatchContext::setup(config.context_settings())?;
//!
//!     let watcher = RemoteWatcher::new(&context, config.build_probe())
//!         .with_interval(config.watch.interval);
//!     let relay = watcher.add_watcher(Address::new("relay.example.org", 8000));
//!     watcher.start()?;
//!
//!     if relay.get_state().available {
//!         println!("relay is up");
//!     }
//!
//!     watcher.stop();
//!     context.shutdown();
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod probe;
pub mod watch;

pub use config::{AppConfig, ConfigError};
pub use probe::{CommandProbe, CommandProbeConfig, OutputFormat, Probe, ProbeError, TcpProbe};
pub use watch::{Address, ElementState, RemoteElement, RemoteWatcher, WatchContext, WatchError};
