//! Probe Layer
//!
//! One probe answers three questions about an endpoint: is the host up, is the
//! port open, and how long did the round trip take.
//!
//! # Strategies
//!
//! - [`CommandProbe`]: runs an external reachability utility (`nmap` by default)
//!   as a bounded-time subprocess and parses what it prints
//! - [`TcpProbe`]: in-process TCP connect, for hosts without the utility installed
//!
//! Both implement [`Probe`]; the watcher only ever sees the trait object.
//!
//! # Example
//!
//! ```rust,no_run
//! use relaywatch::probe::{CommandProbe, CommandProbeConfig, OutputFormat};
//! use std::time::Duration;
//!
//! let config = CommandProbeConfig::new("nc", ["-z", "{host}", "{port}"])
//!     .with_format(OutputFormat::ExitCode)
//!     .with_timeout(Duration::from_millis(500));
//! let probe = CommandProbe::new(config);
//! ```

mod command;
mod output;
mod tcp;
mod traits;

pub use command::{CommandProbe, CommandProbeConfig};
pub use output::OutputFormat;
pub use tcp::TcpProbe;
pub use traits::{DEFAULT_PROBE_TIMEOUT, LATENCY_UNKNOWN, Probe, ProbeError, ProbeOutcome, UnknownReason};
