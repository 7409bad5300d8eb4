//! Configuration module for relaywatch.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Watch settings (tick interval, probe timeout, worker pool sizing)
//! - Probe strategy (external utility or TCP connect)
//! - Endpoints to watch, inline or from an include directory

mod app;
mod endpoints;
mod validation;

pub use app::{AppConfig, ProbeKind, ProbeSettings, WatchSettings};
pub use endpoints::{EndpointConfig, EndpointsConfig};
pub use validation::{ConfigError, expand_env_vars, parse_duration};
