//! Application configuration structures.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::probe::{
    CommandProbe, CommandProbeConfig, DEFAULT_PROBE_TIMEOUT, OutputFormat, Probe, TcpProbe,
};
use crate::watch::{
    Address, ContextSettings, DEFAULT_CAPACITY, DEFAULT_INTERVAL, DEFAULT_MAX_CONCURRENT_PROBES,
    DEFAULT_SHUTDOWN_TIMEOUT, DEFAULT_WORKERS,
};

use super::endpoints::EndpointsConfig;
use super::validation::{ConfigError, expand_env_vars};

// =============================================================================
// Watch Settings
// =============================================================================

/// Scheduling settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchSettings {
    /// Duration between two ticks (default: 5s).
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Bound on one probe invocation (default: 500ms).
    #[serde(with = "humantime_serde")]
    pub probe_timeout: Duration,

    /// Worker threads of the shared pool (default: 2).
    pub workers: usize,

    /// Watch loops the shared pool admits (default: 16).
    pub capacity: usize,

    /// Probes in flight at the same time across all watchers (default: 4).
    pub max_concurrent_probes: usize,

    /// Grace period for in-flight probes at shutdown (default: 5s).
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            workers: DEFAULT_WORKERS,
            capacity: DEFAULT_CAPACITY,
            max_concurrent_probes: DEFAULT_MAX_CONCURRENT_PROBES,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

// =============================================================================
// Probe Settings
// =============================================================================

/// Probe strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    /// External utility run as a subprocess.
    #[default]
    Command,
    /// In-process TCP connect.
    Tcp,
}

/// Probe configuration. `program`, `args` and `format` only apply to
/// [`ProbeKind::Command`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSettings {
    pub kind: ProbeKind,
    pub program: String,
    pub args: Vec<String>,
    pub format: OutputFormat,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        let command = CommandProbeConfig::default();
        Self {
            kind: ProbeKind::default(),
            program: command.program,
            args: command.args,
            format: command.format,
        }
    }
}

impl ProbeSettings {
    /// Subprocess probe configuration with the given timeout.
    pub fn command_config(&self, timeout: Duration) -> CommandProbeConfig {
        CommandProbeConfig::new(self.program.clone(), self.args.clone())
            .with_format(self.format)
            .with_timeout(timeout)
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Scheduling settings.
    #[serde(default)]
    pub watch: WatchSettings,

    /// Probe strategy.
    #[serde(default)]
    pub probe: ProbeSettings,

    /// Inline endpoints.
    #[serde(default, flatten)]
    pub endpoints: EndpointsConfig,

    /// Directory with additional endpoint list files.
    #[serde(default)]
    pub endpoint_path: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// `${VAR}` / `${VAR:-default}` references are expanded before parsing.
    /// If `endpoint_path` is set, its YAML files are merged in.
    ///
    /// # Errors
    /// Returns `ConfigError` if a file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let mut config = Self::from_yaml(&content)?;

        if let Some(ref dir) = config.endpoint_path {
            let additional = EndpointsConfig::load_from_dir(dir)?;
            config.endpoints = config.endpoints.merge(additional);
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from YAML text, without validation.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(&expand_env_vars(content))?)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.watch.probe_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "watch probe_timeout must be positive".to_string(),
            ));
        }
        if self.watch.workers == 0 {
            return Err(ConfigError::ValidationError(
                "watch workers must be positive".to_string(),
            ));
        }
        if self.watch.capacity == 0 {
            return Err(ConfigError::ValidationError(
                "watch capacity must be positive".to_string(),
            ));
        }
        if self.watch.max_concurrent_probes == 0 {
            return Err(ConfigError::ValidationError(
                "watch max_concurrent_probes must be positive".to_string(),
            ));
        }
        if self.probe.kind == ProbeKind::Command && self.probe.program.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "probe program cannot be empty".to_string(),
            ));
        }
        if self.watch.probe_timeout >= self.watch.interval {
            tracing::warn!(
                interval = ?self.watch.interval,
                probe_timeout = ?self.watch.probe_timeout,
                "Probe timeout is not shorter than the watch interval; slow ticks will skip the next one"
            );
        }

        self.endpoints.validate()
    }

    /// Sizing of the shared watch context.
    pub fn context_settings(&self) -> ContextSettings {
        ContextSettings::default()
            .with_workers(self.watch.workers)
            .with_capacity(self.watch.capacity)
            .with_max_concurrent_probes(self.watch.max_concurrent_probes)
            .with_shutdown_timeout(self.watch.shutdown_timeout)
    }

    /// Build the configured probe strategy.
    pub fn build_probe(&self) -> Arc<dyn Probe> {
        match self.probe.kind {
            ProbeKind::Command => Arc::new(CommandProbe::new(
                self.probe.command_config(self.watch.probe_timeout),
            )),
            ProbeKind::Tcp => Arc::new(TcpProbe::new(self.watch.probe_timeout)),
        }
    }

    /// Distinct endpoint addresses to register.
    pub fn addresses(&self) -> Vec<Address> {
        self.endpoints.addresses()
    }
}
