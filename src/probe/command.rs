//! Subprocess probe.
//!
//! Runs an external reachability utility per endpoint and parses its report.

use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::time::timeout;

use super::output::{CommandOutput, OutputFormat};
use super::traits::{DEFAULT_PROBE_TIMEOUT, Probe, ProbeError, ProbeOutcome};
use crate::watch::Address;

/// Placeholder replaced by the endpoint host in argument templates.
pub const HOST_PLACEHOLDER: &str = "{host}";

/// Placeholder replaced by the endpoint port in argument templates.
pub const PORT_PLACEHOLDER: &str = "{port}";

fn default_program() -> String {
    "nmap".to_string()
}

fn default_args() -> Vec<String> {
    vec!["-p".to_string(), PORT_PLACEHOLDER.to_string(), HOST_PLACEHOLDER.to_string()]
}

fn default_timeout() -> Duration {
    DEFAULT_PROBE_TIMEOUT
}

/// Configuration for the subprocess probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandProbeConfig {
    /// Executable to run (default: "nmap").
    #[serde(default = "default_program")]
    pub program: String,
    /// Argument templates with `{host}` / `{port}` placeholders.
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    /// How to read the utility's result (default: nmap).
    #[serde(default)]
    pub format: OutputFormat,
    /// Per-invocation bound (default: 500ms).
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for CommandProbeConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            format: OutputFormat::default(),
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

impl CommandProbeConfig {
    /// Create a configuration for an arbitrary utility.
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Set the output format.
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the probe timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Render the argument list for one endpoint.
    pub fn render_args(&self, address: &Address) -> Vec<String> {
        let port = address.port().to_string();
        self.args
            .iter()
            .map(|arg| {
                arg.replace(HOST_PLACEHOLDER, address.host())
                    .replace(PORT_PLACEHOLDER, &port)
            })
            .collect()
    }
}

/// Probe that shells out to an external utility.
///
/// The child is spawned with `kill_on_drop`, so a timeout, a cancelled watch
/// loop or a runtime shutdown all terminate it.
pub struct CommandProbe {
    config: CommandProbeConfig,
}

impl CommandProbe {
    /// Create a new subprocess probe.
    pub fn new(config: CommandProbeConfig) -> Self {
        Self { config }
    }

    /// Get the probe configuration.
    pub fn config(&self) -> &CommandProbeConfig {
        &self.config
    }

    fn command_for(&self, address: &Address) -> Command {
        let mut command = Command::new(&self.config.program);
        command
            .args(self.config.render_args(address))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

impl std::fmt::Debug for CommandProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandProbe")
            .field("program", &self.config.program)
            .field("format", &self.config.format)
            .field("timeout", &self.config.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Probe for CommandProbe {
    fn kind(&self) -> &str {
        "command"
    }

    fn timeout(&self) -> Duration {
        self.config.timeout
    }

    async fn probe(&self, address: &Address) -> Result<ProbeOutcome, ProbeError> {
        let probe_timeout = self.config.timeout;

        let start = Instant::now();
        let child = self
            .command_for(address)
            .spawn()
            .map_err(|source| ProbeError::Spawn {
                program: self.config.program.clone(),
                source,
            })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match timeout(probe_timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => return Err(ProbeError::Timeout(probe_timeout)),
        };

        let output = CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            elapsed: start.elapsed(),
        };
        tracing::trace!(
            host = %address.host(),
            port = address.port(),
            status = ?output.status,
            elapsed_ms = output.elapsed.as_millis(),
            "Probe command finished"
        );

        self.config.format.parse(address.port(), &output)
    }
}
