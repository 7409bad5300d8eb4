//! Probe utility output formats.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::traits::{LATENCY_UNKNOWN, ProbeError, ProbeOutcome, duration_ms};

/// How to read the result of a probe subprocess.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    /// Plain `nmap -p <port> <host>` report.
    #[default]
    Nmap,

    /// Exit status only, as with `nc -z`:
    /// `0` reachable, `1` port closed, `2` host down, anything else unknown.
    /// Latency is the wall-clock time of the subprocess.
    ExitCode,
}

/// Captured result of a finished probe subprocess.
#[derive(Debug, Clone)]
pub(crate) struct CommandOutput {
    /// Exit code, `None` when terminated by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl CommandOutput {
    fn status_label(&self) -> String {
        match self.status {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_string(),
        }
    }
}

impl OutputFormat {
    /// Turn captured output into an outcome for `port`.
    pub(crate) fn parse(&self, port: u16, output: &CommandOutput) -> Result<ProbeOutcome, ProbeError> {
        match self {
            Self::Nmap => parse_nmap(port, output),
            Self::ExitCode => parse_exit_code(output),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Nmap => f.write_str("nmap"),
            Self::ExitCode => f.write_str("exit-code"),
        }
    }
}

fn parse_nmap(port: u16, output: &CommandOutput) -> Result<ProbeOutcome, ProbeError> {
    let stderr = output.stderr.trim();
    if output.status != Some(0) || !stderr.is_empty() {
        return Err(ProbeError::Exit {
            status: output.status_label(),
            stderr: stderr.to_string(),
        });
    }

    let port_prefix = format!("{port}/");
    let mut host_running = false;
    let mut port_open = false;
    let mut latency_ms = None;
    let mut finished = false;

    for line in output.stdout.lines().map(str::trim) {
        if let Some(rest) = line.strip_prefix("Host is up") {
            host_running = true;
            latency_ms = parse_nmap_latency(rest);
        } else if line.starts_with(&port_prefix) {
            // "8000/tcp open  irdmi": "open|filtered" is not proof of a listener
            port_open = line.split_whitespace().nth(1) == Some("open");
        } else if line.starts_with("Nmap done:") {
            finished = true;
        }
    }

    if !finished {
        let first = output.stdout.lines().next().unwrap_or_default().trim();
        return Err(ProbeError::Unparseable(if first.is_empty() {
            "empty output".to_string()
        } else {
            format!("missing scan summary after '{first}'")
        }));
    }

    if !(host_running && port_open) {
        return Ok(ProbeOutcome {
            host_running,
            port_open,
            latency_ms: LATENCY_UNKNOWN,
        });
    }

    // "Host is up." without a figure (e.g. `-Pn`): fall back to the scan time.
    Ok(ProbeOutcome::reachable(
        latency_ms.unwrap_or_else(|| duration_ms(output.elapsed)),
    ))
}

/// Parse the tail of `Host is up (0.00042s latency).` into whole milliseconds.
fn parse_nmap_latency(rest: &str) -> Option<i64> {
    let inner = rest.trim().strip_prefix('(')?;
    let (secs, _) = inner.split_once("s latency")?;
    let secs: f64 = secs.trim().parse().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Some((secs * 1000.0).round() as i64)
}

fn parse_exit_code(output: &CommandOutput) -> Result<ProbeOutcome, ProbeError> {
    match output.status {
        Some(0) => Ok(ProbeOutcome::reachable(duration_ms(output.elapsed))),
        Some(1) => Ok(ProbeOutcome::port_closed()),
        Some(2) => Ok(ProbeOutcome::host_down()),
        _ => Err(ProbeError::Exit {
            status: output.status_label(),
            stderr: output.stderr.trim().to_string(),
        }),
    }
}
