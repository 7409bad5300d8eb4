//! Core probe traits and types.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::watch::Address;

/// Default bound on a single probe (500 milliseconds).
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(500);

/// Latency value reported when no round trip was measured.
/// Using -1 to distinguish from a valid 0ms latency.
pub const LATENCY_UNKNOWN: i64 = -1;

/// Errors that keep a probe from producing a determinate result.
///
/// None of these reach the caller of the watcher: the element absorbs them
/// and reports an unknown state instead.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The probe did not finish within its time bound.
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    /// The probe utility could not be launched.
    #[error("failed to launch '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The probe utility ran but reported a failure of its own.
    #[error("probe command failed ({status}): {stderr}")]
    Exit { status: String, stderr: String },

    /// The probe utility output did not match the expected format.
    #[error("unparseable probe output: {0}")]
    Unparseable(String),

    /// Network or pipe I/O error.
    #[error("probe i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProbeError {
    /// Reason code recorded in the element snapshot.
    pub fn reason(&self) -> UnknownReason {
        match self {
            Self::Timeout(_) => UnknownReason::TimedOut,
            _ => UnknownReason::ProbeFailed,
        }
    }
}

/// Why the last probe of an element was indeterminate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownReason {
    /// The probe exceeded its timeout and was killed.
    TimedOut,
    /// The probe could not run or its output made no sense.
    ProbeFailed,
}

impl std::fmt::Display for UnknownReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TimedOut => f.write_str("timed out"),
            Self::ProbeFailed => f.write_str("probe failed"),
        }
    }
}

/// Determinate result of one probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOutcome {
    /// The host answered.
    pub host_running: bool,
    /// The specific port accepted connections.
    pub port_open: bool,
    /// Round trip in milliseconds, [`LATENCY_UNKNOWN`] unless both flags hold.
    pub latency_ms: i64,
}

impl ProbeOutcome {
    /// Host up and port open.
    pub fn reachable(latency_ms: i64) -> Self {
        Self {
            host_running: true,
            port_open: true,
            latency_ms,
        }
    }

    /// Host up but nothing listening on the port.
    pub fn port_closed() -> Self {
        Self {
            host_running: true,
            port_open: false,
            latency_ms: LATENCY_UNKNOWN,
        }
    }

    /// Host did not answer at all.
    pub fn host_down() -> Self {
        Self {
            host_running: false,
            port_open: false,
            latency_ms: LATENCY_UNKNOWN,
        }
    }
}

/// Capability interface for probe strategies.
///
/// # Error Handling Philosophy
///
/// A target that is down is a valid observation and must come back as
/// `Ok(ProbeOutcome)` with the matching flags cleared. `Err` is reserved for
/// cases where the probe itself could not tell (timeout, missing utility,
/// garbage output).
#[async_trait::async_trait]
pub trait Probe: Send + Sync + 'static {
    /// Short strategy name used in logs (e.g., "command", "tcp").
    fn kind(&self) -> &str;

    /// Upper bound on one call to [`Probe::probe`].
    fn timeout(&self) -> Duration;

    /// Probe one endpoint.
    ///
    /// Implementations must enforce [`Probe::timeout`] themselves and release
    /// every resource they acquired (sockets, child processes) on all paths,
    /// including when the returned future is dropped mid-flight.
    async fn probe(&self, address: &Address) -> Result<ProbeOutcome, ProbeError>;
}

/// Whole milliseconds, saturating.
pub(crate) fn duration_ms(elapsed: Duration) -> i64 {
    i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)
}
