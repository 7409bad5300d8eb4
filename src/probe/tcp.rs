//! TCP connect probe.
//!
//! Measures TCP connection latency to the endpoint without any external tool.

use std::io::ErrorKind;
use std::time::{Duration, Instant};

use tokio::net::TcpStream;
use tokio::time::timeout;

use super::traits::{DEFAULT_PROBE_TIMEOUT, Probe, ProbeError, ProbeOutcome, duration_ms};
use crate::watch::Address;

/// In-process TCP connect probe.
///
/// - connected: host running, port open, latency = connect time
/// - connection refused: host running, port closed
/// - host or network unreachable: host down
/// - anything else (DNS failure, timeout): indeterminate
#[derive(Debug, Clone)]
pub struct TcpProbe {
    conn_timeout: Duration,
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}

impl TcpProbe {
    /// Create a TCP probe with the given connection timeout.
    pub fn new(conn_timeout: Duration) -> Self {
        Self { conn_timeout }
    }
}

#[async_trait::async_trait]
impl Probe for TcpProbe {
    fn kind(&self) -> &str {
        "tcp"
    }

    fn timeout(&self) -> Duration {
        self.conn_timeout
    }

    async fn probe(&self, address: &Address) -> Result<ProbeOutcome, ProbeError> {
        let target = address.to_string();

        let start = Instant::now();
        let result = timeout(self.conn_timeout, TcpStream::connect(&target)).await;
        let elapsed = start.elapsed();

        match result {
            Ok(Ok(_stream)) => {
                tracing::trace!(target = %target, latency_ms = elapsed.as_millis(), "TCP probe connected");
                Ok(ProbeOutcome::reachable(duration_ms(elapsed)))
            }
            Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => Ok(ProbeOutcome::port_closed()),
            Ok(Err(e))
                if matches!(
                    e.kind(),
                    ErrorKind::HostUnreachable | ErrorKind::NetworkUnreachable
                ) =>
            {
                Ok(ProbeOutcome::host_down())
            }
            Ok(Err(e)) => Err(ProbeError::Io(e)),
            Err(_) => Err(ProbeError::Timeout(self.conn_timeout)),
        }
    }
}
