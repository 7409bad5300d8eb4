//! Per-endpoint availability state.

use std::io;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::OnceCell;

use crate::probe::{LATENCY_UNKNOWN, Probe, ProbeError, UnknownReason};

use super::Address;

/// Bound on the reverse lookup behind [`RemoteElement::hostname`].
pub const HOSTNAME_LOOKUP_TIMEOUT: Duration = Duration::from_secs(2);

/// Immutable snapshot of an element's last completed probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ElementState {
    /// `host_running && port_open` on the last determinate probe.
    pub available: bool,
    /// When the current downtime window began, `None` while available or never seen down.
    pub unavailable_since: Option<DateTime<Utc>>,
    /// The last probe could not tell whether the endpoint is up.
    pub unknown_state: bool,
    /// Why the last probe was indeterminate; `Some` iff `unknown_state`.
    pub unknown_reason: Option<UnknownReason>,
    pub host_running: bool,
    pub port_open: bool,
    /// Round trip in milliseconds, `-1` when not measured.
    pub latency: i64,
}

impl Default for ElementState {
    fn default() -> Self {
        Self {
            available: false,
            unavailable_since: None,
            unknown_state: false,
            unknown_reason: None,
            host_running: false,
            port_open: false,
            latency: LATENCY_UNKNOWN,
        }
    }
}

enum Transition {
    WentDown,
    CameBack { down_since: DateTime<Utc> },
}

/// A remote endpoint that can be watched.
///
/// All state lives behind one lock and every probe result replaces it as a
/// whole, so readers never see half of an update.
pub struct RemoteElement {
    address: Address,
    probe: Arc<dyn Probe>,
    state: RwLock<ElementState>,
    hostname: OnceCell<String>,
}

impl RemoteElement {
    /// Create a never-probed element.
    pub fn new(address: Address, probe: Arc<dyn Probe>) -> Self {
        Self {
            address,
            probe,
            state: RwLock::new(ElementState::default()),
            hostname: OnceCell::new(),
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn host(&self) -> &str {
        self.address.host()
    }

    pub fn port(&self) -> u16 {
        self.address.port()
    }

    /// Host name of the endpoint from reverse DNS, for display.
    ///
    /// The lookup runs off the async workers and is bounded by
    /// [`HOSTNAME_LOOKUP_TIMEOUT`]. A resolved name is cached; on failure the
    /// literal host is returned and the next call tries again.
    pub async fn hostname(&self) -> String {
        let lookup = self
            .hostname
            .get_or_try_init(|| async {
                tokio::time::timeout(HOSTNAME_LOOKUP_TIMEOUT, reverse_lookup(self.host()))
                    .await
                    .unwrap_or_else(|_| {
                        Err(io::Error::new(io::ErrorKind::TimedOut, "reverse lookup timed out"))
                    })
            })
            .await;

        match lookup {
            Ok(name) => name.clone(),
            Err(e) => {
                tracing::debug!(host = %self.host(), error = %e, "Reverse lookup failed");
                self.host().to_string()
            }
        }
    }

    /// Snapshot of the most recently completed probe.
    ///
    /// Never waits on network I/O; safe to call while a probe is in flight.
    pub fn get_state(&self) -> ElementState {
        *self.state.read()
    }

    /// Probe the endpoint once and record the result.
    ///
    /// Indeterminate probes are logged and recorded as unknown state; nothing
    /// is returned to the caller.
    pub async fn ping(&self) {
        match self.probe.probe(&self.address).await {
            Ok(outcome) => {
                tracing::debug!(
                    host = %self.host(),
                    port = self.port(),
                    probe = self.probe.kind(),
                    host_running = outcome.host_running,
                    port_open = outcome.port_open,
                    latency_ms = outcome.latency_ms,
                    "Probe completed"
                );
                self.set_state(outcome.host_running, outcome.port_open, outcome.latency_ms);
            }
            Err(ProbeError::Timeout(limit)) => {
                tracing::debug!(
                    host = %self.host(),
                    port = self.port(),
                    timeout_ms = limit.as_millis(),
                    "Endpoint did not answer the probe in time"
                );
                self.set_unknown(UnknownReason::TimedOut);
            }
            Err(e) => {
                tracing::warn!(
                    host = %self.host(),
                    port = self.port(),
                    probe = self.probe.kind(),
                    error = %e,
                    "Unexpected error during probe"
                );
                self.set_unknown(e.reason());
            }
        }
    }

    /// Record a determinate probe result.
    ///
    /// The downtime window opens on the first observation that is not
    /// available and stays anchored there through repeated failures.
    pub(crate) fn set_state(&self, host_running: bool, port_open: bool, latency: i64) {
        let available = host_running && port_open;
        let now = Utc::now();

        let transition = {
            let mut state = self.state.write();
            let previous = state.unavailable_since;
            let (unavailable_since, transition) = match (available, previous) {
                (true, Some(down_since)) => (None, Some(Transition::CameBack { down_since })),
                (true, None) => (None, None),
                (false, None) => (Some(now), Some(Transition::WentDown)),
                (false, Some(down_since)) => (Some(down_since), None),
            };

            *state = ElementState {
                available,
                unavailable_since,
                unknown_state: false,
                unknown_reason: None,
                host_running,
                port_open,
                latency,
            };
            transition
        };

        match transition {
            Some(Transition::WentDown) => tracing::warn!(
                host = %self.host(),
                port = self.port(),
                host_running,
                port_open,
                "Endpoint is not available"
            ),
            Some(Transition::CameBack { down_since }) => {
                let downtime = (now - down_since).num_milliseconds() as f64 / 1000.0;
                tracing::info!(
                    host = %self.host(),
                    port = self.port(),
                    downtime_secs = downtime,
                    "Endpoint is available again"
                );
            }
            None => {}
        }
    }

    /// Record an indeterminate probe.
    ///
    /// Leaves `unavailable_since` alone: a probe that could not tell is not
    /// evidence of downtime.
    pub(crate) fn set_unknown(&self, reason: UnknownReason) {
        let mut state = self.state.write();
        let unavailable_since = state.unavailable_since;
        *state = ElementState {
            available: false,
            unavailable_since,
            unknown_state: true,
            unknown_reason: Some(reason),
            host_running: false,
            port_open: false,
            latency: LATENCY_UNKNOWN,
        };
    }
}

/// Resolve `host` to an IP if needed, then look up its PTR name.
async fn reverse_lookup(host: &str) -> io::Result<String> {
    let ip = match host.parse::<IpAddr>() {
        Ok(ip) => ip,
        Err(_) => tokio::net::lookup_host((host, 0))
            .await?
            .next()
            .map(|addr| addr.ip())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no addresses found"))?,
    };

    // getnameinfo blocks.
    tokio::task::spawn_blocking(move || dns_lookup::lookup_addr(&ip))
        .await
        .map_err(io::Error::other)?
}

impl std::fmt::Debug for RemoteElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteElement")
            .field("address", &self.address)
            .field("probe", &self.probe.kind())
            .field("state", &self.get_state())
            .finish()
    }
}
