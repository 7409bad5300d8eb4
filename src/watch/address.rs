//! Endpoint addresses.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when an endpoint string is not `host:port`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid endpoint address '{input}': {reason}")]
pub struct AddressParseError {
    input: String,
    reason: &'static str,
}

/// Immutable `(host, port)` key of a watched endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address {
    host: String,
    port: u16,
}

impl Address {
    /// Create an address from a host (name or IP literal) and port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl<S: Into<String>> From<(S, u16)> for Address {
    fn from((host, port): (S, u16)) -> Self {
        Self::new(host, port)
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    /// Parse `host:port` or `[v6-host]:port`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fail = |reason| AddressParseError {
            input: s.to_string(),
            reason,
        };

        let (host, port) = s.trim().rsplit_once(':').ok_or_else(|| fail("missing port"))?;
        let host = match host.strip_prefix('[') {
            Some(inner) => inner.strip_suffix(']').ok_or_else(|| fail("unbalanced brackets"))?,
            None if host.contains(':') => return Err(fail("IPv6 hosts must be bracketed")),
            None => host,
        };
        if host.is_empty() {
            return Err(fail("empty host"));
        }
        let port: u16 = port.parse().map_err(|_| fail("port is not a number"))?;
        if port == 0 {
            return Err(fail("port must be non-zero"));
        }

        Ok(Self::new(host, port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_equality_is_host_and_port() {
        assert_eq!(Address::new("::1", 8000), Address::from(("::1", 8000)));
        assert_ne!(Address::new("::1", 8000), Address::new("::1", 8001));
        assert_ne!(Address::new("127.0.0.1", 8000), Address::new("localhost", 8000));
    }

    #[test]
    fn test_address_display() {
        assert_eq!(Address::new("127.0.0.1", 8000).to_string(), "127.0.0.1:8000");
        assert_eq!(Address::new("::1", 8000).to_string(), "[::1]:8000");
    }

    #[test]
    fn test_address_parse() {
        assert_eq!(
            "icecast.example.org:8000".parse::<Address>().unwrap(),
            Address::new("icecast.example.org", 8000)
        );
        assert_eq!("[::1]:8000".parse::<Address>().unwrap(), Address::new("::1", 8000));
    }

    #[test]
    fn test_address_parse_invalid() {
        assert!("localhost".parse::<Address>().is_err());
        assert!(":8000".parse::<Address>().is_err());
        assert!("localhost:http".parse::<Address>().is_err());
        assert!("localhost:0".parse::<Address>().is_err());
        assert!("::1:8000".parse::<Address>().is_err());

        let err = "[::1:8000".parse::<Address>().unwrap_err();
        assert!(err.to_string().contains("unbalanced"));
    }

    #[test]
    fn test_address_yaml() {
        let address: Address = serde_yaml::from_str("host: 10.0.0.5\nport: 8000\n").unwrap();
        assert_eq!(address, Address::new("10.0.0.5", 8000));
    }
}
