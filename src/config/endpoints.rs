//! Endpoint list configuration.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::watch::Address;

use super::validation::{ConfigError, expand_env_vars};

/// One endpoint to watch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Host name or IP literal.
    pub host: String,
    /// Port of the streaming service.
    pub port: u16,
    /// Human-readable description.
    #[serde(default)]
    pub description: Option<String>,
}

impl EndpointConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            description: None,
        }
    }

    /// Registry key of this endpoint.
    pub fn address(&self) -> Address {
        Address::new(self.host.clone(), self.port)
    }
}

/// A list of endpoints, as found inline or in an include file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointsConfig {
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
}

impl EndpointsConfig {
    /// Append another list to this one.
    #[must_use]
    pub fn merge(mut self, other: EndpointsConfig) -> Self {
        self.endpoints.extend(other.endpoints);
        self
    }

    /// Validate every endpoint.
    ///
    /// Duplicates are allowed (registration is idempotent) and only logged.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();

        for endpoint in &self.endpoints {
            if endpoint.host.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "endpoint host cannot be empty".to_string(),
                ));
            }
            if endpoint.port == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "endpoint '{}': port must be non-zero",
                    endpoint.host
                )));
            }
            if !seen.insert(endpoint.address()) {
                tracing::warn!(
                    host = %endpoint.host,
                    port = endpoint.port,
                    "Duplicate endpoint in configuration, it will be watched once"
                );
            }
        }

        Ok(())
    }

    /// Distinct addresses in first-seen order.
    pub fn addresses(&self) -> Vec<Address> {
        let mut seen = HashSet::new();
        self.endpoints
            .iter()
            .map(EndpointConfig::address)
            .filter(|address| seen.insert(address.clone()))
            .collect()
    }

    /// Load endpoint lists from all YAML files in a directory.
    pub fn load_from_dir(dir_path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let dir = dir_path.as_ref();
        if !dir.is_dir() {
            return Err(ConfigError::ValidationError(format!(
                "endpoint_path '{}' is not a directory",
                dir.display()
            )));
        }

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let is_yaml = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("yaml" | "yml")
            );
            if path.is_file() && is_yaml {
                paths.push(path);
            }
        }
        // Directory order is unspecified; keep loading deterministic.
        paths.sort();

        let mut merged = Self::default();
        for path in paths {
            tracing::debug!(path = %path.display(), "Loading endpoint list");
            let content = expand_env_vars(&std::fs::read_to_string(&path)?);
            let file_config: Self = serde_yaml::from_str(&content).map_err(|e| {
                ConfigError::ValidationError(format!("failed to parse '{}': {}", path.display(), e))
            })?;
            merged = merged.merge(file_config);
        }

        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints_merge_and_dedupe() {
        let first = EndpointsConfig {
            endpoints: vec![EndpointConfig::new("10.0.0.1", 8000)],
        };
        let second = EndpointsConfig {
            endpoints: vec![
                EndpointConfig::new("10.0.0.2", 8000),
                EndpointConfig::new("10.0.0.1", 8000),
            ],
        };

        let merged = first.merge(second);
        assert_eq!(merged.endpoints.len(), 3);
        assert!(merged.validate().is_ok());
        assert_eq!(
            merged.addresses(),
            vec![Address::new("10.0.0.1", 8000), Address::new("10.0.0.2", 8000)]
        );
    }

    #[test]
    fn test_endpoints_validate_zero_port() {
        let config = EndpointsConfig {
            endpoints: vec![EndpointConfig::new("10.0.0.1", 0)],
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("port must be non-zero"));
    }

    #[test]
    fn test_endpoints_validate_empty_host() {
        let config = EndpointsConfig {
            endpoints: vec![EndpointConfig::new(" ", 8000)],
        };
        assert!(config.validate().unwrap_err().to_string().contains("cannot be empty"));
    }

    #[test]
    fn test_endpoint_serde() {
        let yaml = r#"
endpoints:
  - host: icecast.example.org
    port: 8000
    description: Main mount
  - host: "::1"
    port: 8080
"#;
        let config: EndpointsConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.endpoints.len(), 2);
        assert_eq!(config.endpoints[0].description.as_deref(), Some("Main mount"));
        assert_eq!(config.endpoints[1].address(), Address::new("::1", 8080));
    }

    #[test]
    fn test_load_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("a.yaml"),
            "endpoints:\n  - host: 10.0.0.1\n    port: 8000\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("b.yml"),
            "endpoints:\n  - host: 10.0.0.2\n    port: 8000\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not yaml").unwrap();

        let config = EndpointsConfig::load_from_dir(dir.path()).unwrap();
        assert_eq!(
            config.addresses(),
            vec![Address::new("10.0.0.1", 8000), Address::new("10.0.0.2", 8000)]
        );
    }

    #[test]
    fn test_load_from_missing_dir() {
        let err = EndpointsConfig::load_from_dir("/nonexistent/relaywatch").unwrap_err();
        assert!(err.to_string().contains("is not a directory"));
    }
}
