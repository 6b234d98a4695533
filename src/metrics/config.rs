//! Configuration for the Prometheus metrics exporter.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Port for a standalone metrics server, if separate from the Control Surface.
    pub metrics_port: Option<u16>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            endpoint: default_endpoint(),
            metrics_port: None,
        }
    }
}

impl MetricsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled() -> Self {
        Self { enabled: true, ..Default::default() }
    }

    pub fn disabled() -> Self {
        Self { enabled: false, ..Default::default() }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_metrics_port(mut self, port: u16) -> Self {
        self.metrics_port = Some(port);
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.endpoint.starts_with('/') {
            return Err("endpoint must start with '/'".to_string());
        }
        Ok(())
    }
}

fn default_enabled() -> bool {
    true
}

fn default_endpoint() -> String {
    "/metrics".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MetricsConfig::default();
        assert!(config.enabled);
        assert_eq!(config.endpoint, "/metrics");
    }

    #[test]
    fn test_config_builder() {
        let config = MetricsConfig::new().with_endpoint("/custom-metrics").with_metrics_port(9090);
        assert_eq!(config.endpoint, "/custom-metrics");
        assert_eq!(config.metrics_port, Some(9090));
    }

    #[test]
    fn test_validation() {
        assert!(MetricsConfig::default().validate().is_ok());
        let invalid = MetricsConfig { endpoint: "metrics".to_string(), ..Default::default() };
        assert!(invalid.validate().is_err());
    }
}
