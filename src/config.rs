use serde::{Deserialize, Serialize};

/// Top-level application configuration, loaded from a bundled default,
/// an optional file override, and environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub backends: BackendsConfig,
    pub detection: DetectionConfig,
    pub cadences: CadenceConfig,
    pub analyzer: AnalyzerConfig,
    pub observability: ObservabilityConfig,
    pub state: StateConfig,
}

impl Config {
    /// Layered load: embedded `config/default.toml` -> optional file at
    /// `$CONFIG_PATH` -> environment variables prefixed `TRACEWATCH__`.
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/default.toml".to_string());

        config::Config::builder()
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            .add_source(config::File::with_name(&config_path).required(false))
            .add_source(
                config::Environment::with_prefix("TRACEWATCH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendsConfig {
    pub trace_backend_url: String,
    pub metrics_backend_url: String,
    pub llm_url: String,
    #[serde(default = "default_llm_model")]
    pub llm_model: String,
    #[serde(default = "default_backend_timeout")]
    pub backend_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Ordered list of monitored services; treated as pure configuration,
    /// never hardcoded or inferred from trace data.
    pub monitored_services: Vec<String>,

    #[serde(default)]
    pub enable_amount_anomaly_detection: bool,

    /// Open question resolved: the two historical MIN_SAMPLES constants
    /// (10 and 500) collapse to this single configurable effective value.
    #[serde(default = "default_min_samples_for_latency")]
    pub min_samples_for_latency: u64,

    #[serde(default = "default_min_samples_for_amounts")]
    pub min_samples_for_amounts: u64,

    #[serde(default = "default_min_samples_for_thresholds")]
    pub min_samples_for_thresholds: u64,

    #[serde(default = "default_latency_anomaly_retention_secs")]
    pub latency_anomaly_retention_secs: u64,

    #[serde(default = "default_amount_anomaly_retention_secs")]
    pub amount_anomaly_retention_secs: u64,

    #[serde(default = "default_hot_window_days")]
    pub hot_window_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CadenceConfig {
    #[serde(default = "default_profiler_interval_secs")]
    pub profiler_interval_secs: u64,
    #[serde(default = "default_detector_interval_secs")]
    pub detector_interval_secs: u64,
    #[serde(default = "default_amount_profiler_interval_secs")]
    pub amount_profiler_interval_secs: u64,
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    #[serde(default = "default_analyzer_queue_size")]
    pub queue_size: usize,
    #[serde(default = "default_analyzer_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_analyzer_batch_timeout_secs")]
    pub batch_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub json_logs: bool,
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default)]
    pub backend: StateBackend,
    pub path: Option<std::path::PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StateBackend {
    #[default]
    Sled,
    InMemory,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_request_timeout() -> u64 {
    30
}
fn default_llm_model() -> String {
    "llama3".to_string()
}
fn default_backend_timeout() -> u64 {
    30
}
fn default_min_samples_for_latency() -> u64 {
    500
}
fn default_min_samples_for_amounts() -> u64 {
    20
}
fn default_min_samples_for_thresholds() -> u64 {
    10
}
fn default_latency_anomaly_retention_secs() -> u64 {
    300
}
fn default_amount_anomaly_retention_secs() -> u64 {
    900
}
fn default_hot_window_days() -> u32 {
    30
}
fn default_profiler_interval_secs() -> u64 {
    30
}
fn default_detector_interval_secs() -> u64 {
    10
}
fn default_amount_profiler_interval_secs() -> u64 {
    60
}
fn default_heartbeat_interval_secs() -> u64 {
    30
}
fn default_analyzer_queue_size() -> usize {
    100
}
fn default_analyzer_batch_size() -> usize {
    10
}
fn default_analyzer_batch_timeout_secs() -> u64 {
    30
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_service_name() -> String {
    "tracewatch".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        assert_eq!(default_http_port(), 8080);
        assert_eq!(default_min_samples_for_latency(), 500);
        assert_eq!(default_min_samples_for_thresholds(), 10);
        assert_eq!(default_detector_interval_secs(), 10);
    }

    #[test]
    fn test_state_backend_default() {
        assert_eq!(StateBackend::default(), StateBackend::Sled);
    }
}
