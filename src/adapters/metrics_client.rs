//! HTTP client for the metrics backend's Prometheus-style instant-query API.
//! Per-query failures are swallowed into `None` by the caller (the Metrics
//! Correlator) rather than aborting sibling queries.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

use crate::error::{classify_reqwest_error, AppError, Result};

#[derive(Clone)]
pub struct MetricsBackendClient {
    client: Client,
    base_url: String,
}

impl MetricsBackendClient {
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// `GET /api/v1/query?query={expr}&time={unix-seconds}`. Returns `None`
    /// on any failure (connection, non-2xx, empty result vector) rather than
    /// propagating — callers treat a missing metric as "unknown", not fatal.
    pub async fn query_instant(&self, expr: &str, unix_seconds: i64) -> Option<f64> {
        let url = format!("{}/api/v1/query", self.base_url);
        let response = match self
            .client
            .get(&url)
            .query(&[("query", expr), ("time", &unix_seconds.to_string())])
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %classify_reqwest_error(e), query = expr, "metrics query failed");
                return None;
            }
        };

        if !response.status().is_success() {
            return None;
        }

        let envelope: QueryEnvelope = response.json().await.ok()?;
        if envelope.status != "success" {
            return None;
        }

        envelope
            .data
            .result
            .into_iter()
            .next()
            .and_then(|r| r.value.1.parse::<f64>().ok())
    }

    pub async fn health_check(&self) -> bool {
        let url = format!("{}/-/healthy", self.base_url);
        matches!(self.client.get(&url).send().await, Ok(r) if r.status().is_success())
    }
}

#[derive(Debug, Deserialize)]
struct QueryEnvelope {
    status: String,
    data: QueryData,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    result: Vec<QueryResult>,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    value: (f64, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_construction_succeeds() {
        assert!(MetricsBackendClient::new("http://localhost:9090", 5).is_ok());
    }

    #[test]
    fn query_envelope_parses_prometheus_shape() {
        let json = serde_json::json!({
            "status": "success",
            "data": {
                "resultType": "vector",
                "result": [{"metric": {}, "value": [1700000000.0, "42.5"]}]
            }
        });
        let envelope: QueryEnvelope = serde_json::from_value(json).unwrap();
        assert_eq!(envelope.status, "success");
        assert_eq!(envelope.data.result[0].value.1, "42.5");
    }
}
