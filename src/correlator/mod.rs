//! Metrics Correlator: on-demand snapshot of platform metrics around an
//! anomaly's `(service, timestamp)`, queried independently so one field's
//! failure never drops the others. Grounded on the same outbound-HTTP idiom
//! as the trace/LLM adapters, targeting the metrics backend's
//! Prometheus-style instant-query API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::adapters::MetricsBackendClient;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CorrelationMetrics {
    pub cpu_percent: Option<f64>,
    pub memory_mb: Option<f64>,
    pub request_rate: Option<f64>,
    pub error_rate_percent: Option<f64>,
    pub p99_latency_ms: Option<f64>,
    pub active_connections: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationResult {
    pub metrics: CorrelationMetrics,
    pub insights: Vec<String>,
    pub healthy: bool,
}

pub struct MetricsCorrelator {
    client: MetricsBackendClient,
}

impl MetricsCorrelator {
    pub fn new(client: MetricsBackendClient) -> Self {
        Self { client }
    }

    /// Fetch all six fields concurrently via independent instant queries at
    /// `timestamp`; any field the backend can't answer comes back `None`.
    pub async fn correlate(&self, service: &str, timestamp: DateTime<Utc>) -> CorrelationResult {
        let at = timestamp.timestamp();

        let (cpu_percent, memory_mb, request_rate, error_rate_percent, p99_latency_ms, active_connections) = futures::join!(
            self.client.query_instant(&cpu_query(service), at),
            self.client.query_instant(&memory_query(service), at),
            self.client.query_instant(&request_rate_query(service), at),
            self.client.query_instant(&error_rate_query(service), at),
            self.client.query_instant(&p99_latency_query(service), at),
            self.client.query_instant(&active_connections_query(service), at),
        );

        let metrics = CorrelationMetrics {
            cpu_percent,
            memory_mb,
            request_rate,
            error_rate_percent,
            p99_latency_ms,
            active_connections,
        };

        let insights = derive_insights(&metrics);
        let healthy = insights.is_empty();

        CorrelationResult { metrics, insights, healthy }
    }
}

fn cpu_query(service: &str) -> String {
    format!("avg(cpu_usage_percent{{service=\"{service}\"}})")
}

fn memory_query(service: &str) -> String {
    format!("avg(process_resident_memory_bytes{{service=\"{service}\"}}) / 1048576")
}

fn request_rate_query(service: &str) -> String {
    format!("sum(rate(http_requests_total{{service=\"{service}\"}}[1m]))")
}

fn error_rate_query(service: &str) -> String {
    format!(
        "sum(rate(http_requests_total{{service=\"{service}\",status=~\"5..\"}}[1m])) / sum(rate(http_requests_total{{service=\"{service}\"}}[1m])) * 100"
    )
}

fn p99_latency_query(service: &str) -> String {
    format!(
        "histogram_quantile(0.99, sum(rate(http_request_duration_seconds_bucket{{service=\"{service}\"}}[1m])) by (le)) * 1000"
    )
}

fn active_connections_query(service: &str) -> String {
    format!("sum(active_connections{{service=\"{service}\"}})")
}

/// Rule-threshold insights: CPU >=70/80/90, memory >=512/1024, error rate
/// >=1/5/10, rps >=100, active conns >=100.
fn derive_insights(m: &CorrelationMetrics) -> Vec<String> {
    let mut insights = Vec::new();

    if let Some(cpu) = m.cpu_percent {
        if cpu >= 90.0 {
            insights.push(format!("CPU critically high at {cpu:.1}%"));
        } else if cpu >= 80.0 {
            insights.push(format!("CPU elevated at {cpu:.1}%"));
        } else if cpu >= 70.0 {
            insights.push(format!("CPU above baseline at {cpu:.1}%"));
        }
    }

    if let Some(mem) = m.memory_mb {
        if mem >= 1024.0 {
            insights.push(format!("Memory usage high at {mem:.0} MB"));
        } else if mem >= 512.0 {
            insights.push(format!("Memory usage elevated at {mem:.0} MB"));
        }
    }

    if let Some(err) = m.error_rate_percent {
        if err >= 10.0 {
            insights.push(format!("Error rate critical at {err:.1}%"));
        } else if err >= 5.0 {
            insights.push(format!("Error rate elevated at {err:.1}%"));
        } else if err >= 1.0 {
            insights.push(format!("Error rate above baseline at {err:.1}%"));
        }
    }

    if let Some(rps) = m.request_rate {
        if rps >= 100.0 {
            insights.push(format!("Request rate high at {rps:.1} rps"));
        }
    }

    if let Some(conns) = m.active_connections {
        if conns >= 100.0 {
            insights.push(format!("Active connections high at {conns:.0}"));
        }
    }

    insights
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn prometheus_envelope(value: f64) -> serde_json::Value {
        json!({
            "status": "success",
            "data": {
                "resultType": "vector",
                "result": [{"metric": {}, "value": [1700000000.0, value.to_string()]}]
            }
        })
    }

    #[tokio::test]
    async fn all_fields_populate_and_breach_thresholds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(prometheus_envelope(95.0)))
            .mount(&server)
            .await;

        let client = MetricsBackendClient::new(server.uri(), 5).unwrap();
        let correlator = MetricsCorrelator::new(client);
        let result = correlator.correlate("payment-service", Utc::now()).await;

        assert_eq!(result.metrics.cpu_percent, Some(95.0));
        assert_eq!(result.metrics.active_connections, Some(95.0));
        assert!(!result.healthy);
        assert!(result.insights.iter().any(|i| i.contains("CPU critically high")));
    }

    #[tokio::test]
    async fn unreachable_backend_yields_all_none_and_healthy() {
        let client = MetricsBackendClient::new("http://127.0.0.1:1", 1).unwrap();
        let correlator = MetricsCorrelator::new(client);
        let result = correlator.correlate("payment-service", Utc::now()).await;

        assert_eq!(result.metrics, CorrelationMetrics::default());
        assert!(result.insights.is_empty());
        assert!(result.healthy);
    }

    #[test]
    fn insight_thresholds_are_ordered_highest_message_first() {
        let metrics = CorrelationMetrics {
            cpu_percent: Some(72.0),
            memory_mb: Some(600.0),
            request_rate: Some(50.0),
            error_rate_percent: Some(2.0),
            p99_latency_ms: None,
            active_connections: None,
        };
        let insights = derive_insights(&metrics);
        assert!(insights.iter().any(|i| i.contains("CPU above baseline")));
        assert!(insights.iter().any(|i| i.contains("Memory usage elevated")));
        assert!(insights.iter().any(|i| i.contains("Error rate above baseline")));
    }
}
