//! Online Profiler: keeps a current `SpanBaseline` per `spanKey` by
//! recomputing a sliding-window batch every 30s and replacing the key's
//! baseline wholesale. Grounded on the teacher's
//! `CorrelationEngine::monitor_loop` (tokio `interval` + a cancellation
//! check each tick, spawned once at `start()`).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::adapters::{discard_unmonitored, TraceBackendClient};
use crate::config::{CadenceConfig, DetectionConfig};
use crate::error::Result;
use crate::models::SpanBaseline;
use crate::stats::BatchStats;

const WINDOW_LOOKBACK: &str = "1h";
const FETCH_LIMIT: u32 = 2000;

pub struct OnlineProfiler {
    baselines: DashMap<String, SpanBaseline>,
    trace_client: TraceBackendClient,
    detection: DetectionConfig,
    interval_secs: u64,
}

impl OnlineProfiler {
    pub fn new(trace_client: TraceBackendClient, detection: DetectionConfig, cadence: &CadenceConfig) -> Self {
        Self {
            baselines: DashMap::new(),
            trace_client,
            detection,
            interval_secs: cadence.profiler_interval_secs,
        }
    }

    pub fn get_baseline(&self, service: &str, operation: &str) -> Option<SpanBaseline> {
        self.baselines.get(&format!("{service}:{operation}")).map(|b| b.clone())
    }

    /// All current baselines, sorted by `sampleCount` descending (the
    /// Control Surface's `baselines()` contract).
    pub fn all_baselines(&self) -> Vec<SpanBaseline> {
        let mut result: Vec<SpanBaseline> = self.baselines.iter().map(|e| e.value().clone()).collect();
        result.sort_by(|a, b| b.sample_count.cmp(&a.sample_count));
        result
    }

    /// Fetch one window per monitored service, regroup spans by `spanKey`,
    /// recompute statistics over the batch, and *replace* that key's
    /// baseline. Keys absent from this window retain their prior baseline.
    pub async fn refresh(&self) -> Result<()> {
        let mut durations_by_key: HashMap<String, Vec<f64>> = HashMap::new();

        for service in &self.detection.monitored_services {
            let traces = match self
                .trace_client
                .fetch_recent(service, WINDOW_LOOKBACK, FETCH_LIMIT)
                .await
            {
                Ok(traces) => traces,
                Err(e) if e.is_transient() => {
                    warn!(service, error = %e, "trace fetch failed, skipping this cycle");
                    continue;
                }
                Err(e) => return Err(e),
            };

            for trace in discard_unmonitored(traces, &self.detection.monitored_services) {
                for span in trace.spans {
                    durations_by_key.entry(span.span_key()).or_default().push(span.duration_ms());
                }
            }
        }

        for (key, durations) in durations_by_key {
            if let Some(stats) = BatchStats::from_samples(&durations) {
                self.baselines.insert(key.clone(), SpanBaseline::from_batch(key, stats));
            }
        }

        Ok(())
    }

    pub fn start(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(self.interval_secs));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.refresh().await {
                            error!(error = %e, "online profiler refresh failed");
                        }
                    }
                    _ = cancel.cancelled() => {
                        info!("online profiler stopping");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn detection_config(services: &[&str]) -> DetectionConfig {
        DetectionConfig {
            monitored_services: services.iter().map(|s| s.to_string()).collect(),
            enable_amount_anomaly_detection: false,
            min_samples_for_latency: 500,
            min_samples_for_amounts: 20,
            min_samples_for_thresholds: 10,
            latency_anomaly_retention_secs: 300,
            amount_anomaly_retention_secs: 900,
            hot_window_days: 30,
        }
    }

    fn cadence() -> CadenceConfig {
        CadenceConfig {
            profiler_interval_secs: 30,
            detector_interval_secs: 10,
            amount_profiler_interval_secs: 60,
            heartbeat_interval_secs: 30,
        }
    }

    fn trace_fixture(durations_ms: &[i64]) -> serde_json::Value {
        let spans: Vec<_> = durations_ms
            .iter()
            .enumerate()
            .map(|(i, d)| {
                json!({
                    "spanID": format!("s{i}"),
                    "operationName": "charge",
                    "references": [],
                    "startTime": 0,
                    "duration": d * 1000,
                    "tags": [],
                    "processID": "p1",
                })
            })
            .collect();

        json!({
            "data": [{
                "traceID": "t1",
                "spans": spans,
                "processes": { "p1": { "serviceName": "payment-service" } },
            }]
        })
    }

    #[tokio::test]
    async fn refresh_replaces_baseline_from_window_batch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/traces"))
            .respond_with(ResponseTemplate::new(200).set_body_json(trace_fixture(&[100, 110, 120, 130, 140])))
            .mount(&server)
            .await;

        let client = TraceBackendClient::new(server.uri(), 5).unwrap();
        let profiler = OnlineProfiler::new(client, detection_config(&["payment-service"]), &cadence());

        profiler.refresh().await.unwrap();

        let baseline = profiler.get_baseline("payment-service", "charge").unwrap();
        assert_eq!(baseline.mean, 120.0);
        assert!((baseline.variance - 200.0).abs() < 1e-9);
        assert_eq!(baseline.sample_count, 5);
    }

    #[tokio::test]
    async fn refresh_is_replace_not_append_across_runs() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/traces"))
            .respond_with(ResponseTemplate::new(200).set_body_json(trace_fixture(&[100, 110, 120, 130, 140])))
            .mount(&server)
            .await;

        let client = TraceBackendClient::new(server.uri(), 5).unwrap();
        let profiler = OnlineProfiler::new(client, detection_config(&["payment-service"]), &cadence());

        profiler.refresh().await.unwrap();
        profiler.refresh().await.unwrap();

        let baseline = profiler.get_baseline("payment-service", "charge").unwrap();
        assert_eq!(baseline.sample_count, 5);
    }

    #[tokio::test]
    async fn baselines_for_missing_keys_are_retained() {
        let server = MockServer::start().await;
        let client = TraceBackendClient::new(server.uri(), 5).unwrap();
        let profiler = OnlineProfiler::new(client, detection_config(&[]), &cadence());

        profiler
            .baselines
            .insert("svc:op".to_string(), SpanBaseline::from_batch(
                "svc:op".to_string(),
                BatchStats::from_samples(&[1.0, 2.0, 3.0]).unwrap(),
            ));

        profiler.refresh().await.unwrap();
        assert!(profiler.get_baseline("svc", "op").is_some());
    }
}
