//! Time-Bucketed Recalculator: an on-demand (not polled) worker that
//! rebuilds `TimeBaseline`s over a 30-day lookback, partitioned by
//! `(dayOfWeek, hourOfDay)`, with per-bucket adaptive thresholds. Mutually
//! exclusive with itself via a `tokio::sync::Mutex` guard, grounded on the
//! teacher's `running: Arc<RwLock<bool>>` idiom in
//! `CorrelationEngine`.
//!
//! Day-of-week and hour-of-day are derived from the span's UTC start time
//! (Monday = 0 .. Sunday = 6), resolving the hourly-bucketing open question
//! by normalizing explicitly rather than relying on the process's local
//! time zone.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::warn;

use crate::adapters::{discard_unmonitored, TraceBackendClient};
use crate::config::DetectionConfig;
use crate::error::Result;
use crate::models::span::day_and_hour;
use crate::models::{ProcessingStatus, RecalculationWatermark, SpanBaseline, TimeBaseline};
use crate::stats::thresholds::MIN_SAMPLES_FOR_THRESHOLD;
use crate::stats::{thresholds_from_deviations, BatchStats};
use crate::store::HistoryStore;

const FETCH_LIMIT_PER_SERVICE: u32 = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecalcMode {
    Incremental,
    Full,
}

#[derive(Debug, Clone)]
pub struct RecalcResult {
    pub success: bool,
    pub message: String,
    pub baselines_count: usize,
    pub is_incremental: bool,
}

pub struct Recalculator {
    store: Arc<dyn HistoryStore>,
    trace_client: TraceBackendClient,
    detection: DetectionConfig,
    pub(crate) time_baselines: DashMap<String, TimeBaseline>,
    is_calculating: Mutex<()>,
}

impl Recalculator {
    pub fn new(store: Arc<dyn HistoryStore>, trace_client: TraceBackendClient, detection: DetectionConfig) -> Self {
        Self {
            store,
            trace_client,
            detection,
            time_baselines: DashMap::new(),
            is_calculating: Mutex::new(()),
        }
    }

    /// Reload the in-memory bucket cache from the store (called at
    /// supervisor startup so fallback lookups work before the first run).
    pub async fn load_from_store(&self) -> Result<()> {
        for baseline in self.store.get_time_baselines().await? {
            self.time_baselines.insert(baseline.key(), baseline);
        }
        Ok(())
    }

    pub fn all_time_baselines(&self) -> Vec<TimeBaseline> {
        self.time_baselines.iter().map(|e| e.value().clone()).collect()
    }

    /// Non-blocking check for the Control Surface's `timeBaselines()` status field.
    pub fn is_recalculating(&self) -> bool {
        self.is_calculating.try_lock().is_err()
    }

    /// `getBaselineWithFallback`: exact bucket, then same hour across all
    /// days, then same day across all hours, then any bucket for the
    /// `spanKey` — first whose `sampleCount >= 10`.
    pub fn get_baseline_with_fallback(&self, span_key: &str, day: u8, hour: u8) -> Option<TimeBaseline> {
        let exact = TimeBaseline::bucket_key(span_key, day, hour);
        if let Some(b) = self.time_baselines.get(&exact) {
            if b.sample_count >= MIN_SAMPLES_FOR_THRESHOLD {
                return Some(b.clone());
            }
        }

        for d in 0..7u8 {
            let key = TimeBaseline::bucket_key(span_key, d, hour);
            if let Some(b) = self.time_baselines.get(&key) {
                if b.sample_count >= MIN_SAMPLES_FOR_THRESHOLD {
                    return Some(b.clone());
                }
            }
        }

        for h in 0..24u8 {
            let key = TimeBaseline::bucket_key(span_key, day, h);
            if let Some(b) = self.time_baselines.get(&key) {
                if b.sample_count >= MIN_SAMPLES_FOR_THRESHOLD {
                    return Some(b.clone());
                }
            }
        }

        self.time_baselines
            .iter()
            .find(|e| e.value().span_key == span_key && e.value().sample_count >= MIN_SAMPLES_FOR_THRESHOLD)
            .map(|e| e.value().clone())
    }

    /// Returns `{success: false, ...}` without side effects if another
    /// recalculation is already in progress.
    pub async fn recalculate(&self, mode: RecalcMode) -> RecalcResult {
        let guard = match self.is_calculating.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                return RecalcResult {
                    success: false,
                    message: "Calculation already in progress".to_string(),
                    baselines_count: 0,
                    is_incremental: mode == RecalcMode::Incremental,
                }
            }
        };

        if mode == RecalcMode::Full {
            if let Err(e) = self.store.clear_watermarks().await {
                drop(guard);
                return RecalcResult {
                    success: false,
                    message: format!("failed to clear watermarks: {e}"),
                    baselines_count: 0,
                    is_incremental: false,
                };
            }
        }

        let now = Utc::now();
        let hot_window_start = now - chrono::Duration::days(self.detection.hot_window_days as i64);
        let mut total_baselines = 0usize;

        for service in self.detection.monitored_services.clone() {
            match self.recalculate_service(&service, mode, now, hot_window_start).await {
                Ok(count) => total_baselines += count,
                Err(e) => {
                    warn!(service = %service, error = %e, "recalculation failed for service, watermark left untouched");
                }
            }
        }

        drop(guard);

        RecalcResult {
            success: true,
            message: "recalculation complete".to_string(),
            baselines_count: total_baselines,
            is_incremental: mode == RecalcMode::Incremental,
        }
    }

    async fn recalculate_service(
        &self,
        service: &str,
        mode: RecalcMode,
        now: DateTime<Utc>,
        hot_window_start: DateTime<Utc>,
    ) -> Result<usize> {
        let watermark = self.store.get_watermark(service).await?;
        let start_micros = match (mode, &watermark) {
            (RecalcMode::Incremental, Some(w)) if w.last_trace_time_micros > 0 => w.last_trace_time_micros,
            _ => hot_window_start.timestamp_micros(),
        };

        let traces = self
            .trace_client
            .fetch_since(service, start_micros, now.timestamp_micros(), FETCH_LIMIT_PER_SERVICE)
            .await?;
        let traces = discard_unmonitored(traces, &self.detection.monitored_services);

        let mut bucket_durations: HashMap<String, Vec<f64>> = HashMap::new();
        let mut bucket_span_key: HashMap<String, String> = HashMap::new();
        let mut bucket_meta: HashMap<String, (String, u8, u8)> = HashMap::new();
        let mut span_key_durations: HashMap<String, Vec<f64>> = HashMap::new();
        let mut max_start_time = start_micros;

        for trace in traces {
            for span in trace.spans {
                if span.service != service {
                    continue;
                }
                max_start_time = max_start_time.max(span.start_time_micros);

                let (day, hour) = day_and_hour(span.start_time_micros);
                let span_key = span.span_key();
                let bucket_key = TimeBaseline::bucket_key(&span_key, day, hour);

                bucket_durations.entry(bucket_key.clone()).or_default().push(span.duration_ms());
                bucket_span_key.insert(bucket_key.clone(), span_key.clone());
                bucket_meta.insert(bucket_key, (span_key.clone(), day, hour));
                span_key_durations.entry(span_key).or_default().push(span.duration_ms());
            }
        }

        let mut time_baselines = Vec::with_capacity(bucket_durations.len());
        for (bucket_key, durations) in &bucket_durations {
            let (span_key, day, hour) = bucket_meta.get(bucket_key).unwrap().clone();
            let stats = match BatchStats::from_samples(durations) {
                Some(s) => s,
                None => continue,
            };

            let deviations: Vec<f64> = durations.iter().map(|d| (d - stats.mean) / stats.std_dev.max(f64::EPSILON)).collect();
            let thresholds = thresholds_from_deviations(&deviations);

            time_baselines.push(TimeBaseline {
                span_key,
                day_of_week: day,
                hour_of_day: hour,
                mean: stats.mean,
                std_dev: stats.std_dev,
                variance: stats.variance,
                p50: stats.p50,
                p95: stats.p95,
                p99: stats.p99,
                min: stats.min,
                max: stats.max,
                sample_count: stats.sample_count,
                thresholds,
                last_updated: now,
            });
        }

        let span_baselines: Vec<SpanBaseline> = span_key_durations
            .into_iter()
            .filter_map(|(key, durations)| BatchStats::from_samples(&durations).map(|s| SpanBaseline::from_batch(key, s)))
            .collect();

        let baselines_count = time_baselines.len();

        self.store.upsert_time_baselines(&time_baselines).await?;
        self.store.upsert_span_baselines(&span_baselines).await?;

        for baseline in &time_baselines {
            self.time_baselines.insert(baseline.key(), baseline.clone());
        }

        // Watermark advances only after the corresponding rows are durably upserted.
        self.store
            .upsert_watermark(&RecalculationWatermark {
                service: service.to_string(),
                last_trace_time_micros: max_start_time,
                processing_status: ProcessingStatus::Idle,
            })
            .await?;

        Ok(baselines_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetectionConfig;
    use crate::store::InMemoryHistoryStore;
    use chrono::TimeZone;
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

    fn trace_fixture(start_times_micros: &[i64]) -> serde_json::Value {
        let spans: Vec<_> = start_times_micros
            .iter()
            .enumerate()
            .map(|(i, t)| {
                json!({
                    "spanID": format!("s{i}"),
                    "operationName": "transfer",
                    "references": [],
                    "startTime": t,
                    "duration": 100_000,
                    "tags": [],
                    "processID": "p1",
                })
            })
            .collect();

        json!({
            "data": [{
                "traceID": "t1",
                "spans": spans,
                "processes": { "p1": { "serviceName": "kx-wallet" } },
            }]
        })
    }

    #[tokio::test]
    async fn day_and_hour_is_normalized_to_utc() {
        // 2026-07-27 is a Monday.
        let dt = Utc.with_ymd_and_hms(2026, 7, 27, 3, 0, 0).unwrap();
        let (day, hour) = day_and_hour(dt.timestamp_micros());
        assert_eq!(day, 0);
        assert_eq!(hour, 3);
    }

    #[tokio::test]
    async fn full_recalc_then_incremental_with_no_new_traces_holds_watermark() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/traces"))
            .respond_with(ResponseTemplate::new(200).set_body_json(trace_fixture(&[1_000_000, 2_000_000])))
            .mount(&server)
            .await;

        let store: Arc<dyn HistoryStore> = Arc::new(InMemoryHistoryStore::new());
        let client = TraceBackendClient::new(server.uri(), 5).unwrap();
        let recalc = Recalculator::new(store.clone(), client, detection_config(&["kx-wallet"]));

        let first = recalc.recalculate(RecalcMode::Full).await;
        assert!(first.success);
        assert!(first.baselines_count > 0);

        let watermark_after_full = store.get_watermark("kx-wallet").await.unwrap().unwrap();

        let second = recalc.recalculate(RecalcMode::Incremental).await;
        assert!(second.success);
        assert!(second.is_incremental);

        let watermark_after_incremental = store.get_watermark("kx-wallet").await.unwrap().unwrap();
        assert_eq!(
            watermark_after_full.last_trace_time_micros,
            watermark_after_incremental.last_trace_time_micros
        );
    }

    #[test]
    fn fallback_chain_prefers_same_hour_other_day_over_same_day_other_hour() {
        let recalc = Recalculator::new(
            Arc::new(InMemoryHistoryStore::new()),
            TraceBackendClient::new("http://localhost", 5).unwrap(),
            detection_config(&["kx-wallet"]),
        );

        let monday_3am = TimeBaseline {
            span_key: "kx-wallet:transfer".to_string(),
            day_of_week: 0,
            hour_of_day: 3,
            mean: 50.0,
            std_dev: 5.0,
            variance: 25.0,
            p50: 50.0,
            p95: 55.0,
            p99: 58.0,
            min: 40.0,
            max: 60.0,
            sample_count: 12,
            thresholds: crate::stats::default_thresholds(),
            last_updated: Utc::now(),
        };
        recalc.time_baselines.insert(monday_3am.key(), monday_3am.clone());

        let found = recalc.get_baseline_with_fallback("kx-wallet:transfer", 2, 3).unwrap();
        assert_eq!(found.day_of_week, 0);
        assert_eq!(found.hour_of_day, 3);
    }

    #[test]
    fn fallback_chain_returns_none_when_nothing_meets_min_samples() {
        let recalc = Recalculator::new(
            Arc::new(InMemoryHistoryStore::new()),
            TraceBackendClient::new("http://localhost", 5).unwrap(),
            detection_config(&["kx-wallet"]),
        );
        assert!(recalc.get_baseline_with_fallback("kx-wallet:transfer", 2, 3).is_none());
    }

    #[tokio::test]
    async fn concurrent_recalculate_is_refused() {
        let store: Arc<dyn HistoryStore> = Arc::new(InMemoryHistoryStore::new());
        let recalc = Arc::new(Recalculator::new(
            store,
            TraceBackendClient::new("http://localhost:1", 1).unwrap(),
            detection_config(&["kx-wallet"]),
        ));

        let _guard = recalc.is_calculating.try_lock().unwrap();
        let result = recalc.recalculate(RecalcMode::Incremental).await;
        assert!(!result.success);
        assert_eq!(result.message, "Calculation already in progress");
    }
}
