//! Anomaly Detector: near-real-time latency outlier detection against the
//! Recalculator's time-bucketed baselines, falling back to the Online
//! Profiler's sliding-window baseline. Grounded on the teacher's
//! `CorrelationEngine::monitor_loop` cadence pattern, generalized to a
//! dedup-then-classify pipeline.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::adapters::{discard_unmonitored, TraceBackendClient};
use crate::config::{CadenceConfig, DetectionConfig};
use crate::error::Result;
use crate::models::span::day_and_hour;
use crate::models::{Anomaly, Severity};
use crate::profiler::{OnlineProfiler, Recalculator};
use crate::stats::default_thresholds;
use crate::store::HistoryStore;

use super::AnomalyEnqueuer;

const WINDOW_LOOKBACK: &str = "1m";
const FETCH_LIMIT: u32 = 2000;
const SEEN_CAPACITY: usize = 1000;
const SEEN_TRIM_TO: usize = 500;

/// Bounded dedup set of `(traceId, spanId)` ids, insertion-ordered so the
/// oldest half can be dropped once the cap is hit.
struct SeenIds {
    order: VecDeque<String>,
    set: HashSet<String>,
}

impl SeenIds {
    fn new() -> Self {
        Self {
            order: VecDeque::new(),
            set: HashSet::new(),
        }
    }

    /// Returns `true` if this id is new (and records it); `false` if already seen.
    fn insert_if_new(&mut self, id: String) -> bool {
        if !self.set.insert(id.clone()) {
            return false;
        }
        self.order.push_back(id);
        if self.order.len() > SEEN_CAPACITY {
            while self.order.len() > SEEN_TRIM_TO {
                if let Some(old) = self.order.pop_front() {
                    self.set.remove(&old);
                }
            }
        }
        true
    }
}

struct ResolvedBaseline {
    mean: f64,
    std_dev: f64,
    sample_count: u64,
    thresholds: crate::stats::Thresholds,
}

pub struct LatencyDetector {
    trace_client: TraceBackendClient,
    detection: DetectionConfig,
    recalculator: Arc<Recalculator>,
    profiler: Arc<OnlineProfiler>,
    store: Arc<dyn HistoryStore>,
    enqueuer: Arc<dyn AnomalyEnqueuer>,
    seen: Mutex<SeenIds>,
    active: DashMap<String, Anomaly>,
    interval_secs: u64,
    last_polled: RwLock<Option<DateTime<Utc>>>,
}

impl LatencyDetector {
    pub fn new(
        trace_client: TraceBackendClient,
        detection: DetectionConfig,
        recalculator: Arc<Recalculator>,
        profiler: Arc<OnlineProfiler>,
        store: Arc<dyn HistoryStore>,
        enqueuer: Arc<dyn AnomalyEnqueuer>,
        cadence: &CadenceConfig,
    ) -> Self {
        Self {
            trace_client,
            detection,
            recalculator,
            profiler,
            store,
            enqueuer,
            seen: Mutex::new(SeenIds::new()),
            active: DashMap::new(),
            interval_secs: cadence.detector_interval_secs,
            last_polled: RwLock::new(None),
        }
    }

    /// Wall-clock time of the most recently completed `tick()`, for the
    /// Control Surface's `health()` operation.
    pub fn last_polled(&self) -> Option<DateTime<Utc>> {
        *self.last_polled.read()
    }

    fn resolve_baseline(&self, service: &str, operation: &str, day: u8, hour: u8) -> Option<ResolvedBaseline> {
        let span_key = format!("{service}:{operation}");

        if let Some(b) = self.recalculator.get_baseline_with_fallback(&span_key, day, hour) {
            return Some(ResolvedBaseline {
                mean: b.mean,
                std_dev: b.std_dev,
                sample_count: b.sample_count,
                thresholds: b.thresholds,
            });
        }

        self.profiler.get_baseline(service, operation).map(|b| ResolvedBaseline {
            mean: b.mean,
            std_dev: b.std_dev,
            sample_count: b.sample_count,
            thresholds: default_thresholds(),
        })
    }

    /// One detection cycle: fetch the last minute of traces per monitored
    /// service, dedup, resolve a baseline, and classify.
    pub async fn tick(&self) -> Result<()> {
        self.prune_expired();

        for service in &self.detection.monitored_services {
            let traces = match self.trace_client.fetch_recent(service, WINDOW_LOOKBACK, FETCH_LIMIT).await {
                Ok(traces) => traces,
                Err(e) if e.is_transient() => {
                    warn!(service, error = %e, "trace fetch failed, skipping this cycle");
                    continue;
                }
                Err(e) => return Err(e),
            };

            for trace in discard_unmonitored(traces, &self.detection.monitored_services) {
                for span in trace.spans {
                    self.inspect_span(&span).await;
                }
            }
        }

        *self.last_polled.write() = Some(Utc::now());
        Ok(())
    }

    async fn inspect_span(&self, span: &crate::models::Span) {
        let id = span.anomaly_id();
        let is_new = self.seen.lock().insert_if_new(id.clone());
        if !is_new {
            return;
        }

        let (day, hour) = day_and_hour(span.start_time_micros);
        let baseline = match self.resolve_baseline(&span.service, &span.operation, day, hour) {
            Some(b) => b,
            None => return,
        };

        if baseline.sample_count < self.detection.min_samples_for_latency || baseline.std_dev < 1.0 {
            return;
        }

        let duration_ms = span.duration_ms();
        let deviation = (duration_ms - baseline.mean) / baseline.std_dev;
        let tier = match baseline.thresholds.classify(deviation) {
            Some(t) => t,
            None => return,
        };
        let severity = match Severity::from_tier(tier) {
            Some(s) => s,
            None => return,
        };

        let anomaly = Anomaly {
            id,
            trace_id: Some(span.trace_id.clone()),
            span_id: Some(span.span_id.clone()),
            service: span.service.clone(),
            operation: span.operation.clone(),
            value: duration_ms,
            expected_mean: baseline.mean,
            expected_std_dev: baseline.std_dev,
            deviation,
            severity,
            timestamp: Utc::now(),
            attributes: span.attributes.clone(),
            day_of_week: day,
            hour_of_day: hour,
        };

        self.active.insert(anomaly.id.clone(), anomaly.clone());

        let store = self.store.clone();
        let for_store = anomaly.clone();
        tokio::spawn(async move {
            if let Err(e) = store.insert_anomaly_if_absent(&for_store).await {
                error!(error = %e, anomaly_id = %for_store.id, "failed to persist latency anomaly");
            }
        });

        if severity.tier() <= 3 {
            self.enqueuer.enqueue(anomaly).await;
        }
    }

    fn prune_expired(&self) {
        let retention = chrono::Duration::seconds(self.detection.latency_anomaly_retention_secs as i64);
        let now = Utc::now();
        self.active.retain(|_, a| now - a.timestamp < retention);
    }

    /// `critical` if any active anomaly for `service` has severity <= 2,
    /// `warning` if any has severity in {3,4}, else `healthy`.
    pub fn service_health(&self, service: &str) -> &'static str {
        let mut has_warning = false;
        for entry in self.active.iter() {
            let a = entry.value();
            if a.service != service {
                continue;
            }
            if a.severity.tier() <= 2 {
                return "critical";
            }
            if a.severity.tier() == 3 || a.severity.tier() == 4 {
                has_warning = true;
            }
        }
        if has_warning {
            "warning"
        } else {
            "healthy"
        }
    }

    pub fn active_anomalies(&self) -> Vec<Anomaly> {
        self.active.iter().map(|e| e.value().clone()).collect()
    }

    pub fn start(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(self.interval_secs));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.tick().await {
                            error!(error = %e, "latency detector tick failed");
                        }
                    }
                    _ = cancel.cancelled() => {
                        info!("latency detector stopping");
                        break;
                    }
                }
            }
        })
    }
}
