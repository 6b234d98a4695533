//! Amount Profiler & Detector: the same online/batch machinery as the
//! latency side, applied to transaction amounts. `record_transaction` is
//! called synchronously by the operational layer on each executed
//! order/transfer and folds the observation into a Welford accumulator
//! before classifying it against the whale threshold table. A periodic
//! `refresh` recomputes percentile-bearing baselines from a rolling 24h
//! local sample buffer (no external operational-store wire contract is
//! specified, so incoming amounts are buffered from `record_transaction`
//! itself rather than polled from an unspecified backend).

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::{CadenceConfig, DetectionConfig};
use crate::models::span::day_and_hour;
use crate::models::{AmountBaseline, Anomaly, OperationType, Severity};
use crate::stats::{whale_thresholds, BatchStats, Welford};
use crate::store::HistoryStore;

use super::AnomalyEnqueuer;

const HISTORY_WINDOW: chrono::Duration = chrono::Duration::hours(24);
const MIN_STD_DEV: f64 = 0.0001;

struct BufferEntry {
    operation_type: OperationType,
    asset: String,
    samples: VecDeque<(DateTime<Utc>, f64)>,
}

pub struct AmountDetector {
    detection: DetectionConfig,
    store: Arc<dyn HistoryStore>,
    enqueuer: Arc<dyn AnomalyEnqueuer>,
    welford: DashMap<String, Welford>,
    buffer: Mutex<HashMap<String, BufferEntry>>,
    baselines: DashMap<String, AmountBaseline>,
    active: DashMap<String, Anomaly>,
    interval_secs: u64,
}

impl AmountDetector {
    pub fn new(
        detection: DetectionConfig,
        store: Arc<dyn HistoryStore>,
        enqueuer: Arc<dyn AnomalyEnqueuer>,
        cadence: &CadenceConfig,
    ) -> Self {
        Self {
            detection,
            store,
            enqueuer,
            welford: DashMap::new(),
            buffer: Mutex::new(HashMap::new()),
            baselines: DashMap::new(),
            active: DashMap::new(),
            interval_secs: cadence.amount_profiler_interval_secs,
        }
    }

    pub fn get_baseline(&self, operation_type: OperationType, asset: &str) -> Option<AmountBaseline> {
        self.baselines.get(&AmountBaseline::key(operation_type, asset)).map(|b| b.clone())
    }

    pub fn all_baselines(&self) -> Vec<AmountBaseline> {
        self.baselines.iter().map(|e| e.value().clone()).collect()
    }

    pub fn active_anomalies(&self) -> Vec<Anomaly> {
        self.active.iter().map(|e| e.value().clone()).collect()
    }

    /// Event-driven classification. Returns `None` whenever the event is
    /// only appended to the baseline (too few samples, or too little
    /// variance to classify against safely).
    pub async fn record_transaction(
        &self,
        operation_type: OperationType,
        asset: &str,
        amount: f64,
        reference: &str,
    ) -> Option<Anomaly> {
        let key = AmountBaseline::key(operation_type, asset);
        let now = Utc::now();

        let (count, mean, std_dev) = {
            let mut entry = self.welford.entry(key.clone()).or_default();
            entry.push(amount);
            (entry.count(), entry.mean(), entry.std_dev())
        };

        {
            let mut buffer = self.buffer.lock();
            let entry = buffer.entry(key.clone()).or_insert_with(|| BufferEntry {
                operation_type,
                asset: asset.to_string(),
                samples: VecDeque::new(),
            });
            entry.samples.push_back((now, amount));
            while let Some((ts, _)) = entry.samples.front() {
                if now - *ts > HISTORY_WINDOW {
                    entry.samples.pop_front();
                } else {
                    break;
                }
            }
        }

        if count < self.detection.min_samples_for_amounts || std_dev < MIN_STD_DEV {
            return None;
        }

        let deviation = (amount - mean) / std_dev;
        let tier = whale_thresholds().classify(deviation)?;
        let severity = Severity::from_tier(tier)?;

        let (day_of_week, hour_of_day) = day_and_hour(now.timestamp_micros());
        let anomaly = Anomaly {
            id: format!("{reference}-{}", now.timestamp_micros()),
            trace_id: None,
            span_id: None,
            service: format!("{operation_type:?}"),
            operation: asset.to_string(),
            value: amount,
            expected_mean: mean,
            expected_std_dev: std_dev,
            deviation,
            severity,
            timestamp: now,
            attributes: Default::default(),
            day_of_week,
            hour_of_day,
        };

        self.active.insert(anomaly.id.clone(), anomaly.clone());
        self.prune_expired();

        let store = self.store.clone();
        let for_store = anomaly.clone();
        tokio::spawn(async move {
            if let Err(e) = store.insert_anomaly_if_absent(&for_store).await {
                error!(error = %e, anomaly_id = %for_store.id, "failed to persist amount anomaly");
            }
        });

        if severity.tier() <= 3 {
            self.enqueuer.enqueue(anomaly.clone()).await;
        }

        Some(anomaly)
    }

    /// Recompute percentile-bearing baselines from the rolling 24h buffer.
    pub fn refresh(&self) {
        let now = Utc::now();
        let mut buffer = self.buffer.lock();
        for entry in buffer.values_mut() {
            while let Some((ts, _)) = entry.samples.front() {
                if now - *ts > HISTORY_WINDOW {
                    entry.samples.pop_front();
                } else {
                    break;
                }
            }

            let amounts: Vec<f64> = entry.samples.iter().map(|(_, v)| *v).collect();
            if let Some(stats) = BatchStats::from_samples(&amounts) {
                let key = AmountBaseline::key(entry.operation_type, &entry.asset);
                self.baselines.insert(key, amount_baseline_from_batch(entry.operation_type, entry.asset.clone(), stats));
            }
        }
    }

    fn prune_expired(&self) {
        let retention = chrono::Duration::seconds(self.detection.amount_anomaly_retention_secs as i64);
        let now = Utc::now();
        self.active.retain(|_, a| now - a.timestamp < retention);
    }

    pub fn start(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(self.interval_secs));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.refresh();
                    }
                    _ = cancel.cancelled() => {
                        info!("amount profiler stopping");
                        break;
                    }
                }
            }
        })
    }
}

fn amount_baseline_from_batch(operation_type: OperationType, asset: String, stats: BatchStats) -> AmountBaseline {
    AmountBaseline {
        operation_type,
        asset,
        mean: stats.mean,
        std_dev: stats.std_dev,
        variance: stats.variance,
        p50: stats.p50,
        p95: stats.p95,
        p99: stats.p99,
        min: stats.min,
        max: stats.max,
        sample_count: stats.sample_count,
        last_updated: Utc::now(),
    }
}
