//! Durable baseline shapes: per-operation latency baselines, time-bucketed
//! variants with adaptive thresholds, and the parallel amount baselines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::stats::{BatchStats, Thresholds};

/// Keyed by `spanKey = "service:operation"`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpanBaseline {
    pub span_key: String,
    pub mean: f64,
    pub std_dev: f64,
    pub variance: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub min: f64,
    pub max: f64,
    pub sample_count: u64,
    pub last_updated: DateTime<Utc>,
}

impl SpanBaseline {
    pub fn from_batch(span_key: String, stats: BatchStats) -> Self {
        Self {
            span_key,
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
}

/// Keyed by `(spanKey, dayOfWeek in [0..6], hourOfDay in [0..23])`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeBaseline {
    pub span_key: String,
    pub day_of_week: u8,
    pub hour_of_day: u8,
    pub mean: f64,
    pub std_dev: f64,
    pub variance: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub min: f64,
    pub max: f64,
    pub sample_count: u64,
    pub thresholds: Thresholds,
    pub last_updated: DateTime<Utc>,
}

impl TimeBaseline {
    pub fn bucket_key(span_key: &str, day_of_week: u8, hour_of_day: u8) -> String {
        format!("{span_key}|{day_of_week}|{hour_of_day}")
    }

    pub fn key(&self) -> String {
        Self::bucket_key(&self.span_key, self.day_of_week, self.hour_of_day)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationType {
    Buy,
    Sell,
    Deposit,
    Withdraw,
    Transfer,
}

/// Keyed by `(operationType, asset)`; uses the stricter whale threshold table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AmountBaseline {
    pub operation_type: OperationType,
    pub asset: String,
    pub mean: f64,
    pub std_dev: f64,
    pub variance: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub min: f64,
    pub max: f64,
    pub sample_count: u64,
    pub last_updated: DateTime<Utc>,
}

impl AmountBaseline {
    pub fn key(operation_type: OperationType, asset: &str) -> String {
        format!("{operation_type:?}|{asset}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_baseline_invariants_hold() {
        let stats = BatchStats::from_samples(&[10.0, 20.0, 30.0, 40.0, 50.0]).unwrap();
        let baseline = SpanBaseline::from_batch("svc:op".to_string(), stats);
        assert!(baseline.min <= baseline.p50);
        assert!(baseline.p50 <= baseline.p95);
        assert!(baseline.p95 <= baseline.p99);
        assert!(baseline.p99 <= baseline.max);
        assert!((baseline.std_dev - baseline.variance.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn time_baseline_bucket_key_is_composite() {
        let key = TimeBaseline::bucket_key("kx-wallet:transfer", 3, 14);
        assert_eq!(key, "kx-wallet:transfer|3|14");
    }
}
