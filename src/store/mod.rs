//! History Store: durable upsert-based persistence for baselines and
//! anomalies, plus the in-process FIFO analysis cache.

pub mod cache;
pub mod factory;
pub mod memory;
pub mod sled_store;

pub use cache::AnalysisCache;
pub use factory::{create_in_memory_store, create_store};
pub use memory::InMemoryHistoryStore;
pub use sled_store::SledHistoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{Anomaly, RecalculationWatermark, SpanBaseline, TimeBaseline};

#[derive(Debug, Clone, Default)]
pub struct AnomalyHistoryQuery {
    pub hours: Option<u32>,
    pub service: Option<String>,
    pub limit: Option<u32>,
}

pub const DEFAULT_ANOMALY_HISTORY_LIMIT: u32 = 1000;

/// One bucket of `getHourlyTrend`; `hour` is the bucket start, normalized to UTC.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HourlyTrendBucket {
    pub hour: DateTime<Utc>,
    pub count: u64,
    pub critical: u64,
}

/// Durable persistence for baselines, anomalies, and watermarks. Every
/// upsert is independently idempotent; no multi-record transactions
/// are required.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn upsert_span_baselines(&self, baselines: &[SpanBaseline]) -> Result<()>;
    async fn upsert_time_baselines(&self, baselines: &[TimeBaseline]) -> Result<()>;
    async fn get_span_baselines(&self) -> Result<Vec<SpanBaseline>>;
    async fn get_time_baselines(&self) -> Result<Vec<TimeBaseline>>;

    /// Returns `true` if a new record was inserted, `false` if `anomaly.id`
    /// already existed (idempotent no-op).
    async fn insert_anomaly_if_absent(&self, anomaly: &Anomaly) -> Result<bool>;
    async fn get_anomaly_history(&self, query: &AnomalyHistoryQuery) -> Result<Vec<Anomaly>>;
    async fn get_hourly_trend(&self, hours: u32) -> Result<Vec<HourlyTrendBucket>>;

    async fn upsert_watermark(&self, watermark: &RecalculationWatermark) -> Result<()>;
    async fn get_watermark(&self, service: &str) -> Result<Option<RecalculationWatermark>>;
    async fn clear_watermarks(&self) -> Result<()>;
}

/// Bucket an anomaly timestamp to its UTC calendar hour. Resolves the
/// hourly-trend open question by normalizing explicitly to UTC rather than
/// the process's local time zone.
pub fn truncate_to_hour(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.date_naive()
        .and_hms_opt(ts.time().hour(), 0, 0)
        .unwrap()
        .and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn truncate_to_hour_drops_minutes_and_seconds() {
        let ts = Utc.with_ymd_and_hms(2026, 7, 28, 14, 37, 52).unwrap();
        let truncated = truncate_to_hour(ts);
        assert_eq!(truncated, Utc.with_ymd_and_hms(2026, 7, 28, 14, 0, 0).unwrap());
    }
}
