//! In-memory `HistoryStore`, used for local development and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::Result;
use crate::models::{Anomaly, RecalculationWatermark, SpanBaseline, TimeBaseline};

use super::{truncate_to_hour, AnomalyHistoryQuery, HistoryStore, HourlyTrendBucket, DEFAULT_ANOMALY_HISTORY_LIMIT};

#[derive(Default)]
struct Inner {
    span_baselines: HashMap<String, SpanBaseline>,
    time_baselines: HashMap<String, TimeBaseline>,
    anomalies: HashMap<String, Anomaly>,
    watermarks: HashMap<String, RecalculationWatermark>,
}

#[derive(Default)]
pub struct InMemoryHistoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn upsert_span_baselines(&self, baselines: &[SpanBaseline]) -> Result<()> {
        let mut inner = self.inner.lock();
        for baseline in baselines {
            inner.span_baselines.insert(baseline.span_key.clone(), baseline.clone());
        }
        Ok(())
    }

    async fn upsert_time_baselines(&self, baselines: &[TimeBaseline]) -> Result<()> {
        let mut inner = self.inner.lock();
        for baseline in baselines {
            inner.time_baselines.insert(baseline.key(), baseline.clone());
        }
        Ok(())
    }

    async fn get_span_baselines(&self) -> Result<Vec<SpanBaseline>> {
        let inner = self.inner.lock();
        let mut result: Vec<SpanBaseline> = inner.span_baselines.values().cloned().collect();
        result.sort_by(|a, b| b.sample_count.cmp(&a.sample_count));
        Ok(result)
    }

    async fn get_time_baselines(&self) -> Result<Vec<TimeBaseline>> {
        Ok(self.inner.lock().time_baselines.values().cloned().collect())
    }

    async fn insert_anomaly_if_absent(&self, anomaly: &Anomaly) -> Result<bool> {
        let mut inner = self.inner.lock();
        if inner.anomalies.contains_key(&anomaly.id) {
            return Ok(false);
        }
        inner.anomalies.insert(anomaly.id.clone(), anomaly.clone());
        Ok(true)
    }

    async fn get_anomaly_history(&self, query: &AnomalyHistoryQuery) -> Result<Vec<Anomaly>> {
        let cutoff = query
            .hours
            .map(|h| chrono::Utc::now() - chrono::Duration::hours(h as i64));
        let limit = query.limit.unwrap_or(DEFAULT_ANOMALY_HISTORY_LIMIT) as usize;

        let inner = self.inner.lock();
        let mut anomalies: Vec<Anomaly> = inner
            .anomalies
            .values()
            .filter(|a| cutoff.map_or(true, |c| a.timestamp >= c))
            .filter(|a| query.service.as_ref().map_or(true, |s| &a.service == s))
            .cloned()
            .collect();

        anomalies.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        anomalies.truncate(limit);
        Ok(anomalies)
    }

    async fn get_hourly_trend(&self, hours: u32) -> Result<Vec<HourlyTrendBucket>> {
        use std::collections::BTreeMap;

        let now = chrono::Utc::now();
        let start = truncate_to_hour(now - chrono::Duration::hours(hours as i64));

        let mut buckets: BTreeMap<chrono::DateTime<chrono::Utc>, (u64, u64)> = BTreeMap::new();
        let mut cursor = start;
        while cursor <= truncate_to_hour(now) {
            buckets.insert(cursor, (0, 0));
            cursor += chrono::Duration::hours(1);
        }

        for anomaly in self.inner.lock().anomalies.values() {
            let bucket = truncate_to_hour(anomaly.timestamp);
            if let Some(slot) = buckets.get_mut(&bucket) {
                slot.0 += 1;
                if anomaly.severity.tier() == 1 {
                    slot.1 += 1;
                }
            }
        }

        Ok(buckets
            .into_iter()
            .map(|(hour, (count, critical))| HourlyTrendBucket { hour, count, critical })
            .collect())
    }

    async fn upsert_watermark(&self, watermark: &RecalculationWatermark) -> Result<()> {
        self.inner
            .lock()
            .watermarks
            .insert(watermark.service.clone(), watermark.clone());
        Ok(())
    }

    async fn get_watermark(&self, service: &str) -> Result<Option<RecalculationWatermark>> {
        Ok(self.inner.lock().watermarks.get(service).cloned())
    }

    async fn clear_watermarks(&self) -> Result<()> {
        self.inner.lock().watermarks.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Attributes, Severity};

    #[tokio::test]
    async fn insert_anomaly_is_idempotent() {
        let store = InMemoryHistoryStore::new();
        let anomaly = Anomaly {
            id: "t1-s1".to_string(),
            trace_id: None,
            span_id: None,
            service: "svc".to_string(),
            operation: "op".to_string(),
            value: 1.0,
            expected_mean: 0.0,
            expected_std_dev: 1.0,
            deviation: 1.0,
            severity: Severity::Low,
            timestamp: chrono::Utc::now(),
            attributes: Attributes::new(),
            day_of_week: 0,
            hour_of_day: 0,
        };

        assert!(store.insert_anomaly_if_absent(&anomaly).await.unwrap());
        assert!(!store.insert_anomaly_if_absent(&anomaly).await.unwrap());
    }
}
