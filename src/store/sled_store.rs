//! Sled-backed `HistoryStore`: one tree per entity, bincode-serialized,
//! directly grounded on the teacher's `SledStore` (per-entity tree, flush
//! after every write for durability).

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use sled::{Db, Tree};

use crate::error::{AppError, Result};
use crate::models::{Anomaly, RecalculationWatermark, SpanBaseline, TimeBaseline};

use super::{
    truncate_to_hour, AnomalyHistoryQuery, HistoryStore, HourlyTrendBucket,
    DEFAULT_ANOMALY_HISTORY_LIMIT,
};

#[derive(Clone)]
pub struct SledHistoryStore {
    db: Arc<Db>,
    span_baselines: Tree,
    time_baselines: Tree,
    anomalies: Tree,
    watermarks: Tree,
}

impl SledHistoryStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(&path)?;
        let span_baselines = db.open_tree("span_baselines")?;
        let time_baselines = db.open_tree("time_baselines")?;
        let anomalies = db.open_tree("anomalies")?;
        let watermarks = db.open_tree("watermarks")?;

        tracing::info!(path = ?path.as_ref(), "initialized Sled history store");

        Ok(Self {
            db: Arc::new(db),
            span_baselines,
            time_baselines,
            anomalies,
            watermarks,
        })
    }

    pub async fn flush(&self) -> Result<()> {
        self.db.flush_async().await?;
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for SledHistoryStore {
    async fn upsert_span_baselines(&self, baselines: &[SpanBaseline]) -> Result<()> {
        for baseline in baselines {
            let value = bincode::serialize(baseline).map_err(|e| AppError::Serialization(e.to_string()))?;
            self.span_baselines.insert(baseline.span_key.as_bytes(), value)?;
        }
        self.span_baselines.flush()?;
        Ok(())
    }

    async fn upsert_time_baselines(&self, baselines: &[TimeBaseline]) -> Result<()> {
        for baseline in baselines {
            let value = bincode::serialize(baseline).map_err(|e| AppError::Serialization(e.to_string()))?;
            self.time_baselines.insert(baseline.key().as_bytes(), value)?;
        }
        self.time_baselines.flush()?;
        Ok(())
    }

    async fn get_span_baselines(&self) -> Result<Vec<SpanBaseline>> {
        let mut result = Vec::new();
        for entry in self.span_baselines.iter() {
            let (_, value) = entry?;
            result.push(bincode::deserialize(&value).map_err(|e| AppError::Serialization(e.to_string()))?);
        }
        result.sort_by(|a: &SpanBaseline, b: &SpanBaseline| b.sample_count.cmp(&a.sample_count));
        Ok(result)
    }

    async fn get_time_baselines(&self) -> Result<Vec<TimeBaseline>> {
        let mut result = Vec::new();
        for entry in self.time_baselines.iter() {
            let (_, value) = entry?;
            result.push(bincode::deserialize(&value).map_err(|e| AppError::Serialization(e.to_string()))?);
        }
        Ok(result)
    }

    async fn insert_anomaly_if_absent(&self, anomaly: &Anomaly) -> Result<bool> {
        let key = anomaly.id.as_bytes();
        if self.anomalies.contains_key(key)? {
            return Ok(false);
        }
        let value = bincode::serialize(anomaly).map_err(|e| AppError::Serialization(e.to_string()))?;
        self.anomalies.insert(key, value)?;
        self.anomalies.flush()?;
        Ok(true)
    }

    async fn get_anomaly_history(&self, query: &AnomalyHistoryQuery) -> Result<Vec<Anomaly>> {
        let cutoff = query
            .hours
            .map(|h| chrono::Utc::now() - chrono::Duration::hours(h as i64));
        let limit = query.limit.unwrap_or(DEFAULT_ANOMALY_HISTORY_LIMIT) as usize;

        let mut anomalies = Vec::new();
        for entry in self.anomalies.iter() {
            let (_, value) = entry?;
            let anomaly: Anomaly =
                bincode::deserialize(&value).map_err(|e| AppError::Serialization(e.to_string()))?;

            if let Some(cutoff) = cutoff {
                if anomaly.timestamp < cutoff {
                    continue;
                }
            }
            if let Some(ref service) = query.service {
                if &anomaly.service != service {
                    continue;
                }
            }
            anomalies.push(anomaly);
        }

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

        for entry in self.anomalies.iter() {
            let (_, value) = entry?;
            let anomaly: Anomaly =
                bincode::deserialize(&value).map_err(|e| AppError::Serialization(e.to_string()))?;
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
        let value = bincode::serialize(watermark).map_err(|e| AppError::Serialization(e.to_string()))?;
        self.watermarks.insert(watermark.service.as_bytes(), value)?;
        self.watermarks.flush()?;
        Ok(())
    }

    async fn get_watermark(&self, service: &str) -> Result<Option<RecalculationWatermark>> {
        match self.watermarks.get(service.as_bytes())? {
            Some(bytes) => Ok(Some(
                bincode::deserialize(&bytes).map_err(|e| AppError::Serialization(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    async fn clear_watermarks(&self) -> Result<()> {
        self.watermarks.clear()?;
        self.watermarks.flush()?;
        Ok(())
    }
}
