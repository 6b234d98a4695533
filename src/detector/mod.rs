//! Near-real-time outlier detection: latency spans against time-bucketed
//! baselines, and transaction amounts against a stricter whale table.

pub mod amount;
pub mod latency;

pub use amount::AmountDetector;
pub use latency::LatencyDetector;

use async_trait::async_trait;

use crate::models::Anomaly;

/// The Stream Analyzer's enqueue contract, consumed by both detectors so
/// neither depends on `analyzer` directly.
#[async_trait]
pub trait AnomalyEnqueuer: Send + Sync {
    async fn enqueue(&self, anomaly: Anomaly);
}

pub struct NullEnqueuer;

#[async_trait]
impl AnomalyEnqueuer for NullEnqueuer {
    async fn enqueue(&self, _anomaly: Anomaly) {}
}
