//! Subscriber Bus: best-effort push-only fan-out to observers, directly
//! grounded on the teacher's `EventBroadcaster` (`tokio::sync::broadcast`
//! channel, envelope stats), simplified since there's no connection manager
//! or client->server protocol here — just a broadcast channel subscribers
//! attach to directly.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::models::Severity;

use super::events::{BusEvent, BusStats};

pub struct SubscriberBus {
    tx: broadcast::Sender<BusEvent>,
    stats: RwLock<BusStats>,
    heartbeat_interval_secs: u64,
}

impl SubscriberBus {
    pub fn new(capacity: usize, heartbeat_interval_secs: u64) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            stats: RwLock::new(BusStats::default()),
            heartbeat_interval_secs,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn stats(&self) -> BusStats {
        self.stats.read().clone()
    }

    pub async fn analysis_start(&self, anomaly_ids: Vec<String>) {
        self.publish(BusEvent::AnalysisStart {
            anomaly_ids,
            timestamp: Utc::now(),
        });
    }

    pub async fn stream_chunk(&self, data: String, anomaly_ids: Vec<String>) {
        self.publish(BusEvent::StreamChunk {
            data,
            anomaly_ids,
            timestamp: Utc::now(),
        });
    }

    pub async fn analysis_complete(&self, anomaly_ids: Vec<String>, final_text: String) {
        self.publish(BusEvent::AnalysisComplete {
            anomaly_ids,
            final_text,
            timestamp: Utc::now(),
        });
    }

    pub async fn alert(&self, severity: Severity, message: String, context: serde_json::Value) {
        self.publish(BusEvent::Alert {
            severity,
            message,
            context,
            timestamp: Utc::now(),
        });
    }

    /// Best-effort: a `SendError` just means nobody's subscribed right now.
    fn publish(&self, event: BusEvent) {
        self.stats.write().record(&event);
        if self.tx.send(event).is_err() {
            tracing::debug!("no subscribers attached to the subscriber bus");
        }
    }

    pub fn start_heartbeat(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(self.heartbeat_interval_secs));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.publish(BusEvent::Heartbeat {
                            clients: self.subscriber_count(),
                            timestamp: Utc::now(),
                        });
                    }
                    _ = cancel.cancelled() => {
                        info!("subscriber bus heartbeat stopping");
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

    #[tokio::test]
    async fn publish_is_received_by_all_subscribers() {
        let bus = SubscriberBus::new(16, 30);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.analysis_start(vec!["a1".to_string()]).await;

        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();
        assert_eq!(e1.kind(), "analysisStart");
        assert_eq!(e2.kind(), "analysisStart");
    }

    #[tokio::test]
    async fn publish_without_subscribers_does_not_panic() {
        let bus = SubscriberBus::new(16, 30);
        bus.alert(Severity::Critical, "test".to_string(), serde_json::json!({})).await;
        assert_eq!(bus.stats().total_events, 1);
    }

    #[tokio::test]
    async fn stats_reflect_published_events() {
        let bus = SubscriberBus::new(16, 30);
        bus.analysis_start(vec!["a1".to_string()]).await;
        bus.stream_chunk("chunk".to_string(), vec!["a1".to_string()]).await;
        bus.analysis_complete(vec!["a1".to_string()], "done".to_string()).await;

        let stats = bus.stats();
        assert_eq!(stats.total_events, 3);
    }
}
