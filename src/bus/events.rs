//! Subscriber Bus event payloads and delivery statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Severity;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BusEvent {
    AnalysisStart {
        anomaly_ids: Vec<String>,
        timestamp: DateTime<Utc>,
    },
    StreamChunk {
        data: String,
        anomaly_ids: Vec<String>,
        timestamp: DateTime<Utc>,
    },
    AnalysisComplete {
        anomaly_ids: Vec<String>,
        final_text: String,
        timestamp: DateTime<Utc>,
    },
    Alert {
        severity: Severity,
        message: String,
        context: serde_json::Value,
        timestamp: DateTime<Utc>,
    },
    Heartbeat {
        clients: usize,
        timestamp: DateTime<Utc>,
    },
}

impl BusEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            BusEvent::AnalysisStart { .. } => "analysisStart",
            BusEvent::StreamChunk { .. } => "streamChunk",
            BusEvent::AnalysisComplete { .. } => "analysisComplete",
            BusEvent::Alert { .. } => "alert",
            BusEvent::Heartbeat { .. } => "heartbeat",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BusStats {
    pub total_events: u64,
    pub events_by_type: std::collections::HashMap<String, u64>,
    pub last_event_time: Option<DateTime<Utc>>,
}

impl BusStats {
    pub fn record(&mut self, event: &BusEvent) {
        self.total_events += 1;
        *self.events_by_type.entry(event.kind().to_string()).or_insert(0) += 1;
        self.last_event_time = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_tally_events_by_kind() {
        let mut stats = BusStats::default();
        stats.record(&BusEvent::AnalysisStart {
            anomaly_ids: vec!["a1".to_string()],
            timestamp: Utc::now(),
        });
        stats.record(&BusEvent::AnalysisStart {
            anomaly_ids: vec!["a2".to_string()],
            timestamp: Utc::now(),
        });
        stats.record(&BusEvent::Heartbeat { clients: 0, timestamp: Utc::now() });

        assert_eq!(stats.total_events, 3);
        assert_eq!(*stats.events_by_type.get("analysisStart").unwrap(), 2);
        assert!(stats.last_event_time.is_some());
    }
}
