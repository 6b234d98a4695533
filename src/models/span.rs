//! Transient span/trace shapes pulled from the trace backend. Only live
//! while a fetch-and-process cycle is running; never persisted as-is.

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

use super::attribute::Attributes;

/// Derive `(dayOfWeek, hourOfDay)` from an absolute microsecond timestamp,
/// normalized to UTC (Monday = 0 .. Sunday = 6) rather than the process's
/// local time zone, so bucketing is deterministic across environments.
pub fn day_and_hour(start_time_micros: i64) -> (u8, u8) {
    let dt: DateTime<Utc> = Utc
        .timestamp_micros(start_time_micros)
        .single()
        .unwrap_or_else(Utc::now);
    (dt.weekday().num_days_from_monday() as u8, dt.hour() as u8)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: Option<String>,
    pub service: String,
    pub operation: String,
    /// Absolute start time, microseconds since epoch (as supplied by the backend).
    pub start_time_micros: i64,
    /// Duration in microseconds (as supplied by the backend); non-negative.
    pub duration_micros: i64,
    pub attributes: Attributes,
}

impl Span {
    pub fn span_key(&self) -> String {
        format!("{}:{}", self.service, self.operation)
    }

    pub fn duration_ms(&self) -> f64 {
        self.duration_micros as f64 / 1000.0
    }

    pub fn anomaly_id(&self) -> String {
        format!("{}-{}", self.trace_id, self.span_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    pub trace_id: String,
    pub spans: Vec<Span>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sample_span() -> Span {
        Span {
            trace_id: "t1".to_string(),
            span_id: "s1".to_string(),
            parent_span_id: None,
            service: "payment-service".to_string(),
            operation: "charge".to_string(),
            start_time_micros: 0,
            duration_micros: 170_000,
            attributes: HashMap::new(),
        }
    }

    #[test]
    fn span_key_combines_service_and_operation() {
        assert_eq!(sample_span().span_key(), "payment-service:charge");
    }

    #[test]
    fn duration_ms_converts_from_micros() {
        assert_eq!(sample_span().duration_ms(), 170.0);
    }

    #[test]
    fn anomaly_id_is_stable_for_same_span() {
        let span = sample_span();
        assert_eq!(span.anomaly_id(), sample_span().anomaly_id());
        assert_eq!(span.anomaly_id(), "t1-s1");
    }
}
