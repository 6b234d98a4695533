//! Per-service recalculation watermark, advanced only after a successful upsert.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProcessingStatus {
    Idle,
    Running,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecalculationWatermark {
    pub service: String,
    /// Absolute, monotone non-decreasing across successful runs.
    pub last_trace_time_micros: i64,
    pub processing_status: ProcessingStatus,
}

impl RecalculationWatermark {
    pub fn fresh(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            last_trace_time_micros: 0,
            processing_status: ProcessingStatus::Idle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_watermark_starts_at_zero() {
        let w = RecalculationWatermark::fresh("kx-exchange");
        assert_eq!(w.last_trace_time_micros, 0);
        assert_eq!(w.processing_status, ProcessingStatus::Idle);
    }
}
