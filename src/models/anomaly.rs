//! Anomalies: the unit emitted by both the latency detector and the amount
//! detector, and the unit the Stream Analyzer and Subscriber Bus operate on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::attribute::Attributes;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Critical = 1,
    Major = 2,
    Moderate = 3,
    Minor = 4,
    Low = 5,
}

impl Severity {
    pub fn from_tier(tier: u8) -> Option<Self> {
        match tier {
            1 => Some(Severity::Critical),
            2 => Some(Severity::Major),
            3 => Some(Severity::Moderate),
            4 => Some(Severity::Minor),
            5 => Some(Severity::Low),
            _ => None,
        }
    }

    pub fn tier(&self) -> u8 {
        *self as u8
    }

    pub fn name(&self) -> &'static str {
        match self {
            Severity::Critical => "Critical",
            Severity::Major => "Major",
            Severity::Moderate => "Moderate",
            Severity::Minor => "Minor",
            Severity::Low => "Low",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    /// `"{traceId}-{spanId}"` for latency anomalies, `"{reference}-{timestamp}"` for amounts.
    pub id: String,
    pub trace_id: Option<String>,
    pub span_id: Option<String>,
    pub service: String,
    pub operation: String,
    pub value: f64,
    pub expected_mean: f64,
    pub expected_std_dev: f64,
    pub deviation: f64,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub attributes: Attributes,
    pub day_of_week: u8,
    pub hour_of_day: u8,
}

impl Anomaly {
    pub fn severity_name(&self) -> &'static str {
        self.severity.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering_puts_critical_first() {
        assert!(Severity::Critical < Severity::Low);
        assert!(Severity::Major < Severity::Moderate);
    }

    #[test]
    fn severity_round_trips_through_tier() {
        for tier in 1..=5u8 {
            let sev = Severity::from_tier(tier).unwrap();
            assert_eq!(sev.tier(), tier);
        }
        assert!(Severity::from_tier(0).is_none());
        assert!(Severity::from_tier(6).is_none());
    }
}
