//! Prompt templating for batched anomaly analysis.

use crate::models::Anomaly;

const PREAMBLE: &str =
    "The following anomalies were detected in production traces. Explain the likely cause and impact in a few sentences.";

/// `"{preamble}\n1. [SEV{n}] {service}:{operation} {duration}ms (+{sigma}σ) HTTP {code?}"`
pub fn build_prompt(anomalies: &[Anomaly]) -> String {
    let mut lines = Vec::with_capacity(anomalies.len() + 1);
    lines.push(PREAMBLE.to_string());

    for (i, anomaly) in anomalies.iter().enumerate() {
        let status = anomaly
            .attributes
            .get("http.status_code")
            .and_then(|v| v.as_i64())
            .map(|c| format!(" HTTP {c}"))
            .unwrap_or_default();

        lines.push(format!(
            "{}. [SEV{}] {}:{} {:.0}ms (+{:.1}σ){}",
            i + 1,
            anomaly.severity.tier(),
            anomaly.service,
            anomaly.operation,
            anomaly.value,
            anomaly.deviation,
            status,
        ));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Attributes, Severity};
    use chrono::Utc;

    fn anomaly() -> Anomaly {
        Anomaly {
            id: "a1".to_string(),
            trace_id: Some("t1".to_string()),
            span_id: Some("s1".to_string()),
            service: "kx-exchange".to_string(),
            operation: "place_order".to_string(),
            value: 170.0,
            expected_mean: 100.0,
            expected_std_dev: 20.0,
            deviation: 3.5,
            severity: Severity::Critical,
            timestamp: Utc::now(),
            attributes: Attributes::new(),
            day_of_week: 0,
            hour_of_day: 0,
        }
    }

    #[test]
    fn single_anomaly_line_matches_format() {
        let prompt = build_prompt(&[anomaly()]);
        let line = prompt.lines().nth(1).unwrap();
        assert_eq!(line, "1. [SEV1] kx-exchange:place_order 170ms (+3.5σ)");
    }

    #[test]
    fn status_code_is_appended_when_present() {
        let mut a = anomaly();
        a.attributes.insert("http.status_code".to_string(), crate::models::attribute::AttributeValue::Int(503));
        let prompt = build_prompt(&[a]);
        assert!(prompt.lines().nth(1).unwrap().ends_with("HTTP 503"));
    }

    #[test]
    fn multiple_anomalies_are_numbered_in_order() {
        let prompt = build_prompt(&[anomaly(), anomaly()]);
        assert!(prompt.lines().any(|l| l.starts_with("1. ")));
        assert!(prompt.lines().any(|l| l.starts_with("2. ")));
    }
}
