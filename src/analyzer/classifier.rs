//! First-match-wins use-case classification for anomalies entering the
//! stream analyzer. Determines both the prompt's framing and which
//! anomalies escalate to an immediate alert ahead of normal batching.

use crate::models::Anomaly;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UseCase {
    PaymentGatewayDown,
    CertificateTls,
    RateLimitDos,
    AuthDown,
    CloudDegradation,
    QueueBacklog,
    ThirdPartyTimeout,
    Database,
    Generic,
}

impl UseCase {
    pub fn is_p0(&self) -> bool {
        matches!(
            self,
            UseCase::PaymentGatewayDown | UseCase::CertificateTls | UseCase::RateLimitDos | UseCase::AuthDown
        )
    }

    /// Metric label value for `use_case`.
    pub fn label(&self) -> &'static str {
        match self {
            UseCase::PaymentGatewayDown => "payment_gateway_down",
            UseCase::CertificateTls => "certificate_tls",
            UseCase::RateLimitDos => "rate_limit_dos",
            UseCase::AuthDown => "auth_down",
            UseCase::CloudDegradation => "cloud_degradation",
            UseCase::QueueBacklog => "queue_backlog",
            UseCase::ThirdPartyTimeout => "third_party_timeout",
            UseCase::Database => "database",
            UseCase::Generic => "generic",
        }
    }
}

const SECONDS_AS_MILLIS: f64 = 1000.0;

pub fn classify(anomaly: &Anomaly) -> UseCase {
    let service = anomaly.service.to_lowercase();
    let operation = anomaly.operation.to_lowercase();
    let status_code = anomaly
        .attributes
        .get("http.status_code")
        .and_then(|v| v.as_i64());
    let error_flag = anomaly.attributes.get("error").and_then(|v| v.as_bool()).unwrap_or(false);
    let error_message = anomaly
        .attributes
        .get("error.message")
        .and_then(|v| v.as_str())
        .map(|s| s.to_lowercase());

    if service.contains("payment") && (status_code.map(|c| c >= 500).unwrap_or(false) || error_flag) {
        return UseCase::PaymentGatewayDown;
    }

    if let Some(msg) = &error_message {
        if msg.contains("cert") || msg.contains("ssl") {
            return UseCase::CertificateTls;
        }
    }

    if service.contains("gateway") && status_code == Some(429) {
        return UseCase::RateLimitDos;
    }

    if service.contains("auth") && status_code.map(|c| c >= 500).unwrap_or(false) {
        return UseCase::AuthDown;
    }

    if anomaly.deviation > 5.0 && anomaly.value > 3.0 * anomaly.expected_mean {
        return UseCase::CloudDegradation;
    }

    if service.contains("matcher") || service.contains("order") {
        return UseCase::QueueBacklog;
    }

    if anomaly.value > 10.0 * SECONDS_AS_MILLIS && (operation.contains("external") || operation.contains("api")) {
        return UseCase::ThirdPartyTimeout;
    }

    if operation.contains("query") || operation.contains("db") {
        return UseCase::Database;
    }

    UseCase::Generic
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Attributes, Severity};
    use chrono::Utc;

    fn base_anomaly(service: &str, operation: &str) -> Anomaly {
        Anomaly {
            id: "a1".to_string(),
            trace_id: Some("t1".to_string()),
            span_id: Some("s1".to_string()),
            service: service.to_string(),
            operation: operation.to_string(),
            value: 100.0,
            expected_mean: 50.0,
            expected_std_dev: 10.0,
            deviation: 1.0,
            severity: Severity::Minor,
            timestamp: Utc::now(),
            attributes: Attributes::new(),
            day_of_week: 0,
            hour_of_day: 0,
        }
    }

    #[test]
    fn payment_service_with_5xx_is_payment_gateway_down() {
        let mut a = base_anomaly("payment-service", "charge");
        a.attributes.insert("http.status_code".to_string(), crate::models::attribute::AttributeValue::Int(502));
        assert_eq!(classify(&a), UseCase::PaymentGatewayDown);
        assert!(classify(&a).is_p0());
    }

    #[test]
    fn cert_error_message_is_certificate_tls() {
        let mut a = base_anomaly("api-gateway", "handshake");
        a.attributes.insert(
            "error.message".to_string(),
            crate::models::attribute::AttributeValue::String("SSL handshake failed".to_string()),
        );
        assert_eq!(classify(&a), UseCase::CertificateTls);
    }

    #[test]
    fn gateway_429_is_rate_limit_dos() {
        let mut a = base_anomaly("api-gateway", "route");
        a.attributes.insert("http.status_code".to_string(), crate::models::attribute::AttributeValue::Int(429));
        assert_eq!(classify(&a), UseCase::RateLimitDos);
    }

    #[test]
    fn large_deviation_and_duration_is_cloud_degradation() {
        let mut a = base_anomaly("kx-exchange", "place_order");
        a.deviation = 6.0;
        a.expected_mean = 50.0;
        a.value = 200.0;
        assert_eq!(classify(&a), UseCase::CloudDegradation);
    }

    #[test]
    fn matcher_service_is_queue_backlog() {
        let a = base_anomaly("kx-matcher", "match");
        assert_eq!(classify(&a), UseCase::QueueBacklog);
    }

    #[test]
    fn slow_external_call_is_third_party_timeout() {
        let mut a = base_anomaly("kx-wallet", "call_external_api");
        a.value = 12_000.0;
        assert_eq!(classify(&a), UseCase::ThirdPartyTimeout);
    }

    #[test]
    fn db_operation_is_database() {
        let a = base_anomaly("kx-wallet", "run_query");
        assert_eq!(classify(&a), UseCase::Database);
    }

    #[test]
    fn unmatched_anomaly_is_generic() {
        let a = base_anomaly("kx-exchange", "noop");
        assert_eq!(classify(&a), UseCase::Generic);
    }

    #[test]
    fn first_match_wins_over_later_rules() {
        // Matches both payment (rule 1) and database (rule 8, "query" in op);
        // rule 1 must win.
        let mut a = base_anomaly("payment-service", "run_query");
        a.attributes.insert("error".to_string(), crate::models::attribute::AttributeValue::Bool(true));
        assert_eq!(classify(&a), UseCase::PaymentGatewayDown);
    }
}
