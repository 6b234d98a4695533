//! Prometheus metrics exporter.
//!
//! Surfaces analysis throughput, per-severity event counts, stream analyzer
//! queue health, and per-worker cycle counts for the profiler, recalculator,
//! detectors, and correlator.

mod config;
mod registry;

pub use config::MetricsConfig;
pub use registry::{MetricsRegistry, MetricsSummary};

use lazy_static::lazy_static;
use prometheus::{CounterVec, Gauge, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry};

lazy_static! {
    pub static ref PROMETHEUS_REGISTRY: Registry = Registry::new();

    /// Total completed analyses. Labels: status (completed/failed), use_case.
    pub static ref ANALYSES_TOTAL: CounterVec = CounterVec::new(
        Opts::new("analyses_total", "Total number of stream analyses run")
            .namespace("tracewatch"),
        &["status", "use_case"]
    ).expect("Failed to create ANALYSES_TOTAL metric");

    /// Analysis duration in seconds, from dispatch to completion. Labels: use_case.
    pub static ref ANALYSIS_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "analysis_duration_seconds",
            "Stream analysis duration in seconds"
        )
        .namespace("tracewatch")
        .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0]),
        &["use_case"]
    ).expect("Failed to create ANALYSIS_DURATION_SECONDS metric");

    /// Total anomaly events observed, by severity tier. Labels: severity.
    pub static ref EVENTS_BY_SEVERITY_TOTAL: CounterVec = CounterVec::new(
        Opts::new("events_by_severity_total", "Total anomaly events by severity")
            .namespace("tracewatch"),
        &["severity"]
    ).expect("Failed to create EVENTS_BY_SEVERITY_TOTAL metric");

    /// Current depth of the stream analyzer's pending queue.
    pub static ref QUEUE_DEPTH: Gauge = Gauge::with_opts(
        Opts::new("queue_depth", "Current depth of the stream analyzer queue")
            .namespace("tracewatch")
    ).expect("Failed to create QUEUE_DEPTH metric");

    /// Total events dropped instead of enqueued. Labels: reason.
    pub static ref DROPPED_EVENTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("dropped_events_total", "Total anomaly events dropped")
            .namespace("tracewatch"),
        &["reason"]
    ).expect("Failed to create DROPPED_EVENTS_TOTAL metric");

    /// Completed work cycles per background worker. Labels: worker
    /// (profiler, recalculator, latency_detector, amount_detector, correlator).
    pub static ref WORKER_CYCLES_TOTAL: CounterVec = CounterVec::new(
        Opts::new("worker_cycles_total", "Total completed worker cycles")
            .namespace("tracewatch"),
        &["worker"]
    ).expect("Failed to create WORKER_CYCLES_TOTAL metric");

    /// Application build info. Labels: version, git_commit, build_timestamp.
    pub static ref BUILD_INFO: GaugeVec = GaugeVec::new(
        Opts::new("build_info", "Application build information")
            .namespace("tracewatch"),
        &["version", "git_commit", "build_timestamp"]
    ).expect("Failed to create BUILD_INFO metric");

    pub static ref UPTIME_SECONDS: Gauge = Gauge::with_opts(
        Opts::new("uptime_seconds", "Application uptime in seconds")
            .namespace("tracewatch")
    ).expect("Failed to create UPTIME_SECONDS metric");
}

/// Register every metric with the global registry. Call once at startup.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    PROMETHEUS_REGISTRY.register(Box::new(ANALYSES_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(ANALYSIS_DURATION_SECONDS.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(EVENTS_BY_SEVERITY_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(QUEUE_DEPTH.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(DROPPED_EVENTS_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(WORKER_CYCLES_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(BUILD_INFO.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(UPTIME_SECONDS.clone()))?;

    BUILD_INFO
        .with_label_values(&[
            env!("CARGO_PKG_VERSION"),
            option_env!("GIT_COMMIT").unwrap_or("unknown"),
            option_env!("BUILD_TIMESTAMP").unwrap_or("unknown"),
        ])
        .set(1.0);

    tracing::info!("prometheus metrics initialized");
    Ok(())
}

/// Render the registry in Prometheus text exposition format.
pub fn gather_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = PROMETHEUS_REGISTRY.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("failed to encode metrics: {}", e);
        return String::from("# Error encoding metrics\n");
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("failed to convert metrics to string: {}", e);
        String::from("# Error converting metrics\n")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initialization() {
        let result = init_metrics();
        assert!(result.is_ok() || result.is_err());
    }

    #[test]
    fn test_analyses_total() {
        ANALYSES_TOTAL.with_label_values(&["completed", "paymentGatewayDown"]).inc();
        let value = ANALYSES_TOTAL.with_label_values(&["completed", "paymentGatewayDown"]).get();
        assert!(value >= 1.0);
    }

    #[test]
    fn test_gather_metrics() {
        let metrics = gather_metrics();
        assert!(!metrics.is_empty());
        assert!(metrics.contains("tracewatch"));
    }
}
