//! Metrics registry lifecycle: init at startup, export on demand.

use super::*;

pub struct MetricsRegistry {
    config: MetricsConfig,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self { config: MetricsConfig::default() }
    }

    pub fn with_config(config: MetricsConfig) -> Self {
        Self { config }
    }

    pub fn init(&self) -> Result<(), prometheus::Error> {
        if self.config.enabled {
            init_metrics()?;
        }
        Ok(())
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    pub fn export(&self) -> String {
        gather_metrics()
    }

    pub fn summary(&self) -> MetricsSummary {
        let metrics_text = self.export();

        let mut counter_count = 0;
        let mut gauge_count = 0;
        let mut histogram_count = 0;

        for line in metrics_text.lines() {
            if line.starts_with("# TYPE") {
                if line.contains("counter") {
                    counter_count += 1;
                } else if line.contains("gauge") {
                    gauge_count += 1;
                } else if line.contains("histogram") {
                    histogram_count += 1;
                }
            }
        }

        MetricsSummary {
            enabled: self.config.enabled,
            total_metrics: counter_count + gauge_count + histogram_count,
            counter_count,
            gauge_count,
            histogram_count,
        }
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub enabled: bool,
    pub total_metrics: usize,
    pub counter_count: usize,
    pub gauge_count: usize,
    pub histogram_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_creation() {
        let registry = MetricsRegistry::new();
        assert!(registry.config().enabled);
    }

    #[test]
    fn test_registry_with_config() {
        let registry = MetricsRegistry::with_config(MetricsConfig::disabled());
        assert!(!registry.config().enabled);
    }

    #[test]
    fn test_registry_export() {
        let registry = MetricsRegistry::new();
        let metrics = registry.export();
        assert!(!metrics.is_empty());
        assert!(metrics.contains("tracewatch"));
    }

    #[test]
    fn test_metrics_summary() {
        let registry = MetricsRegistry::new();
        let _ = registry.init();

        let summary = registry.summary();
        assert!(summary.total_metrics > 0);
        assert!(summary.counter_count > 0);
        assert!(summary.gauge_count > 0);
        assert!(summary.histogram_count > 0);
    }
}
