//! Batch statistics over a fixed window of samples: nearest-rank percentiles
//! plus the mean/stddev/min/max the profiler and recalculator upsert as baselines.

use serde::{Deserialize, Serialize};

/// Nearest-rank percentile: `index = floor(n * p)`, clamped to the last element.
/// `sorted` must already be sorted ascending.
pub fn nearest_rank(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() as f64) * p).floor() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Summary statistics computed over one batch of samples (a sliding window,
/// not an incremental accumulator — this is what the Online Profiler and
/// Recalculator recompute from scratch each run).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BatchStats {
    pub mean: f64,
    pub std_dev: f64,
    pub variance: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub min: f64,
    pub max: f64,
    pub sample_count: u64,
}

impl BatchStats {
    /// Two-pass statistics (mean first, then variance) over an unsorted batch.
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let variance = samples.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let std_dev = variance.sqrt();

        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());

        Some(Self {
            mean,
            std_dev,
            variance,
            p50: nearest_rank(&sorted, 0.50),
            p95: nearest_rank(&sorted, 0.95),
            p99: nearest_rank(&sorted, 0.99),
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            sample_count: samples.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_rank_boundaries() {
        let sorted: Vec<f64> = (1..=10).map(|v| v as f64).collect();
        assert_eq!(nearest_rank(&sorted, 0.0), 1.0);
        assert_eq!(nearest_rank(&sorted, 0.5), 6.0);
        assert_eq!(nearest_rank(&sorted, 0.99), 10.0);
    }

    #[test]
    fn nearest_rank_empty_is_zero() {
        assert_eq!(nearest_rank(&[], 0.5), 0.0);
    }

    #[test]
    fn batch_stats_ordering_invariant() {
        let samples = vec![5.0, 1.0, 9.0, 3.0, 7.0, 2.0, 8.0, 4.0, 6.0, 10.0];
        let stats = BatchStats::from_samples(&samples).unwrap();
        assert!(stats.min <= stats.p50);
        assert!(stats.p50 <= stats.p95);
        assert!(stats.p95 <= stats.p99);
        assert!(stats.p99 <= stats.max);
        assert!((stats.std_dev - stats.variance.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn batch_stats_empty_is_none() {
        assert!(BatchStats::from_samples(&[]).is_none());
    }
}
