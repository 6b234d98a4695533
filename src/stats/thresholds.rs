//! Adaptive per-bucket severity thresholds derived from positive-deviation
//! percentiles, plus the fixed defaults used when too few samples exist.

use serde::{Deserialize, Serialize};

use super::percentile::nearest_rank;

pub const MIN_SAMPLES_FOR_THRESHOLD: u64 = 10;

/// Five σ cutoffs, monotonically non-decreasing sev5 <= sev4 <= sev3 <= sev2 <= sev1.
/// Severity 1 ("Critical") is the highest bar; severity 5 ("Low") the lowest.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Thresholds {
    pub sev5: f64,
    pub sev4: f64,
    pub sev3: f64,
    pub sev2: f64,
    pub sev1: f64,
}

impl Thresholds {
    /// The greatest σ floor still exceeded by `deviation`, or `None` if below sev5.
    pub fn classify(&self, deviation: f64) -> Option<u8> {
        if deviation < self.sev5 {
            None
        } else if deviation >= self.sev1 {
            Some(1)
        } else if deviation >= self.sev2 {
            Some(2)
        } else if deviation >= self.sev3 {
            Some(3)
        } else if deviation >= self.sev4 {
            Some(4)
        } else {
            Some(5)
        }
    }

    pub fn at(&self, severity: u8) -> f64 {
        match severity {
            1 => self.sev1,
            2 => self.sev2,
            3 => self.sev3,
            4 => self.sev4,
            _ => self.sev5,
        }
    }
}

/// Default thresholds used whenever a bucket has fewer than
/// `MIN_SAMPLES_FOR_THRESHOLD` positive-deviation samples.
pub fn default_thresholds() -> Thresholds {
    Thresholds {
        sev5: 1.3,
        sev4: 1.65,
        sev3: 2.0,
        sev2: 2.6,
        sev1: 3.3,
    }
}

/// The fixed, stricter whale-detection table for amount anomalies.
pub fn whale_thresholds() -> Thresholds {
    Thresholds {
        sev5: 3.0,
        sev4: 4.0,
        sev3: 5.0,
        sev2: 6.0,
        sev1: 7.0,
    }
}

/// Derive adaptive thresholds from the raw deviations observed in a bucket.
/// Only positive deviations participate; each percentile is floored after
/// computation, never before. Falls back to the defaults when fewer than
/// [`MIN_SAMPLES_FOR_THRESHOLD`] positive samples are present.
pub fn thresholds_from_deviations(deviations: &[f64]) -> Thresholds {
    let mut positive: Vec<f64> = deviations.iter().copied().filter(|d| *d > 0.0).collect();
    if (positive.len() as u64) < MIN_SAMPLES_FOR_THRESHOLD {
        return default_thresholds();
    }
    positive.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let sev5 = nearest_rank(&positive, 0.80).max(0.5);
    let sev4 = nearest_rank(&positive, 0.90).max(1.0).max(sev5);
    let sev3 = nearest_rank(&positive, 0.95).max(1.5).max(sev4);
    let sev2 = nearest_rank(&positive, 0.99).max(2.0).max(sev3);
    let sev1 = nearest_rank(&positive, 0.999).max(2.5).max(sev2);

    Thresholds {
        sev5,
        sev4,
        sev3,
        sev2,
        sev1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_few_positive_samples_uses_defaults() {
        let deviations = vec![0.2, 0.5, -1.0, 1.0];
        let t = thresholds_from_deviations(&deviations);
        assert_eq!(t, default_thresholds());
    }

    #[test]
    fn thresholds_are_monotonic() {
        let deviations: Vec<f64> = (1..=50).map(|v| v as f64 * 0.1).collect();
        let t = thresholds_from_deviations(&deviations);
        assert!(t.sev5 <= t.sev4);
        assert!(t.sev4 <= t.sev3);
        assert!(t.sev3 <= t.sev2);
        assert!(t.sev2 <= t.sev1);
        assert!(t.sev5 >= 0.5);
        assert!(t.sev1 >= 2.5);
    }

    #[test]
    fn classification_boundary_example() {
        // mean=100ms, stdDev=20ms, duration=170ms -> deviation=3.5 -> severity 1
        let t = default_thresholds();
        let deviation = (170.0 - 100.0) / 20.0;
        assert_eq!(t.classify(deviation), Some(1));
    }

    #[test]
    fn classification_below_sev5_is_none() {
        let t = default_thresholds();
        assert_eq!(t.classify(0.5), None);
    }

    #[test]
    fn whale_table_matches_spec() {
        let t = whale_thresholds();
        assert_eq!(t.sev5, 3.0);
        assert_eq!(t.sev1, 7.0);
    }
}
