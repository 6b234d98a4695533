//! Online and batch statistics shared by the profiler and detector subsystems.

pub mod percentile;
pub mod thresholds;
pub mod welford;

pub use percentile::{nearest_rank, BatchStats};
pub use thresholds::{default_thresholds, thresholds_from_deviations, Thresholds};
pub use welford::Welford;
