//! Latency baseline maintenance: an always-on sliding-window profiler and
//! an on-demand/periodic time-bucketed recalculator.

pub mod online;
pub mod recalculator;

pub use online::OnlineProfiler;
pub use recalculator::{RecalcMode, RecalcResult, Recalculator};
