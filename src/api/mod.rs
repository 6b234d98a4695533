//! Control Surface: read/write HTTP operations over the pipeline's live
//! state, built the way the teacher wires its own `AppState` + axum
//! `Router`, with `tower_http` tracing and permissive CORS.

pub mod handlers;
pub mod routes;

pub use routes::build_router;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::adapters::{LlmClient, TraceBackendClient};
use crate::analyzer::StreamAnalyzer;
use crate::bus::SubscriberBus;
use crate::config::DetectionConfig;
use crate::correlator::MetricsCorrelator;
use crate::detector::{AmountDetector, LatencyDetector};
use crate::metrics::MetricsRegistry;
use crate::models::TrainingExample;
use crate::profiler::{OnlineProfiler, Recalculator};
use crate::store::{AnalysisCache, HistoryStore};

/// Shared application state for every Control Surface handler.
#[derive(Clone)]
pub struct AppState {
    pub detection: DetectionConfig,
    pub store: Arc<dyn HistoryStore>,
    pub trace_client: TraceBackendClient,
    pub llm: LlmClient,
    pub profiler: Arc<OnlineProfiler>,
    pub recalculator: Arc<Recalculator>,
    pub latency_detector: Arc<LatencyDetector>,
    pub amount_detector: Arc<AmountDetector>,
    pub correlator: Arc<MetricsCorrelator>,
    pub analyzer: Arc<StreamAnalyzer>,
    pub bus: Arc<SubscriberBus>,
    pub metrics_registry: Arc<MetricsRegistry>,
    pub analysis_cache: Arc<AnalysisCache<String, String>>,
    pub training: Arc<Mutex<Vec<TrainingExample>>>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        detection: DetectionConfig,
        store: Arc<dyn HistoryStore>,
        trace_client: TraceBackendClient,
        llm: LlmClient,
        profiler: Arc<OnlineProfiler>,
        recalculator: Arc<Recalculator>,
        latency_detector: Arc<LatencyDetector>,
        amount_detector: Arc<AmountDetector>,
        correlator: Arc<MetricsCorrelator>,
        analyzer: Arc<StreamAnalyzer>,
        bus: Arc<SubscriberBus>,
        metrics_registry: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            detection,
            store,
            trace_client,
            llm,
            profiler,
            recalculator,
            latency_detector,
            amount_detector,
            correlator,
            analyzer,
            bus,
            metrics_registry,
            analysis_cache: Arc::new(AnalysisCache::new(100)),
            training: Arc::new(Mutex::new(Vec::new())),
            started_at: Utc::now(),
        }
    }
}
