use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::analyzer::prompt::build_prompt;
use crate::correlator::CorrelationResult;
use crate::error::{AppError, Result};
use crate::metrics::MetricsSummary;
use crate::models::{Anomaly, Rating, SpanBaseline, TimeBaseline, Trace, TrainingExample};
use crate::profiler::recalculator::{RecalcMode, RecalcResult};
use crate::store::{AnomalyHistoryQuery, HourlyTrendBucket};

use super::AppState;

#[derive(Debug, Serialize)]
pub struct ServiceHealth {
    pub service: String,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub services: Vec<ServiceHealth>,
    pub last_polled: Option<DateTime<Utc>>,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let services: Vec<ServiceHealth> = state
        .detection
        .monitored_services
        .iter()
        .map(|s| ServiceHealth {
            service: s.clone(),
            status: state.latency_detector.service_health(s),
        })
        .collect();

    let status = if services.iter().any(|s| s.status == "critical") {
        "critical"
    } else if services.iter().any(|s| s.status == "warning") {
        "warning"
    } else {
        "healthy"
    };

    Json(HealthResponse {
        status,
        services,
        last_polled: state.latency_detector.last_polled(),
    })
}

pub async fn baselines(State(state): State<AppState>) -> Json<Vec<SpanBaseline>> {
    let mut baselines = state.profiler.all_baselines();
    baselines.sort_by(|a, b| b.sample_count.cmp(&a.sample_count));
    Json(baselines)
}

pub async fn anomalies(State(state): State<AppState>) -> Json<Vec<Anomaly>> {
    let mut all = state.latency_detector.active_anomalies();
    all.extend(state.amount_detector.active_anomalies());
    all.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    Json(all)
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub hours: Option<u32>,
    pub service: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub anomalies: Vec<Anomaly>,
    pub hourly_trend: Vec<HourlyTrendBucket>,
    pub total_count: u64,
}

pub async fn history(State(state): State<AppState>, Query(params): Query<HistoryQuery>) -> Result<Json<HistoryResponse>> {
    let hours = params.hours.unwrap_or(24);
    let query = AnomalyHistoryQuery {
        hours: Some(hours),
        service: params.service,
        limit: None,
    };

    let anomalies = state.store.get_anomaly_history(&query).await?;
    let hourly_trend = state.store.get_hourly_trend(hours).await?;
    let total_count = anomalies.len() as u64;

    Ok(Json(HistoryResponse { anomalies, hourly_trend, total_count }))
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeQuery {
    pub trace_id: String,
    pub anomaly_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub analysis: String,
    pub cached: bool,
    pub anomaly_id: Option<String>,
    pub trace: Option<Trace>,
}

/// Cached analysis if present; otherwise a one-shot LLM call on the
/// referenced anomaly, with the full trace fetched as auxiliary context.
pub async fn analyze(State(state): State<AppState>, Query(params): Query<AnalyzeQuery>) -> Result<Json<AnalyzeResponse>> {
    let trace = state.trace_client.fetch_trace(&params.trace_id).await?;

    if let Some(cached) = state.analysis_cache.get(&params.trace_id) {
        return Ok(Json(AnalyzeResponse {
            analysis: cached,
            cached: true,
            anomaly_id: params.anomaly_id,
            trace,
        }));
    }

    let anomaly = params.anomaly_id.as_ref().and_then(|id| {
        state
            .latency_detector
            .active_anomalies()
            .into_iter()
            .chain(state.amount_detector.active_anomalies())
            .find(|a| &a.id == id)
    });

    let prompt = match &anomaly {
        Some(a) => build_prompt(std::slice::from_ref(a)),
        None => format!("Summarize the trace {}.", params.trace_id),
    };

    let (chunk_tx, mut chunk_rx) = mpsc::channel::<String>(32);
    tokio::spawn(async move { while chunk_rx.recv().await.is_some() {} });

    let analysis = state.llm.generate_stream(&prompt, chunk_tx).await?;
    state.analysis_cache.insert(params.trace_id.clone(), analysis.clone());

    Ok(Json(AnalyzeResponse {
        analysis,
        cached: false,
        anomaly_id: params.anomaly_id,
        trace,
    }))
}

#[derive(Debug, Deserialize, Default)]
pub struct RecalculateRequest {
    pub full: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct RecalculateResponse {
    pub success: bool,
    pub message: String,
    pub baselines_count: usize,
    pub is_incremental: bool,
}

impl From<RecalcResult> for RecalculateResponse {
    fn from(r: RecalcResult) -> Self {
        Self {
            success: r.success,
            message: r.message,
            baselines_count: r.baselines_count,
            is_incremental: r.is_incremental,
        }
    }
}

pub async fn recalculate(State(state): State<AppState>, Json(req): Json<RecalculateRequest>) -> Json<RecalculateResponse> {
    let mode = if req.full.unwrap_or(false) { RecalcMode::Full } else { RecalcMode::Incremental };
    Json(state.recalculator.recalculate(mode).await.into())
}

#[derive(Debug, Serialize)]
pub struct TimeBaselinesResponse {
    pub baselines: Vec<TimeBaseline>,
    pub recalculating: bool,
}

pub async fn time_baselines(State(state): State<AppState>) -> Json<TimeBaselinesResponse> {
    Json(TimeBaselinesResponse {
        baselines: state.recalculator.all_time_baselines(),
        recalculating: state.recalculator.is_recalculating(),
    })
}

#[derive(Debug, Deserialize)]
pub struct CorrelateQuery {
    pub anomaly_id: Option<String>,
    pub service: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct CorrelateResponse {
    #[serde(flatten)]
    pub result: CorrelationResult,
    pub anomaly_id: Option<String>,
}

pub async fn correlate(State(state): State<AppState>, Query(params): Query<CorrelateQuery>) -> Json<CorrelateResponse> {
    let result = state.correlator.correlate(&params.service, params.timestamp).await;
    Json(CorrelateResponse { result, anomaly_id: params.anomaly_id })
}

pub async fn metrics_summary(State(state): State<AppState>) -> Json<MetricsSummary> {
    Json(state.metrics_registry.summary())
}

#[derive(Debug, Serialize)]
pub struct MetricsHealthResponse {
    pub enabled: bool,
    pub healthy: bool,
}

pub async fn metrics_health(State(state): State<AppState>) -> Json<MetricsHealthResponse> {
    let enabled = state.metrics_registry.config().enabled;
    Json(MetricsHealthResponse { enabled, healthy: enabled })
}

pub async fn prometheus_metrics() -> (StatusCode, String) {
    (StatusCode::OK, crate::metrics::gather_metrics())
}

#[derive(Debug, Deserialize)]
pub struct RateExampleRequest {
    pub anomaly: Anomaly,
    pub prompt: String,
    pub completion: String,
    pub rating: Rating,
    pub correction: Option<String>,
    pub notes: Option<String>,
}

pub async fn rate_example(State(state): State<AppState>, Json(req): Json<RateExampleRequest>) -> Json<TrainingExample> {
    let example = TrainingExample {
        id: Uuid::new_v4(),
        anomaly: req.anomaly,
        prompt: req.prompt,
        completion: req.completion,
        rating: req.rating,
        correction: req.correction,
        notes: req.notes,
        timestamp: Utc::now(),
    };
    state.training.lock().push(example.clone());
    Json(example)
}

#[derive(Debug, Serialize)]
pub struct TrainingStatsResponse {
    pub total: usize,
    pub good: usize,
    pub bad: usize,
}

pub async fn training_stats(State(state): State<AppState>) -> Json<TrainingStatsResponse> {
    let examples = state.training.lock();
    let good = examples.iter().filter(|e| e.rating == Rating::Good).count();
    let bad = examples.len() - good;
    Json(TrainingStatsResponse { total: examples.len(), good, bad })
}

pub async fn training_list(State(state): State<AppState>) -> Json<Vec<TrainingExample>> {
    Json(state.training.lock().clone())
}

pub async fn training_export_jsonl(State(state): State<AppState>) -> (StatusCode, String) {
    let examples = state.training.lock();
    let body = examples
        .iter()
        .map(|e| e.to_jsonl_record().to_string())
        .collect::<Vec<_>>()
        .join("\n");
    (StatusCode::OK, body)
}

pub async fn training_delete(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode> {
    let mut examples = state.training.lock();
    let before = examples.len();
    examples.retain(|e| e.id != id);
    if examples.len() == before {
        return Err(AppError::NotFound(format!("training example {id} not found")));
    }
    Ok(StatusCode::NO_CONTENT)
}
