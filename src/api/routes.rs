use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

use super::{handlers, AppState};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/baselines", get(handlers::baselines))
        .route("/anomalies", get(handlers::anomalies))
        .route("/history", get(handlers::history))
        .route("/analyze", get(handlers::analyze))
        .route("/recalculate", post(handlers::recalculate))
        .route("/time-baselines", get(handlers::time_baselines))
        .route("/correlate", get(handlers::correlate))
        .route("/metrics/summary", get(handlers::metrics_summary))
        .route("/metrics/health", get(handlers::metrics_health))
        .route("/metrics", get(handlers::prometheus_metrics))
        .route("/training/examples", post(handlers::rate_example))
        .route("/training/examples", get(handlers::training_list))
        .route("/training/examples/:id", delete(handlers::training_delete))
        .route("/training/stats", get(handlers::training_stats))
        .route("/training/export.jsonl", get(handlers::training_export_jsonl))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
}
