use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tracewatch::adapters::{LlmClient, MetricsBackendClient, TraceBackendClient};
use tracewatch::analyzer::StreamAnalyzer;
use tracewatch::api::{build_router, AppState};
use tracewatch::bus::SubscriberBus;
use tracewatch::config::Config;
use tracewatch::correlator::MetricsCorrelator;
use tracewatch::detector::{AmountDetector, LatencyDetector};
use tracewatch::metrics::MetricsRegistry;
use tracewatch::profiler::{OnlineProfiler, Recalculator};
use tracewatch::store::create_store;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tracewatch=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;

    tracing::info!("Starting tracewatch v{}", env!("CARGO_PKG_VERSION"));

    let metrics_registry = Arc::new(MetricsRegistry::new());
    if let Err(e) = metrics_registry.init() {
        tracing::warn!(error = %e, "failed to initialize metrics, continuing without them");
    } else {
        tracing::info!("metrics initialized");
    }

    tracing::info!(backend = ?config.state.backend, "initializing storage backend");
    let store = create_store(&config.state).await?;
    tracing::info!("storage backend ready");

    let trace_client = TraceBackendClient::new(
        config.backends.trace_backend_url.clone(),
        config.backends.backend_timeout_secs,
    )?;
    let metrics_client = MetricsBackendClient::new(
        config.backends.metrics_backend_url.clone(),
        config.backends.backend_timeout_secs,
    )?;
    let llm = LlmClient::new(
        config.backends.llm_url.clone(),
        config.backends.llm_model.clone(),
        config.backends.backend_timeout_secs,
    )?;

    let cancel = CancellationToken::new();

    let profiler = Arc::new(OnlineProfiler::new(
        trace_client.clone(),
        config.detection.clone(),
        &config.cadences,
    ));

    let recalculator = Arc::new(Recalculator::new(
        store.clone(),
        trace_client.clone(),
        config.detection.clone(),
    ));
    recalculator.load_from_store().await?;
    tracing::info!("time baselines loaded from store");

    let bus = Arc::new(SubscriberBus::new(256, config.cadences.heartbeat_interval_secs));

    let analyzer = Arc::new(StreamAnalyzer::new(
        llm.clone(),
        bus.clone(),
        config.analyzer.queue_size,
        config.analyzer.batch_size,
        config.analyzer.batch_timeout_secs,
    ));

    let latency_detector = Arc::new(LatencyDetector::new(
        trace_client.clone(),
        config.detection.clone(),
        recalculator.clone(),
        profiler.clone(),
        store.clone(),
        analyzer.clone(),
        &config.cadences,
    ));

    let amount_detector = Arc::new(AmountDetector::new(
        config.detection.clone(),
        store.clone(),
        analyzer.clone(),
        &config.cadences,
    ));

    let correlator = Arc::new(MetricsCorrelator::new(metrics_client));

    tracing::info!("all workers constructed, starting background tasks");

    let profiler_handle = profiler.clone().start(cancel.clone());
    let latency_handle = latency_detector.clone().start(cancel.clone());
    let amount_handle = if config.detection.enable_amount_anomaly_detection {
        Some(amount_detector.clone().start(cancel.clone()))
    } else {
        tracing::info!("amount anomaly detection disabled in configuration");
        None
    };
    let analyzer_handle = analyzer.clone().start(cancel.clone());
    let heartbeat_handle = bus.clone().start_heartbeat(cancel.clone());

    let app_state = AppState::new(
        config.detection.clone(),
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
    );

    let app = build_router(app_state);

    let http_addr = format!("{}:{}", config.server.host, config.server.http_port);
    let listener = tokio::net::TcpListener::bind(&http_addr).await?;
    tracing::info!("Control Surface listening on http://{}", http_addr);
    tracing::info!("  Health check: http://{}/health", http_addr);
    tracing::info!("  Metrics: http://{}/metrics", http_addr);

    let http_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "HTTP server error");
        }
    });

    tokio::select! {
        _ = http_handle => {
            tracing::warn!("HTTP server stopped unexpectedly");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    tracing::info!("shutting down workers");
    cancel.cancel();

    for handle in [profiler_handle, latency_handle, analyzer_handle, heartbeat_handle] {
        let _ = handle.await;
    }
    if let Some(handle) = amount_handle {
        let _ = handle.await;
    }

    tracing::info!("shutdown complete");
    Ok(())
}
