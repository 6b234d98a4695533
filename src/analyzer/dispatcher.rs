//! Stream Analyzer: batches anomalies into LLM-narrated explanations.
//!
//! Grounded on the teacher's `NotificationService` (bounded queue, a
//! dedicated dispatch loop, serialized delivery) but dropping instead of
//! blocking on overflow, and dispatching on a size/time trigger instead of
//! draining one item per tick.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::adapters::LlmClient;
use crate::bus::SubscriberBus;
use crate::detector::AnomalyEnqueuer;
use crate::metrics::{ANALYSES_TOTAL, ANALYSIS_DURATION_SECONDS, DROPPED_EVENTS_TOTAL, EVENTS_BY_SEVERITY_TOTAL, QUEUE_DEPTH};
use crate::models::{Anomaly, Severity};

use super::classifier::{classify, UseCase};
use super::prompt::build_prompt;

pub struct StreamAnalyzer {
    llm: LlmClient,
    bus: Arc<SubscriberBus>,
    queue: Mutex<VecDeque<Anomaly>>,
    capacity: usize,
    batch_size: usize,
    batch_timeout: Duration,
    pending_since: Mutex<Option<Instant>>,
    is_processing: AtomicBool,
    tick_interval: Duration,
}

impl StreamAnalyzer {
    pub fn new(llm: LlmClient, bus: Arc<SubscriberBus>, capacity: usize, batch_size: usize, batch_timeout_secs: u64) -> Self {
        Self {
            llm,
            bus,
            queue: Mutex::new(VecDeque::new()),
            capacity,
            batch_size,
            batch_timeout: Duration::from_secs(batch_timeout_secs),
            pending_since: Mutex::new(None),
            is_processing: AtomicBool::new(false),
            tick_interval: Duration::from_secs(1),
        }
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.lock().len()
    }

    fn enqueue_one(&self, anomaly: Anomaly) {
        let use_case = classify(&anomaly);
        EVENTS_BY_SEVERITY_TOTAL.with_label_values(&[anomaly.severity_name()]).inc();

        {
            let mut queue = self.queue.lock();
            if queue.len() >= self.capacity {
                drop(queue);
                DROPPED_EVENTS_TOTAL.with_label_values(&["queue_full"]).inc();
                warn!(anomaly_id = %anomaly.id, "stream analyzer queue full, dropping anomaly");
                return;
            }
            if queue.is_empty() {
                *self.pending_since.lock() = Some(Instant::now());
            }
            queue.push_back(anomaly.clone());
            QUEUE_DEPTH.set(queue.len() as f64);
        }

        if use_case.is_p0() {
            let bus = self.bus.clone();
            let message = format!("{} breach on {}:{}", use_case.label(), anomaly.service, anomaly.operation);
            let context = serde_json::json!({
                "anomalyId": anomaly.id,
                "useCase": use_case.label(),
                "service": anomaly.service,
                "operation": anomaly.operation,
            });
            tokio::spawn(async move {
                bus.alert(Severity::Critical, message, context).await;
            });
        }
    }

    fn should_dispatch(&self) -> bool {
        let queue_len = self.queue.lock().len();
        if queue_len == 0 {
            return false;
        }
        if queue_len >= self.batch_size {
            return true;
        }
        match *self.pending_since.lock() {
            Some(since) => since.elapsed() >= self.batch_timeout,
            None => false,
        }
    }

    fn take_batch(&self) -> Vec<Anomaly> {
        let mut queue = self.queue.lock();
        let n = self.batch_size.min(queue.len());
        let batch: Vec<Anomaly> = queue.drain(..n).collect();
        *self.pending_since.lock() = if queue.is_empty() { None } else { Some(Instant::now()) };
        QUEUE_DEPTH.set(queue.len() as f64);
        batch
    }

    async fn dispatch_batch(self: &Arc<Self>) {
        if self.is_processing.swap(true, Ordering::SeqCst) {
            return;
        }

        loop {
            if !self.should_dispatch() {
                break;
            }

            let batch = self.take_batch();
            if batch.is_empty() {
                break;
            }

            let anomaly_ids: Vec<String> = batch.iter().map(|a| a.id.clone()).collect();
            let use_case = batch.first().map(classify).unwrap_or(UseCase::Generic);
            let prompt = build_prompt(&batch);

            self.bus.analysis_start(anomaly_ids.clone()).await;

            let started = Instant::now();
            let (chunk_tx, mut chunk_rx) = mpsc::channel::<String>(32);
            let bus_for_chunks = self.bus.clone();
            let ids_for_chunks = anomaly_ids.clone();
            let forward = tokio::spawn(async move {
                while let Some(chunk) = chunk_rx.recv().await {
                    bus_for_chunks.stream_chunk(chunk, ids_for_chunks.clone()).await;
                }
            });

            let result = self.llm.generate_stream(&prompt, chunk_tx).await;
            let _ = forward.await;

            ANALYSIS_DURATION_SECONDS
                .with_label_values(&[use_case.label()])
                .observe(started.elapsed().as_secs_f64());

            match result {
                Ok(full_response) => {
                    ANALYSES_TOTAL.with_label_values(&["completed", use_case.label()]).inc();
                    self.bus.analysis_complete(anomaly_ids, full_response).await;
                }
                Err(e) => {
                    ANALYSES_TOTAL.with_label_values(&["failed", use_case.label()]).inc();
                    error!(error = %e, "stream analysis failed");
                    self.bus.analysis_complete(anomaly_ids, format!("Analysis failed: {e}")).await;
                }
            }
        }

        self.is_processing.store(false, Ordering::SeqCst);
    }

    pub fn start(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.tick_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if self.should_dispatch() {
                            self.dispatch_batch().await;
                        }
                    }
                    _ = cancel.cancelled() => {
                        info!("stream analyzer stopping");
                        break;
                    }
                }
            }
        })
    }
}

#[async_trait::async_trait]
impl AnomalyEnqueuer for StreamAnalyzer {
    async fn enqueue(&self, anomaly: Anomaly) {
        self.enqueue_one(anomaly);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Attributes, Severity};
    use chrono::Utc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn anomaly(id: &str) -> Anomaly {
        Anomaly {
            id: id.to_string(),
            trace_id: Some("t1".to_string()),
            span_id: Some("s1".to_string()),
            service: "kx-exchange".to_string(),
            operation: "place_order".to_string(),
            value: 170.0,
            expected_mean: 100.0,
            expected_std_dev: 20.0,
            deviation: 3.5,
            severity: Severity::Critical,
            timestamp: Utc::now(),
            attributes: Attributes::new(),
            day_of_week: 0,
            hour_of_day: 0,
        }
    }

    fn payment_down_anomaly() -> Anomaly {
        let mut a = anomaly("p1");
        a.service = "payment-service".to_string();
        a.attributes.insert("http.status_code".to_string(), crate::models::attribute::AttributeValue::Int(502));
        a
    }

    #[tokio::test]
    async fn enqueue_beyond_capacity_drops_and_counts() {
        let llm = LlmClient::new("http://127.0.0.1:1", "llama3", 1).unwrap();
        let bus = Arc::new(SubscriberBus::new(16, 30));
        let analyzer = Arc::new(StreamAnalyzer::new(llm, bus, 2, 10, 30));

        analyzer.enqueue_one(anomaly("a1"));
        analyzer.enqueue_one(anomaly("a2"));
        let before = DROPPED_EVENTS_TOTAL.with_label_values(&["queue_full"]).get();
        analyzer.enqueue_one(anomaly("a3"));

        assert_eq!(analyzer.queue_depth(), 2);
        assert_eq!(DROPPED_EVENTS_TOTAL.with_label_values(&["queue_full"]).get(), before + 1.0);
    }

    #[tokio::test]
    async fn p0_anomaly_triggers_immediate_alert() {
        let llm = LlmClient::new("http://127.0.0.1:1", "llama3", 1).unwrap();
        let bus = Arc::new(SubscriberBus::new(16, 30));
        let mut rx = bus.subscribe();
        let analyzer = Arc::new(StreamAnalyzer::new(llm, bus, 100, 10, 30));

        analyzer.enqueue_one(payment_down_anomaly());

        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert_eq!(event.kind(), "alert");
    }

    #[tokio::test]
    async fn batch_dispatches_at_size_threshold_and_streams_chunks() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                "{\"response\":\"root cause\",\"done\":true}\n",
                "application/json",
            ))
            .mount(&server)
            .await;

        let llm = LlmClient::new(server.uri(), "llama3", 5).unwrap();
        let bus = Arc::new(SubscriberBus::new(16, 30));
        let mut rx = bus.subscribe();
        let analyzer = Arc::new(StreamAnalyzer::new(llm, bus, 100, 2, 30));

        analyzer.enqueue_one(anomaly("b1"));
        analyzer.enqueue_one(anomaly("b2"));
        assert!(analyzer.should_dispatch());

        analyzer.dispatch_batch().await;

        let mut saw_complete = false;
        while let Ok(Ok(event)) = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await {
            if event.kind() == "analysisComplete" {
                saw_complete = true;
                break;
            }
        }
        assert!(saw_complete);
        assert_eq!(analyzer.queue_depth(), 0);
    }
}
