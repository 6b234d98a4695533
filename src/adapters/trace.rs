//! Trace Source Adapter: pulls recent/historical traces from the trace
//! backend over HTTP for the monitored service list, resolving each span's
//! service from the trace's `processes` table and discarding spans whose
//! service isn't monitored.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

use crate::error::{classify_reqwest_error, AppError, Result};
use crate::models::{AttributeValue, Span, Trace};

#[derive(Clone)]
pub struct TraceBackendClient {
    client: Client,
    base_url: String,
    timeout_secs: u64,
}

impl TraceBackendClient {
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            timeout_secs,
        })
    }

    /// `fetchRecent`. Connection failures are caller-visible as
    /// `BackendUnavailable`; callers treat that as an empty result, not fatal.
    pub async fn fetch_recent(
        &self,
        service: &str,
        lookback: &str,
        limit: u32,
    ) -> Result<Vec<Trace>> {
        let url = format!(
            "{}/api/traces?service={}&lookback={}&limit={}",
            self.base_url, service, lookback, limit
        );
        self.fetch(&url).await
    }

    /// `fetchSince`. Times are in microseconds, matching the backend's wire format.
    pub async fn fetch_since(
        &self,
        service: &str,
        start_micros: i64,
        end_micros: i64,
        limit: u32,
    ) -> Result<Vec<Trace>> {
        let url = format!(
            "{}/api/traces?service={}&start={}&end={}&limit={}",
            self.base_url, service, start_micros, end_micros, limit
        );
        self.fetch(&url).await
    }

    pub async fn fetch_trace(&self, trace_id: &str) -> Result<Option<Trace>> {
        let url = format!("{}/api/traces/{}", self.base_url, trace_id);
        let traces = self.fetch(&url).await?;
        Ok(traces.into_iter().next())
    }

    async fn fetch(&self, url: &str) -> Result<Vec<Trace>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::BackendError {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let envelope: TraceEnvelope = response.json().await.map_err(classify_reqwest_error)?;
        Ok(envelope.data.into_iter().map(|t| t.into_trace()).collect())
    }
}

#[derive(Debug, Deserialize)]
struct TraceEnvelope {
    data: Vec<WireTrace>,
}

#[derive(Debug, Deserialize)]
struct WireTrace {
    #[serde(rename = "traceID")]
    trace_id: String,
    spans: Vec<WireSpan>,
    processes: HashMap<String, WireProcess>,
}

#[derive(Debug, Deserialize)]
struct WireSpan {
    #[serde(rename = "spanID")]
    span_id: String,
    #[serde(rename = "operationName")]
    operation_name: String,
    #[serde(default)]
    references: Vec<WireReference>,
    #[serde(rename = "startTime")]
    start_time: i64,
    duration: i64,
    #[serde(default)]
    tags: Vec<WireTag>,
    #[serde(rename = "processID")]
    process_id: String,
}

#[derive(Debug, Deserialize)]
struct WireReference {
    #[serde(rename = "refType")]
    ref_type: String,
    #[serde(rename = "spanID")]
    span_id: String,
}

#[derive(Debug, Deserialize)]
struct WireTag {
    key: String,
    #[serde(rename = "type")]
    tag_type: String,
    value: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct WireProcess {
    #[serde(rename = "serviceName")]
    service_name: String,
}

impl WireTrace {
    fn into_trace(self) -> Trace {
        let spans = self
            .spans
            .into_iter()
            .filter_map(|s| {
                let process = self.processes.get(&s.process_id)?;
                let parent_span_id = s
                    .references
                    .iter()
                    .find(|r| r.ref_type == "CHILD_OF")
                    .map(|r| r.span_id.clone());

                let attributes = s
                    .tags
                    .into_iter()
                    .map(|tag| (tag.key, wire_tag_to_attribute(&tag.tag_type, tag.value)))
                    .collect();

                Some(Span {
                    trace_id: self.trace_id.clone(),
                    span_id: s.span_id,
                    parent_span_id,
                    service: process.service_name.clone(),
                    operation: s.operation_name,
                    start_time_micros: s.start_time,
                    duration_micros: s.duration,
                    attributes,
                })
            })
            .collect();

        Trace {
            trace_id: self.trace_id,
            spans,
        }
    }
}

fn wire_tag_to_attribute(tag_type: &str, value: serde_json::Value) -> AttributeValue {
    match tag_type {
        "int64" | "int" => value
            .as_i64()
            .map(AttributeValue::Int)
            .unwrap_or_else(|| AttributeValue::String(value.to_string())),
        "float64" | "float" => value
            .as_f64()
            .map(AttributeValue::Float)
            .unwrap_or_else(|| AttributeValue::String(value.to_string())),
        "bool" => value
            .as_bool()
            .map(AttributeValue::Bool)
            .unwrap_or_else(|| AttributeValue::String(value.to_string())),
        _ => match value.as_str() {
            Some(s) => AttributeValue::String(s.to_string()),
            None => {
                warn!(tag_type, "unrecognized tag type, coercing to string");
                AttributeValue::String(value.to_string())
            }
        },
    }
}

/// Discard spans whose resolved service is not in the monitored list.
pub fn discard_unmonitored(traces: Vec<Trace>, monitored: &[String]) -> Vec<Trace> {
    traces
        .into_iter()
        .map(|mut t| {
            t.spans.retain(|s| monitored.iter().any(|m| m == &s.service));
            t
        })
        .filter(|t| !t.spans.is_empty())
        .collect()
}
