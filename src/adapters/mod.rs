//! Outbound HTTP clients for the three backends this system consumes but
//! doesn't implement: the trace backend, the metrics backend, and the LLM.

pub mod llm_client;
pub mod metrics_client;
pub mod trace;

pub use llm_client::LlmClient;
pub use metrics_client::MetricsBackendClient;
pub use trace::{discard_unmonitored, TraceBackendClient};
