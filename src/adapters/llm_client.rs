//! LLM backend client: streamed generation over NDJSON. A single task owns
//! the socket and pushes decoded chunks onto a bounded channel as they
//! arrive, so the Stream Analyzer can fan them out without buffering the
//! full response first.

use std::time::Duration;

use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{classify_reqwest_error, AppError, Result};

#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: i32,
    repeat_penalty: f32,
    repeat_last_n: i32,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            num_predict: 512,
            repeat_penalty: 1.1,
            repeat_last_n: 64,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
}

impl LlmClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
        })
    }

    /// `POST /api/generate` with `stream: true`. Every decoded NDJSON line
    /// is forwarded on `chunk_tx` as soon as it's parsed; the full
    /// concatenated response is returned once the stream terminates.
    /// A send failure on `chunk_tx` (receiver dropped) stops forwarding but
    /// still drains the remaining body so the connection closes cleanly.
    pub async fn generate_stream(&self, prompt: &str, chunk_tx: mpsc::Sender<String>) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: true,
            options: GenerateOptions::default(),
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
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

        let mut full_response = String::new();
        let mut buf = Vec::new();
        let mut stream = response.bytes_stream();

        while let Some(next) = stream.next().await {
            let bytes = next.map_err(classify_reqwest_error)?;
            buf.extend_from_slice(&bytes);

            while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buf.drain(..=pos).collect();
                let line = &line[..line.len() - 1];
                if line.is_empty() {
                    continue;
                }
                if let Ok(chunk) = serde_json::from_slice::<GenerateChunk>(line) {
                    if !chunk.response.is_empty() {
                        full_response.push_str(&chunk.response);
                        let _ = chunk_tx.send(chunk.response).await;
                    }
                    if chunk.done {
                        return Ok(full_response);
                    }
                }
            }
        }

        Ok(full_response)
    }

    pub async fn probe_tags(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        matches!(self.client.get(&url).send().await, Ok(r) if r.status().is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_construction_succeeds() {
        assert!(LlmClient::new("http://localhost:11434", "llama3", 30).is_ok());
    }

    #[test]
    fn ndjson_chunk_parses_with_default_done() {
        let chunk: GenerateChunk = serde_json::from_str(r#"{"response":"hel"}"#).unwrap();
        assert_eq!(chunk.response, "hel");
        assert!(!chunk.done);
    }

    #[test]
    fn ndjson_terminal_chunk_carries_done_flag() {
        let chunk: GenerateChunk = serde_json::from_str(r#"{"response":"","done":true}"#).unwrap();
        assert!(chunk.done);
    }
}
