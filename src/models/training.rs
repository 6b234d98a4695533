//! LLM feedback loop: operators rate analyses the Stream Analyzer produced.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::anomaly::Anomaly;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    Good,
    Bad,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingExample {
    pub id: Uuid,
    pub anomaly: Anomaly,
    pub prompt: String,
    pub completion: String,
    pub rating: Rating,
    pub correction: Option<String>,
    pub notes: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl TrainingExample {
    /// Single JSONL line: `{prompt, completion}`, overridden by `correction` when rated bad.
    pub fn to_jsonl_record(&self) -> serde_json::Value {
        serde_json::json!({
            "prompt": self.prompt,
            "completion": self.correction.as_deref().unwrap_or(&self.completion),
        })
    }
}
