//! Stream Analyzer: turns batches of anomalies into LLM-narrated
//! explanations, published over the subscriber bus.

pub mod classifier;
pub mod dispatcher;
pub mod prompt;

pub use classifier::{classify, UseCase};
pub use dispatcher::StreamAnalyzer;
