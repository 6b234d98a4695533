//! Subscriber Bus: push-only delivery of analysis and alert events to
//! observers (the Control Surface's WebSocket/SSE layer attaches here).

pub mod broadcaster;
pub mod events;

pub use broadcaster::SubscriberBus;
pub use events::{BusEvent, BusStats};
