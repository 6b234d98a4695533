//! Dynamic-typed span attributes.
//!
//! Span attributes arrive as a heterogeneous map (the trace backend tags
//! each key with its own type). Use-case classification needs to read
//! scalars out of that map with typed predicates, so we model it as a
//! tagged variant rather than reaching for `serde_json::Value` everywhere.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum AttributeValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttributeValue::Int(i) => Some(*i),
            AttributeValue::Float(f) => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Int(i) => Some(*i as f64),
            AttributeValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

pub type Attributes = HashMap<String, AttributeValue>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_accessors_reject_wrong_variant() {
        let v = AttributeValue::String("payment-service".to_string());
        assert_eq!(v.as_str(), Some("payment-service"));
        assert_eq!(v.as_i64(), None);
        assert_eq!(v.as_bool(), None);
    }

    #[test]
    fn int_and_float_accessors_cross_convert() {
        let i = AttributeValue::Int(500);
        assert_eq!(i.as_f64(), Some(500.0));

        let f = AttributeValue::Float(429.0);
        assert_eq!(f.as_i64(), Some(429));
    }
}
