//! Generic value model and the decoder boundary.
//!
//! Every format decoder (JSON, YAML, XML, CSV, ...) lowers its input into
//! `Value` before validation. The model is deliberately minimal:
//!
//! - scalars: null / bool / number / text
//! - ordered list
//! - ordered string-keyed object (keys unique, insertion order preserved)
//!
//! Decoders for text-only formats (XML elements, unquoted YAML scalars) may
//! represent every scalar as `Text`; the validator re-parses text against
//! scalar targets. That coercion is keyed off the value being `Text`, never
//! off which decoder produced it.

use indexmap::IndexMap;
use ordered_float::OrderedFloat;
use serde::Serialize;

/// Decoded data, as produced by a format decoder and consumed by the
/// validator. Constructed once per document; never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(OrderedFloat<f64>),
    Text(String),
    List(Vec<Value>),
    Object(IndexMap<String, Value>),
}

impl Value {
    pub fn number(n: f64) -> Self {
        Value::Number(OrderedFloat(n))
    }

    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    /// Short noun for diagnostics ("expected number, got text").
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Text(_) => "text",
            Value::List(_) => "list",
            Value::Object(_) => "object",
        }
    }

    /// Lower a `serde_json::Value` into the generic model.
    ///
    /// Key order is preserved (serde_json is built with `preserve_order`).
    pub fn from_json(v: &serde_json::Value) -> Value {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                Value::Number(OrderedFloat(n.as_f64().unwrap_or(f64::NAN)))
            }
            serde_json::Value::String(s) => Value::Text(s.clone()),
            serde_json::Value::Array(xs) => Value::List(xs.iter().map(Value::from_json).collect()),
            serde_json::Value::Object(m) => Value::Object(
                m.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

// ------------------------------ Decoders ---------------------------------- //

/// A format decoder failed to produce a `Value` from its input text.
#[derive(Debug, thiserror::Error)]
#[error("failed to decode {format} input: {message}")]
pub struct DecodeError {
    pub format: String,
    pub message: String,
}

/// Boundary contract for format decoders.
///
/// The core ships one reference implementation ([`JsonDecoder`]); YAML, XML
/// and CSV decoders are external collaborators bound only by this trait.
pub trait Decoder {
    /// Format name used in diagnostics ("json", "yaml", ...).
    fn format(&self) -> &str;

    fn decode(&self, text: &str) -> Result<Value, DecodeError>;
}

/// Reference decoder for JSON, backed by serde_json with preserved key order.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonDecoder;

impl Decoder for JsonDecoder {
    fn format(&self) -> &str {
        "json"
    }

    fn decode(&self, text: &str) -> Result<Value, DecodeError> {
        let v: serde_json::Value = serde_json::from_str(text).map_err(|e| DecodeError {
            format: "json".into(),
            message: e.to_string(),
        })?;
        Ok(Value::from_json(&v))
    }
}

// -------------------------------- Tests ----------------------------------- //
