//! Schema-less structured values.
//!
//! Gateways report subscriber session state as arbitrarily nested maps. The
//! store never interprets it; a [`Document`] only has to survive a write/read
//! cycle with its structure intact.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A semi-structured value.
///
/// Integers and floats are kept apart so that `6` and `6.0` round-trip as
/// what the gateway sent. Unsigned integers above `i64::MAX` get their own
/// variant; anything that fits in an `i64` is always `Int`.
///
/// Equality is structural and follows `f64` for floats, so a document holding
/// `Float(NaN)` is stored and read back byte-for-byte but never compares equal
/// to itself.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum Document {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Sequence(Vec<Document>),
    Map(BTreeMap<String, Document>),
}

impl Document {
    /// An empty map.
    pub fn map() -> Self {
        Document::Map(BTreeMap::new())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Document::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Document::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Document::Float(f) => Some(*f),
            Document::Int(i) => Some(*i as f64),
            Document::UInt(u) => Some(*u as f64),
            _ => None,
        }
    }

    /// Number of nested containers, `0` for a scalar.
    ///
    /// Walks the tree with an explicit stack so arbitrarily deep input cannot
    /// overflow the call stack.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut pending = vec![(self, 0usize)];
        while let Some((doc, level)) = pending.pop() {
            match doc {
                Document::Sequence(items) => {
                    deepest = deepest.max(level + 1);
                    pending.extend(items.iter().map(|item| (item, level + 1)));
                }
                Document::Map(fields) => {
                    deepest = deepest.max(level + 1);
                    pending.extend(fields.values().map(|value| (value, level + 1)));
                }
                _ => deepest = deepest.max(level),
            }
        }
        deepest
    }

    /// Look up a field when this is a map.
    pub fn get(&self, field: &str) -> Option<&Document> {
        match self {
            Document::Map(m) => m.get(field),
            _ => None,
        }
    }

    /// Insert a field, turning `Null` into an empty map first.
    ///
    /// Returns the previous value of the field, if any. Non-map documents are
    /// left untouched and the value is handed back.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Document>) -> Option<Document> {
        if self.is_null() {
            *self = Document::map();
        }
        match self {
            Document::Map(m) => m.insert(field.into(), value.into()),
            _ => Some(value.into()),
        }
    }
}

impl From<bool> for Document {
    fn from(b: bool) -> Self {
        Document::Bool(b)
    }
}

impl From<i64> for Document {
    fn from(i: i64) -> Self {
        Document::Int(i)
    }
}

impl From<i32> for Document {
    fn from(i: i32) -> Self {
        Document::Int(i64::from(i))
    }
}

impl From<u64> for Document {
    fn from(u: u64) -> Self {
        match i64::try_from(u) {
            Ok(i) => Document::Int(i),
            Err(_) => Document::UInt(u),
        }
    }
}

impl From<f64> for Document {
    fn from(f: f64) -> Self {
        Document::Float(f)
    }
}

impl From<&str> for Document {
    fn from(s: &str) -> Self {
        Document::String(s.to_string())
    }
}

impl From<String> for Document {
    fn from(s: String) -> Self {
        Document::String(s)
    }
}

impl From<Vec<Document>> for Document {
    fn from(v: Vec<Document>) -> Self {
        Document::Sequence(v)
    }
}

impl From<BTreeMap<String, Document>> for Document {
    fn from(m: BTreeMap<String, Document>) -> Self {
        Document::Map(m)
    }
}

impl From<serde_json::Value> for Document {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => Document::Null,
            Value::Bool(b) => Document::Bool(b),
            Value::Number(n) => match (n.as_i64(), n.as_u64()) {
                (Some(i), _) => Document::Int(i),
                (None, Some(u)) => Document::UInt(u),
                // serde_json only builds finite floats
                (None, None) => Document::Float(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => Document::String(s),
            Value::Array(items) => Document::Sequence(items.into_iter().map(Document::from).collect()),
            Value::Object(fields) => Document::Map(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, Document::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<Document> for serde_json::Value {
    fn from(doc: Document) -> Self {
        use serde_json::Value;

        match doc {
            Document::Null => Value::Null,
            Document::Bool(b) => Value::Bool(b),
            Document::Int(i) => Value::from(i),
            Document::UInt(u) => Value::from(u),
            // JSON has no NaN or infinity
            Document::Float(f) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Document::String(s) => Value::String(s),
            Document::Sequence(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            Document::Map(fields) => Value::Object(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}
