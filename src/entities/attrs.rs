//! Ordered attribute storage for node payloads and effect parameters.
//!
//! Keys keep insertion order (parameter rows in the UI, merge identity in
//! the undo layer both address parameters by index), so the container is
//! an `IndexMap` rather than a plain `HashMap`.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Generic attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    Str(String),
    Int(i32),
    UInt(u32),
    Float(f32),
    Bool(bool),
}

impl AttrValue {
    /// Best-effort conversion from a serialized parameter blob value.
    /// Unsupported JSON shapes (arrays, objects, null) are skipped by the
    /// caller.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(AttrValue::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(AttrValue::Int(i as i32))
                } else {
                    n.as_f64().map(|f| AttrValue::Float(f as f32))
                }
            }
            serde_json::Value::String(s) => Some(AttrValue::Str(s.clone())),
            _ => None,
        }
    }
}

/// Attribute container: string key → typed value, insertion-ordered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attrs {
    #[serde(default)]
    map: IndexMap<String, AttrValue>,
}

impl Attrs {
    pub fn new() -> Self {
        Self {
            map: IndexMap::new(),
        }
    }

    /// Build from a serialized parameter blob (the catalog's default
    /// parameter set). Key order of the blob is preserved.
    pub fn from_json(blob: &serde_json::Value) -> Self {
        let mut attrs = Self::new();
        if let serde_json::Value::Object(fields) = blob {
            for (key, value) in fields {
                if let Some(v) = AttrValue::from_json(value) {
                    attrs.set(key.clone(), v);
                }
            }
        }
        attrs
    }

    /// Insert or overwrite. Overwriting keeps the key's original position.
    pub fn set(&mut self, key: impl Into<String>, value: AttrValue) {
        self.map.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.map.get(key)
    }

    /// Position of a key in insertion order.
    pub fn index_of(&self, key: &str) -> Option<usize> {
        self.map.get_index_of(key)
    }

    /// Key/value at a given position.
    pub fn get_index(&self, index: usize) -> Option<(&str, &AttrValue)> {
        self.map.get_index(index).map(|(k, v)| (k.as_str(), v))
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.map.get(key) {
            Some(AttrValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    pub fn get_float(&self, key: &str) -> Option<f32> {
        match self.map.get(key) {
            Some(AttrValue::Float(v)) => Some(*v),
            Some(AttrValue::Int(v)) => Some(*v as f32),
            _ => None,
        }
    }

    pub fn get_int(&self, key: &str) -> Option<i32> {
        match self.map.get(key) {
            Some(AttrValue::Int(v)) => Some(*v),
            Some(AttrValue::UInt(v)) => Some(*v as i32),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.map.get(key) {
            Some(AttrValue::Bool(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v))
    }
}
