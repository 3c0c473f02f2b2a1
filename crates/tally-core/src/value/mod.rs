//! Dynamic document model used by every map/reduce stage.
//!
//! Events and stored aggregates are open records. `Value` is the closed set
//! of shapes a field may hold and `Document` is the ordered field map.

#[cfg(test)]
mod tests;

use crate::error::InternalError;
use derive_more::{Deref, DerefMut, From, IntoIterator};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

///
/// Value
///
/// Null   → JSON null, or a Float that was NaN when serialized.
/// Int    → any integral number that fits an i64.
/// Float  → every other number; NaN is allowed in memory.
///

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<Self>),
    Map(Document),
}

impl Value {
    /// Numeric view of this value, if it is a number.
    #[must_use]
    #[expect(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Integral view of this value; floats truncate toward zero.
    #[must_use]
    #[expect(clippy::cast_possible_truncation)]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(v) if v.is_finite() => Some(v.trunc() as i64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_map(&self) -> Option<&Document> {
        match self {
            Self::Map(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_list(&self) -> Option<&Vec<Self>> {
        match self {
            Self::List(v) => Some(v),
            _ => None,
        }
    }

    /// Render for result rows: numbers use shortest round-trip formatting,
    /// text is emitted as-is, composites fall back to their JSON form.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(v) => v.to_string(),
            Self::Int(v) => v.to_string(),
            Self::Float(v) => v.to_string(),
            Self::Text(v) => v.clone(),
            Self::List(_) | Self::Map(_) => serde_json::to_string(self).unwrap_or_default(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Document> for Value {
    fn from(value: Document) -> Self {
        Self::Map(value)
    }
}

///
/// Document
///
/// Ordered string-keyed record. Field order is canonical (sorted), so two
/// documents with the same fields compare and serialize identically.
///

#[derive(
    Clone, Debug, Default, Deref, DerefMut, Deserialize, From, IntoIterator, PartialEq, Serialize,
)]
#[serde(transparent)]
pub struct Document(BTreeMap<String, Value>);

impl Document {
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Parse one JSON object into a document.
    pub fn from_json_str(text: &str) -> Result<Self, InternalError> {
        serde_json::from_str(text).map_err(|err| {
            InternalError::serialize_corruption(format!("document is not a JSON object: {err}"))
        })
    }

    /// Serialize to JSON text. NaN floats are written as `null`.
    pub fn to_json_string(&self) -> Result<String, InternalError> {
        serde_json::to_string(self).map_err(|err| {
            InternalError::serialize_corruption(format!("document failed to serialize: {err}"))
        })
    }

    /// Builder-style field insert.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    /// Numeric field value; missing and non-numeric fields read as zero.
    #[must_use]
    pub fn number_or_zero(&self, field: &str) -> f64 {
        self.0.get(field).and_then(Value::as_f64).unwrap_or(0.0)
    }

    /// Integral field value; missing and non-numeric fields read as `default`.
    #[must_use]
    pub fn integer_or(&self, field: &str, default: i64) -> i64 {
        self.0.get(field).and_then(Value::as_i64).unwrap_or(default)
    }

    /// Nested document stored under `field`, if the field holds a map.
    #[must_use]
    pub fn sub_document(&self, field: &str) -> Option<&Self> {
        self.0.get(field).and_then(Value::as_map)
    }

    /// Nested document under `field`, created empty when missing or not a map.
    pub fn sub_document_mut(&mut self, field: &str) -> &mut Self {
        let slot = self
            .0
            .entry(field.to_string())
            .or_insert_with(|| Value::Map(Self::new()));
        if !matches!(slot, Value::Map(_)) {
            *slot = Value::Map(Self::new());
        }

        match slot {
            Value::Map(doc) => doc,
            _ => unreachable!("slot was just normalized to a map"),
        }
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
