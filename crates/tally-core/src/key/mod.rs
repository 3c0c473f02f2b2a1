//! Bucket keys.
//!
//! A key is an ordered sequence of scalar parts. Equality, ordering and
//! hashing are defined on canonical parts, so two keys are equal exactly when
//! their canonical strings are equal. Grouping inside the ingestor and
//! addressing inside stores therefore agree by construction.


use crate::value::Value;
use derive_more::{Deref, IntoIterator};
use std::{
    cmp::Ordering,
    fmt::{self, Write as _},
    hash::{Hash, Hasher},
};
use xxhash_rust::xxh3::xxh3_64;

///
/// CONSTANTS
///

// Largest float magnitude that is folded into `KeyPart::Int`.
const I64_FLOAT_BOUND: f64 = 9_223_372_036_854_775_808.0;

///
/// KeyPart
///
/// Null   → a slot that was removed by a later operator; never shifts.
/// Float  → always non-integral or outside the i64 range after canonicalization.
///

#[derive(Clone, Debug)]
pub enum KeyPart {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl KeyPart {
    /// Canonical float part: integral values inside the i64 range become ints.
    #[must_use]
    #[expect(clippy::cast_possible_truncation)]
    pub fn float(value: f64) -> Self {
        if value.is_nan() {
            return Self::Float(f64::NAN);
        }
        if value.fract() == 0.0 && value.abs() < I64_FLOAT_BOUND {
            return Self::Int(value as i64);
        }

        Self::Float(value)
    }

    /// Key part for a document value; only key scalars qualify.
    #[must_use]
    pub fn from_scalar(value: &Value) -> Option<Self> {
        match value {
            Value::Int(v) => Some(Self::Int(*v)),
            Value::Float(v) => Some(Self::float(*v)),
            Value::Text(v) => Some(Self::Text(v.clone())),
            _ => None,
        }
    }

    /// Key part read back from a serialized key; removed slots are nulls.
    #[must_use]
    pub fn from_key_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Self::Null),
            other => Self::from_scalar(other),
        }
    }

    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Int(v) => Value::Int(*v),
            Self::Float(v) => Value::Float(*v),
            Self::Text(v) => Value::Text(v.clone()),
        }
    }

    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    const fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Int(_) => 1,
            Self::Float(_) => 2,
            Self::Text(_) => 3,
        }
    }

    fn write_canonical(&self, out: &mut String) {
        match self {
            Self::Null => out.push_str("null"),
            Self::Int(v) => {
                let _ = write!(out, "{v}");
            }
            Self::Float(v) => {
                let _ = write!(out, "{v:?}");
            }
            Self::Text(v) => {
                out.push_str(&serde_json::to_string(v).unwrap_or_default());
            }
        }
    }
}

impl PartialEq for KeyPart {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for KeyPart {}

impl PartialOrd for KeyPart {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KeyPart {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Float(a), Self::Float(b)) => a.total_cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl Hash for KeyPart {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Self::Null => {}
            Self::Int(v) => v.hash(state),
            Self::Float(v) => v.to_bits().hash(state),
            Self::Text(v) => v.hash(state),
        }
    }
}

impl From<&str> for KeyPart {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for KeyPart {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for KeyPart {
    fn from(value: f64) -> Self {
        Self::float(value)
    }
}

///
/// Key
///

#[derive(Clone, Debug, Default, Deref, Eq, Hash, IntoIterator, Ord, PartialEq, PartialOrd)]
pub struct Key(Vec<KeyPart>);

impl Key {
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    #[must_use]
    pub const fn from_parts(parts: Vec<KeyPart>) -> Self {
        Self(parts)
    }

    /// Single-part key, as used for named child scopes and append keys.
    #[must_use]
    pub fn single(part: impl Into<KeyPart>) -> Self {
        Self(vec![part.into()])
    }

    pub fn push(&mut self, part: impl Into<KeyPart>) {
        self.0.push(part.into());
    }

    #[must_use]
    pub fn into_parts(self) -> Vec<KeyPart> {
        self.0
    }

    #[must_use]
    pub fn starts_with(&self, prefix: &Self) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Canonical JSON-array rendering, e.g. `["s1",3,null]`.
    #[must_use]
    pub fn canonical(&self) -> String {
        let mut out = String::from("[");
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            part.write_canonical(&mut out);
        }
        out.push(']');

        out
    }

    /// Stable 64-bit hash of the canonical form.
    #[must_use]
    pub fn stable_hash(&self) -> u64 {
        xxh3_64(self.canonical().as_bytes())
    }

    /// Serialized form carried in documents under `_key`.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::List(self.0.iter().map(KeyPart::to_value).collect())
    }

    /// Parse the serialized form; fails on non-lists and non-scalar parts.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        value
            .as_list()?
            .iter()
            .map(KeyPart::from_key_value)
            .collect::<Option<Vec<_>>>()
            .map(Self)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl From<Vec<KeyPart>> for Key {
    fn from(parts: Vec<KeyPart>) -> Self {
        Self(parts)
    }
}

impl<const N: usize> From<[KeyPart; N]> for Key {
    fn from(parts: [KeyPart; N]) -> Self {
        Self(parts.into())
    }
}

impl FromIterator<KeyPart> for Key {
    fn from_iter<T: IntoIterator<Item = KeyPart>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
