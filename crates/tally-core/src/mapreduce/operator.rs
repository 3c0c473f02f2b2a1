use crate::{
    key::KeyPart,
    mapreduce::{
        date,
        result::{COUNT_FIELD, INTERMEDIATE_FIELD, MapResult},
    },
    value::{Document, Value},
};
use serde::{Deserialize, Serialize};
use std::fmt;

// Intermediate fields.
const MEAN_VALUE: &str = "Value";
const MEAN_COUNT: &str = "Count";
const KEY_INDEX: &str = "KeyIndex";

///
/// DateFormat
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum DateFormat {
    /// Whole days since 1970-01-01 UTC.
    Days,
}

impl DateFormat {
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "Days" => Some(Self::Days),
            _ => None,
        }
    }
}

impl fmt::Display for DateFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Days => f.write_str("Days"),
        }
    }
}

///
/// ChainRole
/// What a composed operator contributes to the stages after its own.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChainRole {
    None,
    StripIndex,
    CollapseUnique,
}

///
/// Operator
///
/// Closed set of composable map/reduce verbs. Reduce and rereduce are the
/// same fold; every reducing operator satisfies the retraction law
/// `unreduce(reduce(S ∪ T), T) == reduce(S)`.
///
/// DropIndex and UniqueTally only appear in chained stages.
///
/// Min and Max are absent: an extreme cannot be unreduced without the full
/// value set, so they would break the retraction law.
///

#[derive(Clone, Debug, PartialEq)]
pub enum Operator {
    CountDocuments,
    Only {
        field: String,
        value: String,
    },
    BrokenDownBy {
        field: String,
        name: String,
    },
    Sum {
        field: String,
        name: String,
    },
    Mean {
        field: String,
        name: String,
    },
    CountUniqueValues {
        field: String,
        name: String,
    },
    IndexedBy {
        field: String,
    },
    TransformDateFormat {
        field: String,
        name: String,
        format: DateFormat,
    },
    DropIndex,
    UniqueTally {
        name: String,
    },
}

impl Operator {
    /// True when the operator takes part in reduce, rereduce and unreduce.
    #[must_use]
    pub const fn reduces(&self) -> bool {
        matches!(
            self,
            Self::CountDocuments
                | Self::BrokenDownBy { .. }
                | Self::Sum { .. }
                | Self::Mean { .. }
                | Self::CountUniqueValues { .. }
                | Self::UniqueTally { .. }
        )
    }

    #[must_use]
    pub const fn chain_role(&self) -> ChainRole {
        match self {
            Self::IndexedBy { .. } => ChainRole::StripIndex,
            Self::CountUniqueValues { .. } => ChainRole::CollapseUnique,
            _ => ChainRole::None,
        }
    }

    /// Short verb label used in logs and errors.
    #[must_use]
    pub const fn verb(&self) -> &'static str {
        match self {
            Self::CountDocuments => "CountDocuments",
            Self::Only { .. } => "Only",
            Self::BrokenDownBy { .. } => "BrokenDownBy",
            Self::Sum { .. } => "Sum",
            Self::Mean { .. } => "Mean",
            Self::CountUniqueValues { .. } => "CountUniqueValues",
            Self::IndexedBy { .. } => "IndexedBy",
            Self::TransformDateFormat { .. } => "TransformDateFormat",
            Self::DropIndex => "DropIndex",
            Self::UniqueTally { .. } => "UniqueTally",
        }
    }

    /// Apply this operator to one input. `input` is the stage's working copy,
    /// so mutations are visible to operators that run later in the pass.
    pub fn map(&self, result: &mut MapResult, input: &mut Document) {
        match self {
            Self::CountDocuments => result.set_value(COUNT_FIELD, 1_i64),

            Self::Only { field, value } => {
                let matches = input
                    .get(field)
                    .and_then(Value::as_text)
                    .is_some_and(|text| text == value);
                if !matches {
                    result.reject();
                }
            }

            Self::BrokenDownBy { field, name } => match scalar_part(input, field) {
                Some((part, value)) => {
                    result.add_key(part);
                    result.set_value(name.clone(), value);
                }
                None => result.reject(),
            },

            Self::Sum { field, name } => {
                result.set_value(name.clone(), input.number_or_zero(field));
            }

            Self::Mean { field, name } => {
                let (value, count) = input
                    .get(field)
                    .and_then(Value::as_f64)
                    .map_or((0.0, 0), |v| (v, 1));
                result.set_value(name.clone(), mean_of(value, count));
                result.set_intermediate_value(name.clone(), mean_state(value, count));
            }

            Self::CountUniqueValues { field, name } => match scalar_part(input, field) {
                Some((part, _)) => {
                    let slot = result.add_key(part);
                    result.set_value(name.clone(), 1_i64);
                    result.set_intermediate_value(name.clone(), key_index_state(slot));
                }
                None => result.reject(),
            },

            Self::IndexedBy { field } => match scalar_part(input, field) {
                Some((part, _)) => result.add_index_key(part),
                None => result.reject(),
            },

            Self::TransformDateFormat {
                field,
                name,
                format: DateFormat::Days,
            } => {
                let days = input
                    .get(field)
                    .and_then(Value::as_text)
                    .and_then(date::parse_iso8601)
                    .map(date::days_since_epoch);
                if let Some(days) = days {
                    input.insert(name.clone(), Value::Int(days));
                }
            }

            Self::DropIndex => result.remove_index_keys(),

            Self::UniqueTally { name } => {
                let slot = input
                    .sub_document(INTERMEDIATE_FIELD)
                    .and_then(|state| state.sub_document(name))
                    .and_then(|state| state.get(KEY_INDEX))
                    .and_then(Value::as_i64)
                    .and_then(|slot| usize::try_from(slot).ok());
                match slot {
                    Some(slot) => result.remove_key_at_index(slot),
                    None => result.reject(),
                }
            }
        }
    }

    /// Fold `docs` into `out`. Documents may be fresh map outputs or
    /// previously reduced aggregates.
    pub fn reduce(&self, out: &mut Document, docs: &[Document]) {
        match self {
            Self::CountDocuments => {
                let total = docs.iter().map(count_contribution).fold(0_i64, i64::saturating_add);
                out.insert(COUNT_FIELD.to_string(), Value::Int(total));
            }

            Self::BrokenDownBy { name, .. } => {
                if let Some(value) = docs.iter().find_map(|doc| doc.get(name)) {
                    out.insert(name.clone(), value.clone());
                }
            }

            Self::Sum { name, .. } | Self::UniqueTally { name } => {
                let total: f64 = docs.iter().map(|doc| doc.number_or_zero(name)).sum();
                out.insert(name.clone(), sum_value(self, total));
            }

            Self::Mean { name, .. } => {
                let (value, count) = docs.iter().map(|doc| read_mean_state(doc, name)).fold(
                    (0.0, 0_i64),
                    |(value, count), (v, c)| (value + v, count.saturating_add(c)),
                );
                write_mean(out, name, value, count);
            }

            Self::CountUniqueValues { name, .. } => {
                write_presence(out, name);
                if let Some(state) = docs.iter().find_map(|doc| intermediate(doc, name)) {
                    out.sub_document_mut(INTERMEDIATE_FIELD)
                        .insert(name.clone(), Value::Map(state.clone()));
                }
            }

            Self::Only { .. }
            | Self::IndexedBy { .. }
            | Self::TransformDateFormat { .. }
            | Self::DropIndex => {}
        }
    }

    /// Combine previously reduced aggregates; identical to `reduce`.
    pub fn rereduce(&self, out: &mut Document, docs: &[Document]) {
        self.reduce(out, docs);
    }

    /// Remove the contribution of `docs` from `stored` in place.
    pub fn unreduce(&self, stored: &mut Document, docs: &[Document]) {
        match self {
            Self::CountDocuments => {
                let removed = docs.iter().map(count_contribution).fold(0_i64, i64::saturating_add);
                let total = stored.integer_or(COUNT_FIELD, 0).saturating_sub(removed);
                stored.insert(COUNT_FIELD.to_string(), Value::Int(total));
            }

            Self::Sum { name, .. } | Self::UniqueTally { name } => {
                let removed: f64 = docs.iter().map(|doc| doc.number_or_zero(name)).sum();
                let total = stored.number_or_zero(name) - removed;
                stored.insert(name.clone(), sum_value(self, total));
            }

            Self::Mean { name, .. } => {
                let (mut value, mut count) = read_mean_state(stored, name);
                for doc in docs {
                    let (v, c) = read_mean_state(doc, name);
                    value -= v;
                    count = count.saturating_sub(c);
                }
                write_mean(stored, name, value, count);
            }

            // Runs after CountDocuments has already adjusted the count.
            Self::CountUniqueValues { name, .. } => write_presence(stored, name),

            Self::BrokenDownBy { .. }
            | Self::Only { .. }
            | Self::IndexedBy { .. }
            | Self::TransformDateFormat { .. }
            | Self::DropIndex => {}
        }
    }
}

///
/// HELPERS
///

// Key part plus the original value for a key-eligible field.
fn scalar_part(input: &Document, field: &str) -> Option<(KeyPart, Value)> {
    let value = input.get(field)?;
    let part = KeyPart::from_scalar(value)?;

    Some((part, value.clone()))
}

fn count_contribution(doc: &Document) -> i64 {
    doc.integer_or(COUNT_FIELD, 1)
}

// Unique tallies stay integral; sums are floats.
#[expect(clippy::cast_possible_truncation)]
fn sum_value(op: &Operator, total: f64) -> Value {
    match op {
        Operator::UniqueTally { .. } => Value::Int(total.round() as i64),
        _ => Value::Float(total),
    }
}

#[expect(clippy::cast_precision_loss)]
fn mean_of(value: f64, count: i64) -> f64 {
    if count == 0 {
        f64::NAN
    } else {
        value / count as f64
    }
}

fn mean_state(value: f64, count: i64) -> Document {
    Document::new()
        .with(MEAN_VALUE, value)
        .with(MEAN_COUNT, count)
}

fn key_index_state(slot: usize) -> Document {
    Document::new().with(KEY_INDEX, i64::try_from(slot).unwrap_or(i64::MAX))
}

fn intermediate<'a>(doc: &'a Document, name: &str) -> Option<&'a Document> {
    doc.sub_document(INTERMEDIATE_FIELD)?.sub_document(name)
}

fn read_mean_state(doc: &Document, name: &str) -> (f64, i64) {
    intermediate(doc, name).map_or((0.0, 0), |state| {
        (
            state.number_or_zero(MEAN_VALUE),
            state.integer_or(MEAN_COUNT, 0),
        )
    })
}

fn write_mean(doc: &mut Document, name: &str, value: f64, count: i64) {
    doc.insert(name.to_string(), Value::Float(mean_of(value, count)));
    doc.sub_document_mut(INTERMEDIATE_FIELD)
        .insert(name.to_string(), Value::Map(mean_state(value, count)));
}

// One bucket exists for this value while anything still counts toward it.
fn write_presence(doc: &mut Document, name: &str) {
    let present = i64::from(doc.integer_or(COUNT_FIELD, 0) > 0);
    doc.insert(name.to_string(), Value::Int(present));
}
