use serde::{Deserialize, Serialize};

///
/// QueryExpr
///
/// Verb tree as produced by the query layer. Every node except `AllEvents`
/// optionally wraps the expression it applies to; a missing `applies_to` is
/// the same as `AllEvents`.
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "verb", deny_unknown_fields)]
pub enum QueryExpr {
    #[default]
    AllEvents,
    Only {
        key: String,
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        applies_to: Option<Box<Self>>,
    },
    BrokenDownBy {
        key: String,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        applies_to: Option<Box<Self>>,
    },
    Sum {
        key: String,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        applies_to: Option<Box<Self>>,
    },
    Mean {
        key: String,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        applies_to: Option<Box<Self>>,
    },
    CountUniqueValues {
        key: String,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        applies_to: Option<Box<Self>>,
    },
    IndexedBy {
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        applies_to: Option<Box<Self>>,
    },
    TransformDateFormat {
        key: String,
        name: String,
        format: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        applies_to: Option<Box<Self>>,
    },
}

impl QueryExpr {
    #[must_use]
    pub const fn all_events() -> Self {
        Self::AllEvents
    }

    /// Expression this node wraps, if any.
    #[must_use]
    pub fn applies_to(&self) -> Option<&Self> {
        match self {
            Self::AllEvents => None,
            Self::Only { applies_to, .. }
            | Self::BrokenDownBy { applies_to, .. }
            | Self::Sum { applies_to, .. }
            | Self::Mean { applies_to, .. }
            | Self::CountUniqueValues { applies_to, .. }
            | Self::IndexedBy { applies_to, .. }
            | Self::TransformDateFormat { applies_to, .. } => applies_to.as_deref(),
        }
    }

    #[must_use]
    pub fn only(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Only {
            key: key.into(),
            value: value.into(),
            applies_to: self.boxed(),
        }
    }

    #[must_use]
    pub fn broken_down_by(self, key: impl Into<String>, name: impl Into<String>) -> Self {
        Self::BrokenDownBy {
            key: key.into(),
            name: name.into(),
            applies_to: self.boxed(),
        }
    }

    #[must_use]
    pub fn sum(self, key: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Sum {
            key: key.into(),
            name: name.into(),
            applies_to: self.boxed(),
        }
    }

    #[must_use]
    pub fn mean(self, key: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Mean {
            key: key.into(),
            name: name.into(),
            applies_to: self.boxed(),
        }
    }

    #[must_use]
    pub fn count_unique_values(self, key: impl Into<String>, name: impl Into<String>) -> Self {
        Self::CountUniqueValues {
            key: key.into(),
            name: name.into(),
            applies_to: self.boxed(),
        }
    }

    #[must_use]
    pub fn indexed_by(self, key: impl Into<String>) -> Self {
        Self::IndexedBy {
            key: key.into(),
            applies_to: self.boxed(),
        }
    }

    #[must_use]
    pub fn transform_date_format(
        self,
        key: impl Into<String>,
        name: impl Into<String>,
        format: impl Into<String>,
    ) -> Self {
        Self::TransformDateFormat {
            key: key.into(),
            name: name.into(),
            format: format.into(),
            applies_to: self.boxed(),
        }
    }

    // AllEvents is the implicit base, so it is never stored as a predecessor.
    fn boxed(self) -> Option<Box<Self>> {
        match self {
            Self::AllEvents => None,
            other => Some(Box::new(other)),
        }
    }
}
