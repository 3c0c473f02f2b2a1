use crate::{
    error::InternalError,
    mapreduce::{Compositor, DateFormat, Operator, Pipeline},
    query::QueryExpr,
};
use thiserror::Error as ThisError;

///
/// QueryError
///
/// Contract violations between the query layer and the compiler.
/// Never retried.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum QueryError {
    #[error("{verb} requires a non-empty {argument}")]
    EmptyArgument {
        verb: &'static str,
        argument: &'static str,
    },

    #[error("unsupported date format '{format}' (only 'Days' is supported)")]
    UnsupportedDateFormat { format: String },
}

impl From<QueryError> for InternalError {
    fn from(err: QueryError) -> Self {
        Self::query_invariant(err.to_string())
    }
}

/// Compile a query expression into a staged pipeline.
pub fn compile(expr: &QueryExpr) -> Result<Pipeline, QueryError> {
    let mut compositor = Compositor::new();
    append(expr, &mut compositor)?;

    Ok(compositor.build())
}

// Depth-first: the base applies before the node wrapping it.
fn append(expr: &QueryExpr, compositor: &mut Compositor) -> Result<(), QueryError> {
    if let Some(base) = expr.applies_to() {
        append(base, compositor)?;
    }

    if let Some(op) = operator_for(expr)? {
        compositor.push(op);
    }

    Ok(())
}

fn operator_for(expr: &QueryExpr) -> Result<Option<Operator>, QueryError> {
    let op = match expr {
        QueryExpr::AllEvents => return Ok(None),

        QueryExpr::Only { key, value, .. } => Operator::Only {
            field: required("Only", "key", key)?,
            value: value.clone(),
        },

        QueryExpr::BrokenDownBy { key, name, .. } => Operator::BrokenDownBy {
            field: required("BrokenDownBy", "key", key)?,
            name: required("BrokenDownBy", "name", name)?,
        },

        QueryExpr::Sum { key, name, .. } => Operator::Sum {
            field: required("Sum", "key", key)?,
            name: required("Sum", "name", name)?,
        },

        QueryExpr::Mean { key, name, .. } => Operator::Mean {
            field: required("Mean", "key", key)?,
            name: required("Mean", "name", name)?,
        },

        QueryExpr::CountUniqueValues { key, name, .. } => Operator::CountUniqueValues {
            field: required("CountUniqueValues", "key", key)?,
            name: required("CountUniqueValues", "name", name)?,
        },

        QueryExpr::IndexedBy { key, .. } => Operator::IndexedBy {
            field: required("IndexedBy", "key", key)?,
        },

        QueryExpr::TransformDateFormat {
            key, name, format, ..
        } => Operator::TransformDateFormat {
            field: required("TransformDateFormat", "key", key)?,
            name: required("TransformDateFormat", "name", name)?,
            format: DateFormat::parse(format).ok_or_else(|| {
                QueryError::UnsupportedDateFormat {
                    format: format.clone(),
                }
            })?,
        },
    };

    Ok(Some(op))
}

fn required(verb: &'static str, argument: &'static str, text: &str) -> Result<String, QueryError> {
    if text.is_empty() {
        return Err(QueryError::EmptyArgument { verb, argument });
    }

    Ok(text.to_string())
}
