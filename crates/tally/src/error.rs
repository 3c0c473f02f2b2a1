use derive_more::Display;
use serde::{Deserialize, Serialize};
use tally_core::{
    config::ConfigError,
    error::{ErrorClass, ErrorOrigin as CoreErrorOrigin, InternalError},
    query::QueryError,
};
use thiserror::Error as ThisError;

///
/// Error
/// Public error type with a stable kind + origin taxonomy.
///

#[derive(Clone, Debug, Deserialize, Serialize, ThisError)]
#[error("{message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub origin: ErrorOrigin,
    pub message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            kind,
            origin,
            message: message.into(),
        }
    }
}

impl From<InternalError> for Error {
    fn from(err: InternalError) -> Self {
        let kind = match (err.class, err.origin) {
            (ErrorClass::NotFound, _) => ErrorKind::Store(StoreErrorKind::NotFound),
            (_, CoreErrorOrigin::Store) => ErrorKind::Store(StoreErrorKind::Unavailable),
            (ErrorClass::InvariantViolation, CoreErrorOrigin::Query) => {
                ErrorKind::Query(QueryErrorKind::Invalid)
            }
            (_, CoreErrorOrigin::Config) => ErrorKind::Config,
            _ => ErrorKind::Internal,
        };

        Self::new(kind, err.origin.into(), err.message)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        let kind = match err {
            QueryError::EmptyArgument { .. } => QueryErrorKind::Invalid,
            QueryError::UnsupportedDateFormat { .. } => QueryErrorKind::Unsupported,
        };

        Self::new(ErrorKind::Query(kind), ErrorOrigin::Query, err.to_string())
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Self::new(ErrorKind::Config, ErrorOrigin::Config, err.to_string())
    }
}

///
/// ErrorKind
/// Public error taxonomy for callers.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ErrorKind {
    Query(QueryErrorKind),
    Store(StoreErrorKind),

    /// Engine configuration was rejected.
    Config,

    /// The caller cannot remediate this.
    Internal,
}

///
/// QueryErrorKind
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum QueryErrorKind {
    /// Query shape is invalid (empty arguments, non-scalar lookup keys).
    Invalid,

    /// The query is valid but requests an unsupported feature.
    Unsupported,
}

///
/// StoreErrorKind
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum StoreErrorKind {
    NotFound,
    Unavailable,
}

///
/// ErrorOrigin
/// Public origin taxonomy for callers.
///

#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, PartialEq, Serialize)]
pub enum ErrorOrigin {
    Config,
    Ingest,
    Query,
    Serialize,
    Store,
}

impl From<CoreErrorOrigin> for ErrorOrigin {
    fn from(origin: CoreErrorOrigin) -> Self {
        match origin {
            CoreErrorOrigin::Config => Self::Config,
            CoreErrorOrigin::Ingest => Self::Ingest,
            CoreErrorOrigin::Query => Self::Query,
            CoreErrorOrigin::Serialize => Self::Serialize,
            CoreErrorOrigin::Store => Self::Store,
        }
    }
}
