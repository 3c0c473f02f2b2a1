//! Tally: incremental map/reduce aggregation with retraction.
//!
//! Build an [`Engine`] over a store, open named [`Aggregation`]s from query
//! expressions, feed events in and read result rows back out.

pub mod engine;
pub mod error;

// re-exports
pub use engine::{Aggregation, EVENT_LOG_STORE, Engine};
pub use error::Error;
pub use tally_core as core;

///
/// CONSTANTS
///

/// Crate version, for diagnostics.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

///
/// Prelude
///
/// Everything needed to define and drive an aggregation.
///

pub mod prelude {
    pub use crate::{
        core::{
            config::EngineConfig,
            key::{Key, KeyPart},
            query::{QueryExpr, QueryResult},
            value::{Document, Value},
        },
        engine::{Aggregation, Engine},
        error::Error,
    };
}
