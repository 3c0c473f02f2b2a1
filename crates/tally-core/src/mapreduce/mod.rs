//! Composable map/reduce.
//!
//! Query verbs become `Operator`s; a `Compositor` orders them and builds a
//! `Pipeline` of one root `Stage` plus an optional chain of stages that
//! re-aggregate the root's buckets.

mod date;
mod operator;
mod pipeline;
mod result;

#[cfg(test)]
mod tests;

// re-exports
pub use date::{days_since_epoch, parse_iso8601};
pub use operator::{ChainRole, DateFormat, Operator};
pub use pipeline::{ChainInput, Compositor, Pipeline, Stage};
pub use result::{COUNT_FIELD, INTERMEDIATE_FIELD, KEY_FIELD, MapResult, PRIVATE_FIELD_PREFIX};
