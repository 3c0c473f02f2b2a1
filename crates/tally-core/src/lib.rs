//! Core engine for Tally: incremental map/reduce aggregation with retraction.
//!
//! Events are mapped through a compiled query pipeline, queued, and folded
//! into stored aggregates by batched commits. Chained stages re-aggregate
//! buckets for unique counts and index stripping.

pub mod config;
pub mod error;
pub mod ingest;
pub mod key;
pub mod mapreduce;
pub mod obs;
pub mod query;
pub mod store;
pub mod value;

// test
#[cfg(test)]
pub(crate) mod test_fixtures;

///
/// Prelude
///
/// Domain vocabulary only; no stores, sinks or error plumbing.
///

pub mod prelude {
    pub use crate::{
        ingest::DataIngestor,
        key::{Key, KeyPart},
        query::{QueryExpr, QueryResult},
        value::{Document, Value},
    };
}
