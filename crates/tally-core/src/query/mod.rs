//! Query expressions, compilation to pipelines, and result rows.

mod compile;
mod expr;
mod result;

#[cfg(test)]
mod tests;

// re-exports
pub use compile::{QueryError, compile};
pub use expr::QueryExpr;
pub use result::{QueryResult, QueryResults};
