use crate::{
    mapreduce::{COUNT_FIELD, PRIVATE_FIELD_PREFIX},
    store::StoreScan,
    value::Document,
};
use serde::Serialize;
use std::collections::BTreeMap;

///
/// QueryResult
///
/// One result row: the bucket's event count plus every visible field
/// rendered as a string column.
///

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct QueryResult {
    pub event_count: i64,
    pub columns: BTreeMap<String, String>,
}

impl QueryResult {
    #[must_use]
    pub fn from_document(doc: &Document) -> Self {
        let columns = doc
            .iter()
            .filter(|(field, _)| {
                field.as_str() != COUNT_FIELD && !field.starts_with(PRIVATE_FIELD_PREFIX)
            })
            .map(|(field, value)| (field.clone(), value.render()))
            .collect();

        Self {
            event_count: doc.integer_or(COUNT_FIELD, 0),
            columns,
        }
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&str> {
        self.columns.get(name).map(String::as_str)
    }
}

///
/// QueryResults
///
/// Lazy rows over a store scan, in whatever order the scan yields.
///

pub struct QueryResults {
    scan: StoreScan,
}

impl QueryResults {
    #[must_use]
    pub const fn new(scan: StoreScan) -> Self {
        Self { scan }
    }
}

impl Iterator for QueryResults {
    type Item = QueryResult;

    fn next(&mut self) -> Option<Self::Item> {
        self.scan
            .next()
            .map(|(_, doc)| QueryResult::from_document(&doc))
    }
}
