//! Key/value store contract consumed by the ingestor and result readers.
//!
//! Contract:
//! - `child_store` with equal keys returns the same logical scope; scopes are
//!   isolated from siblings and from their parent.
//! - `set_value` upserts (or deletes on `None`); concurrent writes to distinct
//!   keys are safe, same-key writes are last-writer-wins.
//! - Scans are finite, restartable per call, and never yield deleted entries
//!   or internal bookkeeping.
//! - `append_value` issues strictly increasing integer keys per scope.
//! - `delete_child_store` erases a scope and everything nested below it;
//!   deleting an absent scope is a no-op.
//! - `commit` waits until every earlier write is applied.

mod memory;

use crate::{error::InternalError, key::Key, value::Document};
use std::sync::Arc;

// re-exports
pub use memory::MemoryStore;

///
/// CONSTANTS
///

/// Marker that asks `enumerate_values_appended_since` for every appended entry.
pub const APPEND_FROM_START: i64 = -1;

/// One stored entry as yielded by scans.
pub type StoreEntry = (Key, Document);

/// Lazy, finite scan over store entries.
pub type StoreScan = Box<dyn Iterator<Item = StoreEntry> + Send>;

/// Shared handle to a store scope.
pub type StoreRef = Arc<dyn KeyValueStore>;

///
/// KeyValueStore
///

pub trait KeyValueStore: Send + Sync {
    /// Scope nested under `key`; repeated calls with an equal key share state.
    fn child_store(&self, key: &Key) -> Result<StoreRef, InternalError>;

    /// Upsert `doc` at `key`, or delete the entry when `doc` is `None`.
    fn set_value(&self, key: &Key, doc: Option<&Document>) -> Result<(), InternalError>;

    /// Point lookup.
    fn get_value(&self, key: &Key) -> Result<Option<Document>, InternalError>;

    /// Full scan of this scope (children excluded).
    fn enumerate_all_values(&self) -> Result<StoreScan, InternalError>;

    /// Range scan over entries whose key begins with `prefix`.
    fn enumerate_values_beginning_with_key(&self, prefix: &Key)
    -> Result<StoreScan, InternalError>;

    /// Store `doc` under a fresh `[n]` key and return `n`.
    fn append_value(&self, doc: &Document) -> Result<i64, InternalError>;

    /// Entries appended with a key strictly greater than `marker`.
    fn enumerate_values_appended_since(&self, marker: i64) -> Result<StoreScan, InternalError>;

    /// Recursively erase the child scope under `key`.
    fn delete_child_store(&self, key: &Key) -> Result<(), InternalError>;

    /// Wait for previously requested writes to be applied.
    fn commit(&self) -> Result<(), InternalError>;
}

/// Named child scope, e.g. `"chain"` or `"events"`.
pub fn named_child(store: &dyn KeyValueStore, name: &str) -> Result<StoreRef, InternalError> {
    store.child_store(&Key::single(name))
}
