use crate::{
    error::InternalError,
    key::{Key, KeyPart},
    store::{KeyValueStore, StoreEntry, StoreRef, StoreScan},
    value::Document,
};
use std::{
    collections::{BTreeMap, BTreeSet},
    ops::Bound,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
        atomic::{AtomicI64, Ordering},
    },
};

// Append keys are unique across every in-memory scope of the process.
static NEXT_APPEND_KEY: AtomicI64 = AtomicI64::new(0);

///
/// ScopeState
///

#[derive(Debug, Default)]
struct ScopeState {
    values: BTreeMap<Key, Document>,
    appended: BTreeSet<i64>,
}

///
/// MemoryStore
///
/// Ordered in-memory backend. Writes apply immediately, so `commit` only has
/// to confirm there is nothing in flight.
///

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<ScopeState>,
    children: Mutex<BTreeMap<Key, Arc<Self>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh root scope behind a shared handle.
    #[must_use]
    pub fn shared() -> StoreRef {
        Arc::new(Self::new())
    }

    /// Number of entries stored directly in this scope.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> RwLockReadGuard<'_, ScopeState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ScopeState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn children(&self) -> MutexGuard<'_, BTreeMap<Key, Arc<Self>>> {
        self.children.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Erase this scope in place so handles obtained earlier observe the deletion.
    fn erase(&self) {
        {
            let mut state = self.write();
            state.values.clear();
            state.appended.clear();
        }

        let children = std::mem::take(&mut *self.children());
        for child in children.into_values() {
            child.erase();
        }
    }

    fn scan(entries: Vec<StoreEntry>) -> StoreScan {
        Box::new(entries.into_iter())
    }
}

impl KeyValueStore for MemoryStore {
    fn child_store(&self, key: &Key) -> Result<StoreRef, InternalError> {
        let child: StoreRef = self
            .children()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Self::new()))
            .clone();

        Ok(child)
    }

    fn set_value(&self, key: &Key, doc: Option<&Document>) -> Result<(), InternalError> {
        let mut state = self.write();
        match doc {
            Some(doc) => {
                state.values.insert(key.clone(), doc.clone());
            }
            None => {
                state.values.remove(key);
            }
        }

        Ok(())
    }

    fn get_value(&self, key: &Key) -> Result<Option<Document>, InternalError> {
        Ok(self.read().values.get(key).cloned())
    }

    fn enumerate_all_values(&self) -> Result<StoreScan, InternalError> {
        let entries = self
            .read()
            .values
            .iter()
            .map(|(key, doc)| (key.clone(), doc.clone()))
            .collect();

        Ok(Self::scan(entries))
    }

    fn enumerate_values_beginning_with_key(
        &self,
        prefix: &Key,
    ) -> Result<StoreScan, InternalError> {
        // Extensions of a prefix are contiguous in key order, starting at the prefix itself.
        let entries = self
            .read()
            .values
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, doc)| (key.clone(), doc.clone()))
            .collect();

        Ok(Self::scan(entries))
    }

    fn append_value(&self, doc: &Document) -> Result<i64, InternalError> {
        let mut state = self.write();
        let marker = NEXT_APPEND_KEY.fetch_add(1, Ordering::Relaxed);
        if marker < 0 {
            return Err(InternalError::store_invariant(
                "append key space exhausted for in-memory store",
            ));
        }

        state.values.insert(Key::single(marker), doc.clone());
        state.appended.insert(marker);

        Ok(marker)
    }

    fn enumerate_values_appended_since(&self, marker: i64) -> Result<StoreScan, InternalError> {
        let state = self.read();
        let entries = state
            .appended
            .range((Bound::Excluded(marker), Bound::Unbounded))
            .filter_map(|append_key| {
                let key = Key::from([KeyPart::Int(*append_key)]);
                state.values.get(&key).map(|doc| (key, doc.clone()))
            })
            .collect();

        Ok(Self::scan(entries))
    }

    fn delete_child_store(&self, key: &Key) -> Result<(), InternalError> {
        let removed = self.children().remove(key);
        if let Some(child) = removed {
            child.erase();
        }

        Ok(())
    }

    fn commit(&self) -> Result<(), InternalError> {
        Ok(())
    }
}
