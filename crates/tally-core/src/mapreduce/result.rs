use crate::{
    key::{Key, KeyPart},
    value::{Document, Value},
};

///
/// CONSTANTS
///

/// Number of source documents contributing to a bucket.
pub const COUNT_FIELD: &str = "Count";

/// Bucket key carried by documents forwarded into a chained stage.
pub const KEY_FIELD: &str = "_key";

/// Private sub-document holding operator state needed for re-reduction.
pub const INTERMEDIATE_FIELD: &str = "_intermediate";

/// Fields with this prefix are engine bookkeeping, never result columns.
pub const PRIVATE_FIELD_PREFIX: char = '_';

///
/// MapResult
///
/// Accumulator threaded through every map operator of one stage.
///
/// The key has two regions: `key[..index_cursor]` holds index parts in
/// insertion order, the remainder holds normal parts. Positions handed out by
/// `add_key` are relative to the normal region so later index inserts never
/// invalidate them.
///

#[derive(Clone, Debug, Default)]
pub struct MapResult {
    rejected: bool,
    key: Vec<KeyPart>,
    index_cursor: usize,
    doc: Document,
}

impl MapResult {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Latch this result so `emit` produces nothing.
    pub const fn reject(&mut self) {
        self.rejected = true;
    }

    #[must_use]
    pub const fn is_rejected(&self) -> bool {
        self.rejected
    }

    /// Append to the normal region; returns the slot for `remove_key_at_index`.
    pub fn add_key(&mut self, part: KeyPart) -> usize {
        let slot = self.key.len() - self.index_cursor;
        self.key.push(part);

        slot
    }

    /// Append to the index region, ahead of every normal part.
    pub fn add_index_key(&mut self, part: KeyPart) {
        self.key.insert(self.index_cursor, part);
        self.index_cursor += 1;
    }

    /// Null out a normal slot. Slots never shift.
    pub fn remove_key_at_index(&mut self, slot: usize) {
        if let Some(part) = self.key.get_mut(self.index_cursor + slot) {
            *part = KeyPart::Null;
        }
    }

    /// Drop the whole index region.
    pub fn remove_index_keys(&mut self) {
        self.key.drain(..self.index_cursor);
        self.index_cursor = 0;
    }

    pub fn set_value(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.doc.insert(field.into(), value.into());
    }

    pub fn remove_value(&mut self, field: &str) {
        self.doc.remove(field);
    }

    /// Stash operator state under the private intermediate sub-document.
    pub fn set_intermediate_value(&mut self, field: impl Into<String>, state: Document) {
        self.doc
            .sub_document_mut(INTERMEDIATE_FIELD)
            .insert(field.into(), Value::Map(state));
    }

    /// Replace the key wholesale.
    ///
    /// With `preserve_index_marker` the trailing part is read back as the
    /// index cursor and removed; a missing or out-of-range marker rejects.
    pub fn set_key(&mut self, key: Key, preserve_index_marker: bool) {
        let mut parts = key.into_parts();
        self.index_cursor = 0;

        if preserve_index_marker {
            let marker = parts
                .pop()
                .and_then(|part| part.as_int())
                .and_then(|n| usize::try_from(n).ok());
            match marker {
                Some(cursor) if cursor <= parts.len() => self.index_cursor = cursor,
                _ => self.reject(),
            }
        }

        self.key = parts;
    }

    #[must_use]
    pub fn key_parts(&self) -> &[KeyPart] {
        &self.key
    }

    #[must_use]
    pub const fn document(&self) -> &Document {
        &self.doc
    }

    pub const fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    /// Hand `(key, document)` to `target` unless rejected. The index cursor is
    /// appended as a trailing integer only when an index region exists.
    pub fn emit(self, target: &mut Vec<(Key, Document)>) {
        if let Some(entry) = self.finish() {
            target.push(entry);
        }
    }

    /// Consume into the emitted pair, if any.
    #[must_use]
    pub fn finish(self) -> Option<(Key, Document)> {
        if self.rejected {
            return None;
        }

        let mut key = Key::from_parts(self.key);
        if self.index_cursor > 0 {
            let marker = i64::try_from(self.index_cursor).unwrap_or(i64::MAX);
            key.push(marker);
        }

        Some((key, self.doc))
    }
}
