//! Key-value tables held by the in-memory engine.

use crate::{CursorMode, DbType};
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::Hasher;
use std::ops::Bound;

/// Length of the hash prefix that orders the slots of a hash table.
const HASH_PREFIX_LEN: usize = 8;

/// Entry found by a cursor move, copied out of the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct CursorEntry {
    /// Position of the entry, to resume the next move from.
    pub(super) slot: Vec<u8>,
    pub(super) key: Vec<u8>,
    pub(super) value: Vec<u8>,
}

/// Contents of one database.
///
/// Entries are stored under a *slot* that determines iteration order. For
/// hash tables the slot is a hash of the key followed by the key, which gives
/// a stable bucket order that is unrelated to key order. For every other
/// database type the slot is the key itself, so iteration is in ascending key
/// order.
#[derive(Debug, Clone)]
pub(super) struct Table {
    /// Never `DbType::Unknown`.
    db_type: DbType,

    entries: BTreeMap<Vec<u8>, Vec<u8>>,

    /// Whether the table has changed since it was last written to its file.
    dirty: bool,
}

impl Table {
    pub(super) fn new(db_type: DbType) -> Self {
        Self {
            db_type,
            entries: BTreeMap::new(),
            dirty: false,
        }
    }

    pub(super) fn db_type(&self) -> DbType {
        self.db_type
    }

    pub(super) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(super) fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(super) fn mark_clean(&mut self) {
        self.dirty = false;
    }

    fn slot(&self, key: &[u8]) -> Vec<u8> {
        match self.db_type {
            DbType::Hash => {
                let mut hasher = DefaultHasher::new();
                hasher.write(key);
                let mut slot = Vec::with_capacity(HASH_PREFIX_LEN + key.len());
                slot.extend_from_slice(&hasher.finish().to_be_bytes());
                slot.extend_from_slice(key);
                slot
            }
            _ => key.to_vec(),
        }
    }

    fn key_of<'a>(&self, slot: &'a [u8]) -> &'a [u8] {
        match self.db_type {
            DbType::Hash => &slot[HASH_PREFIX_LEN..],
            _ => slot,
        }
    }

    pub(super) fn put(&mut self, key: &[u8], value: &[u8]) {
        let slot = self.slot(key);
        self.entries.insert(slot, value.to_vec());
        self.dirty = true;
    }

    pub(super) fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.entries.get(&self.slot(key)).map(Vec::as_slice)
    }

    /// Removes the entry for `key`, returning whether there was one.
    pub(super) fn remove(&mut self, key: &[u8]) -> bool {
        let removed = self.entries.remove(&self.slot(key)).is_some();
        self.dirty |= removed;
        removed
    }

    pub(super) fn clear(&mut self) {
        self.entries.clear();
        self.dirty = true;
    }

    /// All entries as `(key, value)` pairs, in iteration order.
    pub(super) fn entries(&self) -> impl Iterator<Item = (&[u8], &[u8])> + '_ {
        self.entries
            .iter()
            .map(move |(slot, value)| (self.key_of(slot), value.as_slice()))
    }

    /// Finds the entry a cursor at `position` moves to under `mode`. An
    /// unpositioned cursor moving forward starts at the first entry, and one
    /// moving backward starts at the last entry.
    pub(super) fn seek(&self, position: Option<&[u8]>, mode: CursorMode) -> Option<CursorEntry> {
        let found = match (mode, position) {
            (CursorMode::First, _) | (CursorMode::Next, None) => self.entries.iter().next(),
            (CursorMode::Last, _) | (CursorMode::Prev, None) => self.entries.iter().next_back(),
            (CursorMode::Next, Some(pos)) => self
                .entries
                .range::<[u8], _>((Bound::Excluded(pos), Bound::Unbounded))
                .next(),
            (CursorMode::Prev, Some(pos)) => self
                .entries
                .range::<[u8], _>((Bound::Unbounded, Bound::Excluded(pos)))
                .next_back(),
        };
        found.map(|(slot, value)| CursorEntry {
            slot: slot.clone(),
            key: self.key_of(slot).to_vec(),
            value: value.clone(),
        })
    }
}
