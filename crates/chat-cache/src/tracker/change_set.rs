//! Typed change sets
//!
//! One [`Change`] per touched field, keyed by the field discriminant of the
//! entity's value enum. The first write to a field records its original; later
//! writes only move `new`.

use chat_core::{FieldValue, Snapshot};
use std::collections::HashMap;

/// Original and current value of one field
#[derive(Debug, Clone, PartialEq)]
pub struct Change<V> {
    /// Snapshot taken before the first edit
    pub old: V,
    /// Latest value written
    pub new: V,
}

impl<V: PartialEq> Change<V> {
    /// Whether the field ended up different from its original
    pub fn is_effective(&self) -> bool {
        self.old != self.new
    }
}

/// Changes recorded during one edit session, in first-touch order
#[derive(Debug, Clone)]
pub struct ChangeSet<V: FieldValue> {
    changes: Vec<Change<V>>,
    index: HashMap<V::Field, usize>,
}

impl<V: FieldValue> Default for ChangeSet<V> {
    fn default() -> Self {
        Self {
            changes: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<V: FieldValue> ChangeSet<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn contains(&self, field: V::Field) -> bool {
        self.index.contains_key(&field)
    }

    pub fn get(&self, field: V::Field) -> Option<&Change<V>> {
        self.index.get(&field).map(|&i| &self.changes[i])
    }

    /// Record a write
    ///
    /// `original` is only called, and snapshotted, on the first write to the
    /// field.
    pub fn record(&mut self, value: V, original: impl FnOnce() -> V) {
        let field = value.field();
        if let Some(&i) = self.index.get(&field) {
            self.changes[i].new = value;
            return;
        }
        let old = original().snapshot();
        self.index.insert(field, self.changes.len());
        self.changes.push(Change { old, new: value });
    }

    pub fn iter(&self) -> impl Iterator<Item = &Change<V>> {
        self.changes.iter()
    }

    /// Latest value of every touched field
    pub fn latest(&self) -> impl Iterator<Item = &V> {
        self.changes.iter().map(|c| &c.new)
    }

    /// Changes whose final value differs from the original
    pub fn effective(&self) -> impl Iterator<Item = &Change<V>> {
        self.changes.iter().filter(|c| c.is_effective())
    }

    pub fn clear(&mut self) {
        self.changes.clear();
        self.index.clear();
    }

    /// Take the recorded changes, leaving the set empty
    pub fn take(&mut self) -> Vec<Change<V>> {
        self.index.clear();
        std::mem::take(&mut self.changes)
    }
}
