//! Entity cache
//!
//! Concurrent map of tracked entities keyed by id. Push events go through
//! [`EntityCache::observe`]; application code fetches an entity and drives its
//! edit session directly.

use crate::tracker::{RemoteOutcome, TrackedEntity};
use chat_core::{Deletable, Entity, Mutable, NetworkSynced, Snowflake};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

/// Cache of tracked entities of one type
pub struct EntityCache<E: Mutable> {
    entries: DashMap<Snowflake, Arc<TrackedEntity<E>>>,
}

impl<E: Mutable> Default for EntityCache<E> {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<E: Mutable> EntityCache<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: Snowflake) -> Option<Arc<TrackedEntity<E>>> {
        self.entries.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Insert or replace an entity, returning its tracked handle
    ///
    /// A replaced handle keeps working but is no longer reachable from the cache.
    pub fn insert(&self, entity: E) -> Arc<TrackedEntity<E>> {
        let tracked = Arc::new(TrackedEntity::new(entity));
        self.entries.insert(tracked.id(), Arc::clone(&tracked));
        tracked
    }

    pub fn contains(&self, id: Snowflake) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> Vec<Snowflake> {
        self.entries.iter().map(|entry| *entry.key()).collect()
    }

    /// Drop an entry without signalling deletion
    pub fn evict(&self, id: Snowflake) -> Option<Arc<TrackedEntity<E>>> {
        self.entries.remove(&id).map(|(_, tracked)| tracked)
    }
}

impl<E: Mutable + NetworkSynced> EntityCache<E> {
    /// Fold a push update into the cache
    pub fn observe(&self, incoming: E) -> (Arc<TrackedEntity<E>>, RemoteOutcome) {
        let id = incoming.id();
        // Clone the handle out so the shard lock is not held across the merge
        let existing = match self.entries.entry(id) {
            Entry::Occupied(entry) => Arc::clone(entry.get()),
            Entry::Vacant(entry) => {
                let tracked = Arc::new(TrackedEntity::new(incoming));
                entry.insert(Arc::clone(&tracked));
                tracing::trace!(entity_id = %id, "Cached new entity");
                return (tracked, RemoteOutcome::Created);
            }
        };
        let outcome = existing.observe_remote(incoming);
        tracing::trace!(entity_id = %id, ?outcome, "Observed push update");
        (existing, outcome)
    }
}

impl<E: Mutable + Deletable> EntityCache<E> {
    /// Apply the deletion signal and evict the entry
    ///
    /// Handles still held elsewhere observe the Deleted state.
    pub fn delete(&self, id: Snowflake) -> Option<Arc<TrackedEntity<E>>> {
        let (_, tracked) = self.entries.remove(&id)?;
        tracked.mark_deleted();
        tracing::debug!(entity_id = %id, remaining = self.entries.len(), "Evicted deleted entity");
        Some(tracked)
    }
}

impl<E: Mutable> std::fmt::Debug for EntityCache<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityCache")
            .field("len", &self.entries.len())
            .finish()
    }
}
