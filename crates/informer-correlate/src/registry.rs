//! Settled objects
//!
//! Objects whose kind gets a kernel id are kept in the id table. Objects that
//! are only reachable through a descriptor (links) are kept in a separate
//! handle table keyed by (owner pid, kind, handle). Both tables have the same
//! bounded semantics.

use informer_core::events::{ObjectKey, TrackedObject};
use informer_core::store::{KeyedStateStore, OverflowPolicy};
use informer_core::StoreError;
use tracing::trace;

/// Outcome of registering an object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// The key was not live before
    Added,
    /// The key was live; its record has been replaced
    Updated,
    /// The named table is full and the key was new; nothing was stored
    Rejected { table: &'static str },
}

/// Bounds of the two registry tables
#[derive(Debug, Clone, Copy)]
pub struct RegistryLimits {
    pub object_capacity: usize,
    pub handle_capacity: usize,
    pub shards: usize,
    pub policy: OverflowPolicy,
}

pub struct ObjectRegistry {
    by_id: KeyedStateStore<ObjectKey, TrackedObject>,
    by_handle: KeyedStateStore<ObjectKey, TrackedObject>,
}

impl ObjectRegistry {
    pub fn new(limits: RegistryLimits) -> Self {
        Self {
            by_id: KeyedStateStore::new(limits.object_capacity, limits.shards, limits.policy),
            by_handle: KeyedStateStore::new(limits.handle_capacity, limits.shards, limits.policy),
        }
    }

    fn table(&self, key: &ObjectKey) -> &KeyedStateStore<ObjectKey, TrackedObject> {
        match key {
            ObjectKey::Id { .. } => &self.by_id,
            ObjectKey::Handle { .. } => &self.by_handle,
        }
    }

    fn table_name(key: &ObjectKey) -> &'static str {
        match key {
            ObjectKey::Id { .. } => "object",
            ObjectKey::Handle { .. } => "handle",
        }
    }

    /// Insert `object` under `key`, or replace the live record for it.
    ///
    /// The insert-or-replace happens under one shard lock, so concurrent
    /// registrations of the same key yield exactly one `Added`.
    pub fn register(&self, key: ObjectKey, object: TrackedObject) -> Classification {
        match self.table(&key).upsert(key, object) {
            Ok(None) => Classification::Added,
            Ok(Some(_previous)) => Classification::Updated,
            Err(StoreError::CapacityExceeded { capacity }) => {
                let table = Self::table_name(&key);
                trace!(%key, table, capacity, "registry full, object not tracked");
                Classification::Rejected { table }
            }
        }
    }

    /// Remove and return the live record for `key`, if any
    pub fn unregister(&self, key: &ObjectKey) -> Option<TrackedObject> {
        self.table(key).remove(key)
    }

    pub fn lookup(&self, key: &ObjectKey) -> Option<TrackedObject> {
        self.table(key).lookup(key)
    }

    /// Live objects across both tables
    pub fn len(&self) -> usize {
        self.by_id.len() + self.by_handle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty() && self.by_handle.is_empty()
    }

    pub fn id_count(&self) -> usize {
        self.by_id.len()
    }

    pub fn handle_count(&self) -> usize {
        self.by_handle.len()
    }

    /// Live objects reclaimed by capacity pressure, across both tables
    pub fn evicted(&self) -> u64 {
        self.by_id.evicted() + self.by_handle.evicted()
    }

    /// Copy of every live object. Allocates; not for the notification path.
    pub fn live_objects(&self) -> Vec<TrackedObject> {
        self.by_id
            .entries()
            .into_iter()
            .chain(self.by_handle.entries())
            .map(|(_, object)| object)
            .collect()
    }
}
