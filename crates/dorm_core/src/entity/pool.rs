//! The entity pool: a session-scoped identity map.

use crate::entity::{EntityHandle, EntityKey};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Key field name used for entries registered by primary key.
pub const PRIMARY_ID: &str = dorm_storage::ID_FIELD;

/// Identifies one pool entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    /// Type of the entity.
    pub type_name: String,
    /// The field the key value belongs to ([`PRIMARY_ID`] or a public
    /// reference field).
    pub field: String,
    /// The key value.
    pub key: EntityKey,
}

impl PoolKey {
    /// Creates a pool key.
    pub fn new(type_name: impl Into<String>, field: impl Into<String>, key: EntityKey) -> Self {
        Self {
            type_name: type_name.into(),
            field: field.into(),
            key,
        }
    }
}

/// Identity map from (type, key field, key value) to a live instance.
///
/// Within one pool lifetime there is at most one entry per key, and every
/// lookup for that key returns the same instance. The pool performs no I/O
/// and never decides about staleness; it is dropped or cleared at session
/// boundaries.
///
/// All operations take an internal mutex, so check-then-put sequences
/// through [`EntityPool::put`] are atomic.
#[derive(Debug, Default)]
pub struct EntityPool {
    entries: Mutex<HashMap<PoolKey, EntityHandle>>,
}

impl EntityPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up an instance.
    pub fn get(&self, type_name: &str, field: &str, key: &EntityKey) -> Option<EntityHandle> {
        self.entries
            .lock()
            .get(&PoolKey::new(type_name, field, key.clone()))
            .cloned()
    }

    /// Returns true if an instance is registered under the key.
    pub fn has(&self, type_name: &str, field: &str, key: &EntityKey) -> bool {
        self.entries
            .lock()
            .contains_key(&PoolKey::new(type_name, field, key.clone()))
    }

    /// Registers an instance unless the key is already taken.
    ///
    /// Returns the pooled instance: `handle` if it was registered, the
    /// existing entry otherwise. Existing entries are never overwritten.
    pub fn put(
        &self,
        type_name: &str,
        field: &str,
        key: EntityKey,
        handle: EntityHandle,
    ) -> EntityHandle {
        self.entries
            .lock()
            .entry(PoolKey::new(type_name, field, key))
            .or_insert(handle)
            .clone()
    }

    /// Registers an instance, replacing any existing entry.
    ///
    /// Returns the replaced instance.
    pub fn replace(
        &self,
        type_name: &str,
        field: &str,
        key: EntityKey,
        handle: EntityHandle,
    ) -> Option<EntityHandle> {
        self.entries
            .lock()
            .insert(PoolKey::new(type_name, field, key), handle)
    }

    /// Drops the entries under `field` of `type_name` that point at
    /// `handle`, returning how many were dropped.
    ///
    /// Entries under other fields, and entries for other instances, are
    /// left alone.
    pub fn evict(&self, type_name: &str, field: &str, handle: &EntityHandle) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|pool_key, pooled| {
            pool_key.type_name != type_name || pool_key.field != field || !pooled.ptr_eq(handle)
        });
        before - entries.len()
    }

    /// All distinct pooled instances.
    ///
    /// An instance registered under several keys is listed once.
    pub fn all(&self) -> Vec<EntityHandle> {
        let entries = self.entries.lock();
        let mut handles: Vec<EntityHandle> = Vec::with_capacity(entries.len());
        for handle in entries.values() {
            if !handles.iter().any(|seen| seen.ptr_eq(handle)) {
                handles.push(handle.clone());
            }
        }
        handles
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if the pool holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drops all entries.
    ///
    /// The instances themselves stay valid; they are just no longer
    /// identity mapped.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
