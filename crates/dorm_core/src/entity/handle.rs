//! Shared handles to live entity instances.

use crate::entity::EntityKey;
use crate::error::CoreResult;
use crate::schema::ObjectSchema;
use crate::value::{Object, Value};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::fmt;
use std::sync::Arc;

/// A shared, mutable handle to one live entity instance.
///
/// Handles are cheap to clone; clones point at the same instance. Identity
/// is pointer identity: two handles are equal only if they share the
/// instance, regardless of the field values.
#[derive(Clone)]
pub struct EntityHandle(Arc<RwLock<Object>>);

impl EntityHandle {
    /// Wraps an object.
    pub fn new(object: Object) -> Self {
        Self(Arc::new(RwLock::new(object)))
    }

    /// Locks the instance for reading.
    pub fn read(&self) -> RwLockReadGuard<'_, Object> {
        self.0.read()
    }

    /// Locks the instance for reading even if this thread already holds a
    /// read lock on it.
    pub(crate) fn read_recursive(&self) -> RwLockReadGuard<'_, Object> {
        self.0.read_recursive()
    }

    /// Locks the instance for writing.
    pub fn write(&self) -> RwLockWriteGuard<'_, Object> {
        self.0.write()
    }

    /// Returns true if both handles point at the same instance.
    pub fn ptr_eq(&self, other: &EntityHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// The instance's schema.
    pub fn schema(&self) -> Arc<ObjectSchema> {
        Arc::clone(self.read().schema())
    }

    /// The instance's type name.
    pub fn type_name(&self) -> String {
        self.read().type_name().to_string()
    }

    /// The current key, if assigned.
    pub fn key(&self) -> Option<EntityKey> {
        self.read().key()
    }

    /// A copy of a field's value.
    pub fn get(&self, field: &str) -> Option<Value> {
        self.read().get(field).cloned()
    }

    /// Assigns a field.
    ///
    /// # Errors
    ///
    /// Fails if the type has no such field.
    pub fn set(&self, field: &str, value: impl Into<Value>) -> CoreResult<()> {
        self.write().set(field, value)
    }
}

impl PartialEq for EntityHandle {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for EntityHandle {}

impl From<Object> for EntityHandle {
    fn from(object: Object) -> Self {
        Self::new(object)
    }
}

impl fmt::Debug for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never block inside Debug
        match self.0.try_read() {
            Some(object) => match object.key() {
                Some(key) => write!(f, "EntityHandle({} {key})", object.type_name()),
                None => write!(f, "EntityHandle({} <unsaved>)", object.type_name()),
            },
            None => write!(f, "EntityHandle(<locked>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldType;

    fn user() -> Object {
        let schema = ObjectSchema::builder("User")
            .identity("id")
            .field("name", FieldType::string())
            .build()
            .unwrap();
        Object::new(schema)
    }

    #[test]
    fn clones_share_the_instance() {
        let a = EntityHandle::new(user());
        let b = a.clone();
        b.set("name", "alice").unwrap();
        assert_eq!(a.get("name"), Some(Value::from("alice")));
        assert_eq!(a, b);
    }

    #[test]
    fn equal_values_are_not_identical() {
        let a = EntityHandle::new(user());
        let b = EntityHandle::new(user());
        assert_eq!(*a.read(), *b.read());
        assert_ne!(a, b);
    }

    #[test]
    fn debug_shows_type_and_key() {
        let handle = EntityHandle::new(user());
        assert_eq!(format!("{handle:?}"), "EntityHandle(User <unsaved>)");
        handle.set("id", "u1").unwrap();
        assert_eq!(format!("{handle:?}"), "EntityHandle(User u1)");
    }
}
