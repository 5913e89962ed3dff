//! Single lazy reference.

use crate::entity::EntityHandle;
use crate::error::{CoreError, CoreResult};
use crate::reference::ReferenceLoader;
use crate::schema::ReferenceBy;
use dorm_codec::Document;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

#[derive(Clone)]
enum LazyState {
    Unresolved,
    Resolved(Option<EntityHandle>),
}

struct Inner {
    target: String,
    by: ReferenceBy,
    key: Option<Document>,
    loader: Option<Arc<dyn ReferenceLoader>>,
    state: Mutex<LazyState>,
}

/// A deferred pointer to an entity.
///
/// A reference is either built from a live instance ([`LazyRef::to`]), in
/// which case it starts resolved, or decoded from storage
/// ([`LazyRef::pending`]), in which case it holds the stored key and loads
/// the target on first access. The transition from unresolved to resolved
/// happens at most once; afterwards the cached outcome, instance or
/// absence, is returned without calling the loader again.
///
/// Clones share the resolution state.
#[derive(Clone)]
pub struct LazyRef {
    inner: Arc<Inner>,
}

impl LazyRef {
    /// A resolved reference to a live instance, stored by key.
    pub fn to(handle: EntityHandle) -> Self {
        Self::to_by(handle, ReferenceBy::Key)
    }

    /// A resolved reference to a live instance, stored by `by`.
    pub fn to_by(handle: EntityHandle, by: ReferenceBy) -> Self {
        Self {
            inner: Arc::new(Inner {
                target: handle.type_name(),
                by,
                key: None,
                loader: None,
                state: Mutex::new(LazyState::Resolved(Some(handle))),
            }),
        }
    }

    /// An unresolved reference holding a stored identifier.
    pub fn pending(
        target: impl Into<String>,
        by: ReferenceBy,
        key: Document,
        loader: Option<Arc<dyn ReferenceLoader>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                target: target.into(),
                by,
                key: Some(key),
                loader,
                state: Mutex::new(LazyState::Unresolved),
            }),
        }
    }

    /// Type of the referenced entity.
    pub fn target(&self) -> &str {
        &self.inner.target
    }

    /// Which identifier the reference stores.
    pub fn by(&self) -> ReferenceBy {
        self.inner.by
    }

    /// The identifier read from storage, if this reference was decoded.
    pub fn stored_key(&self) -> Option<&Document> {
        self.inner.key.as_ref()
    }

    /// Returns true once the target has been loaded or found missing.
    pub fn is_resolved(&self) -> bool {
        matches!(*self.inner.state.lock(), LazyState::Resolved(_))
    }

    /// The cached target without triggering resolution.
    pub fn peek(&self) -> Option<EntityHandle> {
        match &*self.inner.state.lock() {
            LazyState::Resolved(handle) => handle.clone(),
            LazyState::Unresolved => None,
        }
    }

    /// Resolves the reference.
    ///
    /// Returns `Ok(None)` if the target does not exist; that outcome is
    /// cached like a found target. A failed load leaves the reference
    /// unresolved so a later call may try again.
    ///
    /// # Errors
    ///
    /// Returns the loader's error, or [`CoreError::SessionClosed`] if the
    /// reference has no loader.
    pub fn get(&self) -> CoreResult<Option<EntityHandle>> {
        if let LazyState::Resolved(handle) = &*self.inner.state.lock() {
            return Ok(handle.clone());
        }

        let Some(key) = &self.inner.key else {
            return Ok(None);
        };
        let loader = self.inner.loader.as_ref().ok_or(CoreError::SessionClosed)?;

        // The lock is not held while loading; loading may decode entities
        // that point back here.
        let loaded = loader.load_reference(&self.inner.target, self.inner.by, key)?;
        trace!(target_type = %self.inner.target, key = %key, found = loaded.is_some(), "reference resolved");

        let mut state = self.inner.state.lock();
        match &*state {
            LazyState::Resolved(existing) => Ok(existing.clone()),
            LazyState::Unresolved => {
                *state = LazyState::Resolved(loaded.clone());
                Ok(loaded)
            }
        }
    }

    /// The identifier to persist for this reference.
    ///
    /// For a resolved reference this is read from the live target, so a
    /// target saved after the reference was built contributes its new key.
    /// Returns `None` when the target has no identifier yet.
    pub fn key_document(&self) -> Option<Document> {
        self.key_for(self.inner.by)
    }

    /// The identifier of kind `by` to persist for this reference.
    ///
    /// A decoded reference that was never resolved can only answer for the
    /// kind it was stored with.
    pub fn key_for(&self, by: ReferenceBy) -> Option<Document> {
        if let Some(handle) = self.peek() {
            // The target may be the object being encoded, already read locked
            if let Some(key) = handle.read_recursive().reference_key(by) {
                return Some(key);
            }
        }
        if by == self.inner.by {
            self.inner.key.clone()
        } else {
            None
        }
    }
}

impl From<EntityHandle> for LazyRef {
    fn from(handle: EntityHandle) -> Self {
        Self::to(handle)
    }
}

impl PartialEq for LazyRef {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.inner, &other.inner) {
            return true;
        }
        if self.inner.target != other.inner.target {
            return false;
        }
        match (self.key_document(), other.key_document()) {
            (Some(a), Some(b)) => a == b,
            (None, None) => match (self.peek(), other.peek()) {
                (Some(a), Some(b)) => a.ptr_eq(&b),
                _ => false,
            },
            _ => false,
        }
    }
}

impl fmt::Debug for LazyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.inner.state.try_lock().as_deref() {
            Some(LazyState::Unresolved) => "unresolved",
            Some(LazyState::Resolved(Some(_))) => "resolved",
            Some(LazyState::Resolved(None)) => "missing",
            None => "resolving",
        };
        match &self.inner.key {
            Some(key) => write!(f, "LazyRef({} {key}, {state})", self.inner.target),
            None => write!(f, "LazyRef({}, {state})", self.inner.target),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityKey;
    use crate::schema::ObjectSchema;
    use crate::value::Object;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingLoader {
        calls: AtomicUsize,
        target: Option<EntityHandle>,
        fail: bool,
    }

    impl ReferenceLoader for CountingLoader {
        fn load_reference(
            &self,
            _target: &str,
            _by: ReferenceBy,
            _key: &Document,
        ) -> CoreResult<Option<EntityHandle>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(CoreError::SessionClosed);
            }
            Ok(self.target.clone())
        }
    }

    fn entity(id: &str) -> EntityHandle {
        let schema = ObjectSchema::builder("Item")
            .identity("id")
            .public_reference("reference")
            .build()
            .unwrap();
        let handle = EntityHandle::new(Object::new(schema));
        handle.set("id", id).unwrap();
        handle
    }

    fn loader(target: Option<EntityHandle>, fail: bool) -> Arc<CountingLoader> {
        Arc::new(CountingLoader {
            calls: AtomicUsize::new(0),
            target,
            fail,
        })
    }

    #[test]
    fn resolves_once() {
        let target = entity("t1");
        let loader = loader(Some(target.clone()), false);
        let reference = LazyRef::pending(
            "Item",
            ReferenceBy::Key,
            Document::from("t1"),
            Some(loader.clone() as Arc<dyn ReferenceLoader>),
        );

        assert!(!reference.is_resolved());
        assert!(reference.get().unwrap().unwrap().ptr_eq(&target));
        assert!(reference.get().unwrap().unwrap().ptr_eq(&target));
        assert!(reference.clone().get().unwrap().unwrap().ptr_eq(&target));
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn missing_target_is_cached_as_absent() {
        let loader = loader(None, false);
        let reference = LazyRef::pending(
            "Item",
            ReferenceBy::Key,
            Document::from("gone"),
            Some(loader.clone() as Arc<dyn ReferenceLoader>),
        );
        assert!(reference.get().unwrap().is_none());
        assert!(reference.is_resolved());
        assert!(reference.get().unwrap().is_none());
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
        // The stored key survives a failed lookup
        assert_eq!(reference.key_document(), Some(Document::from("gone")));
    }

    #[test]
    fn failures_leave_the_reference_unresolved() {
        let loader = loader(None, true);
        let reference = LazyRef::pending(
            "Item",
            ReferenceBy::Key,
            Document::from("k"),
            Some(loader.clone() as Arc<dyn ReferenceLoader>),
        );
        assert!(matches!(reference.get(), Err(CoreError::SessionClosed)));
        assert!(!reference.is_resolved());
        assert!(reference.get().is_err());
        assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn without_loader_the_session_is_closed() {
        let reference = LazyRef::pending("Item", ReferenceBy::Key, Document::from("k"), None);
        assert!(matches!(reference.get(), Err(CoreError::SessionClosed)));
    }

    #[test]
    fn key_follows_the_live_target() {
        let target = entity("before");
        let reference = LazyRef::to(target.clone());
        assert_eq!(reference.key_document(), Some(Document::from("before")));

        target.set("id", "after").unwrap();
        assert_eq!(reference.key_document(), Some(Document::from("after")));

        let by_reference = LazyRef::to_by(target.clone(), ReferenceBy::PublicReference);
        assert_eq!(by_reference.key_document(), None);
        target.set("reference", "Item@abc").unwrap();
        assert_eq!(by_reference.key_document(), Some(Document::from("Item@abc")));
    }

    #[test]
    fn equality_by_target_and_key() {
        let target = entity("t1");
        let live = LazyRef::to(target.clone());
        let stored = LazyRef::pending("Item", ReferenceBy::Key, Document::from("t1"), None);
        let other = LazyRef::pending("Item", ReferenceBy::Key, Document::from("t2"), None);
        assert_eq!(live, stored);
        assert_ne!(stored, other);
        assert_eq!(target.key(), Some(EntityKey::from("t1")));
    }
}
