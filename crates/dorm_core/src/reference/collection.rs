//! Collections of lazy references.

use crate::entity::EntityHandle;
use crate::error::CoreResult;
use crate::reference::LazyRef;
use std::collections::BTreeMap;

/// A list or map of references that resolve one element at a time.
///
/// Accessing an element resolves only that element. Iteration walks the
/// elements in order (list order, or key order for maps) and yields
/// `Ok(None)` for targets that no longer exist. Any other failure to load a
/// target is yielded as an error for that element.
#[derive(Debug, Clone, PartialEq)]
pub enum LazyRefCollection {
    /// An ordered list of references.
    List(Vec<LazyRef>),
    /// A string-keyed map of references.
    Map(BTreeMap<String, LazyRef>),
}

impl LazyRefCollection {
    /// An empty list.
    pub fn new_list() -> Self {
        Self::List(Vec::new())
    }

    /// An empty map.
    pub fn new_map() -> Self {
        Self::Map(BTreeMap::new())
    }

    /// A list of references to live instances.
    pub fn from_handles(handles: impl IntoIterator<Item = EntityHandle>) -> Self {
        Self::List(handles.into_iter().map(LazyRef::to).collect())
    }

    /// A map of references to live instances.
    pub fn from_entries(entries: impl IntoIterator<Item = (String, EntityHandle)>) -> Self {
        Self::Map(
            entries
                .into_iter()
                .map(|(key, handle)| (key, LazyRef::to(handle)))
                .collect(),
        )
    }

    /// Number of stored references.
    pub fn len(&self) -> usize {
        match self {
            Self::List(refs) => refs.len(),
            Self::Map(refs) => refs.len(),
        }
    }

    /// Returns true if no references are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolves the list element at `index`.
    ///
    /// Always `Ok(None)` for maps and out of range indexes.
    ///
    /// # Errors
    ///
    /// Propagates the failure to load an existing target.
    pub fn get(&self, index: usize) -> CoreResult<Option<EntityHandle>> {
        match self {
            Self::List(refs) => refs.get(index).map_or(Ok(None), LazyRef::get),
            Self::Map(_) => Ok(None),
        }
    }

    /// Resolves the map entry under `key`.
    ///
    /// Always `Ok(None)` for lists and absent keys.
    ///
    /// # Errors
    ///
    /// Propagates the failure to load an existing target.
    pub fn get_key(&self, key: &str) -> CoreResult<Option<EntityHandle>> {
        match self {
            Self::Map(refs) => refs.get(key).map_or(Ok(None), LazyRef::get),
            Self::List(_) => Ok(None),
        }
    }

    /// The unresolved references in order.
    pub fn refs(&self) -> Box<dyn Iterator<Item = &LazyRef> + '_> {
        match self {
            Self::List(refs) => Box::new(refs.iter()),
            Self::Map(refs) => Box::new(refs.values()),
        }
    }

    /// Map keys in order; empty for lists.
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        let keys = match self {
            Self::Map(refs) => Some(refs.keys().map(String::as_str)),
            Self::List(_) => None,
        };
        keys.into_iter().flatten()
    }

    /// Resolves elements on demand, in order.
    pub fn iter(&self) -> impl Iterator<Item = CoreResult<Option<EntityHandle>>> + '_ {
        self.refs().map(LazyRef::get)
    }

    /// Resolves every element, skipping targets that do not exist.
    ///
    /// # Errors
    ///
    /// Stops at the first element whose target fails to load.
    pub fn resolved(&self) -> CoreResult<Vec<EntityHandle>> {
        let mut handles = Vec::with_capacity(self.len());
        for handle in self.iter() {
            handles.extend(handle?);
        }
        Ok(handles)
    }

    /// Appends a reference to a list.
    ///
    /// Returns false, leaving the collection unchanged, on a map.
    pub fn push(&mut self, reference: impl Into<LazyRef>) -> bool {
        match self {
            Self::List(refs) => {
                refs.push(reference.into());
                true
            }
            Self::Map(_) => false,
        }
    }

    /// Inserts a reference into a map.
    ///
    /// Returns false, leaving the collection unchanged, on a list.
    pub fn insert(&mut self, key: impl Into<String>, reference: impl Into<LazyRef>) -> bool {
        match self {
            Self::Map(refs) => {
                refs.insert(key.into(), reference.into());
                true
            }
            Self::List(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CoreError, CoreResult};
    use crate::reference::ReferenceLoader;
    use crate::schema::{ObjectSchema, ReferenceBy};
    use crate::value::Object;
    use dorm_codec::Document;
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct RecordingLoader {
        targets: Vec<EntityHandle>,
        requested: Mutex<Vec<String>>,
    }

    impl ReferenceLoader for RecordingLoader {
        fn load_reference(
            &self,
            _target: &str,
            _by: ReferenceBy,
            key: &Document,
        ) -> CoreResult<Option<EntityHandle>> {
            let key = key.as_text().unwrap_or_default().to_string();
            self.requested.lock().push(key.clone());
            if key == "broken" {
                return Err(CoreError::schema_mismatch("name", "string", "integer"));
            }
            Ok(self
                .targets
                .iter()
                .find(|h| h.key().map(|k| k.to_string()) == Some(key.clone()))
                .cloned())
        }
    }

    fn entity(id: &str) -> EntityHandle {
        let schema = ObjectSchema::builder("Child").identity("id").build().unwrap();
        let handle = EntityHandle::new(Object::new(schema));
        handle.set("id", id).unwrap();
        handle
    }

    fn pending(loader: &Arc<RecordingLoader>, key: &str) -> LazyRef {
        LazyRef::pending(
            "Child",
            ReferenceBy::Key,
            Document::from(key),
            Some(Arc::clone(loader) as Arc<dyn ReferenceLoader>),
        )
    }

    #[test]
    fn elements_resolve_independently() {
        let loader = Arc::new(RecordingLoader {
            targets: vec![entity("c1"), entity("c2")],
            requested: Mutex::new(Vec::new()),
        });
        let list = LazyRefCollection::List(vec![
            pending(&loader, "c1"),
            pending(&loader, "c2"),
            pending(&loader, "gone"),
        ]);

        assert_eq!(list.len(), 3);
        assert_eq!(list.get(1).unwrap().unwrap().key().unwrap().to_string(), "c2");
        assert_eq!(*loader.requested.lock(), vec!["c2".to_string()]);

        let resolved: Vec<Option<String>> = list
            .iter()
            .map(|h| h.unwrap().and_then(|h| h.key()).map(|k| k.to_string()))
            .collect();
        assert_eq!(resolved, vec![Some("c1".to_string()), Some("c2".to_string()), None]);
        assert_eq!(list.resolved().unwrap().len(), 2);
        // c2 was cached, the others loaded once each
        assert_eq!(loader.requested.lock().len(), 3);
    }

    #[test]
    fn load_failures_surface_per_element() {
        let loader = Arc::new(RecordingLoader {
            targets: vec![entity("c1")],
            requested: Mutex::new(Vec::new()),
        });
        let list = LazyRefCollection::List(vec![
            pending(&loader, "broken"),
            pending(&loader, "c1"),
            pending(&loader, "gone"),
        ]);

        let outcomes: Vec<&str> = list
            .iter()
            .map(|element| match element {
                Ok(Some(_)) => "found",
                Ok(None) => "missing",
                Err(_) => "failed",
            })
            .collect();
        assert_eq!(outcomes, vec!["failed", "found", "missing"]);
        assert!(matches!(list.get(0), Err(CoreError::SchemaMismatch { .. })));
        assert!(matches!(list.resolved(), Err(CoreError::SchemaMismatch { .. })));
        // The failed element is retried, its siblings stay cached
        let resolved: Vec<bool> = list.refs().map(LazyRef::is_resolved).collect();
        assert_eq!(resolved, vec![false, true, true]);
    }

    #[test]
    fn maps_iterate_in_key_order() {
        let mut map = LazyRefCollection::new_map();
        assert!(map.insert("b", entity("2")));
        assert!(map.insert("a", entity("1")));
        assert!(!map.push(entity("3")));

        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(map.get_key("a").unwrap().unwrap().key().unwrap().to_string(), "1");
        assert!(map.get(0).unwrap().is_none());
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn lists_from_handles() {
        let children = vec![entity("x"), entity("y")];
        let list = LazyRefCollection::from_handles(children.clone());
        assert!(list.get(0).unwrap().unwrap().ptr_eq(&children[0]));
        assert!(list.get(5).unwrap().is_none());
        assert!(list.get_key("x").unwrap().is_none());
        assert_eq!(list.keys().count(), 0);
        assert!(LazyRefCollection::new_list().is_empty());
    }
}
