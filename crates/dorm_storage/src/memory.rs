//! In-memory document database.

use crate::backend::{DocumentCursor, DocumentStore, ReplaceOutcome};
use crate::error::{StoreError, StoreResult};
use crate::filter::Filter;
use crate::index::{render_key, IndexEntries, IndexSpec, ID_FIELD, ID_INDEX};
use dorm_codec::{from_cbor, to_canonical_cbor, Document};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// An in-memory document database.
///
/// Documents are held as canonical CBOR, so every read decodes a fresh
/// copy. Unique indexes are enforced on insert and replace exactly like a
/// server would, including the native duplicate-key error message.
///
/// Suitable for:
/// - Unit and feature tests
/// - Ephemeral sessions that don't need persistence
///
/// # Example
///
/// ```rust
/// use dorm_codec::Document;
/// use dorm_storage::{DocumentStore, Filter, InMemoryStore};
///
/// let store = InMemoryStore::new("app");
/// let doc = Document::map(vec![("_id".to_string(), Document::from("a"))]);
/// store.insert("users", &doc).unwrap();
///
/// let err = store.insert("users", &doc).unwrap_err();
/// assert!(err.is_duplicate_key());
/// assert_eq!(store.count("users", &Filter::all()).unwrap(), 1);
/// ```
#[derive(Debug)]
pub struct InMemoryStore {
    name: String,
    collections: RwLock<HashMap<String, CollectionData>>,
    closed: AtomicBool,
}

#[derive(Debug)]
struct StoredDocument {
    id: Vec<u8>,
    bytes: Vec<u8>,
}

#[derive(Debug)]
struct CollectionData {
    next_seq: u64,
    /// Documents in insertion order.
    documents: BTreeMap<u64, StoredDocument>,
    by_id: HashMap<Vec<u8>, u64>,
    /// Secondary indexes; the primary key is enforced through `by_id`.
    indexes: Vec<IndexEntries>,
}

impl CollectionData {
    fn new() -> Self {
        Self {
            next_seq: 0,
            documents: BTreeMap::new(),
            by_id: HashMap::new(),
            indexes: Vec::new(),
        }
    }

    fn check_unique(&self, table: &str, id: &[u8], document: &Document) -> StoreResult<()> {
        for index in &self.indexes {
            if let Some(key) = index.conflict(id, document) {
                return Err(StoreError::duplicate_key(
                    table,
                    &index.spec.name,
                    &render_key(&key),
                ));
            }
        }
        Ok(())
    }

    fn add(&mut self, id: Vec<u8>, bytes: Vec<u8>, document: &Document) {
        for index in &mut self.indexes {
            index.insert(&id, document);
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.by_id.insert(id.clone(), seq);
        self.documents.insert(seq, StoredDocument { id, bytes });
    }

    fn remove(&mut self, seq: u64) -> StoreResult<()> {
        if let Some(stored) = self.documents.remove(&seq) {
            let old = from_cbor(&stored.bytes)?;
            for index in &mut self.indexes {
                index.remove(&stored.id, &old);
            }
            self.by_id.remove(&stored.id);
        }
        Ok(())
    }
}

impl InMemoryStore {
    /// Creates an empty database with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collections: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Closes the database. Every later operation fails with [`StoreError::Closed`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Names of all collections that have been written to.
    #[must_use]
    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Drops every collection.
    pub fn clear(&self) {
        self.collections.write().clear();
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }

    fn qualified(&self, collection: &str) -> String {
        format!("{}.{}", self.name, collection)
    }

    /// Validates a document and returns its encoded `_id` and body.
    fn prepare(document: &Document) -> StoreResult<(Vec<u8>, Vec<u8>)> {
        if document.as_map().is_none() {
            return Err(StoreError::invalid_document(format!(
                "expected a map, got {}",
                document.type_name()
            )));
        }
        let id = match document.get(ID_FIELD) {
            Some(id) if !id.is_null() => id,
            _ => return Err(StoreError::invalid_document("missing _id")),
        };
        Ok((to_canonical_cbor(id)?, to_canonical_cbor(document)?))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new("dorm")
    }
}

impl DocumentStore for InMemoryStore {
    fn database_name(&self) -> &str {
        &self.name
    }

    fn insert(&self, collection: &str, document: &Document) -> StoreResult<()> {
        self.ensure_open()?;
        let (id, bytes) = Self::prepare(document)?;
        let table = self.qualified(collection);

        let mut collections = self.collections.write();
        let data = collections
            .entry(collection.to_string())
            .or_insert_with(CollectionData::new);

        if data.by_id.contains_key(&id) {
            let key = document.get(ID_FIELD).cloned().unwrap_or(Document::Null);
            return Err(StoreError::duplicate_key(&table, ID_INDEX, &render_key(&[key])));
        }
        data.check_unique(&table, &id, document)?;
        data.add(id, bytes, document);
        Ok(())
    }

    fn replace(
        &self,
        collection: &str,
        document: &Document,
        upsert: bool,
    ) -> StoreResult<ReplaceOutcome> {
        self.ensure_open()?;
        let (id, bytes) = Self::prepare(document)?;
        let table = self.qualified(collection);

        let mut collections = self.collections.write();
        let data = collections
            .entry(collection.to_string())
            .or_insert_with(CollectionData::new);

        let existing = data.by_id.get(&id).copied();
        if existing.is_none() && !upsert {
            return Ok(ReplaceOutcome::NotFound);
        }
        data.check_unique(&table, &id, document)?;

        match existing {
            Some(seq) => {
                let old_bytes = data
                    .documents
                    .get(&seq)
                    .map(|stored| stored.bytes.clone())
                    .unwrap_or_default();
                let old = from_cbor(&old_bytes)?;
                for index in &mut data.indexes {
                    index.remove(&id, &old);
                    index.insert(&id, document);
                }
                data.documents.insert(seq, StoredDocument { id, bytes });
                Ok(ReplaceOutcome::Replaced)
            }
            None => {
                data.add(id, bytes, document);
                Ok(ReplaceOutcome::Inserted)
            }
        }
    }

    fn delete_many(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        self.ensure_open()?;
        let mut collections = self.collections.write();
        let Some(data) = collections.get_mut(collection) else {
            return Ok(0);
        };

        let mut doomed = Vec::new();
        for (seq, stored) in &data.documents {
            if filter.matches(&from_cbor(&stored.bytes)?) {
                doomed.push(*seq);
            }
        }
        for seq in &doomed {
            data.remove(*seq)?;
        }
        Ok(doomed.len() as u64)
    }

    fn find(&self, collection: &str, filter: &Filter) -> StoreResult<DocumentCursor> {
        self.ensure_open()?;
        let snapshot: Vec<Vec<u8>> = self
            .collections
            .read()
            .get(collection)
            .map(|data| data.documents.values().map(|s| s.bytes.clone()).collect())
            .unwrap_or_default();

        let filter = filter.clone();
        Ok(Box::new(snapshot.into_iter().filter_map(move |bytes| {
            match from_cbor(&bytes) {
                Ok(doc) => filter.matches(&doc).then_some(Ok(doc)),
                Err(e) => Some(Err(e.into())),
            }
        })))
    }

    fn count(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        self.ensure_open()?;
        let collections = self.collections.read();
        let Some(data) = collections.get(collection) else {
            return Ok(0);
        };
        let mut count = 0;
        for stored in data.documents.values() {
            if filter.matches(&from_cbor(&stored.bytes)?) {
                count += 1;
            }
        }
        Ok(count)
    }

    fn ensure_index(&self, collection: &str, spec: &IndexSpec) -> StoreResult<()> {
        self.ensure_open()?;
        if spec.name == ID_INDEX {
            return if spec.same_options(&IndexSpec::primary()) {
                Ok(())
            } else {
                Err(StoreError::IndexOptionsConflict {
                    name: spec.name.clone(),
                })
            };
        }

        let table = self.qualified(collection);
        let mut collections = self.collections.write();
        let data = collections
            .entry(collection.to_string())
            .or_insert_with(CollectionData::new);

        if let Some(existing) = data.indexes.iter().find(|i| i.spec.name == spec.name) {
            return if existing.spec.same_options(spec) {
                Ok(())
            } else {
                Err(StoreError::IndexOptionsConflict {
                    name: spec.name.clone(),
                })
            };
        }

        let mut entries = IndexEntries::new(spec.clone());
        for stored in data.documents.values() {
            let doc = from_cbor(&stored.bytes)?;
            if let Some(key) = entries.conflict(&stored.id, &doc) {
                return Err(StoreError::duplicate_key(&table, &spec.name, &render_key(&key)));
            }
            entries.insert(&stored.id, &doc);
        }

        debug!(collection = %table, index = %spec.name, unique = spec.unique, "index created");
        data.indexes.push(entries);
        Ok(())
    }

    fn indexes(&self, collection: &str) -> StoreResult<Vec<IndexSpec>> {
        self.ensure_open()?;
        let mut specs = vec![IndexSpec::primary()];
        if let Some(data) = self.collections.read().get(collection) {
            specs.extend(data.indexes.iter().map(|i| i.spec.clone()));
        }
        Ok(specs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, reference: &str) -> Document {
        Document::map(vec![
            (ID_FIELD.to_string(), Document::from(id)),
            ("reference".to_string(), Document::from(reference)),
        ])
    }

    fn write_code(err: &StoreError) -> (i32, String) {
        match err {
            StoreError::Write { code, message } => (*code, message.clone()),
            other => panic!("expected write error, got {other:?}"),
        }
    }

    #[test]
    fn insert_and_find() {
        let store = InMemoryStore::new("db");
        store.insert("c", &doc("1", "a")).unwrap();
        store.insert("c", &doc("2", "b")).unwrap();

        let found: Vec<Document> = store
            .find("c", &Filter::all())
            .unwrap()
            .collect::<StoreResult<_>>()
            .unwrap();
        assert_eq!(found, vec![doc("1", "a"), doc("2", "b")]);
    }

    #[test]
    fn duplicate_id_reports_primary_index() {
        let store = InMemoryStore::new("db");
        store.insert("c", &doc("ID", "a")).unwrap();
        let err = store.insert("c", &doc("ID", "b")).unwrap_err();

        let (code, message) = write_code(&err);
        assert_eq!(code, crate::DUPLICATE_KEY_CODE);
        assert_eq!(
            message,
            r#"E11000 duplicate key error collection: db.c index: _id_ dup key: { : "ID" }"#
        );
        assert_eq!(store.count("c", &Filter::all()).unwrap(), 1);
    }

    #[test]
    fn duplicate_unique_field_reports_its_index() {
        let store = InMemoryStore::new("db");
        store
            .ensure_index("c", &IndexSpec::new("reference").unique())
            .unwrap();
        store.insert("c", &doc("1", "REF")).unwrap();
        let err = store.insert("c", &doc("2", "REF")).unwrap_err();

        let (_, message) = write_code(&err);
        assert!(message.ends_with(r#"index: reference_1 dup key: { : "REF" }"#));
    }

    #[test]
    fn replace_keeps_position_and_checks_other_documents() {
        let store = InMemoryStore::new("db");
        store
            .ensure_index("c", &IndexSpec::new("reference").unique())
            .unwrap();
        store.insert("c", &doc("1", "a")).unwrap();
        store.insert("c", &doc("2", "b")).unwrap();

        assert_eq!(
            store.replace("c", &doc("1", "a2"), false).unwrap(),
            ReplaceOutcome::Replaced
        );
        assert!(store
            .replace("c", &doc("1", "b"), false)
            .unwrap_err()
            .is_duplicate_key());

        let first = store.find_one("c", &Filter::all()).unwrap().unwrap();
        assert_eq!(first, doc("1", "a2"));
        // The old key was released
        store.insert("c", &doc("3", "a")).unwrap();
    }

    #[test]
    fn replace_upsert_and_not_found() {
        let store = InMemoryStore::new("db");
        assert_eq!(
            store.replace("c", &doc("1", "a"), false).unwrap(),
            ReplaceOutcome::NotFound
        );
        assert_eq!(
            store.replace("c", &doc("1", "a"), true).unwrap(),
            ReplaceOutcome::Inserted
        );
        assert_eq!(store.count("c", &Filter::all()).unwrap(), 1);
    }

    #[test]
    fn delete_many_releases_unique_keys() {
        let store = InMemoryStore::new("db");
        store
            .ensure_index("c", &IndexSpec::new("reference").unique())
            .unwrap();
        store.insert("c", &doc("1", "a")).unwrap();
        store.insert("c", &doc("2", "b")).unwrap();

        assert_eq!(
            store.delete_many("c", &Filter::eq("reference", "a")).unwrap(),
            1
        );
        store.insert("c", &doc("1", "a")).unwrap();
        assert_eq!(store.delete_many("c", &Filter::all()).unwrap(), 2);
        assert_eq!(store.delete_many("missing", &Filter::all()).unwrap(), 0);
    }

    #[test]
    fn ensure_index_is_idempotent() {
        let store = InMemoryStore::new("db");
        let spec = IndexSpec::new("reference").unique();
        store.ensure_index("c", &spec).unwrap();
        store.ensure_index("c", &spec.clone().background()).unwrap();
        store.ensure_index("c", &IndexSpec::primary()).unwrap();

        assert_eq!(store.indexes("c").unwrap().len(), 2);
        assert!(matches!(
            store.ensure_index("c", &IndexSpec::new("reference")),
            Err(StoreError::IndexOptionsConflict { .. })
        ));
    }

    #[test]
    fn unique_index_build_fails_on_existing_duplicates() {
        let store = InMemoryStore::new("db");
        store.insert("c", &doc("1", "same")).unwrap();
        store.insert("c", &doc("2", "same")).unwrap();

        let err = store
            .ensure_index("c", &IndexSpec::new("reference").unique())
            .unwrap_err();
        assert!(err.is_duplicate_key());
        assert_eq!(store.indexes("c").unwrap().len(), 1);
    }

    #[test]
    fn rejects_documents_without_id() {
        let store = InMemoryStore::new("db");
        let no_id = Document::map(vec![("a".to_string(), Document::Integer(1))]);
        assert!(matches!(
            store.insert("c", &no_id),
            Err(StoreError::InvalidDocument { .. })
        ));
        assert!(matches!(
            store.insert("c", &Document::Integer(1)),
            Err(StoreError::InvalidDocument { .. })
        ));
    }

    #[test]
    fn closed_store_fails() {
        let store = InMemoryStore::new("db");
        store.close();
        assert!(matches!(
            store.insert("c", &doc("1", "a")),
            Err(StoreError::Closed)
        ));
        assert!(store.find("c", &Filter::all()).is_err());
    }

    #[test]
    fn cursor_is_a_snapshot() {
        let store = InMemoryStore::new("db");
        store.insert("c", &doc("1", "a")).unwrap();
        let cursor = store.find("c", &Filter::all()).unwrap();
        store.insert("c", &doc("2", "b")).unwrap();
        assert_eq!(cursor.count(), 1);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn unique_ids_survive_any_insert_order(ids in prop::collection::vec(0u8..16, 0..40)) {
                let store = InMemoryStore::new("db");
                let mut distinct = std::collections::HashSet::new();
                for id in &ids {
                    let result = store.insert("c", &doc(&id.to_string(), "r"));
                    prop_assert_eq!(result.is_ok(), distinct.insert(*id));
                }
                prop_assert_eq!(store.count("c", &Filter::all()).unwrap(), distinct.len() as u64);
            }
        }
    }
}
