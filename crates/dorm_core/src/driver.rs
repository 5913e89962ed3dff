//! The storage driver: one collection of a document store, with native
//! errors translated to [`CoreError`]s.

use crate::error::{CoreError, CoreResult, DuplicateKeyError};
use dorm_codec::Document;
use dorm_storage::{
    DocumentCursor, DocumentStore, Filter, IndexSpec, ReplaceOutcome, StoreError, DUPLICATE_KEY_CODE,
};
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::debug;

/// Parses the database's duplicate key report.
static DUP_KEY: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"collection: (\S+) index: (\S+) dup key: (.*)$").ok());

/// Extracts table, index and key from a native duplicate key message.
pub(crate) fn parse_duplicate_key(message: &str) -> Option<DuplicateKeyError> {
    let captures = DUP_KEY.as_ref()?.captures(message)?;
    Some(DuplicateKeyError::new(
        captures.get(1)?.as_str(),
        captures.get(2)?.as_str(),
        captures.get(3)?.as_str(),
    ))
}

/// Executes documents against one collection.
///
/// Every uniqueness violation the store reports comes back as
/// [`CoreError::DuplicateKey`]; every other failure as
/// [`CoreError::Storage`]. Nothing is retried.
#[derive(Clone)]
pub struct StorageDriver {
    store: Arc<dyn DocumentStore>,
    collection: String,
}

impl StorageDriver {
    /// Creates a driver for `collection`.
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    /// The collection name.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// The fully qualified collection name, `<database>.<collection>`.
    pub fn table(&self) -> String {
        format!("{}.{}", self.store.database_name(), self.collection)
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Inserts a new document.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::DuplicateKey`] if the key or a unique field
    /// is already taken.
    pub fn insert(&self, document: &Document) -> CoreResult<()> {
        self.store
            .insert(&self.collection, document)
            .map_err(|e| self.translate(e))
    }

    /// Replaces the document with the same key, inserting it if missing.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::DuplicateKey`] if a unique field is taken by
    /// another document.
    pub fn save(&self, document: &Document) -> CoreResult<ReplaceOutcome> {
        self.store
            .replace(&self.collection, document, true)
            .map_err(|e| self.translate(e))
    }

    /// Deletes the matching documents.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn remove_all(&self, filter: &Filter) -> CoreResult<u64> {
        self.store
            .delete_many(&self.collection, filter)
            .map_err(|e| self.translate(e))
    }

    /// Streams the matching documents.
    ///
    /// # Errors
    ///
    /// Propagates store failures. Failures while iterating are reported by
    /// the cursor itself.
    pub fn find(&self, filter: &Filter) -> CoreResult<DocumentCursor> {
        self.store
            .find(&self.collection, filter)
            .map_err(|e| self.translate(e))
    }

    /// The first matching document.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn find_one(&self, filter: &Filter) -> CoreResult<Option<Document>> {
        self.store
            .find_one(&self.collection, filter)
            .map_err(|e| self.translate(e))
    }

    /// Counts the matching documents.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn count(&self, filter: &Filter) -> CoreResult<u64> {
        self.store
            .count(&self.collection, filter)
            .map_err(|e| self.translate(e))
    }

    /// Creates an index unless it already exists.
    ///
    /// # Errors
    ///
    /// Building a unique index over existing duplicates fails with
    /// [`CoreError::DuplicateKey`].
    pub fn ensure_index(&self, spec: &IndexSpec) -> CoreResult<()> {
        debug!(collection = %self.collection, index = %spec.name, unique = spec.unique, "ensuring index");
        self.store
            .ensure_index(&self.collection, spec)
            .map_err(|e| self.translate(e))
    }

    /// The indexes of the collection.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn indexes(&self) -> CoreResult<Vec<IndexSpec>> {
        self.store
            .indexes(&self.collection)
            .map_err(|e| self.translate(e))
    }

    /// Classifies a native error.
    pub(crate) fn translate(&self, error: StoreError) -> CoreError {
        match error {
            StoreError::Write { code, message } if code == DUPLICATE_KEY_CODE => {
                let duplicate = parse_duplicate_key(&message)
                    .unwrap_or_else(|| DuplicateKeyError::new(self.table(), "", message));
                debug!(table = %duplicate.table(), index = %duplicate.index(), "duplicate key");
                CoreError::DuplicateKey(duplicate)
            }
            source => CoreError::Storage {
                collection: self.collection.clone(),
                source,
            },
        }
    }
}

impl std::fmt::Debug for StorageDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageDriver")
            .field("table", &self.table())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dorm_storage::InMemoryStore;

    fn driver() -> StorageDriver {
        StorageDriver::new(Arc::new(InMemoryStore::new("test")), "main_class")
    }

    fn doc(id: &str, reference: &str) -> Document {
        Document::map(vec![
            ("_id".to_string(), Document::from(id)),
            ("reference".to_string(), Document::from(reference)),
        ])
    }

    #[test]
    fn table_is_qualified() {
        assert_eq!(driver().table(), "test.main_class");
    }

    #[test]
    fn parses_native_messages() {
        let parsed = parse_duplicate_key(
            r#"E11000 duplicate key error collection: db.main_class index: reference_1 dup key: { : "REF" }"#,
        )
        .unwrap();
        assert_eq!(parsed.table(), "db.main_class");
        assert_eq!(parsed.index(), "reference_1");
        assert_eq!(parsed.data(), r#"{ : "REF" }"#);

        assert!(parse_duplicate_key("E11000 something else").is_none());
    }

    #[test]
    fn duplicate_ids_are_translated() {
        let driver = driver();
        driver.insert(&doc("ID", "R1")).unwrap();
        let err = driver.insert(&doc("ID", "R2")).unwrap_err();
        let duplicate = err.as_duplicate_key().unwrap();
        assert_eq!(duplicate.table(), "test.main_class");
        assert_eq!(duplicate.index(), "_id_");
        assert_eq!(duplicate.data(), r#"{ : "ID" }"#);
    }

    #[test]
    fn duplicate_unique_fields_are_translated() {
        let driver = driver();
        driver.ensure_index(&IndexSpec::new("reference").unique()).unwrap();
        driver.insert(&doc("A", "REF")).unwrap();

        let err = driver.save(&doc("B", "REF")).unwrap_err();
        let duplicate = err.as_duplicate_key().unwrap();
        assert_eq!(duplicate.index(), "reference_1");
        assert_eq!(duplicate.data(), r#"{ : "REF" }"#);
        assert_eq!(driver.count(&Filter::all()).unwrap(), 1);
    }

    #[test]
    fn unparseable_reports_keep_the_message() {
        let driver = driver();
        let err = driver.translate(StoreError::Write {
            code: DUPLICATE_KEY_CODE,
            message: "E11000 duplicate key".to_string(),
        });
        let duplicate = err.as_duplicate_key().unwrap();
        assert_eq!(duplicate.table(), "test.main_class");
        assert_eq!(duplicate.index(), "");
        assert_eq!(duplicate.data(), "E11000 duplicate key");
    }

    #[test]
    fn other_failures_are_storage_errors() {
        let driver = driver();
        let err = driver.insert(&Document::from("not a map")).unwrap_err();
        assert!(matches!(err, CoreError::Storage { ref collection, .. } if collection == "main_class"));

        let err = driver.translate(StoreError::Write {
            code: 2,
            message: "bad value".to_string(),
        });
        assert!(err.as_duplicate_key().is_none());
    }

    #[test]
    fn save_upserts() {
        let driver = driver();
        assert_eq!(driver.save(&doc("A", "R")).unwrap(), ReplaceOutcome::Inserted);
        assert_eq!(driver.save(&doc("A", "S")).unwrap(), ReplaceOutcome::Replaced);
        let found = driver.find_one(&Filter::eq("_id", "A")).unwrap().unwrap();
        assert_eq!(found.get("reference"), Some(&Document::from("S")));
        assert_eq!(driver.remove_all(&Filter::all()).unwrap(), 1);
    }
}
