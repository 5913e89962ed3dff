//! Document store trait definition.

use crate::error::StoreResult;
use crate::filter::Filter;
use crate::index::IndexSpec;
use dorm_codec::Document;

/// A one-pass sequence of documents produced by [`DocumentStore::find`].
///
/// Dropping a cursor before it is exhausted releases it.
pub type DocumentCursor = Box<dyn Iterator<Item = StoreResult<Document>> + Send>;

/// Whether a replace updated an existing document or inserted a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    /// A document with the same `_id` existed and was replaced.
    Replaced,
    /// No document matched and the upsert inserted one.
    Inserted,
    /// No document matched and upsert was off.
    NotFound,
}

/// A document database.
///
/// Stores are addressed by collection name. Collections come into
/// existence on first write. Every document must be a map carrying an
/// `_id` field; the store enforces uniqueness of `_id` and of every unique
/// index created with [`DocumentStore::ensure_index`].
///
/// # Invariants
///
/// - A rejected write leaves the collection unchanged
/// - Uniqueness violations are reported as [`crate::StoreError::Write`] with
///   code [`crate::DUPLICATE_KEY_CODE`] and the database's native message
/// - Documents returned by reads are fresh copies
/// - Implementations must be `Send + Sync`
pub trait DocumentStore: Send + Sync {
    /// Name of the database, the prefix of fully qualified collection names.
    fn database_name(&self) -> &str;

    /// Inserts a new document.
    ///
    /// # Errors
    ///
    /// Fails with a duplicate key write error if `_id` or any unique index
    /// key is already taken.
    fn insert(&self, collection: &str, document: &Document) -> StoreResult<()>;

    /// Replaces the document with the same `_id`, optionally inserting it.
    fn replace(
        &self,
        collection: &str,
        document: &Document,
        upsert: bool,
    ) -> StoreResult<ReplaceOutcome>;

    /// Deletes all documents matching `filter`, returning how many were removed.
    fn delete_many(&self, collection: &str, filter: &Filter) -> StoreResult<u64>;

    /// Returns a cursor over the documents matching `filter` in insertion order.
    fn find(&self, collection: &str, filter: &Filter) -> StoreResult<DocumentCursor>;

    /// Returns the first document matching `filter`.
    fn find_one(&self, collection: &str, filter: &Filter) -> StoreResult<Option<Document>> {
        self.find(collection, filter)?.next().transpose()
    }

    /// Counts documents matching `filter`.
    fn count(&self, collection: &str, filter: &Filter) -> StoreResult<u64>;

    /// Creates an index if it does not exist yet.
    ///
    /// Calling this again with the same spec is a no-op.
    fn ensure_index(&self, collection: &str, spec: &IndexSpec) -> StoreResult<()>;

    /// Lists the indexes of a collection, `_id_` included.
    fn indexes(&self, collection: &str) -> StoreResult<Vec<IndexSpec>>;
}
