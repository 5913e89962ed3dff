//! Index specifications and unique-key bookkeeping.

use crate::filter::lookup_path;
use dorm_codec::{to_canonical_cbor, Document};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Name of the primary key field every document carries.
pub const ID_FIELD: &str = "_id";

/// Name of the implicit unique index on [`ID_FIELD`].
pub const ID_INDEX: &str = "_id_";

/// Sort direction of an indexed field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexDirection {
    /// Ascending (`1`).
    #[default]
    Ascending,
    /// Descending (`-1`).
    Descending,
}

impl IndexDirection {
    /// The numeric form used in index names.
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Ascending => 1,
            Self::Descending => -1,
        }
    }
}

impl fmt::Display for IndexDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_i32())
    }
}

/// Specification for an index on a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    /// Name of the index.
    pub name: String,
    /// Indexed fields with their direction.
    pub fields: Vec<(String, IndexDirection)>,
    /// Whether the index enforces uniqueness.
    pub unique: bool,
    /// Whether documents missing every indexed field are skipped.
    pub sparse: bool,
    /// Whether the index may be built in the background.
    pub background: bool,
}

impl IndexSpec {
    /// Creates an ascending single-field index named `<field>_1`.
    pub fn new(field: impl Into<String>) -> Self {
        Self::with_direction(field, IndexDirection::Ascending)
    }

    /// Creates a single-field index with the given direction.
    pub fn with_direction(field: impl Into<String>, direction: IndexDirection) -> Self {
        let fields = vec![(field.into(), direction)];
        Self {
            name: default_index_name(&fields),
            fields,
            unique: false,
            sparse: false,
            background: false,
        }
    }

    /// Creates a compound index over several fields.
    pub fn compound(fields: Vec<(String, IndexDirection)>) -> Self {
        Self {
            name: default_index_name(&fields),
            fields,
            unique: false,
            sparse: false,
            background: false,
        }
    }

    /// The implicit unique primary key index.
    pub fn primary() -> Self {
        let mut spec = Self::new(ID_FIELD).unique();
        spec.name = ID_INDEX.to_string();
        spec
    }

    /// Makes this a unique index.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Makes this a sparse index.
    #[must_use]
    pub fn sparse(mut self) -> Self {
        self.sparse = true;
        self
    }

    /// Marks this index for background building.
    #[must_use]
    pub fn background(mut self) -> Self {
        self.background = true;
        self
    }

    /// Overrides the generated name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Returns true if the two specs describe the same index behaviour.
    ///
    /// `background` only affects how an index is built, so it is ignored.
    pub fn same_options(&self, other: &IndexSpec) -> bool {
        self.fields == other.fields && self.unique == other.unique && self.sparse == other.sparse
    }

    /// Extracts this index's key from a document.
    ///
    /// Returns `None` for sparse indexes when every indexed field is missing.
    pub fn key_of(&self, document: &Document) -> Option<Vec<Document>> {
        let values: Vec<Option<&Document>> = self
            .fields
            .iter()
            .map(|(field, _)| lookup_path(document, field))
            .collect();

        if self.sparse && values.iter().all(Option::is_none) {
            return None;
        }

        Some(
            values
                .into_iter()
                .map(|v| v.cloned().unwrap_or(Document::Null))
                .collect(),
        )
    }
}

/// The database's default index name: `field_1_other_-1`.
pub fn default_index_name(fields: &[(String, IndexDirection)]) -> String {
    fields
        .iter()
        .map(|(field, direction)| format!("{field}_{direction}"))
        .collect::<Vec<_>>()
        .join("_")
}

/// Renders an index key the way the database reports it: `{ : "a", : 1 }`.
pub fn render_key(key: &[Document]) -> String {
    Document::Map(key.iter().map(|v| (String::new(), v.clone())).collect()).to_string()
}

/// Key-to-documents mapping maintained for one index.
///
/// Keys and document ids are held in their canonical CBOR form so they can
/// be hashed.
#[derive(Debug)]
pub(crate) struct IndexEntries {
    pub(crate) spec: IndexSpec,
    entries: HashMap<Vec<u8>, HashSet<Vec<u8>>>,
}

impl IndexEntries {
    pub(crate) fn new(spec: IndexSpec) -> Self {
        Self {
            spec,
            entries: HashMap::new(),
        }
    }

    fn key_bytes(key: &[Document]) -> Vec<u8> {
        // Keys are built from stored documents, which always encode.
        to_canonical_cbor(&Document::Array(key.to_vec())).unwrap_or_default()
    }

    /// Returns the offending key if adding `document` (stored under `id`)
    /// would violate uniqueness.
    pub(crate) fn conflict(&self, id: &[u8], document: &Document) -> Option<Vec<Document>> {
        if !self.spec.unique {
            return None;
        }
        let key = self.spec.key_of(document)?;
        let holders = self.entries.get(&Self::key_bytes(&key))?;
        if holders.iter().any(|holder| holder.as_slice() != id) {
            Some(key)
        } else {
            None
        }
    }

    pub(crate) fn insert(&mut self, id: &[u8], document: &Document) {
        if let Some(key) = self.spec.key_of(document) {
            self.entries
                .entry(Self::key_bytes(&key))
                .or_default()
                .insert(id.to_vec());
        }
    }

    pub(crate) fn remove(&mut self, id: &[u8], document: &Document) {
        if let Some(key) = self.spec.key_of(document) {
            let bytes = Self::key_bytes(&key);
            if let Some(set) = self.entries.get_mut(&bytes) {
                set.remove(id);
                if set.is_empty() {
                    self.entries.remove(&bytes);
                }
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.values().map(HashSet::len).sum()
    }
}
