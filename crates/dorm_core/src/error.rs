//! Error types for dorm core.

use dorm_storage::StoreError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// A write rejected because it would violate a unique index.
///
/// Raised instead of performing the write. The fields are taken from the
/// database's own report, so `table` is the fully qualified collection name
/// (`<database>.<collection>`) and `data` is the conflicting key as the
/// database renders it, for example `{ : "ID" }`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("duplicate key in {table} on index {index}: {data}")]
pub struct DuplicateKeyError {
    table: String,
    index: String,
    data: String,
}

impl DuplicateKeyError {
    /// Creates a duplicate key error.
    pub fn new(table: impl Into<String>, index: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            index: index.into(),
            data: data.into(),
        }
    }

    /// Fully qualified name of the collection.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Name of the violated index.
    pub fn index(&self) -> &str {
        &self.index
    }

    /// The conflicting key document in rendered form.
    pub fn data(&self) -> &str {
        &self.data
    }
}

/// Errors that can occur in dorm core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The storage backend failed for a reason other than a uniqueness
    /// violation.
    #[error("storage error in collection {collection}: {source}")]
    Storage {
        /// The collection the operation targeted.
        collection: String,
        /// The native error.
        #[source]
        source: StoreError,
    },

    /// A value or document does not have the shape its field type requires.
    #[error("schema mismatch at '{path}': expected {expected}, found {found}")]
    SchemaMismatch {
        /// Dotted path of the offending field (`items[2].name`).
        path: String,
        /// What the field type requires.
        expected: String,
        /// What was actually there.
        found: String,
    },

    /// A polymorphic field was declared without a default type.
    #[error("polymorphic field discriminated by '{field}' has no default type")]
    MissingDefaultType {
        /// The discriminator field of the offending declaration.
        field: String,
    },

    /// A schema names a type the schema provider does not know.
    #[error("unknown type: {type_name}")]
    UnknownType {
        /// The missing type.
        type_name: String,
    },

    /// A field name that the object's schema does not declare.
    #[error("type {type_name} has no field '{field}'")]
    UnknownField {
        /// The object's type.
        type_name: String,
        /// The requested field.
        field: String,
    },

    /// A schema declaration is inconsistent.
    #[error("invalid schema: {message}")]
    InvalidSchema {
        /// What is wrong with the declaration.
        message: String,
    },

    /// A write violated a unique index.
    #[error(transparent)]
    DuplicateKey(#[from] DuplicateKeyError),

    /// No repository is registered under the given collection or type name.
    #[error("no repository registered for '{name}'")]
    RepositoryNotFound {
        /// The collection or type that was looked up.
        name: String,
    },

    /// A service an entity needs was never registered.
    #[error("service not available: {id}")]
    ServiceUnavailable {
        /// Stable identifier of the service.
        id: String,
    },

    /// An entity was handed to a repository that does not persist its type.
    #[error("entity of type {type_name} cannot be stored in collection {collection}")]
    WrongCollection {
        /// The entity's type.
        type_name: String,
        /// The repository's collection.
        collection: String,
    },

    /// The storage session a lazy reference was loaded from has been dropped.
    #[error("storage session is closed")]
    SessionClosed,
}

impl CoreError {
    /// Creates a schema mismatch error.
    pub fn schema_mismatch(
        path: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self::SchemaMismatch {
            path: path.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Creates an invalid schema error.
    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Self::InvalidSchema {
            message: message.into(),
        }
    }

    /// Creates an unknown type error.
    pub fn unknown_type(type_name: impl Into<String>) -> Self {
        Self::UnknownType {
            type_name: type_name.into(),
        }
    }

    /// Creates a service unavailable error.
    pub fn service_unavailable(id: impl Into<String>) -> Self {
        Self::ServiceUnavailable { id: id.into() }
    }

    /// Prefixes the path of a schema mismatch with an enclosing segment.
    ///
    /// Segments starting with `[` are appended without a dot. Other errors
    /// pass through unchanged.
    #[must_use]
    pub fn at(self, segment: &str) -> Self {
        match self {
            Self::SchemaMismatch {
                path,
                expected,
                found,
            } => {
                let path = if path.is_empty() {
                    segment.to_string()
                } else if path.starts_with('[') {
                    format!("{segment}{path}")
                } else {
                    format!("{segment}.{path}")
                };
                Self::SchemaMismatch {
                    path,
                    expected,
                    found,
                }
            }
            other => other,
        }
    }

    /// Returns the duplicate key details if this is a uniqueness violation.
    pub fn as_duplicate_key(&self) -> Option<&DuplicateKeyError> {
        match self {
            Self::DuplicateKey(err) => Some(err),
            _ => None,
        }
    }
}
