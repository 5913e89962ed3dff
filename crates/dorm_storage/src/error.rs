//! Error types for storage operations.

use dorm_codec::CodecError;
use thiserror::Error;

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Error code the document database reports for a uniqueness violation.
pub const DUPLICATE_KEY_CODE: i32 = 11000;

/// Errors reported by a document store.
///
/// These are the database's native errors. Classifying them (for example
/// turning a [`DUPLICATE_KEY_CODE`] write error into a structured
/// duplicate-key error) is the job of the storage driver above this crate.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A write was rejected by the database.
    #[error("write error {code}: {message}")]
    Write {
        /// Database error code.
        code: i32,
        /// Database error message.
        message: String,
    },

    /// A stored document could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The document handed to the store is not acceptable.
    #[error("invalid document: {message}")]
    InvalidDocument {
        /// Why the document was rejected.
        message: String,
    },

    /// An index with the same name but different options already exists.
    #[error("index {name} already exists with different options")]
    IndexOptionsConflict {
        /// Name of the conflicting index.
        name: String,
    },

    /// The store is closed.
    #[error("store is closed")]
    Closed,
}

impl StoreError {
    /// Creates an invalid document error.
    pub fn invalid_document(message: impl Into<String>) -> Self {
        Self::InvalidDocument {
            message: message.into(),
        }
    }

    /// Creates a duplicate key write error in the database's native format.
    pub fn duplicate_key(table: &str, index: &str, key: &str) -> Self {
        Self::Write {
            code: DUPLICATE_KEY_CODE,
            message: format!(
                "E{DUPLICATE_KEY_CODE} duplicate key error collection: {table} index: {index} dup key: {key}"
            ),
        }
    }

    /// Returns true if this error reports a uniqueness violation.
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::Write { code, .. } if *code == DUPLICATE_KEY_CODE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_key_message_format() {
        let err = StoreError::duplicate_key("db.users", "_id_", r#"{ : "ID" }"#);
        assert!(err.is_duplicate_key());
        assert_eq!(
            err.to_string(),
            r#"write error 11000: E11000 duplicate key error collection: db.users index: _id_ dup key: { : "ID" }"#
        );
    }

    #[test]
    fn other_errors_are_not_duplicates() {
        assert!(!StoreError::Closed.is_duplicate_key());
        let err = StoreError::Write {
            code: 2,
            message: "bad value".into(),
        };
        assert!(!err.is_duplicate_key());
    }
}
