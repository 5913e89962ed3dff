//! Entity keys.

use crate::value::Value;
use dorm_codec::Document;
use std::fmt;
use uuid::Uuid;

/// The primary key of an entity.
///
/// Keys are comparable scalars: either text or an integer. Generated keys
/// are random UUIDs in their 32 character hex form, which are:
/// - Globally unique within a database
/// - Immutable once assigned
/// - Never reused
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityKey {
    /// A text key.
    Text(String),
    /// An integer key.
    Integer(i64),
}

impl EntityKey {
    /// Creates a new random key.
    #[must_use]
    pub fn generate() -> Self {
        Self::from_uuid(Uuid::new_v4())
    }

    /// Creates a key from a UUID.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self::Text(uuid.simple().to_string())
    }

    /// Extracts a key from a value. Only text and integers qualify; empty
    /// text counts as no key.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Text(text) if !text.is_empty() => Some(Self::Text(text.clone())),
            Value::Integer(n) => Some(Self::Integer(*n)),
            _ => None,
        }
    }

    /// Extracts a key from a stored document value.
    pub fn from_document(document: &Document) -> Option<Self> {
        match document {
            Document::Text(text) if !text.is_empty() => Some(Self::Text(text.clone())),
            Document::Integer(n) => Some(Self::Integer(*n)),
            _ => None,
        }
    }

    /// Converts to a value for assignment to a key field.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Text(text) => Value::Text(text.clone()),
            Self::Integer(n) => Value::Integer(*n),
        }
    }

    /// Converts to the document form used in filters.
    #[must_use]
    pub fn to_document(&self) -> Document {
        match self {
            Self::Text(text) => Document::Text(text.clone()),
            Self::Integer(n) => Document::Integer(*n),
        }
    }
}

impl fmt::Debug for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityKey({self})")
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Integer(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for EntityKey {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for EntityKey {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<i64> for EntityKey {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<Uuid> for EntityKey {
    fn from(uuid: Uuid) -> Self {
        Self::from_uuid(uuid)
    }
}
