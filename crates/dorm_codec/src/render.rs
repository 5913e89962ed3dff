//! Rendering of documents in database-shell notation.
//!
//! This is the form the storage backend uses when it reports offending
//! values, e.g. the key of a duplicate-key violation: `{ : "ID" }`.

use crate::document::Document;
use std::fmt;

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Document::Null => f.write_str("null"),
            Document::Bool(b) => write!(f, "{b}"),
            Document::Integer(n) => write!(f, "{n}"),
            Document::Float(x) => write!(f, "{x:?}"),
            Document::Text(s) => write!(f, "{s:?}"),
            Document::Date(at) => write!(f, "new Date({})", at.timestamp_millis()),
            Document::Array(items) if items.is_empty() => f.write_str("[]"),
            Document::Array(items) => {
                f.write_str("[ ")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(" ]")
            }
            Document::Map(pairs) if pairs.is_empty() => f.write_str("{}"),
            Document::Map(pairs) => {
                f.write_str("{ ")?;
                for (i, (key, value)) in pairs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                f.write_str(" }")
            }
        }
    }
}
