//! Generic document tree exchanged with the storage backend.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;

/// A document value.
///
/// This is the hierarchical value format every entity is encoded to before
/// it reaches storage. Maps keep their pairs sorted by key (see
/// [`Document::map`]) so two maps built in different insertion orders compare
/// equal and encode to identical bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer (full i64 range).
    Integer(i64),
    /// Double precision float. NaN is rejected by the encoder.
    Float(f64),
    /// UTF-8 text.
    Text(String),
    /// Point in time, millisecond precision.
    Date(DateTime<Utc>),
    /// Ordered sequence.
    Array(Vec<Document>),
    /// Keyed mapping (keys sorted for canonical encoding).
    Map(Vec<(String, Document)>),
}

impl Document {
    /// Create a map document with sorted keys.
    ///
    /// Later pairs win when a key appears more than once.
    pub fn map(pairs: impl IntoIterator<Item = (String, Document)>) -> Self {
        let mut sorted: Vec<(String, Document)> = Vec::new();
        for (key, value) in pairs {
            match sorted.binary_search_by(|(k, _)| cmp_key(k, &key)) {
                Ok(pos) => sorted[pos].1 = value,
                Err(pos) => sorted.insert(pos, (key, value)),
            }
        }
        Document::Map(sorted)
    }

    /// An empty map document.
    pub fn empty_map() -> Self {
        Document::Map(Vec::new())
    }

    /// Create a date document truncated to millisecond precision.
    pub fn date(at: DateTime<Utc>) -> Self {
        let millis = at.timestamp_millis();
        Document::Date(DateTime::from_timestamp_millis(millis).unwrap_or(at))
    }

    /// Short name of this document's shape, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Document::Null => "null",
            Document::Bool(_) => "bool",
            Document::Integer(_) => "integer",
            Document::Float(_) => "float",
            Document::Text(_) => "string",
            Document::Date(_) => "date",
            Document::Array(_) => "array",
            Document::Map(_) => "map",
        }
    }

    /// Check if this document is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Document::Null)
    }

    /// Get this document as a boolean, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Document::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this document as an integer, if it is one.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Document::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this document as a float, if it is one.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Document::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Get this document as text, if it is a string.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Document::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get this document as a date, if it is one.
    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Document::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Get this document as an array, if it is one.
    pub fn as_array(&self) -> Option<&[Document]> {
        match self {
            Document::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Get this document as a map, if it is one.
    pub fn as_map(&self) -> Option<&[(String, Document)]> {
        match self {
            Document::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Look up a key in this map document.
    pub fn get(&self, key: &str) -> Option<&Document> {
        match self {
            Document::Map(pairs) => pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Insert or replace a key in this map document, keeping keys sorted.
    ///
    /// Does nothing when the document is not a map.
    pub fn insert(&mut self, key: impl Into<String>, value: Document) {
        if let Document::Map(pairs) = self {
            let key = key.into();
            match pairs.binary_search_by(|(k, _)| cmp_key(k, &key)) {
                Ok(pos) => pairs[pos].1 = value,
                Err(pos) => pairs.insert(pos, (key, value)),
            }
        }
    }

    /// Remove a key from this map document, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<Document> {
        match self {
            Document::Map(pairs) => {
                let pos = pairs.iter().position(|(k, _)| k == key)?;
                Some(pairs.remove(pos).1)
            }
            _ => None,
        }
    }
}

/// Canonical ordering of map keys: length first, then bytewise.
///
/// This is the order canonical CBOR places text keys in.
pub fn cmp_key(a: &str, b: &str) -> Ordering {
    match a.len().cmp(&b.len()) {
        Ordering::Equal => a.as_bytes().cmp(b.as_bytes()),
        ord => ord,
    }
}

impl From<bool> for Document {
    fn from(b: bool) -> Self {
        Document::Bool(b)
    }
}

impl From<i64> for Document {
    fn from(n: i64) -> Self {
        Document::Integer(n)
    }
}

impl From<i32> for Document {
    fn from(n: i32) -> Self {
        Document::Integer(i64::from(n))
    }
}

impl From<f64> for Document {
    fn from(f: f64) -> Self {
        Document::Float(f)
    }
}

impl From<String> for Document {
    fn from(s: String) -> Self {
        Document::Text(s)
    }
}

impl From<&str> for Document {
    fn from(s: &str) -> Self {
        Document::Text(s.to_string())
    }
}

impl From<DateTime<Utc>> for Document {
    fn from(at: DateTime<Utc>) -> Self {
        Document::date(at)
    }
}

impl<T: Into<Document>> From<Vec<T>> for Document {
    fn from(v: Vec<T>) -> Self {
        Document::Array(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Document>> From<Option<T>> for Document {
    fn from(v: Option<T>) -> Self {
        v.map_or(Document::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Document {
        Document::Text(s.to_string())
    }

    #[test]
    fn map_keys_are_sorted_length_first() {
        let map = Document::map(vec![
            ("zz".to_string(), Document::Integer(1)),
            ("b".to_string(), Document::Integer(2)),
            ("a".to_string(), Document::Integer(3)),
        ]);

        let keys: Vec<&str> = map
            .as_map()
            .unwrap()
            .iter()
            .map(|(k, _)| k.as_str())
            .collect();
        assert_eq!(keys, vec!["a", "b", "zz"]);
    }

    #[test]
    fn map_insertion_order_is_irrelevant() {
        let first = Document::map(vec![
            ("name".to_string(), text("a")),
            ("age".to_string(), Document::Integer(3)),
        ]);
        let second = Document::map(vec![
            ("age".to_string(), Document::Integer(3)),
            ("name".to_string(), text("a")),
        ]);
        assert_eq!(first, second);
    }

    #[test]
    fn duplicate_keys_keep_last_value() {
        let map = Document::map(vec![
            ("k".to_string(), Document::Integer(1)),
            ("k".to_string(), Document::Integer(2)),
        ]);
        assert_eq!(map.get("k"), Some(&Document::Integer(2)));
        assert_eq!(map.as_map().unwrap().len(), 1);
    }

    #[test]
    fn insert_and_remove_keep_order() {
        let mut map = Document::empty_map();
        map.insert("zeta", Document::Bool(true));
        map.insert("a", Document::Null);
        map.insert("zeta", Document::Bool(false));

        assert_eq!(map.as_map().unwrap()[0].0, "a");
        assert_eq!(map.get("zeta"), Some(&Document::Bool(false)));
        assert_eq!(map.remove("a"), Some(Document::Null));
        assert!(map.get("a").is_none());
    }

    #[test]
    fn date_is_truncated_to_millis() {
        let at = DateTime::from_timestamp(1_700_000_000, 123_456_789).unwrap();
        let doc = Document::date(at);
        assert_eq!(doc.as_date().unwrap().timestamp_subsec_nanos(), 123_000_000);
    }

    #[test]
    fn accessors_reject_other_shapes() {
        assert_eq!(Document::Integer(1).as_text(), None);
        assert_eq!(text("1").as_integer(), None);
        assert_eq!(Document::Float(1.5).as_float(), Some(1.5));
        assert!(Document::Null.is_null());
        assert_eq!(Document::Null.get("x"), None);
        assert_eq!(Document::Array(vec![]).type_name(), "array");
    }

    #[test]
    fn option_converts_to_null() {
        assert_eq!(Document::from(None::<i64>), Document::Null);
        assert_eq!(Document::from(Some("x")), text("x"));
    }
}
