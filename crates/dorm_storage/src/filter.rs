//! Equality filters for find and delete.

use dorm_codec::Document;

/// A document filter.
///
/// Only top-level or dotted-path equality and conjunction are supported.
/// A missing field compares equal to `Null`.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Filter {
    /// Matches every document.
    #[default]
    All,
    /// Field (dotted path) equals value.
    Eq(String, Document),
    /// All sub-filters match.
    And(Vec<Filter>),
}

impl Filter {
    /// A filter matching every document.
    pub fn all() -> Self {
        Self::All
    }

    /// A filter matching documents whose `field` equals `value`.
    pub fn eq(field: impl Into<String>, value: impl Into<Document>) -> Self {
        Self::Eq(field.into(), value.into())
    }

    /// Combines this filter with another one.
    #[must_use]
    pub fn and(self, other: Filter) -> Self {
        match (self, other) {
            (Self::All, f) | (f, Self::All) => f,
            (Self::And(mut a), Self::And(b)) => {
                a.extend(b);
                Self::And(a)
            }
            (Self::And(mut a), f) | (f, Self::And(mut a)) => {
                a.push(f);
                Self::And(a)
            }
            (a, b) => Self::And(vec![a, b]),
        }
    }

    /// Returns true if `document` satisfies this filter.
    pub fn matches(&self, document: &Document) -> bool {
        match self {
            Self::All => true,
            Self::Eq(path, expected) => {
                let actual = lookup_path(document, path).unwrap_or(&Document::Null);
                actual == expected
            }
            Self::And(filters) => filters.iter().all(|f| f.matches(document)),
        }
    }
}

/// Resolves a dotted path like `createdBy.name` inside a document.
pub fn lookup_path<'a>(document: &'a Document, path: &str) -> Option<&'a Document> {
    path.split('.').try_fold(document, |current, segment| current.get(segment))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str, age: i64) -> Document {
        Document::map(vec![
            ("name".to_string(), Document::from(name)),
            ("age".to_string(), Document::Integer(age)),
            (
                "address".to_string(),
                Document::map(vec![("city".to_string(), Document::from("Berlin"))]),
            ),
        ])
    }

    #[test]
    fn all_matches_everything() {
        assert!(Filter::all().matches(&user("a", 1)));
        assert!(Filter::all().matches(&Document::Null));
    }

    #[test]
    fn eq_and_conjunction() {
        let doc = user("alice", 30);
        assert!(Filter::eq("name", "alice").matches(&doc));
        assert!(!Filter::eq("name", "bob").matches(&doc));
        assert!(Filter::eq("name", "alice")
            .and(Filter::eq("age", 30i64))
            .matches(&doc));
        assert!(!Filter::eq("name", "alice")
            .and(Filter::eq("age", 31i64))
            .matches(&doc));
    }

    #[test]
    fn dotted_paths_and_missing_fields() {
        let doc = user("alice", 30);
        assert!(Filter::eq("address.city", "Berlin").matches(&doc));
        assert!(Filter::eq("nickname", Document::Null).matches(&doc));
    }

    #[test]
    fn and_with_all_collapses() {
        let f = Filter::all().and(Filter::eq("a", 1i64));
        assert_eq!(f, Filter::eq("a", 1i64));
    }
}
