//! In-memory values of typed objects.

mod object;

pub use object::Object;

use crate::entity::EntityHandle;
use crate::error::CoreResult;
use crate::reference::{LazyRef, LazyRefCollection};
use chrono::{DateTime, FixedOffset, Utc};
use std::collections::BTreeMap;

/// The value of one field on an object.
///
/// A value is what application code reads and writes; the codec translates
/// it to and from a [`Document`](dorm_codec::Document) according to the
/// field's declared type.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Absent value.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// Floating point number.
    Decimal(f64),
    /// Text.
    Text(String),
    /// UTC timestamp.
    Date(DateTime<Utc>),
    /// Timestamp with its UTC offset.
    LocalDate(DateTime<FixedOffset>),
    /// Ordered list.
    List(Vec<Value>),
    /// String-keyed map.
    Map(BTreeMap<String, Value>),
    /// Embedded object.
    Object(Object),
    /// Reference to an entity.
    Reference(LazyRef),
    /// List or map of references.
    References(LazyRefCollection),
}

impl Value {
    /// Short name of the value's shape, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Integer(_) => "integer",
            Self::Decimal(_) => "decimal",
            Self::Text(_) => "string",
            Self::Date(_) => "date",
            Self::LocalDate(_) => "local date",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Object(_) => "object",
            Self::Reference(_) => "reference",
            Self::References(_) => "reference collection",
        }
    }

    /// Returns true for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The boolean, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The integer, if this is one.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// The number as a float; integers are widened.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_decimal(&self) -> Option<f64> {
        match self {
            Self::Decimal(d) => Some(*d),
            Self::Integer(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// The text, if this is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The UTC timestamp, if this is a date.
    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// The offset timestamp, if this is a local date.
    pub fn as_local_date(&self) -> Option<DateTime<FixedOffset>> {
        match self {
            Self::LocalDate(d) => Some(*d),
            _ => None,
        }
    }

    /// The elements, if this is a list.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// The entries, if this is a map.
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// The embedded object, if this is one.
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }

    /// The reference, if this is one.
    pub fn as_reference(&self) -> Option<&LazyRef> {
        match self {
            Self::Reference(reference) => Some(reference),
            _ => None,
        }
    }

    /// The reference collection, if this is one.
    pub fn as_references(&self) -> Option<&LazyRefCollection> {
        match self {
            Self::References(references) => Some(references),
            _ => None,
        }
    }

    /// Resolves a single reference value.
    ///
    /// `Ok(None)` if this is not a reference or its target does not exist.
    ///
    /// # Errors
    ///
    /// Propagates the failure to load an existing target.
    pub fn resolve(&self) -> CoreResult<Option<EntityHandle>> {
        self.as_reference().map_or(Ok(None), LazyRef::get)
    }

    /// A map value from key/value pairs.
    pub fn map<K: Into<String>, V: Into<Value>>(entries: impl IntoIterator<Item = (K, V)>) -> Self {
        Self::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// A list value.
    pub fn list<V: Into<Value>>(items: impl IntoIterator<Item = V>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Integer(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Self::Decimal(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Self::Date(d)
    }
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(d: DateTime<FixedOffset>) -> Self {
        Self::LocalDate(d)
    }
}

impl From<Object> for Value {
    fn from(object: Object) -> Self {
        Self::Object(object)
    }
}

impl From<EntityHandle> for Value {
    fn from(handle: EntityHandle) -> Self {
        Self::Reference(LazyRef::to(handle))
    }
}

impl From<LazyRef> for Value {
    fn from(reference: LazyRef) -> Self {
        Self::Reference(reference)
    }
}

impl From<LazyRefCollection> for Value {
    fn from(references: LazyRefCollection) -> Self {
        Self::References(references)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(entries: BTreeMap<String, Value>) -> Self {
        Self::Map(entries)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions() {
        assert_eq!(Value::from("a"), Value::Text("a".to_string()));
        assert_eq!(Value::from(3i32), Value::Integer(3));
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some(true)), Value::Bool(true));
        assert_eq!(
            Value::list([1i64, 2]),
            Value::List(vec![Value::Integer(1), Value::Integer(2)])
        );
        assert_eq!(
            Value::map([("k", "v")]).as_map().unwrap().get("k"),
            Some(&Value::from("v"))
        );
    }

    #[test]
    fn decimals_widen_integers() {
        assert_eq!(Value::Integer(2).as_decimal(), Some(2.0));
        assert_eq!(Value::Decimal(2.5).as_decimal(), Some(2.5));
        assert_eq!(Value::from("2").as_decimal(), None);
    }

    #[test]
    fn type_names_for_messages() {
        assert_eq!(Value::Null.type_name(), "null");
        assert_eq!(Value::List(Vec::new()).type_name(), "list");
        assert!(Value::default().is_null());
    }
}
