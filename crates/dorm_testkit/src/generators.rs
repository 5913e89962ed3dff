//! Property-based test generators using proptest.
//!
//! Strategies produce values for the fixture model's container fields so
//! persistence can be checked over arbitrary shapes, not just the
//! populated fixture.

use dorm_core::Value;
use proptest::prelude::*;

/// Strategy for names of aggregated entities.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z][a-zA-Z0-9 _]{0,23}").expect("Invalid regex")
}

/// Strategy for map keys.
pub fn key_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9]{0,7}").expect("Invalid regex")
}

/// Strategy for a list of lists of integers, ragged.
pub fn int_matrix_strategy() -> impl Strategy<Value = Value> {
    prop::collection::vec(prop::collection::vec(any::<i64>(), 0..6), 0..5)
        .prop_map(|rows| Value::list(rows.into_iter().map(|row| Value::list(row))))
}

/// Strategy for a map of nullable strings.
pub fn string_map_strategy() -> impl Strategy<Value = Value> {
    prop::collection::btree_map(
        key_strategy(),
        prop::option::of(name_strategy()),
        0..6,
    )
    .prop_map(|entries| Value::map(entries.into_iter().map(|(k, v)| (k, Value::from(v)))))
}

/// Strategy for a map of maps of integers.
pub fn nested_int_map_strategy() -> impl Strategy<Value = Value> {
    prop::collection::btree_map(
        key_strategy(),
        prop::collection::btree_map(key_strategy(), any::<i64>(), 0..4),
        0..4,
    )
    .prop_map(|outer| {
        Value::map(
            outer
                .into_iter()
                .map(|(k, inner)| (k, Value::map(inner))),
        )
    })
}

/// Strategy for as-is values: scalars, lists and maps of any depth.
pub fn as_is_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        (-1.0e9f64..1.0e9).prop_map(Value::from),
        name_strategy().prop_map(Value::from),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::list),
            prop::collection::btree_map(key_strategy(), inner, 0..4).prop_map(Value::Map),
        ]
    })
}
