//! Fixture schemas.
//!
//! A small application model exercising every field kind: a main entity
//! with scalars, nested containers, embedded and polymorphic objects and
//! references, an aggregated entity it points at, and three polymorphic
//! variants.

use dorm_core::{
    CoreResult, FieldType, ObjectSchema, PolymorphicSchema, SchemaRegistry,
};
use std::sync::Arc;

/// Type name of the main entity.
pub const MAIN_CLASS: &str = "MainClass";
/// Type name of the entity the main entity references.
pub const AGGREGATED_CLASS: &str = "AggregatedClass";
/// Polymorphic variant selected by tag `a`.
pub const POLY_CHILD_A: &str = "PolyChildA";
/// Polymorphic variant selected by tag `b`.
pub const POLY_CHILD_B: &str = "PolyChildB";
/// Polymorphic default variant; it has no tag.
pub const POLY_CHILD_C: &str = "PolyChildC";

/// Discriminator field of the polymorphic list.
pub const POLY_DISCRIMINATOR: &str = "type";

/// The discriminator table of [`MAIN_CLASS`]'s polymorphic list.
pub fn poly_parent() -> CoreResult<Arc<PolymorphicSchema>> {
    PolymorphicSchema::builder(POLY_DISCRIMINATOR)
        .variant("a", POLY_CHILD_A)
        .variant("b", POLY_CHILD_B)
        .default_type(POLY_CHILD_C)
        .build()
}

/// The entity persisted in the main collection.
///
/// Its public reference is backed by a unique index, so two entities with
/// the same reference cannot both be stored.
pub fn main_class() -> CoreResult<Arc<ObjectSchema>> {
    let int_list = || FieldType::list(FieldType::integer());
    ObjectSchema::builder(MAIN_CLASS)
        .identity("id")
        .unique_public_reference("reference")
        .timestamped("createdAt", "updatedAt")
        .created_by("createdBy")
        .field("anObject", FieldType::object(AGGREGATED_CLASS))
        .field("aListOfPolymorphics", FieldType::list(FieldType::polymorphic(poly_parent()?)))
        .field("aReferencedObject", FieldType::reference(AGGREGATED_CLASS))
        .field(
            "aListOfReferencedObjects",
            FieldType::list(FieldType::reference(AGGREGATED_CLASS)),
        )
        .field(
            "aListOfMapsOfReferencedObjects",
            FieldType::list(FieldType::map(FieldType::reference(AGGREGATED_CLASS))),
        )
        .field("aMapOfStrings", FieldType::map(FieldType::string()))
        .field("aMapOfIntegers", FieldType::map(FieldType::integer()))
        .field("aMapOfMixed", FieldType::map(FieldType::as_is()))
        .field("aMapOfObjects", FieldType::map(FieldType::object(AGGREGATED_CLASS)))
        .field("aListOfListsOfStrings", FieldType::list(FieldType::list(FieldType::string())))
        .field("aListOfListsOfIntegers", FieldType::list(int_list()))
        .field("aMapOfListsOfIntegers", FieldType::map(int_list()))
        .field(
            "aMapOfMapsOfIntegers",
            FieldType::map(FieldType::map(FieldType::integer())),
        )
        .field("aListOfListsOfMixed", FieldType::list(FieldType::list(FieldType::as_is())))
        .field(
            "aListOfListsOfObjects",
            FieldType::list(FieldType::list(FieldType::object(AGGREGATED_CLASS))),
        )
        .field("aBool", FieldType::bool())
        .field("anotherBool", FieldType::bool())
        .field("aDecimal", FieldType::decimal())
        .field("anInteger", FieldType::integer())
        .field("aString", FieldType::string())
        .field("aStringContainingNull", FieldType::string())
        .field("aSimpleDate", FieldType::date())
        .field("aLocalDate", FieldType::local_date())
        .field("aSomethingAsIs", FieldType::as_is())
        .field("aSomethingElseAsIs", FieldType::as_is())
        .build()
}

/// The entity persisted in the referenced collection. Its public reference
/// has a plain index.
pub fn aggregated_class() -> CoreResult<Arc<ObjectSchema>> {
    ObjectSchema::builder(AGGREGATED_CLASS)
        .identity("id")
        .public_reference("reference")
        .timestamped("createdAt", "updatedAt")
        .field("name", FieldType::string())
        .build()
}

fn poly_child(name: &str, property: &str) -> CoreResult<Arc<ObjectSchema>> {
    ObjectSchema::builder(name)
        .field("common", FieldType::string())
        .field(property, FieldType::string())
        .build()
}

/// Every fixture type.
pub fn registry() -> CoreResult<Arc<SchemaRegistry>> {
    let registry = SchemaRegistry::builder()
        .register(main_class()?)
        .register(aggregated_class()?)
        .register(poly_child(POLY_CHILD_A, "propOnA")?)
        .register(poly_child(POLY_CHILD_B, "propOnB")?)
        .register(poly_child(POLY_CHILD_C, "propOnC")?)
        .build()?;
    Ok(Arc::new(registry))
}
