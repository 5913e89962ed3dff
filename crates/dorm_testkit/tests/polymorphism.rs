//! Polymorphic lists keep their concrete types.

use dorm_codec::Document;
use dorm_core::{CoreError, FieldType, Object, PolymorphicSchema, SchemaProvider, Value};
use dorm_testkit::prelude::*;

fn variant(value: &Value) -> (String, String, String) {
    let object = value.as_object().unwrap();
    let property = match object.type_name() {
        POLY_CHILD_A => "propOnA",
        POLY_CHILD_B => "propOnB",
        _ => "propOnC",
    };
    let text = |field: &str| object.get(field).unwrap().as_text().unwrap().to_string();
    (object.type_name().to_string(), text("common"), text(property))
}

#[test]
fn reloaded_item_contains_a_list_of_polymorphics() {
    let storage = TestStorage::new();
    let item = storage.populated_main();
    storage.save(&item).unwrap();
    storage.clear();

    let reloaded = storage.main().find_by_id(item.key().unwrap()).unwrap().unwrap();
    let list = reloaded.get("aListOfPolymorphics").unwrap();
    let variants: Vec<_> = list.as_list().unwrap().iter().map(variant).collect();
    assert_eq!(
        variants,
        vec![
            (POLY_CHILD_A.to_string(), "commonA".to_string(), "myA".to_string()),
            (POLY_CHILD_B.to_string(), "commonB".to_string(), "myB".to_string()),
            (POLY_CHILD_C.to_string(), "commonC".to_string(), "myC".to_string()),
            (POLY_CHILD_A.to_string(), "commonA2".to_string(), "myA2".to_string()),
        ]
    );
}

#[test]
fn unknown_discriminators_decode_to_the_default_type() {
    let storage = TestStorage::new();
    let ty = FieldType::polymorphic(poly_parent().unwrap());
    let document = Document::map(vec![
        ("type".to_string(), Document::from("zzz")),
        ("common".to_string(), Document::from("shared")),
        ("propOnC".to_string(), Document::from("own")),
    ]);

    let value = storage.codec().decode(&document, &ty).unwrap();
    assert_eq!(
        variant(&value),
        (POLY_CHILD_C.to_string(), "shared".to_string(), "own".to_string())
    );
}

#[test]
fn missing_default_type_is_a_configuration_error() {
    let err = PolymorphicSchema::builder("type")
        .variant("a", POLY_CHILD_A)
        .build()
        .unwrap_err();
    assert!(matches!(err, CoreError::MissingDefaultType { .. }));
}

#[test]
fn foreign_types_are_rejected_on_encode() {
    let storage = TestStorage::new();
    let item = storage.main().create();
    let foreign = Object::new(
        storage
            .codec()
            .schemas()
            .require(AGGREGATED_CLASS)
            .unwrap(),
    );
    item.set("aListOfPolymorphics", Value::list([Value::Object(foreign)]))
        .unwrap();

    let err = storage.main().save(&item).unwrap_err();
    assert!(matches!(err, CoreError::SchemaMismatch { .. }), "{err}");
    assert!(err.to_string().contains("aListOfPolymorphics[0]"), "{err}");
}
