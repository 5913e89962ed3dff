//! Identity map behaviour across saves, loads and pool clears.

use dorm_core::{EntityHandle, EntityKey, PRIMARY_ID};
use dorm_storage::Filter;
use dorm_testkit::prelude::*;

#[test]
fn getting_an_object_by_id_twice_gives_the_same_object() {
    let storage = TestStorage::new();
    let subject = storage.main().create();
    subject.set("id", "TEST001").unwrap();
    storage.main().save(&subject).unwrap();

    assert!(storage
        .pool()
        .has(MAIN_CLASS, PRIMARY_ID, &EntityKey::from("TEST001")));

    let reloaded = storage.main().find_by_id("TEST001").unwrap().unwrap();
    assert!(reloaded.ptr_eq(&subject));
}

#[test]
fn clearing_the_pool_gives_new_instances() {
    let storage = TestStorage::new();
    let subject = storage.main().create();
    subject.set("id", "TEST001").unwrap();
    storage.main().save(&subject).unwrap();

    storage.clear();
    assert!(storage.pool().all().is_empty());

    let reloaded = storage.main().find_by_id("TEST001").unwrap().unwrap();
    assert!(!reloaded.ptr_eq(&subject));
    assert_eq!(reloaded.key(), subject.key());

    let again = storage.main().find_by_id("TEST001").unwrap().unwrap();
    assert!(again.ptr_eq(&reloaded));
}

#[test]
fn find_by_reference_uses_the_pool() {
    let storage = TestStorage::new();
    let subject = storage.saved_aggregated("pooled");
    let reference = subject.get("reference").unwrap();
    let reference = reference.as_text().unwrap();

    let found = storage.referenced().find_by_reference(reference).unwrap().unwrap();
    assert!(found.ptr_eq(&subject));

    storage.clear();
    let loaded = storage.referenced().find_by_reference(reference).unwrap().unwrap();
    assert!(!loaded.ptr_eq(&subject));
    // Loading by reference pools under the key as well
    let by_id = storage.referenced().find_by_id(subject.key().unwrap()).unwrap().unwrap();
    assert!(by_id.ptr_eq(&loaded));
}

#[test]
fn overlapping_queries_share_instances() {
    let storage = TestStorage::new();
    for name in ["a", "b", "c"] {
        storage.saved_aggregated(name);
    }
    storage.clear();

    let repository = storage.referenced();
    let everything: Vec<EntityHandle> = repository
        .find(&Filter::all())
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    let just_b = repository
        .find(&Filter::eq("name", "b"))
        .unwrap()
        .first()
        .unwrap()
        .unwrap();
    assert!(everything.iter().any(|e| e.ptr_eq(&just_b)));
}

#[test]
fn references_resolve_to_pooled_instances() {
    let storage = TestStorage::new();
    let item = storage.populated_main();
    storage.main().save(&item).unwrap();
    storage.clear();

    let child = storage.referenced().find_by_id("ID0001").unwrap().unwrap();
    let reloaded = storage.main().find_by_id(item.key().unwrap()).unwrap().unwrap();
    let children = reloaded.get("aListOfReferencedObjects").unwrap();
    let first = children.as_references().unwrap().get(0).unwrap().unwrap();
    assert!(first.ptr_eq(&child));
}

#[test]
fn removing_documents_keeps_pooled_instances() {
    let storage = TestStorage::new();
    let subject = storage.saved_aggregated("kept");
    storage.referenced().remove_all(&Filter::all()).unwrap();

    let still_pooled = storage.referenced().find_by_id(subject.key().unwrap()).unwrap();
    assert!(still_pooled.unwrap().ptr_eq(&subject));

    storage.clear();
    assert!(storage.referenced().find_by_id(subject.key().unwrap()).unwrap().is_none());
}

#[test]
fn save_all_writes_pooled_changes() {
    let storage = TestStorage::new();
    let subject = storage.saved_aggregated("before");
    subject.set("name", "after").unwrap();
    storage.save_all().unwrap();

    storage.clear();
    let reloaded = storage.referenced().find_by_id(subject.key().unwrap()).unwrap().unwrap();
    assert_eq!(reloaded.get("name").unwrap().as_text(), Some("after"));
}

#[test]
fn saving_over_a_key_forgets_the_old_reference() {
    let storage = TestStorage::new();
    let main = storage.main();

    let original = main.create();
    original.set("id", "K1").unwrap();
    original.set("reference", "RA").unwrap();
    main.save(&original).unwrap();

    let replacement = main.create();
    replacement.set("id", "K1").unwrap();
    replacement.set("reference", "RB").unwrap();
    main.save(&replacement).unwrap();

    assert!(main.find_by_id("K1").unwrap().unwrap().ptr_eq(&replacement));
    assert!(main.find_by_reference("RB").unwrap().unwrap().ptr_eq(&replacement));
    assert!(main.find_by_reference("RA").unwrap().is_none());
    assert!(!storage
        .pool()
        .has(MAIN_CLASS, "reference", &EntityKey::from("RA")));
}
