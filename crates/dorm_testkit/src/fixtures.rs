//! Test storage sessions and populated entities.
//!
//! [`TestStorage`] opens an in-memory session over the fixture schemas,
//! with deterministic keys, a manual clock and a fixed user, and both
//! collections registered.

use crate::schemas::{self, AGGREGATED_CLASS, MAIN_CLASS, POLY_CHILD_A, POLY_CHILD_B, POLY_CHILD_C};
use crate::stubs::{FixedUser, ManualClock, SequentialKeys};
use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use dorm_core::{
    EntityHandle, Object, Repository, SchemaProvider, Services, Storage, StorageConfig, Value,
};
use dorm_storage::{Filter, InMemoryStore};
use std::sync::{Arc, Once};

/// Database name of every test store.
pub const DB_NAME: &str = "dorm_test";
/// Collection holding [`MAIN_CLASS`] entities.
pub const MAIN_COLLECTION: &str = "main_class";
/// Collection holding [`AGGREGATED_CLASS`] entities.
pub const REFERENCED_COLLECTION: &str = "ref_class";

static TRACING: Once = Once::new();

/// Routes `tracing` output to the test harness, filtered by `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// An in-memory storage session over the fixture schemas.
pub struct TestStorage {
    /// The session.
    pub storage: Arc<Storage>,
    /// The backing store.
    pub store: Arc<InMemoryStore>,
    /// The session's clock.
    pub clock: Arc<ManualClock>,
    /// The session's key generator.
    pub keys: Arc<SequentialKeys>,
}

impl TestStorage {
    /// Opens a session that builds indexes on first repository lookup.
    pub fn new() -> Self {
        Self::with_config(StorageConfig::default().build_indexes_on_register(true))
    }

    /// Opens a session with the given configuration.
    pub fn with_config(config: StorageConfig) -> Self {
        init_tracing();
        let schemas = schemas::registry().expect("fixture schemas are valid");
        let store = Arc::new(InMemoryStore::new(DB_NAME));
        let clock = Arc::new(ManualClock::fixed());
        let keys = Arc::new(SequentialKeys::new("ID"));
        let services = Services::with_defaults()
            .register_key_generator(keys.clone())
            .register_clock(clock.clone())
            .register_user_records(Arc::new(FixedUser::tester()));

        let storage = Storage::new(store.clone(), schemas, services, config);
        storage
            .register(MAIN_COLLECTION, MAIN_CLASS)
            .expect("Failed to register main collection");
        storage
            .register(REFERENCED_COLLECTION, AGGREGATED_CLASS)
            .expect("Failed to register referenced collection");

        let test = Self {
            storage,
            store,
            clock,
            keys,
        };
        // Looking the repositories up builds their indexes when configured.
        test.main();
        test.referenced();
        test
    }

    /// The repository of [`MAIN_COLLECTION`].
    pub fn main(&self) -> Arc<Repository> {
        self.storage
            .repository(MAIN_COLLECTION)
            .expect("main repository is registered")
    }

    /// The repository of [`REFERENCED_COLLECTION`].
    pub fn referenced(&self) -> Arc<Repository> {
        self.storage
            .repository(REFERENCED_COLLECTION)
            .expect("referenced repository is registered")
    }

    /// A fresh, unsaved aggregated entity.
    pub fn aggregated(&self, name: &str) -> EntityHandle {
        let entity = self.referenced().create();
        entity.set("name", name).expect("name is declared");
        entity
    }

    /// An aggregated entity saved in [`REFERENCED_COLLECTION`].
    pub fn saved_aggregated(&self, name: &str) -> EntityHandle {
        let entity = self.aggregated(name);
        self.referenced()
            .save(&entity)
            .expect("Failed to save aggregated entity");
        entity
    }

    /// A polymorphic variant instance.
    pub fn poly(&self, type_name: &str, common: &str, own: &str) -> Value {
        let schema = self
            .storage
            .codec()
            .schemas()
            .require(type_name)
            .expect("polymorphic variant is registered");
        let property = match type_name {
            POLY_CHILD_A => "propOnA",
            POLY_CHILD_B => "propOnB",
            _ => "propOnC",
        };
        let object = Object::new(schema)
            .with("common", common)
            .and_then(|o| o.with(property, own))
            .expect("variant fields are declared");
        Value::Object(object)
    }

    /// An embedded aggregated object.
    pub fn embedded(&self, name: &str) -> Value {
        let object = Object::new(self.referenced().schema().clone())
            .with("name", name)
            .expect("name is declared");
        Value::Object(object)
    }

    /// A main entity with every field populated.
    ///
    /// The entities of its reference lists are saved first; the single
    /// referenced entity is left unsaved so tests decide when it is stored.
    pub fn populated_main(&self) -> EntityHandle {
        let children: Vec<EntityHandle> = ["child_01", "child_02", "child_03"]
            .into_iter()
            .map(|name| self.saved_aggregated(name))
            .collect();
        let list_map: Vec<EntityHandle> = ["list_map_a", "list_map_b", "list_map_c"]
            .into_iter()
            .map(|name| self.saved_aggregated(name))
            .collect();

        let main = self.main().create();
        let mut object = main.write();
        let mut set = |field: &str, value: Value| {
            object.set(field, value).expect("fixture field is declared");
        };

        set("anObject", self.embedded("anObject"));
        set(
            "aListOfPolymorphics",
            Value::list([
                self.poly(POLY_CHILD_A, "commonA", "myA"),
                self.poly(POLY_CHILD_B, "commonB", "myB"),
                self.poly(POLY_CHILD_C, "commonC", "myC"),
                self.poly(POLY_CHILD_A, "commonA2", "myA2"),
            ]),
        );
        set("aReferencedObject", Value::from(self.aggregated("ref")));
        set(
            "aListOfReferencedObjects",
            Value::list([
                Value::from(children[0].clone()),
                Value::from(children[1].clone()),
                Value::Null,
                Value::from(children[2].clone()),
                Value::Null,
            ]),
        );
        set(
            "aListOfMapsOfReferencedObjects",
            Value::list([
                Value::map([
                    ("a", Value::from(list_map[0].clone())),
                    ("b", Value::from(list_map[1].clone())),
                ]),
                Value::map([("c", Value::from(list_map[2].clone())), ("d", Value::Null)]),
            ]),
        );
        set(
            "aMapOfStrings",
            Value::map([
                ("a", Value::from("1")),
                ("b", Value::from("2")),
                ("c", Value::from("1")),
                ("d", Value::from("")),
                ("e", Value::Null),
            ]),
        );
        set(
            "aMapOfIntegers",
            Value::map([("a", 1), ("b", 2), ("c", 1), ("d", 0)]),
        );
        set("aMapOfMixed", mixed_map());
        set(
            "aMapOfObjects",
            Value::map([
                ("first", self.embedded("Obj 1")),
                ("second", self.embedded("Obj 2")),
            ]),
        );
        set(
            "aListOfListsOfStrings",
            Value::list([
                Value::list([Value::from("1"), Value::from("1"), Value::from(""), Value::Null]),
                Value::list([Value::from("2"), Value::from("2"), Value::from(""), Value::Null]),
            ]),
        );
        set(
            "aListOfListsOfIntegers",
            Value::list([
                Value::list([1, 1, 1, 0, 0, 0, 0]),
                Value::list([2, 2, 1, 0, 0, 0, 0]),
            ]),
        );
        set(
            "aMapOfListsOfIntegers",
            Value::map([
                ("a", Value::list([1, 1, 1, 0])),
                ("b", Value::list([2, 2, 1, 0])),
            ]),
        );
        set(
            "aMapOfMapsOfIntegers",
            Value::map([
                ("a", Value::map([("a1", 1), ("a2", 1), ("a3", 0)])),
                ("b", Value::map([("b1", 2), ("b2", 2), ("b3", 0)])),
            ]),
        );
        set(
            "aListOfListsOfMixed",
            Value::list([
                Value::list([
                    Value::from(1),
                    Value::from("1"),
                    Value::from(true),
                    Value::from(false),
                    Value::list([1, 2]),
                    Value::list(Vec::<Value>::new()),
                ]),
                Value::list([
                    Value::from(2),
                    Value::from("2"),
                    Value::from(true),
                    Value::from(false),
                    Value::list([1, 2]),
                    Value::list(Vec::<Value>::new()),
                ]),
            ]),
        );
        set(
            "aListOfListsOfObjects",
            Value::list([
                Value::list([self.embedded("Obj a1"), self.embedded("Obj a2")]),
                Value::list([self.embedded("Obj b1"), self.embedded("Obj b2")]),
            ]),
        );
        set("aBool", Value::from(true));
        set("anotherBool", Value::from(false));
        set("aDecimal", Value::from(12.34));
        set("anInteger", Value::from(42));
        set("aString", Value::from("some string"));
        set("aStringContainingNull", Value::Null);
        set("aSimpleDate", Value::from(simple_date()));
        set("aLocalDate", Value::from(local_date()));
        set("aSomethingAsIs", Value::from("as is"));
        set("aSomethingElseAsIs", Value::from(7));
        drop(object);

        main
    }

    /// Deletes every stored document and clears the pool.
    pub fn reset(&self) {
        self.main()
            .remove_all(&Filter::all())
            .expect("Failed to clear main collection");
        self.referenced()
            .remove_all(&Filter::all())
            .expect("Failed to clear referenced collection");
        self.storage.clear();
    }
}

impl Default for TestStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestStorage {
    type Target = Storage;

    fn deref(&self) -> &Self::Target {
        &self.storage
    }
}

/// Runs a test against a fresh [`TestStorage`].
///
/// # Example
///
/// ```rust
/// use dorm_testkit::with_test_storage;
///
/// with_test_storage(|storage| {
///     let entity = storage.saved_aggregated("x");
///     assert!(entity.key().is_some());
/// });
/// ```
pub fn with_test_storage<F, R>(f: F) -> R
where
    F: FnOnce(&TestStorage) -> R,
{
    let storage = TestStorage::new();
    f(&storage)
}

/// The as-is map of [`TestStorage::populated_main`].
pub fn mixed_map() -> Value {
    Value::map([
        ("a", Value::from(1)),
        ("b", Value::from("2")),
        ("c", Value::from(true)),
        ("d", Value::from(false)),
        ("e", Value::Null),
        ("f", Value::list([1, 2])),
        ("g", Value::list(Vec::<Value>::new())),
    ])
}

/// The simple date of [`TestStorage::populated_main`].
pub fn simple_date() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2019, 3, 14, 15, 9, 26)
        .single()
        .expect("valid date")
}

/// The local date of [`TestStorage::populated_main`], two hours east of UTC.
pub fn local_date() -> DateTime<FixedOffset> {
    FixedOffset::east_opt(2 * 3600)
        .and_then(|tz| tz.with_ymd_and_hms(2019, 6, 1, 8, 30, 0).single())
        .expect("valid local date")
}
