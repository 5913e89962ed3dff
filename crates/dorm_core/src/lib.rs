//! # dorm Core
//!
//! Object-document mapping for dorm.
//!
//! This crate provides:
//! - Schemas describing how typed objects map to documents
//! - A recursive codec for scalars, nested containers, embedded and
//!   polymorphic objects, and references
//! - An entity pool (identity map) scoped to one storage session
//! - Lazy references and reference collections that load on first access
//! - Repositories with managed fields (keys, public references,
//!   timestamps, created-by)
//! - A storage driver translating uniqueness violations into
//!   [`DuplicateKeyError`]
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use dorm_core::{FieldType, ObjectSchema, SchemaRegistry, Services, Storage, StorageConfig};
//! use dorm_storage::InMemoryStore;
//!
//! let user = ObjectSchema::builder("User")
//!     .identity("id")
//!     .field("name", FieldType::string())
//!     .build()
//!     .unwrap();
//! let schemas = Arc::new(SchemaRegistry::builder().register(user).build().unwrap());
//!
//! let storage = Storage::new(
//!     Arc::new(InMemoryStore::new("app")),
//!     schemas,
//!     Services::with_defaults(),
//!     StorageConfig::default(),
//! );
//! storage.register("users", "User").unwrap();
//!
//! let users = storage.repository("users").unwrap();
//! let alice = users.create();
//! alice.set("name", "Alice").unwrap();
//! users.save(&alice).unwrap();
//!
//! let found = users.find_by_id(alice.key().unwrap()).unwrap().unwrap();
//! assert!(found.ptr_eq(&alice));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod config;
mod driver;
mod entity;
mod error;
mod reference;
mod repository;
mod schema;
mod services;
mod storage;
mod value;

pub use codec::Codec;
pub use config::StorageConfig;
pub use driver::StorageDriver;
pub use entity::{EntityHandle, EntityKey, EntityPool, PoolKey, PRIMARY_ID};
pub use error::{CoreError, CoreResult, DuplicateKeyError};
pub use reference::{LazyRef, LazyRefCollection, ReferenceLoader};
pub use repository::{FindCursor, Repository};
pub use schema::{
    FieldKind, FieldSchema, FieldType, ObjectSchema, ObjectSchemaBuilder, PolymorphicSchema,
    PolymorphicSchemaBuilder, PublicReferenceField, ReferenceBy, ReferenceSchema, SchemaProvider,
    SchemaRegistry, SchemaRegistryBuilder,
};
pub use services::{
    Clock, KeyGenerator, PublicReferenceGenerator, Services, SystemClock,
    TypeNamedReferenceGenerator, UserRecord, UserRecordProvider, UuidKeyGenerator, CLOCK,
    KEY_GENERATOR, PUBLIC_REFERENCE_GENERATOR, USER_RECORD_PROVIDER,
};
pub use storage::{RepositoryContext, RepositoryFactory, Storage};
pub use value::{Object, Value};
