//! # dorm Storage
//!
//! The document database boundary for dorm.
//!
//! This crate defines what the object mapper needs from a database and
//! nothing more: collections of [`Document`](dorm_codec::Document) maps keyed
//! by `_id`, equality filters, unique and plain indexes, and native write
//! errors. It knows nothing about schemas, entities or references.
//!
//! ## Design Principles
//!
//! - Stores speak documents, never typed objects
//! - Errors are the database's own; classification happens in the driver
//! - Must be `Send + Sync` for concurrent access
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing and ephemeral sessions
//!
//! ## Example
//!
//! ```rust
//! use dorm_codec::Document;
//! use dorm_storage::{DocumentStore, Filter, IndexSpec, InMemoryStore};
//!
//! let store = InMemoryStore::new("app");
//! store.ensure_index("users", &IndexSpec::new("email").unique()).unwrap();
//!
//! let alice = Document::map(vec![
//!     ("_id".to_string(), Document::from("u1")),
//!     ("email".to_string(), Document::from("alice@example.com")),
//! ]);
//! store.insert("users", &alice).unwrap();
//!
//! let found = store.find_one("users", &Filter::eq("email", "alice@example.com")).unwrap();
//! assert_eq!(found, Some(alice));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod filter;
mod index;
mod memory;

pub use backend::{DocumentCursor, DocumentStore, ReplaceOutcome};
pub use error::{StoreError, StoreResult, DUPLICATE_KEY_CODE};
pub use filter::{lookup_path, Filter};
pub use index::{default_index_name, render_key, IndexDirection, IndexSpec, ID_FIELD, ID_INDEX};
pub use memory::InMemoryStore;
