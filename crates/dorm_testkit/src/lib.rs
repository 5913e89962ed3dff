//! # dorm Testkit
//!
//! Test utilities for dorm.
//!
//! This crate provides:
//! - Fixture schemas covering every field kind
//! - Deterministic service stubs (sequential keys, manual clock, fixed user)
//! - An in-memory [`TestStorage`] session with both fixture collections
//! - Property-based generators using proptest
//! - `tracing` output for tests via [`init_tracing`]
//!
//! ## Usage
//!
//! ```rust
//! use dorm_testkit::prelude::*;
//!
//! let storage = TestStorage::new();
//! let main = storage.populated_main();
//! storage.main().save(&main).unwrap();
//! assert!(main.key().is_some());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod schemas;
pub mod stubs;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::schemas::*;
    pub use crate::stubs::*;
}

pub use fixtures::*;
pub use generators::*;
pub use schemas::*;
pub use stubs::*;
