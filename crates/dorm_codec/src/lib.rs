//! # dorm Codec
//!
//! The document value model of dorm and its canonical CBOR encoding.
//!
//! Every entity is translated to a [`Document`] tree before it reaches
//! storage. The in-memory document store persists those trees as canonical
//! CBOR so that:
//! - Identical documents produce identical bytes
//! - Map key order never leaks into equality
//! - Every load decodes a fresh tree
//!
//! ## Canonical CBOR Rules
//!
//! - Maps are sorted by key (length-first, then bytewise); keys are text
//! - Integers use shortest encoding
//! - Floats are 64-bit; NaN is rejected
//! - Dates are tag 1 epoch values with millisecond precision
//! - No indefinite-length items
//!
//! ## Usage
//!
//! ```
//! use dorm_codec::{from_cbor, to_canonical_cbor, Document};
//!
//! let doc = Document::map(vec![("name".to_string(), Document::from("Alice"))]);
//! let bytes = to_canonical_cbor(&doc).unwrap();
//!
//! let decoded = from_cbor(&bytes).unwrap();
//! assert_eq!(doc, decoded);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod document;
mod encoder;
mod error;
mod render;

pub use decoder::{from_cbor, CanonicalDecoder};
pub use document::{cmp_key, Document};
pub use encoder::{to_canonical_cbor, CanonicalEncoder};
pub use error::{CodecError, CodecResult};
