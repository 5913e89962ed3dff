//! Lazy references to entities in other collections.
//!
//! A reference field stores only the target's key (or public reference).
//! Decoding such a field yields a [`LazyRef`] that loads the target through
//! a [`ReferenceLoader`] the first time it is unwrapped; lists and maps of
//! references decode to a [`LazyRefCollection`] whose elements resolve
//! independently.
//!
//! A target that no longer exists resolves to `Ok(None)`. Every other
//! loader failure, an unreadable target document or a dropped session, is
//! returned to the caller and leaves the reference unresolved.

mod collection;
mod lazy;

pub use collection::LazyRefCollection;
pub use lazy::LazyRef;

use crate::entity::EntityHandle;
use crate::error::CoreResult;
use crate::schema::ReferenceBy;
use dorm_codec::Document;

/// Loads the target of a reference.
///
/// Implementations typically look the target up in its repository, which
/// consults the entity pool before touching storage.
pub trait ReferenceLoader: Send + Sync {
    /// Loads the entity of type `target` whose identifier `by` equals `key`.
    ///
    /// Returns `Ok(None)` when no such entity exists.
    fn load_reference(
        &self,
        target: &str,
        by: ReferenceBy,
        key: &Document,
    ) -> CoreResult<Option<EntityHandle>>;
}
