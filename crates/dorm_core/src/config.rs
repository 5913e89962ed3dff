//! Storage configuration.

use serde::{Deserialize, Serialize};

/// Configuration for a [`Storage`](crate::Storage) session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Whether a repository ensures its indexes when it is first built.
    pub build_indexes_on_register: bool,

    /// Whether references stay unresolved until first access.
    ///
    /// When `false`, every reference of a loaded entity is resolved right
    /// after the entity has been registered in the pool.
    pub lazy_references: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            build_indexes_on_register: false,
            lazy_references: true,
        }
    }
}

impl StorageConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether repositories build their indexes when first looked up.
    #[must_use]
    pub const fn build_indexes_on_register(mut self, value: bool) -> Self {
        self.build_indexes_on_register = value;
        self
    }

    /// Sets whether references resolve lazily.
    #[must_use]
    pub const fn lazy_references(mut self, value: bool) -> Self {
        self.lazy_references = value;
        self
    }
}
