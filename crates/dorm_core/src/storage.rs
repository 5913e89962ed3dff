//! The storage façade: one session of pooled repositories.

use crate::codec::Codec;
use crate::config::StorageConfig;
use crate::entity::{EntityHandle, EntityKey, EntityPool};
use crate::error::{CoreError, CoreResult};
use crate::reference::ReferenceLoader;
use crate::repository::Repository;
use crate::schema::{ReferenceBy, SchemaProvider};
use crate::services::Services;
use dorm_codec::Document;
use dorm_storage::DocumentStore;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Builds the repository of a registered collection.
pub type RepositoryFactory =
    Arc<dyn Fn(&RepositoryContext, &str) -> CoreResult<Repository> + Send + Sync>;

/// Everything a repository factory may wire into a repository.
#[derive(Clone)]
pub struct RepositoryContext {
    store: Arc<dyn DocumentStore>,
    schemas: Arc<dyn SchemaProvider>,
    codec: Codec,
    pool: Arc<EntityPool>,
    services: Arc<Services>,
    config: StorageConfig,
}

impl RepositoryContext {
    /// The document store.
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// The schema provider.
    pub fn schemas(&self) -> &Arc<dyn SchemaProvider> {
        &self.schemas
    }

    /// The session's codec, bound to the session's reference loader.
    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    /// The session's entity pool.
    pub fn pool(&self) -> &Arc<EntityPool> {
        &self.pool
    }

    /// The registered services.
    pub fn services(&self) -> &Arc<Services> {
        &self.services
    }

    /// The session configuration.
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }
}

struct Provider {
    type_name: String,
    factory: RepositoryFactory,
}

#[derive(Default)]
struct Registry {
    /// Providers by collection.
    providers: HashMap<String, Provider>,
    /// Collection by type.
    routes: HashMap<String, String>,
    /// Repositories built so far, by collection.
    built: HashMap<String, Arc<Repository>>,
}

/// A storage session.
///
/// The session owns one entity pool shared by all of its repositories, so
/// an entity loaded through any repository, or through a reference, is the
/// same instance until [`Storage::clear`] is called. Repositories are
/// registered by collection and built on first lookup.
///
/// References decoded by the session load their targets through the
/// session itself. They hold only a weak link to it; once the session is
/// dropped, resolving them fails with [`CoreError::SessionClosed`].
pub struct Storage {
    context: RepositoryContext,
    registry: RwLock<Registry>,
}

impl Storage {
    /// Opens a session over `store`.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        schemas: Arc<dyn SchemaProvider>,
        services: Services,
        config: StorageConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|session: &Weak<Storage>| {
            let loader: Arc<dyn ReferenceLoader> = Arc::new(StorageLoader {
                session: session.clone(),
            });
            Self {
                context: RepositoryContext {
                    store,
                    codec: Codec::new(Arc::clone(&schemas)).with_loader(loader),
                    schemas,
                    pool: Arc::new(EntityPool::new()),
                    services: Arc::new(services),
                    config,
                },
                registry: RwLock::new(Registry::default()),
            }
        })
    }

    /// Registers `collection` as the home of `type_name`.
    ///
    /// # Errors
    ///
    /// Fails if the collection or the type is already registered.
    pub fn register(&self, collection: &str, type_name: &str) -> CoreResult<()> {
        let stored = type_name.to_string();
        self.register_provider(
            collection,
            type_name,
            Arc::new(move |context: &RepositoryContext, collection: &str| {
                Repository::new(context, collection, &stored)
            }),
        )
    }

    /// Registers `collection` with a custom repository factory.
    ///
    /// The factory runs once, on the first lookup of the collection.
    ///
    /// # Errors
    ///
    /// Fails if the collection or the type is already registered.
    pub fn register_provider(
        &self,
        collection: &str,
        type_name: &str,
        factory: RepositoryFactory,
    ) -> CoreResult<()> {
        let mut registry = self.registry.write();
        if registry.providers.contains_key(collection) {
            return Err(CoreError::invalid_schema(format!(
                "collection {collection} is already registered"
            )));
        }
        if let Some(existing) = registry.routes.get(type_name) {
            return Err(CoreError::invalid_schema(format!(
                "type {type_name} is already stored in {existing}"
            )));
        }
        registry
            .routes
            .insert(type_name.to_string(), collection.to_string());
        registry.providers.insert(
            collection.to_string(),
            Provider {
                type_name: type_name.to_string(),
                factory,
            },
        );
        debug!(collection, type_name, "registered repository");
        Ok(())
    }

    /// The repository of a collection, built on first use.
    ///
    /// # Errors
    ///
    /// - [`CoreError::RepositoryNotFound`] if the collection is not registered
    /// - Errors of the factory, or of building indexes when
    ///   [`StorageConfig::build_indexes_on_register`] is set
    pub fn repository(&self, collection: &str) -> CoreResult<Arc<Repository>> {
        let factory = {
            let registry = self.registry.read();
            if let Some(repository) = registry.built.get(collection) {
                return Ok(Arc::clone(repository));
            }
            let provider = registry
                .providers
                .get(collection)
                .ok_or_else(|| CoreError::RepositoryNotFound {
                    name: collection.to_string(),
                })?;
            Arc::clone(&provider.factory)
        };

        // Factories run without the registry lock held
        let repository = Arc::new(factory(&self.context, collection)?);
        if self.context.config.build_indexes_on_register {
            repository.build_indexes()?;
        }
        debug!(collection, type_name = %repository.type_name(), "built repository");

        let mut registry = self.registry.write();
        Ok(Arc::clone(
            registry
                .built
                .entry(collection.to_string())
                .or_insert(repository),
        ))
    }

    /// The repository persisting `type_name`.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::RepositoryNotFound`] if no collection
    /// stores the type.
    pub fn repository_for_type(&self, type_name: &str) -> CoreResult<Arc<Repository>> {
        let collection = self
            .registry
            .read()
            .routes
            .get(type_name)
            .cloned()
            .ok_or_else(|| CoreError::RepositoryNotFound {
                name: type_name.to_string(),
            })?;
        self.repository(&collection)
    }

    /// Saves an entity through the repository of its type.
    ///
    /// # Errors
    ///
    /// See [`Repository::save`].
    pub fn save(&self, entity: &EntityHandle) -> CoreResult<()> {
        self.repository_for_type(&entity.type_name())?.save(entity)
    }

    /// Inserts an entity through the repository of its type.
    ///
    /// # Errors
    ///
    /// See [`Repository::insert`].
    pub fn insert(&self, entity: &EntityHandle) -> CoreResult<()> {
        self.repository_for_type(&entity.type_name())?.insert(entity)
    }

    /// Saves every pooled entity.
    ///
    /// # Errors
    ///
    /// Stops at the first failure.
    pub fn save_all(&self) -> CoreResult<()> {
        for entity in self.context.pool.all() {
            self.save(&entity)?;
        }
        Ok(())
    }

    /// Registered collection names, sorted.
    pub fn collections(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registry.read().providers.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// The type stored in a collection.
    pub fn type_of(&self, collection: &str) -> Option<String> {
        self.registry
            .read()
            .providers
            .get(collection)
            .map(|p| p.type_name.clone())
    }

    /// The session's entity pool.
    pub fn pool(&self) -> &Arc<EntityPool> {
        &self.context.pool
    }

    /// Ends the unit of work: forgets every pooled instance.
    pub fn clear(&self) {
        debug!(entries = self.context.pool.len(), "clearing entity pool");
        self.context.pool.clear();
    }

    /// The session's codec.
    pub fn codec(&self) -> &Codec {
        &self.context.codec
    }

    /// The session configuration.
    pub fn config(&self) -> &StorageConfig {
        &self.context.config
    }

    /// The document store.
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.context.store
    }

    /// The registered services.
    pub fn services(&self) -> &Arc<Services> {
        &self.context.services
    }
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("database", &self.context.store.database_name())
            .field("collections", &self.collections())
            .field("pooled", &self.context.pool.len())
            .finish()
    }
}

/// Resolves references through the repositories of a session.
struct StorageLoader {
    session: Weak<Storage>,
}

impl ReferenceLoader for StorageLoader {
    fn load_reference(
        &self,
        target: &str,
        by: ReferenceBy,
        key: &Document,
    ) -> CoreResult<Option<EntityHandle>> {
        let storage = self.session.upgrade().ok_or(CoreError::SessionClosed)?;
        let repository = storage.repository_for_type(target)?;
        match by {
            ReferenceBy::Key => match EntityKey::from_document(key) {
                Some(key) => repository.find_by_id(key),
                None => Ok(None),
            },
            ReferenceBy::PublicReference => match key.as_text() {
                Some(reference) => repository.find_by_reference(reference),
                None => Ok(None),
            },
        }
    }
}
