//! Per-collection repositories.

use crate::codec::Codec;
use crate::driver::StorageDriver;
use crate::entity::{EntityHandle, EntityKey, EntityPool, PRIMARY_ID};
use crate::error::{CoreError, CoreResult};
use crate::reference::LazyRef;
use crate::schema::ObjectSchema;
use crate::services::Services;
use crate::storage::RepositoryContext;
use crate::value::{Object, Value};
use chrono::{DateTime, Utc};
use dorm_codec::Document;
use dorm_storage::{DocumentCursor, Filter, ID_FIELD};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Saves and loads the entities of one type in one collection.
///
/// Every load goes through the session's entity pool: a key that is
/// already pooled is answered from the pool without touching storage, and
/// a freshly decoded entity is pooled before it is returned. Saving fills
/// the fields the schema marks as managed before the entity is written.
pub struct Repository {
    name: String,
    schema: Arc<ObjectSchema>,
    driver: StorageDriver,
    codec: Codec,
    pool: Arc<EntityPool>,
    services: Arc<Services>,
    lazy_references: bool,
}

/// Whether a write may replace an existing document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    Upsert,
    Insert,
}

impl Repository {
    /// Creates the repository persisting `type_name` in `collection`.
    ///
    /// # Errors
    ///
    /// Fails if the type is unknown or has no key field.
    pub fn new(context: &RepositoryContext, collection: &str, type_name: &str) -> CoreResult<Self> {
        let schema = context.schemas().require(type_name)?;
        if !schema.is_entity() {
            return Err(CoreError::invalid_schema(format!(
                "{type_name} has no key field and cannot be stored in {collection}"
            )));
        }
        Ok(Self {
            name: collection.to_string(),
            schema,
            driver: StorageDriver::new(Arc::clone(context.store()), collection),
            codec: context.codec().clone(),
            pool: Arc::clone(context.pool()),
            services: Arc::clone(context.services()),
            lazy_references: context.config().lazy_references,
        })
    }

    /// The collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The persisted type.
    pub fn type_name(&self) -> &str {
        self.schema.name()
    }

    /// The persisted type's schema.
    pub fn schema(&self) -> &Arc<ObjectSchema> {
        &self.schema
    }

    /// The driver of the collection.
    pub fn driver(&self) -> &StorageDriver {
        &self.driver
    }

    /// A fresh, unsaved instance of the persisted type.
    pub fn create(&self) -> EntityHandle {
        EntityHandle::new(Object::new(Arc::clone(&self.schema)))
    }

    /// Fills managed fields, then inserts or replaces the entity.
    ///
    /// A missing key is generated, an empty public reference is generated
    /// (an existing one is never overwritten), an empty created-by field
    /// receives the current user record, created-at is set on first save
    /// and updated-at on every save. The filled values reach the entity only
    /// once the write succeeded; the entity is then pooled under its key and
    /// public reference.
    ///
    /// # Errors
    ///
    /// - [`CoreError::WrongCollection`] if the entity is of another type
    /// - [`CoreError::ServiceUnavailable`] if a needed service is missing
    /// - [`CoreError::DuplicateKey`] if a unique field is taken
    pub fn save(&self, entity: &EntityHandle) -> CoreResult<()> {
        self.write(entity, WriteMode::Upsert)
    }

    /// Like [`Repository::save`], but never replaces an existing document.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::DuplicateKey`] if the key or a unique field
    /// is already taken; the stored document and the entity are left as
    /// they were.
    pub fn insert(&self, entity: &EntityHandle) -> CoreResult<()> {
        self.write(entity, WriteMode::Insert)
    }

    fn write(&self, entity: &EntityHandle, mode: WriteMode) -> CoreResult<()> {
        let type_name = entity.type_name();
        if type_name != self.schema.name() {
            return Err(CoreError::WrongCollection {
                type_name,
                collection: self.name.clone(),
            });
        }

        let (document, assigned) = {
            let mut staged = entity.read().clone();
            let assigned = self.fill_managed_fields(&mut staged)?;
            (self.codec.encode_object(&staged)?, assigned)
        };
        let outcome = match mode {
            WriteMode::Upsert => Some(self.driver.save(&document)?),
            WriteMode::Insert => {
                self.driver.insert(&document)?;
                None
            }
        };
        {
            let mut object = entity.write();
            for (field, value) in assigned {
                object.set(&field, value)?;
            }
        }
        debug!(collection = %self.name, key = ?entity.key(), ?mode, ?outcome, "wrote entity");
        self.register(entity);
        Ok(())
    }

    /// Fills the managed fields of `object`, returning what was assigned.
    fn fill_managed_fields(&self, object: &mut Object) -> CoreResult<Vec<(String, Value)>> {
        let schema = Arc::clone(&self.schema);
        let now = if schema.created_at().is_some() || schema.updated_at().is_some() {
            Some(truncate_to_millis(self.services.clock()?.now()))
        } else {
            None
        };

        let mut assigned = Vec::new();
        let mut assign = |object: &mut Object, field: &str, value: Value| -> CoreResult<()> {
            object.set(field, value.clone())?;
            assigned.push((field.to_string(), value));
            Ok(())
        };

        if object.key().is_none() {
            if let Some(identity) = schema.identity() {
                let key = self.services.key_generator()?.generate_key();
                assign(object, identity.name(), key.to_value())?;
            }
        }
        if let Some(field) = schema.public_reference() {
            if object.public_reference().is_none() {
                if let Some(reference) = self.services.reference_generator()?.create(object) {
                    assign(object, &field.field, Value::from(reference))?;
                }
            }
        }
        if let Some(field) = schema.created_by() {
            if object.get(field).map_or(true, is_empty) {
                let record = self.services.user_records()?.user_record();
                assign(object, field, record.to_value())?;
            }
        }
        if let (Some(field), Some(now)) = (schema.created_at(), now) {
            if object.get(field).map_or(true, Value::is_null) {
                assign(object, field, Value::Date(now))?;
            }
        }
        if let (Some(field), Some(now)) = (schema.updated_at(), now) {
            assign(object, field, Value::Date(now))?;
        }
        Ok(assigned)
    }

    /// Makes `entity` the pooled instance for its key and reference.
    ///
    /// An instance previously pooled under the same key loses its reference
    /// entry, and so does an earlier reference of `entity` itself.
    fn register(&self, entity: &EntityHandle) {
        let type_name = self.schema.name();
        let reference_field = self.schema.public_reference().map(|f| f.field.as_str());
        let (key, reference) = {
            let object = entity.read();
            (object.key(), object.public_reference().map(EntityKey::from))
        };

        if let Some(key) = key {
            let previous = self.pool.replace(type_name, PRIMARY_ID, key, entity.clone());
            if let (Some(previous), Some(field)) = (previous, reference_field) {
                if !previous.ptr_eq(entity) {
                    self.pool.evict(type_name, field, &previous);
                }
            }
        }
        if let Some(field) = reference_field {
            self.pool.evict(type_name, field, entity);
            if let Some(reference) = reference {
                self.pool.replace(type_name, field, reference, entity.clone());
            }
        }
    }

    /// Looks an entity up by key, pool first.
    ///
    /// # Errors
    ///
    /// Propagates storage and decoding failures.
    pub fn find_by_id(&self, key: impl Into<EntityKey>) -> CoreResult<Option<EntityHandle>> {
        let key = key.into();
        if let Some(pooled) = self.pool.get(self.schema.name(), PRIMARY_ID, &key) {
            debug!(collection = %self.name, %key, "pool hit");
            return Ok(Some(pooled));
        }
        debug!(collection = %self.name, %key, "pool miss");
        self.driver
            .find_one(&Filter::eq(ID_FIELD, key.to_document()))?
            .map(|document| self.decode_and_pool(&document))
            .transpose()
    }

    /// Looks an entity up by public reference, pool first.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::InvalidSchema`] if the type has no public
    /// reference, and propagates storage and decoding failures.
    pub fn find_by_reference(&self, reference: &str) -> CoreResult<Option<EntityHandle>> {
        let field = self.schema.public_reference().ok_or_else(|| {
            CoreError::invalid_schema(format!("{} has no public reference", self.schema.name()))
        })?;
        let key = EntityKey::from(reference);
        if let Some(pooled) = self.pool.get(self.schema.name(), &field.field, &key) {
            debug!(collection = %self.name, %key, "pool hit");
            return Ok(Some(pooled));
        }
        let stored = self
            .schema
            .field(&field.field)
            .map_or(field.field.as_str(), |f| f.stored_name());
        self.driver
            .find_one(&Filter::eq(stored, reference))?
            .map(|document| self.decode_and_pool(&document))
            .transpose()
    }

    /// Streams the entities matching `filter`.
    ///
    /// Each document is decoded and pooled as it is reached, so entities
    /// already pooled come back as the pooled instance.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub fn find(&self, filter: &Filter) -> CoreResult<FindCursor<'_>> {
        let documents = self.driver.find(filter)?;
        Ok(FindCursor {
            repository: self,
            documents,
        })
    }

    /// Counts the documents matching `filter`.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub fn count(&self, filter: &Filter) -> CoreResult<u64> {
        self.driver.count(filter)
    }

    /// Deletes the documents matching `filter`.
    ///
    /// Pooled instances stay pooled; clear the pool to forget them.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub fn remove_all(&self, filter: &Filter) -> CoreResult<u64> {
        let removed = self.driver.remove_all(filter)?;
        debug!(collection = %self.name, removed, "removed documents");
        Ok(removed)
    }

    /// Ensures every index the schema declares. Safe to call repeatedly.
    ///
    /// # Errors
    ///
    /// Fails if an index cannot be built, for example a unique index over
    /// existing duplicates.
    pub fn build_indexes(&self) -> CoreResult<()> {
        for spec in self.schema.index_specs() {
            self.driver.ensure_index(&spec)?;
        }
        Ok(())
    }

    /// Returns the pooled instance for a document, decoding it on a miss.
    fn decode_and_pool(&self, document: &Document) -> CoreResult<EntityHandle> {
        let type_name = self.schema.name();
        let key = document.get(ID_FIELD).and_then(EntityKey::from_document);
        if let Some(key) = &key {
            if let Some(pooled) = self.pool.get(type_name, PRIMARY_ID, key) {
                return Ok(pooled);
            }
        }

        let decoded = EntityHandle::new(self.codec.decode_object(document, &self.schema)?);
        let handle = match key {
            Some(key) => self.pool.put(type_name, PRIMARY_ID, key, decoded.clone()),
            None => decoded.clone(),
        };
        if !handle.ptr_eq(&decoded) {
            // Another load of the same key won the race
            return Ok(handle);
        }

        if let Some(field) = self.schema.public_reference() {
            let reference = handle.read().public_reference().map(EntityKey::from);
            if let Some(reference) = reference {
                self.pool.put(type_name, &field.field, reference, handle.clone());
            }
        }
        if !self.lazy_references {
            // Pooled first so reference cycles close on this instance
            if let Err(err) = resolve_all(&handle) {
                self.pool.evict(type_name, PRIMARY_ID, &handle);
                if let Some(field) = self.schema.public_reference() {
                    self.pool.evict(type_name, &field.field, &handle);
                }
                return Err(err);
            }
        }
        Ok(handle)
    }
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("collection", &self.name)
            .field("type", &self.schema.name())
            .finish()
    }
}

/// A one-pass sequence of entities produced by [`Repository::find`].
///
/// Calling [`Repository::find`] again restarts the query.
pub struct FindCursor<'a> {
    repository: &'a Repository,
    documents: DocumentCursor,
}

impl FindCursor<'_> {
    /// The first entity, dropping the rest of the cursor.
    ///
    /// # Errors
    ///
    /// Propagates the failure of the first element.
    pub fn first(mut self) -> CoreResult<Option<EntityHandle>> {
        self.next().transpose()
    }
}

impl Iterator for FindCursor<'_> {
    type Item = CoreResult<EntityHandle>;

    fn next(&mut self) -> Option<Self::Item> {
        let document = self.documents.next()?;
        let result = document
            .map_err(|e| self.repository.driver.translate(e))
            .and_then(|document| self.repository.decode_and_pool(&document));
        if let Err(err) = &result {
            warn!(collection = %self.repository.name, error = %err, "find yielded an unreadable document");
        }
        Some(result)
    }
}

fn truncate_to_millis(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(at.timestamp_millis()).unwrap_or(at)
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Text(s) => s.is_empty(),
        Value::Map(entries) => entries.is_empty(),
        _ => false,
    }
}

/// Resolves every reference held by an entity, nested ones included.
///
/// Missing targets resolve to absent; any other failure is returned.
fn resolve_all(entity: &EntityHandle) -> CoreResult<()> {
    let mut references = Vec::new();
    {
        let object = entity.read();
        for (_, value) in object.iter() {
            collect_references(value, &mut references);
        }
    }
    // Resolving may load entities that point back at this one, so no lock
    // is held here.
    for reference in references {
        reference.get()?;
    }
    Ok(())
}

fn collect_references(value: &Value, out: &mut Vec<LazyRef>) {
    match value {
        Value::Reference(reference) => out.push(reference.clone()),
        Value::References(collection) => out.extend(collection.refs().cloned()),
        Value::List(items) => {
            for item in items {
                collect_references(item, out);
            }
        }
        Value::Map(entries) => {
            for item in entries.values() {
                collect_references(item, out);
            }
        }
        Value::Object(object) => {
            for (_, item) in object.iter() {
                collect_references(item, out);
            }
        }
        _ => {}
    }
}
