//! Schema lookup.

use crate::error::{CoreError, CoreResult};
use crate::schema::{FieldKind, ObjectSchema};
use std::collections::HashMap;
use std::sync::Arc;

/// Supplies the schema of a type on demand.
///
/// The codec never derives schemas itself; everything it knows about a
/// type comes through this trait.
pub trait SchemaProvider: Send + Sync {
    /// Returns the schema registered for `type_name`.
    fn schema(&self, type_name: &str) -> Option<Arc<ObjectSchema>>;

    /// Like [`SchemaProvider::schema`] but fails for unknown types.
    fn require(&self, type_name: &str) -> CoreResult<Arc<ObjectSchema>> {
        self.schema(type_name)
            .ok_or_else(|| CoreError::unknown_type(type_name))
    }
}

/// An immutable, validated set of object schemas.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, Arc<ObjectSchema>>,
}

impl SchemaRegistry {
    /// Starts an empty registry.
    pub fn builder() -> SchemaRegistryBuilder {
        SchemaRegistryBuilder {
            schemas: Vec::new(),
        }
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Returns true if no types are registered.
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Registered type names, sorted.
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.schemas.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl SchemaProvider for SchemaRegistry {
    fn schema(&self, type_name: &str) -> Option<Arc<ObjectSchema>> {
        self.schemas.get(type_name).cloned()
    }
}

/// Builder for [`SchemaRegistry`].
#[derive(Debug, Clone)]
pub struct SchemaRegistryBuilder {
    schemas: Vec<Arc<ObjectSchema>>,
}

impl SchemaRegistryBuilder {
    /// Adds a schema.
    #[must_use]
    pub fn register(mut self, schema: Arc<ObjectSchema>) -> Self {
        self.schemas.push(schema);
        self
    }

    /// Validates that every type named by a field is registered.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidSchema`] if a type is registered twice
    /// - [`CoreError::UnknownType`] for a dangling object, polymorphic or
    ///   reference target
    /// - [`CoreError::InvalidSchema`] if a reference targets a type without a key
    pub fn build(self) -> CoreResult<SchemaRegistry> {
        let mut schemas = HashMap::with_capacity(self.schemas.len());
        for schema in self.schemas {
            let name = schema.name().to_string();
            if schemas.insert(name.clone(), schema).is_some() {
                return Err(CoreError::invalid_schema(format!(
                    "type {name} is registered twice"
                )));
            }
        }

        for schema in schemas.values() {
            for field in schema.fields() {
                let mut missing = None;
                field.ty().referenced_types(&mut |type_name| {
                    if missing.is_none() && !schemas.contains_key(type_name) {
                        missing = Some(type_name.to_string());
                    }
                });
                if let Some(type_name) = missing {
                    return Err(CoreError::unknown_type(type_name));
                }
            }
            for field in schema.fields() {
                let target = match &field.ty().kind {
                    FieldKind::Reference(reference) => Some(&reference.target),
                    _ => field.ty().reference_element().map(|r| &r.target),
                };
                if let Some(target) = target {
                    if schemas.get(target).is_some_and(|t| !t.is_entity()) {
                        return Err(CoreError::invalid_schema(format!(
                            "{}.{} references {target}, which has no key field",
                            schema.name(),
                            field.name()
                        )));
                    }
                }
            }
        }

        Ok(SchemaRegistry { schemas })
    }
}
