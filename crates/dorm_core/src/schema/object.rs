//! Object schemas: named fields plus identity metadata.

use crate::error::{CoreError, CoreResult};
use crate::schema::{FieldKind, FieldSchema, FieldType};
use dorm_storage::{IndexSpec, ID_FIELD};
use std::collections::HashMap;
use std::sync::Arc;

/// The public reference field of an entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicReferenceField {
    /// Name of the field.
    pub field: String,
    /// Whether the reference index enforces uniqueness.
    pub unique: bool,
}

/// The schema of one application type.
///
/// An object schema is an ordered set of fields. Entity types additionally
/// name their key field (always persisted as `_id`) and may flag fields the
/// repository manages on save: a public reference, created-at, updated-at
/// and created-by.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectSchema {
    name: String,
    tag: Option<String>,
    fields: Vec<FieldSchema>,
    positions: HashMap<String, usize>,
    identity: Option<usize>,
    public_reference: Option<PublicReferenceField>,
    created_at: Option<String>,
    updated_at: Option<String>,
    created_by: Option<String>,
    indexes: Vec<IndexSpec>,
}

impl ObjectSchema {
    /// Starts a schema for the named type.
    pub fn builder(name: impl Into<String>) -> ObjectSchemaBuilder {
        ObjectSchemaBuilder {
            name: name.into(),
            tag: None,
            fields: Vec::new(),
            identity: None,
            public_reference: None,
            created_at: None,
            updated_at: None,
            created_by: None,
            indexes: Vec::new(),
        }
    }

    /// The type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The discriminator value this type writes inside polymorphic fields.
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// All fields in declaration order.
    pub fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }

    /// Looks up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.position(name).map(|i| &self.fields[i])
    }

    /// Position of a field in [`ObjectSchema::fields`].
    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    /// The key field, if this is an entity type.
    pub fn identity(&self) -> Option<&FieldSchema> {
        self.identity.map(|i| &self.fields[i])
    }

    /// Returns true if the type has a key field.
    pub fn is_entity(&self) -> bool {
        self.identity.is_some()
    }

    /// The public reference field, if any.
    pub fn public_reference(&self) -> Option<&PublicReferenceField> {
        self.public_reference.as_ref()
    }

    /// The field set once on first save.
    pub fn created_at(&self) -> Option<&str> {
        self.created_at.as_deref()
    }

    /// The field refreshed on every save.
    pub fn updated_at(&self) -> Option<&str> {
        self.updated_at.as_deref()
    }

    /// The field holding the user record of whoever created the entity.
    pub fn created_by(&self) -> Option<&str> {
        self.created_by.as_deref()
    }

    /// Indexes declared on arbitrary fields.
    pub fn indexes(&self) -> &[IndexSpec] {
        &self.indexes
    }

    /// Every index the collection of this type needs.
    ///
    /// The primary key index comes first, then the public reference index
    /// (unique or plain as declared), then the declared indexes.
    pub fn index_specs(&self) -> Vec<IndexSpec> {
        let mut specs = vec![IndexSpec::primary()];
        if let Some(reference) = &self.public_reference {
            let stored = self
                .field(&reference.field)
                .map_or(reference.field.as_str(), FieldSchema::stored_name);
            let spec = IndexSpec::new(stored);
            specs.push(if reference.unique { spec.unique() } else { spec });
        }
        specs.extend(self.indexes.iter().cloned());
        specs
    }
}

/// Builder for [`ObjectSchema`].
#[derive(Debug, Clone)]
pub struct ObjectSchemaBuilder {
    name: String,
    tag: Option<String>,
    fields: Vec<FieldSchema>,
    identity: Option<String>,
    public_reference: Option<PublicReferenceField>,
    created_at: Option<String>,
    updated_at: Option<String>,
    created_by: Option<String>,
    indexes: Vec<IndexSpec>,
}

impl ObjectSchemaBuilder {
    /// Sets the discriminator value for polymorphic fields.
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Adds a field stored under its own name.
    #[must_use]
    pub fn field(self, name: impl Into<String>, ty: FieldType) -> Self {
        self.field_schema(FieldSchema::new(name, ty))
    }

    /// Adds a fully specified field.
    #[must_use]
    pub fn field_schema(mut self, field: FieldSchema) -> Self {
        self.fields.push(field);
        self
    }

    /// Declares the key field. It is added as a string field if not declared.
    #[must_use]
    pub fn identity(mut self, field: impl Into<String>) -> Self {
        self.identity = Some(field.into());
        self
    }

    /// Declares a public reference field backed by a plain index.
    #[must_use]
    pub fn public_reference(mut self, field: impl Into<String>) -> Self {
        self.public_reference = Some(PublicReferenceField {
            field: field.into(),
            unique: false,
        });
        self
    }

    /// Declares a public reference field backed by a unique index.
    #[must_use]
    pub fn unique_public_reference(mut self, field: impl Into<String>) -> Self {
        self.public_reference = Some(PublicReferenceField {
            field: field.into(),
            unique: true,
        });
        self
    }

    /// Declares the created-at timestamp field.
    #[must_use]
    pub fn created_at(mut self, field: impl Into<String>) -> Self {
        self.created_at = Some(field.into());
        self
    }

    /// Declares the updated-at timestamp field.
    #[must_use]
    pub fn updated_at(mut self, field: impl Into<String>) -> Self {
        self.updated_at = Some(field.into());
        self
    }

    /// Declares both timestamp fields.
    #[must_use]
    pub fn timestamped(self, created_at: impl Into<String>, updated_at: impl Into<String>) -> Self {
        self.created_at(created_at).updated_at(updated_at)
    }

    /// Declares the created-by field.
    #[must_use]
    pub fn created_by(mut self, field: impl Into<String>) -> Self {
        self.created_by = Some(field.into());
        self
    }

    /// Declares an index.
    #[must_use]
    pub fn index(mut self, spec: IndexSpec) -> Self {
        self.indexes.push(spec);
        self
    }

    /// Adds an auto-managed field unless it is already declared, in which
    /// case its kind must pass `accepts`.
    fn managed_field(
        &mut self,
        name: &str,
        default: FieldType,
        accepts: fn(&FieldKind) -> bool,
    ) -> CoreResult<()> {
        match self.fields.iter().position(|f| f.name() == name) {
            Some(i) if accepts(&self.fields[i].ty().kind) => Ok(()),
            Some(i) => Err(CoreError::invalid_schema(format!(
                "{}.{name} cannot be managed as {default}, it is declared as {}",
                self.name,
                self.fields[i].ty()
            ))),
            None => {
                self.fields.push(FieldSchema::new(name, default));
                Ok(())
            }
        }
    }

    /// Validates the declaration and freezes it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidSchema`] for duplicate field names or
    /// document keys and for managed fields declared with an unsuitable kind.
    pub fn build(mut self) -> CoreResult<Arc<ObjectSchema>> {
        fn is_text(kind: &FieldKind) -> bool {
            matches!(kind, FieldKind::String)
        }
        fn is_key(kind: &FieldKind) -> bool {
            matches!(kind, FieldKind::String | FieldKind::Integer)
        }
        fn is_date(kind: &FieldKind) -> bool {
            matches!(kind, FieldKind::Date)
        }

        if let Some(identity) = self.identity.clone() {
            self.managed_field(&identity, FieldType::string(), is_key)?;
            for field in &mut self.fields {
                if field.name() == identity {
                    *field = FieldSchema::new(identity.clone(), field.ty().clone()).stored_as(ID_FIELD);
                }
            }
        }
        if let Some(reference) = self.public_reference.clone() {
            self.managed_field(&reference.field, FieldType::string(), is_text)?;
        }
        for timestamp in [self.created_at.clone(), self.updated_at.clone()]
            .into_iter()
            .flatten()
        {
            self.managed_field(&timestamp, FieldType::date(), is_date)?;
        }
        if let Some(created_by) = self.created_by.clone() {
            self.managed_field(&created_by, FieldType::as_is(), |_| true)?;
        }

        let mut positions = HashMap::with_capacity(self.fields.len());
        let mut stored = HashMap::with_capacity(self.fields.len());
        for (i, field) in self.fields.iter().enumerate() {
            if positions.insert(field.name().to_string(), i).is_some() {
                return Err(CoreError::invalid_schema(format!(
                    "{} declares field '{}' twice",
                    self.name,
                    field.name()
                )));
            }
            if let Some(other) = stored.insert(field.stored_name().to_string(), field.name()) {
                return Err(CoreError::invalid_schema(format!(
                    "{}: fields '{other}' and '{}' are both stored as '{}'",
                    self.name,
                    field.name(),
                    field.stored_name()
                )));
            }
        }

        let identity = match &self.identity {
            Some(name) => positions.get(name).copied(),
            None => None,
        };

        Ok(Arc::new(ObjectSchema {
            name: self.name,
            tag: self.tag,
            fields: self.fields,
            positions,
            identity,
            public_reference: self.public_reference,
            created_at: self.created_at,
            updated_at: self.updated_at,
            created_by: self.created_by,
            indexes: self.indexes,
        }))
    }
}
