//! Instances of schema-described types.

use crate::entity::EntityKey;
use crate::error::{CoreError, CoreResult};
use crate::reference::LazyRefCollection;
use crate::schema::{FieldKind, FieldSchema, FieldType, ObjectSchema, ReferenceBy};
use crate::value::Value;
use dorm_codec::Document;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// An instance of an object schema: one value per declared field.
///
/// Fields are addressed by name. A fresh object holds empty containers for
/// list and map fields and `Null` everywhere else.
#[derive(Clone)]
pub struct Object {
    schema: Arc<ObjectSchema>,
    values: Vec<Value>,
}

fn initial_value(ty: &FieldType) -> Value {
    match &ty.kind {
        FieldKind::List(_) if ty.reference_element().is_some() => {
            Value::References(LazyRefCollection::new_list())
        }
        FieldKind::Map(_) if ty.reference_element().is_some() => {
            Value::References(LazyRefCollection::new_map())
        }
        FieldKind::List(_) => Value::List(Vec::new()),
        FieldKind::Map(_) => Value::Map(BTreeMap::new()),
        _ => Value::Null,
    }
}

impl Object {
    /// Creates an empty instance.
    pub fn new(schema: Arc<ObjectSchema>) -> Self {
        let values = schema
            .fields()
            .iter()
            .map(|field| initial_value(field.ty()))
            .collect();
        Self { schema, values }
    }

    /// Assembles an instance from values in field order.
    pub(crate) fn from_values(schema: Arc<ObjectSchema>, values: Vec<Value>) -> Self {
        debug_assert_eq!(schema.fields().len(), values.len());
        Self { schema, values }
    }

    /// The instance's schema.
    pub fn schema(&self) -> &Arc<ObjectSchema> {
        &self.schema
    }

    /// The instance's type name.
    pub fn type_name(&self) -> &str {
        self.schema.name()
    }

    /// A field's value, or `None` if the type has no such field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.schema.position(field).map(|i| &self.values[i])
    }

    /// Mutable access to a field's value.
    pub fn get_mut(&mut self, field: &str) -> Option<&mut Value> {
        self.schema.position(field).map(|i| &mut self.values[i])
    }

    /// Assigns a field.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::UnknownField`] if the type has no such field.
    /// The value's shape is checked when the object is encoded, not here.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> CoreResult<()> {
        let position = self
            .schema
            .position(field)
            .ok_or_else(|| CoreError::UnknownField {
                type_name: self.schema.name().to_string(),
                field: field.to_string(),
            })?;
        self.values[position] = value.into();
        Ok(())
    }

    /// Assigns a field, builder style.
    ///
    /// # Errors
    ///
    /// Fails if the type has no such field.
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> CoreResult<Self> {
        self.set(field, value)?;
        Ok(self)
    }

    /// Fields with their values, in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&FieldSchema, &Value)> + '_ {
        self.schema.fields().iter().zip(self.values.iter())
    }

    /// The entity key, if the type has one and it is assigned.
    pub fn key(&self) -> Option<EntityKey> {
        let identity = self.schema.identity()?;
        self.get(identity.name()).and_then(EntityKey::from_value)
    }

    /// The public reference, if the type has one and it is assigned.
    pub fn public_reference(&self) -> Option<&str> {
        let field = &self.schema.public_reference()?.field;
        self.get(field)
            .and_then(Value::as_text)
            .filter(|text| !text.is_empty())
    }

    /// The identifier a reference of kind `by` stores for this instance.
    pub fn reference_key(&self, by: ReferenceBy) -> Option<Document> {
        match by {
            ReferenceBy::Key => self.key().map(|key| key.to_document()),
            ReferenceBy::PublicReference => self.public_reference().map(Document::from),
        }
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.type_name() == other.type_name() && self.values == other.values
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct(self.type_name());
        for (field, value) in self.iter() {
            out.field(field.name(), value);
        }
        out.finish()
    }
}
