//! Field and object schemas.
//!
//! Schemas are immutable descriptions of how application objects map to
//! documents. They are built once per type, validated up front, and shared
//! read-only through `Arc` by every codec call.

mod object;
mod polymorphic;
mod registry;

pub use object::{ObjectSchema, ObjectSchemaBuilder, PublicReferenceField};
pub use polymorphic::{PolymorphicSchema, PolymorphicSchemaBuilder};
pub use registry::{SchemaProvider, SchemaRegistry, SchemaRegistryBuilder};

use std::fmt;
use std::sync::Arc;

/// Which identifier of the target a reference stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReferenceBy {
    /// The target's primary key.
    #[default]
    Key,
    /// The target's public reference.
    PublicReference,
}

/// A reference to an entity persisted in another collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceSchema {
    /// Type of the referenced entity.
    pub target: String,
    /// Which identifier is stored.
    pub by: ReferenceBy,
}

/// The codec kind of a field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// UTF-8 text.
    String,
    /// Boolean.
    Bool,
    /// 64-bit signed integer.
    Integer,
    /// Double precision floating point; integer documents are accepted.
    Decimal,
    /// Passed through verbatim, never validated.
    AsIs,
    /// A UTC timestamp with millisecond precision.
    Date,
    /// A timestamp together with its UTC offset.
    LocalDate,
    /// An embedded object of the named type.
    Object(String),
    /// An ordered list of elements.
    List(Box<FieldType>),
    /// A string-keyed map of elements.
    Map(Box<FieldType>),
    /// An embedded object whose concrete type is chosen by a discriminator.
    Polymorphic(Arc<PolymorphicSchema>),
    /// A pointer to an entity in another collection.
    Reference(ReferenceSchema),
}

/// The type of a field: its kind plus nullability.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldType {
    /// What the field holds.
    pub kind: FieldKind,
    /// Whether `null` is an acceptable value. Defaults to `true`.
    pub nullable: bool,
}

impl FieldType {
    /// Creates a nullable field type of the given kind.
    pub fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            nullable: true,
        }
    }

    /// Text.
    pub fn string() -> Self {
        Self::new(FieldKind::String)
    }

    /// Boolean.
    pub fn bool() -> Self {
        Self::new(FieldKind::Bool)
    }

    /// Integer.
    pub fn integer() -> Self {
        Self::new(FieldKind::Integer)
    }

    /// Decimal.
    pub fn decimal() -> Self {
        Self::new(FieldKind::Decimal)
    }

    /// Raw pass-through.
    pub fn as_is() -> Self {
        Self::new(FieldKind::AsIs)
    }

    /// UTC date.
    pub fn date() -> Self {
        Self::new(FieldKind::Date)
    }

    /// Date with offset.
    pub fn local_date() -> Self {
        Self::new(FieldKind::LocalDate)
    }

    /// Embedded object of the named type.
    pub fn object(type_name: impl Into<String>) -> Self {
        Self::new(FieldKind::Object(type_name.into()))
    }

    /// List of `element`.
    pub fn list(element: FieldType) -> Self {
        Self::new(FieldKind::List(Box::new(element)))
    }

    /// Map of `element`.
    pub fn map(element: FieldType) -> Self {
        Self::new(FieldKind::Map(Box::new(element)))
    }

    /// Polymorphic embedded object.
    pub fn polymorphic(schema: Arc<PolymorphicSchema>) -> Self {
        Self::new(FieldKind::Polymorphic(schema))
    }

    /// Reference to an entity by its key.
    pub fn reference(target: impl Into<String>) -> Self {
        Self::reference_by(target, ReferenceBy::Key)
    }

    /// Reference to an entity by the given identifier.
    pub fn reference_by(target: impl Into<String>, by: ReferenceBy) -> Self {
        Self::new(FieldKind::Reference(ReferenceSchema {
            target: target.into(),
            by,
        }))
    }

    /// Disallows `null`.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Returns true for list and map kinds.
    pub fn is_container(&self) -> bool {
        matches!(self.kind, FieldKind::List(_) | FieldKind::Map(_))
    }

    /// Returns the reference schema if this is a list or map of references.
    pub fn reference_element(&self) -> Option<&ReferenceSchema> {
        match &self.kind {
            FieldKind::List(element) | FieldKind::Map(element) => match &element.kind {
                FieldKind::Reference(reference) => Some(reference),
                _ => None,
            },
            _ => None,
        }
    }

    /// Calls `visit` with every type name this field type depends on.
    pub(crate) fn referenced_types<'a>(&'a self, visit: &mut dyn FnMut(&'a str)) {
        match &self.kind {
            FieldKind::Object(name) => visit(name),
            FieldKind::Reference(reference) => visit(&reference.target),
            FieldKind::List(element) | FieldKind::Map(element) => element.referenced_types(visit),
            FieldKind::Polymorphic(poly) => {
                for type_name in poly.member_types() {
                    visit(type_name);
                }
            }
            _ => {}
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            FieldKind::String => write!(f, "string"),
            FieldKind::Bool => write!(f, "bool"),
            FieldKind::Integer => write!(f, "integer"),
            FieldKind::Decimal => write!(f, "decimal"),
            FieldKind::AsIs => write!(f, "as-is"),
            FieldKind::Date => write!(f, "date"),
            FieldKind::LocalDate => write!(f, "local date"),
            FieldKind::Object(name) => write!(f, "object {name}"),
            FieldKind::List(element) => write!(f, "list of {element}"),
            FieldKind::Map(element) => write!(f, "map of {element}"),
            FieldKind::Polymorphic(poly) => {
                write!(f, "polymorphic object by '{}'", poly.discriminator())
            }
            FieldKind::Reference(reference) => write!(f, "reference to {}", reference.target),
        }
    }
}

/// A named field of an object schema.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSchema {
    name: String,
    stored_as: Option<String>,
    ty: FieldType,
}

impl FieldSchema {
    /// Creates a field stored under its own name.
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            stored_as: None,
            ty,
        }
    }

    /// Stores the field under a different document key.
    #[must_use]
    pub fn stored_as(mut self, key: impl Into<String>) -> Self {
        self.stored_as = Some(key.into());
        self
    }

    /// The field's name on the object.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The document key the field is persisted under.
    pub fn stored_name(&self) -> &str {
        self.stored_as.as_deref().unwrap_or(&self.name)
    }

    /// The field's type.
    pub fn ty(&self) -> &FieldType {
        &self.ty
    }
}
