//! Polymorphic field declarations and the discriminator resolver.

use crate::error::{CoreError, CoreResult};
use crate::schema::ObjectSchema;
use std::sync::Arc;

/// A closed set of concrete types selectable by a discriminator field.
///
/// Decoding picks the type whose tag equals the document's discriminator
/// value and falls back to the default type otherwise. The default type is
/// mandatory; [`PolymorphicSchemaBuilder::build`] refuses a declaration
/// without one.
#[derive(Debug, Clone, PartialEq)]
pub struct PolymorphicSchema {
    discriminator: String,
    variants: Vec<(String, String)>,
    default_type: String,
}

impl PolymorphicSchema {
    /// Starts a declaration discriminated by `discriminator`.
    pub fn builder(discriminator: impl Into<String>) -> PolymorphicSchemaBuilder {
        PolymorphicSchemaBuilder {
            discriminator: discriminator.into(),
            variants: Vec::new(),
            default_type: None,
        }
    }

    /// Name of the discriminator field.
    pub fn discriminator(&self) -> &str {
        &self.discriminator
    }

    /// The `(tag, type)` table in declaration order.
    pub fn variants(&self) -> &[(String, String)] {
        &self.variants
    }

    /// The type used when no tag matches.
    pub fn default_type(&self) -> &str {
        &self.default_type
    }

    /// Every type this field may hold, the default type included.
    pub fn member_types(&self) -> impl Iterator<Item = &str> + '_ {
        self.variants
            .iter()
            .map(|(_, type_name)| type_name.as_str())
            .chain(std::iter::once(self.default_type.as_str()))
    }

    /// Returns true if `type_name` may be stored in this field.
    pub fn is_member(&self, type_name: &str) -> bool {
        self.member_types().any(|member| member == type_name)
    }

    /// Chooses the concrete type for a discriminator value.
    pub fn resolve(&self, tag: Option<&str>) -> &str {
        tag.and_then(|tag| {
            self.variants
                .iter()
                .find(|(candidate, _)| candidate == tag)
                .map(|(_, type_name)| type_name.as_str())
        })
        .unwrap_or(self.default_type.as_str())
    }

    /// The discriminator value to write for an instance of `schema`.
    ///
    /// The type's own declared tag wins; otherwise the tag table is searched
    /// by type. A default type without any tag writes no discriminator.
    ///
    /// # Errors
    ///
    /// Fails with a schema mismatch if the type is not a member.
    pub fn tag_for(&self, schema: &ObjectSchema) -> CoreResult<Option<String>> {
        if !self.is_member(schema.name()) {
            return Err(CoreError::schema_mismatch(
                "",
                format!("one of {}", self.member_types().collect::<Vec<_>>().join(", ")),
                schema.name(),
            ));
        }
        if let Some(tag) = schema.tag() {
            return Ok(Some(tag.to_string()));
        }
        Ok(self
            .variants
            .iter()
            .find(|(_, type_name)| type_name == schema.name())
            .map(|(tag, _)| tag.clone()))
    }
}

/// Builder for [`PolymorphicSchema`].
#[derive(Debug, Clone)]
pub struct PolymorphicSchemaBuilder {
    discriminator: String,
    variants: Vec<(String, String)>,
    default_type: Option<String>,
}

impl PolymorphicSchemaBuilder {
    /// Maps a discriminator value to a concrete type.
    #[must_use]
    pub fn variant(mut self, tag: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.variants.push((tag.into(), type_name.into()));
        self
    }

    /// Sets the type used for unknown or missing discriminator values.
    #[must_use]
    pub fn default_type(mut self, type_name: impl Into<String>) -> Self {
        self.default_type = Some(type_name.into());
        self
    }

    /// Validates the declaration.
    ///
    /// # Errors
    ///
    /// - [`CoreError::MissingDefaultType`] without a default type
    /// - [`CoreError::InvalidSchema`] for duplicate tags
    pub fn build(self) -> CoreResult<Arc<PolymorphicSchema>> {
        let default_type = self.default_type.ok_or_else(|| CoreError::MissingDefaultType {
            field: self.discriminator.clone(),
        })?;

        for (i, (tag, _)) in self.variants.iter().enumerate() {
            if self.variants[..i].iter().any(|(earlier, _)| earlier == tag) {
                return Err(CoreError::invalid_schema(format!(
                    "tag '{tag}' is declared twice for discriminator '{}'",
                    self.discriminator
                )));
            }
        }

        Ok(Arc::new(PolymorphicSchema {
            discriminator: self.discriminator,
            variants: self.variants,
            default_type,
        }))
    }
}
