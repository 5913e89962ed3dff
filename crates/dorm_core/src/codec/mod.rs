//! The schema-driven codec engine.
//!
//! [`Codec`] converts [`Value`]s to [`Document`]s and back, one field type
//! at a time. It is recursive over the field type, so containers nest to
//! any depth, and it never performs I/O: reference fields store only the
//! target's identifier and decode to unresolved [`LazyRef`]s.
//!
//! ## Field kinds
//!
//! | Kind          | Document form                                  |
//! |---------------|------------------------------------------------|
//! | string        | text                                           |
//! | bool          | bool                                           |
//! | integer       | integer                                        |
//! | decimal       | float (integers accepted on decode)            |
//! | as-is         | anything, verbatim                             |
//! | date          | date, millisecond precision                    |
//! | local date    | `{ date: <date>, tz: "+hh:mm" }`               |
//! | object        | map of the target schema's stored field names  |
//! | polymorphic   | object map plus the discriminator              |
//! | list / map    | array / map of the element kind                |
//! | reference     | the target's key or public reference           |

mod scalar;

use crate::error::{CoreError, CoreResult};
use crate::reference::{LazyRef, LazyRefCollection, ReferenceLoader};
use crate::schema::{
    FieldKind, FieldType, ObjectSchema, PolymorphicSchema, ReferenceSchema, SchemaProvider,
};
use crate::value::{Object, Value};
use dorm_codec::Document;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

/// Converts values to documents and back according to field types.
///
/// The codec is stateless between calls. It consults the schema provider
/// for object and polymorphic fields and hands its reference loader to
/// every lazy reference it decodes.
#[derive(Clone)]
pub struct Codec {
    schemas: Arc<dyn SchemaProvider>,
    loader: Option<Arc<dyn ReferenceLoader>>,
}

fn mismatch(ty: &FieldType, found: &str) -> CoreError {
    CoreError::schema_mismatch("", ty.to_string(), found)
}

fn index_segment(i: usize) -> String {
    format!("[{i}]")
}

impl Codec {
    /// Creates a codec whose decoded references cannot be resolved.
    pub fn new(schemas: Arc<dyn SchemaProvider>) -> Self {
        Self {
            schemas,
            loader: None,
        }
    }

    /// Binds decoded references to a loader.
    #[must_use]
    pub fn with_loader(mut self, loader: Arc<dyn ReferenceLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// The schema provider.
    pub fn schemas(&self) -> &Arc<dyn SchemaProvider> {
        &self.schemas
    }

    /// Encodes an object to a map of its stored field names.
    ///
    /// # Errors
    ///
    /// Fails with a schema mismatch naming the offending field path.
    pub fn encode_object(&self, object: &Object) -> CoreResult<Document> {
        let mut pairs = Vec::with_capacity(object.schema().fields().len());
        for (field, value) in object.iter() {
            let document = self
                .encode(value, field.ty())
                .map_err(|e| e.at(field.name()))?;
            pairs.push((field.stored_name().to_string(), document));
        }
        Ok(Document::map(pairs))
    }

    /// Decodes a map into an instance of `schema`.
    ///
    /// Document keys the schema does not declare are ignored; declared
    /// fields missing from the document decode as if they were `null`.
    ///
    /// # Errors
    ///
    /// Fails with a schema mismatch if the document is not a map or a field
    /// cannot be decoded.
    pub fn decode_object(&self, document: &Document, schema: &Arc<ObjectSchema>) -> CoreResult<Object> {
        if !matches!(document, Document::Map(_)) {
            return Err(CoreError::schema_mismatch(
                "",
                format!("object {}", schema.name()),
                document.type_name(),
            ));
        }
        let mut values = Vec::with_capacity(schema.fields().len());
        for field in schema.fields() {
            let stored = document.get(field.stored_name()).unwrap_or(&Document::Null);
            values.push(self.decode(stored, field.ty()).map_err(|e| e.at(field.name()))?);
        }
        Ok(Object::from_values(Arc::clone(schema), values))
    }

    /// Encodes a value of the given field type.
    ///
    /// `null` list and map values encode as empty containers.
    ///
    /// # Errors
    ///
    /// Fails with a schema mismatch if the value does not have the shape
    /// the field type requires.
    pub fn encode(&self, value: &Value, ty: &FieldType) -> CoreResult<Document> {
        if let Some(reference) = ty.reference_element() {
            return self.encode_references(value, ty, reference);
        }

        match (&ty.kind, value) {
            (FieldKind::AsIs, value) => scalar::raw_to_document(value),
            (FieldKind::List(_), Value::Null) => Ok(Document::Array(Vec::new())),
            (FieldKind::Map(_), Value::Null) => Ok(Document::empty_map()),
            (_, Value::Null) if ty.nullable => Ok(Document::Null),
            (FieldKind::String, Value::Text(s)) => Ok(Document::Text(s.clone())),
            (FieldKind::Bool, Value::Bool(b)) => Ok(Document::Bool(*b)),
            (FieldKind::Integer, Value::Integer(n)) => Ok(Document::Integer(*n)),
            (FieldKind::Decimal, Value::Decimal(x)) => Ok(Document::Float(*x)),
            (FieldKind::Decimal, Value::Integer(n)) => Ok(Document::Float(scalar::widen(*n))),
            (FieldKind::Date, Value::Date(at)) => Ok(Document::date(*at)),
            (FieldKind::LocalDate, Value::LocalDate(at)) => Ok(scalar::local_date_to_document(at)),
            (FieldKind::Object(type_name), Value::Object(object)) => {
                if object.type_name() != type_name {
                    return Err(mismatch(ty, &format!("object {}", object.type_name())));
                }
                self.encode_object(object)
            }
            (FieldKind::Polymorphic(poly), Value::Object(object)) => {
                self.encode_polymorphic(object, poly)
            }
            (FieldKind::List(element), Value::List(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    out.push(self.encode(item, element).map_err(|e| e.at(&index_segment(i)))?);
                }
                Ok(Document::Array(out))
            }
            (FieldKind::Map(element), Value::Map(entries)) => {
                let mut out = Vec::with_capacity(entries.len());
                for (key, item) in entries {
                    out.push((key.clone(), self.encode(item, element).map_err(|e| e.at(key))?));
                }
                Ok(Document::map(out))
            }
            (FieldKind::Reference(reference), Value::Reference(lazy)) => {
                if lazy.target() != reference.target {
                    return Err(mismatch(ty, &format!("reference to {}", lazy.target())));
                }
                match lazy.key_for(reference.by) {
                    Some(key) => Ok(key),
                    None => {
                        warn!(target_type = %reference.target, "referenced entity has no identifier yet, storing null");
                        if ty.nullable {
                            Ok(Document::Null)
                        } else {
                            Err(mismatch(ty, "reference without identifier"))
                        }
                    }
                }
            }
            (_, value) => Err(mismatch(ty, value.type_name())),
        }
    }

    fn encode_polymorphic(&self, object: &Object, poly: &PolymorphicSchema) -> CoreResult<Document> {
        let tag = poly.tag_for(object.schema())?;
        let mut document = self.encode_object(object)?;
        if let Some(tag) = tag {
            document.insert(poly.discriminator(), Document::Text(tag));
        }
        Ok(document)
    }

    /// Encodes a list or map of references, dropping `null` entries and
    /// targets that have no identifier.
    fn encode_references(
        &self,
        value: &Value,
        ty: &FieldType,
        reference: &ReferenceSchema,
    ) -> CoreResult<Document> {
        let is_list = matches!(ty.kind, FieldKind::List(_));
        let key_of = |item: &Value, segment: &str| -> CoreResult<Option<Document>> {
            match item {
                Value::Null => Ok(None),
                Value::Reference(lazy) => self.reference_element_key(lazy, reference).map_err(|e| e.at(segment)),
                other => Err(CoreError::schema_mismatch(
                    segment,
                    format!("reference to {}", reference.target),
                    other.type_name(),
                )),
            }
        };

        match (is_list, value) {
            (true, Value::Null) => Ok(Document::Array(Vec::new())),
            (false, Value::Null) => Ok(Document::empty_map()),
            (true, Value::References(LazyRefCollection::List(refs))) => {
                let mut out = Vec::with_capacity(refs.len());
                for (i, lazy) in refs.iter().enumerate() {
                    let key = self
                        .reference_element_key(lazy, reference)
                        .map_err(|e| e.at(&index_segment(i)))?;
                    out.extend(key);
                }
                Ok(Document::Array(out))
            }
            (false, Value::References(LazyRefCollection::Map(refs))) => {
                let mut out = Vec::with_capacity(refs.len());
                for (key, lazy) in refs {
                    if let Some(doc) = self.reference_element_key(lazy, reference).map_err(|e| e.at(key))? {
                        out.push((key.clone(), doc));
                    }
                }
                Ok(Document::map(out))
            }
            (true, Value::List(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    out.extend(key_of(item, &index_segment(i))?);
                }
                Ok(Document::Array(out))
            }
            (false, Value::Map(entries)) => {
                let mut out = Vec::with_capacity(entries.len());
                for (key, item) in entries {
                    if let Some(doc) = key_of(item, key)? {
                        out.push((key.clone(), doc));
                    }
                }
                Ok(Document::map(out))
            }
            (_, value) => Err(mismatch(ty, value.type_name())),
        }
    }

    fn reference_element_key(
        &self,
        lazy: &LazyRef,
        reference: &ReferenceSchema,
    ) -> CoreResult<Option<Document>> {
        if lazy.target() != reference.target {
            return Err(CoreError::schema_mismatch(
                "",
                format!("reference to {}", reference.target),
                format!("reference to {}", lazy.target()),
            ));
        }
        let key = lazy.key_for(reference.by);
        if key.is_none() {
            warn!(target_type = %reference.target, "dropping reference to an entity without identifier");
        }
        Ok(key)
    }

    /// Decodes a document of the given field type.
    ///
    /// A `null` document decodes to an empty container for list and map
    /// kinds and to `Value::Null` for nullable kinds.
    ///
    /// # Errors
    ///
    /// Fails with a schema mismatch if the document does not have the shape
    /// the field type requires, and with [`CoreError::UnknownType`] if an
    /// object type is not known to the schema provider.
    pub fn decode(&self, document: &Document, ty: &FieldType) -> CoreResult<Value> {
        if let Some(reference) = ty.reference_element() {
            return self.decode_references(document, ty, reference);
        }

        match (&ty.kind, document) {
            (FieldKind::AsIs, document) => Ok(scalar::document_to_raw(document)),
            (FieldKind::List(_), Document::Null) => Ok(Value::List(Vec::new())),
            (FieldKind::Map(_), Document::Null) => Ok(Value::Map(BTreeMap::new())),
            (_, Document::Null) if ty.nullable => Ok(Value::Null),
            (FieldKind::String, Document::Text(s)) => Ok(Value::Text(s.clone())),
            (FieldKind::Bool, Document::Bool(b)) => Ok(Value::Bool(*b)),
            (FieldKind::Integer, Document::Integer(n)) => Ok(Value::Integer(*n)),
            (FieldKind::Decimal, Document::Float(x)) => Ok(Value::Decimal(*x)),
            (FieldKind::Decimal, Document::Integer(n)) => Ok(Value::Decimal(scalar::widen(*n))),
            (FieldKind::Date, Document::Date(at)) => Ok(Value::Date(*at)),
            (FieldKind::LocalDate, document) => scalar::document_to_local_date(document)
                .map(Value::LocalDate)
                .ok_or_else(|| mismatch(ty, document.type_name())),
            (FieldKind::Object(type_name), Document::Map(_)) => {
                let schema = self.schemas.require(type_name)?;
                self.decode_object(document, &schema).map(Value::Object)
            }
            (FieldKind::Polymorphic(poly), Document::Map(_)) => {
                let tag = document.get(poly.discriminator()).and_then(Document::as_text);
                let schema = self.schemas.require(poly.resolve(tag))?;
                self.decode_object(document, &schema).map(Value::Object)
            }
            (FieldKind::List(element), Document::Array(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    out.push(self.decode(item, element).map_err(|e| e.at(&index_segment(i)))?);
                }
                Ok(Value::List(out))
            }
            (FieldKind::Map(element), Document::Map(pairs)) => {
                let mut out = BTreeMap::new();
                for (key, item) in pairs {
                    out.insert(key.clone(), self.decode(item, element).map_err(|e| e.at(key))?);
                }
                Ok(Value::Map(out))
            }
            (FieldKind::Reference(reference), Document::Text(_) | Document::Integer(_)) => {
                Ok(Value::Reference(self.pending(reference, document)))
            }
            (_, document) => Err(mismatch(ty, document.type_name())),
        }
    }

    fn decode_references(
        &self,
        document: &Document,
        ty: &FieldType,
        reference: &ReferenceSchema,
    ) -> CoreResult<Value> {
        let is_key = |doc: &Document| matches!(doc, Document::Text(_) | Document::Integer(_));
        let element_mismatch = |segment: &str, doc: &Document| {
            CoreError::schema_mismatch(
                segment,
                format!("reference to {}", reference.target),
                doc.type_name(),
            )
        };

        let collection = match (&ty.kind, document) {
            (FieldKind::List(_), Document::Null) => LazyRefCollection::new_list(),
            (FieldKind::Map(_), Document::Null) => LazyRefCollection::new_map(),
            (FieldKind::List(_), Document::Array(items)) => {
                let mut refs = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    match item {
                        Document::Null => {}
                        key if is_key(key) => refs.push(self.pending(reference, key)),
                        other => return Err(element_mismatch(&index_segment(i), other)),
                    }
                }
                LazyRefCollection::List(refs)
            }
            (FieldKind::Map(_), Document::Map(pairs)) => {
                let mut refs = BTreeMap::new();
                for (key, item) in pairs {
                    match item {
                        Document::Null => {}
                        doc if is_key(doc) => {
                            refs.insert(key.clone(), self.pending(reference, doc));
                        }
                        other => return Err(element_mismatch(key, other)),
                    }
                }
                LazyRefCollection::Map(refs)
            }
            (_, document) => return Err(mismatch(ty, document.type_name())),
        };
        Ok(Value::References(collection))
    }

    fn pending(&self, reference: &ReferenceSchema, key: &Document) -> LazyRef {
        LazyRef::pending(
            reference.target.clone(),
            reference.by,
            key.clone(),
            self.loader.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityHandle;
    use crate::schema::{ReferenceBy, SchemaRegistry};
    use chrono::{FixedOffset, TimeZone, Utc};
    use parking_lot::Mutex;
    use proptest::prelude::*;

    fn poly() -> Arc<PolymorphicSchema> {
        PolymorphicSchema::builder("type")
            .variant("a", "PolyChildA")
            .variant("b", "PolyChildB")
            .default_type("PolyChildC")
            .build()
            .unwrap()
    }

    fn poly_child(name: &str, tag: Option<&str>, prop: &str) -> Arc<ObjectSchema> {
        let mut builder = ObjectSchema::builder(name)
            .field("common", FieldType::string())
            .field(prop, FieldType::string());
        if let Some(tag) = tag {
            builder = builder.tag(tag);
        }
        builder.build().unwrap()
    }

    fn registry() -> Arc<SchemaRegistry> {
        let leaf = ObjectSchema::builder("Leaf")
            .field("name", FieldType::string())
            .field("n", FieldType::integer())
            .build()
            .unwrap();
        let child = ObjectSchema::builder("Child")
            .identity("id")
            .public_reference("reference")
            .field("name", FieldType::string())
            .build()
            .unwrap();
        let holder = ObjectSchema::builder("Holder")
            .identity("id")
            .field("count", FieldType::integer().required())
            .field("leaf", FieldType::object("Leaf"))
            .field("shapes", FieldType::list(FieldType::polymorphic(poly())))
            .field("child", FieldType::reference("Child"))
            .field(
                "byReference",
                FieldType::reference_by("Child", ReferenceBy::PublicReference),
            )
            .field("children", FieldType::list(FieldType::reference("Child")))
            .field("named", FieldType::map(FieldType::reference("Child")))
            .field(
                "nested",
                FieldType::list(FieldType::map(FieldType::reference("Child"))),
            )
            .build()
            .unwrap();
        Arc::new(
            SchemaRegistry::builder()
                .register(leaf)
                .register(child)
                .register(holder)
                .register(poly_child("PolyChildA", None, "propOnA"))
                .register(poly_child("PolyChildB", Some("b"), "propOnB"))
                .register(poly_child("PolyChildC", None, "propOnC"))
                .build()
                .unwrap(),
        )
    }

    fn codec() -> (Codec, Arc<SchemaRegistry>) {
        let schemas = registry();
        (Codec::new(schemas.clone()), schemas)
    }

    fn child(schemas: &SchemaRegistry, id: &str) -> EntityHandle {
        let object = Object::new(schemas.require("Child").unwrap())
            .with("id", id)
            .unwrap()
            .with("reference", format!("Child@{id}"))
            .unwrap();
        EntityHandle::new(object)
    }

    /// Answers from a fixed set of entities.
    struct FixedLoader(Vec<EntityHandle>, Mutex<usize>);

    impl ReferenceLoader for FixedLoader {
        fn load_reference(
            &self,
            _target: &str,
            by: ReferenceBy,
            key: &Document,
        ) -> CoreResult<Option<EntityHandle>> {
            *self.1.lock() += 1;
            Ok(self
                .0
                .iter()
                .find(|h| h.read().reference_key(by).as_ref() == Some(key))
                .cloned())
        }
    }

    #[test]
    fn scalars_are_strict() {
        let (codec, _) = codec();
        assert_eq!(
            codec.encode(&Value::from("x"), &FieldType::string()).unwrap(),
            Document::from("x")
        );
        let err = codec.decode(&Document::from(1i64), &FieldType::string()).unwrap_err();
        assert!(matches!(err, CoreError::SchemaMismatch { ref expected, ref found, .. }
            if expected == "string" && found == "integer"));
        assert!(codec.decode(&Document::from("1"), &FieldType::integer()).is_err());
        assert!(codec.encode(&Value::Decimal(1.0), &FieldType::integer()).is_err());
    }

    #[test]
    fn decimals_accept_integers() {
        let (codec, _) = codec();
        assert_eq!(
            codec.decode(&Document::from(3i64), &FieldType::decimal()).unwrap(),
            Value::Decimal(3.0)
        );
        assert_eq!(
            codec.encode(&Value::Integer(3), &FieldType::decimal()).unwrap(),
            Document::Float(3.0)
        );
    }

    #[test]
    fn nulls_follow_nullability() {
        let (codec, _) = codec();
        assert_eq!(codec.decode(&Document::Null, &FieldType::string()).unwrap(), Value::Null);
        assert!(codec.decode(&Document::Null, &FieldType::string().required()).is_err());
        assert!(codec.encode(&Value::Null, &FieldType::integer().required()).is_err());
        assert_eq!(
            codec.decode(&Document::Null, &FieldType::list(FieldType::integer())).unwrap(),
            Value::List(Vec::new())
        );
        assert_eq!(
            codec.encode(&Value::Null, &FieldType::map(FieldType::integer())).unwrap(),
            Document::empty_map()
        );
    }

    #[test]
    fn dates_truncate_to_millis() {
        let (codec, _) = codec();
        let at = Utc.timestamp_opt(1_600_000_000, 123_456_789).unwrap();
        let doc = codec.encode(&Value::Date(at), &FieldType::date()).unwrap();
        let back = codec.decode(&doc, &FieldType::date()).unwrap();
        assert_eq!(back.as_date().unwrap().timestamp_subsec_millis(), 123);
        assert_eq!(back.as_date().unwrap().timestamp_subsec_nanos(), 123_000_000);
    }

    #[test]
    fn local_dates_keep_the_offset() {
        let (codec, _) = codec();
        let at = FixedOffset::east_opt(2 * 3600)
            .unwrap()
            .with_ymd_and_hms(2020, 5, 6, 7, 8, 9)
            .unwrap();
        let doc = codec.encode(&Value::LocalDate(at), &FieldType::local_date()).unwrap();
        assert_eq!(doc.get("tz"), Some(&Document::from("+02:00")));
        assert_eq!(
            codec.decode(&doc, &FieldType::local_date()).unwrap(),
            Value::LocalDate(at)
        );
    }

    #[test]
    fn as_is_round_trips_structure() {
        let (codec, _) = codec();
        let doc = Document::map(vec![
            ("a".to_string(), Document::from(vec![1i64, 2])),
            ("b".to_string(), Document::Float(0.25)),
        ]);
        let value = codec.decode(&doc, &FieldType::as_is()).unwrap();
        assert_eq!(codec.encode(&value, &FieldType::as_is()).unwrap(), doc);
    }

    #[test]
    fn objects_use_stored_names_and_ignore_unknown_keys() {
        let (codec, schemas) = codec();
        let holder = schemas.require("Holder").unwrap();
        let doc = Document::map(vec![
            ("_id".to_string(), Document::from("H1")),
            ("count".to_string(), Document::from(2i64)),
            ("stray".to_string(), Document::from(true)),
        ]);
        let object = codec.decode_object(&doc, &holder).unwrap();
        assert_eq!(object.get("id"), Some(&Value::from("H1")));
        assert_eq!(object.get("leaf"), Some(&Value::Null));
        assert_eq!(object.get("shapes"), Some(&Value::List(Vec::new())));

        let encoded = codec.encode_object(&object).unwrap();
        assert_eq!(encoded.get("_id"), Some(&Document::from("H1")));
        assert!(encoded.get("stray").is_none());
        assert!(encoded.get("id").is_none());
    }

    #[test]
    fn errors_carry_the_field_path() {
        let (codec, schemas) = codec();
        let holder = schemas.require("Holder").unwrap();
        let doc = Document::map(vec![
            ("count".to_string(), Document::from(1i64)),
            (
                "shapes".to_string(),
                Document::Array(vec![
                    Document::map(vec![("type".to_string(), Document::from("a"))]),
                    Document::map(vec![("common".to_string(), Document::from(5i64))]),
                ]),
            ),
        ]);
        let err = codec.decode_object(&doc, &holder).unwrap_err();
        assert!(
            matches!(err, CoreError::SchemaMismatch { ref path, .. } if path == "shapes[1].common"),
            "{err}"
        );

        let missing = Document::map(Vec::new());
        let err = codec.decode_object(&missing, &holder).unwrap_err();
        assert!(matches!(err, CoreError::SchemaMismatch { ref path, .. } if path == "count"));
    }

    #[test]
    fn polymorphic_lists_keep_concrete_types() {
        let (codec, schemas) = codec();
        let shape = |name: &str, prop: &str, common: &str| {
            Value::Object(
                Object::new(schemas.require(name).unwrap())
                    .with("common", common)
                    .unwrap()
                    .with(prop, format!("{prop} value"))
                    .unwrap(),
            )
        };
        let list = Value::List(vec![
            shape("PolyChildA", "propOnA", "x"),
            shape("PolyChildB", "propOnB", "y"),
            shape("PolyChildC", "propOnC", "z"),
        ]);
        let ty = FieldType::list(FieldType::polymorphic(poly()));

        let doc = codec.encode(&list, &ty).unwrap();
        let items = doc.as_array().unwrap();
        assert_eq!(items[0].get("type"), Some(&Document::from("a")));
        assert_eq!(items[1].get("type"), Some(&Document::from("b")));
        assert_eq!(items[2].get("type"), None);

        let back = codec.decode(&doc, &ty).unwrap();
        assert_eq!(back, list);
        let types: Vec<&str> = back
            .as_list()
            .unwrap()
            .iter()
            .map(|v| v.as_object().unwrap().type_name())
            .collect();
        assert_eq!(types, vec!["PolyChildA", "PolyChildB", "PolyChildC"]);
    }

    #[test]
    fn unknown_discriminator_falls_back_to_default() {
        let (codec, _) = codec();
        let ty = FieldType::polymorphic(poly());
        let doc = Document::map(vec![
            ("type".to_string(), Document::from("zzz")),
            ("common".to_string(), Document::from("c")),
        ]);
        let value = codec.decode(&doc, &ty).unwrap();
        assert_eq!(value.as_object().unwrap().type_name(), "PolyChildC");
    }

    #[test]
    fn polymorphic_fields_reject_foreign_types() {
        let (codec, schemas) = codec();
        let leaf = Value::Object(Object::new(schemas.require("Leaf").unwrap()));
        let err = codec.encode(&leaf, &FieldType::polymorphic(poly())).unwrap_err();
        assert!(matches!(err, CoreError::SchemaMismatch { .. }));
    }

    #[test]
    fn references_store_only_identifiers() {
        let (codec, schemas) = codec();
        let target = child(&schemas, "C1");

        let by_key = codec
            .encode(&Value::from(target.clone()), &FieldType::reference("Child"))
            .unwrap();
        assert_eq!(by_key, Document::from("C1"));

        let by_reference = codec
            .encode(
                &Value::from(target.clone()),
                &FieldType::reference_by("Child", ReferenceBy::PublicReference),
            )
            .unwrap();
        assert_eq!(by_reference, Document::from("Child@C1"));

        let unsaved = EntityHandle::new(Object::new(schemas.require("Child").unwrap()));
        assert_eq!(
            codec.encode(&Value::from(unsaved), &FieldType::reference("Child")).unwrap(),
            Document::Null
        );
    }

    #[test]
    fn decoded_references_resolve_lazily() {
        let schemas = registry();
        let target = child(&schemas, "C1");
        let loader = Arc::new(FixedLoader(vec![target.clone()], Mutex::new(0)));
        let codec = Codec::new(schemas).with_loader(loader.clone());

        let value = codec
            .decode(&Document::from("C1"), &FieldType::reference("Child"))
            .unwrap();
        assert_eq!(*loader.1.lock(), 0);
        assert!(value.resolve().unwrap().unwrap().ptr_eq(&target));
        assert!(value.resolve().unwrap().unwrap().ptr_eq(&target));
        assert_eq!(*loader.1.lock(), 1);
    }

    #[test]
    fn reference_lists_drop_nulls() {
        let schemas = registry();
        let targets: Vec<EntityHandle> = ["C1", "C2", "C3"].iter().map(|id| child(&schemas, id)).collect();
        let loader = Arc::new(FixedLoader(targets.clone(), Mutex::new(0)));
        let codec = Codec::new(schemas.clone()).with_loader(loader);
        let ty = FieldType::list(FieldType::reference("Child"));

        let value = Value::List(vec![
            Value::Null,
            Value::from(targets[0].clone()),
            Value::from(targets[1].clone()),
            Value::Null,
            Value::from(targets[2].clone()),
        ]);
        let doc = codec.encode(&value, &ty).unwrap();
        assert_eq!(doc, Document::from(vec!["C1", "C2", "C3"]));

        let decoded = codec.decode(&doc, &ty).unwrap();
        let refs = decoded.as_references().unwrap();
        assert_eq!(refs.len(), 3);
        let resolved = refs.resolved().unwrap();
        assert!(resolved.iter().zip(&targets).all(|(a, b)| a.ptr_eq(b)));

        // Stored nulls never come back either
        let with_null = Document::Array(vec![Document::from("C1"), Document::Null]);
        assert_eq!(codec.decode(&with_null, &ty).unwrap().as_references().unwrap().len(), 1);
    }

    #[test]
    fn lists_of_maps_of_references() {
        let schemas = registry();
        let ids = ["A", "B", "C"];
        let targets: Vec<EntityHandle> = ids.iter().map(|id| child(&schemas, id)).collect();
        let codec = Codec::new(schemas.clone())
            .with_loader(Arc::new(FixedLoader(targets.clone(), Mutex::new(0))));
        let ty = FieldType::list(FieldType::map(FieldType::reference("Child")));

        let value = Value::List(vec![
            Value::map([("a", targets[0].clone()), ("b", targets[1].clone())]),
            Value::map([("c", Value::from(targets[2].clone())), ("d", Value::Null)]),
        ]);
        let doc = codec.encode(&value, &ty).unwrap();
        let decoded = codec.decode(&doc, &ty).unwrap();

        let maps = decoded.as_list().unwrap();
        assert_eq!(maps.len(), 2);
        let second = maps[1].as_references().unwrap();
        assert_eq!(second.len(), 1);
        assert!(second.get_key("c").unwrap().unwrap().ptr_eq(&targets[2]));
        assert!(second.get_key("d").unwrap().is_none());
    }

    fn leaf_schema() -> Arc<ObjectSchema> {
        registry().require("Leaf").unwrap()
    }

    fn arb_type() -> impl Strategy<Value = FieldType> {
        let leaf = prop_oneof![
            Just(FieldType::integer()),
            Just(FieldType::string()),
            Just(FieldType::bool()),
            Just(FieldType::decimal()),
            Just(FieldType::object("Leaf")),
        ];
        leaf.prop_recursive(4, 24, 2, |inner| {
            prop_oneof![
                inner.clone().prop_map(FieldType::list),
                inner.prop_map(FieldType::map),
            ]
        })
    }

    fn arb_value(ty: &FieldType) -> BoxedStrategy<Value> {
        match &ty.kind {
            FieldKind::Integer => any::<i64>().prop_map(Value::Integer).boxed(),
            FieldKind::String => "[a-z ]{0,8}".prop_map(Value::Text).boxed(),
            FieldKind::Bool => any::<bool>().prop_map(Value::Bool).boxed(),
            FieldKind::Decimal => (-1.0e9f64..1.0e9).prop_map(Value::Decimal).boxed(),
            FieldKind::Object(_) => ("[a-z]{0,6}", any::<i64>())
                .prop_map(|(name, n)| {
                    Value::Object(
                        Object::new(leaf_schema())
                            .with("name", name)
                            .unwrap()
                            .with("n", n)
                            .unwrap(),
                    )
                })
                .boxed(),
            FieldKind::List(element) => prop::collection::vec(arb_value(element), 0..4)
                .prop_map(Value::List)
                .boxed(),
            FieldKind::Map(element) => {
                prop::collection::btree_map("[a-z]{1,4}", arb_value(element), 0..4)
                    .prop_map(Value::Map)
                    .boxed()
            }
            _ => Just(Value::Null).boxed(),
        }
    }

    proptest! {
        #[test]
        fn nested_containers_round_trip(
            (ty, value) in arb_type().prop_flat_map(|ty| {
                let value = arb_value(&ty);
                (Just(ty), value)
            })
        ) {
            let (codec, _) = codec();
            let doc = codec.encode(&value, &ty).unwrap();
            prop_assert_eq!(codec.decode(&doc, &ty).unwrap(), value);
        }
    }
}
