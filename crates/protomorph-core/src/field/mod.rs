//! Per-field conversion capabilities.
//!
//! Every field of a message is converted through a [`ProtoField`], a value
//! bound to one field occurrence of one message. A `ProtoField` is one of
//! four structural variants:
//!
//! - [`PlainField`]: a singular scalar (or a singular field whose
//!   representation a factory overrides wholesale)
//! - [`MapField`]: a map, converted entry by entry
//! - [`SliceField`]: a repeated field, converted element by element
//! - [`MessageField`]: a singular submessage, converted by recursing into the
//!   [`Converter`]
//!
//! The plain, map and slice variants carry a pair of transforms. The
//! defaults implement the canonical JSON shape (see [`value`]); a
//! [`FieldFactory`] replaces them to give a field a custom encoding.
//!
//! ## Custom encodings
//!
//! ```
//! use protomorph_core::field::{FieldFactory, PlainField, ProtoField};
//! use protomorph_core::BoxError;
//! use prost_reflect::{DynamicMessage, FieldDescriptor, Value};
//!
//! /// Renders `secret` fields as a fixed mask and never reads them back
//! struct Redact;
//!
//! impl FieldFactory for Redact {
//!     fn handles(&self, _message: &DynamicMessage, field: &FieldDescriptor) -> bool {
//!         field.name() == "secret"
//!     }
//!
//!     fn new_proto_field(
//!         &self,
//!         message: &DynamicMessage,
//!         field: &FieldDescriptor,
//!     ) -> Result<ProtoField, BoxError> {
//!         Ok(PlainField::new(message, field)
//!             .to_json_with(|_, _, _| Ok(serde_json::Value::String("***".into())))
//!             .from_json_with(|_, _, kind| Ok(Value::default_value(kind)))
//!             .into())
//!     }
//! }
//! ```
//!
//! [`Converter`]: crate::Converter

pub mod value;

use crate::convert::Converter;
use crate::error::{BoxError, Direction, Error, Result};
use prost_reflect::{DynamicMessage, FieldDescriptor, Kind, MapKey, ReflectMessage, Value};
use serde_json::{Map, Value as Json};
use std::collections::HashMap;

/// Transform from a field value to JSON
pub type ToJson = Box<dyn Fn(&Converter, &Value, &Kind) -> std::result::Result<Json, BoxError>>;

/// Transform from JSON to a field value of the given declared kind
pub type FromJson = Box<dyn Fn(&Converter, Json, &Kind) -> std::result::Result<Value, BoxError>>;

/// Transform from a map entry value to JSON, given the entry key
pub type MapToJson =
    Box<dyn Fn(&Converter, &str, &Value, &Kind) -> std::result::Result<Json, BoxError>>;

/// Transform from JSON to a map entry value, given the entry key
pub type MapFromJson =
    Box<dyn Fn(&Converter, &str, Json, &Kind) -> std::result::Result<Value, BoxError>>;

/// Transform from a repeated field element to JSON, given its index
pub type SliceToJson =
    Box<dyn Fn(&Converter, usize, &Value, &Kind) -> std::result::Result<Json, BoxError>>;

/// Transform from JSON to a repeated field element, given its index
pub type SliceFromJson =
    Box<dyn Fn(&Converter, usize, Json, &Kind) -> std::result::Result<Value, BoxError>>;

/// A rule that claims specific fields and supplies their conversion logic.
///
/// Factories are consulted in registration order; the first one whose
/// [`handles`](FieldFactory::handles) returns true builds the field's
/// [`ProtoField`] and no other factory is tried.
pub trait FieldFactory: Send + Sync {
    /// Returns true if this factory converts the given field
    fn handles(&self, message: &DynamicMessage, field: &FieldDescriptor) -> bool;

    /// Builds the converter for a field this factory handles
    fn new_proto_field(
        &self,
        message: &DynamicMessage,
        field: &FieldDescriptor,
    ) -> std::result::Result<ProtoField, BoxError>;
}

/// Structural kind of a field, which selects its default [`ProtoField`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Singular scalar or enum
    Scalar,
    /// Map field
    Map,
    /// Repeated, non-map field
    Slice,
    /// Singular message field
    Message,
}

impl FieldKind {
    /// Classifies a field by its declaration
    pub fn of(field: &FieldDescriptor) -> Self {
        if field.is_map() {
            FieldKind::Map
        } else if field.is_list() {
            FieldKind::Slice
        } else if matches!(field.kind(), Kind::Message(_)) {
            FieldKind::Message
        } else {
            FieldKind::Scalar
        }
    }
}

fn default_to_json(cx: &Converter, v: &Value, kind: &Kind) -> std::result::Result<Json, BoxError> {
    Ok(value::to_json(cx, v, kind)?)
}

fn default_from_json(cx: &Converter, j: Json, kind: &Kind) -> std::result::Result<Value, BoxError> {
    Ok(value::from_json(cx, j, kind)?)
}

/// The field occurrence a [`ProtoField`] is bound to
#[derive(Debug, Clone)]
struct BaseField {
    message: String,
    field: FieldDescriptor,
}

impl BaseField {
    fn new(message: &DynamicMessage, field: &FieldDescriptor) -> Self {
        Self {
            message: message.descriptor().full_name().to_string(),
            field: field.clone(),
        }
    }

    fn name(&self) -> &str {
        self.field.name()
    }

    fn field_error(&self, direction: Direction, source: impl Into<BoxError>) -> Error {
        Error::field(direction, self.name(), &self.message, source)
    }

    /// Stores a converted value, rejecting values of the wrong type
    fn set(&self, message: &mut DynamicMessage, value: Value) -> Result<()> {
        message
            .try_set_field(&self.field, value)
            .map_err(|e| self.field_error(Direction::PopulateFrom, e.to_string()))
    }
}

/// Conversion capability for one field occurrence.
///
/// A `ProtoField` is consumed by the conversion it performs, so it cannot be
/// reused across fields or calls.
pub enum ProtoField {
    /// Singular scalar field
    Plain(PlainField),
    /// Map field
    Map(MapField),
    /// Repeated field
    Slice(SliceField),
    /// Singular message field
    Message(MessageField),
}

impl ProtoField {
    /// Builds the default converter for a field from its structural kind
    pub fn structural(message: &DynamicMessage, field: &FieldDescriptor) -> Self {
        match FieldKind::of(field) {
            FieldKind::Scalar => PlainField::new(message, field).into(),
            FieldKind::Map => MapField::new(message, field).into(),
            FieldKind::Slice => SliceField::new(message, field).into(),
            FieldKind::Message => MessageField::new(message, field).into(),
        }
    }

    /// The field this converter is bound to
    pub fn descriptor(&self) -> &FieldDescriptor {
        &self.base().field
    }

    fn base(&self) -> &BaseField {
        match self {
            ProtoField::Plain(f) => &f.base,
            ProtoField::Map(f) => &f.base,
            ProtoField::Slice(f) => &f.base,
            ProtoField::Message(f) => &f.base,
        }
    }

    /// Produces the field's JSON value from the message state
    pub fn populate_to(self, cx: &Converter, message: &DynamicMessage) -> Result<Json> {
        match self {
            ProtoField::Plain(f) => f.populate_to(cx, message),
            ProtoField::Map(f) => f.populate_to(cx, message),
            ProtoField::Slice(f) => f.populate_to(cx, message),
            ProtoField::Message(f) => f.populate_to(cx, message),
        }
    }

    /// Sets the field from a decoded JSON value; `null` clears the field
    pub fn populate_from(self, cx: &Converter, message: &mut DynamicMessage, source: Json) -> Result<()> {
        if source.is_null() {
            message.clear_field(self.descriptor());
            return Ok(());
        }
        match self {
            ProtoField::Plain(f) => f.populate_from(cx, message, source),
            ProtoField::Map(f) => f.populate_from(cx, message, source),
            ProtoField::Slice(f) => f.populate_from(cx, message, source),
            ProtoField::Message(f) => f.populate_from(cx, message, source),
        }
    }
}

impl std::fmt::Debug for ProtoField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let variant = match self {
            ProtoField::Plain(_) => "Plain",
            ProtoField::Map(_) => "Map",
            ProtoField::Slice(_) => "Slice",
            ProtoField::Message(_) => "Message",
        };
        let base = self.base();
        f.debug_struct(variant)
            .field("message", &base.message)
            .field("field", &base.name())
            .finish()
    }
}

/// Singular field converted by a pair of whole-value transforms
pub struct PlainField {
    base: BaseField,
    to_json: ToJson,
    from_json: FromJson,
}

impl PlainField {
    /// Binds a plain field with the canonical JSON transforms
    pub fn new(message: &DynamicMessage, field: &FieldDescriptor) -> Self {
        Self {
            base: BaseField::new(message, field),
            to_json: Box::new(default_to_json),
            from_json: Box::new(default_from_json),
        }
    }

    /// Replaces the message-to-JSON transform
    pub fn to_json_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&Converter, &Value, &Kind) -> std::result::Result<Json, BoxError> + 'static,
    {
        self.to_json = Box::new(f);
        self
    }

    /// Replaces the JSON-to-message transform
    pub fn from_json_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&Converter, Json, &Kind) -> std::result::Result<Value, BoxError> + 'static,
    {
        self.from_json = Box::new(f);
        self
    }

    fn populate_to(self, cx: &Converter, message: &DynamicMessage) -> Result<Json> {
        let current = message.get_field(&self.base.field);
        (self.to_json)(cx, &*current, &self.base.field.kind())
            .map_err(|e| self.base.field_error(Direction::PopulateTo, e))
    }

    fn populate_from(self, cx: &Converter, message: &mut DynamicMessage, source: Json) -> Result<()> {
        let value = (self.from_json)(cx, source, &self.base.field.kind())
            .map_err(|e| self.base.field_error(Direction::PopulateFrom, e))?;
        self.base.set(message, value)
    }
}

impl From<PlainField> for ProtoField {
    fn from(field: PlainField) -> Self {
        ProtoField::Plain(field)
    }
}

/// Map field converted entry by entry.
///
/// Entries are emitted as a JSON object in ascending key order.
pub struct MapField {
    base: BaseField,
    to_json: MapToJson,
    from_json: MapFromJson,
}

impl MapField {
    /// Binds a map field with the canonical JSON transforms
    pub fn new(message: &DynamicMessage, field: &FieldDescriptor) -> Self {
        Self {
            base: BaseField::new(message, field),
            to_json: Box::new(|cx: &Converter, _: &str, v: &Value, kind: &Kind| {
                default_to_json(cx, v, kind)
            }),
            from_json: Box::new(|cx: &Converter, _: &str, j: Json, kind: &Kind| {
                default_from_json(cx, j, kind)
            }),
        }
    }

    /// Replaces the per-entry message-to-JSON transform
    pub fn to_json_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&Converter, &str, &Value, &Kind) -> std::result::Result<Json, BoxError> + 'static,
    {
        self.to_json = Box::new(f);
        self
    }

    /// Replaces the per-entry JSON-to-message transform
    pub fn from_json_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&Converter, &str, Json, &Kind) -> std::result::Result<Value, BoxError> + 'static,
    {
        self.from_json = Box::new(f);
        self
    }

    /// Declared kinds of the entry key and value
    fn entry_kinds(&self, direction: Direction) -> Result<(Kind, Kind)> {
        match self.base.field.kind() {
            Kind::Message(entry) if entry.is_map_entry() => Ok((
                entry.map_entry_key_field().kind(),
                entry.map_entry_value_field().kind(),
            )),
            _ => Err(self.base.field_error(
                direction,
                format!("field {} is not a map", self.base.name()),
            )),
        }
    }

    fn populate_to(self, cx: &Converter, message: &DynamicMessage) -> Result<Json> {
        let (_, value_kind) = self.entry_kinds(Direction::PopulateTo)?;
        let current = message.get_field(&self.base.field);
        let Some(entries) = current.as_map() else {
            return Err(self.base.field_error(
                Direction::PopulateTo,
                format!("expected map field {} to hold a map", self.base.name()),
            ));
        };

        let mut sorted: Vec<(&MapKey, &Value)> = entries.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(b.0));

        let mut result = Map::new();
        for (key, entry) in sorted {
            let key = value::map_key_to_string(key);
            let converted = (self.to_json)(cx, &key, entry, &value_kind).map_err(|e| {
                Error::map_entry(
                    Direction::PopulateTo,
                    self.base.name(),
                    &key,
                    &self.base.message,
                    e,
                )
            })?;
            result.insert(key, converted);
        }
        Ok(Json::Object(result))
    }

    fn populate_from(self, cx: &Converter, message: &mut DynamicMessage, source: Json) -> Result<()> {
        let (key_kind, value_kind) = self.entry_kinds(Direction::PopulateFrom)?;
        let tree = match source {
            Json::Object(tree) => tree,
            other => {
                return Err(self.base.field_error(
                    Direction::PopulateFrom,
                    Error::type_mismatch("a JSON object", &other),
                ))
            }
        };

        let mut result = HashMap::with_capacity(tree.len());
        for (key, entry) in tree {
            let entry_error = |e: BoxError| {
                Error::map_entry(
                    Direction::PopulateFrom,
                    self.base.name(),
                    &key,
                    &self.base.message,
                    e,
                )
            };
            let map_key = value::map_key_from_str(&key, &key_kind)
                .map_err(|e| entry_error(e.into()))?;
            let converted = (self.from_json)(cx, &key, entry, &value_kind).map_err(entry_error)?;
            result.insert(map_key, converted);
        }
        self.base.set(message, Value::Map(result))
    }
}

impl From<MapField> for ProtoField {
    fn from(field: MapField) -> Self {
        ProtoField::Map(field)
    }
}

/// Repeated field converted element by element
pub struct SliceField {
    base: BaseField,
    to_json: SliceToJson,
    from_json: SliceFromJson,
}

impl SliceField {
    /// Binds a repeated field with the canonical JSON transforms
    pub fn new(message: &DynamicMessage, field: &FieldDescriptor) -> Self {
        Self {
            base: BaseField::new(message, field),
            to_json: Box::new(|cx: &Converter, _: usize, v: &Value, kind: &Kind| {
                default_to_json(cx, v, kind)
            }),
            from_json: Box::new(|cx: &Converter, _: usize, j: Json, kind: &Kind| {
                default_from_json(cx, j, kind)
            }),
        }
    }

    /// Replaces the per-element message-to-JSON transform
    pub fn to_json_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&Converter, usize, &Value, &Kind) -> std::result::Result<Json, BoxError> + 'static,
    {
        self.to_json = Box::new(f);
        self
    }

    /// Replaces the per-element JSON-to-message transform
    pub fn from_json_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&Converter, usize, Json, &Kind) -> std::result::Result<Value, BoxError> + 'static,
    {
        self.from_json = Box::new(f);
        self
    }

    fn populate_to(self, cx: &Converter, message: &DynamicMessage) -> Result<Json> {
        let kind = self.base.field.kind();
        let current = message.get_field(&self.base.field);
        let Some(items) = current.as_list() else {
            return Err(self.base.field_error(
                Direction::PopulateTo,
                format!("expected slice field {} to hold a list", self.base.name()),
            ));
        };

        let mut result = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let converted = (self.to_json)(cx, index, item, &kind).map_err(|e| {
                Error::slice_entry(
                    Direction::PopulateTo,
                    self.base.name(),
                    index,
                    &self.base.message,
                    e,
                )
            })?;
            result.push(converted);
        }
        Ok(Json::Array(result))
    }

    fn populate_from(self, cx: &Converter, message: &mut DynamicMessage, source: Json) -> Result<()> {
        let kind = self.base.field.kind();
        let items = match source {
            Json::Array(items) => items,
            other => {
                return Err(self.base.field_error(
                    Direction::PopulateFrom,
                    Error::type_mismatch("a JSON array", &other),
                ))
            }
        };

        let mut result = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            let converted = (self.from_json)(cx, index, item, &kind).map_err(|e| {
                Error::slice_entry(
                    Direction::PopulateFrom,
                    self.base.name(),
                    index,
                    &self.base.message,
                    e,
                )
            })?;
            result.push(converted);
        }
        self.base.set(message, Value::List(result))
    }
}

impl From<SliceField> for ProtoField {
    fn from(field: SliceField) -> Self {
        ProtoField::Slice(field)
    }
}

/// Singular submessage, converted by the [`Converter`] itself
pub struct MessageField {
    base: BaseField,
}

impl MessageField {
    /// Binds a singular message field
    pub fn new(message: &DynamicMessage, field: &FieldDescriptor) -> Self {
        Self {
            base: BaseField::new(message, field),
        }
    }

    fn populate_to(self, cx: &Converter, message: &DynamicMessage) -> Result<Json> {
        let current = message.get_field(&self.base.field);
        let Some(inner) = current.as_message() else {
            return Err(self.base.field_error(
                Direction::PopulateTo,
                format!("expected field {} to hold a message", self.base.name()),
            ));
        };
        cx.marshal_tree(inner)
            .map(Json::Object)
            .map_err(|e| self.base.field_error(Direction::PopulateTo, e))
    }

    fn populate_from(self, cx: &Converter, message: &mut DynamicMessage, source: Json) -> Result<()> {
        let descriptor = match self.base.field.kind() {
            Kind::Message(descriptor) => descriptor,
            _ => {
                return Err(self.base.field_error(
                    Direction::PopulateFrom,
                    format!("field {} is not a message field", self.base.name()),
                ))
            }
        };
        let tree = match source {
            Json::Object(tree) => tree,
            other => {
                return Err(self.base.field_error(
                    Direction::PopulateFrom,
                    Error::type_mismatch("a JSON object", &other),
                ))
            }
        };

        let mut inner = DynamicMessage::new(descriptor);
        cx.populate_from_tree(tree, &mut inner)
            .map_err(|e| self.base.field_error(Direction::PopulateFrom, e))?;
        self.base.set(message, Value::Message(inner))
    }
}

impl From<MessageField> for ProtoField {
    fn from(field: MessageField) -> Self {
        ProtoField::Message(field)
    }
}
