//! Ready-made field factories for common custom encodings.
//!
//! Neither is registered by default; add them to a converter with
//! [`Converter::with_factory`](crate::Converter::with_factory).

use crate::convert::Converter;
use crate::deterministic::mostly_deterministic_marshal;
use crate::error::{BoxError, Error};
use crate::field::{FieldFactory, FieldKind, MapField, PlainField, ProtoField, SliceField};
use prost_reflect::{DynamicMessage, FieldDescriptor, Kind, MessageDescriptor, ReflectMessage, Value};
use serde_json::Value as Json;
use std::collections::{HashMap, HashSet};

/// Renders named `bytes` fields as lowercase hex instead of base64.
///
/// Applies to singular and repeated bytes fields and to maps with bytes
/// values. Fields are matched by declared name in any message.
#[derive(Debug, Clone, Default)]
pub struct HexBytesFieldFactory {
    fields: HashSet<String>,
}

impl HexBytesFieldFactory {
    /// Creates a factory that claims no field yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims bytes fields with the given declared name
    pub fn with_field(mut self, name: impl Into<String>) -> Self {
        self.fields.insert(name.into());
        self
    }
}

/// Kind of the values a field holds, looking through map entries
fn element_kind(field: &FieldDescriptor) -> Kind {
    match field.kind() {
        Kind::Message(entry) if field.is_map() => entry.map_entry_value_field().kind(),
        kind => kind,
    }
}

fn hex_to_json(value: &Value) -> Result<Json, BoxError> {
    match value {
        Value::Bytes(bytes) => Ok(Json::String(hex::encode(bytes))),
        other => Err(format!("expected bytes but found {other:?}").into()),
    }
}

fn hex_from_json(json: Json) -> Result<Value, BoxError> {
    match json {
        Json::String(text) => Ok(Value::Bytes(hex::decode(text)?.into())),
        other => Err(Error::type_mismatch("a hex string", &other).into()),
    }
}

impl FieldFactory for HexBytesFieldFactory {
    fn handles(&self, _message: &DynamicMessage, field: &FieldDescriptor) -> bool {
        self.fields.contains(field.name()) && element_kind(field) == Kind::Bytes
    }

    fn new_proto_field(&self, message: &DynamicMessage, field: &FieldDescriptor) -> Result<ProtoField, BoxError> {
        let proto_field: ProtoField = match FieldKind::of(field) {
            FieldKind::Map => MapField::new(message, field)
                .to_json_with(|_, _, v, _| hex_to_json(v))
                .from_json_with(|_, _, j, _| hex_from_json(j))
                .into(),
            FieldKind::Slice => SliceField::new(message, field)
                .to_json_with(|_, _, v, _| hex_to_json(v))
                .from_json_with(|_, _, j, _| hex_from_json(j))
                .into(),
            FieldKind::Scalar | FieldKind::Message => PlainField::new(message, field)
                .to_json_with(|_, v, _| hex_to_json(v))
                .from_json_with(|_, j, _| hex_from_json(j))
                .into(),
        };
        Ok(proto_field)
    }
}

/// Renders `bytes` fields that carry an encoded message as that message's
/// JSON.
///
/// The inner message is converted by the same converter, so its own fields
/// go through the registered factories too. On input the JSON object is
/// converted back and stored with [`mostly_deterministic_marshal`].
#[derive(Debug, Clone, Default)]
pub struct OpaqueFieldFactory {
    // message full name -> field name -> payload type
    types: HashMap<String, HashMap<String, MessageDescriptor>>,
}

impl OpaqueFieldFactory {
    /// Creates a factory that claims no field yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares that `field` of `message` (a fully-qualified name) holds an
    /// encoded `payload`
    pub fn with_field(
        mut self,
        message: impl Into<String>,
        field: impl Into<String>,
        payload: MessageDescriptor,
    ) -> Self {
        self.types
            .entry(message.into())
            .or_default()
            .insert(field.into(), payload);
        self
    }

    fn payload_type(&self, message: &DynamicMessage, field: &FieldDescriptor) -> Option<&MessageDescriptor> {
        self.types
            .get(message.descriptor().full_name())?
            .get(field.name())
    }
}

fn opaque_to_json(cx: &Converter, value: &Value, payload: &MessageDescriptor) -> Result<Json, BoxError> {
    let Value::Bytes(bytes) = value else {
        return Err(format!("expected bytes but found {value:?}").into());
    };
    let decoded = DynamicMessage::decode(payload.clone(), &bytes[..]).map_err(Error::from)?;
    Ok(Json::Object(cx.marshal_tree(&decoded)?))
}

fn opaque_from_json(cx: &Converter, json: Json, payload: &MessageDescriptor) -> Result<Value, BoxError> {
    let tree = match json {
        Json::Object(tree) => tree,
        other => return Err(Error::type_mismatch("a JSON object", &other).into()),
    };
    let mut decoded = DynamicMessage::new(payload.clone());
    cx.populate_from_tree(tree, &mut decoded)?;
    Ok(Value::Bytes(mostly_deterministic_marshal(&decoded)?.into()))
}

impl FieldFactory for OpaqueFieldFactory {
    fn handles(&self, message: &DynamicMessage, field: &FieldDescriptor) -> bool {
        self.payload_type(message, field).is_some()
    }

    fn new_proto_field(&self, message: &DynamicMessage, field: &FieldDescriptor) -> Result<ProtoField, BoxError> {
        let not_bytes = || {
            format!(
                "field {} of message {} is not a bytes field",
                field.name(),
                message.descriptor().full_name()
            )
        };
        if field.is_map() || field.kind() != Kind::Bytes {
            return Err(not_bytes().into());
        }
        let payload = self.payload_type(message, field).cloned().ok_or_else(not_bytes)?;
        let payload_in = payload.clone();

        let proto_field: ProtoField = if field.is_list() {
            SliceField::new(message, field)
                .to_json_with(move |cx, _, v, _| opaque_to_json(cx, v, &payload))
                .from_json_with(move |cx, _, j, _| opaque_from_json(cx, j, &payload_in))
                .into()
        } else {
            PlainField::new(message, field)
                .to_json_with(move |cx, v, _| opaque_to_json(cx, v, &payload))
                .from_json_with(move |cx, j, _| opaque_from_json(cx, j, &payload_in))
                .into()
        };
        Ok(proto_field)
    }
}
