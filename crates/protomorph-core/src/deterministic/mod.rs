//! Repeatable binary encoding for messages that contain maps.
//!
//! The message runtime keeps map fields in hash maps and encodes their
//! entries in iteration order, so two encodings of the same logical message
//! can differ byte for byte. [`mostly_deterministic_marshal`] encodes every
//! map with its entries sorted by key, recursing into submessages, map
//! values and repeated messages.
//!
//! Known fields are written in field number order. Extensions and unknown
//! fields follow, in whatever order the runtime keeps them.
//!
//! The output is repeatable within one build of this crate; it is not a
//! canonical encoding that other encoders are guaranteed to reproduce.

use crate::convert::to_dynamic;
use crate::error::{Error, Result};
use prost::encoding::{encode_key, encode_varint, WireType};
use prost::Message;
use prost_reflect::{DynamicMessage, FieldDescriptor, Kind, MapKey, MessageDescriptor, ReflectMessage, Value};
use std::collections::HashMap;
use tracing::{debug, trace};

/// Encodes a message with every map field's entries sorted by key
pub fn mostly_deterministic_marshal<M: ReflectMessage>(message: &M) -> Result<Vec<u8>> {
    let dynamic = to_dynamic(message)?;
    let mut buf = Vec::with_capacity(dynamic.encoded_len());
    encode_message(&dynamic, &mut buf)?;
    debug!(
        "Encoded {} deterministically ({} bytes)",
        dynamic.descriptor().full_name(),
        buf.len()
    );
    Ok(buf)
}

fn encode_message(message: &DynamicMessage, buf: &mut Vec<u8>) -> Result<()> {
    let descriptor = message.descriptor();

    // fields() yields in field number order
    for field in descriptor.fields() {
        if !message.has_field(&field) {
            continue;
        }
        let value = message.get_field(&field);
        match (&*value, field.kind()) {
            (Value::Map(entries), Kind::Message(entry)) => encode_map(&field, &entry, entries, buf)?,
            (Value::Message(inner), _) => encode_nested(&field, inner, buf)?,
            (Value::List(items), Kind::Message(_)) => {
                for item in items {
                    let inner = item.as_message().ok_or_else(|| {
                        Error::internal(format!("repeated field {} holds a non-message", field.name()))
                    })?;
                    encode_nested(&field, inner, buf)?;
                }
            }
            (scalar, _) => encode_scalar(&descriptor, &field, scalar, buf)?,
        }
    }

    let mut rest = message.clone();
    for field in descriptor.fields() {
        rest.clear_field(&field);
    }
    rest.encode(buf)?;
    Ok(())
}

fn encode_nested(field: &FieldDescriptor, inner: &DynamicMessage, buf: &mut Vec<u8>) -> Result<()> {
    let mut body = Vec::new();
    encode_message(inner, &mut body)?;
    if field.is_group() {
        encode_key(field.number(), WireType::StartGroup, buf);
        buf.extend_from_slice(&body);
        encode_key(field.number(), WireType::EndGroup, buf);
    } else {
        encode_len_delimited(field.number(), &body, buf);
    }
    Ok(())
}

fn encode_len_delimited(number: u32, body: &[u8], buf: &mut Vec<u8>) {
    encode_key(number, WireType::LengthDelimited, buf);
    encode_varint(body.len() as u64, buf);
    buf.extend_from_slice(body);
}

fn encode_map(
    field: &FieldDescriptor,
    entry: &MessageDescriptor,
    entries: &HashMap<MapKey, Value>,
    buf: &mut Vec<u8>,
) -> Result<()> {
    trace!("Sorting {} entries of map field {}", entries.len(), field.name());

    let mut sorted: Vec<(&MapKey, &Value)> = entries.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let key_field = entry.map_entry_key_field();
    let value_field = entry.map_entry_value_field();
    for (key, value) in sorted {
        let mut entry_message = DynamicMessage::new(entry.clone());
        set(&mut entry_message, &key_field, Value::from(key.clone()))?;
        set(&mut entry_message, &value_field, value.clone())?;

        let mut body = Vec::new();
        encode_message(&entry_message, &mut body)?;
        encode_len_delimited(field.number(), &body, buf);
    }
    Ok(())
}

/// Scalars and scalar lists go through the runtime's encoder, one field at a
/// time, so packing and zigzag rules stay in one place
fn encode_scalar(
    descriptor: &MessageDescriptor,
    field: &FieldDescriptor,
    value: &Value,
    buf: &mut Vec<u8>,
) -> Result<()> {
    let mut single = DynamicMessage::new(descriptor.clone());
    set(&mut single, field, value.clone())?;
    single.encode(buf)?;
    Ok(())
}

fn set(message: &mut DynamicMessage, field: &FieldDescriptor, value: Value) -> Result<()> {
    message
        .try_set_field(field, value)
        .map_err(|e| Error::internal(e.to_string()))
}
