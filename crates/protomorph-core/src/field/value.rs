//! Canonical JSON shape of single field values.
//!
//! These are the transforms every field uses unless a factory overrides
//! them. The shape follows the protobuf JSON mapping:
//!
//! | Kind                       | JSON                                    |
//! |----------------------------|-----------------------------------------|
//! | bool                       | `true` / `false`                        |
//! | 32-bit integers            | number                                  |
//! | 64-bit integers            | decimal string (numbers also accepted)  |
//! | float, double              | number, or `"NaN"`, `"Infinity"`, `"-Infinity"` |
//! | string                     | string                                  |
//! | bytes                      | standard base64 with padding            |
//! | enum                       | value name, or number if unknown        |
//! | message                    | object                                  |
//!
//! Numbers are decoded from their original text, so integers beyond 2^53
//! keep their exact value.

use crate::convert::Converter;
use crate::error::{Error, Result};
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use bytes::Bytes;
use prost_reflect::{DynamicMessage, EnumDescriptor, Kind, MapKey, Value};
use serde_json::{Number, Value as Json};

/// Renders a single (non-list, non-map) value as JSON
pub fn to_json(cx: &Converter, value: &Value, kind: &Kind) -> Result<Json> {
    let json = match value {
        Value::Bool(b) => Json::Bool(*b),
        Value::I32(v) => Json::from(*v),
        Value::U32(v) => Json::from(*v),
        Value::I64(v) => Json::String(v.to_string()),
        Value::U64(v) => Json::String(v.to_string()),
        Value::F32(v) => float_to_json(widen_f32(*v)),
        Value::F64(v) => float_to_json(*v),
        Value::String(s) => Json::String(s.clone()),
        Value::Bytes(b) => Json::String(STANDARD.encode(b)),
        Value::EnumNumber(n) => enum_to_json(kind, *n),
        Value::Message(m) => Json::Object(cx.marshal_tree(m)?),
        Value::List(_) | Value::Map(_) => {
            return Err(Error::internal(format!(
                "a {} collection cannot be rendered as a single value",
                kind_name(kind)
            )))
        }
    };
    Ok(json)
}

/// Parses a single value of the declared kind from JSON
pub fn from_json(cx: &Converter, json: Json, kind: &Kind) -> Result<Value> {
    match kind {
        Kind::Bool => match json {
            Json::Bool(b) => Ok(Value::Bool(b)),
            other => Err(Error::type_mismatch("a boolean", &other)),
        },
        Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 => integer(&json, "int32").map(Value::I32),
        Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 => integer(&json, "int64").map(Value::I64),
        Kind::Uint32 | Kind::Fixed32 => integer(&json, "uint32").map(Value::U32),
        Kind::Uint64 | Kind::Fixed64 => integer(&json, "uint64").map(Value::U64),
        Kind::Float => float32(&json).map(Value::F32),
        Kind::Double => float(&json, "double").map(Value::F64),
        Kind::String => match json {
            Json::String(s) => Ok(Value::String(s)),
            other => Err(Error::type_mismatch("a string", &other)),
        },
        Kind::Bytes => match json {
            Json::String(s) => decode_bytes(&s).map(|b| Value::Bytes(Bytes::from(b))),
            other => Err(Error::type_mismatch("a base64 string", &other)),
        },
        Kind::Enum(descriptor) => enum_from_json(descriptor, json),
        Kind::Message(descriptor) => match json {
            Json::Object(tree) => {
                let mut message = DynamicMessage::new(descriptor.clone());
                cx.populate_from_tree(tree, &mut message)?;
                Ok(Value::Message(message))
            }
            other => Err(Error::type_mismatch("a JSON object", &other)),
        },
    }
}

/// Decodes base64 in either the standard or URL-safe alphabet, with or
/// without padding
pub(crate) fn decode_bytes(text: &str) -> Result<Vec<u8>> {
    let unpadded = text.trim_end_matches('=');
    let engine = if unpadded.contains(['-', '_']) {
        &URL_SAFE_NO_PAD
    } else {
        &STANDARD_NO_PAD
    };
    engine
        .decode(unpadded)
        .map_err(|e| Error::InvalidBytes(e.to_string()))
}

/// Renders a map key as a JSON object key
pub(crate) fn map_key_to_string(key: &MapKey) -> String {
    match key {
        MapKey::Bool(b) => b.to_string(),
        MapKey::I32(v) => v.to_string(),
        MapKey::I64(v) => v.to_string(),
        MapKey::U32(v) => v.to_string(),
        MapKey::U64(v) => v.to_string(),
        MapKey::String(s) => s.clone(),
    }
}

/// Parses a JSON object key as a map key of the declared kind
pub(crate) fn map_key_from_str(key: &str, kind: &Kind) -> Result<MapKey> {
    let invalid = || Error::InvalidMapKey {
        kind: kind_name(kind),
        key: key.to_string(),
    };
    match kind {
        Kind::String => Ok(MapKey::String(key.to_string())),
        Kind::Bool => match key {
            "true" => Ok(MapKey::Bool(true)),
            "false" => Ok(MapKey::Bool(false)),
            _ => Err(invalid()),
        },
        Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 => {
            key.parse().map(MapKey::I32).map_err(|_| invalid())
        }
        Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 => {
            key.parse().map(MapKey::I64).map_err(|_| invalid())
        }
        Kind::Uint32 | Kind::Fixed32 => key.parse().map(MapKey::U32).map_err(|_| invalid()),
        Kind::Uint64 | Kind::Fixed64 => key.parse().map(MapKey::U64).map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

/// Protobuf name of a field kind
pub(crate) fn kind_name(kind: &Kind) -> &'static str {
    match kind {
        Kind::Double => "double",
        Kind::Float => "float",
        Kind::Int32 => "int32",
        Kind::Int64 => "int64",
        Kind::Uint32 => "uint32",
        Kind::Uint64 => "uint64",
        Kind::Sint32 => "sint32",
        Kind::Sint64 => "sint64",
        Kind::Fixed32 => "fixed32",
        Kind::Fixed64 => "fixed64",
        Kind::Sfixed32 => "sfixed32",
        Kind::Sfixed64 => "sfixed64",
        Kind::Bool => "bool",
        Kind::String => "string",
        Kind::Bytes => "bytes",
        Kind::Message(_) => "message",
        Kind::Enum(_) => "enum",
    }
}

/// Widens an `f32` through its shortest decimal form, so `0.1f32` renders
/// as `0.1` rather than `0.10000000149011612`
fn widen_f32(v: f32) -> f64 {
    v.to_string().parse().unwrap_or(f64::from(v))
}

fn float_to_json(v: f64) -> Json {
    if v.is_nan() {
        Json::String("NaN".to_string())
    } else if v == f64::INFINITY {
        Json::String("Infinity".to_string())
    } else if v == f64::NEG_INFINITY {
        Json::String("-Infinity".to_string())
    } else {
        Number::from_f64(v).map(Json::Number).unwrap_or(Json::Null)
    }
}

fn enum_to_json(kind: &Kind, number: i32) -> Json {
    match kind.as_enum().and_then(|e| e.get_value(number)) {
        Some(value) => Json::String(value.name().to_string()),
        None => Json::from(number),
    }
}

fn enum_from_json(descriptor: &EnumDescriptor, json: Json) -> Result<Value> {
    match json {
        Json::String(name) => {
            if let Some(value) = descriptor.get_value_by_name(&name) {
                return Ok(Value::EnumNumber(value.number()));
            }
            match name.parse::<i32>() {
                Ok(number) => Ok(Value::EnumNumber(number)),
                Err(_) => Err(Error::UnknownEnumValue {
                    enum_name: descriptor.full_name().to_string(),
                    value: name,
                }),
            }
        }
        Json::Number(n) => integer_from_text(n.to_string(), "enum").map(Value::EnumNumber),
        other => Err(Error::type_mismatch("an enum name or number", &other)),
    }
}

/// Original text of a numeric value, which may be quoted
fn number_text(json: &Json, expected: &'static str) -> Result<String> {
    match json {
        Json::Number(n) => Ok(n.to_string()),
        Json::String(s) => Ok(s.clone()),
        other => Err(Error::type_mismatch(expected, other)),
    }
}

fn integer<T: TryFrom<i128>>(json: &Json, kind: &'static str) -> Result<T> {
    integer_from_text(number_text(json, "an integer")?, kind)
}

fn integer_from_text<T: TryFrom<i128>>(text: String, kind: &'static str) -> Result<T> {
    let wide = match text.parse::<i128>() {
        Ok(v) => v,
        Err(_) => integral_decimal(&text, kind)?,
    };
    T::try_from(wide).map_err(|_| Error::out_of_range(kind, text))
}

/// Parses integers written in fraction or exponent notation, such as `1e3`
/// or `5.0`, digit by digit. The fractional part must be all zeros.
fn integral_decimal(text: &str, kind: &'static str) -> Result<i128> {
    let invalid = || Error::invalid_number(kind, text);
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());

    let (negative, unsigned) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (mantissa, exponent) = match unsigned.find(['e', 'E']) {
        Some(at) => (&unsigned[..at], Some(&unsigned[at + 1..])),
        None => (unsigned, None),
    };
    let (whole, fraction) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if (whole.is_empty() && fraction.is_empty()) || !all_digits(whole) || !all_digits(fraction) {
        return Err(invalid());
    }

    let exponent = match exponent {
        None => 0,
        Some(e) => {
            let magnitude = e.strip_prefix(['+', '-']).unwrap_or(e);
            if magnitude.is_empty() || !all_digits(magnitude) {
                return Err(invalid());
            }
            // Exponents past i64 saturate; they only matter for zero
            e.parse::<i64>()
                .unwrap_or(if e.starts_with('-') { i64::MIN } else { i64::MAX })
        }
    };

    let joined = format!("{whole}{fraction}");
    let digits = joined.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(0);
    }

    let scale = exponent.saturating_sub(fraction.len() as i64);
    let integral = if scale >= 0 {
        // i128 holds at most 39 digits
        if (digits.len() as i64).saturating_add(scale) > 39 {
            return Err(Error::out_of_range(kind, text));
        }
        format!("{digits}{}", "0".repeat(scale as usize))
    } else {
        let cut = scale.unsigned_abs();
        if cut >= digits.len() as u64 {
            return Err(invalid());
        }
        let (kept, dropped) = digits.split_at(digits.len() - cut as usize);
        if dropped.bytes().any(|b| b != b'0') {
            return Err(invalid());
        }
        kept.to_string()
    };

    let signed = if negative { format!("-{integral}") } else { integral };
    signed
        .parse::<i128>()
        .map_err(|_| Error::out_of_range(kind, text))
}

fn float(json: &Json, kind: &'static str) -> Result<f64> {
    if let Json::String(s) = json {
        match s.as_str() {
            "NaN" => return Ok(f64::NAN),
            "Infinity" => return Ok(f64::INFINITY),
            "-Infinity" => return Ok(f64::NEG_INFINITY),
            _ => {}
        }
    }
    let text = number_text(json, "a number")?;
    let v: f64 = text
        .parse()
        .map_err(|_| Error::invalid_number(kind, &text))?;
    if !v.is_finite() {
        // "inf" and "nan" parse in Rust but are not JSON spellings
        if text.bytes().any(|b| b.is_ascii_digit()) {
            return Err(Error::out_of_range(kind, text));
        }
        return Err(Error::invalid_number(kind, text));
    }
    Ok(v)
}

fn float32(json: &Json) -> Result<f32> {
    let v = float(json, "float")?;
    if v.is_finite() && v.abs() > f64::from(f32::MAX) {
        return Err(Error::out_of_range("float", v.to_string()));
    }
    Ok(v as f32)
}
