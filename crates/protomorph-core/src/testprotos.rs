//! Test schemas, assembled from descriptor protos so no `protoc` run is needed.
//!
//! ```proto
//! syntax = "proto3";
//! package testprotos;
//!
//! enum Color { COLOR_UNSPECIFIED = 0; RED = 1; BLUE = 2; }
//!
//! message SimpleMsg {
//!   string plain_field = 1;
//!   map<string, string> map_field = 2;
//!   repeated string slice_field = 3;
//! }
//!
//! message NestedMsg {
//!   SimpleMsg plain_nested_field = 1;
//!   map<string, SimpleMsg> map_nested_field = 2;
//!   repeated SimpleMsg slice_nested_field = 3;
//! }
//!
//! message ScalarsMsg {
//!   int32 int32_field = 1;  int64 int64_field = 2;  uint32 uint32_field = 3;
//!   uint64 uint64_field = 4; sint64 sint64_field = 5; fixed64 fixed64_field = 6;
//!   double double_field = 7; float float_field = 8;  bool bool_field = 9;
//!   bytes bytes_field = 10;  Color color = 11;
//!   map<int32, string> int_keyed_map = 12;
//!   repeated int64 packed_field = 13;
//!   oneof choice { string text_choice = 14; SimpleMsg msg_choice = 15; }
//! }
//!
//! message OpaqueMsg {
//!   bytes payload = 1;
//!   repeated bytes payloads = 2;
//!   bytes digest = 3;
//!   map<string, bytes> blobs = 4;
//! }
//! ```

use std::collections::HashMap;
use std::sync::OnceLock;

use prost_reflect::{DescriptorPool, DynamicMessage, MapKey, MessageDescriptor, ReflectMessage, Value};
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
    FileDescriptorProto, MessageOptions, OneofDescriptorProto,
};

fn field(name: &str, number: i32, ty: Type) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        json_name: Some(to_lower_camel_case(name)),
        number: Some(number),
        label: Some(Label::Optional as i32),
        r#type: Some(ty as i32),
        ..Default::default()
    }
}

fn typed(name: &str, number: i32, ty: Type, type_name: &str) -> FieldDescriptorProto {
    FieldDescriptorProto {
        type_name: Some(type_name.to_string()),
        ..field(name, number, ty)
    }
}

fn repeated(mut f: FieldDescriptorProto) -> FieldDescriptorProto {
    f.label = Some(Label::Repeated as i32);
    f
}

fn in_oneof(mut f: FieldDescriptorProto, index: i32) -> FieldDescriptorProto {
    f.oneof_index = Some(index);
    f
}

fn map_entry(name: &str, key: Type, value: FieldDescriptorProto) -> DescriptorProto {
    DescriptorProto {
        name: Some(name.to_string()),
        field: vec![field("key", 1, key), value],
        options: Some(MessageOptions {
            map_entry: Some(true),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Convert a snake_case name to lowerCamelCase
fn to_lower_camel_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut capitalize_next = false;

    for c in s.chars() {
        if c == '_' {
            capitalize_next = true;
        } else if capitalize_next {
            result.push(c.to_ascii_uppercase());
            capitalize_next = false;
        } else {
            result.push(c);
        }
    }

    result
}

fn file_descriptor() -> FileDescriptorProto {
    let color = EnumDescriptorProto {
        name: Some("Color".to_string()),
        value: ["COLOR_UNSPECIFIED", "RED", "BLUE"]
            .iter()
            .enumerate()
            .map(|(i, name)| EnumValueDescriptorProto {
                name: Some(name.to_string()),
                number: Some(i as i32),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    };

    let simple = DescriptorProto {
        name: Some("SimpleMsg".to_string()),
        field: vec![
            field("plain_field", 1, Type::String),
            repeated(typed(
                "map_field",
                2,
                Type::Message,
                ".testprotos.SimpleMsg.MapFieldEntry",
            )),
            repeated(field("slice_field", 3, Type::String)),
        ],
        nested_type: vec![map_entry(
            "MapFieldEntry",
            Type::String,
            field("value", 2, Type::String),
        )],
        ..Default::default()
    };

    let nested = DescriptorProto {
        name: Some("NestedMsg".to_string()),
        field: vec![
            typed("plain_nested_field", 1, Type::Message, ".testprotos.SimpleMsg"),
            repeated(typed(
                "map_nested_field",
                2,
                Type::Message,
                ".testprotos.NestedMsg.MapNestedFieldEntry",
            )),
            repeated(typed(
                "slice_nested_field",
                3,
                Type::Message,
                ".testprotos.SimpleMsg",
            )),
        ],
        nested_type: vec![map_entry(
            "MapNestedFieldEntry",
            Type::String,
            typed("value", 2, Type::Message, ".testprotos.SimpleMsg"),
        )],
        ..Default::default()
    };

    let scalars = DescriptorProto {
        name: Some("ScalarsMsg".to_string()),
        field: vec![
            field("int32_field", 1, Type::Int32),
            field("int64_field", 2, Type::Int64),
            field("uint32_field", 3, Type::Uint32),
            field("uint64_field", 4, Type::Uint64),
            field("sint64_field", 5, Type::Sint64),
            field("fixed64_field", 6, Type::Fixed64),
            field("double_field", 7, Type::Double),
            field("float_field", 8, Type::Float),
            field("bool_field", 9, Type::Bool),
            field("bytes_field", 10, Type::Bytes),
            typed("color", 11, Type::Enum, ".testprotos.Color"),
            repeated(typed(
                "int_keyed_map",
                12,
                Type::Message,
                ".testprotos.ScalarsMsg.IntKeyedMapEntry",
            )),
            repeated(field("packed_field", 13, Type::Int64)),
            in_oneof(field("text_choice", 14, Type::String), 0),
            in_oneof(typed("msg_choice", 15, Type::Message, ".testprotos.SimpleMsg"), 0),
        ],
        nested_type: vec![map_entry(
            "IntKeyedMapEntry",
            Type::Int32,
            field("value", 2, Type::String),
        )],
        oneof_decl: vec![OneofDescriptorProto {
            name: Some("choice".to_string()),
            ..Default::default()
        }],
        ..Default::default()
    };

    let opaque = DescriptorProto {
        name: Some("OpaqueMsg".to_string()),
        field: vec![
            field("payload", 1, Type::Bytes),
            repeated(field("payloads", 2, Type::Bytes)),
            field("digest", 3, Type::Bytes),
            repeated(typed(
                "blobs",
                4,
                Type::Message,
                ".testprotos.OpaqueMsg.BlobsEntry",
            )),
        ],
        nested_type: vec![map_entry(
            "BlobsEntry",
            Type::String,
            field("value", 2, Type::Bytes),
        )],
        ..Default::default()
    };

    FileDescriptorProto {
        name: Some("testprotos/test.proto".to_string()),
        package: Some("testprotos".to_string()),
        syntax: Some("proto3".to_string()),
        message_type: vec![simple, nested, scalars, opaque],
        enum_type: vec![color],
        ..Default::default()
    }
}

/// The descriptor pool holding every test schema.
///
/// Shared, since descriptors from different pools never compare equal.
pub(crate) fn pool() -> DescriptorPool {
    static POOL: OnceLock<DescriptorPool> = OnceLock::new();
    POOL.get_or_init(|| {
        let mut pool = DescriptorPool::new();
        pool.add_file_descriptor_proto(file_descriptor())
            .expect("test schema is valid");
        pool
    })
    .clone()
}

fn message(name: &str) -> MessageDescriptor {
    pool()
        .get_message_by_name(name)
        .unwrap_or_else(|| panic!("missing test message {name}"))
}

pub(crate) fn simple_msg() -> MessageDescriptor {
    message("testprotos.SimpleMsg")
}

pub(crate) fn nested_msg() -> MessageDescriptor {
    message("testprotos.NestedMsg")
}

pub(crate) fn scalars_msg() -> MessageDescriptor {
    message("testprotos.ScalarsMsg")
}

pub(crate) fn opaque_msg() -> MessageDescriptor {
    message("testprotos.OpaqueMsg")
}

/// Builds a `SimpleMsg` with fresh map storage on every call
pub(crate) fn simple(plain: &str, map: &[(&str, &str)], slice: &[&str]) -> DynamicMessage {
    let mut msg = DynamicMessage::new(simple_msg());
    if !plain.is_empty() {
        msg.set_field_by_name("plain_field", Value::String(plain.to_string()));
    }
    if !map.is_empty() {
        let entries: HashMap<MapKey, Value> = map
            .iter()
            .map(|(k, v)| (MapKey::String(k.to_string()), Value::String(v.to_string())))
            .collect();
        msg.set_field_by_name("map_field", Value::Map(entries));
    }
    if !slice.is_empty() {
        let items = slice.iter().map(|s| Value::String(s.to_string())).collect();
        msg.set_field_by_name("slice_field", Value::List(items));
    }
    msg
}

/// Reads a string field, panicking on a type mismatch
pub(crate) fn get_str(msg: &DynamicMessage, name: &str) -> String {
    msg.get_field_by_name(name)
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| panic!("field {name} is not a string"))
}

/// Reads a `map<string, string>` field into a sorted vector
pub(crate) fn get_string_map(msg: &DynamicMessage, name: &str) -> Vec<(String, String)> {
    let value = msg
        .get_field_by_name(name)
        .unwrap_or_else(|| panic!("missing field {name}"));
    let mut entries: Vec<(String, String)> = value
        .as_map()
        .expect("map field")
        .iter()
        .map(|(k, v)| match (k, v) {
            (MapKey::String(k), Value::String(v)) => (k.clone(), v.clone()),
            other => panic!("unexpected map entry {other:?}"),
        })
        .collect();
    entries.sort();
    entries
}

/// Reads a `repeated string` field
pub(crate) fn get_string_list(msg: &DynamicMessage, name: &str) -> Vec<String> {
    let value = msg
        .get_field_by_name(name)
        .unwrap_or_else(|| panic!("missing field {name}"));
    value
        .as_list()
        .expect("list field")
        .iter()
        .map(|v| v.as_str().expect("string element").to_string())
        .collect()
}

/// Statically typed counterpart of `SimpleMsg`
#[derive(Clone, PartialEq, prost::Message)]
pub(crate) struct TypedSimpleMsg {
    #[prost(string, tag = "1")]
    pub(crate) plain_field: String,
    #[prost(map = "string, string", tag = "2")]
    pub(crate) map_field: HashMap<String, String>,
    #[prost(string, repeated, tag = "3")]
    pub(crate) slice_field: Vec<String>,
}

impl ReflectMessage for TypedSimpleMsg {
    fn descriptor(&self) -> MessageDescriptor {
        simple_msg()
    }
}
