//! Error types for the protomorph-core library.
//!
//! Conversion errors carry the context a reader needs to find the failing
//! spot in a deeply nested message: every message level the failure passed
//! through prefixes its type name, and field-level failures name the field
//! and, for maps and repeated fields, the offending key or index.

use std::fmt;
use thiserror::Error;

/// Result type alias for protomorph operations
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error returned by user-supplied field transforms and factories
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Direction of a field conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// JSON to message
    PopulateFrom,
    /// Message to JSON
    PopulateTo,
}

impl Direction {
    /// Word joining the field name and the map key in error messages
    fn map_key_joiner(self) -> &'static str {
        match self {
            Direction::PopulateFrom => "with",
            Direction::PopulateTo => "and",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::PopulateFrom => f.write_str("PopulateFrom"),
            Direction::PopulateTo => f.write_str("PopulateTo"),
        }
    }
}

/// Comprehensive error type for all protomorph operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Failure while converting a message, prefixed with its type name
    #[error("{message}: {source}")]
    Message {
        /// Fully-qualified name of the message type
        message: String,
        /// The failure inside the message
        #[source]
        source: Box<Error>,
    },

    /// A field factory claimed a field but could not build a converter for it
    #[error("{0}")]
    Factory(#[source] BoxError),

    /// A singular field failed to convert
    #[error("error in {direction} for field {field} for message {message}: {source}")]
    Field {
        /// Conversion direction
        direction: Direction,
        /// Declared field name
        field: String,
        /// Fully-qualified name of the containing message
        message: String,
        /// Underlying error
        #[source]
        source: BoxError,
    },

    /// A map entry failed to convert
    #[error(
        "error in {direction} for map field {field} {} key {key} for message {message}: {source}",
        .direction.map_key_joiner()
    )]
    MapEntry {
        /// Conversion direction
        direction: Direction,
        /// Declared field name
        field: String,
        /// Map key as rendered in JSON
        key: String,
        /// Fully-qualified name of the containing message
        message: String,
        /// Underlying error
        #[source]
        source: BoxError,
    },

    /// An element of a repeated field failed to convert
    #[error("error in {direction} for slice field {field} at index {index} for message {message}: {source}")]
    SliceEntry {
        /// Conversion direction
        direction: Direction,
        /// Declared field name
        field: String,
        /// Position of the failing element
        index: usize,
        /// Fully-qualified name of the containing message
        message: String,
        /// Underlying error
        #[source]
        source: BoxError,
    },

    /// A JSON value had the wrong shape for the declared field type
    #[error("expected {expected} but got {found}")]
    TypeMismatch {
        /// What the declared type accepts
        expected: String,
        /// JSON kind actually present
        found: &'static str,
    },

    /// A numeric value does not fit the declared width
    #[error("value {value} is out of range for {kind}")]
    OutOfRange {
        /// Declared scalar kind
        kind: &'static str,
        /// Textual form of the rejected value
        value: String,
    },

    /// A value that is not a valid number of the declared kind
    #[error("invalid {kind} value '{value}'")]
    InvalidNumber {
        /// Declared scalar kind
        kind: &'static str,
        /// The rejected text
        value: String,
    },

    /// A JSON object key that cannot be parsed as the declared map key kind
    #[error("invalid map key '{key}' for key type {kind}")]
    InvalidMapKey {
        /// Declared key kind
        kind: &'static str,
        /// The rejected key
        key: String,
    },

    /// An enum name that the enum type does not declare
    #[error("unknown value '{value}' for enum {enum_name}")]
    UnknownEnumValue {
        /// Fully-qualified enum name
        enum_name: String,
        /// The rejected name
        value: String,
    },

    /// A bytes payload that could not be decoded from its text form
    #[error("invalid bytes encoding: {0}")]
    InvalidBytes(String),

    /// Failed to decode the input JSON document
    #[error("error unmarshaling intermediate JSON: {0}")]
    Json(#[source] serde_json::Error),

    /// Failed to serialize the output JSON document
    #[error("error marshaling JSON: {0}")]
    Serialize(#[source] serde_json::Error),

    /// Failed to read the source or write the sink
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to decode a binary message
    #[error("failed to decode message: {0}")]
    Decode(#[from] prost::DecodeError),

    /// Failed to encode a binary message
    #[error("failed to encode message: {0}")]
    Encode(#[from] prost::EncodeError),

    /// Generic internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wraps an error with the type name of the message it occurred in
    pub fn message(message: impl Into<String>, source: Error) -> Self {
        Self::Message {
            message: message.into(),
            source: Box::new(source),
        }
    }

    /// Creates a dispatch-construction error
    pub fn factory(source: impl Into<BoxError>) -> Self {
        Self::Factory(source.into())
    }

    /// Creates a singular field conversion error
    pub fn field(
        direction: Direction,
        field: impl Into<String>,
        message: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Field {
            direction,
            field: field.into(),
            message: message.into(),
            source: source.into(),
        }
    }

    /// Creates a map entry conversion error
    pub fn map_entry(
        direction: Direction,
        field: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::MapEntry {
            direction,
            field: field.into(),
            key: key.into(),
            message: message.into(),
            source: source.into(),
        }
    }

    /// Creates a repeated field element conversion error
    pub fn slice_entry(
        direction: Direction,
        field: impl Into<String>,
        index: usize,
        message: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::SliceEntry {
            direction,
            field: field.into(),
            index,
            message: message.into(),
            source: source.into(),
        }
    }

    /// Creates a type mismatch error for the given JSON value
    pub fn type_mismatch(expected: impl Into<String>, found: &serde_json::Value) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            found: json_kind(found),
        }
    }

    /// Creates an out of range error
    pub fn out_of_range(kind: &'static str, value: impl Into<String>) -> Self {
        Self::OutOfRange {
            kind,
            value: value.into(),
        }
    }

    /// Creates an invalid number error
    pub fn invalid_number(kind: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidNumber {
            kind,
            value: value.into(),
        }
    }

    /// Creates an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns true if the failure came from the data rather than from
    /// reading, writing or the converter setup
    pub fn is_data_error(&self) -> bool {
        match self {
            Self::Message { source, .. } => source.is_data_error(),
            Self::Factory(_) | Self::Io(_) | Self::Serialize(_) | Self::Internal(_) => false,
            _ => true,
        }
    }
}

/// Name of the JSON kind of a value, for error messages
pub(crate) fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_error_display() {
        let err = Error::field(
            Direction::PopulateFrom,
            "plain_field",
            "testprotos.SimpleMsg",
            "boom",
        );
        assert_eq!(
            err.to_string(),
            "error in PopulateFrom for field plain_field for message testprotos.SimpleMsg: boom"
        );
    }

    #[test]
    fn test_map_entry_joiner_depends_on_direction() {
        let from = Error::map_entry(Direction::PopulateFrom, "m", "k", "pkg.Msg", "x");
        let to = Error::map_entry(Direction::PopulateTo, "m", "k", "pkg.Msg", "x");
        assert_eq!(
            from.to_string(),
            "error in PopulateFrom for map field m with key k for message pkg.Msg: x"
        );
        assert_eq!(
            to.to_string(),
            "error in PopulateTo for map field m and key k for message pkg.Msg: x"
        );
    }

    #[test]
    fn test_message_prefix_nests() {
        let inner = Error::message("pkg.Inner", Error::factory("nope"));
        let outer = Error::message("pkg.Outer", inner);
        assert_eq!(outer.to_string(), "pkg.Outer: pkg.Inner: nope");
    }

    #[test]
    fn test_is_data_error() {
        let mismatch = Error::type_mismatch("a string", &serde_json::Value::Null);
        assert!(Error::message("pkg.Msg", mismatch).is_data_error());
        assert!(!Error::message("pkg.Msg", Error::factory("x")).is_data_error());
        assert!(!Error::internal("x").is_data_error());
    }
}
