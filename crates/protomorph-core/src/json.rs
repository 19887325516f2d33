//! JSON document decoding and encoding.
//!
//! Documents are decoded with `serde_json`'s `arbitrary_precision` feature,
//! so every number keeps the exact text it was written with. Conversion to
//! a machine integer or float happens only at field assignment, where the
//! declared width is known. Object keys keep their document order.

use crate::convert::ConverterConfig;
use crate::error::{Error, Result};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Serializer, Value as Json};
use std::io::Write;

/// Decodes a JSON document whose top level must be an object
pub fn decode_to_mapping(bytes: &[u8]) -> Result<Map<String, Json>> {
    serde_json::from_slice(bytes).map_err(Error::Json)
}

/// Serializes a JSON value to `sink` followed by a newline
pub(crate) fn write_document<W: Write>(mut sink: W, document: &Json, config: &ConverterConfig) -> Result<()> {
    if config.pretty {
        let formatter = PrettyFormatter::with_indent(config.indent_str.as_bytes());
        let mut serializer = Serializer::with_formatter(&mut sink, formatter);
        document.serialize(&mut serializer).map_err(Error::Serialize)?;
    } else {
        serde_json::to_writer(&mut sink, document).map_err(Error::Serialize)?;
    }
    sink.write_all(b"\n")?;
    sink.flush()?;
    Ok(())
}
