//! Deep, field-level conversion between messages and JSON.
//!
//! A [`Converter`] walks every declared field of a message, resolves a
//! [`ProtoField`](crate::field::ProtoField) for it through its
//! [`FieldRegistry`], and drives the conversion in either direction.
//! Submessages recurse back into the same converter, so custom factories
//! apply at every depth.
//!
//! ## JSON shape
//!
//! - message fields appear in schema declaration order
//! - map entries appear in ascending key order
//! - repeated values appear in index order
//!
//! ## Example
//!
//! ```no_run
//! use protomorph_core::{Converter, ConverterConfig, FieldNaming};
//! use prost_reflect::{DescriptorPool, DynamicMessage};
//!
//! let pool = DescriptorPool::decode(std::fs::read("descriptors.pb")?.as_slice())?;
//! let descriptor = pool.get_message_by_name("pkg.Msg").unwrap();
//!
//! let converter = Converter::new()
//!     .with_config(ConverterConfig::new().field_naming(FieldNaming::Json));
//!
//! let mut msg = DynamicMessage::new(descriptor);
//! converter.deep_unmarshal_json(std::io::stdin(), &mut msg)?;
//! converter.deep_marshal_json(std::io::stdout(), &msg)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::error::{Error, Result};
use crate::field::FieldFactory;
use crate::json;
use crate::registry::FieldRegistry;
use prost_reflect::{DynamicMessage, FieldDescriptor, MessageDescriptor, ReflectMessage};
use serde_json::{Map, Value as Json};
use std::io::{Read, Write};
use tracing::{debug, trace};

/// How fields are named in the JSON document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldNaming {
    /// The declared field name, e.g. `plain_field`
    #[default]
    Proto,
    /// The lowerCamelCase JSON name, e.g. `plainField`
    Json,
}

impl FieldNaming {
    /// The JSON object key for a field
    pub fn key<'a>(&self, field: &'a FieldDescriptor) -> &'a str {
        match self {
            FieldNaming::Proto => field.name(),
            FieldNaming::Json => field.json_name(),
        }
    }
}

/// Configuration for JSON conversion
#[derive(Debug, Clone)]
pub struct ConverterConfig {
    /// Indentation string for pretty output (default: one tab)
    pub indent_str: String,
    /// Pretty-print the output document
    pub pretty: bool,
    /// Emit fields without explicit presence even when they hold their default
    pub emit_defaults: bool,
    /// JSON key naming for output
    pub field_naming: FieldNaming,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            indent_str: "\t".to_string(),
            pretty: true,
            emit_defaults: false,
            field_naming: FieldNaming::Proto,
        }
    }
}

impl ConverterConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the indentation string
    pub fn indent_str(mut self, s: impl Into<String>) -> Self {
        self.indent_str = s.into();
        self
    }

    /// Sets whether to pretty-print the output
    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    /// Sets whether to emit fields holding their default value
    pub fn emit_defaults(mut self, emit: bool) -> Self {
        self.emit_defaults = emit;
        self
    }

    /// Sets the JSON key naming
    pub fn field_naming(mut self, naming: FieldNaming) -> Self {
        self.field_naming = naming;
        self
    }
}

/// Deep marshal/unmarshal engine
#[derive(Debug, Default)]
pub struct Converter {
    registry: FieldRegistry,
    config: ConverterConfig,
}

impl Converter {
    /// Creates a converter with no custom factories and default config
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the configuration
    pub fn with_config(mut self, config: ConverterConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the field registry
    pub fn with_registry(mut self, registry: FieldRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Adds a factory after the registered ones
    pub fn with_factory(mut self, factory: impl FieldFactory + 'static) -> Self {
        self.registry.push(factory);
        self
    }

    /// The active configuration
    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    /// The field registry
    pub fn registry(&self) -> &FieldRegistry {
        &self.registry
    }

    /// Writes the JSON document of a message to `sink`
    pub fn deep_marshal_json<W, M>(&self, sink: W, message: &M) -> Result<()>
    where
        W: Write,
        M: ReflectMessage,
    {
        let dynamic = to_dynamic(message)?;
        debug!(
            "Marshaling {} ({} fields)",
            dynamic.descriptor().full_name(),
            dynamic.descriptor().fields().len()
        );

        let tree = self.marshal_tree(&dynamic)?;
        json::write_document(sink, &Json::Object(tree), &self.config)?;

        debug!("Marshaled {}", dynamic.descriptor().full_name());
        Ok(())
    }

    /// Populates `message` from a JSON document read from `source`.
    ///
    /// Keys that name no field of the target are ignored. On error
    /// `message` is left exactly as it was.
    pub fn deep_unmarshal_json<R: Read>(&self, mut source: R, message: &mut DynamicMessage) -> Result<()> {
        let descriptor = message.descriptor();
        debug!(
            "Unmarshaling {} ({} fields)",
            descriptor.full_name(),
            descriptor.fields().len()
        );

        let mut buf = Vec::new();
        source.read_to_end(&mut buf)?;
        let tree = json::decode_to_mapping(&buf)?;

        let mut staged = message.clone();
        self.populate_from_tree(tree, &mut staged)?;
        *message = staged;

        debug!("Unmarshaled {}", descriptor.full_name());
        Ok(())
    }

    /// Decodes a JSON document into a fresh message of a statically known type
    pub fn deep_unmarshal_json_into<M, R>(&self, source: R) -> Result<M>
    where
        M: ReflectMessage + Default,
        R: Read,
    {
        let mut dynamic = DynamicMessage::new(M::default().descriptor());
        self.deep_unmarshal_json(source, &mut dynamic)?;
        Ok(dynamic.transcode_to::<M>()?)
    }

    /// Builds the JSON object for a message without serializing it.
    ///
    /// Errors are prefixed with the message's type name.
    pub fn marshal_tree(&self, message: &DynamicMessage) -> Result<Map<String, Json>> {
        self.marshal_fields(message)
            .map_err(|e| Error::message(message.descriptor().full_name(), e))
    }

    /// Populates a message from an already decoded JSON object.
    ///
    /// Errors are prefixed with the message's type name. Fields converted
    /// before a failure stay set.
    pub fn populate_from_tree(&self, tree: Map<String, Json>, message: &mut DynamicMessage) -> Result<()> {
        let descriptor = message.descriptor();
        self.populate_fields(tree, message)
            .map_err(|e| Error::message(descriptor.full_name(), e))
    }

    fn marshal_fields(&self, message: &DynamicMessage) -> Result<Map<String, Json>> {
        let descriptor = message.descriptor();

        // Every declared field is resolved before any is converted, so a
        // failing factory is reported even for fields that are unset.
        let mut resolved = Vec::new();
        for field in declared_fields(&descriptor) {
            resolved.push(self.registry.resolve(message, &field)?);
        }

        let mut tree = Map::new();
        for proto_field in resolved {
            let field = proto_field.descriptor().clone();
            if !self.should_emit(message, &field) {
                continue;
            }
            trace!("PopulateTo {}.{}", descriptor.full_name(), field.name());
            let value = proto_field.populate_to(self, message)?;
            tree.insert(self.config.field_naming.key(&field).to_string(), value);
        }
        Ok(tree)
    }

    fn populate_fields(&self, mut tree: Map<String, Json>, message: &mut DynamicMessage) -> Result<()> {
        let descriptor = message.descriptor();

        let mut resolved = Vec::new();
        for field in declared_fields(&descriptor) {
            resolved.push(self.registry.resolve(message, &field)?);
        }

        for proto_field in resolved {
            let field = proto_field.descriptor().clone();
            let by_name = tree.remove(field.name());
            let by_json_name = tree.remove(field.json_name());
            let Some(source) = by_name.or(by_json_name) else {
                continue;
            };
            trace!("PopulateFrom {}.{}", descriptor.full_name(), field.name());
            proto_field.populate_from(self, message, source)?;
        }

        for key in tree.keys() {
            trace!("Ignoring unknown key {} for {}", key, descriptor.full_name());
        }
        Ok(())
    }

    fn should_emit(&self, message: &DynamicMessage, field: &FieldDescriptor) -> bool {
        message.has_field(field) || (self.config.emit_defaults && !field.supports_presence())
    }
}

/// Declared fields of a message in schema declaration order
pub(crate) fn declared_fields(descriptor: &MessageDescriptor) -> Vec<FieldDescriptor> {
    descriptor
        .descriptor_proto()
        .field
        .iter()
        .filter_map(|f| u32::try_from(f.number()).ok())
        .filter_map(|number| descriptor.get_field(number))
        .collect()
}

/// Converts any reflectable message into a dynamic one through its encoding
pub(crate) fn to_dynamic<M: ReflectMessage>(message: &M) -> Result<DynamicMessage> {
    let mut dynamic = DynamicMessage::new(message.descriptor());
    dynamic.transcode_from(message)?;
    Ok(dynamic)
}

/// Writes the JSON document of a message using a default converter
pub fn deep_marshal_json<W: Write, M: ReflectMessage>(sink: W, message: &M) -> Result<()> {
    Converter::new().deep_marshal_json(sink, message)
}

/// Populates a message from a JSON document using a default converter
pub fn deep_unmarshal_json<R: Read>(source: R, message: &mut DynamicMessage) -> Result<()> {
    Converter::new().deep_unmarshal_json(source, message)
}
