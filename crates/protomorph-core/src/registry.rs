//! Ordered registry of field factories.
//!
//! The registry decides which conversion every field gets: factories are
//! asked in registration order, and the first that claims a field builds its
//! [`ProtoField`]. Fields nobody claims fall back to the structural default
//! for their kind.

use crate::error::{Error, Result};
use crate::field::{FieldFactory, ProtoField};
use prost_reflect::{DynamicMessage, FieldDescriptor, ReflectMessage};
use tracing::trace;

/// Ordered collection of [`FieldFactory`] rules
#[derive(Default)]
pub struct FieldRegistry {
    factories: Vec<Box<dyn FieldFactory>>,
}

impl FieldRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a factory after the existing ones
    pub fn with_factory(mut self, factory: impl FieldFactory + 'static) -> Self {
        self.push(factory);
        self
    }

    /// Adds a factory after the existing ones
    pub fn push(&mut self, factory: impl FieldFactory + 'static) {
        self.factories.push(Box::new(factory));
    }

    /// Number of registered factories
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Returns true if no factory is registered
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Builds the converter for one field of a message.
    ///
    /// Fails only when the claiming factory fails to build its converter;
    /// that error carries no field context.
    pub fn resolve(&self, message: &DynamicMessage, field: &FieldDescriptor) -> Result<ProtoField> {
        for (index, factory) in self.factories.iter().enumerate() {
            if factory.handles(message, field) {
                trace!(
                    "Factory {} claims {}.{}",
                    index,
                    message.descriptor().full_name(),
                    field.name()
                );
                return factory.new_proto_field(message, field).map_err(Error::Factory);
            }
        }
        Ok(ProtoField::structural(message, field))
    }
}

impl std::fmt::Debug for FieldRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldRegistry")
            .field("factories", &self.factories.len())
            .finish()
    }
}
