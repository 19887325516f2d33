//! # protomorph-core
//!
//! Deep, field-level conversion between protobuf messages and JSON.
//!
//! This crate provides the core functionality for:
//! - Rendering a message tree as a JSON document and reading it back
//! - Overriding the JSON encoding of individual fields through pluggable
//!   factories, while every other field keeps the canonical shape
//! - Encoding messages that contain maps to repeatable bytes
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`field`]: Per-field conversion capabilities and the factory trait
//! - [`registry`]: Ordered factory dispatch
//! - [`convert`]: The deep marshal/unmarshal engine and its configuration
//! - [`json`]: Precision-preserving document decoding
//! - [`deterministic`]: Repeatable binary encoding
//! - [`factories`]: Ready-made factories (hex bytes, opaque payloads)
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```no_run
//! use protomorph_core::{Converter, HexBytesFieldFactory};
//! use prost_reflect::{DescriptorPool, DynamicMessage};
//! use std::fs;
//!
//! let pool = DescriptorPool::decode(fs::read("descriptors.pb")?.as_slice())?;
//! let descriptor = pool.get_message_by_name("pkg.Envelope").unwrap();
//! let message = DynamicMessage::decode(descriptor, fs::read("envelope.bin")?.as_slice())?;
//!
//! // Render `signature` fields as hex, everything else canonically
//! let converter = Converter::new()
//!     .with_factory(HexBytesFieldFactory::new().with_field("signature"));
//! converter.deep_marshal_json(std::io::stdout(), &message)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Extensibility
//!
//! Implement [`FieldFactory`] to give chosen fields a custom encoding; see
//! the [`field`] module for an example.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod convert;
pub mod deterministic;
pub mod error;
pub mod factories;
pub mod field;
pub mod json;
pub mod registry;

#[cfg(test)]
mod testprotos;

// Re-export primary types for convenience
pub use convert::{deep_marshal_json, deep_unmarshal_json, Converter, ConverterConfig, FieldNaming};
pub use deterministic::mostly_deterministic_marshal;
pub use error::{BoxError, Direction, Error, Result};
pub use factories::{HexBytesFieldFactory, OpaqueFieldFactory};
pub use field::{FieldFactory, FieldKind, MapField, MessageField, PlainField, ProtoField, SliceField};
pub use json::decode_to_mapping;
pub use registry::FieldRegistry;

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
