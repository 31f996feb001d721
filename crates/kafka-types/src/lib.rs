//! Record wire format for topic-cli.
//!
//! Keys and values are either plain UTF-8 text or schema-framed payloads:
//!
//! ```text
//! [0x00][schema id: u32 big-endian][payload]
//! ```
//!
//! where the payload is an Avro binary datum, a protobuf message prefixed by
//! its message-index path, or JSON text validated against a JSON Schema.
//!
//! # Modules
//!
//! - [`envelope`] - magic byte and schema ID framing
//! - [`format`] - the serialization formats selectable on the command line
//! - [`codec`] - [`Serializer`] and [`Deserializer`] dispatching on format
//! - [`avro`], [`proto`], [`json_schema`] - per-format payload codecs
//! - [`error`] - Error types for framing and conversion
//!
//! # Example
//!
//! ```ignore
//! use kafka_types::{Serializer, SerializationFormat};
//!
//! let serializer = Serializer::new(SerializationFormat::Avro, Some(&resolved))?;
//! let bytes = serializer.encode(r#"{"name": "ada"}"#)?;
//! ```

pub mod avro;
pub mod codec;
pub mod envelope;
pub mod error;
pub mod format;
pub mod json_schema;
pub mod proto;

// Re-export main types for convenient access
pub use codec::{Decoded, Deserializer, Serializer, ValueCodec};
pub use error::{Result, WireError};
pub use format::SerializationFormat;
