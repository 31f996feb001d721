//! Schema registry support for `topic-cli`.
//!
//! - [`client`] - HTTP client for Confluent-compatible registries
//! - [`resolver`] - registers or fetches the schema for a produce command and
//!   materializes references into a scoped temporary directory
//! - [`subject`] - topic-name subject naming strategy
//! - [`source`] - the [`SchemaSource`] seam the wire codec looks schemas up through

pub mod client;
pub mod error;
pub mod resolver;
pub mod source;
pub mod subject;
pub mod types;

pub use client::{RegistryConfig, SchemaRegistryClient};
pub use error::{RegistryError, Result};
pub use resolver::{ResolvedSchema, SchemaRequest, SchemaResolver};
pub use source::SchemaSource;
pub use subject::{topic_subject, SubjectRole};
pub use types::{SchemaDefinition, SchemaReference, SchemaType};
