//! Error types for the record wire format.

use thiserror::Error;
use topic_cli_schema_registry::RegistryError;

/// Errors that can occur while framing, encoding or decoding records.
#[derive(Error, Debug)]
pub enum WireError {
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Failed to look up schema {schema_id}: {source}")]
    SchemaLookup {
        schema_id: u32,
        #[source]
        source: RegistryError,
    },

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Protobuf parse error: {0}")]
    ProtobufParse(String),

    #[error("Message type not found: {0}")]
    MessageTypeNotFound(String),

    #[error("Format {0} requires a schema")]
    MissingSchema(String),

    #[error("Schema registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WireError {
    /// Whether the failure came from the registry refusing our credentials.
    pub fn is_not_authenticated(&self) -> bool {
        match self {
            WireError::SchemaLookup { source, .. } | WireError::Registry(source) => {
                source.is_not_authenticated()
            }
            _ => false,
        }
    }
}

/// Result type alias for wire format operations.
pub type Result<T> = std::result::Result<T, WireError>;
