//! Wire types of the Confluent-compatible schema registry REST API.

use crate::error::{RegistryError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Schema type as named by the registry.
///
/// The registry omits `schemaType` for Avro, so that is the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SchemaType {
    #[default]
    #[serde(rename = "AVRO")]
    Avro,
    #[serde(rename = "PROTOBUF")]
    Protobuf,
    #[serde(rename = "JSON")]
    Json,
}

impl SchemaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaType::Avro => "AVRO",
            SchemaType::Protobuf => "PROTOBUF",
            SchemaType::Json => "JSON",
        }
    }

    /// File extension used when a schema of this type is written to disk.
    pub fn file_extension(&self) -> &'static str {
        match self {
            SchemaType::Avro => "avsc",
            SchemaType::Protobuf => "proto",
            SchemaType::Json => "json",
        }
    }
}

impl std::fmt::Display for SchemaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference from one schema to another registered schema.
///
/// `name` is how the referencing schema imports it (e.g. `"common.proto"`),
/// which is also the file name used in the reference directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaReference {
    pub name: String,
    pub subject: String,
    pub version: i32,
}

impl SchemaReference {
    /// Load a references file: a JSON array of `{name, subject, version}`.
    pub fn load_file(path: &Path) -> Result<Vec<SchemaReference>> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| RegistryError::InvalidReferences {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }
}

/// A schema as stored in the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    pub schema: String,
    #[serde(rename = "schemaType", default)]
    pub schema_type: SchemaType,
    #[serde(default)]
    pub references: Vec<SchemaReference>,
}

#[derive(Debug, Serialize)]
pub(crate) struct RegisterSchemaRequest<'a> {
    pub schema: &'a str,
    #[serde(rename = "schemaType")]
    pub schema_type: SchemaType,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<SchemaReference>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RegisterSchemaResponse {
    pub id: u32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorResponse {
    #[serde(default)]
    pub error_code: i64,
    #[serde(default)]
    pub message: String,
}
