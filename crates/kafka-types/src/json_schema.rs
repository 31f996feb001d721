//! JSON Schema payload codec.
//!
//! The payload is the UTF-8 JSON text of the record. Documents are validated
//! against the schema with the `jsonschema` crate before they are produced.
//! Schema references are registered as resources under their reference name,
//! their `$id`, and the name resolved against the root schema's `$id`, so a
//! relative `$ref` finds them. Nothing is fetched over the network.

use crate::error::{Result, WireError};
use jsonschema::{Resource, Validator};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use topic_cli_schema_registry::ResolvedSchema;

/// Base URI `jsonschema` assigns to a schema without `$id`
const DEFAULT_BASE: &str = "json-schema:///";

#[derive(Clone)]
pub struct JsonSchemaCodec {
    validator: Arc<Validator>,
}

impl fmt::Debug for JsonSchemaCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonSchemaCodec").finish_non_exhaustive()
    }
}

impl JsonSchemaCodec {
    pub fn new(schema: &str, references: &[(String, String)]) -> Result<Self> {
        let schema: Value = serde_json::from_str(schema)
            .map_err(|e| WireError::Encode(format!("invalid JSON schema: {e}")))?;

        let root_base = schema
            .get("$id")
            .and_then(Value::as_str)
            .and_then(|id| id.rfind('/').map(|slash| id[..=slash].to_string()));

        let mut options = jsonschema::options();
        for (name, text) in references {
            let doc: Value = serde_json::from_str(text).map_err(|e| {
                WireError::Encode(format!("invalid JSON schema reference {name}: {e}"))
            })?;

            let mut uris = vec![format!("{DEFAULT_BASE}{name}")];
            if let Some(base) = &root_base {
                uris.push(format!("{base}{name}"));
            }
            if let Some(id) = doc.get("$id").and_then(Value::as_str) {
                uris.push(id.to_string());
            }
            uris.dedup();

            for uri in uris {
                let resource = Resource::from_contents(doc.clone()).map_err(|e| {
                    WireError::Encode(format!("invalid JSON schema reference {name}: {e}"))
                })?;
                options.with_resource(uri, resource);
            }
        }

        let validator = options
            .build(&schema)
            .map_err(|e| WireError::Encode(format!("failed to compile JSON schema: {e}")))?;

        Ok(Self {
            validator: Arc::new(validator),
        })
    }

    pub fn from_resolved(resolved: &ResolvedSchema) -> Result<Self> {
        let schema = resolved.read_schema()?;
        let mut references = Vec::with_capacity(resolved.reference_paths.len());
        for (name, path) in &resolved.reference_paths {
            references.push((name.clone(), std::fs::read_to_string(path)?));
        }
        Self::new(&schema, &references)
    }

    pub fn serialize(&self, json: &Value) -> Result<Vec<u8>> {
        let errors: Vec<String> = self
            .validator
            .iter_errors(json)
            .map(|e| match e.instance_path.to_string() {
                path if path.is_empty() => e.to_string(),
                path => format!("{path}: {e}"),
            })
            .collect();

        if !errors.is_empty() {
            return Err(WireError::Encode(format!(
                "document does not match JSON schema: {}",
                errors.join("; ")
            )));
        }

        serde_json::to_vec(json).map_err(|e| WireError::Encode(e.to_string()))
    }

    pub fn deserialize(&self, payload: &[u8]) -> Result<Value> {
        serde_json::from_slice(payload).map_err(|e| WireError::Decode(format!("invalid JSON: {e}")))
    }
}
