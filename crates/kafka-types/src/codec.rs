//! Record serializers and deserializers.
//!
//! A [`Serializer`] turns one line of user input into record bytes; a
//! [`Deserializer`] turns record bytes back into display text. Both dispatch
//! on [`SerializationFormat`]; schema-based formats frame their payload with
//! the schema envelope.

use crate::avro::AvroCodec;
use crate::envelope;
use crate::error::{Result, WireError};
use crate::format::SerializationFormat;
use crate::json_schema::JsonSchemaCodec;
use crate::proto::ProtobufCodec;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use topic_cli_schema_registry::{ResolvedSchema, SchemaResolver, SchemaType};
use tracing::debug;

/// Payload codec for one schema.
#[derive(Debug)]
pub enum ValueCodec {
    Avro(AvroCodec),
    Protobuf(ProtobufCodec),
    JsonSchema(JsonSchemaCodec),
}

impl ValueCodec {
    /// Build the codec for a resolved schema, by the schema's own type.
    pub fn from_resolved(resolved: &ResolvedSchema) -> Result<Self> {
        Ok(match resolved.schema_type {
            SchemaType::Avro => ValueCodec::Avro(AvroCodec::from_resolved(resolved)?),
            SchemaType::Protobuf => ValueCodec::Protobuf(ProtobufCodec::from_resolved(resolved)?),
            SchemaType::Json => ValueCodec::JsonSchema(JsonSchemaCodec::from_resolved(resolved)?),
        })
    }

    pub fn schema_type(&self) -> SchemaType {
        match self {
            ValueCodec::Avro(_) => SchemaType::Avro,
            ValueCodec::Protobuf(_) => SchemaType::Protobuf,
            ValueCodec::JsonSchema(_) => SchemaType::Json,
        }
    }

    pub fn serialize(&self, json: &Value) -> Result<Vec<u8>> {
        match self {
            ValueCodec::Avro(codec) => codec.serialize(json),
            ValueCodec::Protobuf(codec) => codec.serialize(json),
            ValueCodec::JsonSchema(codec) => codec.serialize(json),
        }
    }

    pub fn deserialize(&self, payload: &[u8]) -> Result<Value> {
        match self {
            ValueCodec::Avro(codec) => codec.deserialize(payload),
            ValueCodec::Protobuf(codec) => codec.deserialize(payload),
            ValueCodec::JsonSchema(codec) => codec.deserialize(payload),
        }
    }
}

/// Encodes text input for one half (key or value) of produced records.
#[derive(Debug)]
pub struct Serializer {
    schema_id: Option<u32>,
    codec: Option<ValueCodec>,
}

impl Serializer {
    /// Plain UTF-8 passthrough.
    pub fn string() -> Self {
        Self {
            schema_id: None,
            codec: None,
        }
    }

    /// Build a serializer for `format`.
    ///
    /// Schema-based formats need a resolved schema; `string` ignores it.
    pub fn new(format: SerializationFormat, resolved: Option<&ResolvedSchema>) -> Result<Self> {
        if !format.is_schema_based() {
            return Ok(Self::string());
        }

        let resolved = resolved.ok_or_else(|| WireError::MissingSchema(format.to_string()))?;
        if Some(resolved.schema_type) != format.schema_type() {
            return Err(WireError::Encode(format!(
                "format {format} cannot use a {} schema",
                resolved.schema_type
            )));
        }

        Ok(Self {
            schema_id: Some(resolved.schema_id),
            codec: Some(ValueCodec::from_resolved(resolved)?),
        })
    }

    pub fn schema_id(&self) -> Option<u32> {
        self.schema_id
    }

    /// Encode one input text. Schema formats parse it as JSON first.
    pub fn encode(&self, text: &str) -> Result<Vec<u8>> {
        let (Some(codec), Some(schema_id)) = (&self.codec, self.schema_id) else {
            return Ok(text.as_bytes().to_vec());
        };

        let json: Value = serde_json::from_str(text)
            .map_err(|e| WireError::Encode(format!("input is not valid JSON: {e}")))?;
        let payload = codec.serialize(&json)?;
        Ok(envelope::wrap(schema_id, &payload))
    }
}

/// A decoded key or value ready to print.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub text: String,
    /// Schema ID from the envelope, for schema-based formats
    pub schema_id: Option<u32>,
}

/// Decodes record bytes for one half (key or value) of consumed records.
///
/// Schemas are looked up by the ID in each record's envelope and cached for
/// the lifetime of the deserializer.
pub struct Deserializer {
    format: SerializationFormat,
    resolver: Option<Arc<SchemaResolver>>,
    cache: Mutex<HashMap<u32, Arc<ValueCodec>>>,
}

impl Deserializer {
    pub fn string() -> Self {
        Self {
            format: SerializationFormat::String,
            resolver: None,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Schema-based formats need a resolver to fetch schemas by ID.
    pub fn new(format: SerializationFormat, resolver: Option<Arc<SchemaResolver>>) -> Result<Self> {
        if format.is_schema_based() && resolver.is_none() {
            return Err(WireError::MissingSchema(format.to_string()));
        }
        Ok(Self {
            format,
            resolver,
            cache: Mutex::new(HashMap::new()),
        })
    }

    pub async fn decode(&self, bytes: &[u8]) -> Result<Decoded> {
        let Some(expected) = self.format.schema_type() else {
            return Ok(Decoded {
                text: String::from_utf8_lossy(bytes).into_owned(),
                schema_id: None,
            });
        };

        let (schema_id, payload) = envelope::unwrap(bytes)?;
        let codec = self.codec_for(schema_id).await?;
        if codec.schema_type() != expected {
            return Err(WireError::Decode(format!(
                "schema {schema_id} is {}, not {}",
                codec.schema_type(),
                self.format
            )));
        }

        let value = codec.deserialize(payload)?;
        Ok(Decoded {
            text: value.to_string(),
            schema_id: Some(schema_id),
        })
    }

    async fn codec_for(&self, schema_id: u32) -> Result<Arc<ValueCodec>> {
        let mut cache = self.cache.lock().await;
        if let Some(codec) = cache.get(&schema_id) {
            return Ok(codec.clone());
        }

        let resolver = self
            .resolver
            .as_ref()
            .ok_or_else(|| WireError::MissingSchema(self.format.to_string()))?;
        let resolved = resolver
            .fetch(schema_id)
            .await
            .map_err(|source| WireError::SchemaLookup { schema_id, source })?;
        debug!("Fetched {} schema {schema_id}", resolved.schema_type);

        let codec = Arc::new(ValueCodec::from_resolved(&resolved)?);
        cache.insert(schema_id, codec.clone());
        Ok(codec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use topic_cli_schema_registry::{
        RegistryError, SchemaDefinition, SchemaReference, SchemaSource,
    };

    const USER_AVSC: &str = r#"{"type": "record", "name": "User", "fields": [{"name": "name", "type": "string"}]}"#;

    struct StaticRegistry {
        schemas: HashMap<u32, SchemaDefinition>,
        lookups: AtomicUsize,
    }

    impl StaticRegistry {
        fn with(id: u32, schema: &str, schema_type: SchemaType) -> Arc<Self> {
            Arc::new(Self {
                schemas: HashMap::from([(
                    id,
                    SchemaDefinition {
                        schema: schema.to_string(),
                        schema_type,
                        references: Vec::new(),
                    },
                )]),
                lookups: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl SchemaSource for StaticRegistry {
        async fn register(
            &self,
            _subject: &str,
            _schema_type: SchemaType,
            _schema: &str,
            _references: &[SchemaReference],
        ) -> topic_cli_schema_registry::Result<u32> {
            Ok(1)
        }

        async fn schema_by_id(&self, id: u32) -> topic_cli_schema_registry::Result<SchemaDefinition> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.schemas.get(&id).cloned().ok_or(RegistryError::Status {
                status: 404,
                error_code: 40403,
                message: format!("Schema {id} not found"),
            })
        }

        async fn schema_by_version(
            &self,
            subject: &str,
            _version: i32,
        ) -> topic_cli_schema_registry::Result<SchemaDefinition> {
            Err(RegistryError::Status {
                status: 404,
                error_code: 40401,
                message: format!("Subject {subject} not found"),
            })
        }
    }

    fn resolved(dir: &Path, id: u32, schema: &str, schema_type: SchemaType) -> ResolvedSchema {
        let schema_path = dir.join(format!("schema-{id}.{}", schema_type.file_extension()));
        std::fs::write(&schema_path, schema).unwrap();
        ResolvedSchema {
            schema_id: id,
            schema_type,
            schema_path,
            reference_dir: dir.to_path_buf(),
            reference_paths: HashMap::new(),
        }
    }

    #[test]
    fn test_string_serializer_passthrough() {
        let serializer = Serializer::string();
        assert_eq!(serializer.encode("a:b").unwrap(), b"a:b");
        assert_eq!(serializer.schema_id(), None);
    }

    #[test]
    fn test_schema_format_without_schema() {
        let err = Serializer::new(SerializationFormat::Avro, None).unwrap_err();
        assert!(matches!(err, WireError::MissingSchema(_)));
    }

    #[test]
    fn test_avro_serializer_frames_payload() {
        let dir = tempfile::tempdir().unwrap();
        let schema = resolved(dir.path(), 42, USER_AVSC, SchemaType::Avro);
        let serializer = Serializer::new(SerializationFormat::Avro, Some(&schema)).unwrap();

        let bytes = serializer.encode(r#"{"name": "ada"}"#).unwrap();
        assert_eq!(&bytes[..5], &[0, 0, 0, 0, 42]);
        // zigzag length 3, then "ada"
        assert_eq!(&bytes[5..], &[6, b'a', b'd', b'a']);
    }

    #[test]
    fn test_serializer_rejects_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let schema = resolved(dir.path(), 42, USER_AVSC, SchemaType::Avro);
        let serializer = Serializer::new(SerializationFormat::Avro, Some(&schema)).unwrap();
        assert!(matches!(
            serializer.encode("not json"),
            Err(WireError::Encode(_))
        ));
    }

    #[test]
    fn test_serializer_rejects_mismatched_schema_type() {
        let dir = tempfile::tempdir().unwrap();
        let schema = resolved(dir.path(), 42, USER_AVSC, SchemaType::Avro);
        assert!(Serializer::new(SerializationFormat::Protobuf, Some(&schema)).is_err());
    }

    #[tokio::test]
    async fn test_string_deserializer_is_lossy_utf8() {
        let deserializer = Deserializer::string();
        let decoded = deserializer.decode(&[b'h', b'i', 0xff]).await.unwrap();
        assert_eq!(decoded.text, "hi\u{fffd}");
        assert_eq!(decoded.schema_id, None);
    }

    #[tokio::test]
    async fn test_avro_round_trip_fetches_schema_once() {
        let registry = StaticRegistry::with(42, USER_AVSC, SchemaType::Avro);
        let resolver = Arc::new(SchemaResolver::new(registry.clone()).unwrap());

        let dir = tempfile::tempdir().unwrap();
        let schema = resolved(dir.path(), 42, USER_AVSC, SchemaType::Avro);
        let serializer = Serializer::new(SerializationFormat::Avro, Some(&schema)).unwrap();
        let bytes = serializer.encode(r#"{"name": "ada"}"#).unwrap();

        let deserializer = Deserializer::new(SerializationFormat::Avro, Some(resolver)).unwrap();
        for _ in 0..3 {
            let decoded = deserializer.decode(&bytes).await.unwrap();
            assert_eq!(decoded.text, r#"{"name":"ada"}"#);
            assert_eq!(decoded.schema_id, Some(42));
        }
        assert_eq!(registry.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_schema_id_is_lookup_error() {
        let registry = StaticRegistry::with(42, USER_AVSC, SchemaType::Avro);
        let resolver = Arc::new(SchemaResolver::new(registry).unwrap());
        let deserializer = Deserializer::new(SerializationFormat::Avro, Some(resolver)).unwrap();

        let err = deserializer.decode(&[0, 0, 0, 0, 9, 1]).await.unwrap_err();
        assert!(matches!(err, WireError::SchemaLookup { schema_id: 9, .. }));
    }

    #[tokio::test]
    async fn test_malformed_envelope() {
        let registry = StaticRegistry::with(42, USER_AVSC, SchemaType::Avro);
        let resolver = Arc::new(SchemaResolver::new(registry).unwrap());
        let deserializer = Deserializer::new(SerializationFormat::Avro, Some(resolver)).unwrap();

        let err = deserializer.decode(b"plain text").await.unwrap_err();
        assert!(matches!(err, WireError::MalformedEnvelope(_)));
    }

    #[tokio::test]
    async fn test_schema_type_mismatch_on_decode() {
        let registry = StaticRegistry::with(7, r#"{"type": "object"}"#, SchemaType::Json);
        let resolver = Arc::new(SchemaResolver::new(registry).unwrap());
        let deserializer = Deserializer::new(SerializationFormat::Avro, Some(resolver)).unwrap();

        let err = deserializer.decode(&[0, 0, 0, 0, 7, b'{', b'}']).await.unwrap_err();
        assert!(matches!(err, WireError::Decode(_)));
    }

    #[tokio::test]
    async fn test_protobuf_round_trip_through_registry() {
        let proto = "syntax = \"proto3\";\nmessage Ping { string id = 1; int64 seq = 2; }";
        let registry = StaticRegistry::with(3, proto, SchemaType::Protobuf);
        let resolver = Arc::new(SchemaResolver::new(registry).unwrap());

        let dir = tempfile::tempdir().unwrap();
        let schema = resolved(dir.path(), 3, proto, SchemaType::Protobuf);
        let serializer = Serializer::new(SerializationFormat::Protobuf, Some(&schema)).unwrap();
        let bytes = serializer.encode(r#"{"id": "p", "seq": 4}"#).unwrap();
        assert_eq!(&bytes[..6], &[0, 0, 0, 0, 3, 0]);

        let deserializer = Deserializer::new(SerializationFormat::Protobuf, Some(resolver)).unwrap();
        let decoded = deserializer.decode(&bytes).await.unwrap();
        assert_eq!(
            serde_json::from_str::<Value>(&decoded.text).unwrap(),
            serde_json::json!({"id": "p", "seq": 4})
        );
    }
}
