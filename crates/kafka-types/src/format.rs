use clap::ValueEnum;
use topic_cli_schema_registry::SchemaType;

/// How record keys or values are serialized on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SerializationFormat {
    /// Raw UTF-8 text, no schema envelope
    #[default]
    #[value(name = "string")]
    String,
    #[value(name = "avro")]
    Avro,
    #[value(name = "protobuf")]
    Protobuf,
    #[value(name = "jsonschema")]
    JsonSchema,
}

impl SerializationFormat {
    /// Registry schema type for schema-based formats, `None` for `string`.
    pub fn schema_type(&self) -> Option<SchemaType> {
        match self {
            SerializationFormat::String => None,
            SerializationFormat::Avro => Some(SchemaType::Avro),
            SerializationFormat::Protobuf => Some(SchemaType::Protobuf),
            SerializationFormat::JsonSchema => Some(SchemaType::Json),
        }
    }

    pub fn is_schema_based(&self) -> bool {
        self.schema_type().is_some()
    }

    pub fn name(&self) -> &'static str {
        match self {
            SerializationFormat::String => "string",
            SerializationFormat::Avro => "avro",
            SerializationFormat::Protobuf => "protobuf",
            SerializationFormat::JsonSchema => "jsonschema",
        }
    }
}

impl std::fmt::Display for SerializationFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
