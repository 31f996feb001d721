//! topic-cli library
//!
//! Command-line surface and wiring for the topic data plane:
//!
//! - `topic produce` reads newline-delimited records from stdin and sends
//!   them to a topic, one delivery at a time
//! - `topic consume` subscribes to a topic and prints one line per record
//!
//! The heavy lifting lives in the workspace crates:
//!
//! - `kafka_types` - schema envelope and string/Avro/Protobuf/JSON Schema codecs
//! - `topic_cli_schema_registry` - subject naming, registration and lookup
//! - `topic_cli_kafka` - produce and consume loops, start-offset policy
//!
//! # CLI Usage
//!
//! ```bash
//! # Produce keyed records
//! echo "user-1:hello" | topic-cli topic produce greetings \
//!   --bootstrap localhost:9092 --parse-key --delimiter :
//!
//! # Produce Avro values registered under greetings-value
//! topic-cli topic produce greetings --bootstrap localhost:9092 \
//!   --value-format avro --schema greeting.avsc \
//!   --schema-registry-endpoint http://localhost:8081
//!
//! # Consume partition 2 from offset 5, printing keys
//! topic-cli topic consume greetings --bootstrap localhost:9092 \
//!   --offset 5 --partition 2 --print-key
//! ```

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use kafka_types::{Deserializer, SerializationFormat, Serializer, WireError};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::sync::broadcast;
use topic_cli_kafka::{
    ephemeral_group_id, load_properties_file, parse_config_flags, resolve_start_policy,
    run_consume_loop, run_produce_loop, ClientSettings, ConsumeSummary, ConsumerProperties,
    KafkaRecordSink, KafkaRecordSource, OffsetFlags, ProduceOptions, ProduceSummary,
};
use topic_cli_schema_registry::{
    RegistryConfig, RegistryError, ResolvedSchema, SchemaRegistryClient, SchemaRequest,
    SchemaResolver, SubjectRole,
};
use tracing::info;

#[derive(Parser)]
#[command(name = "topic-cli")]
#[command(about = "Produce to and consume from Kafka topics")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Stream records to and from a topic
    Topic {
        #[command(subcommand)]
        command: TopicCommand,
    },
}

#[derive(Subcommand)]
pub enum TopicCommand {
    /// Produce newline-delimited records from stdin
    Produce(ProduceArgs),
    /// Consume records and print them to stdout
    Consume(ConsumeArgs),
}

/// Broker connection and client property overrides.
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionOpts {
    /// Comma-separated list of broker host:port pairs
    #[arg(long, env = "KAFKA_BOOTSTRAP", default_value = "")]
    pub bootstrap: String,

    /// API key for SASL/PLAIN authentication
    #[arg(long, env = "KAFKA_API_KEY")]
    pub api_key: Option<String>,

    /// API secret for SASL/PLAIN authentication
    #[arg(long, env = "KAFKA_API_SECRET")]
    pub api_secret: Option<String>,

    /// librdkafka properties (format: key=value, comma-separated or repeated)
    #[arg(long, value_name = "KEY=VALUE", conflicts_with = "config_file")]
    pub config: Vec<String>,

    /// Java properties file with librdkafka properties
    #[arg(long, value_name = "PATH")]
    pub config_file: Option<PathBuf>,
}

impl ConnectionOpts {
    pub fn settings(&self) -> topic_cli_kafka::Result<ClientSettings> {
        let mut overrides = match &self.config_file {
            Some(path) => load_properties_file(path)?,
            None => Vec::new(),
        };
        overrides.extend(parse_config_flags(&self.config)?);

        let settings = ClientSettings {
            bootstrap: self.bootstrap.clone(),
            api_key: self.api_key.clone(),
            api_secret: self.api_secret.clone(),
            overrides,
        };
        settings.validate()?;
        Ok(settings)
    }
}

/// Schema registry connection.
#[derive(Args, Debug, Clone, Default)]
pub struct RegistryOpts {
    /// Schema registry base URL
    #[arg(long, env = "SCHEMA_REGISTRY_ENDPOINT")]
    pub schema_registry_endpoint: Option<String>,

    /// Schema registry API key
    #[arg(long, env = "SCHEMA_REGISTRY_API_KEY")]
    pub schema_registry_api_key: Option<String>,

    /// Schema registry API secret
    #[arg(long, env = "SCHEMA_REGISTRY_API_SECRET")]
    pub schema_registry_api_secret: Option<String>,

    /// Registry context that qualifies subjects and schema IDs
    #[arg(long)]
    pub schema_registry_context: Option<String>,
}

impl RegistryOpts {
    pub fn resolver(&self) -> topic_cli_schema_registry::Result<SchemaResolver> {
        let client = SchemaRegistryClient::new(RegistryConfig {
            endpoint: self.schema_registry_endpoint.clone().unwrap_or_default(),
            api_key: self.schema_registry_api_key.clone(),
            api_secret: self.schema_registry_api_secret.clone(),
            context: self.schema_registry_context.clone(),
            timeout: None,
        })?;
        SchemaResolver::new(Arc::new(client))
    }
}

#[derive(Args, Debug, Clone)]
pub struct ProduceArgs {
    /// Topic to produce to
    pub topic: String,

    /// Format of record keys
    #[arg(long, value_enum, default_value_t = SerializationFormat::String)]
    pub key_format: SerializationFormat,

    /// Key schema file to register under <topic>-key
    #[arg(long, value_name = "PATH", conflicts_with = "key_schema_id")]
    pub key_schema: Option<PathBuf>,

    /// Registered key schema ID to use instead of --key-schema
    #[arg(long, value_name = "ID")]
    pub key_schema_id: Option<u32>,

    /// JSON file listing the key schema's references
    #[arg(long, value_name = "PATH")]
    pub key_references: Option<PathBuf>,

    /// Format of record values
    #[arg(long, value_enum, default_value_t = SerializationFormat::String)]
    pub value_format: SerializationFormat,

    /// Value schema file to register under <topic>-value
    #[arg(long, value_name = "PATH", conflicts_with = "schema_id")]
    pub schema: Option<PathBuf>,

    /// Registered value schema ID to use instead of --schema
    #[arg(long, value_name = "ID")]
    pub schema_id: Option<u32>,

    /// JSON file listing the value schema's references
    #[arg(long, value_name = "PATH")]
    pub references: Option<PathBuf>,

    /// Split each line into key and value at the first delimiter
    #[arg(long)]
    pub parse_key: bool,

    /// Key/value delimiter used with --parse-key
    #[arg(long, default_value = ":")]
    pub delimiter: String,

    /// Header attached to every record (format: name:value)
    #[arg(long = "header", value_name = "NAME:VALUE")]
    pub headers: Vec<String>,

    #[command(flatten)]
    pub connection: ConnectionOpts,

    #[command(flatten)]
    pub registry: RegistryOpts,
}

impl ProduceArgs {
    /// Check flag combinations clap cannot express. Returns the parsed headers.
    pub fn validate(&self) -> topic_cli_kafka::Result<Vec<(String, String)>> {
        check_schema_flags(
            "value",
            self.value_format,
            self.schema.is_some() || self.schema_id.is_some(),
            "--schema or --schema-id",
        )?;
        check_schema_flags(
            "key",
            self.key_format,
            self.key_schema.is_some() || self.key_schema_id.is_some(),
            "--key-schema or --key-schema-id",
        )?;

        if !self.parse_key && self.key_format.is_schema_based() {
            return Err(topic_cli_kafka::Error::ConfigValidation(
                "key schemas require --parse-key".to_string(),
            ));
        }
        if self.parse_key && self.delimiter.is_empty() {
            return Err(topic_cli_kafka::Error::ConfigValidation(
                "--delimiter cannot be empty".to_string(),
            ));
        }

        self.headers.iter().map(|h| parse_header(h)).collect()
    }
}

fn check_schema_flags(
    half: &str,
    format: SerializationFormat,
    has_schema: bool,
    flags: &str,
) -> topic_cli_kafka::Result<()> {
    match (format.is_schema_based(), has_schema) {
        (true, false) => Err(topic_cli_kafka::Error::ConfigValidation(format!(
            "{half} format {format} requires {flags}"
        ))),
        (false, true) => Err(topic_cli_kafka::Error::ConfigValidation(format!(
            "{flags} requires a schema-based {half} format (avro, protobuf or jsonschema)"
        ))),
        _ => Ok(()),
    }
}

/// Parse a `--header name:value` flag.
pub fn parse_header(header: &str) -> topic_cli_kafka::Result<(String, String)> {
    match header.split_once(':') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(topic_cli_kafka::Error::ConfigValidation(format!(
            "invalid header '{header}': expected name:value"
        ))),
    }
}

#[derive(Args, Debug, Clone)]
pub struct ConsumeArgs {
    /// Topic to consume from
    pub topic: String,

    /// Consumer group; resumes its committed offsets unless a start flag is given
    #[arg(long)]
    pub group: Option<String>,

    /// Start from the earliest available offset
    #[arg(long)]
    pub from_beginning: bool,

    /// Start from this offset on every consumed partition
    #[arg(long)]
    pub offset: Option<i64>,

    /// Consume only this partition
    #[arg(long)]
    pub partition: Option<i32>,

    /// Print record keys
    #[arg(long)]
    pub print_key: bool,

    /// Print header values without truncation
    #[arg(long)]
    pub full_header: bool,

    /// Print record timestamps
    #[arg(long)]
    pub timestamp: bool,

    /// Separator printed between key and value
    #[arg(long, default_value = "\t")]
    pub delimiter: String,

    /// Format of record keys
    #[arg(long, value_enum, default_value_t = SerializationFormat::String)]
    pub key_format: SerializationFormat,

    /// Format of record values
    #[arg(long, value_enum, default_value_t = SerializationFormat::String)]
    pub value_format: SerializationFormat,

    #[command(flatten)]
    pub connection: ConnectionOpts,

    #[command(flatten)]
    pub registry: RegistryOpts,
}

impl ConsumeArgs {
    pub fn offset_flags(&self) -> OffsetFlags {
        OffsetFlags {
            from_beginning: self.from_beginning,
            offset: self.offset,
            partition: self.partition,
        }
    }

    pub fn properties(&self) -> ConsumerProperties {
        ConsumerProperties {
            print_key: self.print_key,
            full_header: self.full_header,
            timestamp: self.timestamp,
            delimiter: self.delimiter.clone(),
        }
    }
}

async fn resolve_half(
    resolver: Option<&SchemaResolver>,
    request: SchemaRequest<'_>,
) -> anyhow::Result<Option<ResolvedSchema>> {
    let Some(resolver) = resolver else {
        return Ok(None);
    };
    let half = match request.role {
        SubjectRole::Key => "key",
        SubjectRole::Value => "value",
    };
    resolver
        .resolve(&request)
        .await
        .with_context(|| format!("Failed to resolve the {half} schema for {}", request.topic))
}

/// Run `topic produce` with stdin as input.
pub async fn run_produce(
    args: ProduceArgs,
    shutdown: &mut broadcast::Receiver<()>,
) -> anyhow::Result<ProduceSummary> {
    let headers = args.validate()?;
    let settings = args.connection.settings()?;

    let resolver = if args.key_format.is_schema_based() || args.value_format.is_schema_based() {
        Some(args.registry.resolver()?)
    } else {
        None
    };
    let context = args.registry.schema_registry_context.as_deref();

    let key_schema = match args.key_format.schema_type() {
        Some(schema_type) => {
            resolve_half(
                resolver.as_ref(),
                SchemaRequest {
                    topic: &args.topic,
                    role: SubjectRole::Key,
                    schema_type,
                    schema_path: args.key_schema.as_deref(),
                    references_path: args.key_references.as_deref(),
                    schema_id: args.key_schema_id,
                    context,
                },
            )
            .await?
        }
        None => None,
    };
    let value_schema = match args.value_format.schema_type() {
        Some(schema_type) => {
            resolve_half(
                resolver.as_ref(),
                SchemaRequest {
                    topic: &args.topic,
                    role: SubjectRole::Value,
                    schema_type,
                    schema_path: args.schema.as_deref(),
                    references_path: args.references.as_deref(),
                    schema_id: args.schema_id,
                    context,
                },
            )
            .await?
        }
        None => None,
    };

    let key_serializer = Serializer::new(args.key_format, key_schema.as_ref())
        .context("Failed to load the key schema")?;
    let value_serializer = Serializer::new(args.value_format, value_schema.as_ref())
        .context("Failed to load the value schema")?;

    let sink = KafkaRecordSink::new(&settings)?;
    sink.ensure_topic_exists(&args.topic).await?;

    let options = ProduceOptions {
        topic: args.topic.clone(),
        parse_key: args.parse_key,
        delimiter: args.delimiter.clone(),
        headers,
    };
    info!("Producing to {}; finish with Ctrl+D or Ctrl+C", args.topic);

    let stdin = BufReader::new(tokio::io::stdin());
    let summary = run_produce_loop(
        stdin,
        &sink,
        &key_serializer,
        &value_serializer,
        &options,
        shutdown,
    )
    .await?;

    sink.flush()?;
    Ok(summary)
}

/// Run `topic consume` with stdout as output.
pub async fn run_consume(
    args: ConsumeArgs,
    shutdown: &mut broadcast::Receiver<()>,
) -> anyhow::Result<ConsumeSummary> {
    let policy = resolve_start_policy(args.offset_flags(), args.group.is_some())?;
    let settings = args.connection.settings()?;

    let resolver = if args.key_format.is_schema_based() || args.value_format.is_schema_based() {
        Some(Arc::new(args.registry.resolver()?))
    } else {
        None
    };
    let key_deserializer = Deserializer::new(args.key_format, resolver.clone())?;
    let value_deserializer = Deserializer::new(args.value_format, resolver)?;

    let group = args.group.clone().unwrap_or_else(ephemeral_group_id);
    let source = KafkaRecordSource::new(&settings, &group, &args.topic, policy)?;

    let mut stdout = tokio::io::stdout();
    let summary = run_consume_loop(
        &source,
        &key_deserializer,
        &value_deserializer,
        &args.properties(),
        args.partition,
        &mut stdout,
        shutdown,
    )
    .await?;
    Ok(summary)
}

/// Remediation hints for a failed command, empty when there is nothing
/// actionable to say.
pub fn suggestions(error: &anyhow::Error) -> Vec<String> {
    use topic_cli_kafka::Error;

    for cause in error.chain() {
        if let Some(e) = cause.downcast_ref::<Error>() {
            if e.is_registry_auth() {
                return registry_auth_suggestions();
            }
            let hints = match e {
                Error::ConfigValidation(_) => vec![
                    "Run `topic-cli topic <produce|consume> --help` to see valid flag combinations",
                ],
                Error::MissingKey { .. } => vec![
                    "Make sure every input line contains the delimiter",
                    "Use --delimiter to change the delimiter, or drop --parse-key",
                ],
                Error::CompactedTopicProduce { .. } => vec![
                    "Compacted topics only accept records with a key: use --parse-key",
                ],
                Error::TopicNotFound(_) => vec![
                    "Check the topic name and the --bootstrap servers",
                    "Create the topic before producing to it",
                ],
                Error::NotAuthorized(_) => vec![
                    "Check --api-key and --api-secret",
                    "Make sure the API key has ACLs for this topic and consumer group",
                ],
                _ => Vec::new(),
            };
            return hints.iter().map(|h| h.to_string()).collect();
        }
        if let Some(e) = cause.downcast_ref::<RegistryError>() {
            return match e {
                RegistryError::NotAuthenticated(_) => registry_auth_suggestions(),
                RegistryError::MissingEndpoint => vec![
                    "Pass --schema-registry-endpoint or set SCHEMA_REGISTRY_ENDPOINT".to_string(),
                ],
                _ => Vec::new(),
            };
        }
        if let Some(e) = cause.downcast_ref::<WireError>() {
            if e.is_not_authenticated() {
                return registry_auth_suggestions();
            }
        }
    }
    Vec::new()
}

fn registry_auth_suggestions() -> Vec<String> {
    vec![
        "Check --schema-registry-api-key and --schema-registry-api-secret".to_string(),
        "Registry credentials are separate from the broker --api-key".to_string(),
    ]
}
