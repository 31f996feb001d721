use clap::Parser;
use kafka_types::SerializationFormat;
use std::io::Write;
use tokio::sync::broadcast;
use topic_cli::{
    parse_header, run_consume, run_produce, suggestions, Cli, Commands, ConsumeArgs, ProduceArgs,
    TopicCommand,
};
use topic_cli_kafka::{resolve_start_policy, Error, OffsetMode, StartPolicy};
use topic_cli_schema_registry::RegistryError;

fn parse(args: &[&str]) -> Result<TopicCommand, clap::Error> {
    let cli = Cli::try_parse_from(std::iter::once("topic-cli").chain(args.iter().copied()))?;
    match cli.command {
        Commands::Topic { command } => Ok(command),
    }
}

fn produce_args(args: &[&str]) -> ProduceArgs {
    let mut full = vec!["topic", "produce"];
    full.extend_from_slice(args);
    match parse(&full).unwrap() {
        TopicCommand::Produce(args) => args,
        TopicCommand::Consume(_) => panic!("expected produce"),
    }
}

fn consume_args(args: &[&str]) -> ConsumeArgs {
    let mut full = vec!["topic", "consume"];
    full.extend_from_slice(args);
    match parse(&full).unwrap() {
        TopicCommand::Consume(args) => args,
        TopicCommand::Produce(_) => panic!("expected consume"),
    }
}

fn kafka_error(error: &anyhow::Error) -> Option<&Error> {
    error.chain().find_map(|e| e.downcast_ref::<Error>())
}

#[test]
fn test_produce_defaults() {
    let args = produce_args(&["orders", "--bootstrap", "localhost:9092"]);

    assert_eq!(args.topic, "orders");
    assert_eq!(args.key_format, SerializationFormat::String);
    assert_eq!(args.value_format, SerializationFormat::String);
    assert_eq!(args.delimiter, ":");
    assert!(!args.parse_key);
    assert!(args.validate().unwrap().is_empty());
}

#[test]
fn test_produce_parse_key_and_headers() {
    let args = produce_args(&[
        "orders",
        "--bootstrap",
        "localhost:9092",
        "--parse-key",
        "--delimiter",
        "|",
        "--header",
        "source:cli",
        "--header",
        "trace: abc:1",
    ]);

    assert!(args.parse_key);
    assert_eq!(args.delimiter, "|");
    assert_eq!(
        args.validate().unwrap(),
        vec![
            ("source".to_string(), "cli".to_string()),
            ("trace".to_string(), "abc:1".to_string()),
        ]
    );
}

#[test]
fn test_parse_header_rejects_missing_separator() {
    assert!(matches!(
        parse_header("no-separator"),
        Err(Error::ConfigValidation(_))
    ));
    assert!(matches!(parse_header(":value"), Err(Error::ConfigValidation(_))));
}

#[test]
fn test_config_and_config_file_conflict() {
    let err = parse(&[
        "topic",
        "produce",
        "orders",
        "--config",
        "acks=all",
        "--config-file",
        "client.properties",
    ])
    .err()
    .unwrap();
    assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
}

#[test]
fn test_schema_and_schema_id_conflict() {
    let err = parse(&[
        "topic",
        "produce",
        "orders",
        "--value-format",
        "avro",
        "--schema",
        "order.avsc",
        "--schema-id",
        "7",
    ])
    .err()
    .unwrap();
    assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
}

#[test]
fn test_schema_format_requires_schema() {
    let args = produce_args(&["orders", "--value-format", "avro"]);
    assert!(matches!(args.validate(), Err(Error::ConfigValidation(_))));

    let args = produce_args(&["orders", "--schema", "order.avsc"]);
    assert!(matches!(args.validate(), Err(Error::ConfigValidation(_))));

    let args = produce_args(&["orders", "--value-format", "protobuf", "--schema-id", "3"]);
    assert!(args.validate().is_ok());
}

#[test]
fn test_key_schema_requires_parse_key() {
    let args = produce_args(&["orders", "--key-format", "jsonschema", "--key-schema", "k.json"]);
    assert!(matches!(args.validate(), Err(Error::ConfigValidation(_))));

    let args = produce_args(&[
        "orders",
        "--key-format",
        "jsonschema",
        "--key-schema",
        "k.json",
        "--parse-key",
    ]);
    assert!(args.validate().is_ok());
}

#[test]
fn test_connection_settings_merge_file_and_flags() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "# client overrides\nlinger.ms=10\nacks: 1").unwrap();

    let args = produce_args(&[
        "orders",
        "--bootstrap",
        "broker:9092",
        "--config-file",
        file.path().to_str().unwrap(),
    ]);
    let settings = args.connection.settings().unwrap();
    assert_eq!(settings.bootstrap, "broker:9092");
    assert_eq!(
        settings.overrides,
        vec![
            ("linger.ms".to_string(), "10".to_string()),
            ("acks".to_string(), "1".to_string()),
        ]
    );

    let args = produce_args(&[
        "orders",
        "--bootstrap",
        "broker:9092",
        "--config",
        "acks=all,linger.ms=5",
    ]);
    let settings = args.connection.settings().unwrap();
    assert_eq!(settings.overrides.len(), 2);
    assert_eq!(settings.overrides[0], ("acks".to_string(), "all".to_string()));
}

#[test]
fn test_api_key_requires_secret() {
    let args = produce_args(&["orders", "--bootstrap", "broker:9092", "--api-key", "KEY"]);
    assert!(matches!(
        args.connection.settings(),
        Err(Error::ConfigValidation(_))
    ));
}

#[test]
fn test_consume_defaults() {
    let args = consume_args(&["orders"]);

    assert!(args.group.is_none());
    let properties = args.properties();
    assert_eq!(properties.delimiter, "\t");
    assert!(!properties.print_key);
    assert!(!properties.full_header);
    assert!(!properties.timestamp);

    let policy = resolve_start_policy(args.offset_flags(), args.group.is_some()).unwrap();
    assert_eq!(policy.instruction().unwrap().offset_mode, OffsetMode::Latest);
}

#[test]
fn test_consume_offset_and_partition() {
    let args = consume_args(&["orders", "--offset", "5", "--partition", "2", "--print-key"]);

    let policy = resolve_start_policy(args.offset_flags(), false).unwrap();
    let instruction = policy.instruction().unwrap();
    assert_eq!(instruction.offset_mode, OffsetMode::Explicit(5));
    assert_eq!(instruction.partition_filter, Some(2));
    assert!(args.properties().print_key);
}

#[test]
fn test_named_group_resumes_without_start_flags() {
    let args = consume_args(&["orders", "--group", "audit"]);
    let policy = resolve_start_policy(args.offset_flags(), args.group.is_some()).unwrap();
    assert_eq!(policy, StartPolicy::ResumeGroup);

    let args = consume_args(&["orders", "--group", "audit", "--from-beginning"]);
    let policy = resolve_start_policy(args.offset_flags(), args.group.is_some()).unwrap();
    assert_eq!(policy.instruction().unwrap().offset_mode, OffsetMode::Earliest);
}

#[tokio::test]
async fn test_from_beginning_with_offset_fails_before_connecting() {
    // Nothing listens here; reaching the broker would surface a different error.
    let args = consume_args(&[
        "orders",
        "--bootstrap",
        "127.0.0.1:1",
        "--from-beginning",
        "--offset",
        "3",
    ]);
    let (_tx, mut rx) = broadcast::channel(1);

    let err = run_consume(args, &mut rx).await.unwrap_err();
    assert!(matches!(kafka_error(&err), Some(Error::ConfigValidation(_))));
    assert!(!suggestions(&err).is_empty());
}

#[tokio::test]
async fn test_produce_without_bootstrap_fails_validation() {
    let args = produce_args(&["orders", "--bootstrap", ""]);
    let (_tx, mut rx) = broadcast::channel(1);

    let err = run_produce(args, &mut rx).await.unwrap_err();
    assert!(matches!(kafka_error(&err), Some(Error::ConfigValidation(_))));
}

#[tokio::test]
async fn test_schema_format_without_registry_endpoint() {
    let args = produce_args(&[
        "orders",
        "--bootstrap",
        "127.0.0.1:1",
        "--value-format",
        "avro",
        "--schema-id",
        "1",
        "--schema-registry-endpoint",
        "",
    ]);
    let (_tx, mut rx) = broadcast::channel(1);

    let err = run_produce(args, &mut rx).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<RegistryError>(),
        Some(RegistryError::MissingEndpoint)
    ));
    assert_eq!(
        suggestions(&err),
        vec!["Pass --schema-registry-endpoint or set SCHEMA_REGISTRY_ENDPOINT".to_string()]
    );
}

#[test]
fn test_suggestions_for_missing_key() {
    let err = anyhow::Error::new(Error::MissingKey {
        line: 3,
        delimiter: ":".to_string(),
    });
    let hints = suggestions(&err);
    assert_eq!(hints.len(), 2);
    assert!(hints[1].contains("--parse-key"));
}

#[test]
fn test_suggestions_for_registry_auth() {
    let err = anyhow::Error::new(RegistryError::NotAuthenticated("401".to_string()))
        .context("Failed to resolve the value schema for orders");
    assert!(suggestions(&err)[0].contains("--schema-registry-api-key"));

    let err = anyhow::Error::new(Error::Registry(RegistryError::NotAuthenticated(
        "403".to_string(),
    )));
    assert!(suggestions(&err)[0].contains("--schema-registry-api-key"));
}
