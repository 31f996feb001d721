use kafka_types::WireError;
use thiserror::Error;
use topic_cli_schema_registry::RegistryError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    ConfigValidation(String),

    #[error("Missing key in line {line}: no '{delimiter}' delimiter found")]
    MissingKey { line: usize, delimiter: String },

    #[error("Producing to topic '{topic}' failed: {source}")]
    CompactedTopicProduce {
        topic: String,
        #[source]
        source: rdkafka::error::KafkaError,
    },

    #[error("Topic '{0}' does not exist")]
    TopicNotFound(String),

    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("{0}")]
    Wire(#[from] WireError),

    #[error("{0}")]
    Registry(#[from] RegistryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the schema registry refused our credentials.
    pub fn is_registry_auth(&self) -> bool {
        match self {
            Error::Wire(e) => e.is_not_authenticated(),
            Error::Registry(e) => e.is_not_authenticated(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
