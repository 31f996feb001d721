//! Produce loop: newline-delimited input to broker records.
//!
//! Each non-empty line becomes one record. The loop waits for the delivery
//! result of a record before reading the next line, so at most one record is
//! in flight and every delivery error is attributed to its input line.

use crate::config::ClientSettings;
use crate::error::{Error, Result};
use async_trait::async_trait;
use kafka_types::Serializer;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::types::RDKafkaRespErr;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);
const METADATA_TIMEOUT: Duration = Duration::from_secs(10);

/// One encoded record ready to send.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRecord {
    pub key: Option<Vec<u8>>,
    pub value: Vec<u8>,
    pub headers: Vec<(String, Vec<u8>)>,
}

/// Result of sending one record.
#[derive(Debug)]
pub struct DeliveryOutcome {
    pub topic: String,
    /// -1 when the record never reached a partition
    pub partition: i32,
    pub offset: i64,
    pub error: Option<KafkaError>,
}

impl DeliveryOutcome {
    pub fn delivered(topic: &str, partition: i32, offset: i64) -> Self {
        Self {
            topic: topic.to_string(),
            partition,
            offset,
            error: None,
        }
    }

    pub fn failed(topic: &str, error: KafkaError) -> Self {
        Self {
            topic: topic.to_string(),
            partition: -1,
            offset: -1,
            error: Some(error),
        }
    }
}

/// Where produced records go.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Send one record and wait for its delivery result.
    async fn send(&self, topic: &str, record: OutboundRecord) -> DeliveryOutcome;
}

/// [`RecordSink`] backed by an rdkafka [`FutureProducer`].
pub struct KafkaRecordSink {
    producer: FutureProducer,
}

impl KafkaRecordSink {
    pub fn new(settings: &ClientSettings) -> Result<Self> {
        settings.validate()?;
        let producer: FutureProducer = settings
            .client_config(&[("message.timeout.ms", "30000")])
            .create()?;
        Ok(Self { producer })
    }

    /// Fail early when `topic` is unknown to the cluster.
    pub async fn ensure_topic_exists(&self, topic: &str) -> Result<()> {
        let producer = self.producer.clone();
        let name = topic.to_string();
        let metadata = tokio::task::spawn_blocking(move || {
            producer
                .client()
                .fetch_metadata(Some(name.as_str()), METADATA_TIMEOUT)
        })
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))??;

        let Some(found) = metadata.topics().iter().find(|t| t.name() == topic) else {
            return Err(Error::TopicNotFound(topic.to_string()));
        };
        match found.error() {
            Some(RDKafkaRespErr::RD_KAFKA_RESP_ERR_TOPIC_AUTHORIZATION_FAILED) => Err(
                Error::NotAuthorized(format!("not allowed to describe topic '{topic}'")),
            ),
            Some(_) => Err(Error::TopicNotFound(topic.to_string())),
            None if found.partitions().is_empty() => Err(Error::TopicNotFound(topic.to_string())),
            None => Ok(()),
        }
    }

    pub fn flush(&self) -> Result<()> {
        self.producer.flush(DELIVERY_TIMEOUT)?;
        Ok(())
    }
}

#[async_trait]
impl RecordSink for KafkaRecordSink {
    async fn send(&self, topic: &str, record: OutboundRecord) -> DeliveryOutcome {
        let mut headers = OwnedHeaders::new_with_capacity(record.headers.len());
        for (name, value) in &record.headers {
            headers = headers.insert(Header {
                key: name,
                value: Some(value),
            });
        }

        let mut future_record = FutureRecord::<[u8], [u8]>::to(topic)
            .payload(record.value.as_slice())
            .headers(headers);
        if let Some(key) = &record.key {
            future_record = future_record.key(key.as_slice());
        }

        match self.producer.send(future_record, DELIVERY_TIMEOUT).await {
            Ok((partition, offset)) => DeliveryOutcome::delivered(topic, partition, offset),
            Err((error, _message)) => DeliveryOutcome::failed(topic, error),
        }
    }
}

/// How input lines become records.
#[derive(Debug, Clone)]
pub struct ProduceOptions {
    pub topic: String,
    pub parse_key: bool,
    pub delimiter: String,
    /// Attached to every record
    pub headers: Vec<(String, String)>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProduceSummary {
    pub produced: u64,
    pub failed: u64,
}

/// Key and value text of one input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedLine<'a> {
    pub key: Option<&'a str>,
    pub value: &'a str,
}

/// Split one trimmed, non-empty input line into key and value.
///
/// With `parse_key` the key is the text before the first `delimiter` and the
/// value is the trimmed remainder; a line without the delimiter is an error.
pub fn parse_line<'a>(
    line: &'a str,
    line_number: usize,
    parse_key: bool,
    delimiter: &str,
) -> Result<ParsedLine<'a>> {
    if !parse_key {
        return Ok(ParsedLine {
            key: None,
            value: line,
        });
    }

    match line.split_once(delimiter) {
        Some((key, value)) => Ok(ParsedLine {
            key: Some(key),
            value: value.trim(),
        }),
        None => Err(Error::MissingKey {
            line: line_number,
            delimiter: delimiter.to_string(),
        }),
    }
}

/// Delivery errors after which no further record can succeed.
fn fatal_delivery_error(error: &KafkaError) -> bool {
    matches!(
        error.rdkafka_error_code(),
        Some(
            RDKafkaErrorCode::InvalidRecord
                | RDKafkaErrorCode::InvalidConfig
                | RDKafkaErrorCode::PolicyViolation
        )
    )
}

fn authorization_error(error: &KafkaError) -> bool {
    matches!(
        error.rdkafka_error_code(),
        Some(RDKafkaErrorCode::TopicAuthorizationFailed)
    )
}

/// Read `input` line by line and produce each record to `options.topic`.
///
/// Returns at end of input or when `shutdown` fires. A shutdown never
/// interrupts a record between encoding and its delivery result.
pub async fn run_produce_loop<R, S>(
    input: R,
    sink: &S,
    key_serializer: &Serializer,
    value_serializer: &Serializer,
    options: &ProduceOptions,
    shutdown: &mut broadcast::Receiver<()>,
) -> Result<ProduceSummary>
where
    R: AsyncBufRead + Unpin,
    S: RecordSink + ?Sized,
{
    let headers: Vec<(String, Vec<u8>)> = options
        .headers
        .iter()
        .map(|(name, value)| (name.clone(), value.as_bytes().to_vec()))
        .collect();

    let mut lines = input.lines();
    let mut line_number = 0usize;
    let mut summary = ProduceSummary::default();

    loop {
        let line = tokio::select! {
            biased;
            _ = shutdown.recv() => {
                info!("Stopping producer");
                break;
            }
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            debug!("End of input after {line_number} lines");
            break;
        };
        line_number += 1;

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let parsed = parse_line(trimmed, line_number, options.parse_key, &options.delimiter)?;
        let key = parsed
            .key
            .map(|k| key_serializer.encode(k))
            .transpose()?;
        let value = value_serializer.encode(parsed.value)?;

        let record = OutboundRecord {
            key,
            value,
            headers: headers.clone(),
        };
        let outcome = sink.send(&options.topic, record).await;

        match outcome.error {
            None => {
                summary.produced += 1;
                debug!(
                    "Produced line {line_number} to {}[{}] at offset {}",
                    outcome.topic, outcome.partition, outcome.offset
                );
            }
            Some(error) if fatal_delivery_error(&error) => {
                return Err(Error::CompactedTopicProduce {
                    topic: options.topic.clone(),
                    source: error,
                });
            }
            Some(error) if authorization_error(&error) => {
                return Err(Error::NotAuthorized(format!(
                    "not allowed to write to topic '{}': {error}",
                    options.topic
                )));
            }
            Some(error) => {
                summary.failed += 1;
                warn!("Failed to produce line {line_number}: {error}");
            }
        }
    }

    Ok(summary)
}
