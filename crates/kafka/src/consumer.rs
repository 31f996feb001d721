//! Consume loop: broker records to rendered text lines.

use crate::config::ClientSettings;
use crate::context::AssignmentContext;
use crate::error::{Error, Result};
use crate::offsets::{OffsetMode, StartPolicy};
use crate::render::{render_record, ConsumerProperties, RecordView};
use async_trait::async_trait;
use kafka_types::Deserializer;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::{Headers, Message};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Prefix of generated consumer group names.
pub const EPHEMERAL_GROUP_PREFIX: &str = "topic_cli_consumer_";

/// A fresh consumer group name, so nothing is resumed.
pub fn ephemeral_group_id() -> String {
    format!("{EPHEMERAL_GROUP_PREFIX}{}", uuid::Uuid::new_v4())
}

/// An owned copy of one polled record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InboundRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    /// `None` for tombstones
    pub payload: Option<Vec<u8>>,
    /// Milliseconds since epoch
    pub timestamp: Option<i64>,
    pub headers: Vec<(String, Option<Vec<u8>>)>,
}

/// Where consumed records come from.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Wait for the next record.
    async fn next_record(&self) -> std::result::Result<InboundRecord, KafkaError>;

    /// Leave the group. Called once when the loop ends.
    fn close(&self);
}

/// [`RecordSource`] backed by an rdkafka [`StreamConsumer`] whose context
/// applies the start policy on every assignment.
pub struct KafkaRecordSource {
    consumer: StreamConsumer<AssignmentContext>,
}

impl KafkaRecordSource {
    pub fn new(
        settings: &ClientSettings,
        group_id: &str,
        topic: &str,
        policy: StartPolicy,
    ) -> Result<Self> {
        settings.validate()?;

        let reset = match policy.instruction().map(|i| i.offset_mode) {
            Some(OffsetMode::Earliest) => "earliest",
            _ => "latest",
        };
        let consumer: StreamConsumer<AssignmentContext> = settings
            .client_config(&[
                ("session.timeout.ms", "45000"),
                ("enable.partition.eof", "false"),
                ("auto.offset.reset", reset),
            ])
            .set("group.id", group_id)
            .create_with_context(AssignmentContext::new(policy))?;

        consumer.subscribe(&[topic])?;
        info!("Subscribed to {topic} as group {group_id}");

        Ok(Self { consumer })
    }
}

#[async_trait]
impl RecordSource for KafkaRecordSource {
    async fn next_record(&self) -> std::result::Result<InboundRecord, KafkaError> {
        let message = self.consumer.recv().await?;

        let headers = message
            .headers()
            .map(|headers| {
                headers
                    .iter()
                    .map(|h| (h.key.to_string(), h.value.map(<[u8]>::to_vec)))
                    .collect()
            })
            .unwrap_or_default();

        Ok(InboundRecord {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            key: message.key().map(<[u8]>::to_vec),
            payload: message.payload().map(<[u8]>::to_vec),
            timestamp: message.timestamp().to_millis(),
            headers,
        })
    }

    fn close(&self) {
        self.consumer.unsubscribe();
        debug!("Unsubscribed");
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumeSummary {
    pub emitted: u64,
    pub skipped: u64,
}

fn authorization_error(error: &KafkaError) -> bool {
    matches!(
        error.rdkafka_error_code(),
        Some(
            RDKafkaErrorCode::TopicAuthorizationFailed
                | RDKafkaErrorCode::GroupAuthorizationFailed
        )
    )
}

/// Poll `source` and write one rendered record per line to `out` until
/// `shutdown` fires.
///
/// Records that fail to decode are reported and skipped. Records from
/// partitions other than `partition_filter` are never written.
#[allow(clippy::too_many_arguments)]
pub async fn run_consume_loop<S, W>(
    source: &S,
    key_deserializer: &Deserializer,
    value_deserializer: &Deserializer,
    properties: &ConsumerProperties,
    partition_filter: Option<i32>,
    out: &mut W,
    shutdown: &mut broadcast::Receiver<()>,
) -> Result<ConsumeSummary>
where
    S: RecordSource + ?Sized,
    W: AsyncWrite + Unpin,
{
    let mut summary = ConsumeSummary::default();

    let result = loop {
        let polled = tokio::select! {
            biased;
            _ = shutdown.recv() => {
                info!("Stopping consumer");
                break Ok(());
            }
            polled = source.next_record() => polled,
        };

        let record = match polled {
            Ok(record) => record,
            Err(e) if authorization_error(&e) => {
                break Err(Error::NotAuthorized(e.to_string()));
            }
            Err(e) => {
                warn!("Consumer error: {e}");
                continue;
            }
        };

        if partition_filter.is_some_and(|p| p != record.partition) {
            debug!(
                "Ignoring record from {}[{}] outside the partition filter",
                record.topic, record.partition
            );
            continue;
        }

        match write_record(&record, key_deserializer, value_deserializer, properties, out).await {
            Ok(()) => summary.emitted += 1,
            Err(Error::Wire(e)) => {
                summary.skipped += 1;
                warn!(
                    "Skipping record {}[{}]@{}: {e}",
                    record.topic, record.partition, record.offset
                );
            }
            Err(e) => break Err(e),
        }
    };

    source.close();
    result.map(|()| summary)
}

async fn write_record<W: AsyncWrite + Unpin>(
    record: &InboundRecord,
    key_deserializer: &Deserializer,
    value_deserializer: &Deserializer,
    properties: &ConsumerProperties,
    out: &mut W,
) -> Result<()> {
    // Keys are only decoded when printed, so a bad key never hides a value.
    let key = match (&record.key, properties.print_key) {
        (Some(bytes), true) => Some(key_deserializer.decode(bytes).await?.text),
        _ => None,
    };
    let value = match &record.payload {
        Some(bytes) => Some(value_deserializer.decode(bytes).await?.text),
        None => None,
    };

    let mut line = render_record(
        properties,
        &RecordView {
            key: key.as_deref(),
            value: value.as_deref(),
            timestamp: record.timestamp,
            headers: &record.headers,
        },
    );
    line.push('\n');

    out.write_all(line.as_bytes()).await?;
    out.flush().await?;
    Ok(())
}
