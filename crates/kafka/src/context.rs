//! Consumer context applying the start policy on partition assignment.

use crate::offsets::{plan_assignment, StartPolicy};
use rdkafka::client::ClientContext;
use rdkafka::consumer::{BaseConsumer, Consumer, ConsumerContext, Rebalance};
use rdkafka::error::{KafkaError, KafkaResult};
use rdkafka::TopicPartitionList;
use tracing::{debug, error, info, warn};

/// Re-assigns every newly assigned partition to the position the start
/// policy asks for. With [`StartPolicy::ResumeGroup`] it leaves the
/// assignment alone.
///
/// Only eager assignment strategies are supported: the override is applied
/// with a full `assign`, not an incremental one.
pub struct AssignmentContext {
    policy: StartPolicy,
}

impl AssignmentContext {
    pub fn new(policy: StartPolicy) -> Self {
        Self { policy }
    }

    /// The assignment to install in place of `assigned`, or `None` to keep it.
    pub fn planned_assignment(
        &self,
        assigned: &TopicPartitionList,
    ) -> KafkaResult<Option<TopicPartitionList>> {
        let Some(instruction) = self.policy.instruction() else {
            return Ok(None);
        };

        let partitions: Vec<(String, i32)> = assigned
            .elements()
            .iter()
            .map(|e| (e.topic().to_string(), e.partition()))
            .collect();

        let mut tpl = TopicPartitionList::new();
        for (topic, partition, mode) in plan_assignment(instruction, &partitions) {
            tpl.add_partition_offset(&topic, partition, mode.to_offset())?;
        }
        Ok(Some(tpl))
    }
}

impl ClientContext for AssignmentContext {
    fn error(&self, error: KafkaError, reason: &str) {
        warn!("Kafka client error: {error}: {reason}");
    }
}

impl ConsumerContext for AssignmentContext {
    fn post_rebalance(&self, base_consumer: &BaseConsumer<Self>, rebalance: &Rebalance<'_>) {
        match rebalance {
            Rebalance::Assign(assigned) => {
                let planned = match self.planned_assignment(assigned) {
                    Ok(Some(planned)) => planned,
                    Ok(None) => {
                        debug!("Resuming group offsets for {} partitions", assigned.count());
                        return;
                    }
                    Err(e) => {
                        error!("Failed to plan partition assignment: {e}");
                        return;
                    }
                };

                for elem in planned.elements() {
                    info!(
                        "Starting {}[{}] at {:?}",
                        elem.topic(),
                        elem.partition(),
                        elem.offset()
                    );
                }
                if let Err(e) = base_consumer.assign(&planned) {
                    error!("Failed to apply partition assignment: {e}");
                }
            }
            Rebalance::Revoke(revoked) => {
                debug!("Partitions revoked: {}", revoked.count());
            }
            Rebalance::Error(e) => {
                warn!("Rebalance error: {e}");
            }
        }
    }
}
