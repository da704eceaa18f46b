//! Consumer lag probe for queue-depth metrics.
//!
//! Reports how far a consumer group trails the high watermarks of its
//! topics. The consumer loop exposes this as the `consumer.queue_depth`
//! gauge; a steadily growing value means the read model is falling behind
//! the command side.

use atelier_core::event_bus::EventBusError;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, Consumer};
use rdkafka::topic_partition_list::TopicPartitionList;
use rdkafka::Offset;
use std::time::Duration;

/// Probes total consumer-group lag across a set of topics.
///
/// All calls are blocking (librdkafka metadata round-trips); callers on an
/// async runtime should wrap them in `spawn_blocking`.
pub struct QueueDepthProbe {
    consumer: BaseConsumer,
    topics: Vec<String>,
    timeout: Duration,
}

impl QueueDepthProbe {
    /// Create a probe for the given consumer group and topics.
    ///
    /// The probe joins no group and commits nothing; the `group.id` is only
    /// used to look up committed offsets.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if the underlying client
    /// cannot be created.
    pub fn new(
        brokers: &str,
        consumer_group: &str,
        topics: &[&str],
    ) -> Result<Self, EventBusError> {
        let consumer: BaseConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", consumer_group)
            .set("enable.auto.commit", "false")
            .create()
            .map_err(|e| {
                EventBusError::ConnectionFailed(format!("Failed to create probe consumer: {e}"))
            })?;

        Ok(Self {
            consumer,
            topics: topics.iter().map(|s| (*s).to_string()).collect(),
            timeout: Duration::from_secs(5),
        })
    }

    /// Total lag (messages behind the high watermark) across all partitions
    /// of all probed topics.
    ///
    /// A partition with no committed offset counts its full retained range.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::TransportError`] if metadata or watermark
    /// queries fail.
    pub fn total_lag(&self) -> Result<i64, EventBusError> {
        let mut assignment = TopicPartitionList::new();

        for topic in &self.topics {
            let metadata = self
                .consumer
                .fetch_metadata(Some(topic), self.timeout)
                .map_err(|e| {
                    EventBusError::TransportError(format!("Failed to fetch metadata: {e}"))
                })?;

            for meta_topic in metadata.topics() {
                for partition in meta_topic.partitions() {
                    assignment
                        .add_partition_offset(meta_topic.name(), partition.id(), Offset::Invalid)
                        .map_err(|e| {
                            EventBusError::TransportError(format!(
                                "Failed to build partition list: {e}"
                            ))
                        })?;
                }
            }
        }

        let committed = self
            .consumer
            .committed_offsets(assignment, self.timeout)
            .map_err(|e| {
                EventBusError::TransportError(format!("Failed to fetch committed offsets: {e}"))
            })?;

        let mut total_lag = 0i64;

        for element in committed.elements() {
            let (low, high) = self
                .consumer
                .fetch_watermarks(element.topic(), element.partition(), self.timeout)
                .map_err(|e| {
                    EventBusError::TransportError(format!("Failed to fetch watermarks: {e}"))
                })?;

            let consumed = match element.offset() {
                Offset::Offset(o) => o,
                _ => low,
            };

            total_lag += (high - consumed).max(0);
        }

        Ok(total_lag)
    }
}
