//! Event bus abstraction between the command side and this query service.
//!
//! The command side publishes envelopes to per-aggregate topics
//! (`user-events`, `image-events`); this service subscribes to both through a
//! single consumer group. Messages are opaque bytes at this layer; envelope
//! parsing lives in [`crate::envelope`], so implementations stay free of
//! domain knowledge.
//!
//! # Delivery semantics
//!
//! At-least-once: implementations commit a message only after it has been
//! handed to the subscriber, so a crash in between causes redelivery.
//! Everything downstream must therefore be idempotent. Ordering is guaranteed
//! within a partition; producers key by `user_id` so all events for one user
//! arrive in order at one consumer instance.

use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    /// Failed to connect to the broker.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish a message to a topic.
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed.
        topic: String,
        /// The reason for failure.
        reason: String,
    },

    /// Failed to subscribe to topics.
    #[error("Subscription failed for topics {topics:?}: {reason}")]
    SubscriptionFailed {
        /// The topics that failed to subscribe.
        topics: Vec<String>,
        /// The reason for failure.
        reason: String,
    },

    /// Network or transport error mid-stream.
    #[error("Transport error: {0}")]
    TransportError(String),

    /// Generic error for other failures.
    #[error("Event bus error: {0}")]
    Other(String),
}

/// A raw message delivered by the broker.
///
/// Payload bytes are the JSON envelope; partition and offset are carried for
/// logging and queue-depth accounting.
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    /// Topic the message arrived on.
    pub topic: String,
    /// Partition within the topic.
    pub partition: i32,
    /// Offset within the partition.
    pub offset: i64,
    /// Raw envelope bytes.
    pub payload: Vec<u8>,
}

/// Stream of messages from a subscription.
pub type MessageStream =
    Pin<Box<dyn Stream<Item = Result<ReceivedMessage, EventBusError>> + Send>>;

/// Publish/subscribe access to the broker.
///
/// # Dyn Compatibility
///
/// Uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn` so the
/// bus can be held as `Arc<dyn EventBus>` by the consumer, which also needs
/// `publish` for requeue-by-republish.
pub trait EventBus: Send + Sync {
    /// Publish a message to a topic, keyed for partitioning.
    ///
    /// # Arguments
    ///
    /// - `topic`: destination topic (e.g. "image-events")
    /// - `key`: partition key; events for one user must share a key
    /// - `payload`: serialized envelope bytes
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] if the publish fails.
    fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>>;

    /// Subscribe to one or more topics and receive a stream of raw messages.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SubscriptionFailed`] if subscription fails.
    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<MessageStream, EventBusError>> + Send + '_>>;
}
