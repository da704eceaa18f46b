//! The per-message consumer state machine.
//!
//! Every broker message moves `received → dispatched → {acked | requeued |
//! dead-lettered}`; the outcome is surfaced as a [`Disposition`] so tests and
//! metrics observe the same classification the loop acts on:
//!
//! - Malformed envelope or bad payload ⇒ dead-letter (redelivery cannot fix
//!   bytes).
//! - Unknown event type ⇒ drop and ack, so a producer shipping a new kind
//!   ahead of this service never creates a poison-message loop.
//! - Handler success ⇒ ack, record lag and freshness.
//! - Retryable handler error on first delivery ⇒ requeue by republishing the
//!   envelope with `deliveryCount + 1`, keyed by the event's partition key so
//!   it lands back on the same partition.
//! - Anything else ⇒ dead-letter.
//!
//! Acking is implicit: the bus commits offsets as messages are handed over,
//! so "ack" here means "return without requeueing".

use crate::instrument;
use crate::registry::HandlerRegistry;
use atelier_core::dead_letter::DeadLetters;
use atelier_core::envelope::{EnvelopeError, EventEnvelope};
use atelier_core::event_bus::{EventBus, EventBusError, ReceivedMessage};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

/// Terminal classification of one processed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Applied to the read model and acked.
    Handled,
    /// Unknown or unroutable event type, acked without applying.
    Dropped,
    /// Republished with a bumped delivery count.
    Requeued,
    /// Persisted to the dead-letter queue.
    DeadLettered,
}

impl Disposition {
    /// Label value for the `consumer.events` counter.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Handled => "handled",
            Self::Dropped => "dropped",
            Self::Requeued => "requeued",
            Self::DeadLettered => "dead_lettered",
        }
    }
}

/// Consumes broker messages one at a time and applies them to the read model.
pub struct EventConsumer {
    bus: Arc<dyn EventBus>,
    registry: HandlerRegistry,
    dead_letters: Arc<dyn DeadLetters>,
}

impl EventConsumer {
    /// Create a consumer over a bus, a populated registry, and dead-letter
    /// storage.
    #[must_use]
    pub fn new(
        bus: Arc<dyn EventBus>,
        registry: HandlerRegistry,
        dead_letters: Arc<dyn DeadLetters>,
    ) -> Self {
        Self { bus, registry, dead_letters }
    }

    /// Subscribe and process messages until shutdown flips or the stream ends.
    ///
    /// Messages are awaited strictly sequentially (the bus delivers with a
    /// prefetch of one), which together with `user_id` partition keying gives
    /// in-order processing per user.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError`] if the initial subscription fails. Transport
    /// errors mid-stream are logged and the loop continues.
    pub async fn run(
        &self,
        topics: &[&str],
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), EventBusError> {
        let mut stream = self.bus.subscribe(topics).await?;
        tracing::info!(topics = ?topics, handlers = self.registry.len(), "Consumer started");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Consumer shutting down");
                        break;
                    }
                }
                next = stream.next() => {
                    match next {
                        Some(Ok(message)) => {
                            let disposition = self.process_message(&message).await;
                            tracing::trace!(
                                topic = %message.topic,
                                partition = message.partition,
                                offset = message.offset,
                                disposition = disposition.as_str(),
                                "Message processed"
                            );
                        }
                        Some(Err(error)) => {
                            tracing::error!(error = %error, "Transport error, continuing");
                        }
                        None => {
                            tracing::info!("Message stream ended");
                            break;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Run one message through the state machine.
    pub async fn process_message(&self, message: &ReceivedMessage) -> Disposition {
        let envelope = match EventEnvelope::parse(&message.payload) {
            Ok(envelope) => envelope,
            Err(error) => {
                tracing::error!(
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    error = %error,
                    "Dead-lettering malformed message"
                );
                self.dead_letter("malformed", &message.payload, &error.to_string(), None, 0)
                    .await;
                instrument::record_disposition("malformed", Disposition::DeadLettered);
                return Disposition::DeadLettered;
            }
        };

        let event = match envelope.decode() {
            Ok(event) => event,
            Err(EnvelopeError::UnknownEventType(event_type)) => {
                tracing::warn!(event_type = %event_type, "Dropping event of unknown type");
                instrument::record_disposition("unknown", Disposition::Dropped);
                return Disposition::Dropped;
            }
            Err(error) => {
                tracing::error!(
                    event_type = %envelope.event_type,
                    error = %error,
                    "Dead-lettering event with undecodable payload"
                );
                self.dead_letter(
                    &envelope.event_type,
                    &message.payload,
                    &error.to_string(),
                    None,
                    envelope.delivery_count,
                )
                .await;
                instrument::record_disposition("malformed", Disposition::DeadLettered);
                return Disposition::DeadLettered;
            }
        };

        let kind = event.kind();
        let Some(handler) = self.registry.get(kind) else {
            tracing::warn!(event_type = %kind, "No handler registered, dropping");
            instrument::record_disposition(kind.as_str(), Disposition::Dropped);
            return Disposition::Dropped;
        };

        let partition_key = event.partition_key().to_string();
        let started = Instant::now();

        match handler.handle(event).await {
            Ok(()) => {
                instrument::record_applied(kind, envelope.timestamp, started.elapsed());
                instrument::record_disposition(kind.as_str(), Disposition::Handled);
                Disposition::Handled
            }
            Err(error) if error.is_retryable() && envelope.delivery_count == 0 => {
                match self.requeue(&envelope, &message.topic, &partition_key).await {
                    Ok(()) => {
                        tracing::warn!(
                            event_type = %kind,
                            key = %partition_key,
                            error = %error,
                            "Requeued after retryable failure"
                        );
                        instrument::record_disposition(kind.as_str(), Disposition::Requeued);
                        Disposition::Requeued
                    }
                    Err(publish_error) => {
                        tracing::error!(
                            event_type = %kind,
                            error = %publish_error,
                            "Requeue publish failed, dead-lettering instead"
                        );
                        self.dead_letter(
                            kind.as_str(),
                            &message.payload,
                            &error.to_string(),
                            Some(&format!("requeue failed: {publish_error}")),
                            envelope.delivery_count,
                        )
                        .await;
                        instrument::record_disposition(kind.as_str(), Disposition::DeadLettered);
                        Disposition::DeadLettered
                    }
                }
            }
            Err(error) => {
                tracing::error!(
                    event_type = %kind,
                    delivery_count = envelope.delivery_count,
                    retryable = error.is_retryable(),
                    error = %error,
                    "Dead-lettering after handler failure"
                );
                self.dead_letter(
                    kind.as_str(),
                    &message.payload,
                    &error.to_string(),
                    Some(&format!("{error:?}")),
                    envelope.delivery_count,
                )
                .await;
                instrument::record_disposition(kind.as_str(), Disposition::DeadLettered);
                Disposition::DeadLettered
            }
        }
    }

    async fn requeue(
        &self,
        envelope: &EventEnvelope,
        topic: &str,
        key: &str,
    ) -> Result<(), EventBusError> {
        let bytes = envelope
            .for_redelivery()
            .to_bytes()
            .map_err(|e| EventBusError::Other(e.to_string()))?;
        self.bus.publish(topic, key, &bytes).await
    }

    async fn dead_letter(
        &self,
        event_type: &str,
        payload: &[u8],
        error_message: &str,
        error_details: Option<&str>,
        delivery_count: u32,
    ) {
        let delivery_count = i32::try_from(delivery_count).unwrap_or(i32::MAX);
        if let Err(dlq_error) = self
            .dead_letters
            .add(event_type, payload, error_message, error_details, delivery_count)
            .await
        {
            // Nothing left to fall back to; the offset is already committed.
            tracing::error!(
                event_type = %event_type,
                error = %dlq_error,
                "Failed to persist dead-lettered message, message lost"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disposition_labels_are_stable() {
        assert_eq!(Disposition::Handled.as_str(), "handled");
        assert_eq!(Disposition::Dropped.as_str(), "dropped");
        assert_eq!(Disposition::Requeued.as_str(), "requeued");
        assert_eq!(Disposition::DeadLettered.as_str(), "dead_lettered");
    }
}
