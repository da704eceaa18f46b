//! In-memory event bus.

use atelier_core::event_bus::{EventBus, EventBusError, MessageStream, ReceivedMessage};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// A message recorded by [`InMemoryEventBus::publish`], for assertions.
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    /// Destination topic.
    pub topic: String,
    /// Partition key.
    pub key: String,
    /// Envelope bytes.
    pub payload: Vec<u8>,
}

struct Subscriber {
    topics: Vec<String>,
    tx: mpsc::UnboundedSender<Result<ReceivedMessage, EventBusError>>,
}

#[derive(Default)]
struct BusState {
    subscribers: Vec<Subscriber>,
    published: Vec<PublishedMessage>,
    next_offset: HashMap<String, i64>,
}

/// Single-process event bus: publishes route synchronously to every
/// subscriber of the topic, everything lands on partition 0, and offsets
/// increment per topic.
///
/// Every published message is also recorded so tests can assert on requeue
/// traffic.
#[derive(Clone, Default)]
pub struct InMemoryEventBus {
    state: Arc<Mutex<BusState>>,
}

impl InMemoryEventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published so far, including requeues.
    ///
    /// # Panics
    ///
    /// Panics if a previous holder of the internal lock panicked.
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.state.lock().unwrap().published.clone()
    }
}

impl EventBus for InMemoryEventBus {
    fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let topic = topic.to_string();
        let key = key.to_string();
        let payload = payload.to_vec();

        Box::pin(async move {
            let mut state = self
                .state
                .lock()
                .map_err(|_| EventBusError::Other("bus lock poisoned".to_string()))?;

            let offset = state.next_offset.entry(topic.clone()).or_insert(0);
            let message = ReceivedMessage {
                topic: topic.clone(),
                partition: 0,
                offset: *offset,
                payload: payload.clone(),
            };
            *offset += 1;

            state.published.push(PublishedMessage { topic: topic.clone(), key, payload });

            state.subscribers.retain(|subscriber| {
                if subscriber.topics.iter().any(|t| t == &topic) {
                    subscriber.tx.send(Ok(message.clone())).is_ok()
                } else {
                    true
                }
            });

            Ok(())
        })
    }

    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<MessageStream, EventBusError>> + Send + '_>> {
        let topics: Vec<String> = topics.iter().map(|s| (*s).to_string()).collect();

        Box::pin(async move {
            let (tx, mut rx) = mpsc::unbounded_channel();
            self.state
                .lock()
                .map_err(|_| EventBusError::Other("bus lock poisoned".to_string()))?
                .subscribers
                .push(Subscriber { topics, tx });

            let stream = async_stream::stream! {
                while let Some(result) = rx.recv().await {
                    yield result;
                }
            };

            Ok(Box::pin(stream) as MessageStream)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn routes_to_matching_subscribers_only() {
        let bus = InMemoryEventBus::new();
        let mut users = bus.subscribe(&["user-events"]).await.unwrap();
        let mut both = bus.subscribe(&["user-events", "image-events"]).await.unwrap();

        bus.publish("image-events", "user-1", b"img").await.unwrap();
        bus.publish("user-events", "user-1", b"usr").await.unwrap();

        let first_both = both.next().await.unwrap().unwrap();
        assert_eq!(first_both.topic, "image-events");

        let first_users = users.next().await.unwrap().unwrap();
        assert_eq!(first_users.topic, "user-events");
        assert_eq!(first_users.payload, b"usr");

        assert_eq!(bus.published().len(), 2);
    }

    #[tokio::test]
    async fn offsets_increment_per_topic() {
        let bus = InMemoryEventBus::new();
        let mut stream = bus.subscribe(&["user-events"]).await.unwrap();

        bus.publish("user-events", "a", b"1").await.unwrap();
        bus.publish("user-events", "b", b"2").await.unwrap();

        assert_eq!(stream.next().await.unwrap().unwrap().offset, 0);
        assert_eq!(stream.next().await.unwrap().unwrap().offset, 1);
    }
}
