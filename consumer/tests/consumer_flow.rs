//! Consumer state-machine tests: ack, drop, requeue-by-republish, and
//! dead-letter paths over the in-memory bus.

#![allow(clippy::unwrap_used)]

use atelier_consumer::handlers::{
    ImageProcessedHandler, ImageUploadedHandler, ProcessingFailedHandler, UserRegisteredHandler,
};
use atelier_consumer::{Disposition, EventConsumer, HandlerRegistry};
use atelier_core::dead_letter::DeadLetters;
use atelier_core::envelope::EventEnvelope;
use atelier_core::event::{DomainEvent, ImageUploaded, Style, UserRegistered};
use atelier_core::event_bus::{EventBus, ReceivedMessage};
use atelier_core::read_model::UserProfiles;
use atelier_testing::{
    InMemoryDeadLetters, InMemoryEventBus, InMemoryImageStatistics, InMemoryProcessedImages,
    InMemoryUserProfiles,
};
use std::sync::Arc;

struct Harness {
    consumer: EventConsumer,
    bus: Arc<InMemoryEventBus>,
    dead_letters: Arc<InMemoryDeadLetters>,
    profiles: Arc<InMemoryUserProfiles>,
}

fn harness() -> Harness {
    let images = Arc::new(InMemoryProcessedImages::new());
    let profiles = Arc::new(InMemoryUserProfiles::new());
    let statistics = Arc::new(InMemoryImageStatistics::new());
    let bus = Arc::new(InMemoryEventBus::new());
    let dead_letters = Arc::new(InMemoryDeadLetters::new());

    let mut registry = HandlerRegistry::new();
    registry.register(Arc::new(UserRegisteredHandler::new(
        Arc::clone(&profiles),
        Arc::clone(&statistics),
    )));
    registry.register(Arc::new(ImageUploadedHandler::new(
        Arc::clone(&images),
        Arc::clone(&profiles),
        Arc::clone(&statistics),
    )));
    registry.register(Arc::new(ImageProcessedHandler::new(
        Arc::clone(&images),
        Arc::clone(&statistics),
    )));
    registry.register(Arc::new(ProcessingFailedHandler::new(
        Arc::clone(&images),
        Arc::clone(&statistics),
    )));

    let consumer = EventConsumer::new(
        Arc::clone(&bus) as Arc<dyn EventBus>,
        registry,
        Arc::clone(&dead_letters) as Arc<dyn DeadLetters>,
    );

    Harness { consumer, bus, dead_letters, profiles }
}

fn message(topic: &str, payload: Vec<u8>) -> ReceivedMessage {
    ReceivedMessage { topic: topic.to_string(), partition: 0, offset: 0, payload }
}

fn upload_envelope() -> EventEnvelope {
    EventEnvelope::new(&DomainEvent::ImageUploaded(ImageUploaded {
        image_id: "img-1".to_string(),
        user_id: "user-1".to_string(),
        original_url: "https://storage.example.com/img-1.jpg".to_string(),
        style: Style::Cartoon,
        size: 1024,
        user_email: "user-1@example.com".to_string(),
        user_name: None,
    }))
    .unwrap()
}

#[tokio::test]
async fn valid_event_is_handled() {
    let h = harness();
    let envelope = EventEnvelope::new(&DomainEvent::UserRegistered(UserRegistered {
        user_id: "user-1".to_string(),
        email: "a@example.com".to_string(),
        full_name: "Ada Example".to_string(),
        firebase_uid: "fb-1".to_string(),
    }))
    .unwrap();

    let disposition = h
        .consumer
        .process_message(&message("user-events", envelope.to_bytes().unwrap()))
        .await;

    assert_eq!(disposition, Disposition::Handled);
    assert!(h.profiles.find_by_user_id("user-1").await.unwrap().is_some());
    assert_eq!(h.dead_letters.all().len(), 0);
}

#[tokio::test]
async fn unknown_event_type_is_dropped_not_dead_lettered() {
    let h = harness();
    let payload = br#"{"eventType":"SomethingNew","data":{}}"#.to_vec();

    let disposition = h.consumer.process_message(&message("user-events", payload)).await;

    assert_eq!(disposition, Disposition::Dropped);
    assert_eq!(h.dead_letters.all().len(), 0);
    assert!(h.bus.published().is_empty());
}

#[tokio::test]
async fn malformed_json_is_dead_lettered_immediately() {
    let h = harness();

    let disposition = h
        .consumer
        .process_message(&message("image-events", b"not json at all".to_vec()))
        .await;

    assert_eq!(disposition, Disposition::DeadLettered);
    let entries = h.dead_letters.all();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].event_type, "malformed");
    assert_eq!(entries[0].payload, b"not json at all");
    // Never requeued.
    assert!(h.bus.published().is_empty());
}

#[tokio::test]
async fn undecodable_payload_of_known_type_is_dead_lettered() {
    let h = harness();
    let payload = br#"{"eventType":"ImageProcessedEvent","data":{"imageId":"img-1"}}"#.to_vec();

    let disposition = h.consumer.process_message(&message("image-events", payload)).await;

    assert_eq!(disposition, Disposition::DeadLettered);
    assert_eq!(h.dead_letters.all()[0].event_type, "ImageProcessedEvent");
}

#[tokio::test]
async fn retryable_failure_requeues_once_then_dead_letters() {
    let h = harness();
    // Upload without a registered user: sync fault, retryable.
    let bytes = upload_envelope().to_bytes().unwrap();

    let first = h.consumer.process_message(&message("image-events", bytes)).await;
    assert_eq!(first, Disposition::Requeued);
    assert_eq!(h.dead_letters.all().len(), 0);

    // The requeue republished to the same topic, keyed by user, with the
    // delivery count bumped.
    let published = h.bus.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].topic, "image-events");
    assert_eq!(published[0].key, "user-1");
    let requeued = EventEnvelope::parse(&published[0].payload).unwrap();
    assert_eq!(requeued.delivery_count, 1);

    // Second delivery still faults: delivery budget exhausted, dead-letter.
    let second = h
        .consumer
        .process_message(&message("image-events", published[0].payload.clone()))
        .await;
    assert_eq!(second, Disposition::DeadLettered);

    let entries = h.dead_letters.all();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].event_type, "ImageUploaded");
    assert_eq!(entries[0].delivery_count, 1);
    assert_eq!(entries[0].error_message, "User profile not found for userId: user-1");
}

#[tokio::test]
async fn requeued_message_succeeds_after_prerequisite_lands() {
    let h = harness();
    let bytes = upload_envelope().to_bytes().unwrap();

    assert_eq!(
        h.consumer.process_message(&message("image-events", bytes)).await,
        Disposition::Requeued
    );

    // Registration arrives before the redelivery is consumed.
    let registration = EventEnvelope::new(&DomainEvent::UserRegistered(UserRegistered {
        user_id: "user-1".to_string(),
        email: "a@example.com".to_string(),
        full_name: "Ada Example".to_string(),
        firebase_uid: "fb-1".to_string(),
    }))
    .unwrap();
    assert_eq!(
        h.consumer
            .process_message(&message("user-events", registration.to_bytes().unwrap()))
            .await,
        Disposition::Handled
    );

    let redelivery = h.bus.published()[0].payload.clone();
    assert_eq!(
        h.consumer.process_message(&message("image-events", redelivery)).await,
        Disposition::Handled
    );

    let profile = h.profiles.find_by_user_id("user-1").await.unwrap().unwrap();
    assert_eq!(profile.total_images, 1);
    assert_eq!(h.dead_letters.all().len(), 0);
}

#[tokio::test]
async fn run_processes_stream_until_shutdown() {
    let h = harness();
    let bus = Arc::clone(&h.bus);
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let consumer = h.consumer;
    let run = tokio::spawn(async move {
        consumer.run(&["user-events"], shutdown_rx).await
    });

    // Give the subscription a moment to register before publishing.
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    let registration = EventEnvelope::new(&DomainEvent::UserRegistered(UserRegistered {
        user_id: "user-7".to_string(),
        email: "b@example.com".to_string(),
        full_name: "Grace Example".to_string(),
        firebase_uid: "fb-7".to_string(),
    }))
    .unwrap();
    bus.publish("user-events", "user-7", &registration.to_bytes().unwrap())
        .await
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(h.profiles.find_by_user_id("user-7").await.unwrap().is_some());

    shutdown_tx.send(true).unwrap();
    run.await.unwrap().unwrap();
}
