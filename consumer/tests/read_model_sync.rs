//! Handler behavior against the in-memory repositories: idempotence,
//! cross-collection consistency, and sync-fault detection.

#![allow(clippy::unwrap_used)]

use atelier_consumer::handlers::{
    ImageProcessedHandler, ImageUploadedHandler, ProcessingFailedHandler, UserRegisteredHandler,
};
use atelier_core::event::{
    DomainEvent, ImageProcessed, ImageUploaded, ProcessingFailed, Style, UserRegistered,
};
use atelier_core::handler::{Collection, EventHandler, HandlerError};
use atelier_core::read_model::{
    ImageStatisticsStore, ImageStatus, ProcessedImages, UserProfiles,
};
use atelier_testing::{InMemoryImageStatistics, InMemoryProcessedImages, InMemoryUserProfiles};
use std::sync::Arc;

struct World {
    images: Arc<InMemoryProcessedImages>,
    profiles: Arc<InMemoryUserProfiles>,
    statistics: Arc<InMemoryImageStatistics>,
}

impl World {
    fn new() -> Self {
        Self {
            images: Arc::new(InMemoryProcessedImages::new()),
            profiles: Arc::new(InMemoryUserProfiles::new()),
            statistics: Arc::new(InMemoryImageStatistics::new()),
        }
    }

    async fn apply(&self, event: DomainEvent) -> Result<(), HandlerError> {
        match &event {
            DomainEvent::UserRegistered(_) => {
                UserRegisteredHandler::new(Arc::clone(&self.profiles), Arc::clone(&self.statistics))
                    .handle(event)
                    .await
            }
            DomainEvent::ImageUploaded(_) => ImageUploadedHandler::new(
                Arc::clone(&self.images),
                Arc::clone(&self.profiles),
                Arc::clone(&self.statistics),
            )
            .handle(event)
            .await,
            DomainEvent::ImageProcessed(_) => {
                ImageProcessedHandler::new(Arc::clone(&self.images), Arc::clone(&self.statistics))
                    .handle(event)
                    .await
            }
            DomainEvent::ProcessingFailed(_) => {
                ProcessingFailedHandler::new(Arc::clone(&self.images), Arc::clone(&self.statistics))
                    .handle(event)
                    .await
            }
        }
    }
}

fn registered(user_id: &str) -> DomainEvent {
    DomainEvent::UserRegistered(UserRegistered {
        user_id: user_id.to_string(),
        email: format!("{user_id}@example.com"),
        full_name: "Ada Example".to_string(),
        firebase_uid: format!("fb-{user_id}"),
    })
}

fn uploaded(image_id: &str, user_id: &str, style: Style) -> DomainEvent {
    DomainEvent::ImageUploaded(ImageUploaded {
        image_id: image_id.to_string(),
        user_id: user_id.to_string(),
        original_url: format!("https://storage.example.com/{image_id}.jpg"),
        style,
        size: 2048,
        user_email: format!("{user_id}@example.com"),
        user_name: Some("Ada Example".to_string()),
    })
}

fn processed(image_id: &str, user_id: &str, processing_time_ms: i64) -> DomainEvent {
    DomainEvent::ImageProcessed(ImageProcessed {
        image_id: image_id.to_string(),
        user_id: user_id.to_string(),
        processed_url: format!("https://cdn.example.com/{image_id}.png"),
        processing_time_ms,
    })
}

fn failed(image_id: &str, user_id: &str, error: &str) -> DomainEvent {
    DomainEvent::ProcessingFailed(ProcessingFailed {
        image_id: image_id.to_string(),
        user_id: user_id.to_string(),
        error: error.to_string(),
    })
}

#[tokio::test]
async fn successful_lifecycle_updates_all_collections() {
    let world = World::new();
    world.apply(registered("user-1")).await.unwrap();
    world.apply(uploaded("img-1", "user-1", Style::Cartoon)).await.unwrap();
    world.apply(processed("img-1", "user-1", 1200)).await.unwrap();

    let image = world.images.find_by_id("img-1").await.unwrap().unwrap();
    assert_eq!(image.status, ImageStatus::Completed);
    assert_eq!(image.processed_url.as_deref(), Some("https://cdn.example.com/img-1.png"));
    assert_eq!(image.processing_time_ms, Some(1200));
    assert!(image.processed_at.is_some());

    let profile = world.profiles.find_by_user_id("user-1").await.unwrap().unwrap();
    assert_eq!(profile.total_images, 1);

    let stats = world.statistics.find_by_user_id("user-1").await.unwrap().unwrap();
    assert_eq!(stats.total_images, 1);
    assert_eq!(stats.completed_images, 1);
    assert_eq!(stats.processing_images, 0);
    assert_eq!(stats.avg_processing_time, 1200);
}

#[tokio::test]
async fn failed_lifecycle_records_error_and_counters() {
    let world = World::new();
    world.apply(registered("user-1")).await.unwrap();
    world.apply(uploaded("img-1", "user-1", Style::Realism)).await.unwrap();
    world.apply(failed("img-1", "user-1", "model timeout")).await.unwrap();

    let image = world.images.find_by_id("img-1").await.unwrap().unwrap();
    assert_eq!(image.status, ImageStatus::Failed);
    assert_eq!(image.error_message.as_deref(), Some("model timeout"));

    let stats = world.statistics.find_by_user_id("user-1").await.unwrap().unwrap();
    assert_eq!(stats.failed_images, 1);
    assert_eq!(stats.processing_images, 0);
    assert_eq!(stats.completed_images, 0);
}

#[tokio::test]
async fn upload_before_registration_is_a_sync_fault_without_ghost_profile() {
    let world = World::new();
    let result = world.apply(uploaded("img-1", "user-1", Style::Anime)).await;

    let error = result.unwrap_err();
    assert_eq!(error.to_string(), "User profile not found for userId: user-1");
    assert!(error.is_retryable());
    assert!(matches!(
        error,
        HandlerError::SyncFault { collection: Collection::UserProfiles, .. }
    ));

    // No ghost documents materialized from the fault.
    assert!(world.profiles.find_by_user_id("user-1").await.unwrap().is_none());
    assert!(world.statistics.find_by_user_id("user-1").await.unwrap().is_none());

    // The image row itself is in place; redelivery will re-upsert it.
    assert!(world.images.find_by_id("img-1").await.unwrap().is_some());
}

#[tokio::test]
async fn result_before_upload_is_a_sync_fault() {
    let world = World::new();
    world.apply(registered("user-1")).await.unwrap();

    let error = world.apply(processed("img-9", "user-1", 800)).await.unwrap_err();
    assert!(matches!(
        error,
        HandlerError::SyncFault { collection: Collection::ProcessedImages, .. }
    ));
    assert_eq!(error.to_string(), "Processed image not found for userId: user-1");
}

#[tokio::test]
async fn redelivered_upload_does_not_double_count_rows() {
    let world = World::new();
    world.apply(registered("user-1")).await.unwrap();
    world.apply(uploaded("img-1", "user-1", Style::Cartoon)).await.unwrap();
    world.apply(uploaded("img-1", "user-1", Style::Cartoon)).await.unwrap();

    // One row either way: the second delivery stomps the first.
    assert_eq!(world.images.len().await, 1);
    let image = world.images.find_by_id("img-1").await.unwrap().unwrap();
    assert_eq!(image.status, ImageStatus::Processing);
}

#[tokio::test]
async fn redelivered_registration_preserves_statistics() {
    let world = World::new();
    world.apply(registered("user-1")).await.unwrap();
    world.apply(uploaded("img-1", "user-1", Style::Cartoon)).await.unwrap();

    // Replayed registration: profile counters reset, statistics survive.
    world.apply(registered("user-1")).await.unwrap();

    let stats = world.statistics.find_by_user_id("user-1").await.unwrap().unwrap();
    assert_eq!(stats.total_images, 1);
    assert_eq!(stats.processing_images, 1);
}

#[tokio::test]
async fn running_average_is_weighted_and_rounded() {
    let world = World::new();
    world.apply(registered("user-1")).await.unwrap();
    world.apply(uploaded("img-1", "user-1", Style::Cartoon)).await.unwrap();
    world.apply(uploaded("img-2", "user-1", Style::Cartoon)).await.unwrap();
    world.apply(processed("img-1", "user-1", 1000)).await.unwrap();
    world.apply(processed("img-2", "user-1", 2000)).await.unwrap();

    let stats = world.statistics.find_by_user_id("user-1").await.unwrap().unwrap();
    assert_eq!(stats.avg_processing_time, 1500);
    assert_eq!(stats.completed_images, 2);
    assert_eq!(stats.processing_images, 0);
}

#[tokio::test]
async fn style_usage_counters_accumulate_per_style() {
    let world = World::new();
    world.apply(registered("user-1")).await.unwrap();
    world.apply(uploaded("img-1", "user-1", Style::Cartoon)).await.unwrap();
    world.apply(uploaded("img-2", "user-1", Style::Cartoon)).await.unwrap();
    world.apply(uploaded("img-3", "user-1", Style::Anime)).await.unwrap();

    let stats = world.statistics.find_by_user_id("user-1").await.unwrap().unwrap();
    assert_eq!(stats.styles_used.get("cartoon"), Some(&2));
    assert_eq!(stats.styles_used.get("anime"), Some(&1));
    assert_eq!(stats.styles_used.get("realism"), None);
}
