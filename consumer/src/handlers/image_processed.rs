//! Handler for `ImageProcessed` events.

use atelier_core::event::{DomainEvent, EventKind};
use atelier_core::handler::{Collection, EventHandler, HandlerError};
use atelier_core::read_model::{ImageStatisticsStore, ProcessedImages};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

/// Records a successful processing result: marks the image completed and
/// folds the duration into the owner's statistics.
///
/// Both the image row and the statistics document must already exist; either
/// missing is a sync fault: the upstream `ImageUploaded` or `UserRegistered`
/// has not materialized yet.
pub struct ImageProcessedHandler<I, S> {
    images: Arc<I>,
    statistics: Arc<S>,
}

impl<I, S> ImageProcessedHandler<I, S> {
    /// Create a handler over the given repositories.
    #[must_use]
    pub const fn new(images: Arc<I>, statistics: Arc<S>) -> Self {
        Self { images, statistics }
    }
}

impl<I, S> EventHandler for ImageProcessedHandler<I, S>
where
    I: ProcessedImages + 'static,
    S: ImageStatisticsStore + 'static,
{
    fn kind(&self) -> EventKind {
        EventKind::ImageProcessed
    }

    fn handle(
        &self,
        event: DomainEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + '_>> {
        Box::pin(async move {
            let payload = match event {
                DomainEvent::ImageProcessed(payload) => payload,
                other => {
                    return Err(HandlerError::UnexpectedEvent {
                        expected: EventKind::ImageProcessed,
                        got: other.kind(),
                    });
                }
            };

            let started = Instant::now();
            tracing::debug!(
                image_id = %payload.image_id,
                user_id = %payload.user_id,
                processing_time_ms = payload.processing_time_ms,
                "Applying ImageProcessed"
            );

            let updated = self
                .images
                .mark_completed(
                    &payload.image_id,
                    &payload.processed_url,
                    payload.processing_time_ms,
                )
                .await?;
            if updated.is_none() {
                return Err(HandlerError::SyncFault {
                    collection: Collection::ProcessedImages,
                    user_id: payload.user_id,
                    image_id: Some(payload.image_id),
                });
            }

            if self
                .statistics
                .increment_completed(&payload.user_id, payload.processing_time_ms)
                .await?
                .is_none()
            {
                return Err(HandlerError::SyncFault {
                    collection: Collection::ImageStatistics,
                    user_id: payload.user_id,
                    image_id: Some(payload.image_id),
                });
            }

            tracing::info!(
                image_id = %payload.image_id,
                user_id = %payload.user_id,
                elapsed = ?started.elapsed(),
                "Image marked completed"
            );
            Ok(())
        })
    }
}
