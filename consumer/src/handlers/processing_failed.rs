//! Handler for `ProcessingFailed` events.

use atelier_core::event::{DomainEvent, EventKind};
use atelier_core::handler::{Collection, EventHandler, HandlerError};
use atelier_core::read_model::{ImageStatisticsStore, ProcessedImages};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

/// Records a permanent processing failure: marks the image failed with the
/// pipeline's error message and moves one in-flight count to failed.
pub struct ProcessingFailedHandler<I, S> {
    images: Arc<I>,
    statistics: Arc<S>,
}

impl<I, S> ProcessingFailedHandler<I, S> {
    /// Create a handler over the given repositories.
    #[must_use]
    pub const fn new(images: Arc<I>, statistics: Arc<S>) -> Self {
        Self { images, statistics }
    }
}

impl<I, S> EventHandler for ProcessingFailedHandler<I, S>
where
    I: ProcessedImages + 'static,
    S: ImageStatisticsStore + 'static,
{
    fn kind(&self) -> EventKind {
        EventKind::ProcessingFailed
    }

    fn handle(
        &self,
        event: DomainEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + '_>> {
        Box::pin(async move {
            let payload = match event {
                DomainEvent::ProcessingFailed(payload) => payload,
                other => {
                    return Err(HandlerError::UnexpectedEvent {
                        expected: EventKind::ProcessingFailed,
                        got: other.kind(),
                    });
                }
            };

            let started = Instant::now();
            tracing::debug!(
                image_id = %payload.image_id,
                user_id = %payload.user_id,
                error = %payload.error,
                "Applying ProcessingFailed"
            );

            let updated = self
                .images
                .mark_failed(&payload.image_id, &payload.error)
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
                .increment_failed(&payload.user_id)
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
                "Image marked failed"
            );
            Ok(())
        })
    }
}
