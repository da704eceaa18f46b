//! Handler for `ImageUploaded` events.

use atelier_core::event::{DomainEvent, EventKind};
use atelier_core::handler::{Collection, EventHandler, HandlerError};
use atelier_core::read_model::{
    ImageStatisticsStore, NewProcessedImage, ProcessedImages, UserProfiles,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

/// Materializes an upload: creates the image row in `processing` status, then
/// bumps the owner's profile and statistics counters.
///
/// The image write is an upsert keyed on `image_id`, so a redelivered upload
/// stomps the row instead of double-inserting. The counter bumps require the
/// profile and statistics documents to already exist (created by
/// `UserRegistered`); a missing document is a sync fault, and the handler
/// never conjures one from the partial data an upload event carries.
///
/// Steps are not transactional: a counter fault leaves the image row in
/// place, and the redelivery re-upserts it harmlessly.
pub struct ImageUploadedHandler<I, P, S> {
    images: Arc<I>,
    profiles: Arc<P>,
    statistics: Arc<S>,
}

impl<I, P, S> ImageUploadedHandler<I, P, S> {
    /// Create a handler over the given repositories.
    #[must_use]
    pub const fn new(images: Arc<I>, profiles: Arc<P>, statistics: Arc<S>) -> Self {
        Self { images, profiles, statistics }
    }
}

impl<I, P, S> EventHandler for ImageUploadedHandler<I, P, S>
where
    I: ProcessedImages + 'static,
    P: UserProfiles + 'static,
    S: ImageStatisticsStore + 'static,
{
    fn kind(&self) -> EventKind {
        EventKind::ImageUploaded
    }

    fn handle(
        &self,
        event: DomainEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + '_>> {
        Box::pin(async move {
            let payload = match event {
                DomainEvent::ImageUploaded(payload) => payload,
                other => {
                    return Err(HandlerError::UnexpectedEvent {
                        expected: EventKind::ImageUploaded,
                        got: other.kind(),
                    });
                }
            };

            let started = Instant::now();
            tracing::debug!(
                image_id = %payload.image_id,
                user_id = %payload.user_id,
                style = %payload.style,
                "Applying ImageUploaded"
            );

            let image_id = payload.image_id.clone();
            let user_id = payload.user_id.clone();
            let style = payload.style;

            self.images
                .upsert(NewProcessedImage {
                    image_id: payload.image_id,
                    user_id: payload.user_id,
                    user_email: payload.user_email,
                    user_name: payload.user_name,
                    original_url: payload.original_url,
                    style: payload.style,
                    size: payload.size,
                })
                .await?;

            if self.profiles.increment_image_count(&user_id).await?.is_none() {
                return Err(HandlerError::SyncFault {
                    collection: Collection::UserProfiles,
                    user_id,
                    image_id: Some(image_id),
                });
            }

            if self.statistics.increment_total(&user_id).await?.is_none() {
                return Err(HandlerError::SyncFault {
                    collection: Collection::ImageStatistics,
                    user_id,
                    image_id: Some(image_id),
                });
            }

            if self
                .statistics
                .increment_style_used(&user_id, style)
                .await?
                .is_none()
            {
                return Err(HandlerError::SyncFault {
                    collection: Collection::ImageStatistics,
                    user_id,
                    image_id: Some(image_id),
                });
            }

            tracing::info!(
                image_id = %image_id,
                user_id = %user_id,
                elapsed = ?started.elapsed(),
                "Image materialized in processing status"
            );
            Ok(())
        })
    }
}
