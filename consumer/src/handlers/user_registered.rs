//! Handler for `UserRegistered` events.

use atelier_core::event::{DomainEvent, EventKind};
use atelier_core::handler::{EventHandler, HandlerError};
use atelier_core::read_model::{ImageStatisticsStore, NewUserProfile, UserProfiles};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

/// Materializes a registration into a user profile and a zeroed statistics
/// document.
///
/// Both writes are idempotent, so a redelivered registration is harmless:
/// the profile upsert resets identity fields and the statistics initialization
/// is set-on-insert and never clobbers accumulated counters.
pub struct UserRegisteredHandler<P, S> {
    profiles: Arc<P>,
    statistics: Arc<S>,
}

impl<P, S> UserRegisteredHandler<P, S> {
    /// Create a handler over the given repositories.
    #[must_use]
    pub const fn new(profiles: Arc<P>, statistics: Arc<S>) -> Self {
        Self { profiles, statistics }
    }
}

impl<P, S> EventHandler for UserRegisteredHandler<P, S>
where
    P: UserProfiles + 'static,
    S: ImageStatisticsStore + 'static,
{
    fn kind(&self) -> EventKind {
        EventKind::UserRegistered
    }

    fn handle(
        &self,
        event: DomainEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + '_>> {
        Box::pin(async move {
            let payload = match event {
                DomainEvent::UserRegistered(payload) => payload,
                other => {
                    return Err(HandlerError::UnexpectedEvent {
                        expected: EventKind::UserRegistered,
                        got: other.kind(),
                    });
                }
            };

            let started = Instant::now();
            tracing::debug!(
                user_id = %payload.user_id,
                email = %payload.email,
                "Applying UserRegistered"
            );

            let user_id = payload.user_id.clone();

            self.profiles
                .upsert(NewUserProfile {
                    user_id: payload.user_id,
                    firebase_uid: payload.firebase_uid,
                    email: payload.email,
                    full_name: payload.full_name,
                })
                .await?;

            self.statistics.initialize_for_user(&user_id).await?;

            tracing::info!(
                user_id = %user_id,
                elapsed = ?started.elapsed(),
                "User profile and statistics materialized"
            );
            Ok(())
        })
    }
}

// Behavior is covered end to end in tests/read_model_sync.rs against the
// in-memory repositories.
