//! Event handler abstraction and the handler error taxonomy.
//!
//! One handler exists per [`EventKind`]; the consumer's registry routes a
//! decoded [`DomainEvent`] to the matching handler. Handlers perform their
//! read-model writes strictly in sequence, never retry internally, and
//! propagate every error so the consumer can classify it into requeue or
//! dead-letter.

use crate::event::{DomainEvent, EventKind};
use crate::read_model::ReadModelError;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// The read-model collection a sync fault refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    /// `processed_images`
    ProcessedImages,
    /// `user_profiles`
    UserProfiles,
    /// `image_statistics`
    ImageStatistics,
}

impl Collection {
    /// Collection name for structured log fields.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ProcessedImages => "processed_images",
            Self::UserProfiles => "user_profiles",
            Self::ImageStatistics => "image_statistics",
        }
    }

    /// Leading clause of the sync-fault message for this collection.
    #[must_use]
    pub const fn missing_description(&self) -> &'static str {
        match self {
            Self::ProcessedImages => "Processed image not found",
            Self::UserProfiles => "User profile not found",
            Self::ImageStatistics => "User statistics not found",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors a handler can produce.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// A prerequisite document was missing when a dependent event arrived:
    /// the UserRegistered event for this user has not materialized yet or was
    /// lost. Retryable: redelivery after the prerequisite lands succeeds.
    /// Handlers must never paper over this by creating the missing document.
    #[error("{} for userId: {user_id}", collection.missing_description())]
    SyncFault {
        /// Which collection was missing the document.
        collection: Collection,
        /// The user whose document was missing.
        user_id: String,
        /// The image being processed, when the event carries one.
        image_id: Option<String>,
    },

    /// Storage-layer failure. Retryable (transient infrastructure fault).
    #[error(transparent)]
    ReadModel(#[from] ReadModelError),

    /// The registry dispatched an event to a handler of a different kind.
    /// Indicates a wiring bug; not retryable.
    #[error("handler for {expected} received {got} event")]
    UnexpectedEvent {
        /// The kind this handler accepts.
        expected: EventKind,
        /// The kind that was dispatched.
        got: EventKind,
    },
}

impl HandlerError {
    /// Whether redelivering the message can plausibly succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::SyncFault { .. } | Self::ReadModel(_) => true,
            Self::UnexpectedEvent { .. } => false,
        }
    }
}

/// A handler for one event kind.
///
/// # Dyn Compatibility
///
/// Uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn` so
/// handlers can live in the registry as `Arc<dyn EventHandler>`.
pub trait EventHandler: Send + Sync {
    /// The event kind this handler accepts.
    fn kind(&self) -> EventKind;

    /// Apply one event to the read model.
    ///
    /// Handlers are re-run in full on redelivery, so every step must be
    /// idempotent or verified before mutating. There is no partial-completion
    /// resume point.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] on sync faults and storage failures; the
    /// consumer classifies the error into requeue or dead-letter.
    fn handle(
        &self,
        event: DomainEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_fault_message_matches_contract() {
        let err = HandlerError::SyncFault {
            collection: Collection::UserProfiles,
            user_id: "user-3".to_string(),
            image_id: Some("img-3".to_string()),
        };
        assert_eq!(err.to_string(), "User profile not found for userId: user-3");

        let err = HandlerError::SyncFault {
            collection: Collection::ImageStatistics,
            user_id: "user-4".to_string(),
            image_id: None,
        };
        assert_eq!(err.to_string(), "User statistics not found for userId: user-4");
    }

    #[test]
    fn retryability_classification() {
        let fault = HandlerError::SyncFault {
            collection: Collection::UserProfiles,
            user_id: "u".to_string(),
            image_id: None,
        };
        assert!(fault.is_retryable());

        let storage = HandlerError::ReadModel(ReadModelError::Storage("down".to_string()));
        assert!(storage.is_retryable());

        let wiring = HandlerError::UnexpectedEvent {
            expected: EventKind::ImageUploaded,
            got: EventKind::UserRegistered,
        };
        assert!(!wiring.is_retryable());
    }
}
