//! Dead-letter storage for messages that exhausted their delivery budget.
//!
//! Messages land here when they are malformed or when a handler failed and
//! the message has already been redelivered once. Entries keep the original
//! envelope bytes so an operator can fix the underlying issue (usually a
//! missing prerequisite document) and replay.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;

/// Error type for dead-letter operations.
#[derive(Debug, thiserror::Error)]
pub enum DeadLetterError {
    /// Storage backend error.
    #[error("Dead letter storage error: {0}")]
    Storage(String),

    /// Entry status string in storage did not parse.
    #[error("Invalid dead letter status: {0}")]
    InvalidStatus(String),
}

/// Result type for dead-letter operations.
pub type Result<T> = std::result::Result<T, DeadLetterError>;

/// Lifecycle of a dead-lettered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadLetterStatus {
    /// Awaiting investigation or replay.
    Pending,
    /// Successfully replayed or otherwise fixed.
    Resolved,
    /// Permanently discarded.
    Discarded,
}

impl DeadLetterStatus {
    /// Storage name for this status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Resolved => "resolved",
            Self::Discarded => "discarded",
        }
    }

    /// Parse a storage name back into a status.
    ///
    /// # Errors
    ///
    /// Returns [`DeadLetterError::InvalidStatus`] for unrecognized strings.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "resolved" => Ok(Self::Resolved),
            "discarded" => Ok(Self::Discarded),
            _ => Err(DeadLetterError::InvalidStatus(s.to_string())),
        }
    }
}

/// One dead-lettered message with its failure metadata.
#[derive(Debug, Clone)]
pub struct DeadLetteredMessage {
    /// Entry identifier.
    pub id: i64,
    /// Event type string from the envelope, or `"malformed"` when the
    /// envelope itself did not parse.
    pub event_type: String,
    /// Original envelope bytes, kept verbatim for replay.
    pub payload: Vec<u8>,
    /// Human-readable error message from the failure.
    pub error_message: String,
    /// Full error details (debug output), when available.
    pub error_details: Option<String>,
    /// Delivery count at the time of dead-lettering.
    pub delivery_count: i32,
    /// When the message was dead-lettered.
    pub failed_at: DateTime<Utc>,
    /// Current status.
    pub status: DeadLetterStatus,
    /// When the entry was resolved or discarded, if it has been.
    pub resolved_at: Option<DateTime<Utc>>,
    /// Notes about the resolution.
    pub resolution_notes: Option<String>,
}

/// Dead-letter storage.
///
/// # Dyn Compatibility
///
/// Uses explicit `Pin<Box<dyn Future>>` returns so the consumer can hold
/// `Arc<dyn DeadLetters>` and tests can substitute an in-memory fake.
pub trait DeadLetters: Send + Sync {
    /// Add a failed message.
    ///
    /// Returns the new entry's identifier.
    ///
    /// # Errors
    ///
    /// Returns [`DeadLetterError::Storage`] if the insert fails.
    fn add(
        &self,
        event_type: &str,
        payload: &[u8],
        error_message: &str,
        error_details: Option<&str>,
        delivery_count: i32,
    ) -> Pin<Box<dyn Future<Output = Result<i64>> + Send + '_>>;

    /// List pending entries, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`DeadLetterError::Storage`] if the query fails.
    fn list_pending(
        &self,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<DeadLetteredMessage>>> + Send + '_>>;

    /// Mark an entry resolved.
    ///
    /// # Errors
    ///
    /// Returns [`DeadLetterError::Storage`] if the update fails.
    fn mark_resolved(
        &self,
        id: i64,
        notes: Option<&str>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Mark an entry permanently discarded.
    ///
    /// # Errors
    ///
    /// Returns [`DeadLetterError::Storage`] if the update fails.
    fn mark_discarded(
        &self,
        id: i64,
        reason: &str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Count pending entries, for the operational gauge.
    ///
    /// # Errors
    ///
    /// Returns [`DeadLetterError::Storage`] if the query fails.
    fn count_pending(&self) -> Pin<Box<dyn Future<Output = Result<i64>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrip() {
        for status in [
            DeadLetterStatus::Pending,
            DeadLetterStatus::Resolved,
            DeadLetterStatus::Discarded,
        ] {
            assert_eq!(
                DeadLetterStatus::parse(status.as_str()).ok(),
                Some(status)
            );
        }
        assert!(DeadLetterStatus::parse("processing").is_err());
    }
}
