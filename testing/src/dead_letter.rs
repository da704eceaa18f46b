//! In-memory dead-letter queue.

use atelier_core::dead_letter::{
    DeadLetterStatus, DeadLetteredMessage, DeadLetters, Result,
};
use chrono::Utc;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

#[derive(Default)]
struct DlqState {
    next_id: i64,
    messages: Vec<DeadLetteredMessage>,
}

/// In-memory [`DeadLetters`] with sequential ids.
#[derive(Default)]
pub struct InMemoryDeadLetters {
    state: Mutex<DlqState>,
}

impl InMemoryDeadLetters {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages ever dead-lettered, regardless of status.
    ///
    /// # Panics
    ///
    /// Panics if a previous holder of the internal lock panicked.
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn all(&self) -> Vec<DeadLetteredMessage> {
        self.state.lock().unwrap().messages.clone()
    }
}

#[allow(clippy::unwrap_used)] // Test-support crate; lock poisoning aborts the test
impl DeadLetters for InMemoryDeadLetters {
    fn add(
        &self,
        event_type: &str,
        payload: &[u8],
        error_message: &str,
        error_details: Option<&str>,
        delivery_count: i32,
    ) -> Pin<Box<dyn Future<Output = Result<i64>> + Send + '_>> {
        let event_type = event_type.to_string();
        let payload = payload.to_vec();
        let error_message = error_message.to_string();
        let error_details = error_details.map(ToString::to_string);

        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            state.next_id += 1;
            let id = state.next_id;
            state.messages.push(DeadLetteredMessage {
                id,
                event_type,
                payload,
                error_message,
                error_details,
                delivery_count,
                failed_at: Utc::now(),
                status: DeadLetterStatus::Pending,
                resolved_at: None,
                resolution_notes: None,
            });
            Ok(id)
        })
    }

    fn list_pending(
        &self,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<DeadLetteredMessage>>> + Send + '_>> {
        Box::pin(async move {
            Ok(self
                .state
                .lock()
                .unwrap()
                .messages
                .iter()
                .filter(|m| m.status == DeadLetterStatus::Pending)
                .take(limit)
                .cloned()
                .collect())
        })
    }

    fn mark_resolved(
        &self,
        id: i64,
        notes: Option<&str>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let notes = notes.map(ToString::to_string);
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            if let Some(message) = state.messages.iter_mut().find(|m| m.id == id) {
                message.status = DeadLetterStatus::Resolved;
                message.resolved_at = Some(Utc::now());
                message.resolution_notes = notes;
            }
            Ok(())
        })
    }

    fn mark_discarded(
        &self,
        id: i64,
        reason: &str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let reason = reason.to_string();
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            if let Some(message) = state.messages.iter_mut().find(|m| m.id == id) {
                message.status = DeadLetterStatus::Discarded;
                message.resolved_at = Some(Utc::now());
                message.resolution_notes = Some(reason);
            }
            Ok(())
        })
    }

    fn count_pending(&self) -> Pin<Box<dyn Future<Output = Result<i64>> + Send + '_>> {
        Box::pin(async move {
            let pending = self
                .state
                .lock()
                .unwrap()
                .messages
                .iter()
                .filter(|m| m.status == DeadLetterStatus::Pending)
                .count();
            Ok(i64::try_from(pending).unwrap_or(i64::MAX))
        })
    }
}
