//! Postgres-backed dead-letter storage.
//!
//! Keeps the original envelope bytes of every message that exhausted its
//! delivery budget, with enough failure metadata for incident investigation
//! and manual replay.

use atelier_core::dead_letter::{
    DeadLetterError, DeadLetterStatus, DeadLetteredMessage, DeadLetters, Result,
};
use sqlx::{PgPool, Row};
use std::future::Future;
use std::pin::Pin;

/// Postgres implementation of [`DeadLetters`] over the `failed_events` table.
#[derive(Clone)]
pub struct PgDeadLetters {
    pool: PgPool,
}

impl PgDeadLetters {
    /// Create a dead-letter store using an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_message(row: &sqlx::postgres::PgRow) -> Result<DeadLetteredMessage> {
        let status_str: String = row.get("status");
        let status = DeadLetterStatus::parse(&status_str)?;

        Ok(DeadLetteredMessage {
            id: row.get("id"),
            event_type: row.get("event_type"),
            payload: row.get("payload"),
            error_message: row.get("error_message"),
            error_details: row.get("error_details"),
            delivery_count: row.get("delivery_count"),
            failed_at: row.get("failed_at"),
            status,
            resolved_at: row.get("resolved_at"),
            resolution_notes: row.get("resolution_notes"),
        })
    }
}

impl DeadLetters for PgDeadLetters {
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
            let (id,): (i64,) = sqlx::query_as(
                "INSERT INTO failed_events
                   (event_type, payload, error_message, error_details, delivery_count)
                 VALUES ($1, $2, $3, $4, $5)
                 RETURNING id",
            )
            .bind(&event_type)
            .bind(&payload)
            .bind(&error_message)
            .bind(&error_details)
            .bind(delivery_count)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DeadLetterError::Storage(e.to_string()))?;

            tracing::warn!(
                dlq_id = id,
                event_type = %event_type,
                error = %error_message,
                delivery_count = delivery_count,
                "Message dead-lettered"
            );

            metrics::counter!("dead_letter.added", "event_type" => event_type.clone())
                .increment(1);

            Ok(id)
        })
    }

    fn list_pending(
        &self,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<DeadLetteredMessage>>> + Send + '_>> {
        Box::pin(async move {
            #[allow(clippy::cast_possible_wrap)] // Operator-supplied limit, always small
            let rows = sqlx::query(
                "SELECT id, event_type, payload, error_message, error_details,
                        delivery_count, failed_at, status, resolved_at, resolution_notes
                 FROM failed_events
                 WHERE status = 'pending'
                 ORDER BY failed_at ASC
                 LIMIT $1",
            )
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DeadLetterError::Storage(e.to_string()))?;

            rows.iter().map(Self::row_to_message).collect()
        })
    }

    fn mark_resolved(
        &self,
        id: i64,
        notes: Option<&str>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let notes = notes.map(ToString::to_string);
        Box::pin(async move {
            sqlx::query(
                "UPDATE failed_events
                 SET status = 'resolved', resolved_at = now(), resolution_notes = $2
                 WHERE id = $1",
            )
            .bind(id)
            .bind(&notes)
            .execute(&self.pool)
            .await
            .map_err(|e| DeadLetterError::Storage(e.to_string()))?;

            tracing::info!(dlq_id = id, "Dead-letter entry resolved");
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
            sqlx::query(
                "UPDATE failed_events
                 SET status = 'discarded', resolved_at = now(), resolution_notes = $2
                 WHERE id = $1",
            )
            .bind(id)
            .bind(&reason)
            .execute(&self.pool)
            .await
            .map_err(|e| DeadLetterError::Storage(e.to_string()))?;

            tracing::warn!(dlq_id = id, reason = %reason, "Dead-letter entry discarded");
            Ok(())
        })
    }

    fn count_pending(&self) -> Pin<Box<dyn Future<Output = Result<i64>> + Send + '_>> {
        Box::pin(async move {
            let (count,): (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM failed_events WHERE status = 'pending'",
            )
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DeadLetterError::Storage(e.to_string()))?;

            Ok(count)
        })
    }
}
