//! Postgres repository for the per-user statistics collection.

use atelier_core::event::Style;
use atelier_core::read_model::{
    ImageStatistics, ImageStatisticsStore, ReadModelError, Result, next_average,
};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::collections::BTreeMap;

const SELECT_COLUMNS: &str = "user_id, total_images, completed_images, failed_images, \
     processing_images, avg_processing_time, styles_used, last_updated";

/// Postgres-backed [`ImageStatisticsStore`] repository.
#[derive(Clone)]
pub struct PgImageStatistics {
    pool: PgPool,
}

impl PgImageStatistics {
    /// Create a repository using an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_stats(row: &PgRow) -> Result<ImageStatistics> {
        let styles_json: serde_json::Value = row.get("styles_used");
        let styles_used: BTreeMap<String, i64> = serde_json::from_value(styles_json)
            .map_err(|e| ReadModelError::Serialization(format!("bad styles_used: {e}")))?;

        Ok(ImageStatistics {
            user_id: row.get("user_id"),
            total_images: row.get("total_images"),
            completed_images: row.get("completed_images"),
            failed_images: row.get("failed_images"),
            processing_images: row.get("processing_images"),
            avg_processing_time: row.get("avg_processing_time"),
            styles_used,
            last_updated: row.get("last_updated"),
        })
    }
}

impl ImageStatisticsStore for PgImageStatistics {
    async fn initialize_for_user(&self, user_id: &str) -> Result<()> {
        // Set-on-insert: DO NOTHING preserves accumulated counters when the
        // registration event is replayed or arrives out of order.
        sqlx::query(
            "INSERT INTO image_statistics
               (user_id, total_images, completed_images, failed_images,
                processing_images, avg_processing_time, styles_used, last_updated)
             VALUES ($1, 0, 0, 0, 0, 0, '{}'::jsonb, now())
             ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| ReadModelError::Storage(format!("Failed to initialize statistics: {e}")))?;

        Ok(())
    }

    async fn increment_total(&self, user_id: &str) -> Result<Option<ImageStatistics>> {
        let row = sqlx::query(&format!(
            "UPDATE image_statistics
             SET total_images = total_images + 1,
                 processing_images = processing_images + 1,
                 last_updated = now()
             WHERE user_id = $1
             RETURNING {SELECT_COLUMNS}"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ReadModelError::Storage(format!("Failed to increment total: {e}")))?;

        row.as_ref().map(Self::row_to_stats).transpose()
    }

    async fn increment_style_used(
        &self,
        user_id: &str,
        style: Style,
    ) -> Result<Option<ImageStatistics>> {
        // Single-statement JSONB bump, atomic at the store layer.
        let row = sqlx::query(&format!(
            "UPDATE image_statistics
             SET styles_used = jsonb_set(
                     styles_used,
                     ARRAY[$2],
                     to_jsonb(COALESCE((styles_used ->> $2)::bigint, 0) + 1)),
                 last_updated = now()
             WHERE user_id = $1
             RETURNING {SELECT_COLUMNS}"
        ))
        .bind(user_id)
        .bind(style.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ReadModelError::Storage(format!("Failed to increment style: {e}")))?;

        row.as_ref().map(Self::row_to_stats).transpose()
    }

    async fn increment_completed(
        &self,
        user_id: &str,
        processing_time_ms: i64,
    ) -> Result<Option<ImageStatistics>> {
        // The average needs the pre-update completed count, so this is a
        // fresh read followed by one atomic UPDATE. Concurrent completions
        // for one user could compute a stale average; with prefetch 1 and
        // user_id partitioning the window never opens.
        let prior: Option<(i64, i64)> = sqlx::query_as(
            "SELECT avg_processing_time, completed_images
             FROM image_statistics WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ReadModelError::Storage(format!("Failed to read statistics: {e}")))?;

        let Some((old_avg, old_completed)) = prior else {
            return Ok(None);
        };
        let new_avg = next_average(old_avg, old_completed, processing_time_ms);

        let row = sqlx::query(&format!(
            "UPDATE image_statistics
             SET completed_images = completed_images + 1,
                 processing_images = processing_images - 1,
                 avg_processing_time = $2,
                 last_updated = now()
             WHERE user_id = $1
             RETURNING {SELECT_COLUMNS}"
        ))
        .bind(user_id)
        .bind(new_avg)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ReadModelError::Storage(format!("Failed to increment completed: {e}")))?;

        row.as_ref().map(Self::row_to_stats).transpose()
    }

    async fn increment_failed(&self, user_id: &str) -> Result<Option<ImageStatistics>> {
        let row = sqlx::query(&format!(
            "UPDATE image_statistics
             SET failed_images = failed_images + 1,
                 processing_images = processing_images - 1,
                 last_updated = now()
             WHERE user_id = $1
             RETURNING {SELECT_COLUMNS}"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ReadModelError::Storage(format!("Failed to increment failed: {e}")))?;

        row.as_ref().map(Self::row_to_stats).transpose()
    }

    async fn find_by_user_id(&self, user_id: &str) -> Result<Option<ImageStatistics>> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM image_statistics WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ReadModelError::Storage(format!("Failed to find statistics: {e}")))?;

        row.as_ref().map(Self::row_to_stats).transpose()
    }
}
