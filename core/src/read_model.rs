//! Read-model collections and repository abstractions.
//!
//! The query side of the platform keeps three denormalized collections, all
//! keyed by `user_id` (images additionally by `image_id`):
//!
//! - [`ProcessedImage`]: one row per uploaded image
//! - [`UserProfile`]: one row per registered user
//! - [`ImageStatistics`]: per-user counters and the running average
//!
//! There is no foreign-key enforcement between them; consistency comes from
//! event ordering and handler logic (the CQRS read-model pattern). Each
//! repository exposes atomic, idempotent primitives (counter bumps are single
//! conditional UPDATE statements, never read-then-write) and point lookups
//! that return `None` when a document is absent, which is how handlers detect
//! cross-collection desync.
//!
//! Concrete Postgres implementations live in `atelier-read-model`; in-memory
//! fakes for tests live in `atelier-testing`.

use crate::event::Style;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;

/// Error type for read-model storage operations.
#[derive(Debug, thiserror::Error)]
pub enum ReadModelError {
    /// Storage backend error.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error (JSONB columns, enums).
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for read-model operations.
pub type Result<T> = std::result::Result<T, ReadModelError>;

/// Lifecycle status of a processed image.
///
/// Transitions are `processing → completed` or `processing → failed`, both
/// terminal. The write path never moves a row backwards, though an idempotent
/// upsert of a redelivered upload event may stomp a terminal status; the
/// subsequent result event restores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageStatus {
    /// Upload materialized, result pending.
    Processing,
    /// Transformation succeeded.
    Completed,
    /// Transformation failed permanently.
    Failed,
}

impl ImageStatus {
    /// Storage name for this status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parse a storage name back into a status.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for ImageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Denormalized view of one uploaded image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedImage {
    /// Unique image identifier.
    pub image_id: String,
    /// Owning user.
    pub user_id: String,
    /// Denormalized owner email.
    pub user_email: String,
    /// Denormalized owner display name.
    pub user_name: Option<String>,
    /// Object-storage URL of the original upload.
    pub original_url: String,
    /// Requested transformation style.
    pub style: Style,
    /// Upload size in bytes.
    pub size: i64,
    /// Current lifecycle status.
    pub status: ImageStatus,
    /// Result URL, set when completed.
    pub processed_url: Option<String>,
    /// Processing duration in milliseconds, set when completed.
    pub processing_time_ms: Option<i64>,
    /// Failure reason, set when failed.
    pub error_message: Option<String>,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
    /// When the row was last written.
    pub updated_at: DateTime<Utc>,
    /// When the result arrived, if it has.
    pub processed_at: Option<DateTime<Utc>>,
}

/// Fields for materializing a new image row from an upload event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProcessedImage {
    /// Unique image identifier.
    pub image_id: String,
    /// Owning user.
    pub user_id: String,
    /// Denormalized owner email.
    pub user_email: String,
    /// Denormalized owner display name.
    pub user_name: Option<String>,
    /// Object-storage URL of the original upload.
    pub original_url: String,
    /// Requested transformation style.
    pub style: Style,
    /// Upload size in bytes.
    pub size: i64,
}

/// Denormalized view of one registered user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Platform user identifier.
    pub user_id: String,
    /// External auth identifier.
    pub firebase_uid: String,
    /// Registration email.
    pub email: String,
    /// Display name.
    pub full_name: String,
    /// Monotonic count of uploads by this user.
    pub total_images: i64,
    /// Accumulated processing time in milliseconds.
    pub total_processing_time: i64,
    /// Timestamp of the user's most recent activity.
    pub last_activity: DateTime<Utc>,
}

/// Fields for upserting a profile from a registration event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUserProfile {
    /// Platform user identifier.
    pub user_id: String,
    /// External auth identifier.
    pub firebase_uid: String,
    /// Registration email.
    pub email: String,
    /// Display name.
    pub full_name: String,
}

/// Per-user processing counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageStatistics {
    /// Platform user identifier.
    pub user_id: String,
    /// Total uploads.
    pub total_images: i64,
    /// Uploads that completed.
    pub completed_images: i64,
    /// Uploads that failed.
    pub failed_images: i64,
    /// Uploads still in flight.
    pub processing_images: i64,
    /// Running weighted average of processing time, in milliseconds, rounded.
    pub avg_processing_time: i64,
    /// Usage count per style name.
    pub styles_used: BTreeMap<String, i64>,
    /// When any counter last changed.
    pub last_updated: DateTime<Utc>,
}

/// Recompute the running weighted average after one more completed sample.
///
/// `new_avg = (old_avg * old_completed + sample) / (old_completed + 1)`,
/// rounded to the nearest millisecond. With zero prior completions the sample
/// becomes the average.
#[must_use]
pub fn next_average(old_avg: i64, old_completed: i64, sample_ms: i64) -> i64 {
    if old_completed <= 0 {
        return sample_ms;
    }
    #[allow(clippy::cast_precision_loss)] // Millisecond magnitudes fit f64 exactly
    let avg = (old_avg as f64).mul_add(old_completed as f64, sample_ms as f64)
        / (old_completed as f64 + 1.0);
    #[allow(clippy::cast_possible_truncation)] // Rounded value is back in i64 range
    {
        avg.round() as i64
    }
}

/// Pagination metadata returned alongside image pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// 1-based page number.
    pub current_page: i64,
    /// Total number of pages.
    pub total_pages: i64,
    /// Total matching rows.
    pub total_items: i64,
    /// Page size.
    pub items_per_page: i64,
    /// Whether a later page exists.
    pub has_next_page: bool,
    /// Whether an earlier page exists.
    pub has_previous_page: bool,
}

impl Pagination {
    /// Build pagination metadata from a page request and a total count.
    #[must_use]
    pub fn new(page: i64, limit: i64, total_items: i64) -> Self {
        let total_pages = if limit > 0 {
            total_items.div_euclid(limit) + i64::from(total_items.rem_euclid(limit) != 0)
        } else {
            0
        };
        Self {
            current_page: page,
            total_pages,
            total_items,
            items_per_page: limit,
            has_next_page: page * limit < total_items,
            has_previous_page: page > 1,
        }
    }
}

/// A page of rows plus its pagination metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Rows in this page.
    pub items: Vec<T>,
    /// Pagination metadata.
    pub pagination: Pagination,
}

/// Filters for [`ProcessedImages::find_by_user_id`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageFilters {
    /// Restrict to one status.
    pub status: Option<ImageStatus>,
    /// Restrict to one style.
    pub style: Option<Style>,
    /// 1-based page; zero or negative means page 1.
    pub page: i64,
    /// Page size; zero or negative means the default of 12.
    pub limit: i64,
}

/// Sort strategies for the user dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DashboardSort {
    /// Most recently created first.
    #[default]
    Newest,
    /// Oldest first.
    Oldest,
    /// Most recently processed first.
    Processed,
    /// Least recently processed first.
    Unprocessed,
}

/// Options for [`ProcessedImages::find_for_user_dashboard`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DashboardOptions {
    /// 1-based page; zero or negative means page 1.
    pub page: i64,
    /// Page size; zero or negative means the default of 12.
    pub limit: i64,
    /// Restrict to one style; `None` means all.
    pub style: Option<Style>,
    /// Sort strategy.
    pub sort: DashboardSort,
}

/// Repository for the processed-image collection.
pub trait ProcessedImages: Send + Sync {
    /// Replace-or-create an image row keyed by `image_id`, status
    /// `processing`.
    ///
    /// Upsert rather than insert: redelivery of an upload event must stomp the
    /// existing row, not double-insert.
    ///
    /// # Errors
    ///
    /// Returns [`ReadModelError::Storage`] if the write fails.
    fn upsert(&self, image: NewProcessedImage) -> impl Future<Output = Result<()>> + Send;

    /// Mark an image completed with its result URL and duration.
    ///
    /// Returns the updated row, or `None` when no row with that `image_id`
    /// exists, the desync signal.
    ///
    /// # Errors
    ///
    /// Returns [`ReadModelError::Storage`] if the write fails.
    fn mark_completed(
        &self,
        image_id: &str,
        processed_url: &str,
        processing_time_ms: i64,
    ) -> impl Future<Output = Result<Option<ProcessedImage>>> + Send;

    /// Mark an image failed with its error message.
    ///
    /// Returns the updated row, or `None` when the row is missing.
    ///
    /// # Errors
    ///
    /// Returns [`ReadModelError::Storage`] if the write fails.
    fn mark_failed(
        &self,
        image_id: &str,
        error_message: &str,
    ) -> impl Future<Output = Result<Option<ProcessedImage>>> + Send;

    /// Point lookup by image id.
    ///
    /// # Errors
    ///
    /// Returns [`ReadModelError::Storage`] if the query fails.
    fn find_by_id(
        &self,
        image_id: &str,
    ) -> impl Future<Output = Result<Option<ProcessedImage>>> + Send;

    /// Page through a user's images, newest result first.
    ///
    /// # Errors
    ///
    /// Returns [`ReadModelError::Storage`] if the query fails.
    fn find_by_user_id(
        &self,
        user_id: &str,
        filters: ImageFilters,
    ) -> impl Future<Output = Result<Page<ProcessedImage>>> + Send;

    /// Page through a user's images with dashboard sorting.
    ///
    /// # Errors
    ///
    /// Returns [`ReadModelError::Storage`] if the query fails.
    fn find_for_user_dashboard(
        &self,
        user_id: &str,
        options: DashboardOptions,
    ) -> impl Future<Output = Result<Page<ProcessedImage>>> + Send;
}

/// Repository for the user-profile collection.
pub trait UserProfiles: Send + Sync {
    /// Replace-or-create a profile keyed by `user_id` with zeroed counters.
    ///
    /// Safe to re-run: re-registration resets denormalized identity fields but
    /// is otherwise harmless.
    ///
    /// # Errors
    ///
    /// Returns [`ReadModelError::Storage`] if the write fails.
    fn upsert(&self, profile: NewUserProfile) -> impl Future<Output = Result<UserProfile>> + Send;

    /// Atomically bump `total_images` and refresh `last_activity`.
    ///
    /// Returns the updated profile, or `None` when no profile exists for
    /// `user_id`, the desync signal. Never creates a profile.
    ///
    /// # Errors
    ///
    /// Returns [`ReadModelError::Storage`] if the write fails.
    fn increment_image_count(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Option<UserProfile>>> + Send;

    /// Point lookup by user id.
    ///
    /// # Errors
    ///
    /// Returns [`ReadModelError::Storage`] if the query fails.
    fn find_by_user_id(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Option<UserProfile>>> + Send;

    /// Point lookup by external auth id.
    ///
    /// # Errors
    ///
    /// Returns [`ReadModelError::Storage`] if the query fails.
    fn find_by_firebase_uid(
        &self,
        firebase_uid: &str,
    ) -> impl Future<Output = Result<Option<UserProfile>>> + Send;

    /// Total registered users, for the aggregated-metrics gauge.
    ///
    /// # Errors
    ///
    /// Returns [`ReadModelError::Storage`] if the query fails.
    fn count(&self) -> impl Future<Output = Result<i64>> + Send;
}

/// Repository for the per-user statistics collection.
pub trait ImageStatisticsStore: Send + Sync {
    /// Insert a zeroed statistics document if none exists.
    ///
    /// Set-on-insert semantics: replay or out-of-order delivery must never
    /// reset accumulated counters.
    ///
    /// # Errors
    ///
    /// Returns [`ReadModelError::Storage`] if the write fails.
    fn initialize_for_user(&self, user_id: &str) -> impl Future<Output = Result<()>> + Send;

    /// Atomically bump `total_images` and `processing_images`.
    ///
    /// Returns the updated document, or `None` when it is missing.
    ///
    /// # Errors
    ///
    /// Returns [`ReadModelError::Storage`] if the write fails.
    fn increment_total(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Option<ImageStatistics>>> + Send;

    /// Atomically bump the usage counter for one style.
    ///
    /// Returns the updated document, or `None` when it is missing.
    ///
    /// # Errors
    ///
    /// Returns [`ReadModelError::Storage`] if the write fails.
    fn increment_style_used(
        &self,
        user_id: &str,
        style: Style,
    ) -> impl Future<Output = Result<Option<ImageStatistics>>> + Send;

    /// Record a completion: `completed_images += 1`, `processing_images -= 1`,
    /// and recompute the running average from a fresh read via
    /// [`next_average`].
    ///
    /// The fresh-read-then-update sequence accepts a narrow race when two
    /// completions for the same user are processed concurrently; with a
    /// prefetch of one per consumer and `user_id` partitioning that does not
    /// occur.
    ///
    /// Returns the updated document, or `None` when it is missing.
    ///
    /// # Errors
    ///
    /// Returns [`ReadModelError::Storage`] if the write fails.
    fn increment_completed(
        &self,
        user_id: &str,
        processing_time_ms: i64,
    ) -> impl Future<Output = Result<Option<ImageStatistics>>> + Send;

    /// Record a failure: `failed_images += 1`, `processing_images -= 1`.
    ///
    /// Returns the updated document, or `None` when it is missing.
    ///
    /// # Errors
    ///
    /// Returns [`ReadModelError::Storage`] if the write fails.
    fn increment_failed(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Option<ImageStatistics>>> + Send;

    /// Point lookup by user id.
    ///
    /// # Errors
    ///
    /// Returns [`ReadModelError::Storage`] if the query fails.
    fn find_by_user_id(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Option<ImageStatistics>>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_becomes_the_average() {
        assert_eq!(next_average(0, 0, 1000), 1000);
    }

    #[test]
    fn average_of_two_samples() {
        // 1000ms then 2000ms must yield exactly 1500.
        let after_first = next_average(0, 0, 1000);
        assert_eq!(next_average(after_first, 1, 2000), 1500);
    }

    #[test]
    fn average_rounds_to_nearest_millisecond() {
        // (100 * 2 + 101) / 3 = 100.33.. -> 100
        assert_eq!(next_average(100, 2, 101), 100);
        // (100 * 1 + 101) / 2 = 100.5 -> 101
        assert_eq!(next_average(100, 1, 101), 101);
    }

    #[test]
    fn pagination_math() {
        let p = Pagination::new(1, 12, 25);
        assert_eq!(p.total_pages, 3);
        assert!(p.has_next_page);
        assert!(!p.has_previous_page);

        let last = Pagination::new(3, 12, 25);
        assert!(!last.has_next_page);
        assert!(last.has_previous_page);
    }

    #[test]
    fn status_roundtrip() {
        for status in [ImageStatus::Processing, ImageStatus::Completed, ImageStatus::Failed] {
            assert_eq!(ImageStatus::parse(status.as_str()), Some(status));
        }
        assert!(ImageStatus::parse("queued").is_none());
    }
}
