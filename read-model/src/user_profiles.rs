//! Postgres repository for the user-profile collection.

use atelier_core::read_model::{
    NewUserProfile, ReadModelError, Result, UserProfile, UserProfiles,
};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

const SELECT_COLUMNS: &str =
    "user_id, firebase_uid, email, full_name, total_images, total_processing_time, last_activity";

/// Postgres-backed [`UserProfiles`] repository.
#[derive(Clone)]
pub struct PgUserProfiles {
    pool: PgPool,
}

impl PgUserProfiles {
    /// Create a repository using an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_profile(row: &PgRow) -> UserProfile {
        UserProfile {
            user_id: row.get("user_id"),
            firebase_uid: row.get("firebase_uid"),
            email: row.get("email"),
            full_name: row.get("full_name"),
            total_images: row.get("total_images"),
            total_processing_time: row.get("total_processing_time"),
            last_activity: row.get("last_activity"),
        }
    }
}

impl UserProfiles for PgUserProfiles {
    async fn upsert(&self, profile: NewUserProfile) -> Result<UserProfile> {
        // Registration materializes a fresh profile with zeroed counters; a
        // redelivered registration rewrites identity fields the same way.
        let row = sqlx::query(&format!(
            "INSERT INTO user_profiles
               (user_id, firebase_uid, email, full_name, total_images,
                total_processing_time, last_activity)
             VALUES ($1, $2, $3, $4, 0, 0, now())
             ON CONFLICT (user_id) DO UPDATE
             SET firebase_uid = EXCLUDED.firebase_uid,
                 email = EXCLUDED.email,
                 full_name = EXCLUDED.full_name,
                 total_images = 0,
                 total_processing_time = 0,
                 last_activity = now()
             RETURNING {SELECT_COLUMNS}"
        ))
        .bind(&profile.user_id)
        .bind(&profile.firebase_uid)
        .bind(&profile.email)
        .bind(&profile.full_name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| ReadModelError::Storage(format!("Failed to upsert profile: {e}")))?;

        Ok(Self::row_to_profile(&row))
    }

    async fn increment_image_count(&self, user_id: &str) -> Result<Option<UserProfile>> {
        // Single conditional UPDATE: atomic under concurrent handler
        // invocations, and RETURNING doubles as the existence check.
        let row = sqlx::query(&format!(
            "UPDATE user_profiles
             SET total_images = total_images + 1,
                 last_activity = now()
             WHERE user_id = $1
             RETURNING {SELECT_COLUMNS}"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ReadModelError::Storage(format!("Failed to increment image count: {e}")))?;

        Ok(row.as_ref().map(Self::row_to_profile))
    }

    async fn find_by_user_id(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM user_profiles WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ReadModelError::Storage(format!("Failed to find profile: {e}")))?;

        Ok(row.as_ref().map(Self::row_to_profile))
    }

    async fn find_by_firebase_uid(&self, firebase_uid: &str) -> Result<Option<UserProfile>> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM user_profiles WHERE firebase_uid = $1"
        ))
        .bind(firebase_uid)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ReadModelError::Storage(format!("Failed to find profile: {e}")))?;

        Ok(row.as_ref().map(Self::row_to_profile))
    }

    async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM user_profiles")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| ReadModelError::Storage(format!("Failed to count profiles: {e}")))?;

        Ok(count)
    }
}
