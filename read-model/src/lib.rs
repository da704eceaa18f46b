//! Postgres implementations of the Atelier read model.
//!
//! # Overview
//!
//! This crate materializes the query side of the platform into three Postgres
//! tables (`processed_images`, `user_profiles`, `image_statistics`) plus the
//! `failed_events` dead-letter table:
//!
//! - [`PgProcessedImages`]: per-image denormalized view
//! - [`PgUserProfiles`]: per-user profile with upload counters
//! - [`PgImageStatistics`]: per-user counters, style usage, running average
//! - [`PgDeadLetters`]: dead-letter storage
//!
//! # CQRS Separation
//!
//! The read database is independent of the command side's relational schema;
//! the only coupling is the event stream. For true CQRS run it on a separate
//! database from anything the write path touches.
//!
//! All counter mutations are single conditional UPDATE statements with
//! `RETURNING`, so they are atomic at the store layer and double as the
//! missing-document check that handlers turn into sync faults.

pub mod dead_letter;
pub mod processed_images;
pub mod statistics;
pub mod user_profiles;

pub use dead_letter::PgDeadLetters;
pub use processed_images::PgProcessedImages;
pub use statistics::PgImageStatistics;
pub use user_profiles::PgUserProfiles;

use atelier_core::read_model::{ReadModelError, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};

/// Connect to the read-model database.
///
/// # Errors
///
/// Returns [`ReadModelError::Storage`] if the connection fails.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .map_err(|e| ReadModelError::Storage(format!("Failed to connect: {e}")))
}

/// Run database migrations for the read-model and dead-letter tables.
///
/// Idempotent; safe to run on every startup.
///
/// # Errors
///
/// Returns [`ReadModelError::Storage`] if a migration fails.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| ReadModelError::Storage(format!("Migration failed: {e}")))?;
    Ok(())
}
