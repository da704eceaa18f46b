//! Postgres repository for the processed-image collection.

use atelier_core::event::Style;
use atelier_core::read_model::{
    DashboardOptions, DashboardSort, ImageFilters, ImageStatus, NewProcessedImage, Page,
    Pagination, ProcessedImage, ProcessedImages, ReadModelError, Result,
};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

const DEFAULT_PAGE_SIZE: i64 = 12;

const SELECT_COLUMNS: &str = "image_id, user_id, user_email, user_name, original_url, style, \
     size, status, processed_url, processing_time_ms, error_message, \
     created_at, updated_at, processed_at";

/// Postgres-backed [`ProcessedImages`] repository.
#[derive(Clone)]
pub struct PgProcessedImages {
    pool: PgPool,
}

impl PgProcessedImages {
    /// Create a repository using an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_image(row: &PgRow) -> Result<ProcessedImage> {
        let style_str: String = row.get("style");
        let style = Style::parse(&style_str)
            .ok_or_else(|| ReadModelError::Serialization(format!("unknown style: {style_str}")))?;

        let status_str: String = row.get("status");
        let status = ImageStatus::parse(&status_str).ok_or_else(|| {
            ReadModelError::Serialization(format!("unknown status: {status_str}"))
        })?;

        Ok(ProcessedImage {
            image_id: row.get("image_id"),
            user_id: row.get("user_id"),
            user_email: row.get("user_email"),
            user_name: row.get("user_name"),
            original_url: row.get("original_url"),
            style,
            size: row.get("size"),
            status,
            processed_url: row.get("processed_url"),
            processing_time_ms: row.get("processing_time_ms"),
            error_message: row.get("error_message"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
            processed_at: row.get("processed_at"),
        })
    }

    async fn page_query(
        &self,
        where_sql: &str,
        order_sql: &str,
        binds: &[&str],
        page: i64,
        limit: i64,
    ) -> Result<Page<ProcessedImage>> {
        let page = page.max(1);
        let limit = if limit > 0 { limit } else { DEFAULT_PAGE_SIZE };
        let offset = (page - 1) * limit;

        let select_sql = format!(
            "SELECT {SELECT_COLUMNS} FROM processed_images WHERE {where_sql} \
             ORDER BY {order_sql} LIMIT {limit} OFFSET {offset}"
        );
        let count_sql = format!("SELECT COUNT(*) FROM processed_images WHERE {where_sql}");

        let mut select = sqlx::query(&select_sql);
        let mut count = sqlx::query_as::<_, (i64,)>(&count_sql);
        for bind in binds {
            select = select.bind(*bind);
            count = count.bind(*bind);
        }

        let rows = select
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ReadModelError::Storage(format!("Failed to query images: {e}")))?;
        let (total_items,) = count
            .fetch_one(&self.pool)
            .await
            .map_err(|e| ReadModelError::Storage(format!("Failed to count images: {e}")))?;

        let items = rows
            .iter()
            .map(Self::row_to_image)
            .collect::<Result<Vec<_>>>()?;

        Ok(Page {
            items,
            pagination: Pagination::new(page, limit, total_items),
        })
    }
}

impl ProcessedImages for PgProcessedImages {
    async fn upsert(&self, image: NewProcessedImage) -> Result<()> {
        // Keyed on image_id so a redelivered upload event stomps the row
        // instead of double-inserting. created_at is preserved on conflict.
        sqlx::query(
            "INSERT INTO processed_images
               (image_id, user_id, user_email, user_name, original_url, style, size,
                status, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, 'processing', now(), now())
             ON CONFLICT (image_id) DO UPDATE
             SET user_id = EXCLUDED.user_id,
                 user_email = EXCLUDED.user_email,
                 user_name = EXCLUDED.user_name,
                 original_url = EXCLUDED.original_url,
                 style = EXCLUDED.style,
                 size = EXCLUDED.size,
                 status = 'processing',
                 updated_at = now()",
        )
        .bind(&image.image_id)
        .bind(&image.user_id)
        .bind(&image.user_email)
        .bind(&image.user_name)
        .bind(&image.original_url)
        .bind(image.style.as_str())
        .bind(image.size)
        .execute(&self.pool)
        .await
        .map_err(|e| ReadModelError::Storage(format!("Failed to upsert image: {e}")))?;

        Ok(())
    }

    async fn mark_completed(
        &self,
        image_id: &str,
        processed_url: &str,
        processing_time_ms: i64,
    ) -> Result<Option<ProcessedImage>> {
        let row = sqlx::query(&format!(
            "UPDATE processed_images
             SET status = 'completed',
                 processed_url = $2,
                 processing_time_ms = $3,
                 processed_at = now(),
                 updated_at = now()
             WHERE image_id = $1
             RETURNING {SELECT_COLUMNS}"
        ))
        .bind(image_id)
        .bind(processed_url)
        .bind(processing_time_ms)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ReadModelError::Storage(format!("Failed to mark completed: {e}")))?;

        row.as_ref().map(Self::row_to_image).transpose()
    }

    async fn mark_failed(
        &self,
        image_id: &str,
        error_message: &str,
    ) -> Result<Option<ProcessedImage>> {
        let row = sqlx::query(&format!(
            "UPDATE processed_images
             SET status = 'failed',
                 error_message = $2,
                 updated_at = now()
             WHERE image_id = $1
             RETURNING {SELECT_COLUMNS}"
        ))
        .bind(image_id)
        .bind(error_message)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ReadModelError::Storage(format!("Failed to mark failed: {e}")))?;

        row.as_ref().map(Self::row_to_image).transpose()
    }

    async fn find_by_id(&self, image_id: &str) -> Result<Option<ProcessedImage>> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM processed_images WHERE image_id = $1"
        ))
        .bind(image_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ReadModelError::Storage(format!("Failed to find image: {e}")))?;

        row.as_ref().map(Self::row_to_image).transpose()
    }

    async fn find_by_user_id(
        &self,
        user_id: &str,
        filters: ImageFilters,
    ) -> Result<Page<ProcessedImage>> {
        let mut where_sql = "user_id = $1".to_string();
        let mut binds: Vec<&str> = vec![user_id];

        let status_str = filters.status.map(|s| s.as_str());
        if let Some(status) = status_str {
            binds.push(status);
            where_sql.push_str(&format!(" AND status = ${}", binds.len()));
        }
        let style_str = filters.style.map(|s| s.as_str());
        if let Some(style) = style_str {
            binds.push(style);
            where_sql.push_str(&format!(" AND style = ${}", binds.len()));
        }

        self.page_query(
            &where_sql,
            "processed_at DESC NULLS LAST, created_at DESC",
            &binds,
            filters.page,
            filters.limit,
        )
        .await
    }

    async fn find_for_user_dashboard(
        &self,
        user_id: &str,
        options: DashboardOptions,
    ) -> Result<Page<ProcessedImage>> {
        let mut where_sql = "user_id = $1".to_string();
        let mut binds: Vec<&str> = vec![user_id];

        let style_str = options.style.map(|s| s.as_str());
        if let Some(style) = style_str {
            binds.push(style);
            where_sql.push_str(&format!(" AND style = ${}", binds.len()));
        }

        let order_sql = match options.sort {
            DashboardSort::Newest => "created_at DESC",
            DashboardSort::Oldest => "created_at ASC",
            DashboardSort::Processed => "processed_at DESC NULLS LAST",
            DashboardSort::Unprocessed => "processed_at ASC NULLS FIRST",
        };

        self.page_query(&where_sql, order_sql, &binds, options.page, options.limit)
            .await
    }
}
