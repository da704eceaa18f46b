//! In-memory read-model repositories.
//!
//! Semantics mirror the Postgres implementations exactly: upserts stomp,
//! increments return `None` for missing documents and never create them, and
//! statistics initialization is set-on-insert.

use atelier_core::event::Style;
use atelier_core::read_model::{
    next_average, DashboardOptions, DashboardSort, ImageFilters, ImageStatistics,
    ImageStatisticsStore, ImageStatus, NewProcessedImage, NewUserProfile, Page, Pagination,
    ProcessedImage, ProcessedImages, Result, UserProfile, UserProfiles,
};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

const DEFAULT_PAGE_SIZE: i64 = 12;

fn normalize_paging(page: i64, limit: i64) -> (i64, i64) {
    let page = page.max(1);
    let limit = if limit > 0 { limit } else { DEFAULT_PAGE_SIZE };
    (page, limit)
}

fn paginate(items: Vec<ProcessedImage>, page: i64, limit: i64) -> Page<ProcessedImage> {
    let total_items = i64::try_from(items.len()).unwrap_or(i64::MAX);
    let start = usize::try_from((page - 1) * limit).unwrap_or(usize::MAX);
    let take = usize::try_from(limit).unwrap_or(usize::MAX);
    Page {
        items: items.into_iter().skip(start).take(take).collect(),
        pagination: Pagination::new(page, limit, total_items),
    }
}

/// In-memory [`ProcessedImages`] keyed by `image_id`.
#[derive(Default)]
pub struct InMemoryProcessedImages {
    images: RwLock<HashMap<String, ProcessedImage>>,
}

impl InMemoryProcessedImages {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored image rows.
    pub async fn len(&self) -> usize {
        self.images.read().await.len()
    }

    /// Whether the repository is empty.
    pub async fn is_empty(&self) -> bool {
        self.images.read().await.is_empty()
    }
}

impl ProcessedImages for InMemoryProcessedImages {
    async fn upsert(&self, image: NewProcessedImage) -> Result<()> {
        let mut images = self.images.write().await;
        let now = Utc::now();
        // Upsert preserves the original creation time, like the SQL path.
        let created_at = images.get(&image.image_id).map_or(now, |e| e.created_at);
        images.insert(
            image.image_id.clone(),
            ProcessedImage {
                image_id: image.image_id,
                user_id: image.user_id,
                user_email: image.user_email,
                user_name: image.user_name,
                original_url: image.original_url,
                style: image.style,
                size: image.size,
                status: ImageStatus::Processing,
                processed_url: None,
                processing_time_ms: None,
                error_message: None,
                created_at,
                updated_at: now,
                processed_at: None,
            },
        );
        Ok(())
    }

    async fn mark_completed(
        &self,
        image_id: &str,
        processed_url: &str,
        processing_time_ms: i64,
    ) -> Result<Option<ProcessedImage>> {
        let mut images = self.images.write().await;
        Ok(images.get_mut(image_id).map(|image| {
            let now = Utc::now();
            image.status = ImageStatus::Completed;
            image.processed_url = Some(processed_url.to_string());
            image.processing_time_ms = Some(processing_time_ms);
            image.error_message = None;
            image.processed_at = Some(now);
            image.updated_at = now;
            image.clone()
        }))
    }

    async fn mark_failed(
        &self,
        image_id: &str,
        error_message: &str,
    ) -> Result<Option<ProcessedImage>> {
        let mut images = self.images.write().await;
        Ok(images.get_mut(image_id).map(|image| {
            let now = Utc::now();
            image.status = ImageStatus::Failed;
            image.error_message = Some(error_message.to_string());
            image.processed_at = Some(now);
            image.updated_at = now;
            image.clone()
        }))
    }

    async fn find_by_id(&self, image_id: &str) -> Result<Option<ProcessedImage>> {
        Ok(self.images.read().await.get(image_id).cloned())
    }

    async fn find_by_user_id(
        &self,
        user_id: &str,
        filters: ImageFilters,
    ) -> Result<Page<ProcessedImage>> {
        let images = self.images.read().await;
        let mut items: Vec<ProcessedImage> = images
            .values()
            .filter(|i| i.user_id == user_id)
            .filter(|i| filters.status.is_none_or(|s| i.status == s))
            .filter(|i| filters.style.is_none_or(|s| i.style == s))
            .cloned()
            .collect();

        // Newest result first, unprocessed rows last.
        items.sort_by(|a, b| {
            b.processed_at
                .cmp(&a.processed_at)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });

        let (page, limit) = normalize_paging(filters.page, filters.limit);
        Ok(paginate(items, page, limit))
    }

    async fn find_for_user_dashboard(
        &self,
        user_id: &str,
        options: DashboardOptions,
    ) -> Result<Page<ProcessedImage>> {
        let images = self.images.read().await;
        let mut items: Vec<ProcessedImage> = images
            .values()
            .filter(|i| i.user_id == user_id)
            .filter(|i| options.style.is_none_or(|s| i.style == s))
            .cloned()
            .collect();

        match options.sort {
            DashboardSort::Newest => items.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            DashboardSort::Oldest => items.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
            DashboardSort::Processed => items.sort_by(|a, b| {
                b.processed_at
                    .cmp(&a.processed_at)
                    .then_with(|| b.created_at.cmp(&a.created_at))
            }),
            DashboardSort::Unprocessed => items.sort_by(|a, b| {
                a.processed_at
                    .cmp(&b.processed_at)
                    .then_with(|| a.created_at.cmp(&b.created_at))
            }),
        }

        let (page, limit) = normalize_paging(options.page, options.limit);
        Ok(paginate(items, page, limit))
    }
}

/// In-memory [`UserProfiles`] keyed by `user_id`.
#[derive(Default)]
pub struct InMemoryUserProfiles {
    profiles: RwLock<HashMap<String, UserProfile>>,
}

impl InMemoryUserProfiles {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl UserProfiles for InMemoryUserProfiles {
    async fn upsert(&self, profile: NewUserProfile) -> Result<UserProfile> {
        let mut profiles = self.profiles.write().await;
        let stored = UserProfile {
            user_id: profile.user_id.clone(),
            firebase_uid: profile.firebase_uid,
            email: profile.email,
            full_name: profile.full_name,
            total_images: 0,
            total_processing_time: 0,
            last_activity: Utc::now(),
        };
        profiles.insert(profile.user_id, stored.clone());
        Ok(stored)
    }

    async fn increment_image_count(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let mut profiles = self.profiles.write().await;
        Ok(profiles.get_mut(user_id).map(|profile| {
            profile.total_images += 1;
            profile.last_activity = Utc::now();
            profile.clone()
        }))
    }

    async fn find_by_user_id(&self, user_id: &str) -> Result<Option<UserProfile>> {
        Ok(self.profiles.read().await.get(user_id).cloned())
    }

    async fn find_by_firebase_uid(&self, firebase_uid: &str) -> Result<Option<UserProfile>> {
        Ok(self
            .profiles
            .read()
            .await
            .values()
            .find(|p| p.firebase_uid == firebase_uid)
            .cloned())
    }

    async fn count(&self) -> Result<i64> {
        Ok(i64::try_from(self.profiles.read().await.len()).unwrap_or(i64::MAX))
    }
}

/// In-memory [`ImageStatisticsStore`] keyed by `user_id`.
#[derive(Default)]
pub struct InMemoryImageStatistics {
    statistics: RwLock<HashMap<String, ImageStatistics>>,
}

impl InMemoryImageStatistics {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ImageStatisticsStore for InMemoryImageStatistics {
    async fn initialize_for_user(&self, user_id: &str) -> Result<()> {
        let mut statistics = self.statistics.write().await;
        // Set-on-insert: replay must not reset accumulated counters.
        statistics.entry(user_id.to_string()).or_insert_with(|| ImageStatistics {
            user_id: user_id.to_string(),
            total_images: 0,
            completed_images: 0,
            failed_images: 0,
            processing_images: 0,
            avg_processing_time: 0,
            styles_used: BTreeMap::new(),
            last_updated: Utc::now(),
        });
        Ok(())
    }

    async fn increment_total(&self, user_id: &str) -> Result<Option<ImageStatistics>> {
        let mut statistics = self.statistics.write().await;
        Ok(statistics.get_mut(user_id).map(|stats| {
            stats.total_images += 1;
            stats.processing_images += 1;
            stats.last_updated = Utc::now();
            stats.clone()
        }))
    }

    async fn increment_style_used(
        &self,
        user_id: &str,
        style: Style,
    ) -> Result<Option<ImageStatistics>> {
        let mut statistics = self.statistics.write().await;
        Ok(statistics.get_mut(user_id).map(|stats| {
            *stats.styles_used.entry(style.as_str().to_string()).or_insert(0) += 1;
            stats.last_updated = Utc::now();
            stats.clone()
        }))
    }

    async fn increment_completed(
        &self,
        user_id: &str,
        processing_time_ms: i64,
    ) -> Result<Option<ImageStatistics>> {
        let mut statistics = self.statistics.write().await;
        Ok(statistics.get_mut(user_id).map(|stats| {
            stats.avg_processing_time =
                next_average(stats.avg_processing_time, stats.completed_images, processing_time_ms);
            stats.completed_images += 1;
            stats.processing_images -= 1;
            stats.last_updated = Utc::now();
            stats.clone()
        }))
    }

    async fn increment_failed(&self, user_id: &str) -> Result<Option<ImageStatistics>> {
        let mut statistics = self.statistics.write().await;
        Ok(statistics.get_mut(user_id).map(|stats| {
            stats.failed_images += 1;
            stats.processing_images -= 1;
            stats.last_updated = Utc::now();
            stats.clone()
        }))
    }

    async fn find_by_user_id(&self, user_id: &str) -> Result<Option<ImageStatistics>> {
        Ok(self.statistics.read().await.get(user_id).cloned())
    }
}
