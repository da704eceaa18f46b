//! Canonical domain events consumed by the query service.
//!
//! The command side publishes four event kinds. Several historical producers
//! disagree on naming: some emit class-style names (`"ImageUploadedEvent"`),
//! some routing keys (`"image.uploaded"`), and payload fields arrive in both
//! camelCase and snake_case. All of that variance is absorbed here, at the
//! boundary: [`EventKind`] owns the alias table and the payload structs carry
//! serde aliases, so everything past the envelope parser works with one
//! canonical shape.
//!
//! # Example
//!
//! ```
//! use atelier_core::event::EventKind;
//!
//! assert_eq!(EventKind::parse("ImageUploadedEvent"), Some(EventKind::ImageUploaded));
//! assert_eq!(EventKind::parse("image.uploaded"), Some(EventKind::ImageUploaded));
//! assert_eq!(EventKind::parse("SomethingNew"), None);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// The four event kinds materialized into the read model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A user completed registration on the command side.
    UserRegistered,
    /// An image was uploaded and queued for processing.
    ImageUploaded,
    /// The processing pipeline produced a result image.
    ImageProcessed,
    /// The processing pipeline gave up on an image.
    ProcessingFailed,
}

impl EventKind {
    /// All kinds, in the order they typically occur.
    pub const ALL: [Self; 4] = [
        Self::UserRegistered,
        Self::ImageUploaded,
        Self::ImageProcessed,
        Self::ProcessingFailed,
    ];

    /// Resolve an event-type string, including legacy aliases, to a kind.
    ///
    /// Returns `None` for unrecognized types. That is not an error: the
    /// consumer drops (acks) unknown types so that a producer shipping a new
    /// event kind ahead of this service does not create a poison-message loop.
    #[must_use]
    pub fn parse(event_type: &str) -> Option<Self> {
        match event_type {
            "UserRegistered" | "UserRegisteredEvent" | "user.registered" => {
                Some(Self::UserRegistered)
            }
            "ImageUploaded" | "ImageUploadedEvent" | "image.uploaded" => Some(Self::ImageUploaded),
            "ImageProcessed" | "ImageProcessedEvent" | "image.processed" => {
                Some(Self::ImageProcessed)
            }
            "ProcessingFailed" | "ProcessingFailedEvent" | "ProcessingError"
            | "image.processing_failed" => Some(Self::ProcessingFailed),
            _ => None,
        }
    }

    /// Canonical name, used for logging, metrics labels, and republishing.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::UserRegistered => "UserRegistered",
            Self::ImageUploaded => "ImageUploaded",
            Self::ImageProcessed => "ImageProcessed",
            Self::ProcessingFailed => "ProcessingFailed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transformation style requested at upload time.
///
/// Stored as its kebab-case wire name in both the `processed_images.style`
/// column and the `image_statistics.styles_used` counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Style {
    /// Oil painting rendition.
    OilPainting,
    /// Pixel-art rendition.
    PixelArt,
    /// Cartoon rendition.
    Cartoon,
    /// Photorealistic rendition.
    Realism,
    /// Anime rendition.
    Anime,
}

impl Style {
    /// Wire/storage name for this style.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OilPainting => "oil-painting",
            Self::PixelArt => "pixel-art",
            Self::Cartoon => "cartoon",
            Self::Realism => "realism",
            Self::Anime => "anime",
        }
    }

    /// Parse a storage name back into a style.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "oil-painting" => Some(Self::OilPainting),
            "pixel-art" => Some(Self::PixelArt),
            "cartoon" => Some(Self::Cartoon),
            "realism" => Some(Self::Realism),
            "anime" => Some(Self::Anime),
            _ => None,
        }
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a [`EventKind::UserRegistered`] event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRegistered {
    /// Platform user identifier.
    #[serde(alias = "user_id")]
    pub user_id: String,
    /// Registration email.
    pub email: String,
    /// Display name.
    #[serde(alias = "full_name")]
    pub full_name: String,
    /// External auth identifier.
    #[serde(alias = "firebase_uid")]
    pub firebase_uid: String,
}

/// Payload of a [`EventKind::ImageUploaded`] event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageUploaded {
    /// Image identifier, unique per upload.
    #[serde(alias = "image_id")]
    pub image_id: String,
    /// Owning user.
    #[serde(alias = "user_id")]
    pub user_id: String,
    /// Object-storage URL of the original upload.
    #[serde(alias = "original_url")]
    pub original_url: String,
    /// Requested transformation style.
    pub style: Style,
    /// Upload size in bytes.
    pub size: i64,
    /// Denormalized owner email, copied into the image view.
    #[serde(alias = "user_email")]
    pub user_email: String,
    /// Denormalized owner display name; older producers omit it.
    #[serde(default, alias = "user_name")]
    pub user_name: Option<String>,
}

/// Payload of a [`EventKind::ImageProcessed`] event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageProcessed {
    /// Image identifier.
    #[serde(alias = "image_id")]
    pub image_id: String,
    /// Owning user.
    #[serde(alias = "user_id")]
    pub user_id: String,
    /// Object-storage URL of the transformed image.
    #[serde(alias = "processed_url")]
    pub processed_url: String,
    /// Wall-clock processing duration in milliseconds.
    #[serde(rename = "processingTime", alias = "processing_time", alias = "processingTimeMs")]
    pub processing_time_ms: i64,
}

/// Payload of a [`EventKind::ProcessingFailed`] event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingFailed {
    /// Image identifier.
    #[serde(alias = "image_id")]
    pub image_id: String,
    /// Owning user.
    #[serde(alias = "user_id")]
    pub user_id: String,
    /// Human-readable failure reason from the pipeline.
    #[serde(alias = "error_message")]
    pub error: String,
}

/// A fully normalized domain event, one variant per [`EventKind`].
///
/// Handlers receive this type and never see raw envelope JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DomainEvent {
    /// See [`UserRegistered`].
    UserRegistered(UserRegistered),
    /// See [`ImageUploaded`].
    ImageUploaded(ImageUploaded),
    /// See [`ImageProcessed`].
    ImageProcessed(ImageProcessed),
    /// See [`ProcessingFailed`].
    ProcessingFailed(ProcessingFailed),
}

impl DomainEvent {
    /// The kind of this event.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::UserRegistered(_) => EventKind::UserRegistered,
            Self::ImageUploaded(_) => EventKind::ImageUploaded,
            Self::ImageProcessed(_) => EventKind::ImageProcessed,
            Self::ProcessingFailed(_) => EventKind::ProcessingFailed,
        }
    }

    /// The user this event belongs to.
    #[must_use]
    pub fn user_id(&self) -> &str {
        match self {
            Self::UserRegistered(e) => &e.user_id,
            Self::ImageUploaded(e) => &e.user_id,
            Self::ImageProcessed(e) => &e.user_id,
            Self::ProcessingFailed(e) => &e.user_id,
        }
    }

    /// Partition key for broker routing.
    ///
    /// All events for one user must land on the same partition so that a
    /// single consumer instance observes them in order. Every event carries a
    /// `user_id`, so that is the key.
    #[must_use]
    pub fn partition_key(&self) -> &str {
        self.user_id()
    }

    /// Decode a payload of the given kind from envelope data.
    ///
    /// # Errors
    ///
    /// Returns the underlying serde error when required fields are missing or
    /// have the wrong shape.
    pub fn from_kind_and_data(
        kind: EventKind,
        data: serde_json::Value,
    ) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            EventKind::UserRegistered => Self::UserRegistered(serde_json::from_value(data)?),
            EventKind::ImageUploaded => Self::ImageUploaded(serde_json::from_value(data)?),
            EventKind::ImageProcessed => Self::ImageProcessed(serde_json::from_value(data)?),
            EventKind::ProcessingFailed => Self::ProcessingFailed(serde_json::from_value(data)?),
        })
    }

    /// Serialize the payload back to envelope data.
    ///
    /// # Errors
    ///
    /// Returns the underlying serde error; payload structs always serialize,
    /// so this only fails under allocation pressure.
    pub fn to_data(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            Self::UserRegistered(e) => serde_json::to_value(e),
            Self::ImageUploaded(e) => serde_json::to_value(e),
            Self::ImageProcessed(e) => serde_json::to_value(e),
            Self::ProcessingFailed(e) => serde_json::to_value(e),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_parses_all_aliases() {
        for (alias, kind) in [
            ("UserRegistered", EventKind::UserRegistered),
            ("UserRegisteredEvent", EventKind::UserRegistered),
            ("user.registered", EventKind::UserRegistered),
            ("ImageUploadedEvent", EventKind::ImageUploaded),
            ("image.uploaded", EventKind::ImageUploaded),
            ("ImageProcessedEvent", EventKind::ImageProcessed),
            ("image.processed", EventKind::ImageProcessed),
            ("ProcessingFailedEvent", EventKind::ProcessingFailed),
            ("ProcessingError", EventKind::ProcessingFailed),
            ("image.processing_failed", EventKind::ProcessingFailed),
        ] {
            assert_eq!(EventKind::parse(alias), Some(kind), "alias {alias}");
        }
        assert_eq!(EventKind::parse("SomethingNew"), None);
    }

    #[test]
    fn canonical_name_parses_back() {
        for kind in EventKind::ALL {
            assert_eq!(EventKind::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn image_processed_accepts_both_field_spellings() {
        let camel = json!({
            "imageId": "img-1",
            "userId": "user-1",
            "processedUrl": "https://cdn.example.com/img-1.png",
            "processingTime": 1200,
        });
        let snake = json!({
            "image_id": "img-1",
            "user_id": "user-1",
            "processed_url": "https://cdn.example.com/img-1.png",
            "processing_time": 1200,
        });

        let a: ImageProcessed = serde_json::from_value(camel).unwrap();
        let b: ImageProcessed = serde_json::from_value(snake).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.processing_time_ms, 1200);
    }

    #[test]
    fn image_uploaded_tolerates_missing_user_name() {
        let event: ImageUploaded = serde_json::from_value(json!({
            "imageId": "img-1",
            "userId": "user-1",
            "originalUrl": "https://cdn.example.com/raw.jpg",
            "style": "cartoon",
            "size": 1024,
            "userEmail": "user@example.com",
        }))
        .unwrap();

        assert_eq!(event.style, Style::Cartoon);
        assert!(event.user_name.is_none());
    }

    #[test]
    fn style_roundtrip() {
        for style in [
            Style::OilPainting,
            Style::PixelArt,
            Style::Cartoon,
            Style::Realism,
            Style::Anime,
        ] {
            assert_eq!(Style::parse(style.as_str()), Some(style));
        }
        assert_eq!(Style::parse("watercolor"), None);
    }

    #[test]
    fn partition_key_is_user_id() {
        let event = DomainEvent::ProcessingFailed(ProcessingFailed {
            image_id: "img-9".to_string(),
            user_id: "user-9".to_string(),
            error: "model timeout".to_string(),
        });
        assert_eq!(event.partition_key(), "user-9");
    }
}
