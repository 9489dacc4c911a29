//! Uploaded media and their derived responsive variants.

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

const INLINE_IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp", "image/gif"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaRecord {
    pub id: Uuid,
    /// Object-store key of the original upload.
    pub object_key: String,
    pub original_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub alt_text: String,
    pub checksum: String,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaVariantRecord {
    pub media_id: Uuid,
    pub name: String,
    pub object_key: String,
    pub width: u32,
    pub height: u32,
    pub content_type: String,
    pub size_bytes: i64,
}

/// Whether variants can be derived for the provided MIME type.
pub fn supports_variants(content_type: &str) -> bool {
    INLINE_IMAGE_TYPES.contains(&content_type)
}

/// Object-store key for a derived variant, kept beside its original.
pub fn variant_object_key(original_key: &str, variant_name: &str) -> String {
    let (stem, _) = match original_key.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.contains('/') => (stem, ext),
        _ => (original_key, ""),
    };
    format!("{stem}-{variant_name}.jpg")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_keys_replace_extension() {
        assert_eq!(
            variant_object_key("2025/01/02/abc-photo.png", "small"),
            "2025/01/02/abc-photo-small.jpg"
        );
    }

    #[test]
    fn variant_keys_tolerate_missing_extension() {
        assert_eq!(
            variant_object_key("uploads/photo", "large"),
            "uploads/photo-large.jpg"
        );
        assert_eq!(
            variant_object_key("dir.v2/photo", "large"),
            "dir.v2/photo-large.jpg"
        );
    }

    #[test]
    fn only_raster_images_support_variants() {
        assert!(supports_variants("image/jpeg"));
        assert!(supports_variants("image/webp"));
        assert!(!supports_variants("image/svg+xml"));
        assert!(!supports_variants("application/pdf"));
    }
}
