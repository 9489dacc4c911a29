//! Media uploads and their responsive variants.

use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::repos::{MediaRepo, RepoError};
use crate::cache::PageCache;
use crate::domain::media::{MediaRecord, MediaVariantRecord, supports_variants, variant_object_key};
use crate::infra::object_store::{ObjectStore, ObjectStoreError, object_key_for};
use crate::media::sniff::{SniffError, sniff_image_type};
use crate::media::variants::{VARIANT_CONTENT_TYPE, Variant};
use crate::media::{
    BreakpointSpec, VariantError, VariantLimits, default_breakpoints, generate_variants_blocking,
};

pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 20 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("upload is empty")]
    Empty,
    #[error("upload of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: u64, limit: u64 },
    #[error("media not found")]
    NotFound,
    #[error(transparent)]
    Sniff(#[from] SniffError),
    #[error(transparent)]
    Variants(#[from] VariantError),
    #[error(transparent)]
    Store(#[from] ObjectStoreError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone)]
pub struct MediaSettings {
    pub breakpoints: Vec<BreakpointSpec>,
    pub limits: VariantLimits,
    pub max_upload_bytes: u64,
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            breakpoints: default_breakpoints(),
            limits: VariantLimits::default(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewUpload {
    pub filename: String,
    pub alt_text: String,
    pub bytes: Bytes,
}

#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub media: MediaRecord,
    pub variants: Vec<MediaVariantRecord>,
    /// False when variant derivation failed; the original is still stored.
    pub variants_generated: bool,
}

#[derive(Clone)]
pub struct MediaService {
    repo: Arc<dyn MediaRepo>,
    store: Arc<dyn ObjectStore>,
    page_cache: PageCache,
    settings: MediaSettings,
}

impl MediaService {
    pub fn new(
        repo: Arc<dyn MediaRepo>,
        store: Arc<dyn ObjectStore>,
        page_cache: PageCache,
        settings: MediaSettings,
    ) -> Self {
        Self {
            repo,
            store,
            page_cache,
            settings,
        }
    }

    /// Store an uploaded image and derive its variants.
    ///
    /// The original upload succeeds even when variant derivation does not;
    /// in that case no variant rows or objects are left behind.
    pub async fn upload(&self, upload: NewUpload) -> Result<UploadOutcome, MediaError> {
        let size = upload.bytes.len() as u64;
        if size == 0 {
            return Err(MediaError::Empty);
        }
        if size > self.settings.max_upload_bytes {
            return Err(MediaError::TooLarge {
                size,
                limit: self.settings.max_upload_bytes,
            });
        }

        let content_type = sniff_image_type(&upload.bytes, &upload.filename)?;
        let key = object_key_for(&upload.filename);
        let stored = self
            .store
            .upload(&key, content_type, upload.bytes.clone())
            .await?;

        let (width, height) = match imagesize::blob_size(&upload.bytes) {
            Ok(size) => (u32::try_from(size.width).ok(), u32::try_from(size.height).ok()),
            Err(_) => (None, None),
        };

        let media = MediaRecord {
            id: Uuid::new_v4(),
            object_key: stored.key,
            original_name: upload.filename,
            content_type: content_type.to_string(),
            size_bytes: stored.size_bytes,
            width,
            height,
            alt_text: upload.alt_text,
            checksum: stored.checksum,
            created_at: OffsetDateTime::now_utc(),
        };
        if let Err(err) = self.repo.create_media(media.clone()).await {
            self.remove_objects([media.object_key.as_str()]).await;
            return Err(err.into());
        }
        info!(media_id = %media.id, key = %media.object_key, "media stored");

        match self.derive_variants(&media, upload.bytes).await {
            Ok(variants) => Ok(UploadOutcome {
                media,
                variants,
                variants_generated: true,
            }),
            Err(err) => {
                warn!(media_id = %media.id, error = %err, "variant generation failed");
                Ok(UploadOutcome {
                    media,
                    variants: Vec::new(),
                    variants_generated: false,
                })
            }
        }
    }

    /// Rebuild the variants of an existing upload from its stored original.
    pub async fn regenerate(&self, id: Uuid) -> Result<Vec<MediaVariantRecord>, MediaError> {
        let media = self.repo.find_media(id).await?.ok_or(MediaError::NotFound)?;
        let original = self.store.download(&media.object_key).await?;

        let previous = self.repo.delete_variants(id).await?;
        self.remove_objects(previous.iter().map(|variant| variant.object_key.as_str()))
            .await;

        let variants = self.derive_variants(&media, original).await;
        self.page_cache.invalidate_all().await;
        let variants = variants?;
        info!(media_id = %id, count = variants.len(), "variants regenerated");
        Ok(variants)
    }

    pub async fn delete(&self, id: Uuid) -> Result<MediaRecord, MediaError> {
        let media = self.repo.find_media(id).await?.ok_or(MediaError::NotFound)?;
        let variants = self.repo.delete_variants(id).await?;
        self.repo.delete_media(id).await?;

        self.remove_objects(
            variants
                .iter()
                .map(|variant| variant.object_key.as_str())
                .chain([media.object_key.as_str()]),
        )
        .await;
        self.page_cache.invalidate_all().await;
        info!(media_id = %id, "media deleted");
        Ok(media)
    }

    pub async fn variants(&self, id: Uuid) -> Result<Vec<MediaVariantRecord>, MediaError> {
        Ok(self.repo.list_variants(id).await?)
    }

    /// Generate, upload and record every variant, all or nothing.
    async fn derive_variants(
        &self,
        media: &MediaRecord,
        original: Bytes,
    ) -> Result<Vec<MediaVariantRecord>, MediaError> {
        if !supports_variants(&media.content_type) {
            return Ok(Vec::new());
        }

        let generated = generate_variants_blocking(
            original,
            self.settings.breakpoints.clone(),
            self.settings.limits,
        )
        .await?;

        let mut records = Vec::with_capacity(generated.len());
        for variant in generated {
            match self.upload_variant(media, variant).await {
                Ok(record) => records.push(record),
                Err(err) => {
                    self.remove_objects(records.iter().map(|record| record.object_key.as_str()))
                        .await;
                    return Err(err);
                }
            }
        }

        if let Err(err) = self.repo.replace_variants(media.id, records.clone()).await {
            self.remove_objects(records.iter().map(|record| record.object_key.as_str()))
                .await;
            return Err(err.into());
        }
        Ok(records)
    }

    async fn upload_variant(
        &self,
        media: &MediaRecord,
        variant: Variant,
    ) -> Result<MediaVariantRecord, MediaError> {
        let key = variant_object_key(&media.object_key, &variant.name);
        let stored = self
            .store
            .upload(&key, VARIANT_CONTENT_TYPE, variant.bytes)
            .await?;
        Ok(MediaVariantRecord {
            media_id: media.id,
            name: variant.name,
            object_key: stored.key,
            width: variant.width,
            height: variant.height,
            content_type: VARIANT_CONTENT_TYPE.to_string(),
            size_bytes: stored.size_bytes,
        })
    }

    /// Best-effort object cleanup; failures leave orphans and are logged.
    async fn remove_objects<'a>(&self, keys: impl IntoIterator<Item = &'a str>) {
        for key in keys {
            if let Err(err) = self.store.delete(key).await {
                warn!(key, error = %err, "failed to remove stored object");
            }
        }
    }
}
