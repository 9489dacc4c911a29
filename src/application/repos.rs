//! Repository traits describing persistence adapters.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::content::{ContentRecord, ContentStatus};
use crate::domain::media::{MediaRecord, MediaVariantRecord};
use crate::domain::site::SiteSettings;
use crate::domain::templates::{TemplateRecord, TemplateSource, TemplateType};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("repository timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct CreateTemplateParams {
    pub name: String,
    pub template_type: TemplateType,
    pub html_source: String,
}

#[derive(Debug, Clone)]
pub struct UpdateTemplateParams {
    pub id: Uuid,
    pub name: String,
    pub html_source: String,
}

#[derive(Debug, Clone)]
pub struct CreateContentParams {
    pub slug: String,
    pub title: String,
    pub body_html: String,
    pub excerpt: String,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub featured_media_id: Option<Uuid>,
    pub status: ContentStatus,
    pub published_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone)]
pub struct UpdateContentParams {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub body_html: String,
    pub excerpt: String,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub featured_media_id: Option<Uuid>,
}

#[async_trait]
pub trait TemplatesRepo: Send + Sync {
    async fn find_active_by_type(
        &self,
        template_type: TemplateType,
    ) -> Result<Option<TemplateSource>, RepoError>;
}

#[async_trait]
pub trait TemplatesWriteRepo: Send + Sync {
    async fn list_templates(
        &self,
        template_type: Option<TemplateType>,
    ) -> Result<Vec<TemplateRecord>, RepoError>;

    async fn find_template(&self, id: Uuid) -> Result<Option<TemplateRecord>, RepoError>;

    async fn create_template(
        &self,
        params: CreateTemplateParams,
    ) -> Result<TemplateRecord, RepoError>;

    /// Replace name and source, bumping the row version.
    async fn update_template(
        &self,
        params: UpdateTemplateParams,
    ) -> Result<TemplateRecord, RepoError>;

    /// Mark `id` active, deactivating every other template of its type.
    async fn activate_template(&self, id: Uuid) -> Result<TemplateRecord, RepoError>;

    async fn deactivate_template(&self, id: Uuid) -> Result<TemplateRecord, RepoError>;

    async fn delete_template(&self, id: Uuid) -> Result<TemplateRecord, RepoError>;
}

#[async_trait]
pub trait ContentRepo: Send + Sync {
    async fn find_published_by_slug(&self, slug: &str)
    -> Result<Option<ContentRecord>, RepoError>;

    /// Published content, newest first.
    async fn list_published(&self, limit: u32) -> Result<Vec<ContentRecord>, RepoError>;
}

#[async_trait]
pub trait ContentWriteRepo: Send + Sync {
    async fn find_content(&self, id: Uuid) -> Result<Option<ContentRecord>, RepoError>;

    /// Any content row with `slug`, drafts included.
    async fn find_content_by_slug(&self, slug: &str)
    -> Result<Option<ContentRecord>, RepoError>;

    async fn create_content(&self, params: CreateContentParams)
    -> Result<ContentRecord, RepoError>;

    async fn update_content(&self, params: UpdateContentParams)
    -> Result<ContentRecord, RepoError>;

    async fn set_status(
        &self,
        id: Uuid,
        status: ContentStatus,
        published_at: Option<OffsetDateTime>,
    ) -> Result<ContentRecord, RepoError>;

    async fn delete_content(&self, id: Uuid) -> Result<ContentRecord, RepoError>;
}

#[async_trait]
pub trait MediaRepo: Send + Sync {
    async fn create_media(&self, record: MediaRecord) -> Result<(), RepoError>;

    async fn find_media(&self, id: Uuid) -> Result<Option<MediaRecord>, RepoError>;

    async fn find_media_many(&self, ids: &[Uuid]) -> Result<Vec<MediaRecord>, RepoError>;

    async fn delete_media(&self, id: Uuid) -> Result<(), RepoError>;

    /// Replace every variant row of `media_id` with `variants`.
    async fn replace_variants(
        &self,
        media_id: Uuid,
        variants: Vec<MediaVariantRecord>,
    ) -> Result<(), RepoError>;

    async fn list_variants(&self, media_id: Uuid) -> Result<Vec<MediaVariantRecord>, RepoError>;

    /// Variants for several media in one call, keyed by media id.
    ///
    /// Media without variants are absent from the map.
    async fn list_variants_for(
        &self,
        media_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<MediaVariantRecord>>, RepoError>;

    async fn delete_variants(&self, media_id: Uuid) -> Result<Vec<MediaVariantRecord>, RepoError>;
}

#[async_trait]
pub trait SettingsRepo: Send + Sync {
    async fn load_site_settings(&self) -> Result<SiteSettings, RepoError>;
}
