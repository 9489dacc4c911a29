use std::sync::Arc;

use thiserror::Error;
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use crate::application::repos::{
    ContentWriteRepo, CreateContentParams, RepoError, UpdateContentParams,
};
use crate::cache::PageCache;
use crate::domain::content::{ContentRecord, ContentStatus};
use crate::domain::slug::{SlugAsyncError, SlugError, generate_unique_slug_async, validate_slug};

#[derive(Debug, Error)]
pub enum AdminContentError {
    #[error("content title must not be empty")]
    EmptyTitle,
    #[error(transparent)]
    Slug(#[from] SlugError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone)]
pub struct CreateContentCommand {
    /// Explicit slug; derived from the title when `None` or blank.
    pub slug: Option<String>,
    pub title: String,
    pub body_html: String,
    pub excerpt: String,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub featured_media_id: Option<Uuid>,
    pub status: ContentStatus,
    pub published_at: Option<OffsetDateTime>,
}

#[derive(Clone)]
pub struct ContentAdminService {
    repo: Arc<dyn ContentWriteRepo>,
    page_cache: PageCache,
}

impl ContentAdminService {
    pub fn new(repo: Arc<dyn ContentWriteRepo>, page_cache: PageCache) -> Self {
        Self { repo, page_cache }
    }

    pub async fn create(
        &self,
        command: CreateContentCommand,
    ) -> Result<ContentRecord, AdminContentError> {
        let title = command.title.trim().to_string();
        if title.is_empty() {
            return Err(AdminContentError::EmptyTitle);
        }

        let slug = match command.slug.as_deref().map(str::trim) {
            Some(explicit) if !explicit.is_empty() => {
                validate_slug(explicit)?;
                explicit.to_string()
            }
            _ => self.unique_slug(&title).await?,
        };

        let published_at = match command.status {
            ContentStatus::Published => command
                .published_at
                .or_else(|| Some(OffsetDateTime::now_utc())),
            ContentStatus::Draft => command.published_at,
        };

        let record = self
            .repo
            .create_content(CreateContentParams {
                slug,
                title,
                body_html: command.body_html,
                excerpt: command.excerpt,
                meta_title: command.meta_title,
                meta_description: command.meta_description,
                featured_media_id: command.featured_media_id,
                status: command.status,
                published_at,
            })
            .await?;

        if record.is_published() {
            self.evict(&record.slug, None).await;
        }
        info!(content_id = %record.id, slug = %record.slug, "content created");
        Ok(record)
    }

    pub async fn update(
        &self,
        params: UpdateContentParams,
    ) -> Result<ContentRecord, AdminContentError> {
        validate_slug(&params.slug)?;
        if params.title.trim().is_empty() {
            return Err(AdminContentError::EmptyTitle);
        }
        let previous = self.load(params.id).await?;
        let record = self.repo.update_content(params).await?;

        if previous.is_published() || record.is_published() {
            self.evict(&record.slug, Some(&previous.slug)).await;
        }
        info!(content_id = %record.id, slug = %record.slug, "content updated");
        Ok(record)
    }

    /// Publish or unpublish. Publishing stamps `published_at` the first time.
    pub async fn set_status(
        &self,
        id: Uuid,
        status: ContentStatus,
    ) -> Result<ContentRecord, AdminContentError> {
        let previous = self.load(id).await?;
        let published_at = match status {
            ContentStatus::Published => previous
                .published_at
                .or_else(|| Some(OffsetDateTime::now_utc())),
            ContentStatus::Draft => previous.published_at,
        };
        let record = self.repo.set_status(id, status, published_at).await?;

        if previous.status != record.status {
            self.evict(&record.slug, None).await;
        }
        info!(content_id = %id, status = record.status.as_str(), "content status changed");
        Ok(record)
    }

    pub async fn delete(&self, id: Uuid) -> Result<ContentRecord, AdminContentError> {
        let record = self.repo.delete_content(id).await?;
        if record.is_published() {
            self.evict(&record.slug, None).await;
        }
        info!(content_id = %id, "content deleted");
        Ok(record)
    }

    async fn load(&self, id: Uuid) -> Result<ContentRecord, AdminContentError> {
        self.repo
            .find_content(id)
            .await?
            .ok_or(AdminContentError::Repo(RepoError::NotFound))
    }

    async fn unique_slug(&self, title: &str) -> Result<String, AdminContentError> {
        let repo = Arc::clone(&self.repo);
        generate_unique_slug_async(title, move |candidate| {
            let repo = Arc::clone(&repo);
            let candidate = candidate.to_string();
            async move {
                repo.find_content_by_slug(&candidate)
                    .await
                    .map(|existing| existing.is_none())
            }
        })
        .await
        .map_err(|err| match err {
            SlugAsyncError::Slug(err) => AdminContentError::Slug(err),
            SlugAsyncError::Predicate(err) => AdminContentError::Repo(err),
        })
    }

    /// Drop the page at `slug`, the page at a previous slug, and the homepage
    /// listing that may summarise either.
    async fn evict(&self, slug: &str, previous_slug: Option<&str>) {
        if let Some(key) = self.page_cache.slug_key(slug) {
            self.page_cache.invalidate_page(&key).await;
        }
        if let Some(previous) = previous_slug
            && previous != slug
            && let Some(key) = self.page_cache.slug_key(previous)
        {
            self.page_cache.invalidate_page(&key).await;
        }
        self.page_cache.invalidate_homepage().await;
    }
}
