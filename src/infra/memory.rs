//! In-process repositories.
//!
//! Backs every repository trait with concurrent maps so the pipeline runs
//! without a database. Writes that touch several rows (template activation,
//! slug uniqueness) are serialised by a single write lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use dashmap::DashMap;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{
    ContentRepo, ContentWriteRepo, CreateContentParams, CreateTemplateParams, MediaRepo,
    RepoError, SettingsRepo, TemplatesRepo, TemplatesWriteRepo, UpdateContentParams,
    UpdateTemplateParams,
};
use crate::cache::lock::{mutex_lock, rw_read, rw_write};
use crate::domain::content::{ContentRecord, ContentStatus};
use crate::domain::media::{MediaRecord, MediaVariantRecord};
use crate::domain::site::SiteSettings;
use crate::domain::templates::{TemplateRecord, TemplateSource, TemplateType};

const SOURCE: &str = "infra::memory";
const CONTENT_SLUG_CONSTRAINT: &str = "content_slug_key";

#[derive(Default)]
struct Store {
    templates: DashMap<Uuid, TemplateRecord>,
    content: DashMap<Uuid, ContentRecord>,
    media: DashMap<Uuid, MediaRecord>,
    variants: DashMap<Uuid, Vec<MediaVariantRecord>>,
    settings: RwLock<SiteSettings>,
    write_lock: Mutex<()>,
}

/// Shared handle to the in-memory store; clones see the same data.
#[derive(Clone, Default)]
pub struct InMemoryRepositories {
    store: Arc<Store>,
}

impl InMemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_site_settings(&self, settings: SiteSettings) {
        *rw_write(&self.store.settings, SOURCE, "set_site_settings") = settings;
    }

    fn template(&self, id: Uuid) -> Result<TemplateRecord, RepoError> {
        self.store
            .templates
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(RepoError::NotFound)
    }

    fn ensure_slug_free(&self, slug: &str, except: Option<Uuid>) -> Result<(), RepoError> {
        let taken = self
            .store
            .content
            .iter()
            .any(|entry| entry.slug == slug && Some(entry.id) != except);
        if taken {
            return Err(RepoError::Duplicate {
                constraint: CONTENT_SLUG_CONSTRAINT.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl TemplatesRepo for InMemoryRepositories {
    async fn find_active_by_type(
        &self,
        template_type: TemplateType,
    ) -> Result<Option<TemplateSource>, RepoError> {
        Ok(self
            .store
            .templates
            .iter()
            .find(|entry| entry.template_type == template_type && entry.is_active)
            .map(|entry| TemplateSource::from(entry.value())))
    }
}

#[async_trait]
impl TemplatesWriteRepo for InMemoryRepositories {
    async fn list_templates(
        &self,
        template_type: Option<TemplateType>,
    ) -> Result<Vec<TemplateRecord>, RepoError> {
        let mut records: Vec<TemplateRecord> = self
            .store
            .templates
            .iter()
            .filter(|entry| template_type.is_none_or(|kind| entry.template_type == kind))
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by(|a, b| {
            a.template_type
                .cmp(&b.template_type)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(records)
    }

    async fn find_template(&self, id: Uuid) -> Result<Option<TemplateRecord>, RepoError> {
        Ok(self.store.templates.get(&id).map(|entry| entry.value().clone()))
    }

    async fn create_template(
        &self,
        params: CreateTemplateParams,
    ) -> Result<TemplateRecord, RepoError> {
        let now = OffsetDateTime::now_utc();
        let record = TemplateRecord {
            id: Uuid::new_v4(),
            name: params.name,
            template_type: params.template_type,
            html_source: params.html_source,
            version: 1,
            is_active: false,
            created_at: now,
            updated_at: now,
        };
        self.store.templates.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_template(
        &self,
        params: UpdateTemplateParams,
    ) -> Result<TemplateRecord, RepoError> {
        let _guard = mutex_lock(&self.store.write_lock, SOURCE, "update_template");
        let mut entry = self
            .store
            .templates
            .get_mut(&params.id)
            .ok_or(RepoError::NotFound)?;
        entry.name = params.name;
        entry.html_source = params.html_source;
        entry.version += 1;
        entry.updated_at = OffsetDateTime::now_utc();
        Ok(entry.value().clone())
    }

    async fn activate_template(&self, id: Uuid) -> Result<TemplateRecord, RepoError> {
        let _guard = mutex_lock(&self.store.write_lock, SOURCE, "activate_template");
        let target = self.template(id)?;
        let siblings: Vec<Uuid> = self
            .store
            .templates
            .iter()
            .filter(|entry| entry.template_type == target.template_type && entry.id != id)
            .map(|entry| entry.id)
            .collect();
        for sibling in siblings {
            if let Some(mut entry) = self.store.templates.get_mut(&sibling) {
                entry.is_active = false;
            }
        }

        let mut entry = self.store.templates.get_mut(&id).ok_or(RepoError::NotFound)?;
        entry.is_active = true;
        entry.updated_at = OffsetDateTime::now_utc();
        Ok(entry.value().clone())
    }

    async fn deactivate_template(&self, id: Uuid) -> Result<TemplateRecord, RepoError> {
        let _guard = mutex_lock(&self.store.write_lock, SOURCE, "deactivate_template");
        let mut entry = self.store.templates.get_mut(&id).ok_or(RepoError::NotFound)?;
        entry.is_active = false;
        entry.updated_at = OffsetDateTime::now_utc();
        Ok(entry.value().clone())
    }

    async fn delete_template(&self, id: Uuid) -> Result<TemplateRecord, RepoError> {
        self.store
            .templates
            .remove(&id)
            .map(|(_, record)| record)
            .ok_or(RepoError::NotFound)
    }
}

#[async_trait]
impl ContentRepo for InMemoryRepositories {
    async fn find_published_by_slug(
        &self,
        slug: &str,
    ) -> Result<Option<ContentRecord>, RepoError> {
        Ok(self
            .store
            .content
            .iter()
            .find(|entry| entry.slug == slug && entry.is_published())
            .map(|entry| entry.value().clone()))
    }

    async fn list_published(&self, limit: u32) -> Result<Vec<ContentRecord>, RepoError> {
        let mut published: Vec<ContentRecord> = self
            .store
            .content
            .iter()
            .filter(|entry| entry.is_published())
            .map(|entry| entry.value().clone())
            .collect();
        published.sort_by(|a, b| {
            b.published_at
                .cmp(&a.published_at)
                .then_with(|| a.slug.cmp(&b.slug))
        });
        published.truncate(limit as usize);
        Ok(published)
    }
}

#[async_trait]
impl ContentWriteRepo for InMemoryRepositories {
    async fn find_content(&self, id: Uuid) -> Result<Option<ContentRecord>, RepoError> {
        Ok(self.store.content.get(&id).map(|entry| entry.value().clone()))
    }

    async fn find_content_by_slug(
        &self,
        slug: &str,
    ) -> Result<Option<ContentRecord>, RepoError> {
        Ok(self
            .store
            .content
            .iter()
            .find(|entry| entry.slug == slug)
            .map(|entry| entry.value().clone()))
    }

    async fn create_content(
        &self,
        params: CreateContentParams,
    ) -> Result<ContentRecord, RepoError> {
        let _guard = mutex_lock(&self.store.write_lock, SOURCE, "create_content");
        self.ensure_slug_free(&params.slug, None)?;
        let now = OffsetDateTime::now_utc();
        let record = ContentRecord {
            id: Uuid::new_v4(),
            slug: params.slug,
            title: params.title,
            body_html: params.body_html,
            excerpt: params.excerpt,
            meta_title: params.meta_title,
            meta_description: params.meta_description,
            featured_media_id: params.featured_media_id,
            status: params.status,
            published_at: params.published_at,
            created_at: now,
            updated_at: now,
        };
        self.store.content.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_content(
        &self,
        params: UpdateContentParams,
    ) -> Result<ContentRecord, RepoError> {
        let _guard = mutex_lock(&self.store.write_lock, SOURCE, "update_content");
        self.ensure_slug_free(&params.slug, Some(params.id))?;
        let mut entry = self
            .store
            .content
            .get_mut(&params.id)
            .ok_or(RepoError::NotFound)?;
        entry.slug = params.slug;
        entry.title = params.title;
        entry.body_html = params.body_html;
        entry.excerpt = params.excerpt;
        entry.meta_title = params.meta_title;
        entry.meta_description = params.meta_description;
        entry.featured_media_id = params.featured_media_id;
        entry.updated_at = OffsetDateTime::now_utc();
        Ok(entry.value().clone())
    }

    async fn set_status(
        &self,
        id: Uuid,
        status: ContentStatus,
        published_at: Option<OffsetDateTime>,
    ) -> Result<ContentRecord, RepoError> {
        let mut entry = self.store.content.get_mut(&id).ok_or(RepoError::NotFound)?;
        entry.status = status;
        entry.published_at = published_at;
        entry.updated_at = OffsetDateTime::now_utc();
        Ok(entry.value().clone())
    }

    async fn delete_content(&self, id: Uuid) -> Result<ContentRecord, RepoError> {
        self.store
            .content
            .remove(&id)
            .map(|(_, record)| record)
            .ok_or(RepoError::NotFound)
    }
}

#[async_trait]
impl MediaRepo for InMemoryRepositories {
    async fn create_media(&self, record: MediaRecord) -> Result<(), RepoError> {
        if self.store.media.contains_key(&record.id) {
            return Err(RepoError::Duplicate {
                constraint: "media_pkey".to_string(),
            });
        }
        self.store.media.insert(record.id, record);
        Ok(())
    }

    async fn find_media(&self, id: Uuid) -> Result<Option<MediaRecord>, RepoError> {
        Ok(self.store.media.get(&id).map(|entry| entry.value().clone()))
    }

    async fn find_media_many(&self, ids: &[Uuid]) -> Result<Vec<MediaRecord>, RepoError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.store.media.get(id).map(|entry| entry.value().clone()))
            .collect())
    }

    async fn delete_media(&self, id: Uuid) -> Result<(), RepoError> {
        self.store
            .media
            .remove(&id)
            .map(|_| ())
            .ok_or(RepoError::NotFound)
    }

    async fn replace_variants(
        &self,
        media_id: Uuid,
        variants: Vec<MediaVariantRecord>,
    ) -> Result<(), RepoError> {
        if !self.store.media.contains_key(&media_id) {
            return Err(RepoError::NotFound);
        }
        if variants.iter().any(|variant| variant.media_id != media_id) {
            return Err(RepoError::InvalidInput {
                message: "variant belongs to a different media record".to_string(),
            });
        }
        self.store.variants.insert(media_id, variants);
        Ok(())
    }

    async fn list_variants(&self, media_id: Uuid) -> Result<Vec<MediaVariantRecord>, RepoError> {
        Ok(self
            .store
            .variants
            .get(&media_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }

    async fn list_variants_for(
        &self,
        media_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<MediaVariantRecord>>, RepoError> {
        Ok(media_ids
            .iter()
            .filter_map(|id| {
                self.store
                    .variants
                    .get(id)
                    .filter(|entry| !entry.is_empty())
                    .map(|entry| (*id, entry.value().clone()))
            })
            .collect())
    }

    async fn delete_variants(&self, media_id: Uuid) -> Result<Vec<MediaVariantRecord>, RepoError> {
        Ok(self
            .store
            .variants
            .remove(&media_id)
            .map(|(_, variants)| variants)
            .unwrap_or_default())
    }
}

#[async_trait]
impl SettingsRepo for InMemoryRepositories {
    async fn load_site_settings(&self) -> Result<SiteSettings, RepoError> {
        Ok(rw_read(&self.store.settings, SOURCE, "load_site_settings").clone())
    }
}
