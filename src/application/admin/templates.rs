use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::application::repos::{
    CreateTemplateParams, RepoError, TemplatesWriteRepo, UpdateTemplateParams,
};
use crate::application::templates::{TemplateContext, TemplateEngine, TemplateError};
use crate::cache::PageCache;
use crate::domain::templates::{TemplateRecord, TemplateType};

#[derive(Debug, Error)]
pub enum AdminTemplateError {
    #[error("template name must not be empty")]
    EmptyName,
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Clone)]
pub struct TemplateAdminService {
    repo: Arc<dyn TemplatesWriteRepo>,
    engine: Arc<TemplateEngine>,
    page_cache: PageCache,
}

impl TemplateAdminService {
    pub fn new(
        repo: Arc<dyn TemplatesWriteRepo>,
        engine: Arc<TemplateEngine>,
        page_cache: PageCache,
    ) -> Self {
        Self {
            repo,
            engine,
            page_cache,
        }
    }

    pub async fn list(
        &self,
        template_type: Option<TemplateType>,
    ) -> Result<Vec<TemplateRecord>, AdminTemplateError> {
        Ok(self.repo.list_templates(template_type).await?)
    }

    /// Store a new, inactive template. The source must compile and render
    /// against the sample context of its type.
    pub async fn create(
        &self,
        name: &str,
        template_type: TemplateType,
        html_source: String,
    ) -> Result<TemplateRecord, AdminTemplateError> {
        let name = normalize_name(name)?;
        self.engine.validate_for_type(template_type, &html_source)?;
        let record = self
            .repo
            .create_template(CreateTemplateParams {
                name,
                template_type,
                html_source,
            })
            .await?;
        info!(template_id = %record.id, template_type = %template_type, "template created");
        Ok(record)
    }

    pub async fn update(
        &self,
        id: Uuid,
        name: &str,
        html_source: String,
    ) -> Result<TemplateRecord, AdminTemplateError> {
        let existing = self.load(id).await?;
        let name = normalize_name(name)?;
        self.engine
            .validate_for_type(existing.template_type, &html_source)?;

        let record = self
            .repo
            .update_template(UpdateTemplateParams {
                id,
                name,
                html_source,
            })
            .await?;
        if record.is_active {
            self.evict(record.template_type).await;
        }
        info!(template_id = %id, version = record.version, "template updated");
        Ok(record)
    }

    pub async fn activate(&self, id: Uuid) -> Result<TemplateRecord, AdminTemplateError> {
        let record = self.repo.activate_template(id).await?;
        self.evict(record.template_type).await;
        info!(template_id = %id, template_type = %record.template_type, "template activated");
        Ok(record)
    }

    pub async fn deactivate(&self, id: Uuid) -> Result<TemplateRecord, AdminTemplateError> {
        let was_active = self.load(id).await?.is_active;
        let record = self.repo.deactivate_template(id).await?;
        if was_active {
            self.evict(record.template_type).await;
        }
        Ok(record)
    }

    pub async fn delete(&self, id: Uuid) -> Result<TemplateRecord, AdminTemplateError> {
        let record = self.repo.delete_template(id).await?;
        if record.is_active {
            self.evict(record.template_type).await;
        }
        info!(template_id = %id, "template deleted");
        Ok(record)
    }

    /// Render unsaved `html_source` against the sample context of its type.
    pub fn preview(
        &self,
        template_type: TemplateType,
        html_source: &str,
    ) -> Result<Bytes, AdminTemplateError> {
        let context = TemplateContext::sample(template_type);
        Ok(self.engine.validate_and_render(html_source, &context)?)
    }

    async fn load(&self, id: Uuid) -> Result<TemplateRecord, AdminTemplateError> {
        self.repo
            .find_template(id)
            .await?
            .ok_or(AdminTemplateError::Repo(RepoError::NotFound))
    }

    /// Header, footer and page templates appear on every page; the article
    /// loop only renders the homepage.
    async fn evict(&self, template_type: TemplateType) {
        self.engine.invalidate_template(template_type);
        match template_type {
            TemplateType::ArticleLoop => self.page_cache.invalidate_homepage().await,
            TemplateType::Header | TemplateType::Footer | TemplateType::Page => {
                self.page_cache.invalidate_all().await;
            }
        }
    }
}

fn normalize_name(name: &str) -> Result<String, AdminTemplateError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(AdminTemplateError::EmptyName);
    }
    Ok(trimmed.to_string())
}
