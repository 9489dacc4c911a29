//! TOML site seed loaded into the repositories at startup.
//!
//! ```toml
//! [site]
//! site_name = "Field Notes"
//!
//! [[templates]]
//! name = "Default page"
//! template_type = "page"
//! html_file = "templates/page.html"   # or inline `html_source`
//! active = true
//!
//! [[content]]
//! title = "Hello"
//! body_html = "<p>Hi</p>"
//! status = "published"
//! published_at = "2025-01-01T00:00:00Z"
//! featured_image = "images/hello.jpg"
//! ```
//!
//! Relative paths resolve against the seed file's directory. Templates and
//! content go through the admin services so they get the same validation as
//! runtime edits.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use serde::Deserialize;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::application::admin::{
    AdminContentError, AdminTemplateError, ContentAdminService, CreateContentCommand,
    TemplateAdminService,
};
use crate::application::uploads::{MediaError, MediaService, NewUpload};
use crate::domain::content::ContentStatus;
use crate::domain::site::SiteSettings;
use crate::domain::templates::TemplateType;

use super::error::InfraError;
use super::memory::InMemoryRepositories;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SiteSeed {
    #[serde(default)]
    site: SiteSettings,
    #[serde(default)]
    templates: Vec<TemplateSeed>,
    #[serde(default)]
    content: Vec<ContentSeed>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TemplateSeed {
    name: String,
    template_type: TemplateType,
    html_source: Option<String>,
    html_file: Option<PathBuf>,
    #[serde(default)]
    active: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ContentSeed {
    slug: Option<String>,
    title: String,
    #[serde(default)]
    body_html: String,
    #[serde(default)]
    excerpt: String,
    meta_title: Option<String>,
    meta_description: Option<String>,
    #[serde(default = "default_status")]
    status: ContentStatus,
    #[serde(default, with = "time::serde::rfc3339::option")]
    published_at: Option<OffsetDateTime>,
    featured_image: Option<PathBuf>,
    #[serde(default)]
    featured_alt: String,
}

fn default_status() -> ContentStatus {
    ContentStatus::Published
}

/// What a seed load created.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
    pub templates: usize,
    pub content: usize,
    pub media: usize,
}

/// Services a seed is loaded through.
pub struct SeedTargets<'a> {
    pub repositories: &'a InMemoryRepositories,
    pub templates: &'a TemplateAdminService,
    pub content: &'a ContentAdminService,
    pub media: &'a MediaService,
}

/// Read the seed at `path` and load it through `targets`.
pub async fn load_seed(path: &Path, targets: SeedTargets<'_>) -> Result<SeedSummary, InfraError> {
    let display = path.display().to_string();
    let data = tokio::fs::read_to_string(path)
        .await
        .map_err(|err| InfraError::seed(&display, format!("cannot read file: {err}")))?;
    let seed: SiteSeed = toml::from_str(&data)
        .map_err(|err| InfraError::seed(&display, format!("invalid TOML: {err}")))?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));

    apply_seed(seed, base, &targets)
        .await
        .map_err(|message| InfraError::seed(&display, message))
}

async fn apply_seed(
    seed: SiteSeed,
    base: &Path,
    targets: &SeedTargets<'_>,
) -> Result<SeedSummary, String> {
    let mut summary = SeedSummary::default();
    targets.repositories.set_site_settings(seed.site);

    for template in seed.templates {
        let source = match (template.html_source, template.html_file) {
            (Some(source), None) => source,
            (None, Some(file)) => tokio::fs::read_to_string(base.join(&file))
                .await
                .map_err(|err| {
                    format!(
                        "template `{}`: cannot read {}: {err}",
                        template.name,
                        file.display()
                    )
                })?,
            _ => {
                return Err(format!(
                    "template `{}` needs exactly one of `html_source` or `html_file`",
                    template.name
                ));
            }
        };

        let record = targets
            .templates
            .create(&template.name, template.template_type, source)
            .await
            .map_err(|err| template_error(&template.name, err))?;
        if template.active {
            targets
                .templates
                .activate(record.id)
                .await
                .map_err(|err| template_error(&template.name, err))?;
        }
        summary.templates += 1;
    }

    for item in seed.content {
        let featured_media_id = match item.featured_image.as_deref() {
            Some(file) => {
                let media = upload_image(targets.media, base, file, &item.featured_alt)
                    .await
                    .map_err(|err| format!("content `{}`: {err}", item.title))?;
                summary.media += 1;
                Some(media)
            }
            None => None,
        };

        targets
            .content
            .create(CreateContentCommand {
                slug: item.slug,
                title: item.title.clone(),
                body_html: item.body_html,
                excerpt: item.excerpt,
                meta_title: item.meta_title,
                meta_description: item.meta_description,
                featured_media_id,
                status: item.status,
                published_at: item.published_at,
            })
            .await
            .map_err(|err| content_error(&item.title, err))?;
        summary.content += 1;
    }

    info!(
        templates = summary.templates,
        content = summary.content,
        media = summary.media,
        "site seed loaded"
    );
    Ok(summary)
}

async fn upload_image(
    media: &MediaService,
    base: &Path,
    file: &Path,
    alt_text: &str,
) -> Result<uuid::Uuid, String> {
    let bytes = tokio::fs::read(base.join(file))
        .await
        .map_err(|err| format!("cannot read {}: {err}", file.display()))?;
    let filename = file
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("upload")
        .to_string();

    let outcome = media
        .upload(NewUpload {
            filename,
            alt_text: alt_text.to_string(),
            bytes: Bytes::from(bytes),
        })
        .await
        .map_err(|err: MediaError| format!("upload of {} failed: {err}", file.display()))?;
    if !outcome.variants_generated {
        warn!(file = %file.display(), "seed image stored without variants");
    }
    Ok(outcome.media.id)
}

fn template_error(name: &str, err: AdminTemplateError) -> String {
    format!("template `{name}`: {err}")
}

fn content_error(title: &str, err: AdminContentError) -> String {
    format!("content `{title}`: {err}")
}
