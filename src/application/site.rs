//! Public page rendering: page cache first, then content plus templates.

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::StatusCode;
use bytes::Bytes;
use tracing::{error, warn};
use uuid::Uuid;

use crate::application::repos::{ContentRepo, MediaRepo, RepoError, SettingsRepo};
use crate::application::templates::{FeaturedImage, PageInput, TemplateEngine, TemplateError};
use crate::cache::{PageCache, PageKey};
use crate::domain::content::ContentRecord;
use crate::domain::media::{MediaRecord, MediaVariantRecord};
use crate::domain::site::SiteSettings;
use crate::infra::object_store::ObjectStore;
use crate::media::srcset::build_srcset;

const SOURCE: &str = "application::site::PublicSiteService";
pub const DEFAULT_HOMEPAGE_LIMIT: u32 = 20;

/// Where a response body came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
    /// Neither looked up nor stored: fallback and not-found pages.
    Bypass,
}

impl CacheStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheStatus::Hit => "hit",
            CacheStatus::Miss => "miss",
            CacheStatus::Bypass => "bypass",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SitePage {
    pub status: StatusCode,
    pub body: Bytes,
    pub cache: CacheStatus,
}

#[derive(Debug, Clone, Copy)]
enum Target<'a> {
    Homepage,
    Slug(&'a str),
}

enum Outcome {
    Rendered(Bytes),
    NotFound,
    Failed(SiteFailure),
}

#[derive(Debug)]
enum SiteFailure {
    Template(TemplateError),
    Repo(RepoError),
}

impl SiteFailure {
    fn status(&self) -> StatusCode {
        match self {
            SiteFailure::Template(
                TemplateError::TemplateUnavailable { .. } | TemplateError::Repository(_),
            )
            | SiteFailure::Repo(_) => StatusCode::SERVICE_UNAVAILABLE,
            SiteFailure::Template(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for SiteFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SiteFailure::Template(err) => err.fmt(f),
            SiteFailure::Repo(err) => err.fmt(f),
        }
    }
}

/// Serves the homepage and content pages.
///
/// A cache hit returns stored bytes untouched. A miss loads site settings
/// and content, resolves featured images for the whole page in one batch,
/// renders through the [`TemplateEngine`] and writes the result back unless
/// an invalidation happened meanwhile. Failures produce a neutral fallback
/// page that is never cached.
#[derive(Clone)]
pub struct PublicSiteService {
    content: Arc<dyn ContentRepo>,
    media: Arc<dyn MediaRepo>,
    settings: Arc<dyn SettingsRepo>,
    store: Arc<dyn ObjectStore>,
    engine: Arc<TemplateEngine>,
    page_cache: PageCache,
    homepage_limit: u32,
}

impl PublicSiteService {
    pub fn new(
        content: Arc<dyn ContentRepo>,
        media: Arc<dyn MediaRepo>,
        settings: Arc<dyn SettingsRepo>,
        store: Arc<dyn ObjectStore>,
        engine: Arc<TemplateEngine>,
        page_cache: PageCache,
    ) -> Self {
        Self {
            content,
            media,
            settings,
            store,
            engine,
            page_cache,
            homepage_limit: DEFAULT_HOMEPAGE_LIMIT,
        }
    }

    pub fn with_homepage_limit(mut self, limit: u32) -> Self {
        self.homepage_limit = limit.max(1);
        self
    }

    pub fn page_cache(&self) -> &PageCache {
        &self.page_cache
    }

    pub async fn homepage(&self) -> SitePage {
        let key = self.page_cache.homepage_key();
        self.serve(key, Target::Homepage).await
    }

    pub async fn page(&self, slug: &str) -> SitePage {
        match self.page_cache.slug_key(slug) {
            Some(key) => self.serve(key, Target::Slug(slug)).await,
            None => {
                let settings = self.load_settings_or_default().await;
                not_found(&settings)
            }
        }
    }

    async fn serve(&self, key: PageKey, target: Target<'_>) -> SitePage {
        // Captured before any read so a concurrent invalidation wins.
        let generation = self.page_cache.generation();
        if let Some(body) = self.page_cache.get(&key).await {
            return SitePage {
                status: StatusCode::OK,
                body,
                cache: CacheStatus::Hit,
            };
        }

        let settings = match self.settings.load_site_settings().await {
            Ok(settings) => settings,
            Err(err) => {
                return fallback(&SiteSettings::default(), &key, &SiteFailure::Repo(err));
            }
        };

        match self.render(&settings, target).await {
            Outcome::Rendered(body) => {
                self.page_cache
                    .set_if_current(&key, body.clone(), generation)
                    .await;
                SitePage {
                    status: StatusCode::OK,
                    body,
                    cache: CacheStatus::Miss,
                }
            }
            Outcome::NotFound => not_found(&settings),
            Outcome::Failed(failure) => fallback(&settings, &key, &failure),
        }
    }

    async fn render(&self, settings: &SiteSettings, target: Target<'_>) -> Outcome {
        match target {
            Target::Homepage => {
                let posts = match self.content.list_published(self.homepage_limit).await {
                    Ok(posts) => posts,
                    Err(err) => return Outcome::Failed(SiteFailure::Repo(err)),
                };
                let images = self.featured_images(&posts).await;
                match self.engine.render_post_list(settings, &posts, &images).await {
                    Ok(body) => Outcome::Rendered(body),
                    Err(err) => Outcome::Failed(SiteFailure::Template(err)),
                }
            }
            Target::Slug(slug) => {
                let content = match self.content.find_published_by_slug(slug).await {
                    Ok(Some(content)) => content,
                    Ok(None) => return Outcome::NotFound,
                    Err(err) => return Outcome::Failed(SiteFailure::Repo(err)),
                };
                let mut images = self.featured_images(std::slice::from_ref(&content)).await;
                let featured_image = content
                    .featured_media_id
                    .and_then(|id| images.remove(&id));
                let input = PageInput {
                    site: settings,
                    content: &content,
                    featured_image,
                };
                match self.engine.render(input).await {
                    Ok(body) => Outcome::Rendered(body),
                    Err(err) => Outcome::Failed(SiteFailure::Template(err)),
                }
            }
        }
    }

    /// Resolve featured media for `posts` with two batched repository calls.
    ///
    /// Images are decoration: lookup failures are logged and the affected
    /// posts render without one.
    async fn featured_images(&self, posts: &[ContentRecord]) -> HashMap<Uuid, FeaturedImage> {
        let mut ids: Vec<Uuid> = posts
            .iter()
            .filter_map(|post| post.featured_media_id)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        if ids.is_empty() {
            return HashMap::new();
        }

        let media = match self.media.find_media_many(&ids).await {
            Ok(media) => media,
            Err(err) => {
                warn!(source = SOURCE, error = %err, "featured media lookup failed");
                return HashMap::new();
            }
        };
        let mut variants = match self.media.list_variants_for(&ids).await {
            Ok(variants) => variants,
            Err(err) => {
                warn!(source = SOURCE, error = %err, "featured variant lookup failed");
                HashMap::new()
            }
        };

        media
            .into_iter()
            .map(|record| {
                let variants = variants.remove(&record.id).unwrap_or_default();
                let image = self.featured_image(&record, &variants);
                (record.id, image)
            })
            .collect()
    }

    fn featured_image(&self, media: &MediaRecord, variants: &[MediaVariantRecord]) -> FeaturedImage {
        let mut image = FeaturedImage::new(self.store.file_url(&media.object_key), &media.alt_text);
        image.width = media.width;
        image.height = media.height;
        image.srcset = build_srcset(
            variants
                .iter()
                .map(|variant| (self.store.file_url(&variant.object_key), variant.width)),
        );
        image
    }

    async fn load_settings_or_default(&self) -> SiteSettings {
        match self.settings.load_site_settings().await {
            Ok(settings) => settings,
            Err(err) => {
                warn!(source = SOURCE, error = %err, "site settings unavailable");
                SiteSettings::default()
            }
        }
    }
}

fn not_found(settings: &SiteSettings) -> SitePage {
    SitePage {
        status: StatusCode::NOT_FOUND,
        body: neutral_page(
            settings,
            "Page not found",
            "The page you requested does not exist.",
        ),
        cache: CacheStatus::Bypass,
    }
}

fn fallback(settings: &SiteSettings, key: &PageKey, failure: &SiteFailure) -> SitePage {
    let status = failure.status();
    error!(
        source = SOURCE,
        key = %key,
        status = status.as_u16(),
        error = %failure,
        "page render failed, serving fallback"
    );
    SitePage {
        status,
        body: neutral_page(
            settings,
            "Temporarily unavailable",
            "This page cannot be shown right now. Please try again shortly.",
        ),
        cache: CacheStatus::Bypass,
    }
}

/// Minimal page built without any stored template. Only site settings are
/// interpolated, escaped; error text never reaches the body.
fn neutral_page(settings: &SiteSettings, heading: &str, message: &str) -> Bytes {
    let site_name = tera::escape_html(&settings.site_name);
    let language = tera::escape_html(&settings.language);
    Bytes::from(format!(
        "<!doctype html>\n<html lang=\"{language}\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{heading} | {site_name}</title>\n</head>\n<body>\n<main>\n<h1>{heading}</h1>\n\
         <p>{message}</p>\n<p><a href=\"/\">{site_name}</a></p>\n</main>\n</body>\n</html>\n"
    ))
}
