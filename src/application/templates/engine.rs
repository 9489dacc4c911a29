use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use bytes::Bytes;
use metrics::{counter, histogram};
use time::OffsetDateTime;
use tracing::{debug, error};
use uuid::Uuid;

use super::compile::CompiledTemplate;
use super::context::{
    ArticleLoopContext, FeaturedImage, FooterContext, HeaderContext, PageContext, PostSummaryCtx,
    SiteContext, TemplateContext, declared_variables, format_timestamp,
};
use super::error::TemplateError;
use crate::application::repos::TemplatesRepo;
use crate::cache::lock::{mutex_lock, rw_read, rw_write};
use crate::domain::content::ContentRecord;
use crate::domain::site::SiteSettings;
use crate::domain::templates::TemplateType;

const SOURCE: &str = "application::templates::engine";
const METRIC_COMPILE: &str = "lectern_template_compile_total";
const METRIC_RENDER_MS: &str = "lectern_template_render_ms";

/// Everything needed to render a single content page.
#[derive(Debug, Clone)]
pub struct PageInput<'a> {
    pub site: &'a SiteSettings,
    pub content: &'a ContentRecord,
    pub featured_image: Option<FeaturedImage>,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<TemplateType, Arc<CompiledTemplate>>,
    generations: HashMap<TemplateType, u64>,
}

impl CacheState {
    fn generation(&self, template_type: TemplateType) -> u64 {
        self.generations.get(&template_type).copied().unwrap_or(0)
    }

    fn evict(&mut self, template_type: TemplateType) {
        *self.generations.entry(template_type).or_insert(0) += 1;
        self.entries.remove(&template_type);
    }
}

/// Compiles active templates on demand and renders pages with them.
///
/// Compiled artifacts are cached per template type. Readers clone the `Arc`
/// under a read lock and execute outside it. Invalidation bumps a per-type
/// generation; a compile whose fetch started under an older generation is
/// used for its own request but never installed, so an invalidation that has
/// returned can't be undone by a slow in-flight fetch.
pub struct TemplateEngine {
    repo: Arc<dyn TemplatesRepo>,
    state: RwLock<CacheState>,
    compile_lock: Mutex<()>,
}

impl TemplateEngine {
    pub fn new(repo: Arc<dyn TemplatesRepo>) -> Self {
        Self {
            repo,
            state: RwLock::new(CacheState::default()),
            compile_lock: Mutex::new(()),
        }
    }

    /// Render a content page with the active `page` template.
    pub async fn render(&self, input: PageInput<'_>) -> Result<Bytes, TemplateError> {
        let site = SiteContext::from(input.site);
        let content = input.content;
        let path = format!("/{}", content.slug);
        let page_title = content.meta_title.clone().unwrap_or_else(|| content.title.clone());

        let (header, footer) = self.render_chrome(&site, &page_title, &path).await?;
        let context = TemplateContext::Page(PageContext {
            site,
            header,
            footer,
            title: content.title.clone(),
            slug: content.slug.clone(),
            url: input.site.absolute_url(&path),
            body: content.body_html.clone(),
            excerpt: content.excerpt.clone(),
            meta_title: page_title,
            meta_description: content
                .meta_description
                .clone()
                .unwrap_or_else(|| content.excerpt.clone()),
            published_at: content.published_at.and_then(format_timestamp),
            featured_image: input.featured_image,
        });

        self.render_required(TemplateType::Page, &context).await
    }

    /// Render a listing of `posts` with the active `article_loop` template.
    ///
    /// `images` maps featured media ids to resolved images; posts whose media
    /// is missing from the map render without one.
    pub async fn render_post_list(
        &self,
        site: &SiteSettings,
        posts: &[ContentRecord],
        images: &HashMap<Uuid, FeaturedImage>,
    ) -> Result<Bytes, TemplateError> {
        let site_ctx = SiteContext::from(site);
        let (header, footer) = self.render_chrome(&site_ctx, &site.site_name, "/").await?;

        let posts: Vec<PostSummaryCtx> = posts
            .iter()
            .map(|post| {
                let image = post
                    .featured_media_id
                    .and_then(|id| images.get(&id))
                    .cloned();
                PostSummaryCtx::from_content(post, image)
            })
            .collect();

        let context = TemplateContext::ArticleLoop(ArticleLoopContext {
            site: site_ctx,
            header,
            footer,
            post_count: posts.len(),
            posts,
        });

        self.render_required(TemplateType::ArticleLoop, &context).await
    }

    /// Check that `source` compiles. Never touches the compiled cache.
    pub fn validate_template(&self, source: &str) -> Result<(), TemplateError> {
        CompiledTemplate::standalone(TemplateType::Page, source).map(|_| ())
    }

    /// Compile `source` and dry-run it against the validation samples for
    /// `template_type`, rejecting references to undeclared variables and
    /// unguarded reads of optional fields.
    pub fn validate_for_type(
        &self,
        template_type: TemplateType,
        source: &str,
    ) -> Result<(), TemplateError> {
        let compiled = CompiledTemplate::standalone(template_type, source)?;
        for sample in TemplateContext::validation_samples(template_type) {
            let context = sample.to_tera().map_err(context_error)?;
            compiled.execute(&context)?;
        }
        Ok(())
    }

    /// Compile `source` in isolation and render it with caller data.
    pub fn validate_and_render(
        &self,
        source: &str,
        context: &TemplateContext,
    ) -> Result<Bytes, TemplateError> {
        let compiled = CompiledTemplate::standalone(context.template_type(), source)?;
        let context = context.to_tera().map_err(context_error)?;
        compiled.execute(&context).map(Bytes::from)
    }

    /// Drop the compiled artifact for `template_type`.
    ///
    /// After this returns, the next render fetches and compiles afresh.
    pub fn invalidate_template(&self, template_type: TemplateType) {
        rw_write(&self.state, SOURCE, "invalidate_template").evict(template_type);
        debug!(template_type = %template_type, "compiled template invalidated");
    }

    pub fn invalidate_all_templates(&self) {
        let mut state = rw_write(&self.state, SOURCE, "invalidate_all_templates");
        for template_type in TemplateType::ALL {
            state.evict(template_type);
        }
        debug!("all compiled templates invalidated");
    }

    pub fn declared_variables(template_type: TemplateType) -> &'static [&'static str] {
        declared_variables(template_type)
    }

    /// Version of the cached artifact for `template_type`, if one is cached.
    pub fn cached_version(&self, template_type: TemplateType) -> Option<i64> {
        rw_read(&self.state, SOURCE, "cached_version")
            .entries
            .get(&template_type)
            .map(|compiled| compiled.version())
    }

    async fn render_chrome(
        &self,
        site: &SiteContext,
        page_title: &str,
        current_path: &str,
    ) -> Result<(String, String), TemplateError> {
        let header = TemplateContext::Header(HeaderContext {
            site: site.clone(),
            page_title: page_title.to_string(),
            current_path: current_path.to_string(),
        });
        let footer = TemplateContext::Footer(FooterContext {
            site: site.clone(),
            year: OffsetDateTime::now_utc().year(),
        });

        let header = self.render_optional(TemplateType::Header, &header).await?;
        let footer = self.render_optional(TemplateType::Footer, &footer).await?;
        Ok((header, footer))
    }

    /// Render a fragment type, yielding an empty fragment when none is active.
    async fn render_optional(
        &self,
        template_type: TemplateType,
        context: &TemplateContext,
    ) -> Result<String, TemplateError> {
        match self.compiled(template_type).await? {
            Some(compiled) => self.execute(&compiled, context),
            None => Ok(String::new()),
        }
    }

    async fn render_required(
        &self,
        template_type: TemplateType,
        context: &TemplateContext,
    ) -> Result<Bytes, TemplateError> {
        let compiled = self
            .compiled(template_type)
            .await?
            .ok_or(TemplateError::TemplateUnavailable { template_type })?;
        self.execute(&compiled, context).map(Bytes::from)
    }

    fn execute(
        &self,
        compiled: &CompiledTemplate,
        context: &TemplateContext,
    ) -> Result<String, TemplateError> {
        let started = Instant::now();
        let context = context.to_tera().map_err(context_error)?;
        let result = compiled.execute(&context);
        histogram!(METRIC_RENDER_MS, "template_type" => compiled.template_type().as_str())
            .record(started.elapsed().as_secs_f64() * 1000.0);

        if let Err(err) = &result {
            error!(
                template_type = %compiled.template_type(),
                version = compiled.version(),
                error = %err,
                "template render failed"
            );
        }
        result
    }

    async fn compiled(
        &self,
        template_type: TemplateType,
    ) -> Result<Option<Arc<CompiledTemplate>>, TemplateError> {
        let observed = {
            let state = rw_read(&self.state, SOURCE, "lookup");
            if let Some(compiled) = state.entries.get(&template_type) {
                return Ok(Some(Arc::clone(compiled)));
            }
            state.generation(template_type)
        };

        let Some(source) = self.repo.find_active_by_type(template_type).await? else {
            return Ok(None);
        };

        let _guard = mutex_lock(&self.compile_lock, SOURCE, "compile");
        {
            let state = rw_read(&self.state, SOURCE, "lookup.recheck");
            if state.generation(template_type) == observed
                && let Some(compiled) = state.entries.get(&template_type)
                && compiled.id() == Some(source.id)
                && compiled.version() == source.version
            {
                return Ok(Some(Arc::clone(compiled)));
            }
        }

        let compiled = Arc::new(CompiledTemplate::from_source(template_type, &source)?);
        counter!(METRIC_COMPILE, "template_type" => template_type.as_str()).increment(1);

        let mut state = rw_write(&self.state, SOURCE, "install");
        if state.generation(template_type) == observed {
            state.entries.insert(template_type, Arc::clone(&compiled));
            debug!(
                template_type = %template_type,
                version = source.version,
                "compiled template installed"
            );
        } else {
            debug!(
                template_type = %template_type,
                version = source.version,
                "discarding compile that raced an invalidation"
            );
        }
        Ok(Some(compiled))
    }
}

fn context_error(err: tera::Error) -> TemplateError {
    TemplateError::Context {
        message: err.to_string(),
    }
}
