//! Typed render contexts, one per template type.
//!
//! Every context serialises to a flat object whose top-level keys are exactly
//! the names returned by [`declared_variables`]. Fields holding trusted HTML
//! (`body`, `header`, `footer`) must be printed with `| safe`, everything
//! else is autoescaped.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::domain::content::ContentRecord;
use crate::domain::site::SiteSettings;
use crate::domain::templates::TemplateType;
use crate::media::srcset::DEFAULT_SIZES;

const HEADER_VARIABLES: &[&str] = &["site", "page_title", "current_path"];
const FOOTER_VARIABLES: &[&str] = &["site", "year"];
const PAGE_VARIABLES: &[&str] = &[
    "site",
    "header",
    "footer",
    "title",
    "slug",
    "url",
    "body",
    "excerpt",
    "meta_title",
    "meta_description",
    "published_at",
    "featured_image",
];
const ARTICLE_LOOP_VARIABLES: &[&str] = &["site", "header", "footer", "posts", "post_count"];

/// Top-level variables a template of `template_type` may reference.
pub fn declared_variables(template_type: TemplateType) -> &'static [&'static str] {
    match template_type {
        TemplateType::Header => HEADER_VARIABLES,
        TemplateType::Footer => FOOTER_VARIABLES,
        TemplateType::Page => PAGE_VARIABLES,
        TemplateType::ArticleLoop => ARTICLE_LOOP_VARIABLES,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteContext {
    pub name: String,
    pub url: String,
    pub tagline: String,
    pub language: String,
}

impl From<&SiteSettings> for SiteContext {
    fn from(settings: &SiteSettings) -> Self {
        Self {
            name: settings.site_name.clone(),
            url: settings.site_url.clone(),
            tagline: settings.tagline.clone(),
            language: settings.language.clone(),
        }
    }
}

/// A resolved featured image, ready for an `<img>` tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeaturedImage {
    pub url: String,
    pub srcset: Option<String>,
    pub sizes: String,
    pub alt: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl FeaturedImage {
    pub fn new(url: impl Into<String>, alt: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            srcset: None,
            sizes: DEFAULT_SIZES.to_string(),
            alt: alt.into(),
            width: None,
            height: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderContext {
    pub site: SiteContext,
    pub page_title: String,
    pub current_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FooterContext {
    pub site: SiteContext,
    pub year: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageContext {
    pub site: SiteContext,
    pub header: String,
    pub footer: String,
    pub title: String,
    pub slug: String,
    pub url: String,
    pub body: String,
    pub excerpt: String,
    pub meta_title: String,
    pub meta_description: String,
    pub published_at: Option<String>,
    pub featured_image: Option<FeaturedImage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostSummaryCtx {
    pub title: String,
    pub slug: String,
    pub url: String,
    pub excerpt: String,
    pub published_at: Option<String>,
    pub featured_image: Option<FeaturedImage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleLoopContext {
    pub site: SiteContext,
    pub header: String,
    pub footer: String,
    pub posts: Vec<PostSummaryCtx>,
    pub post_count: usize,
}

/// Context for any template type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TemplateContext {
    Header(HeaderContext),
    Footer(FooterContext),
    Page(PageContext),
    ArticleLoop(ArticleLoopContext),
}

impl TemplateContext {
    pub fn template_type(&self) -> TemplateType {
        match self {
            TemplateContext::Header(_) => TemplateType::Header,
            TemplateContext::Footer(_) => TemplateType::Footer,
            TemplateContext::Page(_) => TemplateType::Page,
            TemplateContext::ArticleLoop(_) => TemplateType::ArticleLoop,
        }
    }

    /// Parse caller-supplied JSON as the context of `template_type`.
    pub fn from_json(
        template_type: TemplateType,
        value: serde_json::Value,
    ) -> Result<Self, serde_json::Error> {
        Ok(match template_type {
            TemplateType::Header => TemplateContext::Header(serde_json::from_value(value)?),
            TemplateType::Footer => TemplateContext::Footer(serde_json::from_value(value)?),
            TemplateType::Page => TemplateContext::Page(serde_json::from_value(value)?),
            TemplateType::ArticleLoop => {
                TemplateContext::ArticleLoop(serde_json::from_value(value)?)
            }
        })
    }

    /// A fully populated context used to dry-run templates before saving.
    pub fn sample(template_type: TemplateType) -> Self {
        let site = SiteContext::from(&SiteSettings::default());
        let image = FeaturedImage {
            url: "/media/sample.jpg".to_string(),
            srcset: Some("/media/sample-small.jpg 640w, /media/sample.jpg 1024w".to_string()),
            sizes: DEFAULT_SIZES.to_string(),
            alt: "Sample image".to_string(),
            width: Some(1024),
            height: Some(683),
        };
        let published_at = Some("2025-01-01T00:00:00Z".to_string());

        match template_type {
            TemplateType::Header => TemplateContext::Header(HeaderContext {
                site,
                page_title: "Sample page".to_string(),
                current_path: "/sample-page".to_string(),
            }),
            TemplateType::Footer => TemplateContext::Footer(FooterContext { site, year: 2025 }),
            TemplateType::Page => TemplateContext::Page(PageContext {
                site,
                header: "<header>Sample header</header>".to_string(),
                footer: "<footer>Sample footer</footer>".to_string(),
                title: "Sample page".to_string(),
                slug: "sample-page".to_string(),
                url: "/sample-page".to_string(),
                body: "<p>Sample body.</p>".to_string(),
                excerpt: "Sample excerpt.".to_string(),
                meta_title: "Sample page".to_string(),
                meta_description: "Sample description.".to_string(),
                published_at,
                featured_image: Some(image),
            }),
            TemplateType::ArticleLoop => TemplateContext::ArticleLoop(ArticleLoopContext {
                site,
                header: "<header>Sample header</header>".to_string(),
                footer: "<footer>Sample footer</footer>".to_string(),
                posts: vec![PostSummaryCtx {
                    title: "Sample post".to_string(),
                    slug: "sample-post".to_string(),
                    url: "/sample-post".to_string(),
                    excerpt: "Sample excerpt.".to_string(),
                    published_at,
                    featured_image: Some(image),
                }],
                post_count: 1,
            }),
        }
    }

    /// Every context a template of `template_type` is dry-run against before
    /// it is saved: the populated [`sample`](Self::sample) followed by sparse
    /// ones with optional fields unset and an empty post list, as rendered
    /// for content without a featured image or an empty homepage.
    pub fn validation_samples(template_type: TemplateType) -> Vec<Self> {
        let full = Self::sample(template_type);
        let mut samples = Vec::with_capacity(3);
        match &full {
            TemplateContext::Header(_) | TemplateContext::Footer(_) => {}
            TemplateContext::Page(page) => {
                samples.push(TemplateContext::Page(PageContext {
                    published_at: None,
                    featured_image: None,
                    ..page.clone()
                }));
            }
            TemplateContext::ArticleLoop(listing) => {
                let sparse_posts: Vec<PostSummaryCtx> = listing
                    .posts
                    .iter()
                    .map(|post| PostSummaryCtx {
                        published_at: None,
                        featured_image: None,
                        ..post.clone()
                    })
                    .collect();
                samples.push(TemplateContext::ArticleLoop(ArticleLoopContext {
                    post_count: sparse_posts.len(),
                    posts: sparse_posts,
                    ..listing.clone()
                }));
                samples.push(TemplateContext::ArticleLoop(ArticleLoopContext {
                    posts: Vec::new(),
                    post_count: 0,
                    ..listing.clone()
                }));
            }
        }
        samples.insert(0, full);
        samples
    }

    pub(crate) fn to_tera(&self) -> Result<tera::Context, tera::Error> {
        tera::Context::from_serialize(self)
    }
}

impl PostSummaryCtx {
    pub fn from_content(content: &ContentRecord, featured_image: Option<FeaturedImage>) -> Self {
        Self {
            title: content.title.clone(),
            slug: content.slug.clone(),
            url: format!("/{}", content.slug),
            excerpt: content.excerpt.clone(),
            published_at: content.published_at.and_then(format_timestamp),
            featured_image,
        }
    }
}

pub(crate) fn format_timestamp(value: OffsetDateTime) -> Option<String> {
    value.format(&Rfc3339).ok()
}
