use std::sync::Arc;

use axum::http::StatusCode;
use lectern::application::admin::{
    AdminTemplateError, ContentAdminService, CreateContentCommand, TemplateAdminService,
};
use lectern::application::repos::UpdateContentParams;
use lectern::application::site::{CacheStatus, PublicSiteService, SitePage};
use lectern::application::templates::{TemplateEngine, TemplateError};
use lectern::cache::{MemoryBackend, PageCache, PageCacheConfig};
use lectern::domain::content::{ContentRecord, ContentStatus};
use lectern::domain::templates::TemplateType;
use lectern::infra::memory::InMemoryRepositories;
use lectern::infra::object_store::FsObjectStore;
use tempfile::TempDir;
use uuid::Uuid;

const PAGE: &str = "<article><h1>{{ title }}</h1>{{ body | safe }}</article>";
const LOOP: &str = "<ul>{% for post in posts %}<li>{{ post.slug }}</li>{% endfor %}</ul>";

struct Site {
    _dir: TempDir,
    engine: Arc<TemplateEngine>,
    templates: TemplateAdminService,
    content: ContentAdminService,
    site: PublicSiteService,
}

fn site() -> Site {
    let dir = tempfile::tempdir().expect("tempdir");
    let repo = Arc::new(InMemoryRepositories::new());
    let store = Arc::new(
        FsObjectStore::new(dir.path().join("media"), "/media", "secret").expect("object store"),
    );
    let page_cache = PageCache::new(Arc::new(MemoryBackend::new()), PageCacheConfig::default());
    let engine = Arc::new(TemplateEngine::new(repo.clone()));

    let templates = TemplateAdminService::new(repo.clone(), engine.clone(), page_cache.clone());
    let content = ContentAdminService::new(repo.clone(), page_cache.clone());
    let site = PublicSiteService::new(
        repo.clone(),
        repo.clone(),
        repo,
        store,
        engine.clone(),
        page_cache,
    );

    Site {
        _dir: dir,
        engine,
        templates,
        content,
        site,
    }
}

fn post(title: &str, slug: Option<&str>, status: ContentStatus) -> CreateContentCommand {
    CreateContentCommand {
        slug: slug.map(str::to_string),
        title: title.to_string(),
        body_html: format!("<p>{title} body</p>"),
        excerpt: format!("{title} excerpt"),
        meta_title: None,
        meta_description: None,
        featured_media_id: None,
        status,
        published_at: None,
    }
}

async fn activate(site: &Site, template_type: TemplateType, source: &str) -> Uuid {
    let record = site
        .templates
        .create(&format!("{template_type}"), template_type, source.to_string())
        .await
        .expect("create template");
    site.templates
        .activate(record.id)
        .await
        .expect("activate template");
    record.id
}

async fn publish(site: &Site, title: &str, slug: &str) -> ContentRecord {
    site.content
        .create(post(title, Some(slug), ContentStatus::Published))
        .await
        .expect("create content")
}

fn body(page: &SitePage) -> String {
    String::from_utf8(page.body.to_vec()).expect("utf-8")
}

async fn standard_site() -> Site {
    let site = site();
    activate(&site, TemplateType::Page, PAGE).await;
    activate(&site, TemplateType::ArticleLoop, LOOP).await;
    site
}

#[tokio::test]
async fn pages_are_cached_after_the_first_render() {
    let site = standard_site().await;
    publish(&site, "Hello", "hello").await;

    let first = site.site.page("hello").await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.cache, CacheStatus::Miss);
    assert_eq!(body(&first), "<article><h1>Hello</h1><p>Hello body</p></article>");

    let second = site.site.page("hello").await;
    assert_eq!(second.cache, CacheStatus::Hit);
    assert_eq!(second.body, first.body);
}

#[tokio::test]
async fn editing_content_evicts_old_slug_new_slug_and_homepage() {
    let site = standard_site().await;
    let renamed = publish(&site, "Old", "old-name").await;
    publish(&site, "Other", "other").await;

    for slug in ["old-name", "other"] {
        site.site.page(slug).await;
    }
    site.site.homepage().await;
    assert_eq!(site.site.homepage().await.cache, CacheStatus::Hit);

    site.content
        .update(UpdateContentParams {
            id: renamed.id,
            slug: "new-name".to_string(),
            title: "New".to_string(),
            body_html: "<p>New body</p>".to_string(),
            excerpt: "New excerpt".to_string(),
            meta_title: None,
            meta_description: None,
            featured_media_id: None,
        })
        .await
        .expect("update");

    let old = site.site.page("old-name").await;
    assert_eq!(old.status, StatusCode::NOT_FOUND);

    let new = site.site.page("new-name").await;
    assert_eq!(new.cache, CacheStatus::Miss);
    assert!(body(&new).contains("<h1>New</h1>"));

    let home = site.site.homepage().await;
    assert_eq!(home.cache, CacheStatus::Miss);
    assert!(body(&home).contains("<li>new-name</li>"));
    assert!(!body(&home).contains("old-name"));

    assert_eq!(site.site.page("other").await.cache, CacheStatus::Hit);
}

#[tokio::test]
async fn drafts_stay_hidden_until_published() {
    let site = standard_site().await;
    let draft = site
        .content
        .create(post("Secret Plans", None, ContentStatus::Draft))
        .await
        .expect("create draft");
    assert_eq!(draft.slug, "secret-plans");
    assert!(draft.published_at.is_none());

    assert_eq!(site.site.page("secret-plans").await.status, StatusCode::NOT_FOUND);
    site.site.homepage().await;
    assert_eq!(site.site.homepage().await.cache, CacheStatus::Hit);

    let published = site
        .content
        .set_status(draft.id, ContentStatus::Published)
        .await
        .expect("publish");
    assert!(published.published_at.is_some());

    let page = site.site.page("secret-plans").await;
    assert_eq!(page.status, StatusCode::OK);
    let home = site.site.homepage().await;
    assert_eq!(home.cache, CacheStatus::Miss);
    assert!(body(&home).contains("secret-plans"));
}

#[tokio::test]
async fn derived_slugs_are_unique() {
    let site = standard_site().await;
    let first = site
        .content
        .create(post("Hello World", None, ContentStatus::Draft))
        .await
        .expect("first");
    let second = site
        .content
        .create(post("Hello World", None, ContentStatus::Draft))
        .await
        .expect("second");
    assert_eq!(first.slug, "hello-world");
    assert_eq!(second.slug, "hello-world-2");
}

#[tokio::test]
async fn broken_template_is_rejected_without_invalidating() {
    let site = site();
    let id = activate(&site, TemplateType::Page, PAGE).await;
    publish(&site, "Hello", "hello").await;
    site.site.page("hello").await;
    assert_eq!(site.engine.cached_version(TemplateType::Page), Some(1));

    let err = site
        .templates
        .update(id, "page", "<h1>{{ author.name }}</h1>".to_string())
        .await
        .expect_err("undeclared variable");
    assert!(matches!(
        err,
        AdminTemplateError::Template(TemplateError::RenderFailure { .. })
    ));

    let err = site
        .templates
        .update(id, "page", "<h1>{{ title </h1>".to_string())
        .await
        .expect_err("syntax error");
    assert!(matches!(
        err,
        AdminTemplateError::Template(TemplateError::TemplateSyntax { .. })
    ));

    assert_eq!(site.site.page("hello").await.cache, CacheStatus::Hit);
    assert_eq!(site.engine.cached_version(TemplateType::Page), Some(1));
}

#[tokio::test]
async fn unguarded_optional_fields_are_rejected_on_save() {
    let site = standard_site().await;
    publish(&site, "Plain", "plain").await;

    let err = site
        .templates
        .create(
            "page",
            TemplateType::Page,
            "<img src=\"{{ featured_image.url }}\"><h1>{{ title }}</h1>".to_string(),
        )
        .await
        .expect_err("page without featured image");
    assert!(matches!(
        err,
        AdminTemplateError::Template(TemplateError::RenderFailure { .. })
    ));

    let err = site
        .templates
        .create(
            "loop",
            TemplateType::ArticleLoop,
            "<h2>{{ posts[0].title }}</h2>".to_string(),
        )
        .await
        .expect_err("empty homepage");
    assert!(matches!(
        err,
        AdminTemplateError::Template(TemplateError::RenderFailure { .. })
    ));

    let err = site
        .templates
        .create(
            "loop",
            TemplateType::ArticleLoop,
            "{% for post in posts %}<img src=\"{{ post.featured_image.url }}\">{% endfor %}"
                .to_string(),
        )
        .await
        .expect_err("post without featured image");
    assert!(matches!(
        err,
        AdminTemplateError::Template(TemplateError::RenderFailure { .. })
    ));

    activate(
        &site,
        TemplateType::Page,
        "{% if featured_image %}<img src=\"{{ featured_image.url }}\">{% endif %}<h1>{{ title }}</h1>",
    )
    .await;
    let page = site.site.page("plain").await;
    assert_eq!(page.status, StatusCode::OK);
    assert_eq!(body(&page), "<h1>Plain</h1>");
}

#[tokio::test]
async fn page_template_edit_flushes_every_page() {
    let site = standard_site().await;
    let page_template = site
        .templates
        .list(Some(TemplateType::Page))
        .await
        .expect("list")
        .remove(0);
    publish(&site, "Hello", "hello").await;
    site.site.page("hello").await;
    site.site.homepage().await;

    site.templates
        .update(page_template.id, "page", "<main>{{ title }}</main>".to_string())
        .await
        .expect("update");

    let page = site.site.page("hello").await;
    assert_eq!(page.cache, CacheStatus::Miss);
    assert_eq!(body(&page), "<main>Hello</main>");
    assert_eq!(site.site.homepage().await.cache, CacheStatus::Miss);
    assert_eq!(site.engine.cached_version(TemplateType::Page), Some(2));
}

#[tokio::test]
async fn article_loop_activation_only_evicts_the_homepage() {
    let site = standard_site().await;
    publish(&site, "Hello", "hello").await;
    site.site.page("hello").await;
    site.site.homepage().await;

    activate(
        &site,
        TemplateType::ArticleLoop,
        "<ol>{% for post in posts %}<li>{{ post.title }}</li>{% endfor %}</ol>",
    )
    .await;

    let home = site.site.homepage().await;
    assert_eq!(home.cache, CacheStatus::Miss);
    assert_eq!(body(&home), "<ol><li>Hello</li></ol>");
    assert_eq!(site.site.page("hello").await.cache, CacheStatus::Hit);
}

#[tokio::test]
async fn deactivating_the_page_template_serves_the_fallback() {
    let site = site();
    let id = activate(&site, TemplateType::Page, PAGE).await;
    publish(&site, "Hello", "hello").await;
    site.site.page("hello").await;

    site.templates.deactivate(id).await.expect("deactivate");

    let page = site.site.page("hello").await;
    assert_eq!(page.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(page.cache, CacheStatus::Bypass);
    assert!(body(&page).contains("Temporarily unavailable"));
    assert_eq!(site.site.page("hello").await.cache, CacheStatus::Bypass);
}

#[tokio::test]
async fn template_preview_uses_sample_data() {
    let site = site();
    let html = site
        .templates
        .preview(TemplateType::Footer, "<footer>{{ site.name }} {{ year }}</footer>")
        .expect("preview");
    assert_eq!(&html[..], b"<footer>Lectern 2025</footer>");
    assert!(site.templates.list(None).await.expect("list").is_empty());
}
