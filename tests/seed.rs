use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use image::{DynamicImage, ImageFormat, RgbImage};
use lectern::application::admin::{ContentAdminService, TemplateAdminService};
use lectern::application::repos::{ContentRepo, MediaRepo, SettingsRepo, TemplatesRepo};
use lectern::application::site::PublicSiteService;
use lectern::application::templates::TemplateEngine;
use lectern::application::uploads::{MediaService, MediaSettings};
use lectern::cache::{MemoryBackend, PageCache, PageCacheConfig};
use lectern::domain::templates::TemplateType;
use lectern::infra::error::InfraError;
use lectern::infra::memory::InMemoryRepositories;
use lectern::infra::object_store::FsObjectStore;
use lectern::infra::seed::{SeedSummary, SeedTargets, load_seed};
use tempfile::TempDir;

struct Services {
    repo: Arc<InMemoryRepositories>,
    templates: TemplateAdminService,
    content: ContentAdminService,
    media: MediaService,
    site: PublicSiteService,
}

fn services(dir: &Path) -> Services {
    let repo = Arc::new(InMemoryRepositories::new());
    let store = Arc::new(
        FsObjectStore::new(dir.join("media"), "/media", "secret").expect("object store"),
    );
    let page_cache = PageCache::new(Arc::new(MemoryBackend::new()), PageCacheConfig::default());
    let engine = Arc::new(TemplateEngine::new(repo.clone()));

    Services {
        templates: TemplateAdminService::new(repo.clone(), engine.clone(), page_cache.clone()),
        content: ContentAdminService::new(repo.clone(), page_cache.clone()),
        media: MediaService::new(
            repo.clone(),
            store.clone(),
            page_cache.clone(),
            MediaSettings::default(),
        ),
        site: PublicSiteService::new(
            repo.clone(),
            repo.clone(),
            repo.clone(),
            store,
            engine,
            page_cache,
        ),
        repo,
    }
}

async fn load(path: &Path, services: &Services) -> Result<SeedSummary, InfraError> {
    load_seed(
        path,
        SeedTargets {
            repositories: &services.repo,
            templates: &services.templates,
            content: &services.content,
            media: &services.media,
        },
    )
    .await
}

fn write(dir: &TempDir, name: &str, contents: &[u8]) -> std::path::PathBuf {
    let path = dir.path().join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create dir");
    }
    std::fs::write(&path, contents).expect("write file");
    path
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, image::Rgb([10, 20, 30]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
        .write_to(&mut out, ImageFormat::Png)
        .expect("encode png");
    out.into_inner()
}

#[tokio::test]
async fn seed_populates_templates_content_and_media() {
    let dir = tempfile::tempdir().expect("tempdir");
    write(&dir, "templates/page.html", b"<h1>{{ title }}</h1>{{ body | safe }}");
    write(&dir, "images/cover.png", &png(800, 400));
    let seed = write(
        &dir,
        "site.toml",
        br#"
[site]
site_name = "Field Notes"
site_url = "https://notes.example"

[[templates]]
name = "Default page"
template_type = "page"
html_file = "templates/page.html"
active = true

[[templates]]
name = "Listing"
template_type = "article_loop"
html_source = "{% for post in posts %}<a href=\"{{ post.url }}\">{{ post.title }}</a>{% endfor %}"
active = true

[[templates]]
name = "Draft header"
template_type = "header"
html_source = "<header>{{ site.name }}</header>"

[[content]]
title = "Hello World"
body_html = "<p>Hi</p>"
published_at = "2025-01-01T00:00:00Z"
featured_image = "images/cover.png"
featured_alt = "Cover"

[[content]]
slug = "later"
title = "Later"
status = "draft"
"#,
    );

    let services = services(dir.path());
    let summary = load(&seed, &services).await.expect("seed");
    assert_eq!(
        summary,
        SeedSummary {
            templates: 3,
            content: 2,
            media: 1
        }
    );

    let settings = services.repo.load_site_settings().await.expect("settings");
    assert_eq!(settings.site_name, "Field Notes");
    assert!(
        services
            .repo
            .find_active_by_type(TemplateType::Header)
            .await
            .expect("lookup")
            .is_none()
    );

    let published = services.repo.list_published(10).await.expect("published");
    assert_eq!(published.len(), 1);
    let hello = &published[0];
    assert_eq!(hello.slug, "hello-world");
    let media_id = hello.featured_media_id.expect("featured media");
    assert_eq!(services.repo.list_variants(media_id).await.expect("variants").len(), 3);

    let page = services.site.page("hello-world").await;
    assert_eq!(&page.body[..], b"<h1>Hello World</h1><p>Hi</p>");
    let home = services.site.homepage().await;
    assert!(String::from_utf8(home.body.to_vec()).expect("utf-8").contains(">Hello World</a>"));
}

#[tokio::test]
async fn invalid_template_aborts_the_seed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let seed = write(
        &dir,
        "site.toml",
        br#"
[[templates]]
name = "Broken footer"
template_type = "footer"
html_source = "<footer>{{ title }}</footer>"
"#,
    );

    let services = services(dir.path());
    let err = load(&seed, &services).await.expect_err("invalid template");
    assert!(matches!(err, InfraError::Seed { .. }));
    assert!(err.to_string().contains("Broken footer"), "{err}");
}

#[tokio::test]
async fn unknown_keys_and_missing_files_are_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let services = services(dir.path());

    let typo = write(&dir, "typo.toml", b"[[content]]\ntitle = \"A\"\nbody = \"<p>x</p>\"\n");
    let err = load(&typo, &services).await.expect_err("unknown key");
    assert!(err.to_string().contains("invalid TOML"), "{err}");

    let missing = write(
        &dir,
        "missing.toml",
        b"[[templates]]\nname = \"Page\"\ntemplate_type = \"page\"\nhtml_file = \"nope.html\"\n",
    );
    let err = load(&missing, &services).await.expect_err("missing file");
    assert!(err.to_string().contains("nope.html"), "{err}");

    let err = load(&dir.path().join("absent.toml"), &services)
        .await
        .expect_err("absent seed");
    assert!(err.to_string().contains("cannot read file"), "{err}");
}
