use std::io::Cursor;
use std::sync::Arc;

use bytes::Bytes;
use image::{DynamicImage, ImageFormat, RgbImage};
use lectern::application::admin::{ContentAdminService, CreateContentCommand, TemplateAdminService};
use lectern::application::repos::MediaRepo;
use lectern::application::site::PublicSiteService;
use lectern::application::templates::TemplateEngine;
use lectern::application::uploads::{MediaError, MediaService, MediaSettings, NewUpload};
use lectern::cache::{MemoryBackend, PageCache, PageCacheConfig};
use lectern::domain::content::ContentStatus;
use lectern::domain::templates::TemplateType;
use lectern::infra::memory::InMemoryRepositories;
use lectern::infra::object_store::{FsObjectStore, ObjectStore, ObjectStoreError};
use lectern::media::{VariantLimits, default_breakpoints};
use tempfile::TempDir;

struct Media {
    _dir: TempDir,
    repo: Arc<InMemoryRepositories>,
    store: Arc<FsObjectStore>,
    page_cache: PageCache,
    service: MediaService,
}

fn media(settings: MediaSettings) -> Media {
    let dir = tempfile::tempdir().expect("tempdir");
    let repo = Arc::new(InMemoryRepositories::new());
    let store = Arc::new(
        FsObjectStore::new(dir.path().join("media"), "/media", "secret").expect("object store"),
    );
    let page_cache = PageCache::new(Arc::new(MemoryBackend::new()), PageCacheConfig::default());
    let service = MediaService::new(repo.clone(), store.clone(), page_cache.clone(), settings);
    Media {
        _dir: dir,
        repo,
        store,
        page_cache,
        service,
    }
}

fn png(width: u32, height: u32) -> Bytes {
    let image = RgbImage::from_pixel(width, height, image::Rgb([200, 120, 40]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
        .write_to(&mut out, ImageFormat::Png)
        .expect("encode png");
    Bytes::from(out.into_inner())
}

fn upload(name: &str, bytes: Bytes) -> NewUpload {
    NewUpload {
        filename: name.to_string(),
        alt_text: "A banner".to_string(),
        bytes,
    }
}

#[tokio::test]
async fn upload_stores_original_and_variants() {
    let media = media(MediaSettings::default());
    let outcome = media
        .service
        .upload(upload("Banner.png", png(3000, 300)))
        .await
        .expect("upload");

    assert!(outcome.variants_generated);
    assert_eq!(outcome.media.content_type, "image/png");
    assert_eq!(outcome.media.width, Some(3000));
    assert_eq!(outcome.media.height, Some(300));
    assert!(outcome.media.object_key.ends_with("-banner.png"));

    let widths: Vec<u32> = outcome.variants.iter().map(|variant| variant.width).collect();
    assert_eq!(widths, vec![320, 640, 1024, 1920]);

    let stored = media.service.variants(outcome.media.id).await.expect("variants");
    assert_eq!(stored, outcome.variants);
    for variant in &stored {
        assert!(variant.object_key.ends_with(&format!("-{}.jpg", variant.name)));
        let bytes = media.store.download(&variant.object_key).await.expect("variant object");
        assert_eq!(bytes.len() as i64, variant.size_bytes);
    }
    media
        .store
        .download(&outcome.media.object_key)
        .await
        .expect("original object");
}

#[tokio::test]
async fn failed_variant_generation_keeps_the_original_only() {
    let media = media(MediaSettings {
        limits: VariantLimits { max_pixels: 1_000 },
        ..MediaSettings::default()
    });
    let outcome = media
        .service
        .upload(upload("big.png", png(200, 200)))
        .await
        .expect("upload");

    assert!(!outcome.variants_generated);
    assert!(outcome.variants.is_empty());
    assert!(
        media
            .repo
            .list_variants(outcome.media.id)
            .await
            .expect("list")
            .is_empty()
    );
    assert!(
        media
            .repo
            .find_media(outcome.media.id)
            .await
            .expect("find")
            .is_some()
    );
}

#[tokio::test]
async fn invalid_uploads_are_rejected() {
    let media = media(MediaSettings {
        max_upload_bytes: 64,
        ..MediaSettings::default()
    });

    assert!(matches!(
        media.service.upload(upload("empty.png", Bytes::new())).await,
        Err(MediaError::Empty)
    ));
    assert!(matches!(
        media.service.upload(upload("big.png", Bytes::from(vec![0_u8; 65]))).await,
        Err(MediaError::TooLarge { limit: 64, .. })
    ));
    assert!(matches!(
        media
            .service
            .upload(upload("notes.txt", Bytes::from_static(b"plain text")))
            .await,
        Err(MediaError::Sniff(_))
    ));
}

#[tokio::test]
async fn delete_removes_rows_and_objects() {
    let media = media(MediaSettings::default());
    let outcome = media
        .service
        .upload(upload("photo.png", png(800, 600)))
        .await
        .expect("upload");
    assert_eq!(outcome.variants.len(), 3);

    media.service.delete(outcome.media.id).await.expect("delete");

    assert!(
        media
            .repo
            .find_media(outcome.media.id)
            .await
            .expect("find")
            .is_none()
    );
    for key in outcome
        .variants
        .iter()
        .map(|variant| variant.object_key.as_str())
        .chain([outcome.media.object_key.as_str()])
    {
        assert!(matches!(
            media.store.download(key).await,
            Err(ObjectStoreError::NotFound { .. })
        ));
    }
    assert!(matches!(
        media.service.delete(outcome.media.id).await,
        Err(MediaError::NotFound)
    ));
}

#[tokio::test]
async fn regenerate_rebuilds_variants_and_flushes_pages() {
    let media = media(MediaSettings::default());
    let outcome = media
        .service
        .upload(upload("photo.png", png(700, 100)))
        .await
        .expect("upload");

    let key = media.page_cache.slug_key("gallery").expect("valid slug");
    media.page_cache.set(&key, Bytes::from_static(b"<p>old</p>")).await;

    let regenerated = media
        .service
        .regenerate(outcome.media.id)
        .await
        .expect("regenerate");
    let widths: Vec<u32> = regenerated.iter().map(|variant| variant.width).collect();
    assert_eq!(widths, vec![320, 640, 700]);
    assert_eq!(
        media.service.variants(outcome.media.id).await.expect("variants"),
        regenerated
    );
    assert_eq!(media.page_cache.get(&key).await, None);
}

#[tokio::test]
async fn featured_images_render_with_srcset() {
    let media = media(MediaSettings {
        breakpoints: default_breakpoints(),
        ..MediaSettings::default()
    });
    let outcome = media
        .service
        .upload(upload("hero.png", png(3000, 300)))
        .await
        .expect("upload");

    let engine = Arc::new(TemplateEngine::new(media.repo.clone()));
    let templates =
        TemplateAdminService::new(media.repo.clone(), engine.clone(), media.page_cache.clone());
    let template = templates
        .create(
            "page",
            TemplateType::Page,
            "{% if featured_image %}<img alt=\"{{ featured_image.alt }}\" \
             srcset=\"{{ featured_image.srcset }}\" width=\"{{ featured_image.width }}\">{% endif %}"
                .to_string(),
        )
        .await
        .expect("template");
    templates.activate(template.id).await.expect("activate");

    let content = ContentAdminService::new(media.repo.clone(), media.page_cache.clone());
    content
        .create(CreateContentCommand {
            slug: Some("hero".to_string()),
            title: "Hero".to_string(),
            body_html: String::new(),
            excerpt: String::new(),
            meta_title: None,
            meta_description: None,
            featured_media_id: Some(outcome.media.id),
            status: ContentStatus::Published,
            published_at: None,
        })
        .await
        .expect("content");

    let site = PublicSiteService::new(
        media.repo.clone(),
        media.repo.clone(),
        media.repo.clone(),
        media.store.clone(),
        engine,
        media.page_cache.clone(),
    );
    let page = site.page("hero").await;
    let html = String::from_utf8(page.body.to_vec()).expect("utf-8");
    assert!(html.contains("alt=\"A banner\""), "{html}");
    assert!(html.contains("width=\"3000\""), "{html}");
    for width in [320, 640, 1024, 1920] {
        assert!(html.contains(&format!(" {width}w")), "{html}");
    }
}
