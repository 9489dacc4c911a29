use std::{future::IntoFuture, path::Path, process, sync::Arc};

use bytes::Bytes;
use lectern::{
    application::{
        admin::{ContentAdminService, TemplateAdminService},
        error::AppError,
        site::PublicSiteService,
        templates::{TemplateContext, TemplateEngine},
        uploads::{MediaService, MediaSettings},
    },
    cache::{MemoryBackend, PageCache, PageCacheConfig},
    config,
    infra::{
        error::InfraError,
        http::{self, HttpState},
        memory::InMemoryRepositories,
        object_store::FsObjectStore,
        seed::{self, SeedTargets},
        telemetry,
    },
    media::{VariantLimits, generate_variants_blocking},
};
use tokio::{io::AsyncWriteExt, sync::Notify};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;
use uuid::Uuid;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::ValidateTemplate(args) => run_validate_template(args).await,
        config::Command::Preview(args) => run_preview(args).await,
        config::Command::Variants(args) => run_variants(settings, args).await,
    }
}

struct ApplicationContext {
    repositories: InMemoryRepositories,
    templates: TemplateAdminService,
    content: ContentAdminService,
    media: MediaService,
    http_state: HttpState,
}

fn build_application_context(settings: &config::Settings) -> Result<ApplicationContext, AppError> {
    let repositories = InMemoryRepositories::new();
    let shared = Arc::new(repositories.clone());

    let secret = settings
        .media
        .presign_secret
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let store = Arc::new(
        FsObjectStore::new(
            settings.media.storage_dir.clone(),
            settings.media.public_base.clone(),
            secret,
        )
        .map_err(|err| AppError::from(InfraError::from(err)))?,
    );

    let page_cache = PageCache::new(
        Arc::new(MemoryBackend::new()),
        PageCacheConfig::from(&settings.cache),
    );
    let engine = Arc::new(TemplateEngine::new(shared.clone()));

    let templates = TemplateAdminService::new(shared.clone(), engine.clone(), page_cache.clone());
    let content = ContentAdminService::new(shared.clone(), page_cache.clone());
    let media = MediaService::new(
        shared.clone(),
        store.clone(),
        page_cache.clone(),
        MediaSettings {
            breakpoints: settings.media.breakpoints.clone(),
            limits: VariantLimits {
                max_pixels: settings.media.max_pixels.get(),
            },
            max_upload_bytes: settings.media.max_upload_bytes.get(),
        },
    );

    let site = PublicSiteService::new(
        shared.clone(),
        shared.clone(),
        shared,
        store.clone(),
        engine,
        page_cache,
    )
    .with_homepage_limit(settings.site.homepage_limit);

    let http_state = HttpState {
        site: Arc::new(site),
        media: store,
        signed_media: settings.media.presign_secret.is_some(),
    };

    Ok(ApplicationContext {
        repositories,
        templates,
        content,
        media,
        http_state,
    })
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let app = build_application_context(&settings)?;

    match settings.site.seed.as_deref() {
        Some(path) => {
            let summary = seed::load_seed(
                path,
                SeedTargets {
                    repositories: &app.repositories,
                    templates: &app.templates,
                    content: &app.content,
                    media: &app.media,
                },
            )
            .await?;
            info!(
                target = "lectern::serve",
                templates = summary.templates,
                content = summary.content,
                "site seed applied"
            );
        }
        None => warn!(
            target = "lectern::serve",
            "no site seed configured; every page will render the fallback"
        ),
    }

    serve_http(&settings, app.http_state).await
}

async fn serve_http(settings: &config::Settings, http_state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(http_state);
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        target = "lectern::serve",
        addr = %settings.server.addr,
        "listening"
    );

    let shutdown = Arc::new(Notify::new());
    let server = axum::serve(listener, router.into_make_service()).with_graceful_shutdown({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.notify_one();
        }
    });
    let mut server = tokio::spawn(server.into_future());

    tokio::select! {
        joined = &mut server => return server_result(joined),
        _ = shutdown.notified() => {}
    }

    // In-flight requests get the configured grace period to finish.
    match tokio::time::timeout(settings.server.graceful_shutdown, &mut server).await {
        Ok(joined) => server_result(joined),
        Err(_) => {
            server.abort();
            Err(AppError::unexpected("graceful shutdown timed out"))
        }
    }
}

fn server_result(
    joined: Result<Result<(), std::io::Error>, tokio::task::JoinError>,
) -> Result<(), AppError> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(AppError::unexpected(format!("server error: {err}"))),
        Err(err) => Err(AppError::unexpected(format!("server task failed: {err}"))),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!(target = "lectern::serve", "shutdown requested");
}

async fn run_validate_template(args: config::ValidateTemplateArgs) -> Result<(), AppError> {
    let source = read_text(&args.file).await?;
    let engine = TemplateEngine::new(Arc::new(InMemoryRepositories::new()));

    let result = match args.template_type {
        Some(template_type) => engine.validate_for_type(template_type, &source),
        None => engine.validate_template(&source),
    };
    result.map_err(|err| AppError::validation(err.to_string()))?;

    info!(
        target = "lectern::validate",
        file = %args.file.display(),
        "template is valid"
    );
    Ok(())
}

async fn run_preview(args: config::PreviewArgs) -> Result<(), AppError> {
    let source = read_text(&args.file).await?;
    let context = match args.data.as_deref() {
        Some(path) => {
            let raw = read_text(path).await?;
            let value: serde_json::Value = serde_json::from_str(&raw)
                .map_err(|err| AppError::validation(format!("invalid JSON data: {err}")))?;
            TemplateContext::from_json(args.template_type, value).map_err(|err| {
                AppError::validation(format!(
                    "data does not match the `{}` context: {err}",
                    args.template_type
                ))
            })?
        }
        None => TemplateContext::sample(args.template_type),
    };

    let engine = TemplateEngine::new(Arc::new(InMemoryRepositories::new()));
    let html = engine
        .validate_and_render(&source, &context)
        .map_err(|err| AppError::validation(err.to_string()))?;

    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(&html)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    stdout
        .flush()
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    Ok(())
}

async fn run_variants(
    settings: config::Settings,
    args: config::VariantsArgs,
) -> Result<(), AppError> {
    let original = tokio::fs::read(&args.image)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    let limits = VariantLimits {
        max_pixels: settings.media.max_pixels.get(),
    };
    let variants = generate_variants_blocking(
        Bytes::from(original),
        settings.media.breakpoints.clone(),
        limits,
    )
    .await
    .map_err(|err| AppError::validation(err.to_string()))?;

    tokio::fs::create_dir_all(&args.out)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    let stem = args
        .image
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("image");

    for variant in variants {
        let target = args.out.join(format!("{stem}-{}.jpg", variant.name));
        tokio::fs::write(&target, &variant.bytes)
            .await
            .map_err(|err| AppError::from(InfraError::from(err)))?;
        info!(
            target = "lectern::variants",
            name = %variant.name,
            width = variant.width,
            height = variant.height,
            bytes = variant.bytes.len(),
            path = %target.display(),
            "variant written"
        );
    }
    Ok(())
}

async fn read_text(path: &Path) -> Result<String, AppError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))
}
