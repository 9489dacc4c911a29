use super::*;

use crate::domain::templates::TemplateType;

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());

    let overrides = ServeOverrides {
        server_port: Some(4321),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn cache_settings_use_correct_defaults() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.cache.namespace, "lectern");
    assert_eq!(settings.cache.ttl_seconds, 300);
    assert_eq!(settings.cache.scan_batch_size, 100);
    assert_eq!(settings.cache.operation_timeout_ms, 250);
}

#[test]
fn zero_cache_ttl_is_accepted_and_defaulted_by_the_page_cache() {
    let mut raw = RawSettings::default();
    raw.cache.ttl_seconds = Some(0);
    let settings = Settings::from_raw(raw).expect("valid settings");

    let config = crate::cache::PageCacheConfig::from(&settings.cache);
    assert_eq!(config.ttl, Duration::from_secs(300));
}

#[test]
fn cache_namespace_rejects_separator() {
    let mut raw = RawSettings::default();
    raw.cache.namespace = Some("site:one".to_string());

    let err = Settings::from_raw(raw).expect_err("namespace with colon");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.namespace",
            ..
        }
    ));
}

#[test]
fn media_defaults() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.media.storage_dir, PathBuf::from("media"));
    assert_eq!(settings.media.public_base, "/media");
    assert!(settings.media.presign_secret.is_none());
    assert_eq!(settings.media.max_pixels.get(), 40_000_000);
    assert_eq!(settings.media.breakpoints, default_breakpoints());
}

#[test]
fn blank_presign_secret_disables_signing() {
    let mut raw = RawSettings::default();
    raw.media.presign_secret = Some("   ".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.media.presign_secret.is_none());
}

#[test]
fn breakpoints_are_validated() {
    let mut raw = RawSettings::default();
    raw.media.breakpoints = Some(Vec::new());
    assert!(Settings::from_raw(raw).is_err());

    let mut raw = RawSettings::default();
    raw.media.breakpoints = Some(vec![
        BreakpointSpec::new("small", 640, 80),
        BreakpointSpec::new("small", 1024, 80),
    ]);
    assert!(Settings::from_raw(raw).is_err());

    let mut raw = RawSettings::default();
    raw.media.breakpoints = Some(vec![BreakpointSpec::new("tiny", 0, 80)]);
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn zero_port_is_rejected() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(0);
    let err = Settings::from_raw(raw).expect_err("zero port");
    assert!(matches!(err, LoadError::Invalid { key: "server.port", .. }));
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["lectern"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "lectern",
        "serve",
        "--server-host",
        "0.0.0.0",
        "--site-seed",
        "/srv/site.toml",
        "--cache-ttl-seconds",
        "60",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
            assert_eq!(
                serve.overrides.site_seed.as_deref(),
                Some(std::path::Path::new("/srv/site.toml"))
            );
            assert_eq!(serve.overrides.cache_ttl_seconds, Some(60));
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_validate_template_arguments() {
    let args = CliArgs::parse_from([
        "lectern",
        "validate-template",
        "--type",
        "article_loop",
        "/tmp/loop.html",
    ]);

    match args.command.expect("validate command") {
        Command::ValidateTemplate(validate) => {
            assert_eq!(validate.file, std::path::Path::new("/tmp/loop.html"));
            assert_eq!(validate.template_type, Some(TemplateType::ArticleLoop));
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_preview_and_variants_arguments() {
    let args = CliArgs::parse_from([
        "lectern",
        "preview",
        "/tmp/page.html",
        "--type",
        "page",
        "--data",
        "/tmp/page.json",
    ]);
    match args.command.expect("preview command") {
        Command::Preview(preview) => {
            assert_eq!(preview.template_type, TemplateType::Page);
            assert_eq!(
                preview.data.as_deref(),
                Some(std::path::Path::new("/tmp/page.json"))
            );
        }
        _ => panic!("wrong command parsed"),
    }

    let args = CliArgs::parse_from(["lectern", "variants", "photo.jpg", "--out", "/tmp/out"]);
    match args.command.expect("variants command") {
        Command::Variants(variants) => {
            assert_eq!(variants.image, std::path::Path::new("photo.jpg"));
            assert_eq!(variants.out, std::path::Path::new("/tmp/out"));
        }
        _ => panic!("wrong command parsed"),
    }
}
