//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, num::NonZeroU64, path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::media::{BreakpointSpec, default_breakpoints};

mod cli;

pub use cli::{
    CliArgs, Command, PreviewArgs, ServeArgs, ServeOverrides, ValidateTemplateArgs, VariantsArgs,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "lectern";
const ENV_PREFIX: &str = "LECTERN";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_CACHE_NAMESPACE: &str = "lectern";
const DEFAULT_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_CACHE_SCAN_BATCH: usize = 100;
const DEFAULT_CACHE_TIMEOUT_MS: u64 = 250;
const DEFAULT_MEDIA_DIR: &str = "media";
const DEFAULT_MEDIA_PUBLIC_BASE: &str = "/media";
const DEFAULT_MAX_PIXELS: u64 = 40_000_000;
const DEFAULT_MAX_UPLOAD_BYTES: u64 = 20 * 1024 * 1024;
const DEFAULT_HOMEPAGE_LIMIT: u32 = 20;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub media: MediaSettings,
    pub site: SiteSeedSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

/// `[cache]`: zero values fall back to defaults when the page cache is built.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub namespace: String,
    pub ttl_seconds: u64,
    pub scan_batch_size: usize,
    pub operation_timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct MediaSettings {
    pub storage_dir: PathBuf,
    pub public_base: String,
    /// Secret for presigned media URLs. When set, `/media` requires a valid signature.
    pub presign_secret: Option<String>,
    pub max_pixels: NonZeroU64,
    pub max_upload_bytes: NonZeroU64,
    pub breakpoints: Vec<BreakpointSpec>,
}

#[derive(Debug, Clone)]
pub struct SiteSeedSettings {
    pub seed: Option<PathBuf>,
    pub homepage_limit: u32,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::ValidateTemplate(_) | Command::Preview(_) | Command::Variants(_)) => {}
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
    media: RawMediaSettings,
    site: RawSiteSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(namespace) = overrides.cache_namespace.as_ref() {
            self.cache.namespace = Some(namespace.clone());
        }
        if let Some(ttl) = overrides.cache_ttl_seconds {
            self.cache.ttl_seconds = Some(ttl);
        }
        if let Some(dir) = overrides.media_storage_dir.as_ref() {
            self.media.storage_dir = Some(dir.clone());
        }
        if let Some(seed) = overrides.site_seed.as_ref() {
            self.site.seed = Some(seed.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            cache,
            media,
            site,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            cache: build_cache_settings(cache)?,
            media: build_media_settings(media)?,
            site: build_site_settings(site)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }
    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let namespace = cache
        .namespace
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_CACHE_NAMESPACE.to_string());
    if !namespace
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
    {
        return Err(LoadError::invalid(
            "cache.namespace",
            "only ASCII letters, digits, `-` and `_` are allowed",
        ));
    }

    Ok(CacheSettings {
        namespace,
        ttl_seconds: cache.ttl_seconds.unwrap_or(DEFAULT_CACHE_TTL_SECS),
        scan_batch_size: cache.scan_batch_size.unwrap_or(DEFAULT_CACHE_SCAN_BATCH),
        operation_timeout_ms: cache
            .operation_timeout_ms
            .unwrap_or(DEFAULT_CACHE_TIMEOUT_MS),
    })
}

fn build_media_settings(media: RawMediaSettings) -> Result<MediaSettings, LoadError> {
    let storage_dir = media
        .storage_dir
        .unwrap_or_else(|| PathBuf::from(DEFAULT_MEDIA_DIR));
    if storage_dir.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "media.storage_dir",
            "path must not be empty",
        ));
    }

    let public_base = media
        .public_base
        .unwrap_or_else(|| DEFAULT_MEDIA_PUBLIC_BASE.to_string());
    if !public_base.starts_with('/') && !public_base.starts_with("http") {
        return Err(LoadError::invalid(
            "media.public_base",
            "must be an absolute path or URL",
        ));
    }

    let presign_secret = media.presign_secret.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_pixels = NonZeroU64::new(media.max_pixels.unwrap_or(DEFAULT_MAX_PIXELS))
        .ok_or_else(|| LoadError::invalid("media.max_pixels", "must be greater than zero"))?;

    let max_upload_value = media.max_upload_bytes.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);
    let max_upload_bytes = NonZeroU64::new(max_upload_value).ok_or_else(|| {
        LoadError::invalid("media.max_upload_bytes", "must be greater than zero")
    })?;
    usize::try_from(max_upload_value).map_err(|_| {
        LoadError::invalid(
            "media.max_upload_bytes",
            "value exceeds supported range for usize",
        )
    })?;

    let breakpoints = media.breakpoints.unwrap_or_else(default_breakpoints);
    validate_breakpoints(&breakpoints)?;

    Ok(MediaSettings {
        storage_dir,
        public_base,
        presign_secret,
        max_pixels,
        max_upload_bytes,
        breakpoints,
    })
}

fn validate_breakpoints(breakpoints: &[BreakpointSpec]) -> Result<(), LoadError> {
    if breakpoints.is_empty() {
        return Err(LoadError::invalid(
            "media.breakpoints",
            "at least one breakpoint is required",
        ));
    }
    for (index, breakpoint) in breakpoints.iter().enumerate() {
        if breakpoint.width == 0 {
            return Err(LoadError::invalid(
                "media.breakpoints",
                format!("`{}` has zero width", breakpoint.name),
            ));
        }
        let name = breakpoint.name.as_str();
        if name.is_empty() || !name.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
            return Err(LoadError::invalid(
                "media.breakpoints",
                format!("invalid breakpoint name `{name}`"),
            ));
        }
        if breakpoints[..index].iter().any(|other| other.name == name) {
            return Err(LoadError::invalid(
                "media.breakpoints",
                format!("duplicate breakpoint name `{name}`"),
            ));
        }
    }
    Ok(())
}

fn build_site_settings(site: RawSiteSettings) -> Result<SiteSeedSettings, LoadError> {
    let homepage_limit = site.homepage_limit.unwrap_or(DEFAULT_HOMEPAGE_LIMIT);
    if homepage_limit == 0 {
        return Err(LoadError::invalid(
            "site.homepage_limit",
            "must be greater than zero",
        ));
    }
    Ok(SiteSeedSettings {
        seed: site.seed.filter(|path| !path.as_os_str().is_empty()),
        homepage_limit,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    namespace: Option<String>,
    ttl_seconds: Option<u64>,
    scan_batch_size: Option<usize>,
    operation_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawMediaSettings {
    storage_dir: Option<PathBuf>,
    public_base: Option<String>,
    presign_secret: Option<String>,
    max_pixels: Option<u64>,
    max_upload_bytes: Option<u64>,
    breakpoints: Option<Vec<BreakpointSpec>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSiteSettings {
    seed: Option<PathBuf>,
    homepage_limit: Option<u32>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

#[cfg(test)]
mod tests;
