use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

use crate::domain::templates::TemplateType;

/// Command-line arguments for the lectern binary.
#[derive(Debug, Parser)]
#[command(name = "lectern", version, about = "Lectern content rendering server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "LECTERN_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Load the site seed and serve the public site.
    Serve(Box<ServeArgs>),
    /// Check that a template file compiles and fits its type.
    #[command(name = "validate-template")]
    ValidateTemplate(ValidateTemplateArgs),
    /// Render a template file against JSON data and print the HTML.
    Preview(PreviewArgs),
    /// Generate responsive variants of an image into a directory.
    Variants(VariantsArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the page cache key namespace.
    #[arg(long = "cache-namespace", value_name = "NAME")]
    pub cache_namespace: Option<String>,

    /// Override the page cache entry lifetime.
    #[arg(long = "cache-ttl-seconds", value_name = "SECONDS")]
    pub cache_ttl_seconds: Option<u64>,

    /// Override the media storage directory.
    #[arg(long = "media-storage-dir", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub media_storage_dir: Option<PathBuf>,

    /// Override the site seed file.
    #[arg(long = "site-seed", value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub site_seed: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct ValidateTemplateArgs {
    /// Template file to check.
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub file: PathBuf,

    /// Also dry-run against the sample context of this template type.
    #[arg(long = "type", value_name = "TYPE")]
    pub template_type: Option<TemplateType>,
}

#[derive(Debug, Args, Clone)]
pub struct PreviewArgs {
    /// Template file to render.
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub file: PathBuf,

    /// Template type whose context the data must match.
    #[arg(long = "type", value_name = "TYPE")]
    pub template_type: TemplateType,

    /// JSON file holding the context; the sample context is used when omitted.
    #[arg(long = "data", value_name = "JSON", value_hint = ValueHint::FilePath)]
    pub data: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct VariantsArgs {
    /// Source image.
    #[arg(value_name = "IMAGE", value_hint = ValueHint::FilePath)]
    pub image: PathBuf,

    /// Directory receiving one JPEG per variant.
    #[arg(long = "out", value_name = "DIR", value_hint = ValueHint::DirPath)]
    pub out: PathBuf,
}
