use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "lectern_page_cache_hit_total",
            Unit::Count,
            "Total number of rendered pages served from the page cache."
        );
        describe_counter!(
            "lectern_page_cache_miss_total",
            Unit::Count,
            "Total number of page cache lookups that missed, including failed lookups."
        );
        describe_counter!(
            "lectern_page_cache_backend_error_total",
            Unit::Count,
            "Total number of page cache backend calls that failed or timed out."
        );
        describe_counter!(
            "lectern_page_cache_invalidate_total",
            Unit::Count,
            "Total number of page cache entries invalidated."
        );
        describe_counter!(
            "lectern_template_compile_total",
            Unit::Count,
            "Total number of active templates compiled, by template type."
        );
        describe_histogram!(
            "lectern_template_render_ms",
            Unit::Milliseconds,
            "Template execution latency in milliseconds, by template type."
        );
        describe_histogram!(
            "lectern_variant_generate_ms",
            Unit::Milliseconds,
            "Responsive variant generation latency in milliseconds per source image."
        );
    });
}
