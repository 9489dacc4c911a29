//! Page cache configuration.
//!
//! Controls key namespacing, entry lifetime and backend deadlines via the
//! `[cache]` section of `lectern.toml`.

use std::num::NonZeroUsize;
use std::time::Duration;

const DEFAULT_NAMESPACE: &str = "lectern";
const DEFAULT_TTL_SECONDS: u64 = 300;
const DEFAULT_SCAN_BATCH_SIZE: usize = 100;
const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 250;

/// Runtime configuration for [`PageCache`](super::PageCache).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCacheConfig {
    /// Prefix shared by every key this process writes.
    pub namespace: String,
    /// Lifetime applied to each entry at write time.
    pub ttl: Duration,
    /// Keys fetched and deleted per round trip during bulk invalidation.
    pub scan_batch_size: NonZeroUsize,
    /// Deadline for a single backend call.
    pub operation_timeout: Duration,
}

impl Default for PageCacheConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            ttl: Duration::from_secs(DEFAULT_TTL_SECONDS),
            scan_batch_size: NonZeroUsize::new(DEFAULT_SCAN_BATCH_SIZE).unwrap_or(NonZeroUsize::MIN),
            operation_timeout: Duration::from_millis(DEFAULT_OPERATION_TIMEOUT_MS),
        }
    }
}

impl PageCacheConfig {
    /// Build a configuration, substituting defaults for zero values.
    pub fn new(
        namespace: impl Into<String>,
        ttl_seconds: u64,
        scan_batch_size: usize,
        operation_timeout_ms: u64,
    ) -> Self {
        let defaults = Self::default();
        let namespace = namespace.into();
        Self {
            namespace: if namespace.trim().is_empty() {
                defaults.namespace
            } else {
                namespace.trim().to_string()
            },
            ttl: if ttl_seconds == 0 {
                defaults.ttl
            } else {
                Duration::from_secs(ttl_seconds)
            },
            scan_batch_size: NonZeroUsize::new(scan_batch_size).unwrap_or(defaults.scan_batch_size),
            operation_timeout: if operation_timeout_ms == 0 {
                defaults.operation_timeout
            } else {
                Duration::from_millis(operation_timeout_ms)
            },
        }
    }
}

impl From<&crate::config::CacheSettings> for PageCacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self::new(
            settings.namespace.clone(),
            settings.ttl_seconds,
            settings.scan_batch_size,
            settings.operation_timeout_ms,
        )
    }
}
