//! Fail-open cache of rendered pages.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use metrics::counter;
use tracing::{debug, info, warn};

use super::backend::{CacheBackend, CacheBackendError};
use super::config::PageCacheConfig;
use super::keys::{PageKey, page_prefix};

const METRIC_HIT: &str = "lectern_page_cache_hit_total";
const METRIC_MISS: &str = "lectern_page_cache_miss_total";
const METRIC_BACKEND_ERROR: &str = "lectern_page_cache_backend_error_total";
const METRIC_INVALIDATE: &str = "lectern_page_cache_invalidate_total";

/// Write-through cache of fully rendered HTML.
///
/// Every backend failure (error or timeout) is logged and swallowed: lookups
/// degrade to a miss and writes or deletes are skipped. None of the public
/// methods return a `Result`.
///
/// Each invalidation also advances a process-local generation. Renderers
/// capture it before reading their inputs and store through
/// [`PageCache::set_if_current`], so a page rendered from data that was
/// invalidated mid-flight is not written back.
#[derive(Clone)]
pub struct PageCache {
    backend: Arc<dyn CacheBackend>,
    config: PageCacheConfig,
    generation: Arc<AtomicU64>,
}

impl PageCache {
    pub fn new(backend: Arc<dyn CacheBackend>, config: PageCacheConfig) -> Self {
        Self {
            backend,
            config,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Current invalidation generation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &PageCacheConfig {
        &self.config
    }

    pub fn homepage_key(&self) -> PageKey {
        PageKey::homepage(&self.config.namespace)
    }

    /// Key for `slug`, or `None` when the slug is not a valid content slug.
    pub fn slug_key(&self, slug: &str) -> Option<PageKey> {
        PageKey::slug(&self.config.namespace, slug)
    }

    /// Look up a page within the configured operation timeout.
    pub async fn get(&self, key: &PageKey) -> Option<Bytes> {
        self.get_within(key, self.config.operation_timeout).await
    }

    /// Look up a page, giving up after `timeout`. A timed out lookup is a miss.
    pub async fn get_within(&self, key: &PageKey, timeout: Duration) -> Option<Bytes> {
        match bounded(timeout, self.backend.get(key.as_str())).await {
            Ok(Some(bytes)) => {
                counter!(METRIC_HIT).increment(1);
                debug!(key = %key, "page cache hit");
                Some(bytes)
            }
            Ok(None) => {
                counter!(METRIC_MISS).increment(1);
                debug!(key = %key, "page cache miss");
                None
            }
            Err(err) => {
                counter!(METRIC_MISS).increment(1);
                self.report("get", key.as_str(), &err);
                None
            }
        }
    }

    /// Store rendered bytes under `key` with the configured TTL.
    pub async fn set(&self, key: &PageKey, bytes: Bytes) {
        let write = self.backend.set_ex(key.as_str(), bytes, self.config.ttl);
        if let Err(err) = bounded(self.config.operation_timeout, write).await {
            self.report("set", key.as_str(), &err);
        }
    }

    /// Store `bytes` unless an invalidation happened since `generation` was
    /// read. Returns whether the write was attempted.
    pub async fn set_if_current(&self, key: &PageKey, bytes: Bytes, generation: u64) -> bool {
        if self.generation() != generation {
            debug!(key = %key, "skipping page cache write after invalidation");
            return false;
        }
        self.set(key, bytes).await;
        true
    }

    pub async fn invalidate_page(&self, key: &PageKey) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        let keys = [key.as_str().to_string()];
        match bounded(self.config.operation_timeout, self.backend.delete(&keys)).await {
            Ok(_) => {
                counter!(METRIC_INVALIDATE).increment(1);
                debug!(key = %key, "page cache entry invalidated");
            }
            Err(err) => self.report("delete", key.as_str(), &err),
        }
    }

    pub async fn invalidate_homepage(&self) {
        let key = self.homepage_key();
        self.invalidate_page(&key).await;
    }

    /// Delete every page in the namespace, one scan batch at a time.
    ///
    /// Returns the number of keys the backend reported as deleted. A backend
    /// failure stops the sweep; already deleted batches stay deleted.
    pub async fn invalidate_all(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel);
        let prefix = page_prefix(&self.config.namespace);
        let batch = self.config.scan_batch_size.get();
        let mut cursor = None;
        let mut removed = 0_u64;
        let mut batches = 0_u64;

        loop {
            let scan = self.backend.scan(cursor.take(), &prefix, batch);
            let page = match bounded(self.config.operation_timeout, scan).await {
                Ok(page) => page,
                Err(err) => {
                    self.report("scan", &prefix, &err);
                    break;
                }
            };

            if !page.keys.is_empty() {
                let delete = self.backend.delete(&page.keys);
                match bounded(self.config.operation_timeout, delete).await {
                    Ok(count) => {
                        removed += count;
                        batches += 1;
                    }
                    Err(err) => {
                        self.report("delete", &prefix, &err);
                        break;
                    }
                }
            }

            match page.next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        counter!(METRIC_INVALIDATE).increment(removed);
        info!(
            namespace = %self.config.namespace,
            removed,
            batches,
            "page cache flushed"
        );
        removed
    }

    fn report(&self, operation: &'static str, key: &str, err: &CacheBackendError) {
        counter!(METRIC_BACKEND_ERROR).increment(1);
        warn!(
            operation,
            key,
            error = %err,
            "page cache backend call failed"
        );
    }
}

async fn bounded<T, F>(timeout: Duration, call: F) -> Result<T, CacheBackendError>
where
    F: Future<Output = Result<T, CacheBackendError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(CacheBackendError::unavailable(format!(
            "timed out after {}ms",
            timeout.as_millis()
        ))),
    }
}
