//! In-process [`CacheBackend`] with per-entry expiry.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::Instant;

use super::backend::{CacheBackend, CacheBackendError, ScanPage};
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::memory";

#[derive(Debug, Clone)]
struct Entry {
    value: Bytes,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Ordered in-memory key-value store.
///
/// Keys are kept sorted so a scan cursor is simply the last key returned.
/// Expired entries are invisible to every operation and purged lazily on
/// read and write.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RwLock<BTreeMap<String, Entry>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        rw_read(&self.entries, SOURCE, "len")
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn purge_expired(&self, now: Instant) {
        rw_write(&self.entries, SOURCE, "purge_expired").retain(|_, entry| entry.is_live(now));
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheBackendError> {
        let now = Instant::now();
        let expired = {
            let entries = rw_read(&self.entries, SOURCE, "get");
            match entries.get(key) {
                Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
                Some(_) => true,
                None => false,
            }
        };
        if expired {
            let mut entries = rw_write(&self.entries, SOURCE, "get.expire");
            if entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
                entries.remove(key);
            }
        }
        Ok(None)
    }

    async fn set_ex(
        &self,
        key: &str,
        value: Bytes,
        ttl: Duration,
    ) -> Result<(), CacheBackendError> {
        if ttl.is_zero() {
            return Err(CacheBackendError::Rejected {
                operation: "set_ex",
                message: "ttl must be positive".to_string(),
            });
        }
        let now = Instant::now();
        self.purge_expired(now);
        rw_write(&self.entries, SOURCE, "set_ex").insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, CacheBackendError> {
        let now = Instant::now();
        let mut entries = rw_write(&self.entries, SOURCE, "delete");
        let removed = keys
            .iter()
            .filter_map(|key| entries.remove(key))
            .filter(|entry| entry.is_live(now))
            .count();
        Ok(removed as u64)
    }

    async fn scan(
        &self,
        cursor: Option<String>,
        prefix: &str,
        count: usize,
    ) -> Result<ScanPage, CacheBackendError> {
        let count = count.max(1);
        let now = Instant::now();
        let entries = rw_read(&self.entries, SOURCE, "scan");

        let lower = match cursor {
            Some(ref after) => Bound::Excluded(after.as_str()),
            None => Bound::Included(prefix),
        };

        let mut keys = Vec::with_capacity(count);
        let mut last_seen = None;
        let mut exhausted = true;
        for (key, entry) in entries.range::<str, _>((lower, Bound::Unbounded)) {
            if !key.starts_with(prefix) {
                break;
            }
            if keys.len() == count {
                exhausted = false;
                break;
            }
            last_seen = Some(key.clone());
            if entry.is_live(now) {
                keys.push(key.clone());
            }
        }

        let next = if exhausted { None } else { last_seen };
        Ok(ScanPage { keys, next })
    }
}
