//! Key-value backend behind the page cache.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheBackendError {
    #[error("cache backend unavailable: {message}")]
    Unavailable { message: String },
    #[error("cache backend rejected `{operation}`: {message}")]
    Rejected {
        operation: &'static str,
        message: String,
    },
}

impl CacheBackendError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

/// One batch of a cursor-based key scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    pub keys: Vec<String>,
    /// Cursor for the following batch; `None` once the scan is complete.
    pub next: Option<String>,
}

/// Operations the page cache needs from an external key-value store.
///
/// Implementations provide per-key atomicity; the page cache adds no locking
/// of its own.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheBackendError>;

    /// Store `value` under `key`, expiring after `ttl`.
    async fn set_ex(&self, key: &str, value: Bytes, ttl: Duration)
    -> Result<(), CacheBackendError>;

    /// Delete `keys`, returning how many existed.
    async fn delete(&self, keys: &[String]) -> Result<u64, CacheBackendError>;

    /// Return up to `count` keys starting with `prefix`, resuming after `cursor`.
    ///
    /// A batch may contain fewer than `count` keys while `next` is still set.
    async fn scan(
        &self,
        cursor: Option<String>,
        prefix: &str,
        count: usize,
    ) -> Result<ScanPage, CacheBackendError>;
}
