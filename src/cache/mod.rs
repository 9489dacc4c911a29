//! Lectern page cache.
//!
//! Fully rendered HTML is stored in an external key-value backend keyed by
//! page identity (homepage or slug) and invalidated explicitly when content
//! or templates change. The backend sits behind [`CacheBackend`];
//! [`MemoryBackend`] is the in-process implementation.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! namespace = "lectern"
//! ttl_seconds = 300
//! scan_batch_size = 100
//! operation_timeout_ms = 250
//! ```

mod backend;
mod config;
mod keys;
pub(crate) mod lock;
mod memory;
mod page;

pub use backend::{CacheBackend, CacheBackendError, ScanPage};
pub use config::PageCacheConfig;
pub use keys::{PageKey, PageKind, page_prefix};
pub use memory::MemoryBackend;
pub use page::PageCache;
