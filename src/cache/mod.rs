//! Offline cache for festival content.
//!
//! This module provides a time-boxed content cache that:
//! - Namespaces content entries under a `cache_` prefix
//! - Expires entries lazily on read after 24 hours
//! - Deletes corrupt entries instead of surfacing them
//! - Wipes all content when the app binary version changes
//! - Serves stale data when a refetch fails (basic offline mode)

mod entry;
mod storage;
mod store;

pub use entry::{CacheEntry, CacheResult, CacheSource};
pub use storage::{KeyValueStorage, MemoryStorage, SqliteStorage};
pub use store::{CacheStore, APP_VERSION_KEY, CACHE_PREFIX, CACHE_TTL_HOURS};
