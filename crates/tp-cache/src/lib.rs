//! Cache abstraction layer for TextPress.
//!
//! Rendered markup and serialized trees are cached by key and validated by
//! an etag chosen by the caller (a revision number, a modification time).
//! Two traits form the core API:
//!
//! - [`Cache`]: Factory for named cache buckets
//! - [`CacheBucket`]: Key-value store with etag-based invalidation
//!
//! # Implementations
//!
//! - [`NullCache`]: always misses, used when caching is disabled
//! - [`MemoryCache`]: process-local, shared between bucket handles
//! - [`FileCache`]: one file per entry with version validation
//!
//! # Example
//!
//! ```
//! use tp_cache::{Cache, CacheBucketExt, MemoryCache};
//!
//! let cache = MemoryCache::new();
//! let bucket = cache.bucket("markup");
//! bucket.set_string("post/1", "rev-3", "<p>Hello</p>");
//! assert_eq!(bucket.get_string("post/1", "rev-3").as_deref(), Some("<p>Hello</p>"));
//! assert_eq!(bucket.get_string("post/1", "rev-4"), None);
//! ```

mod ext;
mod file;
mod memory;

pub use ext::CacheBucketExt;
pub use file::FileCache;
pub use memory::MemoryCache;

/// A named partition within a [`Cache`].
///
/// A hit requires both the key and the etag to match. An empty `etag` on
/// [`get`](CacheBucket::get) skips validation.
pub trait CacheBucket: Send + Sync {
    /// Retrieve a cached value.
    fn get(&self, key: &str, etag: &str) -> Option<Vec<u8>>;

    /// Store a value, overwriting any existing entry for `key` regardless of
    /// its etag.
    fn set(&self, key: &str, etag: &str, value: &[u8]);
}

/// Factory for named cache [`CacheBucket`]s.
///
/// Handles returned for the same name share the same storage.
pub trait Cache: Send + Sync {
    /// Open or create a named bucket.
    fn bucket(&self, name: &str) -> Box<dyn CacheBucket>;
}

/// No-op [`CacheBucket`] used by [`NullCache`].
pub struct NullCacheBucket;

impl CacheBucket for NullCacheBucket {
    fn get(&self, _key: &str, _etag: &str) -> Option<Vec<u8>> {
        None
    }

    fn set(&self, _key: &str, _etag: &str, _value: &[u8]) {}
}

/// No-op [`Cache`] that always returns [`NullCacheBucket`]s.
pub struct NullCache;

impl Cache for NullCache {
    fn bucket(&self, _name: &str) -> Box<dyn CacheBucket> {
        Box::new(NullCacheBucket)
    }
}
