//! Typed access on top of raw cache buckets.

use tp_fragment::{Document, dump_tree, load_tree};

use crate::CacheBucket;

/// Convenience methods for every [`CacheBucket`].
///
/// Trees are stored in the binary tree format of [`tp_fragment`]. Entries
/// that fail to decode count as a miss.
pub trait CacheBucketExt: CacheBucket {
    /// Retrieve a cached document tree.
    fn get_tree(&self, key: &str, etag: &str) -> Option<Document> {
        let bytes = self.get(key, etag)?;
        match load_tree(&bytes) {
            Ok(doc) => Some(doc),
            Err(e) => {
                tracing::warn!(key, "Discarding undecodable cached tree: {e}");
                None
            }
        }
    }

    /// Store a document tree. Does nothing if it cannot be encoded.
    fn set_tree(&self, key: &str, etag: &str, doc: &Document) {
        match dump_tree(doc) {
            Ok(bytes) => self.set(key, etag, &bytes),
            Err(e) => tracing::warn!(key, "Failed to encode tree for cache: {e}"),
        }
    }

    /// Retrieve a cached UTF-8 string.
    fn get_string(&self, key: &str, etag: &str) -> Option<String> {
        let bytes = self.get(key, etag)?;
        String::from_utf8(bytes).ok()
    }

    fn set_string(&self, key: &str, etag: &str, value: &str) {
        self.set(key, etag, value.as_bytes());
    }
}

impl<B: CacheBucket + ?Sized> CacheBucketExt for B {}
