//! Storage for compressed response bodies.
//!
//! A cache is an injected capability: the pipeline only calls [`Cache::get`]
//! and [`Cache::set`] with keys produced by an application supplied
//! [`CacheKeyFn`]. The pipeline does not synchronise a lookup with the store
//! that follows a miss, so two concurrent misses for one key may both
//! compress and both store. The stored bytes are identical, last write wins.

use bytes::Bytes;
use http::Uri;
use http::response::Parts;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tower::BoxError;

/// A store of compressed bodies keyed by an opaque string.
pub trait Cache: Send + Sync {
    /// Looks up the compressed bytes stored under `key`.
    fn get(&self, key: &str) -> Result<Option<Bytes>, BoxError>;

    /// Stores compressed bytes under `key`, replacing any previous value.
    fn set(&self, key: String, value: Bytes) -> Result<(), BoxError>;
}

/// Derives a cache key from a response about to be compressed.
///
/// The same logical response must always map to the same key.
pub type CacheKeyFn = Arc<dyn Fn(&CacheKeyInput<'_>) -> String + Send + Sync>;

/// Builds the cache backend. Called once when settings are resolved.
pub type CacheFactory = Arc<dyn Fn() -> Arc<dyn Cache> + Send + Sync>;

/// What a [`CacheKeyFn`] can see of the exchange.
#[derive(Debug, Clone, Copy)]
pub struct CacheKeyInput<'a> {
    uri: &'a Uri,
    parts: &'a Parts,
    body: &'a [u8],
}

impl<'a> CacheKeyInput<'a> {
    pub(crate) fn new(uri: &'a Uri, parts: &'a Parts, body: &'a [u8]) -> Self {
        Self { uri, parts, body }
    }

    /// The URI of the request this response answers.
    pub fn uri(&self) -> &'a Uri {
        self.uri
    }

    /// The response status.
    pub fn status(&self) -> http::StatusCode {
        self.parts.status
    }

    /// The response headers, before any compression headers are added.
    pub fn headers(&self) -> &'a http::HeaderMap {
        &self.parts.headers
    }

    /// The uncompressed response body.
    pub fn body(&self) -> &'a [u8] {
        self.body
    }
}

/// In-process cache with no eviction and no expiry.
#[derive(Default)]
pub struct MemoryCache {
    data: RwLock<HashMap<String, Bytes>>,
}

impl MemoryCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a factory producing a fresh `MemoryCache`, suitable for
    /// [`Options::cache_backend`](crate::Options::cache_backend).
    pub fn factory() -> impl Fn() -> Arc<dyn Cache> + Clone + Send + Sync + 'static {
        || Arc::new(MemoryCache::new()) as Arc<dyn Cache>
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns `true` if nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<Bytes>, BoxError> {
        Ok(self.data.read().get(key).cloned())
    }

    fn set(&self, key: String, value: Bytes) -> Result<(), BoxError> {
        self.data.write().insert(key, value);
        Ok(())
    }
}

impl fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entries", &self.len())
            .finish()
    }
}
