//! Recognized options, their defaults, and the settings snapshot built from
//! them.

use crate::cache::{Cache, CacheFactory, CacheKeyFn, CacheKeyInput};
use crate::codec::Encoding;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// MIME types compressed by default. Brotli uses its text mode for these.
pub const TEXT_TYPES: [&str; 5] = [
    "text/html",
    "text/css",
    "text/xml",
    "application/json",
    "application/javascript",
];

/// Default compression effort.
pub const DEFAULT_LEVEL: u32 = 6;

/// Default minimum body size for compression, in bytes.
pub const DEFAULT_MIN_SIZE: u64 = 500;

/// Options supplied by the application.
///
/// Every field is optional; [`Options::apply_defaults`] fills in whatever the
/// application left out and never touches a supplied value. Values are not
/// validated: a `level` outside an algorithm's range is passed through, and
/// only gzip clamps it (to 9) at compression time.
///
/// The plain-data options can be deserialized from a host configuration file.
/// Cache key functions and the cache backend are set with builder methods.
#[derive(Clone, Default, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct Options {
    /// MIME types eligible for compression.
    pub mimetypes: Option<HashSet<String>>,
    /// Compression effort.
    pub level: Option<u32>,
    /// Bodies smaller than this are sent uncompressed.
    pub min_size: Option<u64>,
    /// Enables the gzip branch.
    pub gzip_enabled: Option<bool>,
    /// Enables the Brotli branch.
    pub brotli_enabled: Option<bool>,
    /// Whether the layer installs the compression hook.
    pub auto_register: Option<bool>,
    #[serde(skip)]
    gzip_cache_key: Option<CacheKeyFn>,
    #[serde(skip)]
    brotli_cache_key: Option<CacheKeyFn>,
    #[serde(skip)]
    cache_backend: Option<CacheFactory>,
}

impl Options {
    /// Creates an empty set of options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the eligible MIME types.
    pub fn mimetypes<I, S>(mut self, mimetypes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mimetypes = Some(mimetypes.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the compression effort.
    pub fn level(mut self, level: u32) -> Self {
        self.level = Some(level);
        self
    }

    /// Sets the minimum body size for compression.
    pub fn min_size(mut self, size: u64) -> Self {
        self.min_size = Some(size);
        self
    }

    /// Enables or disables gzip.
    pub fn gzip(mut self, enabled: bool) -> Self {
        self.gzip_enabled = Some(enabled);
        self
    }

    /// Enables or disables Brotli.
    pub fn brotli(mut self, enabled: bool) -> Self {
        self.brotli_enabled = Some(enabled);
        self
    }

    /// Controls whether the layer installs the compression hook.
    pub fn auto_register(mut self, enabled: bool) -> Self {
        self.auto_register = Some(enabled);
        self
    }

    /// Sets the cache key function for gzip output.
    pub fn gzip_cache_key<F>(mut self, key: F) -> Self
    where
        F: Fn(&CacheKeyInput<'_>) -> String + Send + Sync + 'static,
    {
        self.gzip_cache_key = Some(Arc::new(key));
        self
    }

    /// Sets the cache key function for Brotli output.
    pub fn brotli_cache_key<F>(mut self, key: F) -> Self
    where
        F: Fn(&CacheKeyInput<'_>) -> String + Send + Sync + 'static,
    {
        self.brotli_cache_key = Some(Arc::new(key));
        self
    }

    /// Sets the factory that builds the cache backend.
    pub fn cache_backend<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn Cache> + Send + Sync + 'static,
    {
        self.cache_backend = Some(Arc::new(factory));
        self
    }

    /// Fills every absent option with its default.
    ///
    /// Options without a default (the cache key functions and the cache
    /// backend) stay absent.
    pub fn apply_defaults(&mut self) {
        self.mimetypes
            .get_or_insert_with(|| TEXT_TYPES.iter().map(|t| t.to_string()).collect());
        self.level.get_or_insert(DEFAULT_LEVEL);
        self.min_size.get_or_insert(DEFAULT_MIN_SIZE);
        self.gzip_enabled.get_or_insert(true);
        self.brotli_enabled.get_or_insert(true);
        self.auto_register.get_or_insert(true);
    }

    /// Applies defaults and freezes the result.
    ///
    /// The cache backend factory, if any, is invoked here, once.
    pub fn resolve(mut self) -> Settings {
        self.apply_defaults();

        let mimetypes = self
            .mimetypes
            .unwrap_or_default()
            .into_iter()
            .map(|m| m.trim().to_ascii_lowercase())
            .collect();

        Settings {
            mimetypes,
            level: self.level.unwrap_or(DEFAULT_LEVEL),
            min_size: self.min_size.unwrap_or(DEFAULT_MIN_SIZE),
            gzip_enabled: self.gzip_enabled.unwrap_or(true),
            brotli_enabled: self.brotli_enabled.unwrap_or(true),
            auto_register: self.auto_register.unwrap_or(true),
            gzip_cache_key: self.gzip_cache_key,
            brotli_cache_key: self.brotli_cache_key,
            cache: self.cache_backend.map(|factory| factory()),
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("mimetypes", &self.mimetypes)
            .field("level", &self.level)
            .field("min_size", &self.min_size)
            .field("gzip_enabled", &self.gzip_enabled)
            .field("brotli_enabled", &self.brotli_enabled)
            .field("auto_register", &self.auto_register)
            .field("gzip_cache_key", &self.gzip_cache_key.is_some())
            .field("brotli_cache_key", &self.brotli_cache_key.is_some())
            .field("cache_backend", &self.cache_backend.is_some())
            .finish()
    }
}

/// Immutable settings used by the compression pipeline.
#[derive(Clone)]
pub struct Settings {
    mimetypes: HashSet<String>,
    level: u32,
    min_size: u64,
    gzip_enabled: bool,
    brotli_enabled: bool,
    auto_register: bool,
    gzip_cache_key: Option<CacheKeyFn>,
    brotli_cache_key: Option<CacheKeyFn>,
    cache: Option<Arc<dyn Cache>>,
}

impl Settings {
    /// Eligible MIME types, lowercased.
    pub fn mimetypes(&self) -> &HashSet<String> {
        &self.mimetypes
    }

    /// Compression effort.
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Minimum body size for compression.
    pub fn min_size(&self) -> u64 {
        self.min_size
    }

    /// Whether gzip may be selected.
    pub fn gzip_enabled(&self) -> bool {
        self.gzip_enabled
    }

    /// Whether Brotli may be selected.
    pub fn brotli_enabled(&self) -> bool {
        self.brotli_enabled
    }

    /// Whether the layer installs the compression hook.
    pub fn auto_register(&self) -> bool {
        self.auto_register
    }

    /// The cache built from the configured backend factory.
    pub fn cache(&self) -> Option<&Arc<dyn Cache>> {
        self.cache.as_ref()
    }

    /// The cache key function for an encoding.
    pub fn cache_key(&self, encoding: Encoding) -> Option<&CacheKeyFn> {
        match encoding {
            Encoding::Brotli => self.brotli_cache_key.as_ref(),
            Encoding::Gzip => self.gzip_cache_key.as_ref(),
        }
    }

    /// Whether an encoding can be selected at all.
    pub fn is_enabled(&self, encoding: Encoding) -> bool {
        match encoding {
            Encoding::Brotli => self.brotli_enabled,
            Encoding::Gzip => self.gzip_enabled,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Options::default().resolve()
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("mimetypes", &self.mimetypes)
            .field("level", &self.level)
            .field("min_size", &self.min_size)
            .field("gzip_enabled", &self.gzip_enabled)
            .field("brotli_enabled", &self.brotli_enabled)
            .field("auto_register", &self.auto_register)
            .field("gzip_cache_key", &self.gzip_cache_key.is_some())
            .field("brotli_cache_key", &self.brotli_cache_key.is_some())
            .field("cache", &self.cache.is_some())
            .finish()
    }
}
