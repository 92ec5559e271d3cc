//! HTTP response compression middleware for Tower.
//!
//! This crate provides a Tower layer that compresses buffered HTTP response
//! bodies with Brotli or Gzip, based on the client's `Accept-Encoding` header,
//! and can keep the compressed bytes in a cache so repeated responses are
//! only compressed once.
//!
//! # Example
//!
//! ```ignore
//! use compress_response::{Cache, CompressionLayer, MemoryCache, Options};
//! use std::sync::Arc;
//! use tower::ServiceBuilder;
//!
//! let options = Options::new()
//!     .level(9)
//!     .cache_backend(|| Arc::new(MemoryCache::new()) as Arc<dyn Cache>)
//!     .gzip_cache_key(|r| format!("gzip:{}", r.uri()))
//!     .brotli_cache_key(|r| format!("br:{}", r.uri()));
//!
//! let service = ServiceBuilder::new()
//!     .layer(CompressionLayer::from_options(options))
//!     .service(my_service);
//! ```
//!
//! # Compression Rules
//!
//! A response is compressed only when all of these hold:
//! - its MIME type is in the configured set (exact match, parameters ignored)
//! - its status is 2xx
//! - its length is known and at least `min_size` (default: 500 bytes)
//! - it has no `Content-Encoding` header yet
//! - the request's `Accept-Encoding` mentions an enabled encoding
//!
//! Brotli is preferred over Gzip. `Accept-Encoding` is matched loosely: any
//! value containing `brotli` or `gzip`, or listing `br`, qualifies, and quality
//! values are ignored.
//!
//! # Response Modifications
//!
//! When compression is applied:
//! - the body is replaced by the compressed bytes
//! - `Content-Encoding` header is set to the token the client used
//! - `Content-Length` header is set to the compressed length
//! - `Vary` header includes `Accept-Encoding`
//!
//! Failures in the encoder or the cache are returned as errors; the response
//! is not sent uncompressed instead.

#![deny(missing_docs)]

mod body;
mod cache;
mod codec;
mod config;
mod error;
mod future;
mod layer;
mod pipeline;
mod service;

pub use body::CompressionBody;
pub use cache::{Cache, CacheFactory, CacheKeyFn, CacheKeyInput, MemoryCache};
pub use codec::{Compressor, DefaultCompressor, Encoding, GZIP_MAX_LEVEL, Negotiated};
pub use config::{DEFAULT_LEVEL, DEFAULT_MIN_SIZE, Options, Settings, TEXT_TYPES};
pub use error::Error;
pub use future::ResponseFuture;
pub use layer::CompressionLayer;
pub use pipeline::CompressionPipeline;
pub use service::CompressionService;
