use crate::cache::CacheKeyInput;
use crate::codec::{Compressor, DefaultCompressor, Encoding, Negotiated};
use crate::config::Settings;
use crate::error::Error;
use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderValue};
use http::response::Parts;
use http::{Request, Response, Uri};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// The per-response compression decision and transform.
///
/// Built once from [`Settings`] and shared by every request.
#[derive(Clone)]
pub struct CompressionPipeline {
    settings: Settings,
    compressor: Arc<dyn Compressor>,
}

impl CompressionPipeline {
    /// Creates a pipeline using the built-in encoders.
    pub fn new(settings: Settings) -> Self {
        if settings.cache().is_some() {
            for encoding in [Encoding::Brotli, Encoding::Gzip] {
                if settings.is_enabled(encoding) && settings.cache_key(encoding).is_none() {
                    warn!(
                        %encoding,
                        "compression cache enabled without a cache key function; \
                         responses selecting this encoding will fail"
                    );
                }
            }
        }

        Self {
            settings,
            compressor: Arc::new(DefaultCompressor),
        }
    }

    /// Replaces the routine used to compress bodies.
    pub fn with_compressor<C>(mut self, compressor: C) -> Self
    where
        C: Compressor + 'static,
    {
        self.compressor = Arc::new(compressor);
        self
    }

    /// The settings this pipeline runs with.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Selects the encoding for a raw `Accept-Encoding` value.
    pub fn negotiate(&self, accept_encoding: &str) -> Option<Negotiated> {
        Negotiated::from_accept_encoding(
            accept_encoding,
            self.settings.brotli_enabled(),
            self.settings.gzip_enabled(),
        )
    }

    /// Checks whether a response is a compression candidate.
    ///
    /// `body_len` is used when the response has no `Content-Length` header.
    pub fn is_eligible(&self, parts: &Parts, body_len: Option<u64>) -> bool {
        let Some(mimetype) = response_mimetype(&parts.headers) else {
            trace!("not compressing: no content type");
            return false;
        };
        if !self.settings.mimetypes().contains(&mimetype) {
            trace!(%mimetype, "not compressing: mimetype not eligible");
            return false;
        }

        if !parts.status.is_success() {
            trace!(status = %parts.status, "not compressing: status outside 2xx");
            return false;
        }

        match content_length(&parts.headers).or(body_len) {
            None => {
                trace!("not compressing: unknown content length");
                return false;
            }
            Some(len) if len < self.settings.min_size() => {
                trace!(len, min_size = self.settings.min_size(), "not compressing: below min size");
                return false;
            }
            Some(_) => {}
        }

        if parts.headers.contains_key(header::CONTENT_ENCODING) {
            trace!("not compressing: content encoding already set");
            return false;
        }

        true
    }

    /// Checks that a declared `Content-Length` agrees with the buffered body.
    ///
    /// Responses that advertise a length their body does not have, such as
    /// answers to `HEAD`, are left uncompressed.
    pub(crate) fn body_matches_length(&self, parts: &Parts, body_len: usize) -> bool {
        match content_length(&parts.headers) {
            Some(declared) if declared != body_len as u64 => {
                trace!(declared, body_len, "not compressing: body length differs from content length");
                false
            }
            _ => true,
        }
    }

    /// Compresses a buffered response for the given request, if appropriate.
    ///
    /// This is the hook to call directly when the layer does not install it.
    /// Responses that are not eligible, or whose request accepts neither
    /// encoding, are returned unchanged.
    pub fn process<T>(
        &self,
        request: &Request<T>,
        response: Response<Bytes>,
    ) -> Result<Response<Bytes>, Error> {
        let (mut parts, body) = response.into_parts();

        if !self.is_eligible(&parts, Some(body.len() as u64))
            || !self.body_matches_length(&parts, body.len())
        {
            return Ok(Response::from_parts(parts, body));
        }

        let accept_encoding = request
            .headers()
            .get(header::ACCEPT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        let Some(negotiated) = self.negotiate(accept_encoding) else {
            trace!("not compressing: no accepted encoding");
            return Ok(Response::from_parts(parts, body));
        };

        let compressed = self.compress(request.uri(), &mut parts, &body, negotiated)?;
        Ok(Response::from_parts(parts, compressed))
    }

    /// Compresses `body` and rewrites the headers in `parts`.
    ///
    /// Headers are only touched once the compressed bytes are available.
    pub(crate) fn compress(
        &self,
        uri: &Uri,
        parts: &mut Parts,
        body: &Bytes,
        negotiated: Negotiated,
    ) -> Result<Bytes, Error> {
        let encoding = negotiated.encoding;
        let mimetype = response_mimetype(&parts.headers).unwrap_or_default();

        let compressed = match self.settings.cache() {
            Some(cache) => {
                let key_fn = self
                    .settings
                    .cache_key(encoding)
                    .ok_or(Error::MissingCacheKey(encoding))?;
                let key = key_fn(&CacheKeyInput::new(uri, parts, body));

                match cache.get(&key).map_err(Error::Cache)? {
                    Some(cached) => {
                        debug!(%encoding, %key, "compression cache hit");
                        cached
                    }
                    None => {
                        debug!(%encoding, %key, "compression cache miss");
                        let compressed = self.run(encoding, &mimetype, body)?;
                        cache.set(key, compressed.clone()).map_err(Error::Cache)?;
                        compressed
                    }
                }
            }
            None => self.run(encoding, &mimetype, body)?,
        };

        parts.headers.insert(
            header::CONTENT_ENCODING,
            HeaderValue::from_static(negotiated.token),
        );
        parts
            .headers
            .insert(header::CONTENT_LENGTH, HeaderValue::from(compressed.len()));
        add_vary_accept_encoding(&mut parts.headers);

        debug!(
            %encoding,
            original = body.len(),
            compressed = compressed.len(),
            "compressed response"
        );

        Ok(compressed)
    }

    fn run(&self, encoding: Encoding, mimetype: &str, body: &[u8]) -> Result<Bytes, Error> {
        self.compressor
            .compress(encoding, self.settings.level(), mimetype, body)
            .map_err(|source| Error::Compress { encoding, source })
    }
}

impl fmt::Debug for CompressionPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompressionPipeline")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Returns the lowercased MIME type of the response, without parameters.
fn response_mimetype(headers: &HeaderMap) -> Option<String> {
    let content_type = headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
    let mimetype = content_type.split(';').next().unwrap_or("").trim();
    if mimetype.is_empty() {
        return None;
    }
    Some(mimetype.to_ascii_lowercase())
}

/// Parses the Content-Length header.
fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}

/// Adds Accept-Encoding to the Vary header if not already present.
///
/// A lone readable value gets the token appended; anything else gets a
/// separate `Vary: Accept-Encoding` entry so existing values are kept.
fn add_vary_accept_encoding(headers: &mut HeaderMap) {
    let mut existing = 0;
    let mut single = None;

    for vary in headers.get_all(header::VARY) {
        existing += 1;
        let Ok(vary_str) = vary.to_str() else {
            single = None;
            continue;
        };
        let covered = vary_str
            .split(',')
            .any(|v| v.trim().eq_ignore_ascii_case("accept-encoding"));
        if covered {
            return;
        }
        single = Some(vary_str.trim().to_owned());
    }

    let merged = match (existing, single) {
        (1, Some(vary)) if !vary.is_empty() => {
            HeaderValue::from_str(&format!("{vary}, Accept-Encoding")).ok()
        }
        _ => None,
    };

    match merged {
        Some(value) => {
            headers.insert(header::VARY, value);
        }
        None if existing == 0 => {
            headers.insert(header::VARY, HeaderValue::from_static("Accept-Encoding"));
        }
        None => {
            headers.append(header::VARY, HeaderValue::from_static("Accept-Encoding"));
        }
    }
}
