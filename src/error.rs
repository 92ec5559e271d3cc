use crate::codec::Encoding;
use std::io;
use tower::BoxError;

/// Errors raised while compressing a response.
///
/// None of these are recovered from: the response is left as it was and the
/// error is handed to the caller.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Caching is enabled but no cache key function exists for the selected
    /// encoding.
    #[error("caching is enabled but no cache key function is configured for {0}")]
    MissingCacheKey(Encoding),

    /// The encoder failed.
    #[error("{encoding} compression failed")]
    Compress {
        /// Encoding that was being applied.
        encoding: Encoding,
        /// Underlying encoder error.
        #[source]
        source: io::Error,
    },

    /// The cache backend failed a lookup or a store.
    #[error("compression cache failure")]
    Cache(#[source] BoxError),

    /// The response body could not be buffered.
    #[error("failed to read response body")]
    Body(#[source] BoxError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_messages() {
        assert_eq!(
            Error::MissingCacheKey(Encoding::Gzip).to_string(),
            "caching is enabled but no cache key function is configured for gzip"
        );

        let err = Error::Compress {
            encoding: Encoding::Brotli,
            source: io::Error::other("boom"),
        };
        assert_eq!(err.to_string(), "brotli compression failed");
        assert_eq!(err.source().unwrap().to_string(), "boom");
    }
}
