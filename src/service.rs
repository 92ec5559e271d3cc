use crate::body::CompressionBody;
use crate::future::ResponseFuture;
use crate::pipeline::CompressionPipeline;
use http::{Request, Response};
use http_body::Body;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{BoxError, Service};

/// A Tower service that compresses HTTP response bodies.
#[derive(Debug, Clone)]
pub struct CompressionService<S> {
    inner: S,
    pub(crate) pipeline: Option<Arc<CompressionPipeline>>,
}

impl<S> CompressionService<S> {
    /// Creates a new compression service wrapping the given inner service.
    ///
    /// With no pipeline, every response passes through untouched.
    pub fn new(inner: S, pipeline: Option<Arc<CompressionPipeline>>) -> Self {
        Self { inner, pipeline }
    }

    /// Returns a reference to the inner service.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Returns a mutable reference to the inner service.
    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Consumes this service, returning the inner service.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for CompressionService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Error: Into<BoxError>,
    ResBody: Body,
    ResBody::Error: Into<BoxError>,
{
    type Response = Response<CompressionBody<ResBody>>;
    type Error = BoxError;
    type Future = ResponseFuture<S::Future, ResBody>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let negotiated = self.pipeline.as_ref().and_then(|pipeline| {
            let accept_encoding = req
                .headers()
                .get(http::header::ACCEPT_ENCODING)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("");
            pipeline.negotiate(accept_encoding)
        });
        let uri = req.uri().clone();

        let inner = self.inner.call(req);

        ResponseFuture::new(inner, self.pipeline.clone(), negotiated, uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Cache, MemoryCache};
    use crate::codec::{Compressor, DefaultCompressor, Encoding};
    use crate::config::{Options, Settings};
    use crate::layer::CompressionLayer;
    use bytes::Bytes;
    use http::{HeaderValue, StatusCode, header};
    use http_body_util::{BodyExt, Full};
    use std::convert::Infallible;
    use std::io::{self, Read};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::{Layer, ServiceExt, service_fn};

    #[derive(Clone, Default)]
    struct CountingCompressor {
        calls: Arc<AtomicUsize>,
    }

    impl Compressor for CountingCompressor {
        fn compress(
            &self,
            encoding: Encoding,
            level: u32,
            mimetype: &str,
            input: &[u8],
        ) -> io::Result<Bytes> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            DefaultCompressor.compress(encoding, level, mimetype, input)
        }
    }

    fn large_html() -> String {
        "<div class=\"row\">Lorem ipsum dolor sit amet</div>\n".repeat(40)
    }

    fn handler(
        content_type: &'static str,
        body: String,
    ) -> impl Service<Request<Full<Bytes>>, Response = Response<Full<Bytes>>, Error = Infallible>
    + Clone {
        service_fn(move |_req: Request<Full<Bytes>>| {
            let body = body.clone();
            async move {
                Ok::<_, Infallible>(
                    Response::builder()
                        .header(header::CONTENT_TYPE, content_type)
                        .body(Full::new(Bytes::from(body)))
                        .unwrap(),
                )
            }
        })
    }

    fn request(accept_encoding: &str) -> Request<Full<Bytes>> {
        Request::builder()
            .uri("/large/")
            .header(header::ACCEPT_ENCODING, accept_encoding)
            .body(Full::default())
            .unwrap()
    }

    async fn body_bytes<B>(response: Response<B>) -> Bytes
    where
        B: Body,
        B::Error: std::fmt::Debug,
    {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn test_gzip_response() {
        let body = large_html();
        let service = CompressionLayer::new().layer(handler("text/html", body.clone()));

        let response = service.oneshot(request("gzip, deflate")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(header::CONTENT_ENCODING).unwrap(), "gzip");
        assert_eq!(response.headers().get(header::VARY).unwrap(), "Accept-Encoding");
        let length = response.headers().get(header::CONTENT_LENGTH).unwrap().clone();

        let compressed = body_bytes(response).await;
        assert_eq!(length, HeaderValue::from(compressed.len()));
        assert!(compressed.len() < body.len());

        let mut decoded = String::new();
        flate2::read::GzDecoder::new(&compressed[..])
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, body);
    }

    #[tokio::test]
    async fn test_brotli_response() {
        let body = large_html();
        let service = CompressionLayer::new().layer(handler("application/json", body.clone()));

        let response = service.oneshot(request("gzip, deflate, br")).await.unwrap();
        assert_eq!(response.headers().get(header::CONTENT_ENCODING).unwrap(), "br");

        let compressed = body_bytes(response).await;
        let mut decoded = String::new();
        brotli::Decompressor::new(&compressed[..], 4096)
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, body);
    }

    #[tokio::test]
    async fn test_small_response_passthrough() {
        let service = CompressionLayer::new().layer(handler("text/html", "<p>hi</p>".into()));

        let response = service.oneshot(request("gzip")).await.unwrap();

        assert!(response.headers().get(header::CONTENT_ENCODING).is_none());
        assert!(response.headers().get(header::VARY).is_none());
        assert_eq!(body_bytes(response).await, Bytes::from("<p>hi</p>"));
    }

    #[tokio::test]
    async fn test_image_passthrough() {
        let body = large_html();
        let service = CompressionLayer::new().layer(handler("image/png", body.clone()));

        let response = service.oneshot(request("gzip, br")).await.unwrap();

        assert!(response.headers().get(header::CONTENT_ENCODING).is_none());
        assert_eq!(body_bytes(response).await, Bytes::from(body));
    }

    #[tokio::test]
    async fn test_head_response_passthrough() {
        let inner = service_fn(|_req: Request<Full<Bytes>>| async {
            Ok::<_, Infallible>(
                Response::builder()
                    .header(header::CONTENT_TYPE, "text/html")
                    .header(header::CONTENT_LENGTH, 2000)
                    .body(Full::new(Bytes::new()))
                    .unwrap(),
            )
        });
        let service = CompressionLayer::new().layer(inner);

        let response = service.oneshot(request("gzip")).await.unwrap();

        assert!(response.headers().get(header::CONTENT_ENCODING).is_none());
        assert!(response.headers().get(header::VARY).is_none());
        assert_eq!(response.headers().get(header::CONTENT_LENGTH).unwrap(), "2000");
        assert!(body_bytes(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_not_registered() {
        let body = large_html();
        let layer = CompressionLayer::from_options(Options::new().auto_register(false));
        let service = layer.layer(handler("text/html", body.clone()));

        let response = service.oneshot(request("gzip")).await.unwrap();

        assert!(response.headers().get(header::CONTENT_ENCODING).is_none());
        assert_eq!(body_bytes(response).await, Bytes::from(body));
    }

    #[tokio::test]
    async fn test_empty_mimetypes_not_registered() {
        let body = large_html();
        let layer =
            CompressionLayer::from_options(Options::new().mimetypes(Vec::<String>::new()));
        let service = layer.layer(handler("text/html", body));

        let response = service.oneshot(request("gzip")).await.unwrap();
        assert!(response.headers().get(header::CONTENT_ENCODING).is_none());
    }

    #[tokio::test]
    async fn test_cached_responses_compress_once() {
        let compressor = CountingCompressor::default();
        let settings = Options::new()
            .cache_backend(|| Arc::new(MemoryCache::new()) as Arc<dyn Cache>)
            .gzip_cache_key(|input| input.uri().path().to_owned())
            .brotli_cache_key(|input| input.uri().path().to_owned())
            .resolve();
        let pipeline = CompressionPipeline::new(settings).with_compressor(compressor.clone());
        let service = CompressionLayer::from_pipeline(pipeline)
            .layer(handler("text/css", large_html()));

        let first = service.clone().oneshot(request("gzip")).await.unwrap();
        let second = service.oneshot(request("gzip")).await.unwrap();

        assert_eq!(body_bytes(first).await, body_bytes(second).await);
        assert_eq!(compressor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_cache_key_is_an_error() {
        let settings = Options::new()
            .cache_backend(|| Arc::new(MemoryCache::new()) as Arc<dyn Cache>)
            .resolve();
        let service = CompressionLayer::from_pipeline(CompressionPipeline::new(settings))
            .layer(handler("text/html", large_html()));

        let Err(err) = service.oneshot(request("gzip")).await else {
            panic!("expected a missing cache key error");
        };
        let err = err.downcast::<crate::Error>().unwrap();
        assert!(matches!(*err, crate::Error::MissingCacheKey(Encoding::Gzip)));
    }

    #[tokio::test]
    async fn test_default_settings_match_layer() {
        let layer = CompressionLayer::new();
        assert_eq!(layer.pipeline().settings().min_size(), Settings::default().min_size());
    }
}
