use crate::config::{Options, Settings};
use crate::pipeline::CompressionPipeline;
use crate::service::CompressionService;
use std::sync::Arc;
use tower::Layer;

/// A Tower layer that compresses HTTP response bodies.
///
/// Wrapping a service with this layer installs the compression hook: it
/// runs once per request, after the inner service has produced its response.
/// When `auto_register` is off or no MIME type is eligible, the hook is not
/// installed and responses pass through; the host may then call
/// [`CompressionPipeline::process`] itself.
#[derive(Debug, Clone)]
pub struct CompressionLayer {
    pipeline: Arc<CompressionPipeline>,
}

impl CompressionLayer {
    /// Creates a new compression layer with default settings.
    pub fn new() -> Self {
        Self::from_pipeline(CompressionPipeline::new(Settings::default()))
    }

    /// Creates a layer from application supplied options.
    pub fn from_options(options: Options) -> Self {
        Self::from_pipeline(CompressionPipeline::new(options.resolve()))
    }

    /// Creates a layer around an existing pipeline.
    pub fn from_pipeline(pipeline: CompressionPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }

    /// Returns the pipeline shared by every wrapped service.
    pub fn pipeline(&self) -> &CompressionPipeline {
        &self.pipeline
    }

    fn is_registered(&self) -> bool {
        let settings = self.pipeline.settings();
        settings.auto_register() && !settings.mimetypes().is_empty()
    }
}

impl Default for CompressionLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Layer<S> for CompressionLayer {
    type Service = CompressionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        let pipeline = self.is_registered().then(|| self.pipeline.clone());
        CompressionService::new(inner, pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registered_by_default() {
        let service = CompressionLayer::new().layer(());
        assert!(service.pipeline.is_some());
    }

    #[test]
    fn test_auto_register_off() {
        let layer = CompressionLayer::from_options(Options::new().auto_register(false));
        let service = layer.layer(());
        assert!(service.pipeline.is_none());
    }

    #[test]
    fn test_no_mimetypes() {
        let layer = CompressionLayer::from_options(Options::new().mimetypes(Vec::<String>::new()));
        assert!(layer.layer(()).pipeline.is_none());
    }

    #[test]
    fn test_services_share_pipeline() {
        let layer = CompressionLayer::new();
        let a = layer.layer(());
        let b = layer.layer(());
        assert!(Arc::ptr_eq(
            a.pipeline.as_ref().unwrap(),
            b.pipeline.as_ref().unwrap()
        ));
    }
}
