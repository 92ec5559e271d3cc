use crate::body::CompressionBody;
use crate::codec::Negotiated;
use crate::error::Error;
use crate::pipeline::CompressionPipeline;
use http::response::Parts;
use http::{Response, Uri};
use http_body::Body;
use http_body_util::BodyExt;
use http_body_util::combinators::Collect;
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};
use tower::BoxError;

pin_project! {
    /// Future for compression service responses.
    pub struct ResponseFuture<F, B>
    where
        B: Body,
    {
        #[pin]
        state: State<F, B>,
        pipeline: Option<Arc<CompressionPipeline>>,
        negotiated: Option<Negotiated>,
        uri: Uri,
    }
}

pin_project! {
    #[project = StateProj]
    enum State<F, B>
    where
        B: Body,
    {
        // Waiting for the inner service.
        Inner {
            #[pin]
            future: F,
        },
        // Buffering an eligible body before compressing it.
        Buffering {
            #[pin]
            collect: Collect<B>,
            parts: Option<Parts>,
            pipeline: Arc<CompressionPipeline>,
            negotiated: Negotiated,
        },
        Done,
    }
}

impl<F, B> ResponseFuture<F, B>
where
    B: Body,
{
    pub(crate) fn new(
        inner: F,
        pipeline: Option<Arc<CompressionPipeline>>,
        negotiated: Option<Negotiated>,
        uri: Uri,
    ) -> Self {
        Self {
            state: State::Inner { future: inner },
            pipeline,
            negotiated,
            uri,
        }
    }
}

impl<F, B, E> Future for ResponseFuture<F, B>
where
    F: Future<Output = Result<Response<B>, E>>,
    E: Into<BoxError>,
    B: Body,
    B::Error: Into<BoxError>,
{
    type Output = Result<Response<CompressionBody<B>>, BoxError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        loop {
            let mut this = self.as_mut().project();

            match this.state.as_mut().project() {
                StateProj::Inner { future } => {
                    let response = ready!(future.poll(cx)).map_err(Into::into)?;
                    let (parts, body) = response.into_parts();

                    // Negotiation already happened on the request.
                    let selected = match (this.pipeline.as_ref(), *this.negotiated) {
                        (Some(pipeline), Some(negotiated))
                            if pipeline.is_eligible(&parts, body.size_hint().exact()) =>
                        {
                            Some((pipeline.clone(), negotiated))
                        }
                        _ => None,
                    };

                    let Some((pipeline, negotiated)) = selected else {
                        this.state.set(State::Done);
                        let body = CompressionBody::passthrough(body);
                        return Poll::Ready(Ok(Response::from_parts(parts, body)));
                    };

                    this.state.set(State::Buffering {
                        collect: body.collect(),
                        parts: Some(parts),
                        pipeline,
                        negotiated,
                    });
                }
                StateProj::Buffering {
                    collect,
                    parts,
                    pipeline,
                    negotiated,
                } => {
                    let collected =
                        ready!(collect.poll(cx)).map_err(|e| Error::Body(e.into()))?;
                    let mut parts = parts
                        .take()
                        .expect("ResponseFuture polled after completion");
                    let pipeline = pipeline.clone();
                    let negotiated = *negotiated;
                    this.state.set(State::Done);

                    let trailers = collected.trailers().cloned();
                    let body = collected.to_bytes();
                    if !pipeline.body_matches_length(&parts, body.len()) {
                        let body = CompressionBody::buffered(body, trailers);
                        return Poll::Ready(Ok(Response::from_parts(parts, body)));
                    }
                    let compressed = pipeline.compress(this.uri, &mut parts, &body, negotiated)?;

                    let body = CompressionBody::buffered(compressed, trailers);
                    return Poll::Ready(Ok(Response::from_parts(parts, body)));
                }
                StateProj::Done => panic!("ResponseFuture polled after completion"),
            }
        }
    }
}
