//! The backend dispatch seam.

use std::convert::Infallible;
use std::future::Future;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::stream::{self, Stream};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::backend::sink::ResponseSink;
use crate::protocol::preamble::RequestPreamble;

/// Errors raised while forwarding one request to the backend.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Upstream error: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),

    #[error("Response body error: {0}")]
    Body(#[from] axum::Error),

    #[error("Stream cancelled")]
    Cancelled,
}

impl ForwardError {
    /// Label used for the `outcome` metric dimension.
    pub fn outcome(&self) -> &'static str {
        match self {
            ForwardError::InvalidRequest(_) => "invalid_request",
            ForwardError::Upstream(_) => "upstream_error",
            ForwardError::Body(_) => "body_error",
            ForwardError::Cancelled => "cancelled",
        }
    }
}

pub type ForwardResult<T> = Result<T, ForwardError>;

/// A request handed from the engine to the backend.
#[derive(Debug)]
pub struct ForwardRequest {
    pub preamble: RequestPreamble,
    /// Present when the preamble announced a body.
    pub body: Option<RequestBody>,
}

/// Request body chunks as they arrive from the router. Ends when the router sends
/// `END_STREAM` or the stream is cancelled.
#[derive(Debug)]
pub struct RequestBody {
    rx: mpsc::Receiver<Bytes>,
}

impl RequestBody {
    pub(crate) fn new(rx: mpsc::Receiver<Bytes>) -> Self {
        Self { rx }
    }

    pub async fn next(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    /// Adapt into a stream usable as a streaming HTTP body.
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
        stream::unfold(self.rx, |mut rx| async move {
            rx.recv().await.map(|chunk| (Ok(chunk), rx))
        })
    }
}

/// Dispatches reconstructed requests to the backend and writes the response into the sink.
pub trait RequestForwarder: Send + Sync {
    fn forward(&self, request: ForwardRequest, sink: ResponseSink)
        -> BoxFuture<'static, ForwardResult<()>>;
}

/// Forwarder backed by a closure.
pub struct ForwardFn<F>(F);

/// Build a forwarder from an async closure.
pub fn forward_fn<F, Fut>(f: F) -> ForwardFn<F>
where
    F: Fn(ForwardRequest, ResponseSink) -> Fut + Send + Sync,
    Fut: Future<Output = ForwardResult<()>> + Send + 'static,
{
    ForwardFn(f)
}

impl<F, Fut> RequestForwarder for ForwardFn<F>
where
    F: Fn(ForwardRequest, ResponseSink) -> Fut + Send + Sync,
    Fut: Future<Output = ForwardResult<()>> + Send + 'static,
{
    fn forward(
        &self,
        request: ForwardRequest,
        sink: ResponseSink,
    ) -> BoxFuture<'static, ForwardResult<()>> {
        Box::pin((self.0)(request, sink))
    }
}
