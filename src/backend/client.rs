//! Default forwarder: replays requests against the backend over a pooled HTTP client.

use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderName, HeaderValue, Method, Request, Uri};
use futures_util::future::BoxFuture;
use futures_util::StreamExt;
use hyper::body::Body as _;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use url::Url;

use crate::backend::forwarder::{
    ForwardError, ForwardRequest, ForwardResult, RequestForwarder,
};
use crate::backend::sink::ResponseSink;

/// Forwards requests to a single backend origin.
#[derive(Clone)]
pub struct HyperForwarder {
    client: Client<HttpConnector, Body>,
    target: Url,
}

impl HyperForwarder {
    pub fn new(target: Url, connect_timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new()).build(connector);
        Self { client, target }
    }

    pub fn target(&self) -> &Url {
        &self.target
    }

    /// Rebuild an HTTP request from the preamble.
    ///
    /// `Content-Length` from the router is never copied verbatim; it is set again from the
    /// parsed length so a malformed value cannot reach the backend.
    fn build_request(&self, request: ForwardRequest) -> ForwardResult<Request<Body>> {
        let ForwardRequest { preamble, body } = request;

        let method = Method::from_bytes(preamble.method().as_bytes())
            .map_err(|_| ForwardError::InvalidRequest(format!("bad method {:?}", preamble.method())))?;

        let path = preamble.path();
        if !path.starts_with('/') {
            return Err(ForwardError::InvalidRequest(format!("bad path {:?}", path)));
        }
        let uri: Uri = format!("{}{}", self.target.as_str().trim_end_matches('/'), path)
            .parse()
            .map_err(|e| ForwardError::InvalidRequest(format!("bad uri: {}", e)))?;

        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(headers) = builder.headers_mut() {
            for (name, value) in preamble.headers() {
                if name.eq_ignore_ascii_case(header::CONTENT_LENGTH.as_str()) {
                    continue;
                }
                match (
                    HeaderName::from_bytes(name.as_bytes()),
                    HeaderValue::from_str(value.trim()),
                ) {
                    (Ok(name), Ok(value)) => {
                        headers.append(name, value);
                    }
                    _ => {
                        tracing::warn!(header = %name, "Skipping unrepresentable request header");
                    }
                }
            }

            let length = preamble.body_length();
            if length >= 0 && (body.is_some() || length == 0) {
                headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
            }
        }

        let body = match body {
            Some(body) => Body::from_stream(body.into_stream()),
            None => Body::empty(),
        };
        builder
            .body(body)
            .map_err(|e| ForwardError::InvalidRequest(e.to_string()))
    }
}

impl RequestForwarder for HyperForwarder {
    fn forward(
        &self,
        request: ForwardRequest,
        sink: ResponseSink,
    ) -> BoxFuture<'static, ForwardResult<()>> {
        let client = self.client.clone();
        let built = self.build_request(request);

        Box::pin(async move {
            let request = built?;
            tracing::debug!(
                method = %request.method(),
                uri = %request.uri(),
                request_id = sink.request_id(),
                "Forwarding request to backend"
            );

            let response = client.request(request).await?;
            let (parts, incoming) = response.into_parts();

            let headers: Vec<(String, String)> = parts
                .headers
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_string(), v.to_string()))
                })
                .collect();
            let end_stream = incoming.is_end_stream();
            sink.send_head(
                parts.status.as_u16(),
                parts.status.canonical_reason().unwrap_or(""),
                &headers,
                end_stream,
            )?;
            if end_stream {
                return Ok(());
            }

            let mut data = Body::new(incoming).into_data_stream();
            while let Some(chunk) = data.next().await {
                let chunk = chunk?;
                if !chunk.is_empty() {
                    sink.send_chunk(chunk).await?;
                }
            }
            sink.finish()
        })
    }
}
