//! Upstream transport abstraction.
//!
//! The proxy handler assembles an [`OutboundRequest`]; a [`Forwarder`] puts
//! it on the wire and hands back the upstream response head plus the body
//! stream. Tests substitute their own implementation.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;

use crate::error::ProxyError;
use crate::transform::context::{OutboundRequest, UpstreamResponse};

/// Sends an assembled outbound request and returns the upstream response.
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn send(
        &self,
        outbound: OutboundRequest,
    ) -> Result<(UpstreamResponse, Body), ProxyError>;
}

/// Production forwarder backed by the shared hyper client.
#[derive(Clone)]
pub struct HttpForwarder {
    client: Client<HttpConnector, Body>,
}

impl HttpForwarder {
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self { client }
    }
}

impl Default for HttpForwarder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Forwarder for HttpForwarder {
    async fn send(
        &self,
        outbound: OutboundRequest,
    ) -> Result<(UpstreamResponse, Body), ProxyError> {
        let uri = outbound
            .uri
            .ok_or_else(|| ProxyError::Upstream("outbound request has no target uri".into()))?;

        let mut request = Request::builder()
            .method(outbound.method)
            .uri(uri)
            .body(outbound.body)
            .map_err(|e| ProxyError::Upstream(e.to_string()))?;
        *request.headers_mut() = outbound.headers;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| ProxyError::Upstream(e.to_string()))?;

        let (parts, body) = response.into_parts();
        Ok((
            UpstreamResponse {
                status: parts.status,
                headers: parts.headers,
                trailers: None,
            },
            Body::new(body),
        ))
    }
}
