//! Per-request transform pipeline.
//!
//! An ordered, extensible chain of request/response/trailer mutations
//! applied around the proxy call, layered on top of an optional
//! "copy everything from source" default. Stages run their transforms
//! strictly sequentially; individual transforms may suspend.
//!
//! The common case of no configured transforms takes a fast path that
//! performs the bulk copy and returns without constructing a context.

pub mod builder;
pub mod context;

use async_trait::async_trait;
use axum::http::{header, request, HeaderMap, HeaderName, Uri};
use thiserror::Error;

use crate::transform::context::{
    ClientResponse, OutboundRequest, RequestTransformContext, ResponseTransformContext,
    ResponseTrailersTransformContext, UpstreamResponse,
};

/// Failure inside a transform or during URI synthesis. Aborts the remaining
/// pipeline for the stage and fails only the current request.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("invalid destination uri `{0}`")]
    InvalidUri(String),

    #[error("transform failed: {0}")]
    Failed(String),
}

/// A mutation applied to the outbound request before the proxy call.
#[async_trait]
pub trait RequestTransform: Send + Sync {
    async fn apply(&self, ctx: &mut RequestTransformContext<'_>) -> Result<(), TransformError>;
}

/// A mutation applied to the client response after upstream headers arrive.
#[async_trait]
pub trait ResponseTransform: Send + Sync {
    async fn apply(&self, ctx: &mut ResponseTransformContext<'_>) -> Result<(), TransformError>;
}

/// A mutation applied to the outgoing trailers after the full response.
#[async_trait]
pub trait ResponseTrailersTransform: Send + Sync {
    async fn apply(
        &self,
        ctx: &mut ResponseTrailersTransformContext<'_>,
    ) -> Result<(), TransformError>;
}

/// Hop-by-hop headers never forwarded in either direction.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::TRANSFER_ENCODING,
    header::TE,
    header::TRAILER,
    header::UPGRADE,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
];

/// Default bulk copy of inbound request headers onto the outbound request.
/// Strips hop-by-hop headers and `Host` (rewritten for the destination).
pub fn copy_request_headers(src: &HeaderMap, dst: &mut HeaderMap) {
    for (name, value) in src {
        if *name == header::HOST || HOP_BY_HOP.contains(name) {
            continue;
        }
        dst.append(name.clone(), value.clone());
    }
}

/// Default bulk copy of upstream response headers onto the client response.
pub fn copy_response_headers(src: &HeaderMap, dst: &mut HeaderMap) {
    for (name, value) in src {
        if HOP_BY_HOP.contains(name) {
            continue;
        }
        dst.append(name.clone(), value.clone());
    }
}

/// Combine a destination address prefix with a path and query into the
/// outbound request URI.
pub fn make_destination_address(
    prefix: &str,
    path: &str,
    query: &str,
) -> Result<Uri, TransformError> {
    let prefix = prefix.strip_suffix('/').unwrap_or(prefix);
    let mut address = String::with_capacity(prefix.len() + path.len() + query.len() + 2);
    address.push_str(prefix);
    if !path.starts_with('/') {
        address.push('/');
    }
    address.push_str(path);
    if !query.is_empty() {
        address.push('?');
        address.push_str(query);
    }

    address
        .parse::<Uri>()
        .map_err(|_| TransformError::InvalidUri(address))
}

/// Transforms for a given route, built once from its transform
/// configuration and shared by every request the route proxies.
#[derive(Default)]
pub struct Transformer {
    pub(crate) copy_request_headers: Option<bool>,
    pub(crate) copy_response_headers: Option<bool>,
    pub(crate) copy_response_trailers: Option<bool>,
    pub(crate) request_transforms: Vec<Box<dyn RequestTransform>>,
    pub(crate) response_transforms: Vec<Box<dyn ResponseTransform>>,
    pub(crate) response_trailer_transforms: Vec<Box<dyn ResponseTrailersTransform>>,
}

impl std::fmt::Debug for Transformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transformer")
            .field("copy_request_headers", &self.copy_request_headers)
            .field("copy_response_headers", &self.copy_response_headers)
            .field("copy_response_trailers", &self.copy_response_trailers)
            .field("request_transforms", &self.request_transforms.len())
            .field("response_transforms", &self.response_transforms.len())
            .field(
                "response_trailer_transforms",
                &self.response_trailer_transforms.len(),
            )
            .finish()
    }
}

impl Transformer {
    /// Shape the outbound request. Runs the bulk header copy (default on),
    /// then the configured request transforms in order, then synthesizes the
    /// outbound URI unless a transform set one explicitly.
    pub async fn transform_request(
        &self,
        inbound: &request::Parts,
        outbound: &mut OutboundRequest,
        destination_prefix: &str,
    ) -> Result<(), TransformError> {
        let headers_copied = self.copy_request_headers.unwrap_or(true);
        if headers_copied {
            copy_request_headers(&inbound.headers, &mut outbound.headers);
        }

        if self.request_transforms.is_empty() {
            return Ok(());
        }

        let mut ctx = RequestTransformContext {
            destination_prefix,
            path: inbound.uri.path().to_string(),
            query: inbound.uri.query().unwrap_or("").to_string(),
            headers_copied,
            inbound,
            outbound,
        };

        for transform in &self.request_transforms {
            transform.apply(&mut ctx).await?;
        }

        // A transform may have set a custom target URI directly.
        if ctx.outbound.uri.is_none() {
            ctx.outbound.uri = Some(make_destination_address(
                ctx.destination_prefix,
                &ctx.path,
                &ctx.query,
            )?);
        }

        Ok(())
    }

    /// Shape the client response once upstream headers are available.
    pub async fn transform_response(
        &self,
        upstream: &UpstreamResponse,
        client: &mut ClientResponse,
    ) -> Result<(), TransformError> {
        let headers_copied = self.copy_response_headers.unwrap_or(true);
        if headers_copied {
            copy_response_headers(&upstream.headers, &mut client.headers);
        }

        if self.response_transforms.is_empty() {
            return Ok(());
        }

        let mut ctx = ResponseTransformContext {
            headers_copied,
            upstream,
            client,
        };

        for transform in &self.response_transforms {
            transform.apply(&mut ctx).await?;
        }

        Ok(())
    }

    /// Shape the outgoing trailers after the full response. The entire stage
    /// is skipped, with no bulk copy and no transforms, when the client response
    /// does not support trailers or its trailer collection is read-only.
    pub async fn transform_response_trailers(
        &self,
        upstream: &UpstreamResponse,
        client: &mut ClientResponse,
    ) -> Result<(), TransformError> {
        let Some(trailers) = client.trailers.writable() else {
            return Ok(());
        };

        let headers_copied = self.copy_response_trailers.unwrap_or(true);
        if headers_copied {
            if let Some(upstream_trailers) = &upstream.trailers {
                for (name, value) in upstream_trailers {
                    trailers.append(name.clone(), value.clone());
                }
            }
        }

        if self.response_trailer_transforms.is_empty() {
            return Ok(());
        }

        let mut ctx = ResponseTrailersTransformContext {
            headers_copied,
            upstream,
            trailers,
        };

        for transform in &self.response_trailer_transforms {
            transform.apply(&mut ctx).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use context::OutgoingTrailers;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn inbound(uri: &str) -> request::Parts {
        let (parts, _) = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .header("x-custom", "1")
            .header("connection", "keep-alive")
            .body(Body::empty())
            .unwrap()
            .into_parts();
        parts
    }

    fn outbound() -> OutboundRequest {
        OutboundRequest::new(Method::GET, Body::empty())
    }

    /// Records the order it ran in; optionally rewrites the path.
    struct RecordingTransform {
        label: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        calls: Arc<AtomicUsize>,
        set_path: Option<&'static str>,
    }

    #[async_trait]
    impl RequestTransform for RecordingTransform {
        async fn apply(
            &self,
            ctx: &mut RequestTransformContext<'_>,
        ) -> Result<(), TransformError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.log.lock().unwrap().push(self.label);
            if let Some(path) = self.set_path {
                ctx.path = path.to_string();
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn bulk_copy_runs_without_transforms() {
        let transformer = Transformer::default();
        let inbound = inbound("http://example.com/a/b?x=1");
        let mut outbound = outbound();

        transformer
            .transform_request(&inbound, &mut outbound, "http://10.0.0.1:3000")
            .await
            .unwrap();

        assert_eq!(outbound.headers.get("x-custom").unwrap(), "1");
        // Hop-by-hop never copied.
        assert!(outbound.headers.get("connection").is_none());
        // Empty list: the stage stops before URI synthesis.
        assert!(outbound.uri.is_none());
    }

    #[tokio::test]
    async fn transforms_run_in_order_exactly_once() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let calls_a = Arc::new(AtomicUsize::new(0));
        let calls_b = Arc::new(AtomicUsize::new(0));

        let transformer = Transformer {
            request_transforms: vec![
                Box::new(RecordingTransform {
                    label: "a",
                    log: log.clone(),
                    calls: calls_a.clone(),
                    set_path: None,
                }),
                Box::new(RecordingTransform {
                    label: "b",
                    log: log.clone(),
                    calls: calls_b.clone(),
                    set_path: None,
                }),
            ],
            ..Default::default()
        };

        let inbound = inbound("http://example.com/a");
        let mut outbound = outbound();
        transformer
            .transform_request(&inbound, &mut outbound, "http://10.0.0.1:3000")
            .await
            .unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
        assert_eq!(calls_a.load(Ordering::SeqCst), 1);
        assert_eq!(calls_b.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn copy_disabled_skips_bulk_copy() {
        let transformer = Transformer {
            copy_request_headers: Some(false),
            ..Default::default()
        };
        let inbound = inbound("http://example.com/a");
        let mut outbound = outbound();

        transformer
            .transform_request(&inbound, &mut outbound, "http://10.0.0.1:3000")
            .await
            .unwrap();

        assert!(outbound.headers.is_empty());
    }

    #[tokio::test]
    async fn synthesizes_uri_from_rewritten_path() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let calls = Arc::new(AtomicUsize::new(0));
        let transformer = Transformer {
            request_transforms: vec![Box::new(RecordingTransform {
                label: "rewrite",
                log,
                calls,
                set_path: Some("/rewritten"),
            })],
            ..Default::default()
        };

        let inbound = inbound("http://example.com/original?q=2");
        let mut outbound = outbound();
        transformer
            .transform_request(&inbound, &mut outbound, "http://10.0.0.1:3000/")
            .await
            .unwrap();

        assert_eq!(
            outbound.uri.unwrap().to_string(),
            "http://10.0.0.1:3000/rewritten?q=2"
        );
    }

    struct SetUriTransform;

    #[async_trait]
    impl RequestTransform for SetUriTransform {
        async fn apply(
            &self,
            ctx: &mut RequestTransformContext<'_>,
        ) -> Result<(), TransformError> {
            ctx.outbound.uri = Some("http://override:9999/explicit".parse().unwrap());
            Ok(())
        }
    }

    #[tokio::test]
    async fn explicit_uri_wins_over_synthesis() {
        let transformer = Transformer {
            request_transforms: vec![Box::new(SetUriTransform)],
            ..Default::default()
        };

        let inbound = inbound("http://example.com/a");
        let mut outbound = outbound();
        transformer
            .transform_request(&inbound, &mut outbound, "http://10.0.0.1:3000")
            .await
            .unwrap();

        assert_eq!(
            outbound.uri.unwrap().to_string(),
            "http://override:9999/explicit"
        );
    }

    struct CountingTrailerTransform {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ResponseTrailersTransform for CountingTrailerTransform {
        async fn apply(
            &self,
            _ctx: &mut ResponseTrailersTransformContext<'_>,
        ) -> Result<(), TransformError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn upstream_with_trailers() -> UpstreamResponse {
        let mut trailers = HeaderMap::new();
        trailers.insert("grpc-status", "0".parse().unwrap());
        UpstreamResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            trailers: Some(trailers),
        }
    }

    #[tokio::test]
    async fn trailer_stage_skipped_when_unsupported() {
        let calls = Arc::new(AtomicUsize::new(0));
        let transformer = Transformer {
            response_trailer_transforms: vec![Box::new(CountingTrailerTransform {
                calls: calls.clone(),
            })],
            ..Default::default()
        };

        let upstream = upstream_with_trailers();
        let mut client = ClientResponse::new(StatusCode::OK, OutgoingTrailers::Unsupported);
        transformer
            .transform_response_trailers(&upstream, &mut client)
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let mut client =
            ClientResponse::new(StatusCode::OK, OutgoingTrailers::ReadOnly(HeaderMap::new()));
        transformer
            .transform_response_trailers(&upstream, &mut client)
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        // No bulk copy happened either.
        assert!(matches!(
            client.trailers,
            OutgoingTrailers::ReadOnly(ref map) if map.is_empty()
        ));
    }

    #[tokio::test]
    async fn trailer_stage_copies_and_transforms_when_writable() {
        let calls = Arc::new(AtomicUsize::new(0));
        let transformer = Transformer {
            response_trailer_transforms: vec![Box::new(CountingTrailerTransform {
                calls: calls.clone(),
            })],
            ..Default::default()
        };

        let upstream = upstream_with_trailers();
        let mut client =
            ClientResponse::new(StatusCode::OK, OutgoingTrailers::Writable(HeaderMap::new()));
        transformer
            .transform_response_trailers(&upstream, &mut client)
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let OutgoingTrailers::Writable(map) = &client.trailers else {
            panic!("trailers should stay writable");
        };
        assert_eq!(map.get("grpc-status").unwrap(), "0");
    }

    #[test]
    fn destination_address_joins_prefix_path_query() {
        let uri = make_destination_address("http://10.0.0.1:3000/", "/api/v1", "a=1").unwrap();
        assert_eq!(uri.to_string(), "http://10.0.0.1:3000/api/v1?a=1");

        let uri = make_destination_address("http://10.0.0.1:3000", "api", "").unwrap();
        assert_eq!(uri.to_string(), "http://10.0.0.1:3000/api");
    }
}
