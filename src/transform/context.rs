//! Transport representations and per-stage transform contexts.
//!
//! One context per proxied request per stage, constructed only when the
//! stage actually has transforms to run, and discarded when the proxy call
//! completes.

use axum::body::Body;
use axum::http::{request, HeaderMap, Method, StatusCode, Uri};

/// The outbound request being assembled for the upstream call.
///
/// `uri` stays `None` until a transform sets it explicitly or the pipeline
/// synthesizes it from the destination prefix and the (possibly rewritten)
/// path and query.
pub struct OutboundRequest {
    pub method: Method,
    pub uri: Option<Uri>,
    pub headers: HeaderMap,
    pub body: Body,
}

impl OutboundRequest {
    /// Start an outbound request mirroring the inbound method, with empty
    /// headers and the given body.
    pub fn new(method: Method, body: Body) -> Self {
        Self {
            method,
            uri: None,
            headers: HeaderMap::new(),
            body,
        }
    }
}

/// The upstream response as received by the forwarder: status, headers and
/// any trailers that arrived with the body.
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub trailers: Option<HeaderMap>,
}

/// The trailer collection of the client-facing response.
///
/// Models whether the underlying transport supports outgoing trailers at
/// all, and whether the collection can still be written.
#[derive(Debug)]
pub enum OutgoingTrailers {
    /// The response transport cannot carry trailers.
    Unsupported,
    /// Trailers exist but can no longer be modified.
    ReadOnly(HeaderMap),
    /// Trailers can be written.
    Writable(HeaderMap),
}

impl OutgoingTrailers {
    /// The writable trailer map, if the transport supports trailers and the
    /// collection is not read-only.
    pub fn writable(&mut self) -> Option<&mut HeaderMap> {
        match self {
            OutgoingTrailers::Writable(map) => Some(map),
            _ => None,
        }
    }
}

/// The client-facing response being assembled from the upstream one.
pub struct ClientResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub trailers: OutgoingTrailers,
}

impl ClientResponse {
    /// Start a client response mirroring the upstream status, with empty
    /// headers and the given trailer capability.
    pub fn new(status: StatusCode, trailers: OutgoingTrailers) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            trailers,
        }
    }
}

/// Context handed to each request transform.
pub struct RequestTransformContext<'a> {
    /// Address prefix of the selected destination.
    pub destination_prefix: &'a str,
    /// Request path, rewritable by transforms; used for URI synthesis.
    pub path: String,
    /// Raw query string without the leading `?`, rewritable by transforms.
    pub query: String,
    /// Whether the bulk header copy ran before the transforms.
    pub headers_copied: bool,
    /// The original inbound request head.
    pub inbound: &'a request::Parts,
    /// The outbound request under construction.
    pub outbound: &'a mut OutboundRequest,
}

/// Context handed to each response transform.
pub struct ResponseTransformContext<'a> {
    /// Whether the bulk header copy ran before the transforms.
    pub headers_copied: bool,
    /// The response received from the destination.
    pub upstream: &'a UpstreamResponse,
    /// The client-facing response under construction.
    pub client: &'a mut ClientResponse,
}

/// Context handed to each response-trailer transform.
pub struct ResponseTrailersTransformContext<'a> {
    /// Whether the bulk trailer copy ran before the transforms.
    pub headers_copied: bool,
    /// The response received from the destination.
    pub upstream: &'a UpstreamResponse,
    /// The writable outgoing trailer map.
    pub trailers: &'a mut HeaderMap,
}
