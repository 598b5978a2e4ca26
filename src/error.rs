//! Request-path error taxonomy.
//!
//! Errors local to one request never affect other requests; the variants
//! exist so operators and tests can tell health/config exhaustion apart
//! from transport failures.

use axum::http::StatusCode;
use thiserror::Error;

use crate::transform::TransformError;

/// Why one proxied request failed.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// No route matched the inbound request.
    #[error("no matching route")]
    NoRouteMatched,

    /// The matched route's cluster has zero eligible destinations right
    /// now. Distinct from transport failures: the backends were never
    /// contacted.
    #[error("no available destination in cluster `{0}`")]
    NoAvailableDestination(String),

    /// The matched route currently resolves to no cluster.
    #[error("route `{0}` has no cluster")]
    NoCluster(String),

    /// A transform aborted the pipeline for this request.
    #[error(transparent)]
    Transform(#[from] TransformError),

    /// The upstream call itself failed.
    #[error("upstream request failed: {0}")]
    Upstream(String),
}

impl ProxyError {
    /// The status the client sees for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::NoRouteMatched => StatusCode::NOT_FOUND,
            ProxyError::NoAvailableDestination(_) | ProxyError::NoCluster(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ProxyError::Transform(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}
