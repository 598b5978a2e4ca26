//! Route matching.
//!
//! # Design Decisions
//! - Host matching is case-insensitive (per HTTP spec)
//! - Path matching is case-sensitive
//! - Empty condition = always matches (wildcard)
//! - No regex to guarantee O(n) matching

use axum::http::Request;

use crate::config::RouteConfig;

/// Matching conditions compiled once from a route config.
///
/// All present conditions must hold (AND semantics); an absent condition
/// matches anything.
#[derive(Debug, Clone)]
pub struct RouteMatcher {
    host: Option<String>,
    path_prefix: Option<String>,
}

impl RouteMatcher {
    /// Compile the matcher for a route. The host is normalized to lowercase
    /// for case-insensitive matching.
    pub fn compile(config: &RouteConfig) -> Self {
        Self {
            host: config.host.as_ref().map(|h| h.to_lowercase()),
            path_prefix: config.path_prefix.clone(),
        }
    }

    /// Returns true if the request satisfies every configured condition.
    pub fn matches<B>(&self, req: &Request<B>) -> bool {
        if let Some(expected) = &self.host {
            let matched = req
                .headers()
                .get("host")
                .and_then(|h| h.to_str().ok())
                .map(|h| h.to_lowercase() == *expected)
                .unwrap_or(false);
            if !matched {
                return false;
            }
        }

        if let Some(prefix) = &self.path_prefix {
            if !req.uri().path().starts_with(prefix.as_str()) {
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn route(host: Option<&str>, path_prefix: Option<&str>) -> RouteConfig {
        RouteConfig {
            id: "r1".to_string(),
            host: host.map(str::to_string),
            path_prefix: path_prefix.map(str::to_string),
            cluster_id: "c1".to_string(),
            priority: 0,
            transforms: Vec::new(),
            metadata: Default::default(),
        }
    }

    #[test]
    fn host_match_is_case_insensitive() {
        let matcher = RouteMatcher::compile(&route(Some("example.com"), None));

        let req = Request::builder()
            .header("Host", "EXAMPLE.COM")
            .body(Body::empty())
            .unwrap();
        assert!(matcher.matches(&req));

        let req = Request::builder()
            .header("Host", "other.com")
            .body(Body::empty())
            .unwrap();
        assert!(!matcher.matches(&req));
    }

    #[test]
    fn path_prefix_match() {
        let matcher = RouteMatcher::compile(&route(None, Some("/api")));

        let req = Request::builder()
            .uri("http://example.com/api/v1")
            .body(Body::empty())
            .unwrap();
        assert!(matcher.matches(&req));

        let req = Request::builder()
            .uri("http://example.com/images")
            .body(Body::empty())
            .unwrap();
        assert!(!matcher.matches(&req));
    }

    #[test]
    fn conditions_combine_with_and() {
        let matcher = RouteMatcher::compile(&route(Some("example.com"), Some("/api")));

        let req = Request::builder()
            .uri("http://example.com/api/v1")
            .header("Host", "example.com")
            .body(Body::empty())
            .unwrap();
        assert!(matcher.matches(&req));

        let req = Request::builder()
            .uri("http://example.com/other")
            .header("Host", "example.com")
            .body(Body::empty())
            .unwrap();
        assert!(!matcher.matches(&req));
    }

    #[test]
    fn wildcard_matches_everything() {
        let matcher = RouteMatcher::compile(&route(None, None));
        let req = Request::builder()
            .uri("http://anything/anywhere")
            .body(Body::empty())
            .unwrap();
        assert!(matcher.matches(&req));
    }
}
