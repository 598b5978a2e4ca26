//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy
//! control plane. All types derive Serde traits for deserialization from
//! config files, and `PartialEq` so the applier can detect unchanged
//! sections across reloads and skip rebuilding them.
//!
//! Config values are immutable snapshots: once loaded they are wrapped in
//! `Arc` and published by reference swap, never mutated in place.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Root configuration for the proxy.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, request timeout).
    pub listener: ListenerConfig,

    /// Route definitions binding inbound requests to clusters.
    pub routes: Vec<RouteConfig>,

    /// Cluster definitions: named groups of destinations.
    pub clusters: Vec<ClusterConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Total request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Route configuration: a matching rule binding inbound requests to a
/// cluster and a transform set.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Unique route identifier.
    pub id: String,

    /// Host header to match (exact, case-insensitive). None matches any host.
    pub host: Option<String>,

    /// Path prefix to match (case-sensitive). None matches any path.
    pub path_prefix: Option<String>,

    /// Id of the cluster this route forwards to.
    pub cluster_id: String,

    /// Route priority (higher = checked first).
    #[serde(default)]
    pub priority: u32,

    /// Transform entries applied to proxied requests/responses, in order.
    /// Each entry is a small string map whose keys select the transform kind,
    /// e.g. `{ PathPrefix = "/api" }` or
    /// `{ RequestHeader = "x-tenant", Set = "a" }`.
    #[serde(default)]
    pub transforms: Vec<HashMap<String, String>>,

    /// Free-form metadata for per-route policy overrides.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Cluster configuration: a named destination group plus health checking.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ClusterConfig {
    /// Unique cluster identifier.
    pub id: String,

    /// Destinations belonging to this cluster.
    #[serde(default)]
    pub destinations: Vec<DestinationConfig>,

    /// Health check settings for this cluster.
    #[serde(default)]
    pub health_check: HealthCheckConfig,

    /// Free-form metadata for per-cluster policy overrides
    /// (e.g. `consecutive_failures.threshold`).
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl ClusterConfig {
    /// Look up a metadata value by key.
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

/// A single backend endpoint within a cluster.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DestinationConfig {
    /// Unique destination identifier within its cluster.
    pub id: String,

    /// Address requests are forwarded to (e.g., "http://127.0.0.1:3000").
    pub address: String,

    /// Dedicated address for active health probes. Falls back to `address`
    /// joined with the cluster probe path when unset.
    #[serde(default)]
    pub health_address: Option<String>,

    /// Free-form metadata for per-destination overrides.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Health check configuration, split into the two independent tracks.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Active (synthetic probe) health checking.
    pub active: ActiveHealthCheckConfig,

    /// Passive (live traffic) health checking.
    pub passive: PassiveHealthCheckConfig,
}

/// Active health check settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ActiveHealthCheckConfig {
    /// Enable active probing for this cluster.
    pub enabled: bool,

    /// Probe interval in seconds.
    pub interval_secs: u64,

    /// Per-probe timeout in seconds. Timeouts count as failures.
    pub timeout_secs: u64,

    /// Path probed on each destination when it has no dedicated
    /// health address.
    pub path: String,

    /// Name of the health policy evaluating probe results.
    /// Unknown names are a configuration error at reload time.
    pub policy: String,
}

impl Default for ActiveHealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 10,
            timeout_secs: 5,
            path: "/health".to_string(),
            policy: "consecutive_failures".to_string(),
        }
    }
}

/// Passive health check settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PassiveHealthCheckConfig {
    /// Enable passive health signals from live traffic.
    pub enabled: bool,

    /// How long a passively-Unhealthy destination stays excluded before
    /// reverting to Unknown, in seconds.
    pub reactivation_period_secs: u64,
}

impl Default for PassiveHealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            reactivation_period_secs: 60,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
