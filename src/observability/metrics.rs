//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): proxied requests by method, status,
//!   destination
//! - `proxy_request_duration_seconds` (histogram): latency distribution
//! - `proxy_probes_total` (counter): active probes by cluster, destination,
//!   result
//! - `proxy_destination_health` (gauge): 0=unknown, 1=healthy, 2=unhealthy
//! - `proxy_available_destinations` (gauge): eligible destinations per
//!   cluster

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::runtime::destination::DestinationHealth;

/// Install the Prometheus recorder and start the scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint started"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one proxied request.
pub fn record_request(method: &str, status: u16, destination: &str, start: Instant) {
    metrics::counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "destination" => destination.to_string(),
    )
    .increment(1);
    metrics::histogram!(
        "proxy_request_duration_seconds",
        "method" => method.to_string(),
        "destination" => destination.to_string(),
    )
    .record(start.elapsed().as_secs_f64());
}

/// Record one active probe outcome.
pub fn record_probe(cluster: &str, destination: &str, healthy: bool) {
    metrics::counter!(
        "proxy_probes_total",
        "cluster" => cluster.to_string(),
        "destination" => destination.to_string(),
        "result" => if healthy { "success" } else { "failure" },
    )
    .increment(1);
}

/// Record a destination's current health value on one track.
pub fn record_destination_health(cluster: &str, destination: &str, health: DestinationHealth) {
    metrics::gauge!(
        "proxy_destination_health",
        "cluster" => cluster.to_string(),
        "destination" => destination.to_string(),
    )
    .set(health as u8 as f64);
}

/// Record the size of a cluster's eligible-destination snapshot.
pub fn record_available_destinations(cluster: &str, count: usize) {
    metrics::gauge!("proxy_available_destinations", "cluster" => cluster.to_string())
        .set(count as f64);
}
