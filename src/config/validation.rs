//! Configuration validation.
//!
//! Semantic checks on top of what serde already guarantees syntactically:
//! unique ids, referential integrity from routes to clusters, and sane
//! value ranges. All errors are collected and returned together rather
//! than failing on the first.

use std::collections::HashSet;

use thiserror::Error;

use crate::config::schema::ProxyConfig;

/// A single semantic configuration problem.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("duplicate route id `{0}`")]
    DuplicateRouteId(String),

    #[error("duplicate cluster id `{0}`")]
    DuplicateClusterId(String),

    #[error("duplicate destination id `{destination}` in cluster `{cluster}`")]
    DuplicateDestinationId { cluster: String, destination: String },

    #[error("route `{route}` references unknown cluster `{cluster}`")]
    UnknownCluster { route: String, cluster: String },

    #[error("destination `{destination}` in cluster `{cluster}` has an empty address")]
    EmptyDestinationAddress { cluster: String, destination: String },

    #[error("destination `{destination}` in cluster `{cluster}` has an unparseable address `{address}`")]
    InvalidDestinationAddress {
        cluster: String,
        destination: String,
        address: String,
    },

    #[error("cluster `{0}` has a zero active health-check interval")]
    ZeroProbeInterval(String),
}

/// Validate a parsed configuration. Pure function; returns every problem
/// found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let mut cluster_ids = HashSet::new();
    for cluster in &config.clusters {
        if !cluster_ids.insert(cluster.id.as_str()) {
            errors.push(ValidationError::DuplicateClusterId(cluster.id.clone()));
        }

        let mut destination_ids = HashSet::new();
        for destination in &cluster.destinations {
            if !destination_ids.insert(destination.id.as_str()) {
                errors.push(ValidationError::DuplicateDestinationId {
                    cluster: cluster.id.clone(),
                    destination: destination.id.clone(),
                });
            }
            if destination.address.is_empty() {
                errors.push(ValidationError::EmptyDestinationAddress {
                    cluster: cluster.id.clone(),
                    destination: destination.id.clone(),
                });
            } else if url::Url::parse(&destination.address).is_err() {
                errors.push(ValidationError::InvalidDestinationAddress {
                    cluster: cluster.id.clone(),
                    destination: destination.id.clone(),
                    address: destination.address.clone(),
                });
            }
        }

        if cluster.health_check.active.enabled && cluster.health_check.active.interval_secs == 0 {
            errors.push(ValidationError::ZeroProbeInterval(cluster.id.clone()));
        }
    }

    let mut route_ids = HashSet::new();
    for route in &config.routes {
        if !route_ids.insert(route.id.as_str()) {
            errors.push(ValidationError::DuplicateRouteId(route.id.clone()));
        }
        if !cluster_ids.contains(route.cluster_id.as_str()) {
            errors.push(ValidationError::UnknownCluster {
                route: route.id.clone(),
                cluster: route.cluster_id.clone(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
