//! Reconciles the runtime topology against a loaded configuration.
//!
//! Owns the top-level route and cluster registries. Everything fallible
//! (health-policy resolution, transformer building) happens before any
//! registry is touched, so a bad config aborts the reload and never leaves
//! the topology half-applied.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use thiserror::Error;

use crate::config::ProxyConfig;
use crate::health::policy::{default_policies, HealthPolicy};
use crate::routing::RouteMatcher;
use crate::runtime::cluster::{ClusterModel, ClusterState};
use crate::runtime::destination::DestinationState;
use crate::runtime::registry::ItemRegistry;
use crate::runtime::route::{RouteModel, RouteState};
use crate::runtime::{ClusterRegistry, RouteRegistry};
use crate::transform::builder::{build_transformer, TransformBuildError};
use crate::transform::Transformer;

/// Configuration problems only detectable while resolving runtime pieces.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("cluster `{cluster}` references unknown health policy `{policy}`")]
    UnknownHealthPolicy { cluster: String, policy: String },

    #[error("route `{route}` has an invalid transform: {source}")]
    InvalidTransform {
        route: String,
        #[source]
        source: TransformBuildError,
    },
}

/// Applies config snapshots to the route/cluster/destination registries and
/// publishes the ordered route table read by the request path.
pub struct ConfigApplier {
    routes: Arc<RouteRegistry>,
    clusters: Arc<ClusterRegistry>,
    route_table: Arc<ArcSwap<Vec<Arc<RouteState>>>>,
    policies: HashMap<String, Arc<dyn HealthPolicy>>,
}

impl Default for ConfigApplier {
    fn default() -> Self {
        Self::new(default_policies())
    }
}

impl ConfigApplier {
    pub fn new(policies: HashMap<String, Arc<dyn HealthPolicy>>) -> Self {
        Self {
            routes: Arc::new(ItemRegistry::new()),
            clusters: Arc::new(ItemRegistry::new()),
            route_table: Arc::new(ArcSwap::from_pointee(Vec::new())),
            policies,
        }
    }

    pub fn routes(&self) -> Arc<RouteRegistry> {
        self.routes.clone()
    }

    pub fn clusters(&self) -> Arc<ClusterRegistry> {
        self.clusters.clone()
    }

    /// The published route table, ordered by priority (highest first).
    pub fn route_table(&self) -> Arc<ArcSwap<Vec<Arc<RouteState>>>> {
        self.route_table.clone()
    }

    /// Reconcile the registries against `config`.
    ///
    /// Unchanged entities (by value comparison with the currently installed
    /// snapshot) are skipped; new ones are created; ones absent from the
    /// config are pruned. Dynamic state is recomputed for every cluster
    /// whose config or destination set changed.
    pub fn apply(&self, config: &ProxyConfig) -> Result<(), ApplyError> {
        let mut cluster_policies = HashMap::new();
        for cluster_config in &config.clusters {
            let active = &cluster_config.health_check.active;
            if active.enabled {
                let policy = self.policies.get(&active.policy).cloned().ok_or_else(|| {
                    ApplyError::UnknownHealthPolicy {
                        cluster: cluster_config.id.clone(),
                        policy: active.policy.clone(),
                    }
                })?;
                cluster_policies.insert(cluster_config.id.clone(), policy);
            }
        }

        let mut transformers = HashMap::new();
        for route_config in &config.routes {
            let transformer =
                build_transformer(&route_config.transforms).map_err(|source| {
                    ApplyError::InvalidTransform {
                        route: route_config.id.clone(),
                        source,
                    }
                })?;
            transformers.insert(route_config.id.clone(), Arc::new(transformer));
        }

        self.apply_clusters(config, &mut cluster_policies);
        self.apply_routes(config, &mut transformers);

        tracing::info!(
            routes = config.routes.len(),
            clusters = config.clusters.len(),
            "Configuration applied"
        );
        Ok(())
    }

    fn apply_clusters(
        &self,
        config: &ProxyConfig,
        cluster_policies: &mut HashMap<String, Arc<dyn HealthPolicy>>,
    ) {
        for cluster_config in &config.clusters {
            let cluster = self
                .clusters
                .get_or_create(&cluster_config.id, |id| ClusterState::new(id));

            let unchanged = cluster
                .config()
                .map(|current| *current == *cluster_config)
                .unwrap_or(false);
            let mut changed = !unchanged;
            if changed {
                cluster.set_model(Arc::new(ClusterModel {
                    config: Arc::new(cluster_config.clone()),
                    active_policy: cluster_policies.remove(&cluster_config.id),
                }));
            }

            for destination_config in &cluster_config.destinations {
                let destination = cluster
                    .destinations()
                    .get_or_create(&destination_config.id, |id| DestinationState::new(id));
                let same = destination
                    .config()
                    .map(|current| *current == *destination_config)
                    .unwrap_or(false);
                if !same {
                    destination.set_config(Arc::new(destination_config.clone()));
                    changed = true;
                }
            }

            for id in cluster.destinations().ids() {
                if !cluster_config.destinations.iter().any(|d| d.id == id) {
                    cluster.destinations().try_remove(&id);
                    tracing::info!(
                        cluster = %cluster_config.id,
                        destination = %id,
                        "Destination removed"
                    );
                    changed = true;
                }
            }

            if changed {
                cluster.update_dynamic_state();
            }
        }

        for id in self.clusters.ids() {
            if !config.clusters.iter().any(|c| c.id == id) {
                self.clusters.try_remove(&id);
                tracing::info!(cluster = %id, "Cluster removed");
            }
        }
    }

    fn apply_routes(
        &self,
        config: &ProxyConfig,
        transformers: &mut HashMap<String, Arc<Transformer>>,
    ) {
        for route_config in &config.routes {
            let route = self.routes.get_or_create(&route_config.id, |id| RouteState::new(id));

            // The cluster back-reference is re-resolved on every apply so a
            // removed-and-readded cluster never leaves a dangling pointer.
            let cluster = self.clusters.try_get(&route_config.cluster_id);
            if cluster.is_none() {
                tracing::warn!(
                    route = %route_config.id,
                    cluster = %route_config.cluster_id,
                    "Route references a missing cluster"
                );
            }

            let unchanged = route
                .model()
                .map(|model| {
                    *model.config == *route_config
                        && match (&model.cluster, &cluster) {
                            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                            (None, None) => true,
                            _ => false,
                        }
                })
                .unwrap_or(false);
            if unchanged {
                continue;
            }

            let transformer = transformers
                .remove(&route_config.id)
                .unwrap_or_else(|| Arc::new(Transformer::default()));
            route.set_model(Arc::new(RouteModel {
                config: Arc::new(route_config.clone()),
                matcher: RouteMatcher::compile(route_config),
                cluster,
                transformer,
            }));
        }

        for id in self.routes.ids() {
            if !config.routes.iter().any(|r| r.id == id) {
                self.routes.try_remove(&id);
                tracing::info!(route = %id, "Route removed");
            }
        }

        let mut table: Vec<Arc<RouteState>> = self
            .routes
            .get_all()
            .into_iter()
            .filter(|r| r.model().is_some())
            .collect();
        table.sort_by(|a, b| {
            let pa = a.model().map(|m| m.config.priority).unwrap_or(0);
            let pb = b.model().map(|m| m.config.priority).unwrap_or(0);
            pb.cmp(&pa).then_with(|| a.id().cmp(b.id()))
        });
        self.route_table.store(Arc::new(table));
    }
}
