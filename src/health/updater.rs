//! The single writer of destination health values.
//!
//! Every health write goes through here so the owning cluster's dynamic
//! state is always recomputed before anything else observes the change.

use std::sync::Arc;
use std::time::Duration;

use crate::observability::metrics;
use crate::runtime::cluster::ClusterState;
use crate::runtime::destination::{DestinationHealth, DestinationState};

use super::policy::NewActiveHealth;

/// Applies health-value changes and triggers dynamic-state recomputation.
#[derive(Debug, Default)]
pub struct HealthUpdater;

impl HealthUpdater {
    pub fn new() -> Self {
        Self
    }

    /// Write a batch of active-health values, then recompute the cluster's
    /// dynamic state unconditionally, even when no value changed, so a
    /// destination-set change concurrent with probing is still picked up.
    pub fn set_active(&self, cluster: &ClusterState, new_health: Vec<NewActiveHealth>) {
        for change in &new_health {
            let destination = &change.destination;
            let before = destination.health().active();
            if before != change.health {
                tracing::info!(
                    cluster = %cluster.id(),
                    destination = %destination.id(),
                    from = ?before,
                    to = ?change.health,
                    "Active health changed"
                );
            }
            destination.health().set_active(change.health);
            metrics::record_destination_health(cluster.id(), destination.id(), change.health);
        }

        cluster.update_dynamic_state();
        metrics::record_available_destinations(
            cluster.id(),
            cluster.dynamic_state().available.len(),
        );
    }

    /// Write one destination's passive health and recompute dynamic state.
    ///
    /// An Unhealthy value schedules automatic reversion to Unknown after
    /// `reactivation_period`, measured from this transition. A newer passive
    /// write invalidates the pending reversion via the generation counter.
    pub fn set_passive(
        &self,
        cluster: &Arc<ClusterState>,
        destination: &Arc<DestinationState>,
        new_health: DestinationHealth,
        reactivation_period: Duration,
    ) {
        let generation = destination.health().set_passive(new_health);
        tracing::debug!(
            cluster = %cluster.id(),
            destination = %destination.id(),
            health = ?new_health,
            "Passive health changed"
        );
        metrics::record_destination_health(cluster.id(), destination.id(), new_health);
        cluster.update_dynamic_state();

        if new_health == DestinationHealth::Unhealthy {
            let cluster = cluster.clone();
            let destination = destination.clone();
            tokio::spawn(async move {
                tokio::time::sleep(reactivation_period).await;
                if destination.health().passive_generation() == generation {
                    destination.health().set_passive(DestinationHealth::Unknown);
                    tracing::info!(
                        cluster = %cluster.id(),
                        destination = %destination.id(),
                        "Passive health reactivated"
                    );
                    cluster.update_dynamic_state();
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClusterConfig, HealthCheckConfig};
    use crate::runtime::cluster::ClusterModel;

    fn cluster(active: bool, passive: bool) -> Arc<ClusterState> {
        let cluster = ClusterState::new("c1");
        let mut health_check = HealthCheckConfig::default();
        health_check.active.enabled = active;
        health_check.passive.enabled = passive;
        cluster.set_model(Arc::new(ClusterModel {
            config: Arc::new(ClusterConfig {
                id: "c1".to_string(),
                destinations: Vec::new(),
                health_check,
                metadata: Default::default(),
            }),
            active_policy: None,
        }));
        Arc::new(cluster)
    }

    #[test]
    fn set_active_recomputes_dynamic_state() {
        let cluster = cluster(true, false);
        let destination = cluster
            .destinations()
            .get_or_create("d1", |id| DestinationState::new(id));
        cluster.update_dynamic_state();
        assert_eq!(cluster.dynamic_state().available.len(), 1);

        let updater = HealthUpdater::new();
        updater.set_active(
            &cluster,
            vec![NewActiveHealth {
                destination: destination.clone(),
                health: DestinationHealth::Unhealthy,
            }],
        );

        assert!(cluster.dynamic_state().available.is_empty());
        assert_eq!(destination.health().active(), DestinationHealth::Unhealthy);
        // Passive track untouched.
        assert_eq!(destination.health().passive(), DestinationHealth::Unknown);
    }

    #[tokio::test(start_paused = true)]
    async fn passive_unhealthy_reactivates_after_period() {
        let cluster = cluster(false, true);
        let destination = cluster
            .destinations()
            .get_or_create("d1", |id| DestinationState::new(id));
        cluster.update_dynamic_state();

        let updater = HealthUpdater::new();
        updater.set_passive(
            &cluster,
            &destination,
            DestinationHealth::Unhealthy,
            Duration::from_secs(30),
        );

        assert!(cluster.dynamic_state().available.is_empty());

        tokio::time::sleep(Duration::from_secs(31)).await;
        tokio::task::yield_now().await;

        assert_eq!(destination.health().passive(), DestinationHealth::Unknown);
        assert_eq!(cluster.dynamic_state().available.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn newer_passive_write_cancels_pending_reactivation() {
        let cluster = cluster(false, true);
        let destination = cluster
            .destinations()
            .get_or_create("d1", |id| DestinationState::new(id));

        let updater = HealthUpdater::new();
        updater.set_passive(
            &cluster,
            &destination,
            DestinationHealth::Unhealthy,
            Duration::from_secs(10),
        );
        // A fresh Unhealthy signal before the timer fires restarts the clock.
        tokio::time::sleep(Duration::from_secs(5)).await;
        updater.set_passive(
            &cluster,
            &destination,
            DestinationHealth::Unhealthy,
            Duration::from_secs(10),
        );

        tokio::time::sleep(Duration::from_secs(6)).await;
        tokio::task::yield_now().await;
        // The first timer fired at t=10 but its generation is stale.
        assert_eq!(destination.health().passive(), DestinationHealth::Unhealthy);

        tokio::time::sleep(Duration::from_secs(5)).await;
        tokio::task::yield_now().await;
        assert_eq!(destination.health().passive(), DestinationHealth::Unknown);
    }
}
