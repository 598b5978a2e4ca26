//! Per-cluster runtime state and the derived available-destination view.

use std::sync::Arc;

use arc_swap::{ArcSwap, ArcSwapOption};

use crate::config::ClusterConfig;
use crate::health::policy::HealthPolicy;
use crate::runtime::destination::{DestinationHealth, DestinationState};
use crate::runtime::registry::ItemRegistry;

/// Immutable per-cluster model published as one snapshot: the config plus
/// the health policy resolved from it at apply time. Swapped atomically so
/// the prober never observes a config/policy mismatch.
pub struct ClusterModel {
    pub config: Arc<ClusterConfig>,
    pub active_policy: Option<Arc<dyn HealthPolicy>>,
}

impl std::fmt::Debug for ClusterModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterModel")
            .field("config", &self.config)
            .field(
                "active_policy",
                &self.active_policy.as_ref().map(|p| p.name()),
            )
            .finish()
    }
}

/// Derived snapshot of the destinations currently eligible for selection.
///
/// Always recomputed eagerly after health or config writes; the request path
/// only ever loads a complete snapshot.
#[derive(Debug, Default)]
pub struct DynamicClusterState {
    pub available: Vec<Arc<DestinationState>>,
}

/// Runtime wrapper around an immutable cluster config snapshot, owning the
/// destination registry and the derived dynamic state.
#[derive(Debug)]
pub struct ClusterState {
    id: String,
    model: ArcSwapOption<ClusterModel>,
    destinations: ItemRegistry<DestinationState>,
    dynamic: ArcSwap<DynamicClusterState>,
}

impl ClusterState {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            model: ArcSwapOption::empty(),
            destinations: ItemRegistry::new(),
            dynamic: ArcSwap::from_pointee(DynamicClusterState::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current model snapshot. `None` only before the first config apply.
    pub fn model(&self) -> Option<Arc<ClusterModel>> {
        self.model.load_full()
    }

    pub fn config(&self) -> Option<Arc<ClusterConfig>> {
        self.model.load().as_ref().map(|m| m.config.clone())
    }

    /// Install a new model snapshot by reference swap.
    pub fn set_model(&self, model: Arc<ClusterModel>) {
        self.model.store(Some(model));
    }

    pub fn destinations(&self) -> &ItemRegistry<DestinationState> {
        &self.destinations
    }

    /// The currently published available-destination snapshot.
    pub fn dynamic_state(&self) -> Arc<DynamicClusterState> {
        self.dynamic.load_full()
    }

    /// Recompute and publish the available-destination snapshot from the
    /// current registry and health values.
    ///
    /// A destination is eligible unless it is Unhealthy on an enabled track;
    /// a disabled track never excludes. Safe to call concurrently with
    /// itself: each call publishes a self-consistent snapshot, last writer
    /// wins.
    pub fn update_dynamic_state(&self) {
        let model = self.model.load();
        let (active_enabled, passive_enabled) = match model.as_ref() {
            Some(m) => (
                m.config.health_check.active.enabled,
                m.config.health_check.passive.enabled,
            ),
            None => (false, false),
        };

        let available = self
            .destinations
            .get_all()
            .into_iter()
            .filter(|d| {
                let health = d.health();
                (!active_enabled || health.active() != DestinationHealth::Unhealthy)
                    && (!passive_enabled || health.passive() != DestinationHealth::Unhealthy)
            })
            .collect();

        self.dynamic.store(Arc::new(DynamicClusterState { available }));
    }
}
