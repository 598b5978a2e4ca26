//! Per-route runtime state.

use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::config::RouteConfig;
use crate::routing::RouteMatcher;
use crate::runtime::cluster::ClusterState;
use crate::transform::Transformer;

/// Immutable per-route model published as one snapshot: the config, the
/// matcher compiled from it, the transformer built from its transform
/// entries, and the target cluster resolved by id.
///
/// The cluster reference is a back-reference re-resolved on every config
/// apply, not an ownership edge; a route whose cluster was removed keeps a
/// `None` here until a later apply restores it.
pub struct RouteModel {
    pub config: Arc<RouteConfig>,
    pub matcher: RouteMatcher,
    pub cluster: Option<Arc<ClusterState>>,
    pub transformer: Arc<Transformer>,
}

impl std::fmt::Debug for RouteModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteModel")
            .field("config", &self.config)
            .field("cluster", &self.cluster.as_ref().map(|c| c.id().to_string()))
            .finish()
    }
}

/// Runtime wrapper around an immutable route config snapshot.
#[derive(Debug)]
pub struct RouteState {
    id: String,
    model: ArcSwapOption<RouteModel>,
}

impl RouteState {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            model: ArcSwapOption::empty(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current model snapshot. `None` only before the first config apply.
    pub fn model(&self) -> Option<Arc<RouteModel>> {
        self.model.load_full()
    }

    /// Install a new model snapshot by reference swap.
    pub fn set_model(&self, model: Arc<RouteModel>) {
        self.model.store(Some(model));
    }
}
