//! Pluggable health policies evaluating probe results.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use dashmap::DashMap;
use thiserror::Error;

use crate::runtime::cluster::ClusterState;
use crate::runtime::destination::{DestinationHealth, DestinationState};

/// Failure to obtain a probe response from one destination. Never propagates
/// upward; always converted into a failure outcome for that destination only.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("destination has no config installed")]
    Unconfigured,

    #[error("probe target could not be built: {0}")]
    InvalidTarget(String),

    #[error("probe transport error: {0}")]
    Transport(String),

    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
}

/// The outcome of probing one destination once.
#[derive(Debug)]
pub enum ProbeOutcome {
    /// A response arrived; the policy decides what its status means.
    Response(StatusCode),
    /// No usable response.
    Failed(ProbeError),
}

/// One destination's result from a completed probe round. Ephemeral:
/// consumed by a single policy call, not retained.
#[derive(Debug)]
pub struct ProbingResult {
    pub destination: Arc<DestinationState>,
    pub outcome: ProbeOutcome,
}

/// A policy's verdict for one destination.
#[derive(Debug)]
pub struct NewActiveHealth {
    pub destination: Arc<DestinationState>,
    pub health: DestinationHealth,
}

/// Evaluates a cluster's aggregated probe results into new active-health
/// values. Selected by name from cluster config at apply time; unknown
/// names are a configuration error at reload, not at probe time.
#[async_trait]
pub trait HealthPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Compute new active-health values for a batch of probing results.
    ///
    /// Pure with respect to destination state: returns the desired values
    /// without writing them. An empty batch yields an empty verdict and
    /// leaves any internal bookkeeping untouched.
    async fn evaluate(
        &self,
        cluster: &ClusterState,
        results: &[ProbingResult],
    ) -> Vec<NewActiveHealth>;
}

/// The policy table resolved at config-apply time.
pub fn default_policies() -> HashMap<String, Arc<dyn HealthPolicy>> {
    let mut policies: HashMap<String, Arc<dyn HealthPolicy>> = HashMap::new();
    let consecutive = Arc::new(ConsecutiveFailuresHealthPolicy::new(
        DEFAULT_CONSECUTIVE_FAILURES_THRESHOLD,
    ));
    policies.insert(consecutive.name().to_string(), consecutive);
    policies
}

/// Cluster metadata key overriding the policy-wide failure threshold.
pub const THRESHOLD_METADATA_KEY: &str = "consecutive_failures.threshold";

/// Default number of consecutive failures before a destination is marked
/// Unhealthy.
pub const DEFAULT_CONSECUTIVE_FAILURES_THRESHOLD: u32 = 2;

struct FailureCounter {
    destination: Weak<DestinationState>,
    consecutive: u32,
}

/// Marks a destination Unhealthy after N consecutive failed probes and
/// Healthy on the first success.
///
/// Counters are process-wide, keyed by destination identity, and survive
/// across probe rounds; entries for dropped destinations are pruned lazily.
pub struct ConsecutiveFailuresHealthPolicy {
    default_threshold: u32,
    counters: DashMap<usize, FailureCounter>,
}

impl ConsecutiveFailuresHealthPolicy {
    pub fn new(default_threshold: u32) -> Self {
        Self {
            default_threshold,
            counters: DashMap::new(),
        }
    }

    /// Per-cluster metadata override when present and parseable, else the
    /// policy default. Malformed metadata never fails a reload.
    fn threshold_for(&self, cluster: &ClusterState) -> u32 {
        let Some(config) = cluster.config() else {
            return self.default_threshold;
        };
        match config.metadata_value(THRESHOLD_METADATA_KEY) {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::debug!(
                    cluster = %cluster.id(),
                    value = %raw,
                    "Malformed threshold metadata, using policy default"
                );
                self.default_threshold
            }),
            None => self.default_threshold,
        }
    }

    fn record_failure(&self, destination: &Arc<DestinationState>) -> u32 {
        let key = Arc::as_ptr(destination) as usize;
        let mut entry = self.counters.entry(key).or_insert_with(|| FailureCounter {
            destination: Arc::downgrade(destination),
            consecutive: 0,
        });
        entry.consecutive = entry.consecutive.saturating_add(1);
        entry.consecutive
    }

    fn reset(&self, destination: &Arc<DestinationState>) {
        self.counters.remove(&(Arc::as_ptr(destination) as usize));
    }

    fn prune_dead(&self) {
        self.counters
            .retain(|_, counter| counter.destination.strong_count() > 0);
    }
}

#[async_trait]
impl HealthPolicy for ConsecutiveFailuresHealthPolicy {
    fn name(&self) -> &'static str {
        "consecutive_failures"
    }

    async fn evaluate(
        &self,
        cluster: &ClusterState,
        results: &[ProbingResult],
    ) -> Vec<NewActiveHealth> {
        if results.is_empty() {
            return Vec::new();
        }

        self.prune_dead();
        let threshold = self.threshold_for(cluster);

        results
            .iter()
            .map(|result| {
                let health = match &result.outcome {
                    ProbeOutcome::Response(status) if status.is_success() => {
                        self.reset(&result.destination);
                        DestinationHealth::Healthy
                    }
                    _ => {
                        let failures = self.record_failure(&result.destination);
                        if failures >= threshold {
                            DestinationHealth::Unhealthy
                        } else {
                            DestinationHealth::Healthy
                        }
                    }
                };
                NewActiveHealth {
                    destination: result.destination.clone(),
                    health,
                }
            })
            .collect()
    }
}
