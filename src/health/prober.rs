//! Active health probing driver.
//!
//! Periodically probes every destination of each actively-checked cluster,
//! aggregates exactly one result batch per cluster per round, and feeds the
//! batch through the cluster's resolved policy into the health updater.
//!
//! A failure while probing one destination is captured as that destination's
//! outcome and never aborts the rest of the round.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use futures_util::future::join_all;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use tokio::sync::broadcast;
use tokio::time::{self, Instant};

use crate::health::policy::{ProbeError, ProbeOutcome, ProbingResult};
use crate::health::updater::HealthUpdater;
use crate::observability::metrics;
use crate::runtime::cluster::ClusterState;
use crate::runtime::destination::DestinationState;
use crate::runtime::ClusterRegistry;

/// How often the prober wakes up to check which clusters are due.
const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Drives active health probing over the cluster registry.
pub struct HealthProber {
    clusters: Arc<ClusterRegistry>,
    updater: Arc<HealthUpdater>,
    client: Client<HttpConnector, Body>,
}

impl HealthProber {
    pub fn new(clusters: Arc<ClusterRegistry>, updater: Arc<HealthUpdater>) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            clusters,
            updater,
            client,
        }
    }

    /// Run probe rounds until the shutdown signal fires. Each cluster is
    /// probed on its own configured interval.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!("Health prober starting");
        let mut ticker = time::interval(TICK_INTERVAL);
        let mut last_round: HashMap<String, Instant> = HashMap::new();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.probe_due_clusters(&mut last_round).await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health prober received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    async fn probe_due_clusters(&self, last_round: &mut HashMap<String, Instant>) {
        let now = Instant::now();
        let clusters = self.clusters.get_all();
        last_round.retain(|id, _| clusters.iter().any(|c| c.id() == id));

        for cluster in clusters {
            let Some(model) = cluster.model() else { continue };
            let active = &model.config.health_check.active;
            if !active.enabled {
                continue;
            }

            let interval = Duration::from_secs(active.interval_secs);
            let due = last_round
                .get(cluster.id())
                .map(|last| now.duration_since(*last) >= interval)
                .unwrap_or(true);
            if !due {
                continue;
            }
            last_round.insert(cluster.id().to_string(), now);

            self.probe_cluster(&cluster).await;
        }
    }

    /// Probe every destination of one cluster and apply the policy verdict.
    pub async fn probe_cluster(&self, cluster: &Arc<ClusterState>) {
        let Some(model) = cluster.model() else { return };
        let Some(policy) = model.active_policy.clone() else {
            tracing::warn!(cluster = %cluster.id(), "Active checking enabled but no policy resolved");
            return;
        };
        let active = &model.config.health_check.active;
        let timeout = Duration::from_secs(active.timeout_secs);

        let destinations = cluster.destinations().get_all();
        if destinations.is_empty() {
            return;
        }

        let probes = destinations
            .into_iter()
            .map(|destination| self.probe_destination(destination, &active.path, timeout));
        let results: Vec<ProbingResult> = join_all(probes).await;

        for result in &results {
            let healthy = matches!(&result.outcome, ProbeOutcome::Response(s) if s.is_success());
            metrics::record_probe(cluster.id(), result.destination.id(), healthy);
            if let ProbeOutcome::Failed(error) = &result.outcome {
                tracing::warn!(
                    cluster = %cluster.id(),
                    destination = %result.destination.id(),
                    error = %error,
                    "Probe failed"
                );
            }
        }

        let new_health = policy.evaluate(cluster, &results).await;
        if !new_health.is_empty() {
            self.updater.set_active(cluster, new_health);
        }
    }

    async fn probe_destination(
        &self,
        destination: Arc<DestinationState>,
        probe_path: &str,
        timeout: Duration,
    ) -> ProbingResult {
        let outcome = match self.send_probe(&destination, probe_path, timeout).await {
            Ok(status) => ProbeOutcome::Response(status),
            Err(error) => ProbeOutcome::Failed(error),
        };
        ProbingResult {
            destination,
            outcome,
        }
    }

    async fn send_probe(
        &self,
        destination: &DestinationState,
        probe_path: &str,
        timeout: Duration,
    ) -> Result<axum::http::StatusCode, ProbeError> {
        let config = destination.config().ok_or(ProbeError::Unconfigured)?;
        let target = match &config.health_address {
            Some(address) => address.clone(),
            None => {
                let base = config.address.strip_suffix('/').unwrap_or(&config.address);
                if probe_path.starts_with('/') {
                    format!("{base}{probe_path}")
                } else {
                    format!("{base}/{probe_path}")
                }
            }
        };

        let request = Request::builder()
            .method("GET")
            .uri(&target)
            .header("user-agent", "gateward-health-probe")
            .body(Body::empty())
            .map_err(|e| ProbeError::InvalidTarget(e.to_string()))?;

        match time::timeout(timeout, self.client.request(request)).await {
            Ok(Ok(response)) => Ok(response.status()),
            Ok(Err(e)) => Err(ProbeError::Transport(e.to_string())),
            Err(_) => Err(ProbeError::Timeout(timeout)),
        }
    }
}
