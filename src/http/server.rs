//! HTTP hosting shell around the control-plane core.
//!
//! # Responsibilities
//! - Build the axum router with a catch-all proxy handler
//! - Wire up middleware (tracing, timeout, request id)
//! - Match the published route table, read dynamic state, pick a
//!   destination, run the transform pipeline around the forwarder call
//! - Feed passive health signals back from upstream failures

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{MakeRequestUuid, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ListenerConfig;
use crate::error::ProxyError;
use crate::health::updater::HealthUpdater;
use crate::http::forwarder::{Forwarder, HttpForwarder};
use crate::load_balancer::{DestinationSelector, RoundRobin};
use crate::observability::metrics;
use crate::runtime::applier::ConfigApplier;
use crate::runtime::cluster::ClusterState;
use crate::runtime::destination::{DestinationHealth, DestinationState};
use crate::runtime::route::RouteState;
use crate::transform::context::{ClientResponse, OutboundRequest, OutgoingTrailers};
use crate::transform::make_destination_address;

/// Application state injected into the proxy handler.
#[derive(Clone)]
pub struct AppState {
    route_table: Arc<ArcSwap<Vec<Arc<RouteState>>>>,
    selector: Arc<dyn DestinationSelector>,
    forwarder: Arc<dyn Forwarder>,
    updater: Arc<HealthUpdater>,
}

/// HTTP server for the proxy.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a server over an applied topology.
    pub fn new(
        applier: &ConfigApplier,
        updater: Arc<HealthUpdater>,
        listener: &ListenerConfig,
    ) -> Self {
        let state = AppState {
            route_table: applier.route_table(),
            selector: Arc::new(RoundRobin::new()),
            forwarder: Arc::new(HttpForwarder::new()),
            updater,
        };
        Self {
            router: Self::build_router(listener, state),
        }
    }

    fn build_router(listener: &ListenerConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(
                listener.request_timeout_secs,
            )))
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server until the shutdown signal fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Main proxy handler: route lookup, destination selection, transform
/// pipeline around the forwarder call.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    match proxy_request(&state, request, start).await {
        Ok(response) => response,
        Err(error) => {
            match &error {
                ProxyError::NoRouteMatched => {
                    tracing::warn!(method = %method, path = %path, "No route matched")
                }
                ProxyError::NoAvailableDestination(cluster) => {
                    tracing::warn!(cluster = %cluster, path = %path, "No available destination")
                }
                _ => tracing::error!(error = %error, path = %path, "Proxying failed"),
            }
            let status = error.status();
            metrics::record_request(&method, status.as_u16(), "none", start);
            (status, error.to_string()).into_response()
        }
    }
}

async fn proxy_request(
    state: &AppState,
    request: Request<Body>,
    start: Instant,
) -> Result<Response, ProxyError> {
    // Route lookup over the published table, highest priority first.
    let table = state.route_table.load();
    let (route, model) = table
        .iter()
        .find_map(|route| {
            let model = route.model()?;
            model.matcher.matches(&request).then_some((route.clone(), model))
        })
        .ok_or(ProxyError::NoRouteMatched)?;

    let cluster = model
        .cluster
        .clone()
        .ok_or_else(|| ProxyError::NoCluster(route.id().to_string()))?;

    // Some consistent past snapshot of eligible destinations; eventual
    // consistency with in-flight health updates is acceptable here.
    let dynamic = cluster.dynamic_state();
    let destination = state
        .selector
        .pick(&dynamic.available)
        .ok_or_else(|| ProxyError::NoAvailableDestination(cluster.id().to_string()))?;
    let destination_config = destination
        .config()
        .ok_or_else(|| ProxyError::NoAvailableDestination(cluster.id().to_string()))?;

    // Request stage.
    let (parts, body) = request.into_parts();
    let mut outbound = OutboundRequest::new(parts.method.clone(), body);
    model
        .transformer
        .transform_request(&parts, &mut outbound, &destination_config.address)
        .await?;
    if outbound.uri.is_none() {
        outbound.uri = Some(make_destination_address(
            &destination_config.address,
            parts.uri.path(),
            parts.uri.query().unwrap_or(""),
        )?);
    }

    // The proxy call itself.
    let (upstream, upstream_body) = match state.forwarder.send(outbound).await {
        Ok(result) => result,
        Err(error) => {
            signal_passive_failure(state, &cluster, &destination);
            return Err(error);
        }
    };

    if matches!(
        upstream.status,
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
    ) {
        signal_passive_failure(state, &cluster, &destination);
    }

    // Response and trailer stages. The axum response body cannot carry
    // outgoing trailers, so the trailer stage sees Unsupported and skips.
    let mut client = ClientResponse::new(upstream.status, OutgoingTrailers::Unsupported);
    model.transformer.transform_response(&upstream, &mut client).await?;
    model
        .transformer
        .transform_response_trailers(&upstream, &mut client)
        .await?;

    metrics::record_request(
        parts.method.as_str(),
        client.status.as_u16(),
        destination.id(),
        start,
    );

    let mut response = Response::new(upstream_body);
    *response.status_mut() = client.status;
    *response.headers_mut() = client.headers;
    Ok(response)
}

/// Circuit-breaker style passive health signal from live traffic.
fn signal_passive_failure(
    state: &AppState,
    cluster: &Arc<ClusterState>,
    destination: &Arc<DestinationState>,
) {
    let Some(model) = cluster.model() else { return };
    let passive = &model.config.health_check.passive;
    if !passive.enabled {
        return;
    }

    state.updater.set_passive(
        cluster,
        destination,
        DestinationHealth::Unhealthy,
        Duration::from_secs(passive.reactivation_period_secs),
    );
}
