use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gateward::config::watcher::ConfigWatcher;
use gateward::config::{load_config, ProxyConfig};
use gateward::health::{HealthProber, HealthUpdater};
use gateward::lifecycle::{ctrl_c, Shutdown};
use gateward::observability::metrics;
use gateward::{ConfigApplier, HttpServer};

#[derive(Parser)]
#[command(name = "gateward", about = "Reverse proxy control plane")]
struct Cli {
    /// Path to the configuration file (TOML or JSON).
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gateward=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("gateward v0.1.0 starting");

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    tracing::info!(
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        clusters = config.clusters.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // Build and apply the topology.
    let applier = Arc::new(ConfigApplier::default());
    applier.apply(&config)?;

    let updater = Arc::new(HealthUpdater::new());
    let shutdown = Shutdown::new();

    // Config hot reload.
    let _watcher_handle = match &cli.config {
        Some(path) => {
            let (watcher, mut updates) = ConfigWatcher::new(path);
            let handle = watcher.run()?;
            let reload_applier = applier.clone();
            tokio::spawn(async move {
                while let Some(new_config) = updates.recv().await {
                    if let Err(e) = reload_applier.apply(&new_config) {
                        tracing::error!(error = %e, "Reload rejected, keeping current topology");
                    }
                }
            });
            Some(handle)
        }
        None => None,
    };

    // Active health probing.
    let prober = HealthProber::new(applier.clusters(), updater.clone());
    tokio::spawn(prober.run(shutdown.subscribe()));

    // Serve until Ctrl+C.
    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = HttpServer::new(&applier, updater, &config.listener);
    let server_shutdown = shutdown.subscribe();
    let server_task = tokio::spawn(server.run(listener, server_shutdown));

    ctrl_c().await;
    shutdown.trigger();
    server_task.await??;

    tracing::info!("Shutdown complete");
    Ok(())
}
