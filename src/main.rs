mod auth;
mod config;
mod domain;
mod dto;
mod error;
mod locust;
mod orchestrator;
mod routes;
mod script;
mod server;
mod state;
mod store;
mod watchdog;

use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};

use config::{CliArgs, Config, SERVER_SHUTDOWN_GRACE_SECS};
use orchestrator::Orchestrator;
use state::{AppState, SharedState};
use store::{
    InMemoryLoadTestRunStore, InMemoryLoadTestStore, InMemoryMetricsStore,
    InMemoryScriptRevisionStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "locust_controlplane=info,tower_http=info".into()),
        )
        .init();

    let args = CliArgs::parse();
    info!(
        "Starting locust-controlplane v{}",
        env!("CARGO_PKG_VERSION")
    );
    info!("Loading configuration from {:?}", args.config);

    let config = Arc::new(Config::load_from_file(&args.config)?);
    info!(
        "Configured {} Locust cluster(s), metrics mode {:?}",
        config.locust_clusters.len(),
        config.orchestrator.metrics_mode
    );

    let tests = Arc::new(InMemoryLoadTestStore::new());
    let revisions = Arc::new(InMemoryScriptRevisionStore::new());
    let runs = Arc::new(InMemoryLoadTestRunStore::new());
    let metrics = Arc::new(InMemoryMetricsStore::new());

    let clients = Orchestrator::clients_from_config(&config);
    let orchestrator = Arc::new(Orchestrator::new(
        config.clone(),
        tests.clone(),
        revisions.clone(),
        runs.clone(),
        metrics.clone(),
        clients,
    ));

    let state: SharedState = Arc::new(AppState::new(
        config.clone(),
        tests,
        revisions,
        runs,
        metrics,
        orchestrator,
    ));

    let watchdog_handle = watchdog::spawn_watchdog(state.clone());

    let router = server::build_router(state.clone());
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Control plane listening on http://{}", bind_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await?;

    info!("Server stopped, waiting for background tasks");
    if tokio::time::timeout(
        std::time::Duration::from_secs(SERVER_SHUTDOWN_GRACE_SECS),
        watchdog_handle,
    )
    .await
    .is_err()
    {
        warn!("Watchdog did not stop within the shutdown grace period");
    }

    info!("Control plane exited");
    Ok(())
}

async fn shutdown_signal(state: SharedState) {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Received shutdown signal");
    state.signal_shutdown();
}
