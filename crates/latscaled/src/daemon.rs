//! Run mode — the controller and the REST API in one process.

use std::net::SocketAddr;
use std::path::PathBuf;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use latscale_controller::{Controller, ControllerSettings, Reconciler, ReconcilerSettings};
use latscale_core::{ConfigError, LatscaleConfig};
use latscale_probe::HttpLatencySampler;
use latscale_state::StateStore;

pub async fn run(config: LatscaleConfig, data_dir: PathBuf) -> anyhow::Result<()> {
    info!("latscale daemon starting");

    // The endpoint is re-resolved on every pass; failing here catches a
    // missing service before anything starts.
    let endpoint = config
        .probe
        .endpoint_source()
        .resolve()
        .map_err(|e| ConfigError::MissingEndpoint(e.to_string()))?;
    info!(%endpoint, "probe endpoint resolved");

    // ── Initialize subsystems ──────────────────────────────────

    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join("latscale.redb");
    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    let sampler = HttpLatencySampler::new(config.probe.timeout()?);
    let reconciler = Reconciler::new(
        store.clone(),
        store.clone(),
        sampler,
        ReconcilerSettings::from_config(&config)?,
    )?;
    info!(
        scale_up = config.thresholds.scale_up,
        scale_down = config.thresholds.scale_down,
        "reconciler initialized"
    );

    let controller = Controller::new(reconciler, ControllerSettings::from_config(&config)?);
    let handle = controller.handle();

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start controller ───────────────────────────────────────

    let controller_task = tokio::spawn(controller.run(shutdown_rx));

    // ── Start API server ───────────────────────────────────────

    let router = latscale_api::build_router(store, handle);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.api.port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    // Wait for the controller to drain.
    join_controller(controller_task).await;

    info!("latscale daemon stopped");
    Ok(())
}

/// Await the controller task, reporting a panic or cancellation. Returns
/// true if it exited cleanly.
async fn join_controller(task: JoinHandle<()>) -> bool {
    match task.await {
        Ok(()) => true,
        Err(e) => {
            error!(error = %e, panicked = e.is_panic(), "controller task failed");
            false
        }
    }
}
