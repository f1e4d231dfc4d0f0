//! latscale-api — REST API for the latency autoscaler.
//!
//! Workloads are written here and read by the controller; every write
//! enqueues the workload for an immediate pass.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/workloads` | List all workloads |
//! | POST | `/api/v1/workloads` | Create or replace a workload |
//! | GET | `/api/v1/workloads/:id` | Get workload details |
//! | DELETE | `/api/v1/workloads/:id` | Delete a workload and what it owns |
//! | GET | `/api/v1/workloads/:id/replicaset` | Get the owned replica set |
//! | GET | `/healthz` | Controller health |
//! | GET | `/metrics` | Prometheus exposition |
//!
//! `:id` is the url-encoded `namespace/name`, e.g. `default%2Fweb`.

pub mod handlers;
pub mod prometheus;

use axum::Router;
use axum::routing::get;
use latscale_controller::ControllerHandle;
use latscale_state::StateStore;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: StateStore,
    pub controller: ControllerHandle,
}

/// Build the complete API router (REST + health + metrics).
pub fn build_router(store: StateStore, controller: ControllerHandle) -> Router {
    let state = ApiState { store, controller };

    let api_routes = Router::new()
        .route(
            "/workloads",
            get(handlers::list_workloads).post(handlers::put_workload),
        )
        .route(
            "/workloads/{id}",
            get(handlers::get_workload).delete(handlers::delete_workload),
        )
        .route("/workloads/{id}/replicaset", get(handlers::get_replica_set))
        .with_state(state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/healthz", get(handlers::healthz))
        .route("/metrics", get(handlers::prometheus_metrics))
        .with_state(state)
}
