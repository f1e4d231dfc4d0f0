//! REST API handlers.
//!
//! Each handler reads/writes via `StateStore` and returns JSON responses.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use latscale_controller::WorkloadHealth;
use latscale_core::{Workload, WorkloadId, WorkloadSpec};

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

fn parse_id(raw: &str) -> Result<WorkloadId, axum::response::Response> {
    WorkloadId::parse(raw).ok_or_else(|| {
        error_response(
            &format!("invalid workload id {raw:?}, expected namespace/name"),
            StatusCode::BAD_REQUEST,
        )
        .into_response()
    })
}

// ── Workloads ──────────────────────────────────────────────────

/// Body of `POST /api/v1/workloads`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadRequest {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub name: String,
    pub spec: WorkloadSpec,
}

fn default_namespace() -> String {
    "default".to_string()
}

/// GET /api/v1/workloads
pub async fn list_workloads(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.list_workloads() {
        Ok(workloads) => ApiResponse::ok(workloads).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// GET /api/v1/workloads/:id
pub async fn get_workload(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.store.get_workload(&id.table_key()) {
        Ok(Some(workload)) => ApiResponse::ok(workload).into_response(),
        Ok(None) => error_response("workload not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// POST /api/v1/workloads
///
/// Replacing an existing workload keeps its uid and status.
pub async fn put_workload(
    State(state): State<ApiState>,
    Json(req): Json<WorkloadRequest>,
) -> impl IntoResponse {
    let raw = format!("{}/{}", req.namespace, req.name);
    let id = match parse_id(&raw) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let existed = matches!(state.store.get_workload(&id.table_key()), Ok(Some(_)));
    match state.store.put_workload(&Workload::new(id.clone(), req.spec.size)) {
        Ok(workload) => {
            info!(workload = %id, size = workload.spec.size, "workload stored");
            if !state.controller.enqueue(id.clone()) {
                warn!(workload = %id, "controller not running, workload not enqueued");
            }
            let status = if existed {
                StatusCode::OK
            } else {
                StatusCode::CREATED
            };
            (status, ApiResponse::ok(workload)).into_response()
        }
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// DELETE /api/v1/workloads/:id
pub async fn delete_workload(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.store.delete_workload(&id.table_key()) {
        Ok(true) => {
            info!(workload = %id, "workload deleted");
            state.controller.health().forget(&id).await;
            ApiResponse::ok("deleted").into_response()
        }
        Ok(false) => error_response("workload not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Replica sets ───────────────────────────────────────────────

/// GET /api/v1/workloads/:id/replicaset
pub async fn get_replica_set(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.store.get_replica_set(&id.table_key()) {
        Ok(Some(rs)) => ApiResponse::ok(rs).into_response(),
        Ok(None) => error_response("replica set not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Health ─────────────────────────────────────────────────────

#[derive(Serialize)]
struct HealthReport {
    healthy: bool,
    unhealthy_after: u32,
    failing: Vec<WorkloadHealth>,
}

/// GET /healthz
pub async fn healthz(State(state): State<ApiState>) -> impl IntoResponse {
    let health = state.controller.health();
    let report = HealthReport {
        healthy: health.is_healthy().await,
        unhealthy_after: health.unhealthy_after(),
        failing: health.snapshot().await,
    };

    if report.healthy {
        ApiResponse::ok(report).into_response()
    } else {
        debug!(failing = report.failing.len(), "health check failing");
        let error = format!(
            "{} workload(s) failed {} or more consecutive passes",
            report
                .failing
                .iter()
                .filter(|h| h.consecutive_failures >= report.unhealthy_after)
                .count(),
            report.unhealthy_after
        );
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse {
                success: false,
                data: Some(report),
                error: Some(error),
            }),
        )
            .into_response()
    }
}

// ── Prometheus ─────────────────────────────────────────────────

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let workloads = state.store.list_workloads().unwrap_or_default();
    let replica_sets = state.store.list_replica_sets().unwrap_or_default();
    let health = state.controller.health().snapshot().await;

    let body = crate::prometheus::render_prometheus(&workloads, &replica_sets, &health);
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
