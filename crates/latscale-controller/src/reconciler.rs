//! Reconciler — one pass of the latency control loop for one workload.
//!
//! ```text
//! FetchSpec ──not found──────────────────────────────→ Done (no requeue)
//!    │
//! FetchOrCreateReplicaSet ──created──────────────────→ Done (requeue now)
//!    │
//! SampleLatency ──error──────────────────────────────→ Error (status untouched)
//!    │
//! Decide ──ScaleUp/ScaleDown──→ ApplyAction ─────────→ Done (requeue 5s)
//!    │
//!    └──RecordStatusOnly──→ PersistStatus ───────────→ Done (no requeue)
//! ```
//!
//! The reconciler holds no locks. The driver guarantees that two passes
//! for the same workload never overlap.

use std::time::Duration;

use tracing::{debug, info};

use latscale_core::config::validate_thresholds;
use latscale_core::{
    ConfigError, EndpointSource, LatencySampler, LatscaleConfig, ReplicaSetGateway, Thresholds,
    Workload, WorkloadId, WorkloadStatus, WorkloadStore,
};

use crate::decision::{Action, ObservedReplicas, Requeue, decide, needs_pod_count};
use crate::error::{ReconcileError, ReconcileResult};

/// Fixed inputs to every pass.
#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    pub thresholds: Thresholds,
    pub endpoint: EndpointSource,
    /// Delay before re-checking after a scale action.
    pub scale_requeue: Duration,
}

impl ReconcilerSettings {
    pub fn from_config(config: &LatscaleConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            thresholds: config.thresholds,
            endpoint: config.probe.endpoint_source(),
            scale_requeue: config.controller.scale_requeue()?,
        })
    }
}

/// Result of a pass that did not fail.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconcileOutcome {
    /// `None` when the workload no longer exists.
    pub action: Option<Action>,
    /// Latency sampled during the pass, if it got that far.
    pub latency: Option<f64>,
    pub requeue: Requeue,
}

impl ReconcileOutcome {
    fn workload_gone() -> Self {
        Self {
            action: None,
            latency: None,
            requeue: Requeue::Never,
        }
    }
}

/// Runs reconciliation passes against injected collaborators.
pub struct Reconciler<S, G, L> {
    store: S,
    gateway: G,
    sampler: L,
    settings: ReconcilerSettings,
}

impl<S, G, L> Reconciler<S, G, L>
where
    S: WorkloadStore,
    G: ReplicaSetGateway,
    L: LatencySampler,
{
    /// Build a reconciler. Fails if the thresholds are non-finite or
    /// overlap, so a misconfigured controller never runs a pass.
    pub fn new(store: S, gateway: G, sampler: L, settings: ReconcilerSettings) -> ReconcileResult<Self> {
        validate_thresholds(&settings.thresholds)?;
        Ok(Self {
            store,
            gateway,
            sampler,
            settings,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run one pass for `id`.
    pub async fn reconcile(&self, id: &WorkloadId) -> ReconcileResult<ReconcileOutcome> {
        // FetchSpec
        let Some(workload) = self.store.get(id).await? else {
            info!(workload = %id, "workload not found, ignoring since it must have been deleted");
            return Ok(ReconcileOutcome::workload_gone());
        };

        // FetchOrCreateReplicaSet
        let Some(replica_set) = self.gateway.get(id).await? else {
            let action = Action::CreateReplicaSet(workload.spec.size);
            self.apply(&workload, action, None).await?;
            return Ok(ReconcileOutcome {
                action: Some(action),
                latency: None,
                requeue: action.requeue(self.settings.scale_requeue),
            });
        };

        // SampleLatency
        let endpoint = self.settings.endpoint.resolve()?;
        let sample = self.sampler.sample(&endpoint).await?;
        let latency = sample.value;
        if !latency.is_finite() {
            return Err(ReconcileError::InvalidSample(latency));
        }
        debug!(workload = %id, latency_ms = latency, %endpoint, "latency sampled");

        // Decide
        let running_pods = if needs_pod_count(latency, &self.settings.thresholds) {
            let running = self.gateway.running_pods(&replica_set).await?;
            debug!(workload = %id, running, "counted running pods");
            running
        } else {
            replica_set.replica_count
        };
        let observed = ObservedReplicas {
            replicas: replica_set.replica_count,
            running_pods,
        };
        let action = decide(
            Some(observed),
            workload.spec.size,
            latency,
            &self.settings.thresholds,
        );

        // ApplyAction / PersistStatus
        if matches!(action, Action::ScaleUp(_) | Action::ScaleDown(_)) {
            info!(
                workload = %id,
                from = observed.replicas,
                latency_ms = latency,
                scale_up = self.settings.thresholds.scale_up,
                scale_down = self.settings.thresholds.scale_down,
                "latency outside band"
            );
        }
        self.apply(&workload, action, Some(latency)).await?;

        Ok(ReconcileOutcome {
            action: Some(action),
            latency: Some(latency),
            requeue: action.requeue(self.settings.scale_requeue),
        })
    }

    /// Carry out `action`. Only `RecordStatusOnly` writes status.
    async fn apply(&self, workload: &Workload, action: Action, latency: Option<f64>) -> ReconcileResult<()> {
        let id = &workload.id;
        match action {
            Action::CreateReplicaSet(replicas) => {
                info!(workload = %id, replicas, "creating replica set");
                self.gateway.create(workload, replicas).await?;
            }
            Action::ScaleUp(replicas) | Action::ScaleDown(replicas) => {
                info!(workload = %id, to = replicas, ?action, "scaling replica set");
                self.gateway.set_replicas(id, replicas).await?;
            }
            Action::RecordStatusOnly => {
                if let Some(latency) = latency {
                    self.store
                        .put_status(id, &WorkloadStatus { latency: Some(latency) })
                        .await?;
                    debug!(workload = %id, latency_ms = latency, "status updated");
                }
            }
        }
        Ok(())
    }
}
