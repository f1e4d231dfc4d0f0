//! Scale decision — the pure core of a reconciliation pass.

use std::time::Duration;

use serde::Serialize;

use latscale_core::Thresholds;

/// What a pass should do to the replica set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "replicas", rename_all = "snake_case")]
pub enum Action {
    /// No replica set exists yet; create one with this many replicas.
    CreateReplicaSet(u32),
    /// Latency is at or above the scale-up threshold; set this count.
    ScaleUp(u32),
    /// Latency is at or below the scale-down threshold; set this count.
    ScaleDown(u32),
    /// Leave the replica set alone and persist the sampled latency.
    RecordStatusOnly,
}

impl Action {
    /// How soon the driver should run the next pass after this action.
    pub fn requeue(&self, scale_requeue: Duration) -> Requeue {
        match self {
            Action::CreateReplicaSet(_) => Requeue::Immediately,
            Action::ScaleUp(_) | Action::ScaleDown(_) => Requeue::After(scale_requeue),
            Action::RecordStatusOnly => Requeue::Never,
        }
    }
}

/// Requeue instruction returned to the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requeue {
    /// Wait for the next external trigger.
    Never,
    /// Run again right away.
    Immediately,
    /// Run again after the delay.
    After(Duration),
}

/// Current state of an existing replica set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObservedReplicas {
    /// Declared replica count.
    pub replicas: u32,
    /// Pods currently running under the replica set's selector.
    pub running_pods: u32,
}

/// Decide what to do for one workload.
///
/// Checks run in order: existence, scale-up, scale-down. Threshold
/// comparisons are inclusive, so a sample exactly on a threshold scales.
/// If the thresholds overlap, scale-up wins. Scale-down requires more than
/// one running pod and never takes the declared count below one.
pub fn decide(
    observed: Option<ObservedReplicas>,
    desired_size: u32,
    latency: f64,
    thresholds: &Thresholds,
) -> Action {
    let Some(observed) = observed else {
        return Action::CreateReplicaSet(desired_size);
    };

    if latency >= thresholds.scale_up && observed.replicas < u32::MAX {
        return Action::ScaleUp(observed.replicas + 1);
    }

    if latency <= thresholds.scale_down && observed.running_pods > 1 && observed.replicas > 1 {
        return Action::ScaleDown(observed.replicas - 1);
    }

    Action::RecordStatusOnly
}

/// True when `decide` could answer `ScaleDown` for this latency, i.e. when
/// the running pod count matters.
pub fn needs_pod_count(latency: f64, thresholds: &Thresholds) -> bool {
    latency < thresholds.scale_up && latency <= thresholds.scale_down
}
