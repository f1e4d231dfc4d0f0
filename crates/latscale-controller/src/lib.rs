//! latscale-controller — latency-driven replica scaling.
//!
//! One reconciliation pass per workload identity: read the spec, make sure
//! the replica set exists, sample latency, decide, apply, and persist the
//! observed latency. The [`Controller`] drives passes from a work queue.
//!
//! # Decision
//!
//! ```text
//! no replica set                          → CreateReplicaSet(spec.size), requeue now
//! latency >= scale_up                     → ScaleUp(replicas + 1),       requeue 5s
//! latency <= scale_down, running pods > 1 → ScaleDown(replicas - 1),     requeue 5s
//! otherwise                               → write status.latency,        no requeue
//! ```
//!
//! A scale action does not write status in the same pass; the requeued
//! pass samples again once the change has had time to converge.

pub mod controller;
pub mod decision;
pub mod error;
pub mod health;
pub mod reconciler;

pub use controller::{Controller, ControllerHandle, ControllerSettings};
pub use decision::{Action, ObservedReplicas, Requeue, decide};
pub use error::{ReconcileError, ReconcileResult};
pub use health::{HealthRegistry, WorkloadHealth};
pub use reconciler::{ReconcileOutcome, Reconciler, ReconcilerSettings};
