//! Collaborator traits consumed by the reconciler.
//!
//! Implementations are synchronous round-trips to an external store or
//! service; none of them cache. The reconciler owns one instance of each,
//! handed in at construction.

use std::future::Future;

use crate::endpoint::Endpoint;
use crate::error::{ProbeError, StoreError};
use crate::types::{LatencySample, ReplicaSet, Workload, WorkloadId, WorkloadStatus};

/// Reads workload specs and writes their status.
pub trait WorkloadStore: Send + Sync {
    /// Fetch a workload. `Ok(None)` when it does not exist.
    fn get(
        &self,
        id: &WorkloadId,
    ) -> impl Future<Output = Result<Option<Workload>, StoreError>> + Send;

    /// Replace the status sub-object, leaving the spec untouched.
    fn put_status(
        &self,
        id: &WorkloadId,
        status: &WorkloadStatus,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Identities of every workload currently stored.
    fn list(&self) -> impl Future<Output = Result<Vec<WorkloadId>, StoreError>> + Send;
}

/// Manages the replica set owned by a workload.
pub trait ReplicaSetGateway: Send + Sync {
    /// Fetch the replica set for a workload. `Ok(None)` when none exists.
    fn get(
        &self,
        id: &WorkloadId,
    ) -> impl Future<Output = Result<Option<ReplicaSet>, StoreError>> + Send;

    /// Create the replica set for `owner`, stamping an owner reference so
    /// the store can cascade-delete it with the workload.
    fn create(
        &self,
        owner: &Workload,
        replicas: u32,
    ) -> impl Future<Output = Result<ReplicaSet, StoreError>> + Send;

    /// Update the declared replica count.
    fn set_replicas(
        &self,
        id: &WorkloadId,
        replicas: u32,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Number of running pods matched by the replica set's selector.
    fn running_pods(
        &self,
        replica_set: &ReplicaSet,
    ) -> impl Future<Output = Result<u32, StoreError>> + Send;
}

/// Takes a single latency measurement against an endpoint.
///
/// Implementations must not retry; a failed round-trip is reported as
/// [`ProbeError::Unreachable`].
pub trait LatencySampler: Send + Sync {
    fn sample(
        &self,
        endpoint: &Endpoint,
    ) -> impl Future<Output = Result<LatencySample, ProbeError>> + Send;
}
