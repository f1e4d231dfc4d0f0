//! `WorkloadStore` and `ReplicaSetGateway` over the redb store.
//!
//! Each call is one redb transaction; nothing is cached between calls.

use latscale_core::{
    ReplicaSet, ReplicaSetGateway, StoreError, Workload, WorkloadId, WorkloadStatus, WorkloadStore,
};

use crate::store::StateStore;

impl WorkloadStore for StateStore {
    async fn get(&self, id: &WorkloadId) -> Result<Option<Workload>, StoreError> {
        Ok(self.get_workload(&id.table_key())?)
    }

    async fn put_status(&self, id: &WorkloadId, status: &WorkloadStatus) -> Result<(), StoreError> {
        Ok(self.put_workload_status(&id.table_key(), status)?)
    }

    async fn list(&self) -> Result<Vec<WorkloadId>, StoreError> {
        Ok(self
            .list_workloads()?
            .into_iter()
            .map(|w| w.id)
            .collect())
    }
}

impl ReplicaSetGateway for StateStore {
    async fn get(&self, id: &WorkloadId) -> Result<Option<ReplicaSet>, StoreError> {
        Ok(self.get_replica_set(&id.table_key())?)
    }

    async fn create(&self, owner: &Workload, replicas: u32) -> Result<ReplicaSet, StoreError> {
        Ok(self.create_replica_set(owner, replicas)?)
    }

    async fn set_replicas(&self, id: &WorkloadId, replicas: u32) -> Result<(), StoreError> {
        Ok(self.set_replica_count(&id.table_key(), replicas)?)
    }

    async fn running_pods(&self, replica_set: &ReplicaSet) -> Result<u32, StoreError> {
        Ok(self.count_running_pods(replica_set)?)
    }
}
