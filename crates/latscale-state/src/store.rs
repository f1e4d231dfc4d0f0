//! StateStore — redb-backed cluster state for latscale.
//!
//! Provides typed CRUD over workloads, replica sets, and pods. All values
//! are JSON-serialized into redb's `&[u8]` value columns. Every mutation
//! is a single write transaction, so a status write or a replica-count
//! update is either fully applied or not at all. The store supports both
//! on-disk and in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use redb::{Database, ReadableDatabase, ReadableTable};
use serde::de::DeserializeOwned;
use tracing::debug;

use latscale_core::{
    LabelSelector, OwnerReference, Pod, PodPhase, REPLICA_SET_KIND, ReplicaSet, Workload,
    WorkloadStatus,
};

use crate::error::{StateError, StateResult};
use crate::tables::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Monotonic suffix for generated uids.
static UID_SEQ: AtomicU64 = AtomicU64::new(0);

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(WORKLOADS).map_err(map_err!(Table))?;
        txn.open_table(REPLICA_SETS).map_err(map_err!(Table))?;
        txn.open_table(PODS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Workloads ──────────────────────────────────────────────────

    /// Insert or replace a workload's spec.
    ///
    /// A new workload gets a fresh uid and creation time. Replacing an
    /// existing one keeps its uid, creation time, and status, so a user
    /// editing `spec.size` never clobbers the controller's status.
    pub fn put_workload(&self, workload: &Workload) -> StateResult<Workload> {
        let key = workload.id.table_key();
        let now = epoch_secs();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let stored;
        {
            let mut table = txn.open_table(WORKLOADS).map_err(map_err!(Table))?;
            let existing: Option<Workload> = match table.get(key.as_str()).map_err(map_err!(Read))? {
                Some(guard) => Some(decode(guard.value())?),
                None => None,
            };

            let mut next = workload.clone();
            match existing {
                Some(prev) => {
                    next.uid = prev.uid;
                    next.created_at = prev.created_at;
                    next.status = prev.status;
                }
                None => {
                    next.uid = generate_uid();
                    next.created_at = now;
                }
            }
            next.updated_at = now;

            let value = serde_json::to_vec(&next).map_err(map_err!(Serialize))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
            stored = next;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, uid = %stored.uid, "workload stored");
        Ok(stored)
    }

    /// Get a workload by `{namespace}/{name}` key.
    pub fn get_workload(&self, key: &str) -> StateResult<Option<Workload>> {
        self.get_value(WORKLOADS, key)
    }

    /// List all workloads.
    pub fn list_workloads(&self) -> StateResult<Vec<Workload>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(WORKLOADS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            results.push(decode(value.value())?);
        }
        Ok(results)
    }

    /// Replace only the status sub-object of a workload.
    ///
    /// Fails with `NotFound` if the workload does not exist.
    pub fn put_workload_status(&self, key: &str, status: &WorkloadStatus) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(WORKLOADS).map_err(map_err!(Table))?;
            let mut workload: Workload = match table.get(key).map_err(map_err!(Read))? {
                Some(guard) => decode(guard.value())?,
                None => return Err(StateError::NotFound(key.to_string())),
            };
            workload.status = *status;
            workload.updated_at = epoch_secs();
            let value = serde_json::to_vec(&workload).map_err(map_err!(Serialize))?;
            table.insert(key, value.as_slice()).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, latency = ?status.latency, "workload status stored");
        Ok(())
    }

    /// Delete a workload and cascade to its dependents. Returns true if it existed.
    ///
    /// The replica set at the same key is removed only if its owner
    /// reference names this workload (same uid); pods owned by that
    /// replica set go with it.
    pub fn delete_workload(&self, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let mut removed_pods = 0usize;
        let mut removed_replica_set = false;
        let existed;
        {
            let mut workloads = txn.open_table(WORKLOADS).map_err(map_err!(Table))?;
            let workload: Option<Workload> = match workloads.remove(key).map_err(map_err!(Write))? {
                Some(guard) => Some(decode(guard.value())?),
                None => None,
            };
            existed = workload.is_some();

            if let Some(workload) = workload {
                let mut replica_sets = txn.open_table(REPLICA_SETS).map_err(map_err!(Table))?;
                let owned: Option<ReplicaSet> = match replica_sets.get(key).map_err(map_err!(Read))? {
                    Some(guard) => {
                        let rs: ReplicaSet = decode(guard.value())?;
                        rs.owner.is_owned_by(&workload).then_some(rs)
                    }
                    None => None,
                };

                if let Some(rs) = owned {
                    replica_sets.remove(key).map_err(map_err!(Write))?;
                    removed_replica_set = true;

                    let mut pods = txn.open_table(PODS).map_err(map_err!(Table))?;
                    let mut doomed = Vec::new();
                    for entry in pods.iter().map_err(map_err!(Read))? {
                        let (pod_key, value) = entry.map_err(map_err!(Read))?;
                        let pod: Pod = decode(value.value())?;
                        if pod.namespace == rs.id.namespace && owned_by_replica_set(&pod, &rs) {
                            doomed.push(pod_key.value().to_string());
                        }
                    }
                    for pod_key in &doomed {
                        pods.remove(pod_key.as_str()).map_err(map_err!(Write))?;
                    }
                    removed_pods = doomed.len();
                }
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, existed, removed_replica_set, removed_pods, "workload deleted");
        Ok(existed)
    }

    // ── Replica sets ───────────────────────────────────────────────

    /// Get the replica set stored under a workload's key.
    pub fn get_replica_set(&self, key: &str) -> StateResult<Option<ReplicaSet>> {
        self.get_value(REPLICA_SETS, key)
    }

    /// Create the replica set for `owner`. Fails with `AlreadyExists` if one
    /// is already stored under the same key.
    pub fn create_replica_set(&self, owner: &Workload, replicas: u32) -> StateResult<ReplicaSet> {
        let key = owner.id.table_key();
        let now = epoch_secs();
        let rs = ReplicaSet {
            id: owner.id.clone(),
            replica_count: replicas,
            selector: LabelSelector::for_workload(&owner.id.name),
            owner: OwnerReference::controlled_by(owner),
            created_at: now,
            updated_at: now,
        };
        let value = serde_json::to_vec(&rs).map_err(map_err!(Serialize))?;

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(REPLICA_SETS).map_err(map_err!(Table))?;
            if table.get(key.as_str()).map_err(map_err!(Read))?.is_some() {
                return Err(StateError::AlreadyExists(key));
            }
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, replicas, "replica set created");
        Ok(rs)
    }

    /// Update the declared replica count. Fails with `NotFound` if absent.
    pub fn set_replica_count(&self, key: &str, replicas: u32) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(REPLICA_SETS).map_err(map_err!(Table))?;
            let mut rs: ReplicaSet = match table.get(key).map_err(map_err!(Read))? {
                Some(guard) => decode(guard.value())?,
                None => return Err(StateError::NotFound(key.to_string())),
            };
            rs.replica_count = replicas;
            rs.updated_at = epoch_secs();
            let value = serde_json::to_vec(&rs).map_err(map_err!(Serialize))?;
            table.insert(key, value.as_slice()).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, replicas, "replica count updated");
        Ok(())
    }

    /// List all replica sets.
    pub fn list_replica_sets(&self) -> StateResult<Vec<ReplicaSet>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(REPLICA_SETS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            results.push(decode(value.value())?);
        }
        Ok(results)
    }

    // ── Pods ───────────────────────────────────────────────────────

    /// Insert or update a pod record.
    pub fn put_pod(&self, pod: &Pod) -> StateResult<()> {
        let key = pod.table_key();
        let value = serde_json::to_vec(pod).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(PODS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Delete a pod by `{namespace}/{name}` key. Returns true if it existed.
    pub fn delete_pod(&self, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(PODS).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }

    /// List pods in `namespace` matching `selector`.
    pub fn list_pods(&self, namespace: &str, selector: &LabelSelector) -> StateResult<Vec<Pod>> {
        let prefix = format!("{namespace}/");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(PODS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if !key.value().starts_with(&prefix) {
                continue;
            }
            let pod: Pod = decode(value.value())?;
            if selector.matches(&pod.labels) {
                results.push(pod);
            }
        }
        Ok(results)
    }

    /// Count pods in the `Running` phase matched by a replica set's selector.
    pub fn count_running_pods(&self, rs: &ReplicaSet) -> StateResult<u32> {
        let pods = self.list_pods(&rs.id.namespace, &rs.selector)?;
        let running = pods.iter().filter(|p| p.phase == PodPhase::Running).count();
        Ok(u32::try_from(running).unwrap_or(u32::MAX))
    }

    fn get_value<T: DeserializeOwned>(
        &self,
        def: redb::TableDefinition<&str, &[u8]>,
        key: &str,
    ) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }
}

fn owned_by_replica_set(pod: &Pod, rs: &ReplicaSet) -> bool {
    pod.owner
        .as_ref()
        .is_some_and(|o| o.kind == REPLICA_SET_KIND && o.name == rs.id.name)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StateResult<T> {
    serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
}

fn generate_uid() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let seq = UID_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{nanos:x}-{seq:04x}")
}

pub(crate) fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
