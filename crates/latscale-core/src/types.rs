//! Domain types shared by the store, the probe, and the controller.
//!
//! All persisted types are serializable to/from JSON.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

/// Label key carrying the application name on managed pods.
pub const APP_LABEL: &str = "app";

/// Value of [`APP_LABEL`] for every pod the autoscaler manages.
pub const APP_LABEL_VALUE: &str = "webserver";

/// Label key carrying the owning workload's name.
pub const WORKLOAD_LABEL: &str = "workload";

/// Kind recorded in owner references pointing at a workload.
pub const WORKLOAD_KIND: &str = "Workload";

/// Kind recorded in owner references pointing at a replica set.
pub const REPLICA_SET_KIND: &str = "ReplicaSet";

// ── Identity ──────────────────────────────────────────────────────

/// Namespace-scoped identity of a workload and of its replica set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkloadId {
    pub namespace: String,
    pub name: String,
}

impl WorkloadId {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Parse the `{namespace}/{name}` form.
    pub fn parse(s: &str) -> Option<Self> {
        let (namespace, name) = s.split_once('/')?;
        if namespace.is_empty() || name.is_empty() || name.contains('/') {
            return None;
        }
        Some(Self::new(namespace, name))
    }

    /// Composite key used by the store tables.
    pub fn table_key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

impl fmt::Display for WorkloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

// ── Workload ──────────────────────────────────────────────────────

/// Desired state declared by the user. The control loop only reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    /// Baseline replica count used when the replica set is first created.
    pub size: u32,
}

/// Observed state, written only by the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WorkloadStatus {
    /// Last successfully measured latency (milliseconds for the HTTP sampler).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency: Option<f64>,
}

/// A workload resource: identity, spec, and status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workload {
    #[serde(flatten)]
    pub id: WorkloadId,
    /// Opaque identity stamped by the store on first insert.
    #[serde(default)]
    pub uid: String,
    pub spec: WorkloadSpec,
    #[serde(default)]
    pub status: WorkloadStatus,
    /// Unix timestamp (seconds) when this workload was created.
    #[serde(default)]
    pub created_at: u64,
    /// Unix timestamp (seconds) of the last spec or status write.
    #[serde(default)]
    pub updated_at: u64,
}

impl Workload {
    pub fn new(id: WorkloadId, size: u32) -> Self {
        Self {
            id,
            uid: String::new(),
            spec: WorkloadSpec { size },
            status: WorkloadStatus::default(),
            created_at: 0,
            updated_at: 0,
        }
    }
}

// ── Replica set ───────────────────────────────────────────────────

/// Back-reference from a dependent to the workload that owns it.
///
/// The store cascades deletes along this link: removing the owner
/// removes every dependent whose reference names it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerReference {
    pub kind: String,
    pub name: String,
    pub uid: String,
    /// Whether the owner is the managing controller of this dependent.
    pub controller: bool,
}

impl OwnerReference {
    /// Controller reference pointing at `workload`.
    pub fn controlled_by(workload: &Workload) -> Self {
        Self {
            kind: WORKLOAD_KIND.to_string(),
            name: workload.id.name.clone(),
            uid: workload.uid.clone(),
            controller: true,
        }
    }

    pub fn is_owned_by(&self, workload: &Workload) -> bool {
        self.kind == WORKLOAD_KIND && self.name == workload.id.name && self.uid == workload.uid
    }
}

/// Equality-based label selector.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LabelSelector {
    pub match_labels: BTreeMap<String, String>,
}

impl LabelSelector {
    /// Selector for the pods backing the named workload:
    /// `{app: "webserver", workload: <name>}`.
    pub fn for_workload(name: &str) -> Self {
        let mut match_labels = BTreeMap::new();
        match_labels.insert(APP_LABEL.to_string(), APP_LABEL_VALUE.to_string());
        match_labels.insert(WORKLOAD_LABEL.to_string(), name.to_string());
        Self { match_labels }
    }

    /// True if every selector label is present in `labels` with the same value.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.match_labels
            .iter()
            .all(|(k, v)| labels.get(k).is_some_and(|actual| actual == v))
    }
}

/// The managed fleet backing a workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaSet {
    /// Same namespace and name as the owning workload.
    #[serde(flatten)]
    pub id: WorkloadId,
    pub replica_count: u32,
    pub selector: LabelSelector,
    pub owner: OwnerReference,
    pub created_at: u64,
    pub updated_at: u64,
}

// ── Pods ──────────────────────────────────────────────────────────

/// Lifecycle phase of a pod.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// A single running instance, as recorded by the cluster store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pod {
    pub namespace: String,
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub phase: PodPhase,
    /// Owning replica set (kind [`REPLICA_SET_KIND`]), if any. Cascade
    /// deletes follow this link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<OwnerReference>,
}

impl Pod {
    /// Composite key for the pods table: `{namespace}/{name}`.
    pub fn table_key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

// ── Latency ───────────────────────────────────────────────────────

/// Phase timings recorded while taking a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeTimings {
    /// Time to establish the TCP connection.
    pub connect: Duration,
    /// Time from request start until the response head arrived.
    pub first_byte: Duration,
}

/// One latency measurement. Only `value` is ever persisted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencySample {
    pub value: f64,
    pub taken_at: SystemTime,
    pub timings: Option<ProbeTimings>,
}

impl LatencySample {
    pub fn new(value: f64) -> Self {
        Self {
            value,
            taken_at: SystemTime::now(),
            timings: None,
        }
    }
}

// ── Thresholds ────────────────────────────────────────────────────

/// Latency band. At or above `scale_up` adds a replica; at or below
/// `scale_down` removes one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub scale_up: f64,
    pub scale_down: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            scale_up: 900.0,
            scale_down: 200.0,
        }
    }
}
