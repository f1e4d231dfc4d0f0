//! redb table definitions for the latscale state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain types).
//! All keys follow the pattern `{namespace}/{name}`.

use redb::TableDefinition;

/// Workloads keyed by `{namespace}/{name}`.
pub const WORKLOADS: TableDefinition<&str, &[u8]> = TableDefinition::new("workloads");

/// Replica sets keyed by the owning workload's `{namespace}/{name}`.
pub const REPLICA_SETS: TableDefinition<&str, &[u8]> = TableDefinition::new("replica_sets");

/// Pods keyed by `{namespace}/{pod_name}`.
pub const PODS: TableDefinition<&str, &[u8]> = TableDefinition::new("pods");
