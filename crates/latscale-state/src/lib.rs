//! latscale-state — embedded cluster store for latscale.
//!
//! Backed by [redb](https://docs.rs/redb), holds workloads, their replica
//! sets, and the pods those replica sets run. Implements the
//! `WorkloadStore` and `ReplicaSetGateway` traits from `latscale-core` so
//! the reconciler can run against it directly.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns
//! under `{namespace}/{name}` keys. A replica set shares its key with the
//! owning workload.
//!
//! # Ownership
//!
//! Deleting a workload removes, in the same transaction, the replica set
//! whose owner reference names it and every pod owned by that replica set.
//! Callers never delete dependents themselves.

pub mod cluster;
pub mod error;
pub mod store;
pub mod tables;

pub use error::{StateError, StateResult};
pub use store::StateStore;
