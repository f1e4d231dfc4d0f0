//! latscale-core — shared vocabulary for the latscale autoscaler.
//!
//! Holds the domain types (workloads, replica sets, pods, latency samples),
//! the collaborator traits the reconciler is written against, their error
//! types, and the `latscale.toml` configuration.
//!
//! # Collaborators
//!
//! ```text
//! Reconciler
//!   ├── WorkloadStore      (read spec, write status)
//!   ├── ReplicaSetGateway  (get / create / set_replicas / running_pods)
//!   └── LatencySampler     (one GET round-trip per pass)
//! ```

pub mod config;
pub mod endpoint;
pub mod error;
pub mod traits;
pub mod types;

pub use config::LatscaleConfig;
pub use endpoint::{Endpoint, EndpointSource};
pub use error::{ConfigError, ProbeError, StoreError};
pub use traits::{LatencySampler, ReplicaSetGateway, WorkloadStore};
pub use types::*;
