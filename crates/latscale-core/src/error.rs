//! Error types surfaced by the reconciler's collaborators.

use thiserror::Error;

/// Errors from the workload store or the replica-set gateway.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),
}

/// Errors from the latency sampler.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The endpoint could not be resolved, connected to, or answered.
    #[error("probe endpoint unreachable: {0}")]
    Unreachable(String),
}

/// Errors found while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("scale-down threshold {scale_down} must be below scale-up threshold {scale_up}")]
    InvertedThresholds { scale_up: f64, scale_down: f64 },

    #[error("threshold {name} must be finite, got {value}")]
    NonFiniteThreshold { name: &'static str, value: f64 },

    #[error("no probe endpoint configured: {0}")]
    MissingEndpoint(String),

    #[error("invalid duration for {field}: {value:?}")]
    InvalidDuration { field: &'static str, value: String },

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
