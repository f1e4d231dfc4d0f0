//! Reconciliation error types.

use latscale_core::{ConfigError, ProbeError, StoreError};
use thiserror::Error;

/// Errors that end a reconciliation pass early.
///
/// Every variant is returned to the driver, which backs off and retries.
/// Effects applied before the error are not rolled back.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("latency probe failed: {0}")]
    Probe(#[from] ProbeError),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("latency sample is not a finite number: {0}")]
    InvalidSample(f64),
}

pub type ReconcileResult<T> = Result<T, ReconcileError>;
