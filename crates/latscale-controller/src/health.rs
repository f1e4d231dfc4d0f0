//! Per-workload failure tracking and retry backoff.
//!
//! The driver records every pass outcome here. Consecutive failures double
//! the retry delay up to a cap; one success resets it. The API reads the
//! same registry to report controller health.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use latscale_core::WorkloadId;

/// Failure state of one workload, as reported by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkloadHealth {
    pub workload: String,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    /// Delay before the next retry, in milliseconds.
    pub backoff_ms: u64,
}

#[derive(Debug)]
struct FailureState {
    consecutive_failures: u32,
    last_error: Option<String>,
    current_backoff: Duration,
}

/// Shared, cloneable registry of per-workload failures.
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    entries: Arc<RwLock<HashMap<WorkloadId, FailureState>>>,
    base_backoff: Duration,
    max_backoff: Duration,
    unhealthy_after: u32,
}

impl HealthRegistry {
    pub fn new(base_backoff: Duration, max_backoff: Duration, unhealthy_after: u32) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            base_backoff,
            max_backoff,
            unhealthy_after,
        }
    }

    /// Record a successful pass, clearing any failure streak.
    pub async fn record_success(&self, id: &WorkloadId) {
        let mut entries = self.entries.write().await;
        if let Some(prev) = entries.remove(id) {
            debug!(
                workload = %id,
                failures = prev.consecutive_failures,
                "workload recovered"
            );
        }
    }

    /// Record a failed pass and return the delay before retrying.
    ///
    /// The first failure waits the base backoff; each further failure
    /// doubles it up to the maximum.
    pub async fn record_failure(&self, id: &WorkloadId, error: &str) -> Duration {
        let mut entries = self.entries.write().await;
        let state = entries.entry(id.clone()).or_insert_with(|| FailureState {
            consecutive_failures: 0,
            last_error: None,
            current_backoff: Duration::ZERO,
        });

        state.consecutive_failures += 1;
        state.last_error = Some(error.to_string());
        state.current_backoff = if state.current_backoff.is_zero() {
            self.base_backoff
        } else {
            state.current_backoff.saturating_mul(2).min(self.max_backoff)
        };

        if state.consecutive_failures == self.unhealthy_after {
            warn!(
                workload = %id,
                failures = state.consecutive_failures,
                "workload marked unhealthy"
            );
        }

        state.current_backoff
    }

    /// Drop all state for a workload that no longer exists.
    pub async fn forget(&self, id: &WorkloadId) {
        self.entries.write().await.remove(id);
    }

    /// Consecutive failures for one workload (zero if healthy or unknown).
    pub async fn failures(&self, id: &WorkloadId) -> u32 {
        self.entries
            .read()
            .await
            .get(id)
            .map_or(0, |s| s.consecutive_failures)
    }

    /// Every workload with at least one failure, sorted by identity.
    pub async fn snapshot(&self) -> Vec<WorkloadHealth> {
        let entries = self.entries.read().await;
        let mut ids: Vec<&WorkloadId> = entries.keys().collect();
        ids.sort();
        ids.into_iter()
            .map(|id| {
                let state = &entries[id];
                WorkloadHealth {
                    workload: id.to_string(),
                    consecutive_failures: state.consecutive_failures,
                    last_error: state.last_error.clone(),
                    backoff_ms: u64::try_from(state.current_backoff.as_millis())
                        .unwrap_or(u64::MAX),
                }
            })
            .collect()
    }

    /// True when no workload has reached the unhealthy threshold.
    pub async fn is_healthy(&self) -> bool {
        self.entries
            .read()
            .await
            .values()
            .all(|s| s.consecutive_failures < self.unhealthy_after)
    }

    pub fn unhealthy_after(&self) -> u32 {
        self.unhealthy_after
    }
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(300), 3)
    }
}
