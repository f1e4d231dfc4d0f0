//! Controller — the work queue that drives reconciliation passes.
//!
//! Triggers come from three places: a periodic resync that enqueues every
//! stored workload, requeue timers returned by passes, and explicit
//! [`ControllerHandle::enqueue`] calls (the API uses this after a write).
//!
//! # Scheduling
//!
//! ```text
//! enqueue(id) ──► pending (deduplicated)
//!                   │  at most `max_concurrent` passes in flight
//!                   ▼
//!             running: id ──(enqueue while running)──► dirty
//!                   │
//!          pass done: Ok  → health reset, honour Requeue
//!                     Err → health failure, retry after backoff
//!                   │
//!             dirty? → back to pending
//! ```
//!
//! Passes for the same workload never overlap. Shutdown aborts in-flight
//! passes at their next await point; every store write is a single
//! transaction, so nothing is left half-written.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use latscale_core::{
    ConfigError, LatencySampler, LatscaleConfig, ReplicaSetGateway, WorkloadId, WorkloadStore,
};

use crate::decision::Requeue;
use crate::error::ReconcileResult;
use crate::health::HealthRegistry;
use crate::reconciler::{ReconcileOutcome, Reconciler};

/// Driver tuning.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub max_concurrent: usize,
    pub resync_interval: Duration,
    pub error_backoff: Duration,
    pub max_backoff: Duration,
    pub unhealthy_after: u32,
}

impl ControllerSettings {
    pub fn from_config(config: &LatscaleConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            max_concurrent: config.controller.max_concurrent_reconciles.max(1),
            resync_interval: config.controller.resync_interval()?,
            error_backoff: config.controller.error_backoff()?,
            max_backoff: config.controller.max_backoff()?,
            unhealthy_after: config.controller.unhealthy_after,
        })
    }
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            resync_interval: Duration::from_secs(30),
            error_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(300),
            unhealthy_after: 3,
        }
    }
}

/// Cloneable handle for feeding the queue and reading health.
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    queue: mpsc::UnboundedSender<WorkloadId>,
    health: HealthRegistry,
}

impl ControllerHandle {
    /// Build a handle and the receiving end of its queue.
    pub fn channel(health: HealthRegistry) -> (Self, mpsc::UnboundedReceiver<WorkloadId>) {
        let (queue, rx) = mpsc::unbounded_channel();
        (Self { queue, health }, rx)
    }

    /// Ask for a pass for `id`. Returns false once the controller has stopped.
    pub fn enqueue(&self, id: WorkloadId) -> bool {
        self.queue.send(id).is_ok()
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }
}

#[derive(Debug, Default)]
struct Slot {
    running: bool,
    dirty: bool,
}

/// Work-queue driver around a [`Reconciler`].
pub struct Controller<S, G, L> {
    reconciler: Arc<Reconciler<S, G, L>>,
    settings: ControllerSettings,
    handle: ControllerHandle,
    queue_rx: mpsc::UnboundedReceiver<WorkloadId>,
}

impl<S, G, L> Controller<S, G, L>
where
    S: WorkloadStore + 'static,
    G: ReplicaSetGateway + 'static,
    L: LatencySampler + 'static,
{
    pub fn new(reconciler: Reconciler<S, G, L>, settings: ControllerSettings) -> Self {
        let health = HealthRegistry::new(
            settings.error_backoff,
            settings.max_backoff,
            settings.unhealthy_after,
        );
        let (handle, queue_rx) = ControllerHandle::channel(health);
        Self {
            reconciler: Arc::new(reconciler),
            settings,
            handle,
            queue_rx,
        }
    }

    pub fn handle(&self) -> ControllerHandle {
        self.handle.clone()
    }

    /// Run until `shutdown` flips to true (or its sender is dropped).
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            max_concurrent = self.settings.max_concurrent,
            resync_secs = self.settings.resync_interval.as_secs(),
            "controller started"
        );

        let mut queue = WorkQueue::default();
        let mut passes: JoinSet<(WorkloadId, ReconcileResult<ReconcileOutcome>)> = JoinSet::new();
        let mut in_flight: HashMap<tokio::task::Id, WorkloadId> = HashMap::new();
        let mut timers: JoinSet<WorkloadId> = JoinSet::new();
        let mut resync = tokio::time::interval(self.settings.resync_interval);

        loop {
            while in_flight.len() < self.settings.max_concurrent {
                let Some(id) = queue.start_next() else {
                    break;
                };
                let reconciler = Arc::clone(&self.reconciler);
                let pass_id = id.clone();
                let abort = passes.spawn(async move {
                    let result = reconciler.reconcile(&pass_id).await;
                    (pass_id, result)
                });
                in_flight.insert(abort.id(), id);
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("controller shutting down");
                        break;
                    }
                }
                Some(id) = self.queue_rx.recv() => {
                    queue.push(id);
                }
                Some(joined) = passes.join_next_with_id(), if !passes.is_empty() => {
                    match joined {
                        Ok((task_id, (id, result))) => {
                            in_flight.remove(&task_id);
                            queue.finish(&id);
                            self.complete(&id, result, &mut queue, &mut timers).await;
                        }
                        Err(e) => {
                            if let Some(id) = in_flight.remove(&e.id()) {
                                error!(workload = %id, error = %e, "reconcile task panicked");
                                queue.finish(&id);
                                let delay = self.handle.health.record_failure(&id, &e.to_string()).await;
                                schedule(&mut timers, id, delay);
                            }
                        }
                    }
                }
                Some(fired) = timers.join_next(), if !timers.is_empty() => {
                    if let Ok(id) = fired {
                        queue.push(id);
                    }
                }
                _ = resync.tick() => {
                    match self.reconciler.store().list().await {
                        Ok(ids) => {
                            debug!(count = ids.len(), "resync");
                            for id in ids {
                                queue.push(id);
                            }
                        }
                        Err(e) => warn!(error = %e, "resync failed to list workloads"),
                    }
                }
            }
        }

        passes.shutdown().await;
        timers.shutdown().await;
        info!("controller stopped");
    }

    async fn complete(
        &self,
        id: &WorkloadId,
        result: ReconcileResult<ReconcileOutcome>,
        queue: &mut WorkQueue,
        timers: &mut JoinSet<WorkloadId>,
    ) {
        match result {
            Ok(outcome) => {
                if outcome.action.is_none() {
                    self.handle.health.forget(id).await;
                } else {
                    self.handle.health.record_success(id).await;
                }
                match outcome.requeue {
                    Requeue::Never => {}
                    Requeue::Immediately => queue.push(id.clone()),
                    Requeue::After(delay) => schedule(timers, id.clone(), delay),
                }
            }
            Err(e) => {
                let delay = self.handle.health.record_failure(id, &e.to_string()).await;
                warn!(
                    workload = %id,
                    error = %e,
                    retry_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "reconcile failed"
                );
                schedule(timers, id.clone(), delay);
            }
        }
    }
}

fn schedule(timers: &mut JoinSet<WorkloadId>, id: WorkloadId, delay: Duration) {
    timers.spawn(async move {
        tokio::time::sleep(delay).await;
        id
    });
}

/// Pending identities plus per-identity running/dirty flags.
#[derive(Debug, Default)]
struct WorkQueue {
    pending: VecDeque<WorkloadId>,
    queued: HashSet<WorkloadId>,
    slots: HashMap<WorkloadId, Slot>,
}

impl WorkQueue {
    /// Queue `id` unless it is already queued. A running `id` is marked
    /// dirty and re-queued when its pass finishes.
    fn push(&mut self, id: WorkloadId) {
        if let Some(slot) = self.slots.get_mut(&id)
            && slot.running
        {
            slot.dirty = true;
            return;
        }
        if self.queued.insert(id.clone()) {
            self.pending.push_back(id);
        }
    }

    /// Pop the next identity and mark it running.
    fn start_next(&mut self) -> Option<WorkloadId> {
        let id = self.pending.pop_front()?;
        self.queued.remove(&id);
        self.slots.entry(id.clone()).or_default().running = true;
        Some(id)
    }

    /// Mark `id` finished, re-queueing it if it was dirtied meanwhile.
    fn finish(&mut self, id: &WorkloadId) {
        if let Some(slot) = self.slots.remove(id)
            && slot.dirty
        {
            self.push(id.clone());
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> WorkloadId {
        WorkloadId::new("default", name)
    }

    #[test]
    fn push_deduplicates_pending() {
        let mut queue = WorkQueue::default();
        queue.push(id("a"));
        queue.push(id("a"));
        queue.push(id("b"));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn running_identity_is_not_started_twice() {
        let mut queue = WorkQueue::default();
        queue.push(id("a"));
        assert_eq!(queue.start_next(), Some(id("a")));

        // Re-enqueued while running: held back, not pending.
        queue.push(id("a"));
        assert_eq!(queue.start_next(), None);

        // Finishing releases the held-back pass.
        queue.finish(&id("a"));
        assert_eq!(queue.start_next(), Some(id("a")));
    }

    #[test]
    fn finish_without_dirty_does_not_requeue() {
        let mut queue = WorkQueue::default();
        queue.push(id("a"));
        queue.start_next();
        queue.finish(&id("a"));
        assert_eq!(queue.start_next(), None);
    }

    #[test]
    fn settings_from_config() {
        let settings = ControllerSettings::from_config(&LatscaleConfig::default()).unwrap();
        assert_eq!(settings.max_concurrent, 2);
        assert_eq!(settings.resync_interval, Duration::from_secs(30));
        assert_eq!(settings.max_backoff, Duration::from_secs(300));
    }

    #[tokio::test]
    async fn handle_reports_stopped_queue() {
        let (handle, rx) = ControllerHandle::channel(HealthRegistry::default());
        assert!(handle.enqueue(id("a")));
        drop(rx);
        assert!(!handle.enqueue(id("a")));
    }
}
