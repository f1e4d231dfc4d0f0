//! Control loop tests against the in-memory store.
//!
//! Each test seeds a workload (and sometimes a replica set and pods), runs
//! passes with a scripted sampler, and checks what landed in the store.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use latscale_controller::{
    Action, Controller, ControllerSettings, ReconcileError, Reconciler, ReconcilerSettings,
    Requeue,
};
use latscale_core::{
    Endpoint, EndpointSource, LabelSelector, LatencySample, LatencySampler, OwnerReference, Pod,
    PodPhase, ProbeError, REPLICA_SET_KIND, ReplicaSet, ReplicaSetGateway, StoreError, Thresholds,
    Workload, WorkloadId, WorkloadStatus, WorkloadStore,
};
use latscale_probe::HttpLatencySampler;
use latscale_state::StateStore;

/// Returns queued samples in order, then repeats the last one.
struct ScriptedSampler {
    samples: Mutex<VecDeque<Result<f64, String>>>,
}

impl ScriptedSampler {
    fn new(samples: impl IntoIterator<Item = Result<f64, String>>) -> Self {
        Self {
            samples: Mutex::new(samples.into_iter().collect()),
        }
    }

    fn fixed(value: f64) -> Self {
        Self::new([Ok(value)])
    }

    fn unreachable() -> Self {
        Self::new([Err("connection refused".to_string())])
    }
}

impl LatencySampler for ScriptedSampler {
    async fn sample(&self, endpoint: &Endpoint) -> Result<LatencySample, ProbeError> {
        let next = {
            let mut samples = self.samples.lock().unwrap();
            if samples.len() > 1 {
                samples.pop_front()
            } else {
                samples.front().cloned()
            }
        };
        match next {
            Some(Ok(value)) => Ok(LatencySample::new(value)),
            Some(Err(msg)) => Err(ProbeError::Unreachable(format!("{endpoint}: {msg}"))),
            None => Err(ProbeError::Unreachable("no samples".to_string())),
        }
    }
}

/// Which collaborator call [`FaultyCluster`] fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fault {
    GetWorkload,
    SetReplicas,
    PutStatus,
}

/// Delegates to the redb store except for one call, which always fails
/// with a backend error.
struct FaultyCluster {
    inner: StateStore,
    fault: Fault,
}

impl FaultyCluster {
    fn new(inner: &StateStore, fault: Fault) -> Self {
        Self {
            inner: inner.clone(),
            fault,
        }
    }

    fn check(&self, call: Fault) -> Result<(), StoreError> {
        if self.fault == call {
            Err(StoreError::Backend(format!("{call:?}: connection reset")))
        } else {
            Ok(())
        }
    }
}

impl WorkloadStore for FaultyCluster {
    async fn get(&self, id: &WorkloadId) -> Result<Option<Workload>, StoreError> {
        self.check(Fault::GetWorkload)?;
        WorkloadStore::get(&self.inner, id).await
    }

    async fn put_status(&self, id: &WorkloadId, status: &WorkloadStatus) -> Result<(), StoreError> {
        self.check(Fault::PutStatus)?;
        self.inner.put_status(id, status).await
    }

    async fn list(&self) -> Result<Vec<WorkloadId>, StoreError> {
        self.inner.list().await
    }
}

impl ReplicaSetGateway for FaultyCluster {
    async fn get(&self, id: &WorkloadId) -> Result<Option<ReplicaSet>, StoreError> {
        ReplicaSetGateway::get(&self.inner, id).await
    }

    async fn create(&self, owner: &Workload, replicas: u32) -> Result<ReplicaSet, StoreError> {
        self.inner.create(owner, replicas).await
    }

    async fn set_replicas(&self, id: &WorkloadId, replicas: u32) -> Result<(), StoreError> {
        self.check(Fault::SetReplicas)?;
        self.inner.set_replicas(id, replicas).await
    }

    async fn running_pods(&self, replica_set: &ReplicaSet) -> Result<u32, StoreError> {
        self.inner.running_pods(replica_set).await
    }
}

fn faulty_reconciler(
    store: &StateStore,
    fault: Fault,
    latency: f64,
) -> Reconciler<FaultyCluster, FaultyCluster, ScriptedSampler> {
    Reconciler::new(
        FaultyCluster::new(store, fault),
        FaultyCluster::new(store, fault),
        ScriptedSampler::fixed(latency),
        settings(),
    )
    .unwrap()
}

fn settings() -> ReconcilerSettings {
    ReconcilerSettings {
        thresholds: Thresholds::default(),
        endpoint: EndpointSource::fixed(&Endpoint::new("127.0.0.1", 8080)),
        scale_requeue: Duration::from_secs(5),
    }
}

fn reconciler<L: LatencySampler>(store: &StateStore, sampler: L) -> Reconciler<StateStore, StateStore, L> {
    Reconciler::new(store.clone(), store.clone(), sampler, settings()).unwrap()
}

fn seed_workload(store: &StateStore, name: &str, size: u32) -> Workload {
    store
        .put_workload(&Workload::new(WorkloadId::new("default", name), size))
        .unwrap()
}

fn seed_running_pods(store: &StateStore, workload: &str, count: u32) {
    for i in 0..count {
        store
            .put_pod(&Pod {
                namespace: "default".to_string(),
                name: format!("{workload}-{i}"),
                labels: LabelSelector::for_workload(workload).match_labels,
                phase: PodPhase::Running,
                owner: Some(OwnerReference {
                    kind: REPLICA_SET_KIND.to_string(),
                    name: workload.to_string(),
                    uid: String::new(),
                    controller: true,
                }),
            })
            .unwrap();
    }
}

fn replicas(store: &StateStore, key: &str) -> u32 {
    store.get_replica_set(key).unwrap().unwrap().replica_count
}

fn stored_latency(store: &StateStore, key: &str) -> Option<f64> {
    store.get_workload(key).unwrap().unwrap().status.latency
}

// ── Single passes ─────────────────────────────────────────────────

#[tokio::test]
async fn missing_replica_set_is_created_at_declared_size() {
    let store = StateStore::open_in_memory().unwrap();
    let workload = seed_workload(&store, "web", 3);

    let outcome = reconciler(&store, ScriptedSampler::fixed(950.0))
        .reconcile(&workload.id)
        .await
        .unwrap();

    assert_eq!(outcome.action, Some(Action::CreateReplicaSet(3)));
    assert_eq!(outcome.requeue, Requeue::Immediately);
    assert_eq!(outcome.latency, None);

    let rs = store.get_replica_set("default/web").unwrap().unwrap();
    assert_eq!(rs.replica_count, 3);
    assert!(rs.owner.is_owned_by(&workload));
    assert_eq!(stored_latency(&store, "default/web"), None);
}

#[tokio::test]
async fn high_latency_scales_up_without_touching_status() {
    let store = StateStore::open_in_memory().unwrap();
    let workload = seed_workload(&store, "web", 3);
    store.create_replica_set(&workload, 3).unwrap();

    let outcome = reconciler(&store, ScriptedSampler::fixed(950.0))
        .reconcile(&workload.id)
        .await
        .unwrap();

    assert_eq!(outcome.action, Some(Action::ScaleUp(4)));
    assert_eq!(outcome.requeue, Requeue::After(Duration::from_secs(5)));
    assert_eq!(replicas(&store, "default/web"), 4);
    assert_eq!(stored_latency(&store, "default/web"), None);
}

#[tokio::test]
async fn low_latency_scales_down_when_pods_are_running() {
    let store = StateStore::open_in_memory().unwrap();
    let workload = seed_workload(&store, "web", 3);
    store.create_replica_set(&workload, 3).unwrap();
    seed_running_pods(&store, "web", 3);

    let outcome = reconciler(&store, ScriptedSampler::fixed(150.0))
        .reconcile(&workload.id)
        .await
        .unwrap();

    assert_eq!(outcome.action, Some(Action::ScaleDown(2)));
    assert_eq!(outcome.requeue, Requeue::After(Duration::from_secs(5)));
    assert_eq!(replicas(&store, "default/web"), 2);
    assert_eq!(stored_latency(&store, "default/web"), None);
}

#[tokio::test]
async fn last_running_pod_is_kept_and_latency_recorded() {
    let store = StateStore::open_in_memory().unwrap();
    let workload = seed_workload(&store, "web", 1);
    store.create_replica_set(&workload, 1).unwrap();
    seed_running_pods(&store, "web", 1);

    let outcome = reconciler(&store, ScriptedSampler::fixed(100.0))
        .reconcile(&workload.id)
        .await
        .unwrap();

    assert_eq!(outcome.action, Some(Action::RecordStatusOnly));
    assert_eq!(outcome.requeue, Requeue::Never);
    assert_eq!(replicas(&store, "default/web"), 1);
    assert_eq!(stored_latency(&store, "default/web"), Some(100.0));
}

#[tokio::test]
async fn pending_pods_do_not_count_towards_scale_down() {
    let store = StateStore::open_in_memory().unwrap();
    let workload = seed_workload(&store, "web", 3);
    store.create_replica_set(&workload, 3).unwrap();
    seed_running_pods(&store, "web", 1);
    store
        .put_pod(&Pod {
            namespace: "default".to_string(),
            name: "web-pending".to_string(),
            labels: LabelSelector::for_workload("web").match_labels,
            phase: PodPhase::Pending,
            owner: None,
        })
        .unwrap();

    let outcome = reconciler(&store, ScriptedSampler::fixed(100.0))
        .reconcile(&workload.id)
        .await
        .unwrap();

    assert_eq!(outcome.action, Some(Action::RecordStatusOnly));
    assert_eq!(replicas(&store, "default/web"), 3);
}

#[tokio::test]
async fn unreachable_endpoint_fails_and_leaves_status_alone() {
    let store = StateStore::open_in_memory().unwrap();
    let workload = seed_workload(&store, "web", 2);
    store.create_replica_set(&workload, 2).unwrap();
    store
        .put_workload_status("default/web", &WorkloadStatus { latency: Some(420.0) })
        .unwrap();

    let err = reconciler(&store, ScriptedSampler::unreachable())
        .reconcile(&workload.id)
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::Probe(ProbeError::Unreachable(_))));
    assert_eq!(replicas(&store, "default/web"), 2);
    assert_eq!(stored_latency(&store, "default/web"), Some(420.0));
}

#[tokio::test]
async fn workload_read_failure_ends_pass_without_creating() {
    let store = StateStore::open_in_memory().unwrap();
    let workload = seed_workload(&store, "web", 3);

    let err = faulty_reconciler(&store, Fault::GetWorkload, 950.0)
        .reconcile(&workload.id)
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::Store(StoreError::Backend(_))));
    assert!(store.get_replica_set("default/web").unwrap().is_none());
    assert_eq!(stored_latency(&store, "default/web"), None);
}

#[tokio::test]
async fn replica_update_failure_writes_no_status() {
    let store = StateStore::open_in_memory().unwrap();
    let workload = seed_workload(&store, "web", 3);
    store.create_replica_set(&workload, 3).unwrap();

    let err = faulty_reconciler(&store, Fault::SetReplicas, 950.0)
        .reconcile(&workload.id)
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::Store(StoreError::Backend(_))));
    assert_eq!(replicas(&store, "default/web"), 3);
    assert_eq!(stored_latency(&store, "default/web"), None);
}

#[tokio::test]
async fn status_write_failure_is_surfaced() {
    let store = StateStore::open_in_memory().unwrap();
    let workload = seed_workload(&store, "web", 2);
    store.create_replica_set(&workload, 2).unwrap();

    let err = faulty_reconciler(&store, Fault::PutStatus, 500.0)
        .reconcile(&workload.id)
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::Store(StoreError::Backend(_))));
    assert_eq!(replicas(&store, "default/web"), 2);
    assert_eq!(stored_latency(&store, "default/web"), None);
}

#[tokio::test]
async fn store_failures_back_off_in_the_driver() {
    let store = StateStore::open_in_memory().unwrap();
    let workload = seed_workload(&store, "web", 2);
    store.create_replica_set(&workload, 2).unwrap();

    let controller = Controller::new(faulty_reconciler(&store, Fault::PutStatus, 500.0), fast_settings());
    let handle = controller.handle();
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let task = tokio::spawn(controller.run(shutdown_rx));

    handle.enqueue(workload.id.clone());
    tokio::time::timeout(Duration::from_secs(5), async {
        while handle.health().is_healthy().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("store failure never reached the health registry");

    let snapshot = handle.health().snapshot().await;
    assert!(snapshot[0].last_error.as_deref().unwrap().contains("connection reset"));

    shutdown_tx.send(true).unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn zero_size_workload_gets_an_empty_replica_set() {
    let store = StateStore::open_in_memory().unwrap();
    let workload = seed_workload(&store, "idle", 0);
    let reconciler = reconciler(&store, ScriptedSampler::fixed(100.0));

    let created = reconciler.reconcile(&workload.id).await.unwrap();
    assert_eq!(created.action, Some(Action::CreateReplicaSet(0)));

    let settled = reconciler.reconcile(&workload.id).await.unwrap();
    assert_eq!(settled.action, Some(Action::RecordStatusOnly));
    assert_eq!(replicas(&store, "default/idle"), 0);
}

#[tokio::test]
async fn deleted_workload_is_not_requeued() {
    let store = StateStore::open_in_memory().unwrap();

    let outcome = reconciler(&store, ScriptedSampler::fixed(100.0))
        .reconcile(&WorkloadId::new("default", "gone"))
        .await
        .unwrap();

    assert_eq!(outcome.action, None);
    assert_eq!(outcome.requeue, Requeue::Never);
    assert!(store.list_replica_sets().unwrap().is_empty());
}

#[tokio::test]
async fn repeated_in_band_passes_are_idempotent() {
    let store = StateStore::open_in_memory().unwrap();
    let workload = seed_workload(&store, "web", 2);
    store.create_replica_set(&workload, 2).unwrap();
    let reconciler = reconciler(&store, ScriptedSampler::fixed(500.0));

    let first = reconciler.reconcile(&workload.id).await.unwrap();
    let after_first = store.get_workload("default/web").unwrap().unwrap();
    let second = reconciler.reconcile(&workload.id).await.unwrap();
    let after_second = store.get_workload("default/web").unwrap().unwrap();

    assert_eq!(first, second);
    assert_eq!(after_first.status, after_second.status);
    assert_eq!(after_second.status.latency, Some(500.0));
    assert_eq!(replicas(&store, "default/web"), 2);
}

#[tokio::test]
async fn scale_up_then_settle() {
    let store = StateStore::open_in_memory().unwrap();
    let workload = seed_workload(&store, "web", 1);
    let reconciler = reconciler(
        &store,
        ScriptedSampler::new([Ok(1200.0), Ok(1000.0), Ok(450.0)]),
    );

    // Create, then the sampler drives two scale-ups before settling.
    let mut actions = Vec::new();
    for _ in 0..4 {
        actions.push(reconciler.reconcile(&workload.id).await.unwrap().action);
    }

    assert_eq!(
        actions,
        vec![
            Some(Action::CreateReplicaSet(1)),
            Some(Action::ScaleUp(2)),
            Some(Action::ScaleUp(3)),
            Some(Action::RecordStatusOnly),
        ]
    );
    assert_eq!(replicas(&store, "default/web"), 3);
    assert_eq!(stored_latency(&store, "default/web"), Some(450.0));
}

#[tokio::test]
async fn endpoint_resolution_failure_fails_the_pass() {
    let store = StateStore::open_in_memory().unwrap();
    let workload = seed_workload(&store, "web", 2);
    store.create_replica_set(&workload, 2).unwrap();

    let mut settings = settings();
    settings.endpoint = EndpointSource {
        host_env: "LATSCALE_TEST_UNSET_HOST".to_string(),
        port_env: "LATSCALE_TEST_UNSET_PORT".to_string(),
        ..EndpointSource::default()
    };
    let reconciler =
        Reconciler::new(store.clone(), store.clone(), ScriptedSampler::fixed(1.0), settings).unwrap();

    let err = reconciler.reconcile(&workload.id).await.unwrap_err();
    assert!(matches!(err, ReconcileError::Probe(_)));
}

#[tokio::test]
async fn http_sampler_drives_a_pass() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                    .await;
                let _ = socket.shutdown().await;
            });
        }
    });

    let store = StateStore::open_in_memory().unwrap();
    let workload = seed_workload(&store, "web", 2);
    store.create_replica_set(&workload, 2).unwrap();

    let mut settings = settings();
    // A loopback round trip sits well inside this band.
    settings.thresholds = Thresholds {
        scale_up: 5000.0,
        scale_down: 0.0,
    };
    settings.endpoint = EndpointSource::fixed(&Endpoint::new("127.0.0.1", port));
    let reconciler = Reconciler::new(
        store.clone(),
        store.clone(),
        HttpLatencySampler::new(Duration::from_secs(5)),
        settings,
    )
    .unwrap();

    let outcome = reconciler.reconcile(&workload.id).await.unwrap();
    assert_eq!(outcome.action, Some(Action::RecordStatusOnly));
    let latency = stored_latency(&store, "default/web").unwrap();
    assert!(latency >= 0.0 && latency < 5000.0);
}

// ── Driver ────────────────────────────────────────────────────────

fn fast_settings() -> ControllerSettings {
    ControllerSettings {
        max_concurrent: 2,
        resync_interval: Duration::from_secs(3600),
        error_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(40),
        unhealthy_after: 2,
    }
}

async fn wait_for<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn driver_creates_then_records_status() {
    let store = StateStore::open_in_memory().unwrap();
    let workload = seed_workload(&store, "web", 2);

    let controller = Controller::new(reconciler(&store, ScriptedSampler::fixed(300.0)), fast_settings());
    let handle = controller.handle();
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let task = tokio::spawn(controller.run(shutdown_rx));

    assert!(handle.enqueue(workload.id.clone()));
    wait_for(|| store.get_workload("default/web").unwrap().unwrap().status.latency == Some(300.0)).await;
    assert_eq!(replicas(&store, "default/web"), 2);
    assert!(handle.health().is_healthy().await);

    shutdown_tx.send(true).unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn driver_resync_picks_up_every_workload() {
    let store = StateStore::open_in_memory().unwrap();
    for name in ["a", "b", "c"] {
        seed_workload(&store, name, 1);
    }

    let controller = Controller::new(reconciler(&store, ScriptedSampler::fixed(300.0)), fast_settings());
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let task = tokio::spawn(controller.run(shutdown_rx));

    // The first resync tick fires at startup.
    wait_for(|| store.list_replica_sets().unwrap().len() == 3).await;

    shutdown_tx.send(true).unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn driver_backs_off_and_reports_unhealthy() {
    let store = StateStore::open_in_memory().unwrap();
    let workload = seed_workload(&store, "web", 2);
    store.create_replica_set(&workload, 2).unwrap();

    let controller = Controller::new(reconciler(&store, ScriptedSampler::unreachable()), fast_settings());
    let handle = controller.handle();
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let task = tokio::spawn(controller.run(shutdown_rx));

    handle.enqueue(workload.id.clone());
    tokio::time::timeout(Duration::from_secs(5), async {
        while handle.health().is_healthy().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("workload never marked unhealthy");

    let snapshot = handle.health().snapshot().await;
    assert_eq!(snapshot[0].workload, "default/web");
    assert!(snapshot[0].last_error.as_deref().unwrap().contains("unreachable"));
    assert_eq!(stored_latency(&store, "default/web"), None);

    shutdown_tx.send(true).unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn driver_stops_when_shutdown_sender_drops() {
    let store = StateStore::open_in_memory().unwrap();
    let controller = Controller::new(reconciler(&store, ScriptedSampler::fixed(300.0)), fast_settings());
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let task = tokio::spawn(controller.run(shutdown_rx));

    drop(shutdown_tx);
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("controller did not stop")
        .unwrap();
}
