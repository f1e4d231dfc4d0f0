//! Prometheus text exposition format.
//!
//! Renders the stored workloads, their replica sets, and the controller's
//! failure counters as gauges with a `workload` label.

use latscale_controller::WorkloadHealth;
use latscale_core::{ReplicaSet, Workload};

/// Render the current state into Prometheus text format.
///
/// Workloads that have never recorded a latency are omitted from
/// `latscale_workload_latency_ms`.
pub fn render_prometheus(
    workloads: &[Workload],
    replica_sets: &[ReplicaSet],
    health: &[WorkloadHealth],
) -> String {
    let mut out = String::new();

    out.push_str("# HELP latscale_workload_latency_ms Last recorded probe latency in milliseconds.\n");
    out.push_str("# TYPE latscale_workload_latency_ms gauge\n");
    for w in workloads {
        if let Some(latency) = w.status.latency {
            out.push_str(&format!(
                "latscale_workload_latency_ms{{workload=\"{}\"}} {:.2}\n",
                w.id, latency
            ));
        }
    }

    out.push_str("# HELP latscale_replicaset_replicas Declared replica count.\n");
    out.push_str("# TYPE latscale_replicaset_replicas gauge\n");
    for rs in replica_sets {
        out.push_str(&format!(
            "latscale_replicaset_replicas{{workload=\"{}\"}} {}\n",
            rs.id, rs.replica_count
        ));
    }

    out.push_str("# HELP latscale_reconcile_failures Consecutive failed reconcile passes.\n");
    out.push_str("# TYPE latscale_reconcile_failures gauge\n");
    for h in health {
        out.push_str(&format!(
            "latscale_reconcile_failures{{workload=\"{}\"}} {}\n",
            h.workload, h.consecutive_failures
        ));
    }

    out
}
