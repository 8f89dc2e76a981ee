//! Observability infrastructure for the controller
//!
//! Provides:
//! - Prometheus metrics (evaluation latency, tracked nodes, per-node utilization, cordons)
//! - Structured JSON logging with tracing

use crate::models::NodeUtilization;
use crate::tracker::TrackedNode;
use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_gauge, GaugeVec,
    Histogram, IntCounter, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for a full evaluation cycle, which is dominated by API calls (seconds)
const EVALUATION_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

static GLOBAL_METRICS: OnceLock<ControllerMetricsInner> = OnceLock::new();

struct ControllerMetricsInner {
    evaluation_latency_seconds: Histogram,
    tracked_nodes: IntGauge,
    eligible_nodes: IntGauge,
    node_utilization: GaugeVec,
    cordons: IntCounter,
    dry_run_cordons: IntCounter,
    evaluations_skipped: IntCounter,
    evaluation_errors: IntCounter,
}

impl ControllerMetricsInner {
    fn new() -> Self {
        Self {
            evaluation_latency_seconds: register_histogram!(
                "node_quarantine_evaluation_latency_seconds",
                "Time spent on one evaluation cycle",
                EVALUATION_BUCKETS.to_vec()
            )
            .expect("Failed to register evaluation_latency_seconds"),

            tracked_nodes: register_int_gauge!(
                "node_quarantine_tracked_nodes",
                "Number of nodes currently tracked as underutilized"
            )
            .expect("Failed to register tracked_nodes"),

            eligible_nodes: register_int_gauge!(
                "node_quarantine_eligible_nodes",
                "Number of tracked nodes underutilized long enough to be cordoned"
            )
            .expect("Failed to register eligible_nodes"),

            node_utilization: register_gauge_vec!(
                "node_quarantine_node_utilization_ratio",
                "Maximum of CPU and memory requests over allocatable, per node",
                &["node"]
            )
            .expect("Failed to register node_utilization"),

            cordons: register_int_counter!(
                "node_quarantine_cordons_total",
                "Total number of nodes cordoned"
            )
            .expect("Failed to register cordons"),

            dry_run_cordons: register_int_counter!(
                "node_quarantine_dry_run_cordons_total",
                "Total number of cordons skipped because of dry run"
            )
            .expect("Failed to register dry_run_cordons"),

            evaluations_skipped: register_int_counter!(
                "node_quarantine_evaluations_skipped_total",
                "Evaluations skipped because the cluster is at its minimum size"
            )
            .expect("Failed to register evaluations_skipped"),

            evaluation_errors: register_int_counter!(
                "node_quarantine_evaluation_errors_total",
                "Evaluation cycles that failed with an error"
            )
            .expect("Failed to register evaluation_errors"),
        }
    }
}

/// Handle to the process-wide controller metrics.
/// Clones share the same underlying Prometheus collectors.
#[derive(Clone)]
pub struct ControllerMetrics {
    _private: (),
}

impl Default for ControllerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ControllerMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ControllerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ControllerMetricsInner {
        GLOBAL_METRICS.get_or_init(ControllerMetricsInner::new)
    }

    pub fn observe_evaluation_latency(&self, duration_secs: f64) {
        self.inner().evaluation_latency_seconds.observe(duration_secs);
    }

    /// Replace the per-node utilization series with this cycle's snapshot
    pub fn set_utilizations(&self, snapshot: &[NodeUtilization]) {
        let gauge = &self.inner().node_utilization;
        gauge.reset();
        for util in snapshot {
            gauge
                .with_label_values(&[util.name.as_str()])
                .set(util.max_utilization);
        }
    }

    pub fn set_tracked(&self, tracked: usize, eligible: usize) {
        self.inner().tracked_nodes.set(tracked as i64);
        self.inner().eligible_nodes.set(eligible as i64);
    }

    pub fn inc_cordons(&self, dry_run: bool) {
        if dry_run {
            self.inner().dry_run_cordons.inc();
        } else {
            self.inner().cordons.inc();
        }
    }

    pub fn inc_evaluations_skipped(&self) {
        self.inner().evaluations_skipped.inc();
    }

    pub fn inc_evaluation_errors(&self) {
        self.inner().evaluation_errors.inc();
    }
}

/// Structured logger for controller events
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_startup(&self, version: &str, label_selector: &str, threshold: f64, dry_run: bool) {
        info!(
            event = "controller_started",
            instance = %self.instance,
            version = %version,
            node_labels = %label_selector,
            utilization_threshold = threshold,
            dry_run = dry_run,
            "Node quarantine controller started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "controller_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Node quarantine controller shutting down"
        );
    }

    /// One line per node with its utilization as a percentage
    pub fn log_utilizations(&self, snapshot: &[NodeUtilization]) {
        for util in snapshot {
            info!(
                event = "node_utilization",
                instance = %self.instance,
                node = %util.name,
                utilization_percent = (util.max_utilization * 100.0).round(),
                "Computed node utilization"
            );
        }
    }

    pub fn log_evaluation_skipped(&self, node_count: usize, min_nodes: usize) {
        info!(
            event = "evaluation_skipped",
            instance = %self.instance,
            node_count = node_count,
            min_nodes = min_nodes,
            "Node count at minimum, skipping evaluation"
        );
    }

    pub fn log_cordon(&self, node: &TrackedNode, dry_run: bool) {
        if dry_run {
            info!(
                event = "cordon_dry_run",
                instance = %self.instance,
                node = %node.name,
                utilization = node.utilization,
                underutilized_since = %node.since.to_rfc3339(),
                "DRY RUN - would have cordoned node"
            );
        } else {
            info!(
                event = "node_cordoned",
                instance = %self.instance,
                node = %node.name,
                utilization = node.utilization,
                underutilized_since = %node.since.to_rfc3339(),
                "Cordoned underutilized node"
            );
        }
    }

    pub fn log_evaluation_error(&self, error: &dyn std::error::Error) {
        warn!(
            event = "evaluation_failed",
            instance = %self.instance,
            error = %error,
            "Evaluation cycle failed, backing off"
        );
    }
}
