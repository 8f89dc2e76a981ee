//! Evaluation loop
//!
//! Runs one evaluation cycle at a time: list nodes, filter them, compute
//! utilization, update the tracker, and cordon the selected candidate.
//! The loop then sleeps for the evaluation period, the cordon backoff, or
//! the error backoff depending on how the cycle ended.

use crate::cluster::NodeClient;
use crate::error::Result;
use crate::filter;
use crate::health::{components, HealthRegistry};
use crate::observability::{ControllerMetrics, StructuredLogger};
use crate::tracker::UnderutilizationTracker;
use crate::utilization;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// Settings for the evaluation loop
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Utilization below which a node counts as underutilized (fraction)
    pub utilization_threshold: f64,
    /// How long a node must stay underutilized before it may be cordoned
    pub unused_age: Duration,
    /// Evaluation is skipped when the filtered node count is at or below this
    pub min_nodes: usize,
    /// Sleep between ordinary evaluations
    pub evaluation_period: Duration,
    /// Sleep after a failed evaluation
    pub error_backoff: Duration,
    /// Sleep after cordoning a node
    pub cordon_backoff: Duration,
    /// Report cordons without patching nodes
    pub dry_run: bool,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            utilization_threshold: 0.5,
            unused_age: Duration::from_secs(600),
            min_nodes: 5,
            evaluation_period: Duration::from_secs(30),
            error_backoff: Duration::from_secs(300),
            cordon_backoff: Duration::from_secs(120),
            dry_run: false,
        }
    }
}

impl ControllerSettings {
    /// How long to wait before the next cycle given how this one ended
    pub fn delay_after(&self, result: &Result<EvaluationOutcome>) -> Duration {
        match result {
            Err(_) => self.error_backoff,
            Ok(EvaluationOutcome::Cordoned { .. }) => self.cordon_backoff,
            Ok(_) => self.evaluation_period,
        }
    }
}

/// How an evaluation cycle ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvaluationOutcome {
    /// Too few nodes to consider shrinking
    Skipped { node_count: usize },
    /// No node has been underutilized long enough
    NoCandidate,
    /// A node was cordoned (or would have been, in dry run)
    Cordoned { node: String },
}

/// Sequential evaluation loop; owns the tracker exclusively
pub struct EvaluationLoop {
    client: Arc<dyn NodeClient>,
    tracker: UnderutilizationTracker,
    settings: ControllerSettings,
    health: HealthRegistry,
    metrics: ControllerMetrics,
    logger: StructuredLogger,
}

impl EvaluationLoop {
    pub fn new(
        client: Arc<dyn NodeClient>,
        settings: ControllerSettings,
        health: HealthRegistry,
        metrics: ControllerMetrics,
        logger: StructuredLogger,
    ) -> Self {
        let unused_age = chrono::Duration::from_std(settings.unused_age)
            .unwrap_or_else(|_| chrono::Duration::max_value());
        let tracker = UnderutilizationTracker::new(settings.utilization_threshold, unused_age);

        Self {
            client,
            tracker,
            settings,
            health,
            metrics,
            logger,
        }
    }

    pub fn tracker(&self) -> &UnderutilizationTracker {
        &self.tracker
    }

    /// Run cycles until a shutdown signal is received
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            evaluation_period_secs = self.settings.evaluation_period.as_secs(),
            dry_run = self.settings.dry_run,
            "Starting evaluation loop"
        );

        loop {
            let delay = self.run_cycle().await;

            tokio::select! {
                _ = sleep(delay) => {}
                _ = shutdown.recv() => {
                    info!("Shutting down evaluation loop");
                    break;
                }
            }
        }
    }

    /// Run one cycle, record its health and metrics, and return the delay
    /// before the next one
    pub async fn run_cycle(&mut self) -> Duration {
        debug!("Begin evaluation cycle");
        let start = Instant::now();
        let now = Utc::now();

        let result = self.evaluate(now).await;

        self.metrics
            .observe_evaluation_latency(start.elapsed().as_secs_f64());
        self.health.record_cycle(now).await;

        match &result {
            Ok(outcome) => {
                self.health.set_healthy(components::CLUSTER_API).await;
                self.health.set_healthy(components::EVALUATOR).await;
                match outcome {
                    EvaluationOutcome::Cordoned { node } => info!(node = %node, "Did cordon node"),
                    _ => info!("Did not cordon any node"),
                }
            }
            Err(e) => {
                self.metrics.inc_evaluation_errors();
                self.logger.log_evaluation_error(e);
                self.health
                    .set_degraded(components::CLUSTER_API, e.to_string())
                    .await;
            }
        }

        self.settings.delay_after(&result)
    }

    /// Evaluate the cluster as of `now`
    pub async fn evaluate(&mut self, now: DateTime<Utc>) -> Result<EvaluationOutcome> {
        let nodes = filter::filter(self.client.list_nodes().await?, now);

        if nodes.len() <= self.settings.min_nodes {
            self.logger
                .log_evaluation_skipped(nodes.len(), self.settings.min_nodes);
            self.metrics.inc_evaluations_skipped();
            return Ok(EvaluationOutcome::Skipped {
                node_count: nodes.len(),
            });
        }

        let mut snapshot = Vec::with_capacity(nodes.len());
        for node in &nodes {
            match self.client.list_pods_on_node(&node.name).await {
                Ok(pods) => snapshot.push(utilization::compute(node, &pods)),
                Err(e) => warn!(
                    node = %node.name,
                    error = %e,
                    "Failed to list pods on node, leaving it out of this cycle"
                ),
            }
        }

        self.logger.log_utilizations(&snapshot);
        self.metrics.set_utilizations(&snapshot);

        self.tracker.update(&snapshot, now);
        self.metrics
            .set_tracked(self.tracker.len(), self.tracker.eligible(now).count());

        let Some(candidate) = self.tracker.select_candidate(now) else {
            return Ok(EvaluationOutcome::NoCandidate);
        };

        if !self.settings.dry_run {
            self.client.cordon_node(&candidate).await?;
        }

        if let Some(tracked) = self.tracker.get(&candidate) {
            self.logger.log_cordon(tracked, self.settings.dry_run);
        }
        self.metrics.inc_cordons(self.settings.dry_run);
        self.tracker.acknowledge(&candidate);

        Ok(EvaluationOutcome::Cordoned { node: candidate })
    }
}
