//! Health check infrastructure for the controller
//!
//! Tracks component health for Kubernetes liveness and readiness probes.
//! The controller becomes ready once its first evaluation cycle completes,
//! and reports itself unhealthy when cycles stop completing.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Health status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    /// Component is functioning normally
    Healthy,
    /// Component is failing but the controller keeps retrying
    Degraded,
    /// Component has stopped working
    Unhealthy,
}

impl ComponentStatus {
    pub fn is_operational(&self) -> bool {
        matches!(self, ComponentStatus::Healthy | ComponentStatus::Degraded)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    fn with_status(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            last_check_timestamp: Utc::now().timestamp(),
        }
    }

    pub fn healthy() -> Self {
        Self::with_status(ComponentStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Unhealthy, Some(message.into()))
    }
}

/// Overall health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_evaluation_timestamp: Option<i64>,
}

impl HealthResponse {
    /// Worst status across all components
    pub fn compute_status(components: &HashMap<String, ComponentHealth>) -> ComponentStatus {
        components
            .values()
            .map(|health| health.status)
            .fold(ComponentStatus::Healthy, |worst, status| match (worst, status) {
                (ComponentStatus::Unhealthy, _) | (_, ComponentStatus::Unhealthy) => {
                    ComponentStatus::Unhealthy
                }
                (ComponentStatus::Degraded, _) | (_, ComponentStatus::Degraded) => {
                    ComponentStatus::Degraded
                }
                _ => ComponentStatus::Healthy,
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names for health tracking
pub mod components {
    pub const EVALUATOR: &str = "evaluator";
    pub const CLUSTER_API: &str = "cluster_api";
}

#[derive(Debug, Default)]
struct HealthState {
    components: HashMap<String, ComponentHealth>,
    last_cycle: Option<DateTime<Utc>>,
}

/// Shared health registry; clones refer to the same state
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    state: Arc<RwLock<HealthState>>,
    /// How long without a completed cycle before the evaluator is unhealthy
    stale_after: Option<Duration>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(HealthState::default())),
            stale_after: None,
        }
    }

    /// Report the evaluator unhealthy once no cycle has completed for `stale_after`
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = Some(stale_after);
        self
    }

    /// Register a component with initial healthy status
    pub async fn register(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn update(&self, name: &str, health: ComponentHealth) {
        let mut state = self.state.write().await;
        state.components.insert(name.to_string(), health);
    }

    pub async fn set_healthy(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::degraded(message)).await;
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::unhealthy(message)).await;
    }

    /// Record that an evaluation cycle finished (successfully or not)
    pub async fn record_cycle(&self, at: DateTime<Utc>) {
        let mut state = self.state.write().await;
        state.last_cycle = Some(at);
    }

    pub async fn last_cycle(&self) -> Option<DateTime<Utc>> {
        self.state.read().await.last_cycle
    }

    /// Health as of now
    pub async fn health(&self) -> HealthResponse {
        self.health_at(Utc::now()).await
    }

    /// Health as of `now`, marking the evaluator unhealthy if cycles are stale
    pub async fn health_at(&self, now: DateTime<Utc>) -> HealthResponse {
        let state = self.state.read().await;
        let mut components = state.components.clone();

        if let (Some(stale_after), Some(last)) = (self.stale_after, state.last_cycle) {
            let idle = now - last;
            if idle > stale_after {
                components.insert(
                    components::EVALUATOR.to_string(),
                    ComponentHealth::unhealthy(format!(
                        "no evaluation cycle completed for {}s",
                        idle.num_seconds()
                    )),
                );
            }
        }

        HealthResponse {
            status: HealthResponse::compute_status(&components),
            components,
            last_evaluation_timestamp: state.last_cycle.map(|t| t.timestamp()),
        }
    }

    /// Ready once a cycle has completed and nothing is unhealthy
    pub async fn readiness(&self) -> ReadinessResponse {
        let completed = self.last_cycle().await.is_some();
        let health = self.health().await;

        if !completed {
            ReadinessResponse {
                ready: false,
                reason: Some("No evaluation cycle completed yet".to_string()),
            }
        } else if !health.status.is_operational() {
            ReadinessResponse {
                ready: false,
                reason: Some("Critical component unhealthy".to_string()),
            }
        } else {
            ReadinessResponse {
                ready: true,
                reason: None,
            }
        }
    }
}
