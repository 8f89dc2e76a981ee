//! Library for the node-quarantine controller
//!
//! This crate provides the core functionality for:
//! - Computing node utilization from pod resource requests
//! - Filtering nodes that must never be cordoned
//! - Tracking persistently underutilized nodes and picking a cordon candidate
//! - Talking to the Kubernetes API and driving the evaluation loop
//! - Health checks and observability

pub mod api;
pub mod cluster;
pub mod controller;
pub mod error;
pub mod filter;
pub mod health;
pub mod models;
pub mod observability;
pub mod tracker;
pub mod utilization;

pub use error::{QuarantineError, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ControllerMetrics, StructuredLogger};
pub use tracker::{TrackedNode, UnderutilizationTracker};
