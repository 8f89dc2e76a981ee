//! Core data models for the quarantine controller

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Utilization of a single node for one evaluation cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeUtilization {
    pub name: String,
    /// Highest request/allocatable ratio across CPU and memory
    pub max_utilization: f64,
}

impl NodeUtilization {
    pub fn new(name: impl Into<String>, max_utilization: f64) -> Self {
        Self {
            name: name.into(),
            max_utilization,
        }
    }
}

/// CPU and memory amounts reported for a node.
/// `None` means the cluster did not report that dimension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceAmounts {
    pub cpu_cores: Option<f64>,
    pub memory_bytes: Option<f64>,
}

/// Node as seen by the controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub name: String,
    pub created_at: DateTime<Utc>,
    /// Ready condition is true and the node is running
    pub ready: bool,
    /// Node is already cordoned
    pub unschedulable: bool,
    pub allocatable: ResourceAmounts,
    pub capacity: ResourceAmounts,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// Resource requests of a single container
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerRequests {
    pub cpu_cores: Option<f64>,
    pub memory_bytes: Option<f64>,
}

/// Pod scheduled to a node, reduced to its container requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodRequests {
    pub name: String,
    pub namespace: String,
    pub containers: Vec<ContainerRequests>,
}
