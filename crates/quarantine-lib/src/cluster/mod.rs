//! Cluster access
//!
//! The controller only needs three things from the cluster: the current
//! node list, the pods bound to each node, and a way to cordon a node.
//! [`NodeClient`] is that seam; [`KubeNodeClient`] implements it against the
//! Kubernetes API.

mod kube_client;
pub mod quantity;

pub use kube_client::{node_info, pod_requests, KubeNodeClient};
pub use quantity::parse_quantity;

use crate::error::Result;
use crate::models::{NodeInfo, PodRequests};
use async_trait::async_trait;

/// Trait for cluster node operations
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// List nodes matching the configured label selector
    async fn list_nodes(&self) -> Result<Vec<NodeInfo>>;

    /// List the non-terminated pods bound to a node
    async fn list_pods_on_node(&self, node_name: &str) -> Result<Vec<PodRequests>>;

    /// Mark a node unschedulable
    async fn cordon_node(&self, node_name: &str) -> Result<()>;
}
