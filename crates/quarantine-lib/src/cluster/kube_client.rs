//! Kubernetes-backed node client

use super::{parse_quantity, NodeClient};
use crate::error::{QuarantineError, Result};
use crate::models::{ContainerRequests, NodeInfo, PodRequests, ResourceAmounts};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{Node, Pod};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::{ListParams, Patch, PatchParams};
use kube::{Api, Client};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Node client that talks to the Kubernetes API server
pub struct KubeNodeClient {
    nodes: Api<Node>,
    pods: Api<Pod>,
    label_selector: String,
}

impl KubeNodeClient {
    /// Create a client restricted to nodes matching `label_selector`
    /// (an empty selector matches every node)
    pub fn new(client: Client, label_selector: impl Into<String>) -> Self {
        Self {
            nodes: Api::all(client.clone()),
            pods: Api::all(client),
            label_selector: label_selector.into(),
        }
    }
}

#[async_trait]
impl NodeClient for KubeNodeClient {
    async fn list_nodes(&self) -> Result<Vec<NodeInfo>> {
        let mut params = ListParams::default();
        if !self.label_selector.is_empty() {
            params = params.labels(&self.label_selector);
        }

        let list = self.nodes.list(&params).await?;
        debug!(count = list.items.len(), selector = %self.label_selector, "Listed nodes");

        list.items.iter().map(node_info).collect()
    }

    async fn list_pods_on_node(&self, node_name: &str) -> Result<Vec<PodRequests>> {
        let params = ListParams::default().fields(&format!("spec.nodeName={}", node_name));
        let list = self.pods.list(&params).await?;

        list.items
            .iter()
            .filter(|pod| !is_terminated(pod))
            .map(pod_requests)
            .collect()
    }

    async fn cordon_node(&self, node_name: &str) -> Result<()> {
        let patch = json!({ "spec": { "unschedulable": true } });
        self.nodes
            .patch(node_name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;

        info!(node = %node_name, "Patched node unschedulable");
        Ok(())
    }
}

/// Convert a Kubernetes node into the controller's view of it
pub fn node_info(node: &Node) -> Result<NodeInfo> {
    let name = node
        .metadata
        .name
        .clone()
        .ok_or(QuarantineError::MissingName)?;

    // A node without a creation time is treated as brand new
    let created_at = node
        .metadata
        .creation_timestamp
        .as_ref()
        .map(|t| t.0)
        .unwrap_or(DateTime::<Utc>::MAX_UTC);

    let status = node.status.as_ref();
    let ready_condition = status
        .and_then(|s| s.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
        .unwrap_or(false);
    let terminated = status
        .and_then(|s| s.phase.as_deref())
        .map(|phase| phase == "Terminated")
        .unwrap_or(false);

    Ok(NodeInfo {
        name,
        created_at,
        ready: ready_condition && !terminated,
        unschedulable: node
            .spec
            .as_ref()
            .and_then(|s| s.unschedulable)
            .unwrap_or(false),
        allocatable: amounts(status.and_then(|s| s.allocatable.as_ref()))?,
        capacity: amounts(status.and_then(|s| s.capacity.as_ref()))?,
        labels: node.metadata.labels.clone().unwrap_or_default(),
    })
}

/// Reduce a pod to the resource requests of its containers
pub fn pod_requests(pod: &Pod) -> Result<PodRequests> {
    let containers = match pod.spec.as_ref() {
        Some(spec) => spec
            .containers
            .iter()
            .map(|c| {
                let requests = c.resources.as_ref().and_then(|r| r.requests.as_ref());
                Ok(ContainerRequests {
                    cpu_cores: lookup(requests, "cpu")?,
                    memory_bytes: lookup(requests, "memory")?,
                })
            })
            .collect::<Result<Vec<_>>>()?,
        None => Vec::new(),
    };

    Ok(PodRequests {
        name: pod.metadata.name.clone().unwrap_or_default(),
        namespace: pod.metadata.namespace.clone().unwrap_or_default(),
        containers,
    })
}

/// Succeeded and failed pods no longer hold their requests
fn is_terminated(pod: &Pod) -> bool {
    matches!(
        pod.status.as_ref().and_then(|s| s.phase.as_deref()),
        Some("Succeeded") | Some("Failed")
    )
}

fn amounts(resources: Option<&BTreeMap<String, Quantity>>) -> Result<ResourceAmounts> {
    Ok(ResourceAmounts {
        cpu_cores: lookup(resources, "cpu")?,
        memory_bytes: lookup(resources, "memory")?,
    })
}

fn lookup(resources: Option<&BTreeMap<String, Quantity>>, key: &str) -> Result<Option<f64>> {
    resources
        .and_then(|r| r.get(key))
        .map(|q| parse_quantity(&q.0))
        .transpose()
}
