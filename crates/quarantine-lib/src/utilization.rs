//! Node utilization from pod resource requests
//!
//! Utilization is computed from what pods *request*, not from live usage,
//! so it reflects what the scheduler believes is taken on the node. This is
//! slightly more conservative than the cluster autoscaler, which ignores
//! daemonset and mirror pods.

use crate::models::{NodeInfo, NodeUtilization, PodRequests};

/// Utilization reported when no dimension can be measured.
/// A node we cannot measure must never look idle.
pub const UNMEASURABLE_UTILIZATION: f64 = 1.0;

/// Total requests summed over every container of every pod
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RequestTotals {
    pub cpu_cores: f64,
    pub memory_bytes: f64,
}

impl RequestTotals {
    /// Sum requests across pods; a missing request counts as zero
    pub fn from_pods(pods: &[PodRequests]) -> Self {
        pods.iter()
            .flat_map(|pod| pod.containers.iter())
            .fold(Self::default(), |mut totals, container| {
                totals.cpu_cores += container.cpu_cores.unwrap_or(0.0);
                totals.memory_bytes += container.memory_bytes.unwrap_or(0.0);
                totals
            })
    }
}

/// Compute the maximum CPU/memory utilization of a node.
///
/// Each dimension is `requested / allocatable`. A dimension whose allocatable
/// amount is missing or not positive is skipped; if allocatable is missing but
/// capacity was reported, capacity is used instead. When no dimension can be
/// computed the result is [`UNMEASURABLE_UTILIZATION`].
pub fn compute(node: &NodeInfo, pods: &[PodRequests]) -> NodeUtilization {
    let totals = RequestTotals::from_pods(pods);

    let cpu = ratio(
        totals.cpu_cores,
        node.allocatable.cpu_cores.or(node.capacity.cpu_cores),
    );
    let memory = ratio(
        totals.memory_bytes,
        node.allocatable.memory_bytes.or(node.capacity.memory_bytes),
    );

    let max_utilization = match (cpu, memory) {
        (Some(cpu), Some(memory)) => cpu.max(memory),
        (Some(only), None) | (None, Some(only)) => only,
        (None, None) => UNMEASURABLE_UTILIZATION,
    };

    NodeUtilization::new(node.name.clone(), max_utilization)
}

fn ratio(requested: f64, available: Option<f64>) -> Option<f64> {
    match available {
        Some(available) if available > 0.0 => Some(requested / available),
        _ => None,
    }
}
