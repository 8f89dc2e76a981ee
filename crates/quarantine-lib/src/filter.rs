//! Node eligibility filter
//!
//! Removes nodes that must never be considered for cordoning: nodes that are
//! not ready, nodes already out of rotation, and nodes too new to have had
//! pods scheduled onto them.

use crate::models::NodeInfo;
use chrono::{DateTime, Duration, Utc};
use tracing::debug;

/// How long a freshly created node is ignored
pub const NEW_NODE_GRACE_SECS: i64 = 5 * 60;

/// Why a node was excluded from evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exclusion {
    NotReady,
    Unschedulable,
    TooNew,
}

impl Exclusion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Exclusion::NotReady => "not_ready",
            Exclusion::Unschedulable => "unschedulable",
            Exclusion::TooNew => "created_within_grace_window",
        }
    }
}

/// First reason a node must be skipped this cycle, if any
pub fn exclusion(node: &NodeInfo, now: DateTime<Utc>) -> Option<Exclusion> {
    if !node.ready {
        Some(Exclusion::NotReady)
    } else if node.unschedulable {
        Some(Exclusion::Unschedulable)
    } else if node.created_at > now - Duration::seconds(NEW_NODE_GRACE_SECS) {
        Some(Exclusion::TooNew)
    } else {
        None
    }
}

/// Keep only nodes that may be evaluated, preserving order
pub fn filter(nodes: Vec<NodeInfo>, now: DateTime<Utc>) -> Vec<NodeInfo> {
    nodes
        .into_iter()
        .filter(|node| match exclusion(node, now) {
            Some(reason) => {
                debug!(node = %node.name, reason = reason.as_str(), "Node excluded from evaluation");
                false
            }
            None => true,
        })
        .collect()
}
