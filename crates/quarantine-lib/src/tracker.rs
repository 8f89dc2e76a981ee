//! Underutilization tracking and cordon candidate selection
//!
//! The tracker remembers which nodes have been continuously below the
//! utilization threshold and since when. It is fed one utilization snapshot
//! per evaluation cycle and answers which node, if any, should be cordoned.
//!
//! State lives in memory only. Restarting the controller resets every
//! node's age clock.

use crate::models::NodeUtilization;
use chrono::{DateTime, Duration, Utc};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// A node currently believed to be underutilized
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedNode {
    pub name: String,
    /// Most recently observed utilization
    pub utilization: f64,
    /// Start of the current underutilization streak
    pub since: DateTime<Utc>,
}

impl TrackedNode {
    /// Whether the node has been underutilized for at least `unused_age`
    pub fn is_eligible(&self, now: DateTime<Utc>, unused_age: Duration) -> bool {
        now.checked_sub_signed(unused_age)
            .map_or(false, |cutoff| self.since <= cutoff)
    }
}

/// Tracks underutilized nodes across evaluation cycles.
///
/// Not safe for concurrent mutation; the evaluation loop owns it exclusively.
#[derive(Debug)]
pub struct UnderutilizationTracker {
    threshold: f64,
    unused_age: Duration,
    nodes: HashMap<String, TrackedNode>,
}

impl UnderutilizationTracker {
    /// Create a tracker for the given threshold (fraction) and minimum age
    pub fn new(threshold: f64, unused_age: Duration) -> Self {
        Self {
            threshold,
            unused_age,
            nodes: HashMap::new(),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn unused_age(&self) -> Duration {
        self.unused_age
    }

    /// Apply a fresh utilization snapshot.
    ///
    /// Nodes at or above the threshold leave tracking, new underutilized
    /// nodes start a streak at `now`, and tracked nodes keep their streak
    /// start but take the latest reading. Tracked nodes missing from the
    /// snapshot are dropped.
    pub fn update(&mut self, snapshot: &[NodeUtilization], now: DateTime<Utc>) {
        for util in snapshot {
            // NaN compares false and is treated as utilized
            if !(util.max_utilization < self.threshold) {
                if self.nodes.remove(&util.name).is_some() {
                    debug!(
                        node = %util.name,
                        utilization = util.max_utilization,
                        "Node recovered above threshold, no longer tracked"
                    );
                }
                continue;
            }

            self.nodes
                .entry(util.name.clone())
                .and_modify(|tracked| tracked.utilization = util.max_utilization)
                .or_insert_with(|| {
                    debug!(
                        node = %util.name,
                        utilization = util.max_utilization,
                        "Node became underutilized"
                    );
                    TrackedNode {
                        name: util.name.clone(),
                        utilization: util.max_utilization,
                        since: now,
                    }
                });
        }

        let present: HashSet<&str> = snapshot.iter().map(|u| u.name.as_str()).collect();
        self.nodes.retain(|name, _| {
            let keep = present.contains(name.as_str());
            if !keep {
                debug!(node = %name, "Node no longer present, no longer tracked");
            }
            keep
        });
    }

    /// Pick the emptiest node that has been underutilized long enough.
    ///
    /// Ties on utilization go to the lexicographically smallest name.
    pub fn select_candidate(&self, now: DateTime<Utc>) -> Option<String> {
        self.eligible(now)
            .min_by(|a, b| {
                a.utilization
                    .partial_cmp(&b.utilization)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| a.name.cmp(&b.name))
            })
            .map(|node| node.name.clone())
    }

    /// Stop tracking a node after it has been cordoned.
    /// Unknown names are ignored.
    pub fn acknowledge(&mut self, name: &str) {
        self.nodes.remove(name);
    }

    /// Tracked nodes that have reached the minimum age
    pub fn eligible(&self, now: DateTime<Utc>) -> impl Iterator<Item = &TrackedNode> {
        let unused_age = self.unused_age;
        self.nodes
            .values()
            .filter(move |node| node.is_eligible(now, unused_age))
    }

    pub fn get(&self, name: &str) -> Option<&TrackedNode> {
        self.nodes.get(name)
    }

    pub fn tracked(&self) -> impl Iterator<Item = &TrackedNode> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(secs)
    }

    fn tracker() -> UnderutilizationTracker {
        UnderutilizationTracker::new(0.5, Duration::seconds(600))
    }

    fn snap(entries: &[(&str, f64)]) -> Vec<NodeUtilization> {
        entries
            .iter()
            .map(|(name, util)| NodeUtilization::new(*name, *util))
            .collect()
    }

    #[test]
    fn test_below_threshold_is_tracked() {
        let mut tracker = tracker();
        tracker.update(&snap(&[("a", 0.2), ("b", 0.5), ("c", 0.9)]), t(0));

        assert_eq!(tracker.len(), 1);
        let a = tracker.get("a").unwrap();
        assert_eq!(a.since, t(0));
        assert_eq!(a.utilization, 0.2);
        assert!(tracker.get("b").is_none());
        assert!(tracker.get("c").is_none());
    }

    #[test]
    fn test_streak_start_kept_and_reading_refreshed() {
        let mut tracker = tracker();
        tracker.update(&snap(&[("a", 0.2)]), t(0));
        tracker.update(&snap(&[("a", 0.4)]), t(30));

        let a = tracker.get("a").unwrap();
        assert_eq!(a.since, t(0));
        assert_eq!(a.utilization, 0.4);
    }

    #[test]
    fn test_age_gating() {
        let mut tracker = tracker();
        tracker.update(&snap(&[("a", 0.1)]), t(0));

        assert_eq!(tracker.select_candidate(t(599)), None);
        assert_eq!(tracker.select_candidate(t(600)), Some("a".to_string()));
    }

    #[test]
    fn test_selects_minimum_utilization() {
        let mut tracker = tracker();
        tracker.update(&snap(&[("a", 0.1), ("b", 0.3), ("c", 0.2)]), t(0));
        assert_eq!(tracker.select_candidate(t(1000)), Some("a".to_string()));

        // Order in the snapshot does not matter
        let mut tracker = UnderutilizationTracker::new(0.5, Duration::seconds(600));
        tracker.update(&snap(&[("b", 0.3), ("c", 0.2), ("a", 0.1)]), t(0));
        assert_eq!(tracker.select_candidate(t(1000)), Some("a".to_string()));
    }

    #[test]
    fn test_minimum_uses_fresh_reading() {
        let mut tracker = tracker();
        tracker.update(&snap(&[("a", 0.1), ("b", 0.3)]), t(0));
        tracker.update(&snap(&[("a", 0.45), ("b", 0.3)]), t(700));
        assert_eq!(tracker.select_candidate(t(700)), Some("b".to_string()));
    }

    #[test]
    fn test_only_eligible_nodes_compete() {
        let mut tracker = tracker();
        tracker.update(&snap(&[("old", 0.4)]), t(0));
        tracker.update(&snap(&[("old", 0.4), ("young", 0.0)]), t(500));
        assert_eq!(tracker.select_candidate(t(700)), Some("old".to_string()));
    }

    #[test]
    fn test_ties_broken_by_name() {
        let mut tracker = tracker();
        tracker.update(&snap(&[("zeta", 0.2), ("alpha", 0.2), ("mid", 0.2)]), t(0));
        assert_eq!(tracker.select_candidate(t(600)), Some("alpha".to_string()));
    }

    #[test]
    fn test_vanished_node_is_dropped() {
        let mut tracker = tracker();
        tracker.update(&snap(&[("a", 0.1), ("b", 0.3)]), t(0));
        tracker.update(&snap(&[("b", 0.3)]), t(700));

        assert!(tracker.get("a").is_none());
        assert_eq!(tracker.select_candidate(t(700)), Some("b".to_string()));

        tracker.update(&[], t(710));
        assert!(tracker.is_empty());
        assert_eq!(tracker.select_candidate(t(5000)), None);
    }

    #[test]
    fn test_recovery_resets_age() {
        let mut tracker = tracker();
        tracker.update(&snap(&[("a", 0.1)]), t(0));
        tracker.update(&snap(&[("a", 0.5)]), t(300));
        assert!(tracker.get("a").is_none());

        tracker.update(&snap(&[("a", 0.1)]), t(400));
        assert_eq!(tracker.get("a").unwrap().since, t(400));
        assert_eq!(tracker.select_candidate(t(700)), None);
        assert_eq!(tracker.select_candidate(t(1000)), Some("a".to_string()));
    }

    #[test]
    fn test_nan_utilization_never_tracked() {
        let mut tracker = tracker();
        tracker.update(&snap(&[("a", f64::NAN)]), t(0));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_acknowledge() {
        let mut tracker = tracker();
        tracker.update(&snap(&[("a", 0.1), ("b", 0.2)]), t(0));

        tracker.acknowledge("a");
        assert!(tracker.get("a").is_none());
        assert_eq!(tracker.select_candidate(t(600)), Some("b".to_string()));

        // Unknown and repeated names are no-ops
        tracker.acknowledge("a");
        tracker.acknowledge("missing");
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_select_candidate_does_not_mutate() {
        let mut tracker = tracker();
        tracker.update(&snap(&[("a", 0.1)]), t(0));
        assert_eq!(tracker.select_candidate(t(600)), Some("a".to_string()));
        assert_eq!(tracker.select_candidate(t(600)), Some("a".to_string()));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_scenario_three_polls() {
        let mut tracker = tracker();

        tracker.update(&snap(&[("A", 0.2)]), t(0));
        assert_eq!(tracker.get("A").unwrap().since, t(0));

        tracker.update(&snap(&[("A", 0.2)]), t(300));
        assert_eq!(tracker.select_candidate(t(300)), None);

        tracker.update(&snap(&[("A", 0.2)]), t(650));
        assert_eq!(tracker.select_candidate(t(650)), Some("A".to_string()));
    }
}
