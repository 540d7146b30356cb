//! BlacklistTracker: consumed contract.
//!
//! The allocator never decides blacklist policy itself; it only forwards
//! scheduler-driven blacklist updates and allocation-failure signals, and
//! asks whether every node in the cluster is now blacklisted.

use crate::types::Host;
use parking_lot::Mutex;
use std::collections::HashSet;
use tracing::{info, warn};

pub trait BlacklistTracker: Send + Sync {
    fn set_scheduler_blacklisted_nodes(&self, nodes: HashSet<Host>);
    fn handle_resource_allocation_failure(&self, host: Option<Host>);
    fn set_num_cluster_nodes(&self, n: i32);
    fn is_all_nodes_blacklisted(&self) -> bool;
}

/// Reference implementation: a node is blacklisted either because the
/// scheduler said so, or because it has accumulated enough allocation
/// failures on its own.
pub struct DefaultBlacklistTracker {
    state: Mutex<State>,
    failures_before_blacklist: u32,
}

struct State {
    scheduler_blacklist: HashSet<Host>,
    failure_counts: std::collections::HashMap<Host, u32>,
    self_blacklist: HashSet<Host>,
    num_cluster_nodes: i32,
}

impl DefaultBlacklistTracker {
    pub fn new(failures_before_blacklist: u32) -> Self {
        Self {
            state: Mutex::new(State {
                scheduler_blacklist: HashSet::new(),
                failure_counts: std::collections::HashMap::new(),
                self_blacklist: HashSet::new(),
                num_cluster_nodes: 0,
            }),
            failures_before_blacklist,
        }
    }

    fn blacklisted_count(state: &State) -> usize {
        state
            .scheduler_blacklist
            .union(&state.self_blacklist)
            .collect::<HashSet<_>>()
            .len()
    }
}

impl BlacklistTracker for DefaultBlacklistTracker {
    fn set_scheduler_blacklisted_nodes(&self, nodes: HashSet<Host>) {
        let mut state = self.state.lock();
        info!(count = nodes.len(), "scheduler blacklist updated");
        state.scheduler_blacklist = nodes;
    }

    fn handle_resource_allocation_failure(&self, host: Option<Host>) {
        let Some(host) = host else { return };
        let mut state = self.state.lock();
        let count = state.failure_counts.entry(host.clone()).or_insert(0);
        *count += 1;
        if *count >= self.failures_before_blacklist {
            warn!(%host, failures = *count, "blacklisting node after repeated allocation failures");
            state.self_blacklist.insert(host);
        }
    }

    fn set_num_cluster_nodes(&self, n: i32) {
        self.state.lock().num_cluster_nodes = n;
    }

    fn is_all_nodes_blacklisted(&self) -> bool {
        let state = self.state.lock();
        state.num_cluster_nodes > 0
            && Self::blacklisted_count(&state) >= state.num_cluster_nodes as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduler_blacklist_is_tracked() {
        let tracker = DefaultBlacklistTracker::new(3);
        tracker.set_num_cluster_nodes(2);
        let mut set = HashSet::new();
        set.insert("h1".to_string());
        set.insert("h2".to_string());
        tracker.set_scheduler_blacklisted_nodes(set);
        assert!(tracker.is_all_nodes_blacklisted());
    }

    #[test]
    fn self_blacklist_requires_repeated_failures() {
        let tracker = DefaultBlacklistTracker::new(2);
        tracker.set_num_cluster_nodes(1);
        tracker.handle_resource_allocation_failure(Some("badnode".to_string()));
        assert!(!tracker.is_all_nodes_blacklisted());
        tracker.handle_resource_allocation_failure(Some("badnode".to_string()));
        assert!(tracker.is_all_nodes_blacklisted());
    }

    #[test]
    fn none_host_is_ignored() {
        let tracker = DefaultBlacklistTracker::new(1);
        tracker.set_num_cluster_nodes(1);
        tracker.handle_resource_allocation_failure(None);
        assert!(!tracker.is_all_nodes_blacklisted());
    }
}
