//! PlacementStrategy: converts pending task locality hints into
//! locality preferences for new container requests.
//!
//! The allocator treats this as a pure function of the current demand
//! picture; it is the only component besides the rack resolver allowed to
//! touch topology information.

use crate::rack_resolver::{resolve_racks, RackResolver};
use crate::request_store::ContainerRequest;
use crate::types::{ContainerPlacement, Host};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

pub trait PlacementStrategy: Send + Sync {
    /// Return up to `num_containers_needed` locality preferences, biased
    /// toward hosts with high pending-task density, discounting hosts
    /// already saturated with allocated containers, and never
    /// double-counting hosts that already have an outstanding
    /// locality-matched request.
    fn place_containers(
        &self,
        num_containers_needed: usize,
        num_locality_aware_tasks: i32,
        host_to_local_task_counts: &HashMap<Host, i32>,
        allocated_host_to_container_count: &HashMap<Host, i32>,
        current_matched_locality_requests: &[ContainerRequest],
    ) -> Vec<ContainerPlacement>;
}

/// Default strategy: ranks candidate hosts by pending-task density,
/// discounted by containers already allocated or requested there.
pub struct LocalityAwarePlacementStrategy {
    rack_resolver: Arc<dyn RackResolver>,
}

impl LocalityAwarePlacementStrategy {
    pub fn new(rack_resolver: Arc<dyn RackResolver>) -> Self {
        Self { rack_resolver }
    }

    fn already_requested_per_host(requests: &[ContainerRequest]) -> HashMap<Host, i32> {
        let mut counts = HashMap::new();
        for request in requests {
            if let Some(nodes) = &request.nodes {
                for host in nodes {
                    *counts.entry(host.clone()).or_insert(0) += 1;
                }
            }
        }
        counts
    }
}

impl PlacementStrategy for LocalityAwarePlacementStrategy {
    fn place_containers(
        &self,
        num_containers_needed: usize,
        num_locality_aware_tasks: i32,
        host_to_local_task_counts: &HashMap<Host, i32>,
        allocated_host_to_container_count: &HashMap<Host, i32>,
        current_matched_locality_requests: &[ContainerRequest],
    ) -> Vec<ContainerPlacement> {
        if num_containers_needed == 0 || num_locality_aware_tasks == 0 {
            return Vec::new();
        }

        let already_requested = Self::already_requested_per_host(current_matched_locality_requests);

        let mut ranked: Vec<(Host, i32)> = host_to_local_task_counts
            .iter()
            .map(|(host, pending_tasks)| {
                let allocated = allocated_host_to_container_count
                    .get(host)
                    .copied()
                    .unwrap_or(0);
                let requested = already_requested.get(host).copied().unwrap_or(0);
                let remaining_demand = pending_tasks - allocated - requested;
                (host.clone(), remaining_demand)
            })
            .filter(|(_, demand)| *demand > 0)
            .collect();

        // Highest remaining demand first; break ties lexicographically for
        // a deterministic, testable ordering.
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(num_containers_needed);

        if ranked.is_empty() {
            return Vec::new();
        }

        let hosts: Vec<Host> = ranked.iter().map(|(h, _)| h.clone()).collect();
        let racks = match resolve_racks(self.rack_resolver.clone(), hosts.clone()) {
            Ok(racks) => racks,
            Err(e) => {
                debug!(error = %e, "rack resolution failed, falling back to host-only placement");
                HashMap::new()
            }
        };

        ranked
            .into_iter()
            .map(|(host, demand)| {
                let rack = racks.get(&host).cloned();
                debug!(%host, demand, rack = ?rack, "placement candidate");
                ContainerPlacement {
                    nodes: Some(vec![host]),
                    racks: rack.into_iter().collect(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rack_resolver::StaticRackResolver;
    use crate::resource_spec::ResourceSpec;

    fn strategy() -> LocalityAwarePlacementStrategy {
        LocalityAwarePlacementStrategy::new(Arc::new(StaticRackResolver::new(
            HashMap::new(),
            "/default",
        )))
    }

    fn spec() -> ResourceSpec {
        ResourceSpec {
            memory_mb: 1024,
            vcores: 1,
        }
    }

    fn request(host: &str) -> ContainerRequest {
        ContainerRequest {
            id: 0,
            spec: spec(),
            nodes: Some(vec![host.to_string()]),
            racks: vec![],
            priority: 1,
            relax_locality: true,
            label_expression: None,
        }
    }

    #[test]
    fn ranks_by_pending_task_density() {
        let mut counts = HashMap::new();
        counts.insert("h1".to_string(), 5);
        counts.insert("h2".to_string(), 10);
        let placements = strategy().place_containers(2, 15, &counts, &HashMap::new(), &[]);
        assert_eq!(placements.len(), 2);
        assert_eq!(placements[0].nodes, Some(vec!["h2".to_string()]));
        assert_eq!(placements[1].nodes, Some(vec!["h1".to_string()]));
    }

    #[test]
    fn discounts_already_allocated_hosts() {
        let mut counts = HashMap::new();
        counts.insert("h1".to_string(), 3);
        let mut allocated = HashMap::new();
        allocated.insert("h1".to_string(), 3);
        let placements = strategy().place_containers(5, 3, &counts, &allocated, &[]);
        assert!(placements.is_empty());
    }

    #[test]
    fn avoids_double_counting_outstanding_requests() {
        let mut counts = HashMap::new();
        counts.insert("h1".to_string(), 2);
        let outstanding = vec![request("h1")];
        let placements = strategy().place_containers(5, 2, &counts, &HashMap::new(), &outstanding);
        // demand (2) - already_requested (1) = 1 remaining slot.
        assert_eq!(placements.len(), 1);
    }

    #[test]
    fn caps_result_at_requested_count() {
        let mut counts = HashMap::new();
        for i in 0..10 {
            counts.insert(format!("h{i}"), 1);
        }
        let placements = strategy().place_containers(3, 10, &counts, &HashMap::new(), &[]);
        assert_eq!(placements.len(), 3);
    }

    #[test]
    fn no_locality_aware_tasks_yields_no_placements() {
        let mut counts = HashMap::new();
        counts.insert("h1".to_string(), 5);
        let placements = strategy().place_containers(3, 0, &counts, &HashMap::new(), &[]);
        assert!(placements.is_empty());
    }
}
