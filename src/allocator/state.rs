//! Bookkeeping state owned exclusively by the allocator,
//! guarded by the single coarse lock in [`super::Allocator`].

use crate::driver::ReplyHandle;
use crate::types::{Container, ContainerId, ExecutorId, ExitReason, Host};
use std::collections::{HashMap, HashSet};

#[derive(Default)]
pub struct AllocatorState {
    pub target_num_executors: i32,
    pub running_executors: HashSet<ExecutorId>,
    pub num_executors_starting: i32,

    pub executor_id_to_container: HashMap<ExecutorId, Container>,
    pub container_id_to_executor_id: HashMap<ContainerId, ExecutorId>,

    pub allocated_host_to_containers: HashMap<Host, HashSet<ContainerId>>,
    pub allocated_container_to_host: HashMap<ContainerId, Host>,

    pub released_containers: HashSet<ContainerId>,

    pub pending_loss_reason_requests: HashMap<ExecutorId, Vec<ReplyHandle>>,
    pub released_executor_loss_reasons: HashMap<ExecutorId, ExitReason>,

    pub host_to_local_task_counts: HashMap<Host, i32>,
    pub num_locality_aware_tasks: i32,

    pub executor_id_counter: u64,
    pub num_unexpected_container_release: u64,
}

impl AllocatorState {
    pub fn new(initial_target: i32, initial_executor_id: u64) -> Self {
        Self {
            target_num_executors: initial_target,
            executor_id_counter: initial_executor_id,
            ..Default::default()
        }
    }

    pub fn next_executor_id(&mut self) -> ExecutorId {
        self.executor_id_counter += 1;
        ExecutorId(self.executor_id_counter)
    }

    /// Record a container as placed on a host, keeping
    /// `allocated_host_to_containers`/`allocated_container_to_host` as
    /// mutual inverses (invariant 2).
    pub fn record_allocated_container(&mut self, container_id: ContainerId, host: Host) {
        self.allocated_host_to_containers
            .entry(host.clone())
            .or_default()
            .insert(container_id.clone());
        self.allocated_container_to_host.insert(container_id, host);
    }

    /// Remove a completed container from the host/container maps, dropping
    /// the host entry once its set is empty (invariant 2).
    pub fn forget_allocated_container(&mut self, container_id: &ContainerId) {
        if let Some(host) = self.allocated_container_to_host.remove(container_id) {
            if let Some(set) = self.allocated_host_to_containers.get_mut(&host) {
                set.remove(container_id);
                if set.is_empty() {
                    self.allocated_host_to_containers.remove(&host);
                }
            }
        }
    }

    /// Link a running executor to its container, keeping
    /// `executor_id_to_container`/`container_id_to_executor_id` as mutual
    /// inverses (invariant 1).
    pub fn link_executor_container(&mut self, executor_id: ExecutorId, container: Container) {
        self.container_id_to_executor_id
            .insert(container.id.clone(), executor_id);
        self.executor_id_to_container.insert(executor_id, container);
    }

    /// Drop the executor/container link, returning the executor id if the
    /// container was known.
    pub fn unlink_container(&mut self, container_id: &ContainerId) -> Option<ExecutorId> {
        let executor_id = self.container_id_to_executor_id.remove(container_id)?;
        self.executor_id_to_container.remove(&executor_id);
        Some(executor_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn host_container_maps_stay_mutual_inverses() {
        let mut state = AllocatorState::new(0, 0);
        let cid = ContainerId("c1".to_string());
        state.record_allocated_container(cid.clone(), "h1".to_string());
        assert!(state.allocated_host_to_containers["h1"].contains(&cid));
        assert_eq!(state.allocated_container_to_host[&cid], "h1");

        state.forget_allocated_container(&cid);
        assert!(!state.allocated_host_to_containers.contains_key("h1"));
        assert!(!state.allocated_container_to_host.contains_key(&cid));
    }

    #[test]
    fn executor_container_maps_stay_mutual_inverses() {
        let mut state = AllocatorState::new(0, 0);
        let cid = ContainerId("c1".to_string());
        let eid = ExecutorId(1);
        let container = Container {
            id: cid.clone(),
            host: "h1".to_string(),
            memory_mb: 1024,
            vcores: 1,
        };
        state.link_executor_container(eid, container);
        assert_eq!(state.container_id_to_executor_id[&cid], eid);
        assert!(state.executor_id_to_container.contains_key(&eid));

        let unlinked = state.unlink_container(&cid);
        assert_eq!(unlinked, Some(eid));
        assert!(!state.executor_id_to_container.contains_key(&eid));
        assert!(!state.container_id_to_executor_id.contains_key(&cid));
    }

    #[test]
    fn executor_ids_are_monotonic() {
        let mut state = AllocatorState::new(0, 5);
        assert_eq!(state.next_executor_id(), ExecutorId(6));
        assert_eq!(state.next_executor_id(), ExecutorId(7));
        assert_eq!(state.next_executor_id(), ExecutorId(8));
    }

    proptest! {
        /// Executor ids strictly increase across any sequence
        /// of mint calls, regardless of the seed value from the driver.
        #[test]
        fn executor_ids_never_decrease_or_repeat(seed in 0u64..1_000, calls in 1usize..50) {
            let mut state = AllocatorState::new(0, seed);
            let mut last = seed;
            for _ in 0..calls {
                let id = state.next_executor_id();
                prop_assert!(id.0 > last);
                last = id.0;
            }
        }

        /// Invariant, fuzzed: any interleaving of recording and
        /// forgetting allocated containers across a small set of hosts keeps
        /// the host/container maps as mutual inverses, with host entries
        /// present iff non-empty.
        #[test]
        fn host_container_maps_survive_random_mutation(
            ops in prop::collection::vec((0usize..4, any::<bool>()), 1..100)
        ) {
            let mut state = AllocatorState::new(0, 0);
            for (slot, insert) in ops {
                let cid = ContainerId(format!("c{slot}"));
                let host = format!("h{}", slot % 2);
                if insert {
                    state.record_allocated_container(cid, host);
                } else {
                    state.forget_allocated_container(&cid);
                }
            }

            for (cid, host) in &state.allocated_container_to_host {
                prop_assert!(state.allocated_host_to_containers[host].contains(cid));
            }
            for (host, cids) in &state.allocated_host_to_containers {
                prop_assert!(!cids.is_empty());
                for cid in cids {
                    prop_assert_eq!(&state.allocated_container_to_host[cid], host);
                }
            }
        }
    }
}
