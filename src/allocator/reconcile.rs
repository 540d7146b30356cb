//! The reconciliation step itself: request
//! bookkeeping, container-to-request matching across three locality passes,
//! launch dispatch, completion processing and exit-status classification.

use super::{Allocator, AllocatorState};
use crate::driver::LossReasonReply;
use crate::error::Result;
use crate::launcher::{LaunchOutcome, LaunchRequest};
use crate::rack_resolver::resolve_racks;
use crate::types::{exit_status, Container, CompletedContainerStatus, ExecutorId, ExitReason, Host, ALLOCATE_PROGRESS, REQUEST_PRIORITY};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

impl Allocator {
    /// One full reconciliation step: update requests, heartbeat the
    /// resource manager, then process whatever it handed back.
    pub fn allocate(self: &Arc<Self>) -> Result<()> {
        let mut state = self.state.lock();

        self.update_resource_requests(&mut state);

        let response = self.request_store.allocate(ALLOCATE_PROGRESS)?;
        self.blacklist_tracker
            .set_num_cluster_nodes(response.num_cluster_nodes);

        self.handle_allocated_containers(&mut state, response.allocated)?;
        self.process_completed_containers(&mut state, response.completed);

        Ok(())
    }

    /// Update outstanding container requests to match current demand.
    fn update_resource_requests(&self, state: &mut AllocatorState) {
        let pending = self
            .request_store
            .matching_requests(REQUEST_PRIORITY, self.resource_spec);

        let missing = state.target_num_executors
            - pending.len() as i32
            - state.num_executors_starting
            - state.running_executors.len() as i32;

        let preferred_hosts: HashSet<Host> =
            state.host_to_local_task_counts.keys().cloned().collect();

        let mut locality_matched = Vec::new();
        let mut stale_locality = Vec::new();
        let mut any_host = Vec::new();
        for request in pending {
            match &request.nodes {
                Some(nodes) if nodes.iter().any(|h| preferred_hosts.contains(h)) => {
                    locality_matched.push(request)
                }
                Some(_) => stale_locality.push(request),
                None => any_host.push(request),
            }
        }

        if missing > 0 {
            for request in &stale_locality {
                self.request_store.remove_container_request(request);
            }

            let available = missing + stale_locality.len() as i32;
            let potential = (available + any_host.len() as i32).max(0) as usize;

            let allocated_host_to_container_count: HashMap<Host, i32> = state
                .allocated_host_to_containers
                .iter()
                .map(|(host, containers)| (host.clone(), containers.len() as i32))
                .collect();

            let placements = self.placement_strategy.place_containers(
                potential,
                state.num_locality_aware_tasks,
                &state.host_to_local_task_counts,
                &allocated_host_to_container_count,
                &locality_matched,
            );

            let new_requests: Vec<_> = placements
                .into_iter()
                .filter(|placement| placement.nodes.is_some())
                .collect();

            if available >= new_requests.len() as i32 {
                for placement in &new_requests {
                    self.request_store.add_container_request(
                        self.resource_spec,
                        placement.nodes.clone(),
                        placement.racks.clone(),
                        REQUEST_PRIORITY,
                        true,
                        self.node_label_expression.clone(),
                    );
                }
                let padding = available - new_requests.len() as i32;
                for _ in 0..padding {
                    self.request_store.add_container_request(
                        self.resource_spec,
                        None,
                        Vec::new(),
                        REQUEST_PRIORITY,
                        true,
                        self.node_label_expression.clone(),
                    );
                }
            } else {
                let to_cancel = (new_requests.len() as i32 - available) as usize;
                for request in any_host.iter().take(to_cancel) {
                    self.request_store.remove_container_request(request);
                }
                for placement in &new_requests {
                    self.request_store.add_container_request(
                        self.resource_spec,
                        placement.nodes.clone(),
                        placement.racks.clone(),
                        REQUEST_PRIORITY,
                        true,
                        self.node_label_expression.clone(),
                    );
                }
            }
        } else if missing < 0 {
            let mut to_cancel = (-missing) as usize;
            for request in stale_locality
                .iter()
                .chain(any_host.iter())
                .chain(locality_matched.iter())
            {
                if to_cancel == 0 {
                    break;
                }
                self.request_store.remove_container_request(request);
                to_cancel -= 1;
            }
        }
    }

    /// Match freshly allocated containers to outstanding requests.
    fn handle_allocated_containers(
        self: &Arc<Self>,
        state: &mut AllocatorState,
        allocated: Vec<Container>,
    ) -> Result<()> {
        if allocated.is_empty() {
            return Ok(());
        }

        let mut pending = self
            .request_store
            .matching_requests(REQUEST_PRIORITY, self.resource_spec);

        let mut to_launch = Vec::new();
        let mut remaining = Vec::new();
        for container in allocated {
            if let Some(pos) = pending.iter().position(|r| {
                r.nodes
                    .as_ref()
                    .is_some_and(|nodes| nodes.iter().any(|h| h == &container.host))
            }) {
                let request = pending.remove(pos);
                self.request_store.remove_container_request(&request);
                to_launch.push(container);
            } else {
                remaining.push(container);
            }
        }

        let hosts: Vec<Host> = remaining
            .iter()
            .map(|c| c.host.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let racks = resolve_racks(Arc::clone(&self.rack_resolver), hosts)?;

        let mut surplus = Vec::new();
        for container in remaining {
            let matched = racks.get(&container.host).and_then(|rack| {
                pending
                    .iter()
                    .position(|r| r.racks.iter().any(|rr| rr == rack))
            });
            if let Some(pos) = matched {
                let request = pending.remove(pos);
                self.request_store.remove_container_request(&request);
                to_launch.push(container);
                continue;
            }

            if let Some(pos) = pending.iter().position(|r| r.nodes.is_none()) {
                let request = pending.remove(pos);
                self.request_store.remove_container_request(&request);
                to_launch.push(container);
            } else {
                surplus.push(container);
            }
        }

        for container in surplus {
            debug!(container = %container.id, host = %container.host, "no matching request, releasing surplus container");
            state.released_containers.insert(container.id.clone());
            self.request_store.release_assigned_container(&container.id);
        }

        for container in to_launch {
            if container.memory_mb < self.resource_spec.memory_mb {
                warn!(
                    container = %container.id,
                    granted = container.memory_mb,
                    requested = self.resource_spec.memory_mb,
                    "container granted less memory than requested"
                );
            }

            let executor_id = state.next_executor_id();
            state.record_allocated_container(container.id.clone(), container.host.clone());

            if (state.running_executors.len() as i32) < state.target_num_executors {
                state.num_executors_starting += 1;
                self.dispatch_launch(executor_id, container);
            } else {
                // The request was already consumed above, so this executor id
                // is spent without a launch; the next reconciliation re-requests
                // the shortfall.
                debug!(
                    %executor_id,
                    container = %container.id,
                    "already at target when container was matched, skipping launch"
                );
            }
        }

        Ok(())
    }

    fn dispatch_launch(self: &Arc<Self>, executor_id: ExecutorId, container: Container) {
        let request = LaunchRequest {
            container: container.clone(),
            executor_id,
            host: container.host.clone(),
            memory_mb: container.memory_mb,
            cores: container.vcores,
            driver_url: self.driver_url.clone(),
            app_id: self.app_id.clone(),
            local_resources: HashMap::new(),
        };

        let allocator = Arc::clone(self);
        let completion_container = container;
        self.launcher_pool
            .dispatch(Arc::clone(&self.launcher), request, move |outcome| {
                let mut state = allocator.state.lock();
                match outcome {
                    LaunchOutcome::Success => {
                        state.num_executors_starting -= 1;
                        state.running_executors.insert(executor_id);
                        state.link_executor_container(executor_id, completion_container);
                        info!(%executor_id, "executor launched");
                    }
                    LaunchOutcome::Failed(reason) => {
                        state.num_executors_starting -= 1;
                        state.forget_allocated_container(&completion_container.id);
                        state
                            .released_containers
                            .insert(completion_container.id.clone());
                        warn!(%executor_id, container = %completion_container.id, %reason, "executor launch failed");
                        drop(state);
                        allocator
                            .request_store
                            .release_assigned_container(&completion_container.id);
                    }
                }
            });
    }

    /// Reconcile completed containers reported by the resource manager.
    fn process_completed_containers(
        &self,
        state: &mut AllocatorState,
        completed: Vec<CompletedContainerStatus>,
    ) {
        for status in completed {
            let already_released = state.released_containers.remove(&status.container_id);
            if !already_released {
                if let Some(eid) = state
                    .container_id_to_executor_id
                    .get(&status.container_id)
                    .copied()
                {
                    state.running_executors.remove(&eid);
                }
            }

            let host = state
                .allocated_container_to_host
                .get(&status.container_id)
                .cloned();

            let exit_reason = if already_released {
                ExitReason::explicit_termination(status.exit_status)
            } else {
                let (exit_caused_by_app, diagnostics, blacklist_host) =
                    classify_exit_status(status.exit_status, &status.diagnostics);
                if blacklist_host {
                    self.blacklist_tracker
                        .handle_resource_allocation_failure(host.clone());
                }
                ExitReason {
                    exit_status: status.exit_status,
                    exit_caused_by_app,
                    diagnostics,
                }
            };

            self.failure_tracker
                .record_completion(exit_reason.exit_caused_by_app);

            state.forget_allocated_container(&status.container_id);
            let executor_id = state.unlink_container(&status.container_id);

            if let Some(eid) = executor_id {
                if let Some(handles) = state.pending_loss_reason_requests.remove(&eid) {
                    for reply in handles {
                        reply(LossReasonReply::Found(exit_reason.clone()));
                    }
                } else {
                    state
                        .released_executor_loss_reasons
                        .insert(eid, exit_reason.clone());
                }

                if !already_released {
                    state.num_unexpected_container_release += 1;
                    self.driver.remove_executor(eid, exit_reason);
                }
            }
        }
    }
}

/// The pure exit-status classification table. Returns
/// `(exit_caused_by_app, diagnostics, inform_blacklist)`.
fn classify_exit_status(status_code: i32, diagnostics: &str) -> (bool, String, bool) {
    match status_code {
        exit_status::SUCCESS => (false, "YARN event, not job error.".to_string(), false),
        exit_status::PREEMPTED => (
            false,
            "Container preempted by the resource manager for resource sharing.".to_string(),
            false,
        ),
        exit_status::VMEM_EXCEEDED => (true, memory_exceeded_diagnostic(diagnostics, "virtual"), false),
        exit_status::PMEM_EXCEEDED => (true, memory_exceeded_diagnostic(diagnostics, "physical"), false),
        exit_status::KILLED_BY_RM
        | exit_status::KILLED_BY_APPMASTER
        | exit_status::KILLED_AFTER_APP_COMPLETION
        | exit_status::ABORTED
        | exit_status::DISKS_FAILED => (
            false,
            format!("Container marked as failed by the cluster: exit status {status_code}."),
            false,
        ),
        other => (
            true,
            format!(
                "Executor container exited with a non-zero status of {other}, possibly \
                 caused by running out of memory or an uncaught exception."
            ),
            true,
        ),
    }
}

fn memory_exceeded_diagnostic(diagnostics: &str, kind: &str) -> String {
    let re = Regex::new(r"[0-9.]+ [KMG]B of [0-9.]+ [KMG]B (physical|virtual) memory used")
        .expect("static regex is valid");
    let extracted = re.find(diagnostics).map(|m| m.as_str()).unwrap_or(diagnostics);
    format!(
        "Container killed by YARN for exceeding {kind} memory limits. {extracted}. \
         Consider boosting spark.executor.memoryOverhead."
    )
}
