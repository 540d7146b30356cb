//! Allocator: the reconciliation loop, bookkeeping, container-to-
//! request matching, launch dispatch, completion processing and loss-reason
//! queue.
//!
//! Scheduling model: a single coarse [`parking_lot::Mutex`]
//! guards all mutable state. Every public operation that reads or writes
//! state takes the lock for its whole duration; the only work that
//! genuinely happens off-lock is rack resolution (its own short-lived
//! thread, joined before the lock is released) and executor launches
//! (dispatched to [`crate::launcher::LauncherPool`], which re-acquires the
//! lock only to finalize bookkeeping).

mod reconcile;
mod state;

pub use state::AllocatorState;

use crate::blacklist_tracker::BlacklistTracker;
use crate::config::AllocatorConfig;
use crate::driver::{Driver, LossReasonReply, ReplyHandle};
use crate::error::Result;
use crate::failure_tracker::FailureTracker;
use crate::launcher::{ExecutorLauncher, LauncherPool};
use crate::placement::PlacementStrategy;
use crate::rack_resolver::RackResolver;
use crate::request_store::RequestStore;
use crate::resource_spec::ResourceSpec;
use crate::types::{ExecutorId, Host};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

pub struct Allocator {
    state: Mutex<AllocatorState>,

    resource_spec: ResourceSpec,
    node_label_expression: Option<String>,

    request_store: Arc<dyn RequestStore>,
    placement_strategy: Arc<dyn PlacementStrategy>,
    rack_resolver: Arc<dyn RackResolver>,
    failure_tracker: Arc<FailureTracker>,
    blacklist_tracker: Arc<dyn BlacklistTracker>,
    launcher_pool: LauncherPool,
    launcher: Arc<dyn ExecutorLauncher>,
    driver: Arc<dyn Driver>,

    app_id: String,
    driver_url: String,
}

impl Allocator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &AllocatorConfig,
        app_id: impl Into<String>,
        driver_url: impl Into<String>,
        request_store: Arc<dyn RequestStore>,
        placement_strategy: Arc<dyn PlacementStrategy>,
        rack_resolver: Arc<dyn RackResolver>,
        failure_tracker: Arc<FailureTracker>,
        blacklist_tracker: Arc<dyn BlacklistTracker>,
        launcher: Arc<dyn ExecutorLauncher>,
        driver: Arc<dyn Driver>,
    ) -> Result<Arc<Self>> {
        let initial_executor_id = driver.retrieve_last_allocated_executor_id();
        let state = AllocatorState::new(config.initial_executors, initial_executor_id);
        let launcher_pool = LauncherPool::new(config.container_launcher_max_threads)?;

        info!(
            initial_executor_id,
            target = config.initial_executors,
            "allocator initialized"
        );

        Ok(Arc::new(Self {
            state: Mutex::new(state),
            resource_spec: ResourceSpec::from_config(config),
            node_label_expression: config.node_label_expression.clone(),
            request_store,
            placement_strategy,
            rack_resolver,
            failure_tracker,
            blacklist_tracker,
            launcher_pool,
            launcher,
            driver,
            app_id: app_id.into(),
            driver_url: driver_url.into(),
        }))
    }

    /// Update the desired executor count and the most recent locality
    /// hints. Placement hints are always updated; the target — and the
    /// forwarded blacklist — only change when `requested_total` actually
    /// differs from the current target. Never kills
    /// running executors to shrink.
    pub fn request_total(
        &self,
        requested_total: i32,
        num_locality_aware_tasks: i32,
        host_to_local_task_counts: std::collections::HashMap<Host, i32>,
        node_blacklist: HashSet<Host>,
    ) -> bool {
        let mut state = self.state.lock();
        state.num_locality_aware_tasks = num_locality_aware_tasks;
        state.host_to_local_task_counts = host_to_local_task_counts;

        if requested_total != state.target_num_executors {
            info!(
                from = state.target_num_executors,
                to = requested_total,
                "target executor count changed"
            );
            state.target_num_executors = requested_total;
            self.blacklist_tracker
                .set_scheduler_blacklisted_nodes(node_blacklist);
            true
        } else {
            false
        }
    }

    /// Kill a running executor by releasing its container. Idempotent:
    /// calling twice for the same executor has the same effect as calling
    /// once.
    pub fn kill_executor(&self, executor_id: ExecutorId) {
        let mut state = self.state.lock();
        let Some(container) = state.executor_id_to_container.get(&executor_id).cloned() else {
            tracing::warn!(%executor_id, "killExecutor: unknown executor, ignoring");
            return;
        };
        if state.released_containers.contains(&container.id) {
            return;
        }
        state.released_containers.insert(container.id.clone());
        state.running_executors.remove(&executor_id);
        self.request_store.release_assigned_container(&container.id);
        info!(%executor_id, container = %container.id, "executor killed");
    }

    /// Queue or immediately answer a loss-reason query.
    pub fn enqueue_get_loss_reason(&self, executor_id: ExecutorId, reply: ReplyHandle) {
        let mut state = self.state.lock();
        if state.executor_id_to_container.contains_key(&executor_id) {
            state
                .pending_loss_reason_requests
                .entry(executor_id)
                .or_default()
                .push(reply);
        } else if let Some(reason) = state.released_executor_loss_reasons.remove(&executor_id) {
            drop(state);
            reply(LossReasonReply::Found(reason));
        } else {
            drop(state);
            reply(LossReasonReply::UnknownExecutor);
        }
    }

    /// Force-shutdown the launcher worker pool, interrupting in-flight
    /// launches.
    pub fn stop(&self) {
        self.launcher_pool.stop();
    }

    pub fn num_executors_running(&self) -> usize {
        self.state.lock().running_executors.len()
    }

    pub fn num_executors_failed(&self) -> u32 {
        self.failure_tracker.num_failed_executors()
    }

    pub fn num_containers_pending_allocate(&self) -> usize {
        self.request_store
            .matching_requests(crate::types::REQUEST_PRIORITY, self.resource_spec)
            .len()
    }

    pub fn num_released_containers(&self) -> usize {
        self.state.lock().released_containers.len()
    }

    pub fn is_all_node_blacklisted(&self) -> bool {
        self.blacklist_tracker.is_all_nodes_blacklisted()
    }
}
