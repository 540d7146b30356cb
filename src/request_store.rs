//! RequestStore: thin facade over the resource-manager client.
//!
//! The allocator treats this as whatever underlying client library provides —
//! the allocator only depends on the five operations captured in the
//! [`RequestStore`] trait. [`InMemoryRequestStore`] is a test double that
//! implements the contract well enough to drive the allocator's unit and
//! property tests without a real cluster.

use crate::error::Result;
use crate::resource_spec::ResourceSpec;
use crate::types::{Container, CompletedContainerStatus, ContainerId, Host, Rack};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// A single outstanding container request, as submitted to the RM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRequest {
    /// Identity for removal purposes; two requests can otherwise be
    /// structurally identical.
    pub id: u64,
    pub spec: ResourceSpec,
    pub nodes: Option<Vec<Host>>,
    pub racks: Vec<Rack>,
    pub priority: i32,
    pub relax_locality: bool,
    pub label_expression: Option<String>,
}

/// Response to a heartbeat/allocate call.
#[derive(Debug, Clone, Default)]
pub struct AllocateResponse {
    pub allocated: Vec<Container>,
    pub completed: Vec<CompletedContainerStatus>,
    pub num_cluster_nodes: i32,
}

/// The RM client contract the allocator depends on. Implementations must be
/// safe to call while the allocator's single coarse lock is
/// held — `allocate` in particular doubles as the heartbeat and is invoked
/// from inside the critical section.
pub trait RequestStore: Send + Sync {
    fn add_container_request(
        &self,
        spec: ResourceSpec,
        nodes: Option<Vec<Host>>,
        racks: Vec<Rack>,
        priority: i32,
        relax_locality: bool,
        label_expression: Option<String>,
    ) -> ContainerRequest;

    /// Idempotent: removing a request that is no longer present is a no-op.
    fn remove_container_request(&self, request: &ContainerRequest);

    /// All currently outstanding requests matching `priority`/`spec`,
    /// regardless of location. The allocator only ever queries `ANY`
    /// location and partitions the result itself.
    fn matching_requests(&self, priority: i32, spec: ResourceSpec) -> Vec<ContainerRequest>;

    fn allocate(&self, progress: f32) -> Result<AllocateResponse>;

    /// Idempotent: releasing an already-released container is a no-op.
    fn release_assigned_container(&self, container_id: &ContainerId);
}

/// In-memory stand-in for an `AMRMClient`-style RM connection. Grants and
/// completions are injected by the caller via [`InMemoryRequestStore::grant`]
/// and [`InMemoryRequestStore::complete`]; `allocate` drains whatever has
/// accumulated since the last call, the way the real RM batches responses
/// between heartbeats.
pub struct InMemoryRequestStore {
    inner: Mutex<Inner>,
    next_id: AtomicU64,
}

#[derive(Default)]
struct Inner {
    pending: Vec<ContainerRequest>,
    to_allocate: Vec<Container>,
    to_complete: Vec<CompletedContainerStatus>,
    released: Vec<ContainerId>,
    num_cluster_nodes: i32,
}

impl InMemoryRequestStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                num_cluster_nodes: 1,
                ..Default::default()
            }),
        next_id: AtomicU64::new(1),
        })
    }

    /// Queue a container grant to be returned on the next `allocate` call.
    pub fn grant(&self, container: Container) {
        self.inner.lock().to_allocate.push(container);
    }

    /// Queue a completion to be returned on the next `allocate` call.
    pub fn complete(&self, status: CompletedContainerStatus) {
        self.inner.lock().to_complete.push(status);
    }

    pub fn set_num_cluster_nodes(&self, n: i32) {
        self.inner.lock().num_cluster_nodes = n;
    }

    pub fn released_containers(&self) -> Vec<ContainerId> {
        self.inner.lock().released.clone()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }
}

impl RequestStore for InMemoryRequestStore {
    fn add_container_request(
        &self,
        spec: ResourceSpec,
        nodes: Option<Vec<Host>>,
        racks: Vec<Rack>,
        priority: i32,
        relax_locality: bool,
        label_expression: Option<String>,
    ) -> ContainerRequest {
        let request = ContainerRequest {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            spec,
            nodes,
            racks,
            priority,
            relax_locality,
            label_expression,
        };
        let location = request
            .nodes
            .as_ref()
            .map(|nodes| nodes.join(","))
            .unwrap_or_else(|| crate::types::ANY_HOST.to_string());
        debug!(location, request.priority, "submitting container request");
        self.inner.lock().pending.push(request.clone());
        request
    }

    fn remove_container_request(&self, request: &ContainerRequest) {
        let mut inner = self.inner.lock();
        if let Some(pos) = inner.pending.iter().position(|r| r.id == request.id) {
            inner.pending.remove(pos);
        }
    }

    fn matching_requests(&self, priority: i32, spec: ResourceSpec) -> Vec<ContainerRequest> {
        self.inner
            .lock()
            .pending
            .iter()
            .filter(|r| r.priority == priority && r.spec == spec)
            .cloned()
            .collect()
    }

    fn allocate(&self, _progress: f32) -> Result<AllocateResponse> {
        let mut inner = self.inner.lock();
        Ok(AllocateResponse {
            allocated: std::mem::take(&mut inner.to_allocate),
            completed: std::mem::take(&mut inner.to_complete),
            num_cluster_nodes: inner.num_cluster_nodes,
        })
    }

    fn release_assigned_container(&self, container_id: &ContainerId) {
        self.inner.lock().released.push(container_id.clone());
    }
}
