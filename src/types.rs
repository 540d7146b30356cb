//! Core identifiers and value types shared by every allocator component.
//!
//! Opaque ids for containers and executors,
//! DNS host names, resolved rack paths, and the exit-reason payload that
//! flows from a completed container back to the driver.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel host value meaning "place anywhere" (no locality preference).
pub const ANY_HOST: &str = "*";

/// Fixed request priority. The allocator never models multiple priorities.
pub const REQUEST_PRIORITY: i32 = 1;

/// Heartbeat/allocate progress indicator sent on every RM `allocate` call.
pub const ALLOCATE_PROGRESS: f32 = 0.1;

/// Id assigned by the resource manager to a granted container. Stable for
/// the container's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContainerId(pub String);

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonically increasing executor id, rendered as a string wire value.
///
/// The counter is seeded from the driver at construction so that an AM
/// restart never reissues an id a surviving driver already knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExecutorId(pub u64);

impl fmt::Display for ExecutorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// DNS host name a container is placed on.
pub type Host = String;

/// Resolved rack path for a host.
pub type Rack = String;

/// A container granted by the resource manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub id: ContainerId,
    pub host: Host,
    pub memory_mb: i64,
    pub vcores: i32,
}

/// Status the resource manager reports for a completed container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedContainerStatus {
    pub container_id: ContainerId,
    pub exit_status: i32,
    pub diagnostics: String,
}

/// Well-known exit status sentinels from the resource manager.
pub mod exit_status {
    pub const SUCCESS: i32 = 0;
    pub const PREEMPTED: i32 = -102;
    pub const VMEM_EXCEEDED: i32 = -103;
    pub const PMEM_EXCEEDED: i32 = -104;
    pub const KILLED_BY_RM: i32 = -108;
    pub const KILLED_BY_APPMASTER: i32 = -106;
    pub const KILLED_AFTER_APP_COMPLETION: i32 = -111;
    pub const ABORTED: i32 = -100;
    pub const DISKS_FAILED: i32 = -101;
}

/// Reason an executor's container exited, reported back to the driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitReason {
    pub exit_status: i32,
    pub exit_caused_by_app: bool,
    pub diagnostics: String,
}

impl ExitReason {
    pub fn explicit_termination(exit_status: i32) -> Self {
        Self {
            exit_status,
            exit_caused_by_app: false,
            diagnostics: "Container released by driver, explicit termination request."
                .to_string(),
        }
    }
}

/// Locality preference returned by a [`crate::placement::PlacementStrategy`]
/// for a single candidate container request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContainerPlacement {
    /// `None` means "any host" (no locality preference).
    pub nodes: Option<Vec<Host>>,
    pub racks: Vec<Rack>,
}

impl ContainerPlacement {
    pub fn any_host() -> Self {
        Self {
            nodes: None,
            racks: Vec::new(),
        }
    }
}
