//! Outbound/inbound driver RPC surface.
//!
//! `retrieve_last_allocated_executor_id` is called once, synchronously, at
//! construction so the executor id counter survives an AM restart without
//! colliding with ids the driver already knows about. `remove_executor` is
//! fire-and-forget. `enqueueGetLossReason` replies are modeled as a
//! one-shot callback so the allocator can answer either immediately or
//! later, once a completion arrives.

use crate::types::{ExecutorId, ExitReason};

pub trait Driver: Send + Sync {
    fn retrieve_last_allocated_executor_id(&self) -> u64;
    fn remove_executor(&self, executor_id: ExecutorId, reason: ExitReason);
}

/// Result delivered to a queued `enqueueGetLossReason` caller.
#[derive(Debug, Clone, PartialEq)]
pub enum LossReasonReply {
    Found(ExitReason),
    UnknownExecutor,
}

/// A pending driver query, answered exactly once.
pub type ReplyHandle = Box<dyn FnOnce(LossReasonReply) + Send>;

/// Test/demo double recording every outbound call it receives.
pub struct RecordingDriver {
    initial_executor_id: u64,
    removed: parking_lot::Mutex<Vec<(ExecutorId, ExitReason)>>,
}

impl RecordingDriver {
    pub fn new(initial_executor_id: u64) -> Self {
        Self {
            initial_executor_id,
            removed: parking_lot::Mutex::new(Vec::new()),
        }
    }

    pub fn removed_executors(&self) -> Vec<(ExecutorId, ExitReason)> {
        self.removed.lock().clone()
    }
}

impl Driver for RecordingDriver {
    fn retrieve_last_allocated_executor_id(&self) -> u64 {
        self.initial_executor_id
    }

    fn remove_executor(&self, executor_id: ExecutorId, reason: ExitReason) {
        self.removed.lock().push((executor_id, reason));
    }
}
