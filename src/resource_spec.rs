//! ResourceSpec: immutable per-executor resource capability.
//!
//! Computed once at construction from [`crate::config::AllocatorConfig`] and
//! reused verbatim on every outgoing container request.

use crate::config::{AllocatorConfig, DEFAULT_OVERHEAD_FACTOR, MIN_OVERHEAD_MB};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceSpec {
    pub memory_mb: i64,
    pub vcores: i32,
}

impl ResourceSpec {
    pub fn from_config(config: &AllocatorConfig) -> Self {
        let overhead = config.executor_memory_overhead_mb.unwrap_or_else(|| {
            let factor = config.overhead_factor.unwrap_or(DEFAULT_OVERHEAD_FACTOR);
            ((config.executor_memory_mb as f64 * factor).ceil() as i64).max(MIN_OVERHEAD_MB)
        });

        let interpreter_memory = if config.is_interpreter_app {
            config.extra_interpreter_worker_memory_mb.unwrap_or(0)
        } else {
            0
        };

        Self {
            memory_mb: config.executor_memory_mb + overhead + interpreter_memory,
            vcores: config.executor_cores,
        }
    }
}
