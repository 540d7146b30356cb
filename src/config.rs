//! Configuration keys consumed by the allocator.
//!
//! Loaded with the `config` crate layered over defaults, a TOML file and
//! `ALLOCATOR_*` environment overrides.

use crate::error::{AllocatorError, Result};
use serde::{Deserialize, Serialize};

/// Minimum executor memory overhead applied on top of the percentage-based
/// overhead.
pub const MIN_OVERHEAD_MB: i64 = 384;

/// Default overhead factor (10%) applied to executor memory when the
/// config does not override it.
pub const DEFAULT_OVERHEAD_FACTOR: f64 = 0.10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocatorConfig {
    /// Executor memory, MB.
    pub executor_memory_mb: i64,
    /// Executor memory overhead, MB. `None` derives it from
    /// `DEFAULT_OVERHEAD_FACTOR`/`overhead_factor`.
    pub executor_memory_overhead_mb: Option<i64>,
    /// Overhead factor override (default 0.10).
    pub overhead_factor: Option<f64>,
    /// Extra per-executor memory for interpreter-style applications, MB.
    pub extra_interpreter_worker_memory_mb: Option<i64>,
    /// Whether this application runs an interpreter worker alongside the
    /// executor (gates `extra_interpreter_worker_memory_mb`).
    pub is_interpreter_app: bool,
    /// Executor vcore count.
    pub executor_cores: i32,
    /// Max size of the container launcher thread pool.
    pub container_launcher_max_threads: usize,
    /// Optional node-label expression forwarded on every container request.
    pub node_label_expression: Option<String>,
    /// Initial executor count, with a fallback if unset.
    pub initial_executors: i32,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            executor_memory_mb: 1024,
            executor_memory_overhead_mb: None,
            overhead_factor: None,
            extra_interpreter_worker_memory_mb: None,
            is_interpreter_app: false,
            executor_cores: 1,
            container_launcher_max_threads: 25,
            node_label_expression: None,
            initial_executors: 2,
        }
    }
}

impl AllocatorConfig {
    /// Load configuration from (in increasing precedence order) compiled-in
    /// defaults, an optional TOML file, and `ALLOCATOR_*` environment
    /// variables.
    pub fn load(config_file: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&AllocatorConfig::default())
                .map_err(|e| AllocatorError::Config(e.to_string()))?);

        if let Some(path) = config_file {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("ALLOCATOR")
                .separator("_")
                .try_parsing(true),
        );

        let raw = builder
            .build()
            .map_err(|e| AllocatorError::Config(e.to_string()))?;

        let cfg: AllocatorConfig = raw
            .try_deserialize()
            .map_err(|e| AllocatorError::Config(e.to_string()))?;

        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.executor_memory_mb <= 0 {
            return Err(AllocatorError::Config(
                "executor_memory_mb must be positive".to_string(),
            ));
        }
        if self.executor_cores <= 0 {
            return Err(AllocatorError::Config(
                "executor_cores must be positive".to_string(),
            ));
        }
        if self.container_launcher_max_threads == 0 {
            return Err(AllocatorError::Config(
                "container_launcher_max_threads must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = AllocatorConfig::default();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn env_override_applies() {
        std::env::set_var("ALLOCATOR_EXECUTOR_CORES", "4");
        let cfg = AllocatorConfig::load(None).unwrap();
        assert_eq!(cfg.executor_cores, 4);
        std::env::remove_var("ALLOCATOR_EXECUTOR_CORES");
    }

    #[test]
    fn rejects_zero_cores() {
        let mut cfg = AllocatorConfig::default();
        cfg.executor_cores = 0;
        assert!(cfg.validate().is_err());
    }
}
