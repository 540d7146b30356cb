//! Typed errors for the allocator library. `anyhow::Result` is used at the
//! outer (binary/config-loading) boundary; internal components propagate
//! this enum so callers can match on the failure kind.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AllocatorError {
    #[error("resource manager call failed: {0}")]
    ResourceManager(String),

    #[error("rack resolution failed: {0}")]
    RackResolution(String),

    #[error("executor launch failed: {0}")]
    LaunchFailed(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, AllocatorError>;
