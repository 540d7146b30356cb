//! Executor launcher pool.
//!
//! The launcher itself — forking/exec'ing the worker process inside a
//! granted container — is an external collaborator; this
//! module only owns the bounded worker pool that runs it off the
//! allocator's single coarse lock.

use crate::error::AllocatorError;
use crate::types::{Container, ExecutorId, Host};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Everything the launcher needs to start a worker inside a granted
/// container. Stands in for a real
/// `launch(container, conf, driverUrl, execId, host, memMB, cores, appId, security, localResources)`.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub container: Container,
    pub executor_id: ExecutorId,
    pub host: Host,
    pub memory_mb: i64,
    pub cores: i32,
    pub driver_url: String,
    pub app_id: String,
    pub local_resources: HashMap<String, String>,
}

/// Outcome of one launch attempt. `run()` returning normally in the
/// original interface maps to `Success`; any non-fatal throwable maps to
/// `Failed` (swallowed, logged, counted).
#[derive(Debug, Clone)]
pub enum LaunchOutcome {
    Success,
    Failed(String),
}

/// Opaque launcher callable, forking/exec'ing the worker process.
pub trait ExecutorLauncher: Send + Sync {
    fn launch(&self, request: &LaunchRequest) -> LaunchOutcome;
}

/// Bounded daemon thread pool that runs [`ExecutorLauncher::launch`] calls
/// off the allocator's lock. Backed by a dedicated multi-thread runtime so
/// `stop()` can force a shutdown independent of whatever runtime the
/// caller's reconciliation loop happens to run on.
pub struct LauncherPool {
    runtime: Mutex<Option<tokio::runtime::Runtime>>,
    semaphore: Arc<Semaphore>,
}

impl LauncherPool {
    pub fn new(max_threads: usize) -> Result<Self, AllocatorError> {
        let max_threads = max_threads.max(1);
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(max_threads)
            .thread_name("container-launcher")
            .enable_all()
            .build()
            .map_err(|e| AllocatorError::LaunchFailed(e.to_string()))?;

        Ok(Self {
            runtime: Mutex::new(Some(runtime)),
            semaphore: Arc::new(Semaphore::new(max_threads)),
        })
    }

    /// Dispatch a launch. `on_complete` is invoked off-lock, on a pool
    /// worker, once the launcher has returned; it is the caller's
    /// responsibility to re-acquire the allocator's lock inside it before
    /// touching shared state.
    pub fn dispatch<L, F>(&self, launcher: Arc<L>, request: LaunchRequest, on_complete: F)
    where
        L: ExecutorLauncher + 'static,
        F: FnOnce(LaunchOutcome) + Send + 'static,
    {
        let guard = self.runtime.lock();
        let Some(rt) = guard.as_ref() else {
            warn!("launcher pool already stopped, dropping launch request");
            drop(guard);
            on_complete(LaunchOutcome::Failed("launcher pool stopped".to_string()));
            return;
        };

        let semaphore = self.semaphore.clone();
        rt.spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            debug!(executor_id = %request.executor_id, "launching executor");
            match tokio::task::spawn_blocking(move || launcher.launch(&request)).await {
                Ok(outcome) => on_complete(outcome),
                // A panicking launcher is treated as fatal, the same way the
                // source this was distilled from lets a JVM-fatal error
                // rethrow instead of being swallowed into a normal failure:
                // no cleanup callback runs, and the panic keeps unwinding.
                Err(join_error) => std::panic::resume_unwind(join_error.into_panic()),
            }
        });
    }

    /// Force-shutdown, interrupting in-flight launches. This is the
    /// `stop()`). Their partial state is cleaned up by the launch-failure
    /// path in the allocator, not here.
    pub fn stop(&self) {
        if let Some(rt) = self.runtime.lock().take() {
            rt.shutdown_background();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ContainerId;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct AlwaysSucceeds;
    impl ExecutorLauncher for AlwaysSucceeds {
        fn launch(&self, _request: &LaunchRequest) -> LaunchOutcome {
            LaunchOutcome::Success
        }
    }

    struct AlwaysFails;
    impl ExecutorLauncher for AlwaysFails {
        fn launch(&self, _request: &LaunchRequest) -> LaunchOutcome {
            LaunchOutcome::Failed("boom".to_string())
        }
    }

    fn request(id: u64) -> LaunchRequest {
        LaunchRequest {
            container: Container {
                id: ContainerId(format!("c{id}")),
                host: "h1".to_string(),
                memory_mb: 1024,
                vcores: 1,
            },
            executor_id: ExecutorId(id),
            host: "h1".to_string(),
            memory_mb: 1024,
            cores: 1,
            driver_url: "driver://localhost".to_string(),
            app_id: "app-1".to_string(),
            local_resources: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn successful_launch_invokes_callback_with_success() {
        let pool = LauncherPool::new(2).unwrap();
        let done = Arc::new(AtomicBool::new(false));
        let done2 = done.clone();
        let (tx, rx) = tokio::sync::oneshot::channel();
        pool.dispatch(Arc::new(AlwaysSucceeds), request(1), move |outcome| {
            done2.store(true, Ordering::SeqCst);
            let _ = tx.send(outcome);
        });
        let outcome = rx.await.unwrap();
        assert!(matches!(outcome, LaunchOutcome::Success));
        assert!(done.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn failed_launch_invokes_callback_with_failure() {
        let pool = LauncherPool::new(1).unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel();
        pool.dispatch(Arc::new(AlwaysFails), request(2), move |outcome| {
            let _ = tx.send(outcome);
        });
        let outcome = rx.await.unwrap();
        assert!(matches!(outcome, LaunchOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn stopped_pool_rejects_new_launches() {
        let pool = LauncherPool::new(1).unwrap();
        pool.stop();
        let (tx, rx) = tokio::sync::oneshot::channel();
        pool.dispatch(Arc::new(AlwaysSucceeds), request(3), move |outcome| {
            let _ = tx.send(outcome);
        });
        let outcome = rx.await.unwrap();
        assert!(matches!(outcome, LaunchOutcome::Failed(_)));
    }
}
