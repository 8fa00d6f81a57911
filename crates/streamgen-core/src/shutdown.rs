//! Process-wide shutdown coordination.
//!
//! The coordinator is an explicit object passed to every component that has
//! to observe shutdown; nothing here is global. Lifecycle:
//!
//! ```text
//! new() -> install_signal_handlers() -> register_cleanup(..)* -> run -> initiate_shutdown()
//!
//! Running ──initiate_shutdown()──▶ ShuttingDown ──cleanups done──▶ Stopped
//! ```
//!
//! Cleanups run once, sequentially, in reverse registration order. A failing
//! or panicking cleanup is logged and the remaining ones still run.

use crate::error::ShutdownError;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Shutdown lifecycle state. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ShutdownState {
    Running,
    ShuttingDown,
    Stopped,
}

type CleanupFn = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send>;

struct Cleanup {
    name: String,
    run: CleanupFn,
}

/// One-shot shutdown state machine with ordered cleanup actions.
pub struct ShutdownCoordinator {
    state: watch::Sender<ShutdownState>,
    cleanups: Mutex<Vec<Cleanup>>,
}

impl std::fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("state", &self.state())
            .field("cleanups", &self.cleanups.lock().len())
            .finish()
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ShutdownState::Running);
        Self {
            state,
            cleanups: Mutex::new(Vec::new()),
        }
    }

    pub fn state(&self) -> ShutdownState {
        *self.state.borrow()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.state() != ShutdownState::Running
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == ShutdownState::Stopped
    }

    /// A receiver that observes every state transition.
    pub fn subscribe(&self) -> watch::Receiver<ShutdownState> {
        self.state.subscribe()
    }

    /// Register a cleanup action.
    ///
    /// Cleanups run in reverse registration order. Registration is refused
    /// once shutdown has begun.
    pub fn register_cleanup<F, Fut>(
        &self,
        name: impl Into<String>,
        cleanup: F,
    ) -> Result<(), ShutdownError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let mut cleanups = self.cleanups.lock();
        if self.is_shutting_down() {
            return Err(ShutdownError::ShuttingDown);
        }
        let name = name.into();
        debug!("Registered cleanup '{}'", name);
        cleanups.push(Cleanup {
            name,
            run: Box::new(move || cleanup().boxed()),
        });
        Ok(())
    }

    /// Move to `ShuttingDown`, run every cleanup, then move to `Stopped`.
    ///
    /// Only the first caller runs the cleanups; later and concurrent callers
    /// return immediately. Use [`wait_stopped`](Self::wait_stopped) to wait
    /// for completion.
    pub async fn initiate_shutdown(&self) {
        let cleanups = {
            let mut cleanups = self.cleanups.lock();
            let started = self.state.send_if_modified(|state| {
                if *state == ShutdownState::Running {
                    *state = ShutdownState::ShuttingDown;
                    true
                } else {
                    false
                }
            });
            if !started {
                return;
            }
            std::mem::take(&mut *cleanups)
        };

        info!("Shutdown initiated, running {} cleanup(s)", cleanups.len());

        for Cleanup { name, run } in cleanups.into_iter().rev() {
            debug!("Running cleanup '{}'", name);
            // Building the future is guarded too: a cleanup may panic before
            // it returns one.
            match AssertUnwindSafe(async move { run().await })
                .catch_unwind()
                .await
            {
                Ok(Ok(())) => debug!("Cleanup '{}' finished", name),
                Ok(Err(e)) => warn!("Cleanup '{}' failed: {e:#}", name),
                Err(_) => warn!("Cleanup '{}' panicked", name),
            }
        }

        self.state.send_replace(ShutdownState::Stopped);
        info!("Shutdown complete");
    }

    /// Resolve once the coordinator reaches `Stopped`.
    pub async fn wait_stopped(&self) {
        let mut rx = self.subscribe();
        // The sender lives in self, so the channel cannot close here.
        let _ = rx.wait_for(|state| *state == ShutdownState::Stopped).await;
    }

    /// Resolve once shutdown has begun.
    pub async fn wait_shutting_down(&self) {
        let mut rx = self.subscribe();
        let _ = rx.wait_for(|state| *state != ShutdownState::Running).await;
    }

    /// Spawn a task that turns the first termination signal into
    /// [`initiate_shutdown`](Self::initiate_shutdown).
    ///
    /// Duplicate signals are ignored; the task exits after the first one or
    /// when shutdown starts by other means.
    pub fn install_signal_handlers(self: &Arc<Self>) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                signal = termination_signal() => {
                    match signal {
                        Ok(name) => info!("Received {name}, shutting down"),
                        Err(e) => {
                            warn!("Failed to listen for termination signals: {e}");
                            return;
                        }
                    }
                    coordinator.initiate_shutdown().await;
                }
                _ = coordinator.wait_shutting_down() => {}
            }
        })
    }
}

#[cfg(unix)]
async fn termination_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|_| "SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn termination_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|_| "Ctrl-C")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn exploding_cleanup() -> anyhow::Result<()> {
        panic!("boom")
    }

    fn exploding_factory() -> std::future::Ready<anyhow::Result<()>> {
        panic!("boom before the future exists")
    }

    #[tokio::test]
    async fn test_cleanups_run_in_reverse_order() {
        let coordinator = ShutdownCoordinator::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..4 {
            let order = Arc::clone(&order);
            coordinator
                .register_cleanup(format!("cleanup-{i}"), move || async move {
                    order.lock().push(i);
                    anyhow::Ok(())
                })
                .unwrap();
        }

        assert_eq!(coordinator.state(), ShutdownState::Running);
        coordinator.initiate_shutdown().await;

        assert_eq!(*order.lock(), vec![3, 2, 1, 0]);
        assert!(coordinator.is_stopped());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_initiate_runs_each_cleanup_once() {
        let coordinator = Arc::new(ShutdownCoordinator::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5 {
            let order = Arc::clone(&order);
            coordinator
                .register_cleanup(format!("cleanup-{i}"), move || async move {
                    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                    order.lock().push(i);
                    anyhow::Ok(())
                })
                .unwrap();
        }

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let coordinator = Arc::clone(&coordinator);
                tokio::spawn(async move {
                    coordinator.initiate_shutdown().await;
                    coordinator.wait_stopped().await;
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*order.lock(), vec![4, 3, 2, 1, 0]);
        assert!(coordinator.is_stopped());
    }

    #[tokio::test]
    async fn test_failing_cleanup_does_not_block_others() {
        let coordinator = ShutdownCoordinator::new();
        let ran = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&ran);
        coordinator
            .register_cleanup("first", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                anyhow::Ok(())
            })
            .unwrap();
        coordinator
            .register_cleanup("failing", || async {
                Err::<(), _>(anyhow::anyhow!("sink unreachable"))
            })
            .unwrap();
        coordinator
            .register_cleanup("panicking", || async { exploding_cleanup() })
            .unwrap();

        coordinator.initiate_shutdown().await;

        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert!(coordinator.is_stopped());
    }

    #[tokio::test]
    async fn test_cleanup_panicking_synchronously_does_not_block_others() {
        let coordinator = Arc::new(ShutdownCoordinator::new());
        let ran = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&ran);
        coordinator
            .register_cleanup("first", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                anyhow::Ok(())
            })
            .unwrap();
        coordinator
            .register_cleanup("sync-panic", exploding_factory)
            .unwrap();

        let task = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.initiate_shutdown().await })
        };
        assert!(task.await.is_ok());

        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.state(), ShutdownState::Stopped);
        tokio::time::timeout(std::time::Duration::from_secs(1), coordinator.wait_stopped())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_repeat_initiate_is_noop() {
        let coordinator = ShutdownCoordinator::new();
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran);
        coordinator
            .register_cleanup("count", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                anyhow::Ok(())
            })
            .unwrap();

        coordinator.initiate_shutdown().await;
        coordinator.initiate_shutdown().await;

        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_register_after_shutdown_refused() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.initiate_shutdown().await;

        let result = coordinator.register_cleanup("late", || async { anyhow::Ok(()) });
        assert_eq!(result, Err(ShutdownError::ShuttingDown));
    }

    #[tokio::test]
    async fn test_subscribers_observe_transition() {
        let coordinator = Arc::new(ShutdownCoordinator::new());
        let waiter = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.wait_shutting_down().await })
        };

        assert!(!coordinator.is_shutting_down());
        coordinator.initiate_shutdown().await;
        waiter.await.unwrap();
        assert!(coordinator.is_shutting_down());
    }
}
