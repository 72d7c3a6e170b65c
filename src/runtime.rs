//! Runtime abstraction layer for async operations
//!
//! Debounce timers, layer fetches and the vehicle poller all go through
//! [`spawn`], so an embedder can swap the executor with [`init_runtime`]
//! before the first task is spawned.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// A trait for spawning async tasks (object-safe version)
pub trait AsyncSpawner: Send + Sync + 'static {
    /// Spawn a future and return a handle to it
    fn spawn_boxed(
        &self,
        future: Pin<Box<dyn Future<Output = ()> + Send + 'static>>,
    ) -> Box<dyn AsyncHandle>;
}

/// Handle to a spawned async task
pub trait AsyncHandle: Send + Sync {
    /// Check if the task is finished
    fn is_finished(&self) -> bool;

    /// Cancel the task
    fn cancel(&self);
}

/// Spawns a future on the configured runtime
pub fn spawn<F>(future: F) -> Box<dyn AsyncHandle>
where
    F: Future<Output = ()> + Send + 'static,
{
    runtime().spawn_boxed(Box::pin(future))
}

/// Runs `work` as its own task once `delay` has elapsed.
///
/// The returned handle covers the wait only: cancelling it before the delay
/// drops `work` unstarted, cancelling it afterwards has no effect on `work`.
pub fn spawn_after<F>(delay: Duration, work: F) -> Box<dyn AsyncHandle>
where
    F: Future<Output = ()> + Send + 'static,
{
    spawn(async move {
        ::tokio::time::sleep(delay).await;
        spawn(work);
    })
}

/// Default spawner implementations
pub mod spawners {
    use super::*;

    pub mod tokio_impl {
        use super::*;
        use ::tokio::task::JoinHandle;

        /// Tokio-based async spawner; requires an ambient Tokio runtime
        pub struct TokioSpawner;

        impl AsyncSpawner for TokioSpawner {
            fn spawn_boxed(
                &self,
                future: Pin<Box<dyn Future<Output = ()> + Send + 'static>>,
            ) -> Box<dyn AsyncHandle> {
                let handle = ::tokio::spawn(future);
                Box::new(TokioHandle(handle))
            }
        }

        struct TokioHandle(JoinHandle<()>);

        impl AsyncHandle for TokioHandle {
            fn is_finished(&self) -> bool {
                self.0.is_finished()
            }

            fn cancel(&self) {
                self.0.abort();
            }
        }
    }
}

/// Global runtime instance
static RUNTIME: std::sync::OnceLock<Box<dyn AsyncSpawner>> = std::sync::OnceLock::new();

/// Initialize the runtime with a specific spawner
pub fn init_runtime(spawner: Box<dyn AsyncSpawner>) {
    if RUNTIME.set(spawner).is_err() {
        log::warn!("runtime already initialised; keeping the existing spawner");
    }
}

/// Get the global runtime spawner
pub fn runtime() -> &'static dyn AsyncSpawner {
    RUNTIME
        .get_or_init(|| Box::new(spawners::tokio_impl::TokioSpawner))
        .as_ref()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_tokio_spawner() {
        let handle = spawn(async {
            tokio::time::sleep(Duration::from_millis(10)).await;
        });

        // Should not be finished immediately
        assert!(!handle.is_finished());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(handle.is_finished());
    }

    #[tokio::test]
    async fn test_cancel_stops_task() {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let handle = spawn(async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            let _ = tx.send(());
        });

        handle.cancel();
        // The sender is dropped when the task is aborted
        assert!(rx.await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_after_waits_and_cancels() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let handle = spawn_after(Duration::from_millis(200), async move {
            flag.store(true, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!ran.load(Ordering::SeqCst));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(ran.load(Ordering::SeqCst));
        assert!(handle.is_finished());

        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let handle = spawn_after(Duration::from_millis(200), async move {
            flag.store(true, Ordering::SeqCst);
        });
        handle.cancel();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!ran.load(Ordering::SeqCst));
    }
}
