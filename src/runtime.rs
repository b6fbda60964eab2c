//! Runtime abstraction layer for async operations
//!
//! Tile loads are spawned through a process-wide [`AsyncSpawner`]. The
//! default spawner hands work to whatever Tokio runtime the caller is running
//! inside; embedders with their own executor can install a different one
//! with [`init_runtime`].

use crate::prelude::{Future, Pin};
use std::sync::atomic::Ordering;

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

/// Convenience function for spawning with type safety
pub fn spawn<F>(future: F) -> Box<dyn AsyncHandle>
where
    F: Future<Output = ()> + Send + 'static,
{
    runtime().spawn_boxed(Box::pin(future))
}

/// Default spawner implementations
pub mod spawners {
    use super::*;
    use ::tokio::runtime::Handle;
    use ::tokio::task::JoinHandle;

    /// Spawns onto the Tokio runtime of the calling thread
    pub struct TokioSpawner;

    impl AsyncSpawner for TokioSpawner {
        fn spawn_boxed(
            &self,
            future: Pin<Box<dyn Future<Output = ()> + Send + 'static>>,
        ) -> Box<dyn AsyncHandle> {
            match Handle::try_current() {
                Ok(handle) => Box::new(TokioHandle(handle.spawn(future))),
                Err(_) => {
                    log::warn!("no Tokio runtime on this thread; dropping background task");
                    Box::new(DroppedHandle)
                }
            }
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

    /// Handle for a task that never ran
    struct DroppedHandle;

    impl AsyncHandle for DroppedHandle {
        fn is_finished(&self) -> bool {
            true
        }

        fn cancel(&self) {}
    }

    /// Spawner that records how many tasks were handed to it and drops them.
    /// Useful for driving the engine synchronously.
    #[derive(Default)]
    pub struct NullSpawner {
        spawned: std::sync::atomic::AtomicUsize,
    }

    impl NullSpawner {
        pub fn spawned(&self) -> usize {
            self.spawned.load(Ordering::SeqCst)
        }
    }

    impl AsyncSpawner for NullSpawner {
        fn spawn_boxed(
            &self,
            _future: Pin<Box<dyn Future<Output = ()> + Send + 'static>>,
        ) -> Box<dyn AsyncHandle> {
            self.spawned.fetch_add(1, Ordering::SeqCst);
            Box::new(DroppedHandle)
        }
    }
}

/// Global runtime instance
static RUNTIME: std::sync::OnceLock<Box<dyn AsyncSpawner>> = std::sync::OnceLock::new();

/// Initialize the runtime with a specific spawner. Only the first call wins.
pub fn init_runtime(spawner: Box<dyn AsyncSpawner>) -> bool {
    let installed = RUNTIME.set(spawner).is_ok();
    if !installed {
        log::debug!("runtime already initialized; keeping the existing spawner");
    }
    installed
}

/// Get the global runtime spawner
pub fn runtime() -> &'static dyn AsyncSpawner {
    RUNTIME
        .get_or_init(|| Box::new(spawners::TokioSpawner))
        .as_ref()
}
