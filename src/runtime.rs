//! Runtime abstraction layer for async operations
//!
//! Fetch tasks and disk writes are spawned through an [`AsyncSpawner`] owned by
//! the engine, so hosts decide which executor carries the work. The default
//! implementation is backed by a tokio runtime handle.

use crate::prelude::{Arc, Future, Pin};
use crate::{Result, TileError};

/// A boxed, sendable unit of async work
pub type BoxTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// A boxed blocking closure
pub type BlockingTask = Box<dyn FnOnce() + Send + 'static>;

/// A trait for spawning async tasks (object-safe version)
pub trait AsyncSpawner: Send + Sync + 'static {
    /// Spawn a future and return a handle to it
    fn spawn_boxed(&self, future: BoxTask) -> Box<dyn AsyncHandle>;

    /// Run a blocking closure off the tick thread
    fn spawn_blocking_boxed(&self, task: BlockingTask) -> Box<dyn AsyncHandle>;
}

/// Handle to a spawned async task
pub trait AsyncHandle: Send + Sync {
    /// Check if the task is finished
    fn is_finished(&self) -> bool;

    /// Cancel the task
    fn cancel(&self);
}

/// Convenience wrapper for spawning with type inference
pub fn spawn<F>(spawner: &dyn AsyncSpawner, future: F) -> Box<dyn AsyncHandle>
where
    F: Future<Output = ()> + Send + 'static,
{
    spawner.spawn_boxed(Box::pin(future))
}

/// Convenience wrapper for blocking work
pub fn spawn_blocking<F>(spawner: &dyn AsyncSpawner, task: F) -> Box<dyn AsyncHandle>
where
    F: FnOnce() + Send + 'static,
{
    spawner.spawn_blocking_boxed(Box::new(task))
}

/// Tokio-based async spawner
#[derive(Debug, Clone)]
pub struct TokioSpawner {
    handle: tokio::runtime::Handle,
}

impl TokioSpawner {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Bind to the runtime the caller is currently running on
    pub fn current() -> Result<Self> {
        tokio::runtime::Handle::try_current()
            .map(Self::new)
            .map_err(|e| TileError::Config(format!("no tokio runtime available: {}", e)))
    }

    /// Shared spawner bound to the current runtime
    pub fn shared() -> Result<Arc<dyn AsyncSpawner>> {
        Ok(Arc::new(Self::current()?))
    }
}

impl AsyncSpawner for TokioSpawner {
    fn spawn_boxed(&self, future: BoxTask) -> Box<dyn AsyncHandle> {
        Box::new(TokioHandle(self.handle.spawn(future)))
    }

    fn spawn_blocking_boxed(&self, task: BlockingTask) -> Box<dyn AsyncHandle> {
        Box::new(TokioHandle(self.handle.spawn_blocking(task)))
    }
}

struct TokioHandle(tokio::task::JoinHandle<()>);

impl AsyncHandle for TokioHandle {
    fn is_finished(&self) -> bool {
        self.0.is_finished()
    }

    fn cancel(&self) {
        self.0.abort();
    }
}
