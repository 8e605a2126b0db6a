//! Task spawning abstraction for runtime independence.
//!
//! The dispatcher and recovery coordinator spawn JSON-RPC work without
//! knowing which runtime drives them. Hosts embedding the library in their
//! own executor provide their own [`TaskSpawner`].

use futures::future::BoxFuture;

/// Abstraction for spawning background tasks.
///
/// Object safe so it can be stored as `Arc<dyn TaskSpawner>`; callers box
/// their futures.
///
/// # Example
///
/// ```ignore
/// spawner.spawn(Box::pin(async move {
///     control.play().await.ok();
/// }));
/// ```
pub trait TaskSpawner: Send + Sync {
    /// Spawns a future as a background task.
    ///
    /// The task runs independently of the caller. There is no handle to
    /// cancel or join it.
    fn spawn(&self, future: BoxFuture<'static, ()>);
}

/// Tokio-based spawner.
#[derive(Clone)]
pub struct TokioSpawner {
    handle: tokio::runtime::Handle,
}

impl TokioSpawner {
    /// Creates a new `TokioSpawner` with the given runtime handle.
    #[must_use]
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Creates a new `TokioSpawner` using the current runtime's handle.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context.
    #[must_use]
    pub fn current() -> Self {
        Self {
            handle: tokio::runtime::Handle::current(),
        }
    }
}

impl TaskSpawner for TokioSpawner {
    fn spawn(&self, future: BoxFuture<'static, ()>) {
        self.handle.spawn(future);
    }
}
