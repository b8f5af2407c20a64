//! Tokio runtime spawner implementation.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::core::Spawn;

/// Tokio-based spawner that dispatches query starts on a tokio runtime.
#[derive(Clone)]
pub struct TokioSpawner {
    handle: tokio::runtime::Handle,
    // Keeps an owned runtime alive for the spawner's lifetime; None when
    // built from a caller-owned handle.
    _runtime: Option<Arc<tokio::runtime::Runtime>>,
}

impl TokioSpawner {
    /// Create a spawner from an existing runtime handle.
    #[must_use]
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self {
            handle,
            _runtime: None,
        }
    }

    /// Create a spawner with its own multi-threaded runtime of
    /// `worker_threads` workers.
    pub fn with_worker_threads(worker_threads: usize) -> Result<Self, std::io::Error> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(worker_threads)
            .enable_all()
            .build()?;
        Ok(Self {
            handle: runtime.handle().clone(),
            _runtime: Some(Arc::new(runtime)),
        })
    }

    /// Create a spawner with its own runtime sized to the machine's
    /// logical CPU count.
    pub fn with_default_workers() -> Result<Self, std::io::Error> {
        Self::with_worker_threads(num_cpus::get())
    }
}

impl Spawn for TokioSpawner {
    fn spawn(&self, fut: Pin<Box<dyn Future<Output = ()> + Send + 'static>>) {
        self.handle.spawn(fut);
    }
}
