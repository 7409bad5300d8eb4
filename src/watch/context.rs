//! Shared scheduling context.
//!
//! One context per process: it owns the worker pool that runs every watch loop
//! and probe, a fixed number of watch-loop slots, and a bound on how many
//! probes run at once across all watchers. Watchers hold a clone of
//! the context; [`WatchContext::shutdown`] stops everything running on it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::task::JoinHandle;

use super::WatchError;

/// Default number of worker threads.
pub const DEFAULT_WORKERS: usize = 2;

/// Default number of concurrently running watch loops.
pub const DEFAULT_CAPACITY: usize = 16;

/// Default number of probes running at the same time across all watchers.
pub const DEFAULT_MAX_CONCURRENT_PROBES: usize = 4;

/// Default grace period for in-flight work at shutdown (5 seconds).
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Sizing of the shared context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextSettings {
    /// Worker threads in the pool.
    pub workers: usize,
    /// Watch loops that may run at the same time.
    pub capacity: usize,
    /// Probes that may be in flight at the same time, over all watch loops.
    pub max_concurrent_probes: usize,
    /// How long shutdown waits for in-flight tasks before dropping them.
    pub shutdown_timeout: Duration,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            capacity: DEFAULT_CAPACITY,
            max_concurrent_probes: DEFAULT_MAX_CONCURRENT_PROBES,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl ContextSettings {
    /// Set the worker thread count.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the number of watch-loop slots.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the bound on concurrently running probes.
    pub fn with_max_concurrent_probes(mut self, max: usize) -> Self {
        self.max_concurrent_probes = max;
        self
    }

    /// Set the shutdown grace period.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

struct ContextInner {
    runtime: Mutex<Option<Runtime>>,
    handle: Handle,
    slots: Arc<Semaphore>,
    capacity: usize,
    probe_slots: Arc<Semaphore>,
    max_concurrent_probes: usize,
    shutdown_timeout: Duration,
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        // Never block here: the last clone may be dropped on a runtime thread.
        if let Some(runtime) = self.runtime.get_mut().take() {
            runtime.shutdown_background();
        }
    }
}

/// Process-wide scheduling resource shared by all watchers.
///
/// Cheap to clone; all clones refer to the same worker pool.
#[derive(Clone)]
pub struct WatchContext {
    inner: Arc<ContextInner>,
}

impl WatchContext {
    /// Build the worker pool.
    ///
    /// # Errors
    /// Returns `WatchError::Runtime` if the runtime cannot be created.
    pub fn setup(settings: ContextSettings) -> Result<Self, WatchError> {
        let workers = settings.workers.max(1);
        let runtime = Builder::new_multi_thread()
            .worker_threads(workers)
            .thread_name("relaywatch-worker")
            .enable_all()
            .build()
            .map_err(WatchError::Runtime)?;
        let handle = runtime.handle().clone();
        let max_concurrent_probes = settings.max_concurrent_probes.max(1);

        tracing::debug!(
            workers,
            capacity = settings.capacity,
            max_concurrent_probes,
            "Watch context set up"
        );

        Ok(Self {
            inner: Arc::new(ContextInner {
                runtime: Mutex::new(Some(runtime)),
                handle,
                slots: Arc::new(Semaphore::new(settings.capacity)),
                capacity: settings.capacity,
                probe_slots: Arc::new(Semaphore::new(max_concurrent_probes)),
                max_concurrent_probes,
                shutdown_timeout: settings.shutdown_timeout,
            }),
        })
    }

    /// Runtime handle, e.g. for `block_on` from a non-async caller.
    pub fn handle(&self) -> &Handle {
        &self.inner.handle
    }

    /// Total number of watch-loop slots.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Number of watch loops currently holding a slot.
    pub fn active_watchers(&self) -> usize {
        if self.is_shut_down() {
            return 0;
        }
        self.inner.capacity - self.inner.slots.available_permits()
    }

    /// Upper bound on probes in flight at the same time.
    pub fn max_concurrent_probes(&self) -> usize {
        self.inner.max_concurrent_probes
    }

    /// Whether [`WatchContext::shutdown`] has been called.
    pub fn is_shut_down(&self) -> bool {
        self.inner.slots.is_closed()
    }

    /// Take one watch-loop slot without waiting.
    pub(crate) fn reserve(&self) -> Result<OwnedSemaphorePermit, WatchError> {
        Arc::clone(&self.inner.slots)
            .try_acquire_owned()
            .map_err(|e| match e {
                TryAcquireError::Closed => WatchError::ContextClosed,
                TryAcquireError::NoPermits => WatchError::CapacityExhausted {
                    capacity: self.inner.capacity,
                },
            })
    }

    /// Semaphore every probe holds a permit of while it runs.
    pub(crate) fn probe_slots(&self) -> Arc<Semaphore> {
        Arc::clone(&self.inner.probe_slots)
    }

    pub(crate) fn spawn<F>(&self, future: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.inner.handle.spawn(future)
    }

    /// Stop every watch loop and release the worker pool.
    ///
    /// In-flight probes get the configured grace period, then their tasks are
    /// dropped; probe subprocesses are killed on drop, so none outlives this
    /// call. Further `start()` calls on any watcher fail with
    /// `WatchError::ContextClosed`. Calling it again is a no-op.
    ///
    /// Must not be called from inside an async context.
    pub fn shutdown(&self) {
        self.inner.slots.close();
        self.inner.probe_slots.close();

        let runtime = self.inner.runtime.lock().take();
        if let Some(runtime) = runtime {
            runtime.shutdown_timeout(self.inner.shutdown_timeout);
            tracing::info!("Watch context shutdown complete");
        }
    }
}

impl std::fmt::Debug for WatchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchContext")
            .field("capacity", &self.inner.capacity)
            .field("max_concurrent_probes", &self.inner.max_concurrent_probes)
            .field("active_watchers", &self.active_watchers())
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_settings_builder() {
        let settings = ContextSettings::default()
            .with_workers(4)
            .with_capacity(2)
            .with_max_concurrent_probes(3)
            .with_shutdown_timeout(Duration::from_secs(1));

        assert_eq!(settings.workers, 4);
        assert_eq!(settings.capacity, 2);
        assert_eq!(settings.max_concurrent_probes, 3);
        assert_eq!(settings.shutdown_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_reserve_until_exhausted() {
        let context = WatchContext::setup(ContextSettings::default().with_capacity(2)).unwrap();

        let first = context.reserve().unwrap();
        let _second = context.reserve().unwrap();
        assert_eq!(context.active_watchers(), 2);

        let err = context.reserve().unwrap_err();
        assert!(matches!(err, WatchError::CapacityExhausted { capacity: 2 }));

        drop(first);
        assert_eq!(context.active_watchers(), 1);
        assert!(context.reserve().is_ok());

        context.shutdown();
    }

    #[test]
    fn test_max_concurrent_probes_at_least_one() {
        let context =
            WatchContext::setup(ContextSettings::default().with_max_concurrent_probes(0)).unwrap();
        assert_eq!(context.max_concurrent_probes(), 1);
        assert_eq!(context.probe_slots().available_permits(), 1);

        context.shutdown();
        assert!(context.probe_slots().is_closed());
    }

    #[test]
    fn test_shutdown_closes_slots() {
        let context = WatchContext::setup(ContextSettings::default()).unwrap();
        assert!(!context.is_shut_down());

        context.shutdown();
        assert!(context.is_shut_down());
        assert_eq!(context.active_watchers(), 0);
        assert!(matches!(context.reserve(), Err(WatchError::ContextClosed)));

        // Second call is harmless.
        context.shutdown();
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_shutdown_kills_running_subprocess() {
        let context = WatchContext::setup(
            ContextSettings::default().with_shutdown_timeout(Duration::from_millis(50)),
        )
        .unwrap();
        let (pid_tx, pid_rx) = std::sync::mpsc::channel();

        context.spawn(async move {
            let mut child = tokio::process::Command::new("sleep")
                .arg("30")
                .kill_on_drop(true)
                .spawn()
                .unwrap();
            let _ = pid_tx.send(child.id());
            let _ = child.wait().await;
        });

        let pid = pid_rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
        let start = std::time::Instant::now();
        context.shutdown();
        assert!(start.elapsed() < Duration::from_secs(5));

        // Killed children are either reaped already or linger as zombies.
        std::thread::sleep(Duration::from_millis(100));
        let status = std::fs::read_to_string(format!("/proc/{pid}/stat")).unwrap_or_default();
        let state = status.split_whitespace().nth(2).unwrap_or("X");
        assert!(state == "Z" || state == "X", "unexpected process state: {state}");
    }
}
