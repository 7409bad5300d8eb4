//! Remote watcher: endpoint registry and recurring watch loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

use super::{Address, ElementState, RemoteElement, WatchContext, WatchError};
use crate::probe::Probe;

/// Default duration between two ticks (5 seconds).
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// Minimum allowed tick interval (100 milliseconds).
pub const MIN_INTERVAL: Duration = Duration::from_millis(100);

type Registry = Arc<RwLock<HashMap<Address, Arc<RemoteElement>>>>;

#[derive(Default)]
struct Lifecycle {
    watch_task: Option<JoinHandle<()>>,
    /// Context slot held for as long as `watch_task` is set.
    slot: Option<OwnedSemaphorePermit>,
    shutting_down: bool,
}

impl Lifecycle {
    fn is_running(&self) -> bool {
        self.watch_task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

/// Watch availability and health of remote elements such as streaming servers.
///
/// Registration and state reads only touch in-memory locks, so every method
/// can be called from any thread without waiting on the network. Probing runs
/// on the shared [`WatchContext`] as a single loop per watcher: one tick
/// probes every registered element concurrently and the next tick starts only
/// after the previous one has finished. Ticks that fall due while a slow tick
/// is still running are skipped, not queued.
pub struct RemoteWatcher {
    context: WatchContext,
    probe: Arc<dyn Probe>,
    interval: Duration,
    elements: Registry,
    lifecycle: Mutex<Lifecycle>,
}

impl RemoteWatcher {
    /// Create an empty, not-yet-started watcher.
    pub fn new(context: &WatchContext, probe: Arc<dyn Probe>) -> Self {
        Self {
            context: context.clone(),
            probe,
            interval: DEFAULT_INTERVAL,
            elements: Arc::new(RwLock::new(HashMap::new())),
            lifecycle: Mutex::new(Lifecycle::default()),
        }
    }

    /// Set the tick interval.
    ///
    /// Interval is clamped to a minimum of [`MIN_INTERVAL`]. Takes effect on
    /// the next `start()`.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = if interval < MIN_INTERVAL {
            tracing::warn!(
                min_interval = ?MIN_INTERVAL,
                "Watch interval is less than minimum allowed. Using minimum interval."
            );
            MIN_INTERVAL
        } else {
            interval
        };
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Watch the element at `address`.
    ///
    /// Registering an address twice keeps the existing element and its state.
    /// Returns the registered element either way.
    pub fn add_watcher(&self, address: Address) -> Arc<RemoteElement> {
        let mut elements = self.elements.write();
        if let Some(element) = elements.get(&address) {
            return Arc::clone(element);
        }

        tracing::debug!(host = %address.host(), port = address.port(), "Watcher to remote element added");
        let element = Arc::new(RemoteElement::new(address.clone(), Arc::clone(&self.probe)));
        elements.insert(address, Arc::clone(&element));
        element
    }

    /// Stop watching the element at `address`.
    ///
    /// Returns the removed element, or `None` if it was not registered.
    pub fn remove_watcher(&self, address: &Address) -> Option<Arc<RemoteElement>> {
        let removed = self.elements.write().remove(address);
        if removed.is_some() {
            tracing::debug!(host = %address.host(), port = address.port(), "Watcher to remote element removed");
        }
        removed
    }

    /// Look up a registered element.
    pub fn element(&self, address: &Address) -> Option<Arc<RemoteElement>> {
        self.elements.read().get(address).cloned()
    }

    /// Number of registered elements.
    pub fn len(&self) -> usize {
        self.elements.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.read().is_empty()
    }

    /// State of every registered element, ordered by address.
    pub fn snapshot(&self) -> Vec<(Address, ElementState)> {
        let mut states: Vec<_> = self
            .elements
            .read()
            .iter()
            .map(|(address, element)| (address.clone(), element.get_state()))
            .collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    }

    /// Start watching remote elements by checking on them at a fixed interval.
    ///
    /// Does nothing if already running.
    ///
    /// # Errors
    /// - `WatchError::CapacityExhausted` if the context has no free watch-loop slot
    /// - `WatchError::ContextClosed` if the context was shut down
    ///
    /// On error the watcher stays stopped.
    pub fn start(&self) -> Result<(), WatchError> {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.is_running() {
            return Ok(());
        }

        // A loop that ended on its own still holds a slot.
        if let Some(task) = lifecycle.watch_task.take() {
            task.abort();
        }
        lifecycle.slot = None;

        let slot = self.context.reserve().inspect_err(|e| {
            tracing::error!(error = %e, "Failed to start remote watcher");
        })?;
        let task = self.context.spawn(watch_loop(
            Arc::clone(&self.elements),
            self.context.probe_slots(),
            self.interval,
        ));

        lifecycle.watch_task = Some(task);
        lifecycle.slot = Some(slot);
        lifecycle.shutting_down = false;

        tracing::info!(interval = ?self.interval, probe = self.probe.kind(), "Remote watcher started");
        Ok(())
    }

    /// Stop the watch loop.
    ///
    /// No tick fires after this returns. A probe in flight is cancelled and
    /// its subprocess killed. The context slot is free again on return, so an
    /// immediate `start()` succeeds. Registered elements are kept for the
    /// next `start()`. Does nothing if not running.
    pub fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock();
        let Some(task) = lifecycle.watch_task.take() else {
            return;
        };

        task.abort();
        lifecycle.slot = None;
        lifecycle.shutting_down = true;
        tracing::info!("Remote watcher stopped");
    }

    /// Whether the watch loop is scheduled.
    pub fn is_running(&self) -> bool {
        self.lifecycle.lock().is_running()
    }

    /// Whether the watcher was stopped after having run.
    pub fn is_shutting_down(&self) -> bool {
        self.lifecycle.lock().shutting_down
    }
}

impl Drop for RemoteWatcher {
    fn drop(&mut self) {
        if let Some(task) = self.lifecycle.get_mut().watch_task.take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for RemoteWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteWatcher")
            .field("interval", &self.interval)
            .field("probe", &self.probe.kind())
            .field("element_count", &self.len())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

/// Recurring watch activity.
async fn watch_loop(elements: Registry, probe_slots: Arc<Semaphore>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        run_tick(&elements, &probe_slots).await;
    }
}

/// Probe every element registered at the start of the tick.
///
/// At most `probe_slots` probes of the whole context run at once; the rest
/// of the batch waits for a slot.
async fn run_tick(elements: &Registry, probe_slots: &Arc<Semaphore>) {
    // Snapshot so registration changes never block on, or disturb, a running tick.
    let batch: Vec<Arc<RemoteElement>> = elements.read().values().cloned().collect();
    if batch.is_empty() {
        return;
    }

    let start = Instant::now();
    let count = batch.len();
    let mut probes = JoinSet::new();
    for element in batch {
        let Ok(permit) = Arc::clone(probe_slots).acquire_owned().await else {
            // Context shut down mid-tick.
            break;
        };
        probes.spawn(async move {
            element.ping().await;
            drop(permit);
        });
    }

    while let Some(result) = probes.join_next().await {
        if let Err(e) = result {
            if e.is_panic() {
                tracing::error!(error = %e, "Probe task panicked");
            }
        }
    }

    tracing::debug!(count, duration_ms = start.elapsed().as_millis(), "Remote check wave complete");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{ProbeError, ProbeOutcome};
    use crate::watch::ContextSettings;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Probe that always reports the endpoint reachable and counts calls.
    #[derive(Default)]
    struct CountingProbe {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Probe for CountingProbe {
        fn kind(&self) -> &str {
            "counting"
        }

        fn timeout(&self) -> Duration {
            Duration::from_millis(100)
        }

        async fn probe(&self, _address: &Address) -> Result<ProbeOutcome, ProbeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ProbeOutcome::reachable(7))
        }
    }

    fn context() -> WatchContext {
        WatchContext::setup(ContextSettings::default()).unwrap()
    }

    fn address() -> Address {
        Address::new("::1", 8000)
    }

    #[test]
    fn test_add_watcher() {
        let context = context();
        let watcher = RemoteWatcher::new(&context, Arc::new(CountingProbe::default()));

        let element = watcher.add_watcher(address());
        assert_eq!(watcher.len(), 1);

        // Several calls with the same argument do nothing
        let again = watcher.add_watcher(address());
        assert_eq!(watcher.len(), 1);
        assert!(Arc::ptr_eq(&element, &again));
        assert!(Arc::ptr_eq(&element, &watcher.element(&address()).unwrap()));

        context.shutdown();
    }

    #[test]
    fn test_add_watcher_keeps_existing_state() {
        let context = context();
        let watcher = RemoteWatcher::new(&context, Arc::new(CountingProbe::default()));

        watcher.add_watcher(address()).set_state(true, false, 3);
        let state = watcher.add_watcher(address()).get_state();
        assert!(state.host_running);
        assert!(!state.port_open);

        context.shutdown();
    }

    #[test]
    fn test_remove_watcher() {
        let context = context();
        let watcher = RemoteWatcher::new(&context, Arc::new(CountingProbe::default()));

        watcher.add_watcher(address());
        let removed = watcher.remove_watcher(&address());
        assert_eq!(removed.unwrap().address(), &address());
        assert!(watcher.is_empty());

        // Unknown address is not an error
        assert!(watcher.remove_watcher(&address()).is_none());
        assert!(watcher.is_empty());

        context.shutdown();
    }

    #[test]
    fn test_start_twice_schedules_once() {
        let context = context();
        let watcher = RemoteWatcher::new(&context, Arc::new(CountingProbe::default()));

        watcher.start().unwrap();
        watcher.start().unwrap();
        assert!(watcher.is_running());
        assert_eq!(context.active_watchers(), 1);

        watcher.stop();
        context.shutdown();
    }

    #[test]
    fn test_stop() {
        let context = context();
        let watcher = RemoteWatcher::new(&context, Arc::new(CountingProbe::default()));
        watcher.add_watcher(address());

        // Does nothing if not started beforehand
        watcher.stop();
        assert!(!watcher.is_shutting_down());

        watcher.start().unwrap();
        watcher.stop();
        assert!(watcher.is_shutting_down());
        assert!(!watcher.is_running());
        // Watched elements are kept for the next start
        assert!(!watcher.is_empty());

        // Restart clears the flag
        watcher.start().unwrap();
        assert!(!watcher.is_shutting_down());

        watcher.stop();
        context.shutdown();
    }

    #[test]
    fn test_stop_releases_slot() {
        let context = WatchContext::setup(ContextSettings::default().with_capacity(1)).unwrap();
        let first = RemoteWatcher::new(&context, Arc::new(CountingProbe::default()));
        let second = RemoteWatcher::new(&context, Arc::new(CountingProbe::default()));

        first.start().unwrap();
        let err = second.start().unwrap_err();
        assert!(matches!(err, WatchError::CapacityExhausted { capacity: 1 }));
        assert!(!second.is_running());

        first.stop();
        assert_eq!(context.active_watchers(), 0);
        second.start().unwrap();
        assert!(second.is_running());

        context.shutdown();
    }

    #[test]
    fn test_restart_at_full_capacity() {
        let context = WatchContext::setup(ContextSettings::default().with_capacity(1)).unwrap();
        let watcher = RemoteWatcher::new(&context, Arc::new(CountingProbe::default()))
            .with_interval(MIN_INTERVAL);
        watcher.add_watcher(address());

        for _ in 0..50 {
            watcher.start().unwrap();
            assert_eq!(context.active_watchers(), 1);
            watcher.stop();
            assert_eq!(context.active_watchers(), 0);
        }
        watcher.start().unwrap();
        assert!(watcher.is_running());

        watcher.stop();
        context.shutdown();
    }

    /// Probe that sleeps and records how many calls overlapped.
    #[derive(Default)]
    struct GaugeProbe {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Probe for GaugeProbe {
        fn kind(&self) -> &str {
            "gauge"
        }

        fn timeout(&self) -> Duration {
            Duration::from_secs(1)
        }

        async fn probe(&self, _address: &Address) -> Result<ProbeOutcome, ProbeError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ProbeOutcome::reachable(1))
        }
    }

    #[test]
    fn test_tick_bounds_concurrent_probes() {
        let context =
            WatchContext::setup(ContextSettings::default().with_max_concurrent_probes(3)).unwrap();
        let probe = Arc::new(GaugeProbe::default());
        let watcher = RemoteWatcher::new(&context, Arc::clone(&probe) as Arc<dyn Probe>);
        for i in 0..30u16 {
            watcher.add_watcher(Address::new("10.0.0.1", 8000 + i));
        }

        context
            .handle()
            .block_on(run_tick(&watcher.elements, &context.probe_slots()));

        assert_eq!(probe.calls.load(Ordering::SeqCst), 30);
        let peak = probe.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak concurrency {peak}");
        assert!(peak >= 2);
        // Every permit is back once the tick is over.
        assert_eq!(context.probe_slots().available_permits(), 3);

        context.shutdown();
    }

    #[test]
    fn test_start_after_context_shutdown() {
        let context = context();
        let watcher = RemoteWatcher::new(&context, Arc::new(CountingProbe::default()));

        context.shutdown();
        assert!(matches!(watcher.start(), Err(WatchError::ContextClosed)));
        assert!(!watcher.is_running());
        assert!(!watcher.is_shutting_down());
    }

    #[test]
    fn test_tick_probes_every_element() {
        let context = context();
        let probe = Arc::new(CountingProbe::default());
        let watcher = RemoteWatcher::new(&context, Arc::clone(&probe) as Arc<dyn Probe>)
            .with_interval(Duration::from_secs(60));

        let first = watcher.add_watcher(Address::new("10.0.0.1", 8000));
        let second = watcher.add_watcher(Address::new("10.0.0.2", 8000));
        watcher.start().unwrap();

        // The first tick fires immediately.
        let deadline = Instant::now() + Duration::from_secs(2);
        while probe.calls.load(Ordering::SeqCst) < 2 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        std::thread::sleep(Duration::from_millis(50));

        assert_eq!(probe.calls.load(Ordering::SeqCst), 2);
        assert!(first.get_state().available);
        assert_eq!(second.get_state().latency, 7);

        let snapshot = watcher.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].0, Address::new("10.0.0.1", 8000));

        watcher.stop();
        context.shutdown();
    }

    #[test]
    fn test_interval_clamped() {
        let context = context();
        let watcher = RemoteWatcher::new(&context, Arc::new(CountingProbe::default()))
            .with_interval(Duration::from_millis(1));
        assert_eq!(watcher.interval(), MIN_INTERVAL);

        context.shutdown();
    }
}
