//! One shared flag context: snapshot store + flag source + background poller.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use flagpole_cache::SnapshotStore;
use flagpole_core::constants::{DEFAULT_REFRESH_INTERVAL, SHUTDOWN_GRACE};
use flagpole_core::error::Result;
use flagpole_core::traits::FlagSource;
use flagpole_core::types::{FlagPayload, FlagSnapshot};

/// Current refresh interval for one context.
///
/// Starts at [`DEFAULT_REFRESH_INTERVAL`] and is mutated only after a
/// successful fetch that carried a positive TTL.
#[derive(Debug)]
pub struct RefreshPolicy {
    interval: Mutex<Duration>,
}

impl RefreshPolicy {
    fn new() -> Self {
        Self {
            interval: Mutex::new(DEFAULT_REFRESH_INTERVAL),
        }
    }

    /// The interval the next cycle will be scheduled at.
    pub fn current_interval(&self) -> Duration {
        *self.interval.lock()
    }

    fn set_interval(&self, interval: Duration) {
        *self.interval.lock() = interval;
    }
}

/// Placeholder source for contexts built via [`FlagContext::with_snapshot`];
/// those contexts have no poller, so it is never fetched from.
struct IdleSource;

#[async_trait]
impl FlagSource for IdleSource {
    async fn fetch(&self) -> Result<FlagPayload> {
        Ok(FlagPayload::default())
    }
}

/// An eventually-consistent view of one endpoint's feature flags.
///
/// Construction via [`start`](Self::start) runs one priming cycle before
/// returning, so the first reader never observes an unprimed store (though
/// it may observe an empty one if that first cycle failed). A dedicated
/// background task then refreshes the snapshot once per interval; that task
/// is the only writer.
///
/// A context must be torn down through [`shutdown`](Self::shutdown) (the
/// registry does this when the last reference is released); the poller holds
/// the context alive, so merely dropping handles does not stop it.
pub struct FlagContext {
    store: SnapshotStore,
    source: Arc<dyn FlagSource>,
    policy: RefreshPolicy,
    reschedule_tx: watch::Sender<Duration>,
    shutdown_tx: watch::Sender<bool>,
    poller: Mutex<Option<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl FlagContext {
    /// Creates a context, runs its priming cycle, and starts the poller.
    ///
    /// The first scheduled cycle fires one full interval after the priming
    /// cycle, not immediately again.
    pub async fn start(source: Arc<dyn FlagSource>) -> Arc<Self> {
        let (reschedule_tx, reschedule_rx) = watch::channel(DEFAULT_REFRESH_INTERVAL);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let context = Arc::new(Self {
            store: SnapshotStore::new(),
            source,
            policy: RefreshPolicy::new(),
            reschedule_tx,
            shutdown_tx,
            poller: Mutex::new(None),
            shut_down: AtomicBool::new(false),
        });

        context.run_cycle().await;

        let handle = tokio::spawn(Self::poll_loop(
            Arc::clone(&context),
            reschedule_rx,
            shutdown_rx,
        ));
        *context.poller.lock() = Some(handle);

        context
    }

    /// Creates a context preloaded with a known snapshot and no poller.
    ///
    /// Test seam: lets callers install deterministic flag sets without any
    /// network involvement. `shutdown` on such a context is a safe no-op.
    pub fn with_snapshot(snapshot: FlagSnapshot) -> Arc<Self> {
        let (reschedule_tx, _) = watch::channel(DEFAULT_REFRESH_INTERVAL);
        let (shutdown_tx, _) = watch::channel(false);

        Arc::new(Self {
            store: SnapshotStore::with_snapshot(snapshot),
            source: Arc::new(IdleSource),
            policy: RefreshPolicy::new(),
            reschedule_tx,
            shutdown_tx,
            poller: Mutex::new(None),
            shut_down: AtomicBool::new(false),
        })
    }

    /// Returns true if the named flag is currently enabled.
    ///
    /// Never blocks and never fails; unknown flags and unparsable values
    /// resolve to `false`.
    pub fn is_enabled(&self, name: &str) -> bool {
        self.store.is_enabled(name)
    }

    /// Returns the raw value of a flag, if present.
    pub fn flag_value(&self, name: &str) -> Option<String> {
        self.store.get(name)
    }

    /// Returns a handle to the complete current snapshot.
    pub fn snapshot(&self) -> Arc<FlagSnapshot> {
        self.store.snapshot()
    }

    /// The interval the next cycle will be scheduled at.
    pub fn current_interval(&self) -> Duration {
        self.policy.current_interval()
    }

    /// Returns true once `shutdown` has begun.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Restarts the repeating refresh timer at `interval`, counted from now.
    ///
    /// A pending (not-yet-started) cycle is cancelled; a cycle already
    /// executing is never interrupted. Ignored after shutdown.
    pub fn reschedule(&self, interval: Duration) {
        if self.is_shut_down() {
            debug!("Reschedule after shutdown ignored");
            return;
        }
        self.policy.set_interval(interval);
        let _ = self.reschedule_tx.send(interval);
    }

    /// Stops the background poller. Idempotent.
    ///
    /// Pending cycles are cancelled; an in-flight cycle gets up to
    /// [`SHUTDOWN_GRACE`] to finish before the poller is aborted.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown_tx.send(true);

        let handle = { self.poller.lock().take() };
        if let Some(mut handle) = handle {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut handle)
                .await
                .is_err()
            {
                warn!("Flag poller did not stop within grace period; aborting");
                handle.abort();
            }
        }
    }

    /// One fetch-and-decode cycle.
    ///
    /// On success the snapshot is replaced wholesale (an explicit empty flag
    /// list clears it) and a positive TTL reschedules the timer. Every
    /// failure is soft: logged, snapshot untouched, scheduling unaffected.
    async fn run_cycle(&self) {
        match self.source.fetch().await {
            Ok(payload) => {
                let requested = payload.refresh_interval();
                self.store.replace(FlagSnapshot::from(payload));
                if let Some(interval) = requested {
                    if interval != self.policy.current_interval() {
                        debug!(secs = interval.as_secs(), "Server dictated new refresh interval");
                        self.reschedule(interval);
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Feature-flag refresh failed; keeping previous snapshot");
            }
        }
    }

    async fn poll_loop(
        context: Arc<Self>,
        mut reschedule_rx: watch::Receiver<Duration>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        loop {
            let delay = context.policy.current_interval();
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                changed = reschedule_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    // Restart the sleep at the new interval, counted from now.
                    continue;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            // A panicking cycle must not take the poller down with it.
            if let Err(panic) = AssertUnwindSafe(context.run_cycle()).catch_unwind().await {
                warn!(?panic, "Refresh cycle panicked; scheduling continues");
            }

            if *shutdown_rx.borrow() {
                break;
            }
        }
        debug!("Flag poller stopped");
    }
}

impl std::fmt::Debug for FlagContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlagContext")
            .field("flags", &self.store.len())
            .field("interval", &self.policy.current_interval())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flagpole_core::error::FlagError;
    use flagpole_core::types::FlagAssignment;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    /// Source that replays a script of responses, then repeats empty payloads.
    struct ScriptedSource {
        script: Mutex<VecDeque<Result<FlagPayload>>>,
        fetches: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<FlagPayload>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                fetches: AtomicUsize::new(0),
            }
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl FlagSource for ScriptedSource {
        async fn fetch(&self) -> Result<FlagPayload> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(FlagPayload::default()))
        }
    }

    fn payload(pairs: &[(&str, &str)], ttl_seconds: Option<i64>) -> FlagPayload {
        FlagPayload {
            flags: pairs
                .iter()
                .map(|(n, v)| FlagAssignment::new(*n, *v))
                .collect(),
            ttl_seconds,
        }
    }

    /// Lets the poller task run without advancing the clock.
    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_priming_installs_flags() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(payload(
            &[("a", "true"), ("b", "FALSE"), ("c", "yes")],
            None,
        ))]));
        let context = FlagContext::start(Arc::clone(&source) as Arc<dyn FlagSource>).await;

        assert_eq!(source.fetches(), 1);
        assert!(context.is_enabled("a"));
        assert!(!context.is_enabled("b"));
        assert!(!context.is_enabled("c"));
        assert!(!context.is_enabled("never-seen"));
        assert_eq!(context.current_interval(), DEFAULT_REFRESH_INTERVAL);

        context.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_priming_leaves_empty_then_recovers() {
        let source = Arc::new(ScriptedSource::new(vec![
            Err(FlagError::Transport("connection refused".into())),
            Ok(payload(&[("a", "true")], None)),
        ]));
        let context = FlagContext::start(Arc::clone(&source) as Arc<dyn FlagSource>).await;
        settle().await;

        // Primed but empty.
        assert_eq!(source.fetches(), 1);
        assert!(context.snapshot().is_empty());
        assert!(!context.is_enabled("a"));

        // The failure did not disturb scheduling.
        tokio::time::advance(DEFAULT_REFRESH_INTERVAL).await;
        settle().await;
        assert_eq!(source.fetches(), 2);
        assert!(context.is_enabled("a"));

        context.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_reschedules_next_cycle() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(payload(
            &[("a", "true")],
            Some(30),
        ))]));
        let context = FlagContext::start(Arc::clone(&source) as Arc<dyn FlagSource>).await;
        settle().await;

        assert_eq!(context.current_interval(), Duration::from_secs(30));

        tokio::time::advance(Duration::from_secs(29)).await;
        settle().await;
        assert_eq!(source.fetches(), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(source.fetches(), 2);

        context.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_omitted_ttl_keeps_previous_interval() {
        let source = Arc::new(ScriptedSource::new(vec![
            Ok(payload(&[("a", "true")], Some(30))),
            Ok(payload(&[("a", "true")], None)),
        ]));
        let context = FlagContext::start(Arc::clone(&source) as Arc<dyn FlagSource>).await;
        settle().await;

        tokio::time::advance(Duration::from_secs(30)).await;
        settle().await;
        assert_eq!(source.fetches(), 2);

        // Second response carried no TTL: interval stays 30s.
        assert_eq!(context.current_interval(), Duration::from_secs(30));
        tokio::time::advance(Duration::from_secs(30)).await;
        settle().await;
        assert_eq!(source.fetches(), 3);

        context.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_cycle_keeps_flags_and_scheduling() {
        let source = Arc::new(ScriptedSource::new(vec![
            Ok(payload(&[("a", "true")], Some(5))),
            Err(FlagError::UnexpectedStatus { status: 500 }),
            Ok(payload(&[("b", "true")], None)),
        ]));
        let context = FlagContext::start(Arc::clone(&source) as Arc<dyn FlagSource>).await;
        settle().await;

        tokio::time::advance(Duration::from_secs(5)).await;
        settle().await;
        assert_eq!(source.fetches(), 2);
        // HTTP 500: previously cached flags untouched.
        assert!(context.is_enabled("a"));

        // And the next cycle still happened.
        tokio::time::advance(Duration::from_secs(5)).await;
        settle().await;
        assert_eq!(source.fetches(), 3);
        assert!(context.is_enabled("b"));
        assert!(!context.is_enabled("a"));

        context.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_response_clears_flags() {
        let source = Arc::new(ScriptedSource::new(vec![
            Ok(payload(&[("a", "true")], Some(5))),
            Ok(payload(&[], None)),
        ]));
        let context = FlagContext::start(Arc::clone(&source) as Arc<dyn FlagSource>).await;
        settle().await;
        assert!(context.is_enabled("a"));

        tokio::time::advance(Duration::from_secs(5)).await;
        settle().await;
        assert!(!context.is_enabled("a"));
        assert!(context.snapshot().is_empty());

        context.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_restarts_timer_from_now() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(payload(
            &[("a", "true")],
            None,
        ))]));
        let context = FlagContext::start(Arc::clone(&source) as Arc<dyn FlagSource>).await;
        settle().await;

        tokio::time::advance(Duration::from_secs(100)).await;
        settle().await;
        context.reschedule(Duration::from_secs(50));
        settle().await;

        // 49s after the reschedule: nothing yet (timer restarted from the
        // reschedule, not from the priming cycle).
        tokio::time::advance(Duration::from_secs(49)).await;
        settle().await;
        assert_eq!(source.fetches(), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(source.fetches(), 2);

        context.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_is_idempotent_and_stops_poller() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(payload(
            &[("a", "true")],
            Some(5),
        ))]));
        let context = FlagContext::start(Arc::clone(&source) as Arc<dyn FlagSource>).await;
        settle().await;

        context.shutdown().await;
        context.shutdown().await;
        assert!(context.is_shut_down());

        // No further cycles after shutdown.
        tokio::time::advance(Duration::from_secs(600)).await;
        settle().await;
        assert_eq!(source.fetches(), 1);

        // Reschedule after shutdown is silently ignored.
        context.reschedule(Duration::from_secs(1));
        assert_eq!(context.current_interval(), Duration::from_secs(5));

        // Flags stay readable after shutdown, they just go stale.
        assert!(context.is_enabled("a"));
    }

    /// Answers the priming fetch, then hangs forever on every later one.
    struct StallingSource {
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl FlagSource for StallingSource {
        async fn fetch(&self) -> Result<FlagPayload> {
            if self.fetches.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(payload(&[("a", "true")], Some(5)))
            } else {
                std::future::pending::<Result<FlagPayload>>().await
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_aborts_stalled_cycle_after_grace() {
        let source = Arc::new(StallingSource {
            fetches: AtomicUsize::new(0),
        });
        let context = FlagContext::start(Arc::clone(&source) as Arc<dyn FlagSource>).await;
        settle().await;

        // Second cycle starts and never comes back.
        tokio::time::advance(Duration::from_secs(5)).await;
        settle().await;
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);

        // Shutdown waits out the grace period for the stuck cycle, then
        // aborts the poller instead of hanging.
        let before = tokio::time::Instant::now();
        context.shutdown().await;
        assert!(before.elapsed() >= SHUTDOWN_GRACE);
        assert!(context.is_shut_down());

        // The aborted poller never fetches again.
        tokio::time::advance(Duration::from_secs(600)).await;
        settle().await;
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);

        // Flags stay readable after the forced stop.
        assert!(context.is_enabled("a"));
    }

    #[tokio::test]
    async fn test_with_snapshot_seam() {
        let snapshot: FlagSnapshot = [("a".to_string(), "true".to_string())]
            .into_iter()
            .collect();
        let context = FlagContext::with_snapshot(snapshot);

        assert!(context.is_enabled("a"));
        assert_eq!(context.flag_value("a").as_deref(), Some("true"));

        // No poller to stop, but shutdown must still be a safe no-op.
        context.shutdown().await;
        context.shutdown().await;
        assert!(context.is_shut_down());
    }
}
