use crate::buffer::{LocalBuffer, SharedBuffer};
use crate::config::{BufferCapacity, Settings, TrackerTuning, TrackingConfig};
use crate::duty_cycle::{DutyCycleController, DutyCycleMode, LoopDecision};
use crate::error::{AgentError, AgentResult};
use crate::filter::SampleFilter;
use crate::network::NetworkMonitor;
use crate::notifier::{DebugNotifier, Notifier};
use crate::source::PositionSource;
use crate::status::{AgentStats, AgentStatus};
use crate::store::KeyValueStore;
use crate::types::{Fix, Visit};
use crate::upload::{BatchTransport, FlushOutcome, FlushReason, Uploader};
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

/// Operations serialized on the write lane
enum WriteOp {
    Fix(Fix),
    Clear,
    Barrier(oneshot::Sender<()>),
}

/// Collaborators the agent is wired to
pub struct AgentParts {
    pub store: Arc<dyn KeyValueStore>,
    pub source: Arc<dyn PositionSource>,
    pub transport: Arc<dyn BatchTransport>,
    pub notifier: Arc<dyn Notifier>,
    pub network: NetworkMonitor,
    pub tuning: TrackerTuning,
}

struct Inner {
    settings: Settings,
    tuning: TrackerTuning,
    buffer: SharedBuffer,
    network: NetworkMonitor,
    source: Arc<dyn PositionSource>,
    uploader: Arc<Uploader>,
    notifier: DebugNotifier,
    stats: Arc<AgentStats>,
    write_tx: mpsc::UnboundedSender<WriteOp>,
    live_running: AtomicBool,
    /// Latest live loop task, including its loop-exit flush
    live_task: Mutex<Option<JoinHandle<()>>>,
    in_vehicle: AtomicBool,
    stop_tx: watch::Sender<bool>,
    runtime: Handle,
}

/// Background tracking agent.
///
/// # Lanes
/// - write lane: one task applies the sample filter and mutates the buffer,
///   in arrival order
/// - upload lane: [`Uploader`] runs one flush at a time, extra requests are
///   coalesced
/// - duty-cycle lane: at most one live sampling loop, guarded by a
///   single-flight flag
///
/// Cheap to clone; all clones drive the same agent.
#[derive(Clone)]
pub struct TrackingAgent {
    inner: Arc<Inner>,
}

impl TrackingAgent {
    /// Build the agent and start its write lane on the current tokio runtime.
    pub fn new(parts: AgentParts) -> AgentResult<Self> {
        let runtime = Handle::try_current()
            .map_err(|_| AgentError::Internal("TrackingAgent needs a tokio runtime".to_string()))?;

        let settings = Settings::load(parts.store.clone());
        let buffer = LocalBuffer::load(parts.store.clone()).shared();
        let filter = SampleFilter::load(&parts.tuning, parts.store.clone());
        let stats = Arc::new(AgentStats::default());
        let notifier = DebugNotifier::new(parts.notifier, settings.clone());

        let uploader = Arc::new(Uploader::new(
            buffer.clone(),
            settings.clone(),
            parts.network.clone(),
            parts.transport,
            notifier.clone(),
            stats.clone(),
            parts.tuning.max_chunk_size,
        ));

        let (write_tx, write_rx) = mpsc::unbounded_channel();
        runtime.spawn(write_lane(
            write_rx,
            filter,
            buffer.clone(),
            settings.clone(),
            uploader.clone(),
            stats.clone(),
        ));

        let (stop_tx, _) = watch::channel(false);

        Ok(TrackingAgent {
            inner: Arc::new(Inner {
                settings,
                tuning: parts.tuning,
                buffer,
                network: parts.network,
                source: parts.source,
                uploader,
                notifier,
                stats,
                write_tx,
                live_running: AtomicBool::new(false),
                live_task: Mutex::new(None),
                in_vehicle: AtomicBool::new(false),
                stop_tx,
                runtime,
            }),
        })
    }

    pub fn config(&self) -> TrackingConfig {
        self.inner.settings.get()
    }

    /// Start tracking if it was left enabled (process launch)
    pub fn try_start(&self) {
        if self.inner.settings.get().tracking_enabled {
            self.start();
        }
    }

    pub fn start(&self) {
        self.inner.source.request_authorization();
        if let Err(e) = self.inner.source.start_monitoring() {
            log::warn!("Could not start location monitoring: {}", e);
        }
        self.start_live_loop();
    }

    pub fn stop(&self) {
        self.inner.source.stop_monitoring();
        self.inner.stop_tx.send_replace(true);
    }

    // Configuration surface

    pub fn set_tracking_enabled(&self, enabled: bool) -> AgentResult<()> {
        self.inner.settings.update(|c| c.tracking_enabled = enabled)?;
        if enabled {
            self.start();
        } else {
            self.stop();
        }
        Ok(())
    }

    pub fn set_high_density(&self, enabled: bool) -> AgentResult<()> {
        self.inner.settings.update(|c| c.high_density = enabled)?;
        Ok(())
    }

    pub fn set_debug_notifications(&self, enabled: bool) -> AgentResult<()> {
        let previous = self.inner.settings.update(|c| c.debug_notifications = enabled)?;
        if enabled && !previous.debug_notifications {
            self.inner.notifier.send("Notifications activated.");
        }
        Ok(())
    }

    pub fn set_server_host(&self, host: &str) -> AgentResult<()> {
        let host = host.trim().to_string();
        self.inner.settings.update(|c| c.server_host = host)?;
        Ok(())
    }

    pub fn set_api_key(&self, key: &str) -> AgentResult<()> {
        let key = key.to_string();
        self.inner.settings.update(|c| c.api_key = key)?;
        Ok(())
    }

    /// Accepts only the enumerated capacities (5, 60, 120, 300, 600)
    pub fn set_max_buffer_size(&self, records: usize) -> AgentResult<()> {
        let capacity = BufferCapacity::try_from(records)?;
        self.inner.settings.update(|c| c.max_buffer_size = capacity)?;
        Ok(())
    }

    /// Apply a full configuration through the individual setters so every
    /// change gets its side effects
    pub fn apply_config(&self, config: TrackingConfig) -> AgentResult<()> {
        let current = self.config();
        if config.server_host != current.server_host {
            self.set_server_host(&config.server_host)?;
        }
        if config.api_key != current.api_key {
            self.set_api_key(&config.api_key)?;
        }
        if config.max_buffer_size != current.max_buffer_size {
            self.inner
                .settings
                .update(|c| c.max_buffer_size = config.max_buffer_size)?;
        }
        if config.high_density != current.high_density {
            self.set_high_density(config.high_density)?;
        }
        if config.debug_notifications != current.debug_notifications {
            self.set_debug_notifications(config.debug_notifications)?;
        }
        if config.tracking_enabled != current.tracking_enabled {
            self.set_tracking_enabled(config.tracking_enabled)?;
        }
        Ok(())
    }

    // Control surface

    pub fn set_network_reachable(&self, reachable: bool) {
        self.inner.network.set_reachable(reachable);
    }

    pub fn buffer_len(&self) -> usize {
        self.inner.buffer.lock().map(|b| b.len()).unwrap_or(0)
    }

    /// Queue a buffer wipe behind pending writes
    pub fn clear_buffer(&self) {
        self.send_write(WriteOp::Clear);
    }

    /// Request an upload regardless of buffer size. Does not wait.
    pub fn force_flush(&self) {
        self.spawn_flush_after_writes(FlushReason::Forced);
    }

    /// Forced upload after all pending writes, waiting for the result.
    /// An upload already running is waited for rather than coalesced into.
    pub async fn flush_now(&self) -> FlushOutcome {
        self.drain_writes().await;
        self.inner.uploader.flush_after_running(FlushReason::Forced).await
    }

    /// Wait until the live loop, if any, has exited and finished its
    /// loop-exit flush
    pub async fn wait_live_loop(&self) {
        loop {
            let task = match self.inner.live_task.lock() {
                Ok(mut task) => task.take(),
                Err(_) => {
                    log::error!("Failed to acquire live task lock");
                    None
                }
            };
            match task {
                Some(task) => {
                    if let Err(e) = task.await {
                        log::error!("Live loop task failed: {}", e);
                    }
                }
                None => break,
            }
        }
    }

    /// Wait until every write queued so far has been applied
    pub async fn drain_writes(&self) {
        let (tx, rx) = oneshot::channel();
        if self.send_write(WriteOp::Barrier(tx)) {
            let _ = rx.await;
        }
    }

    pub fn is_live(&self) -> bool {
        self.inner.live_running.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> AgentStatus {
        let config = self.inner.settings.get();
        let mut status = AgentStatus::from_stats(&self.inner.stats);
        status.tracking_enabled = config.tracking_enabled;
        status.network_reachable = self.inner.network.is_reachable();
        status.mode = if self.is_live() {
            DutyCycleMode::LiveSampling
        } else {
            DutyCycleMode::Idle
        };
        status.in_vehicle = self.inner.in_vehicle.load(Ordering::SeqCst);
        status.buffer_len = self.buffer_len();
        status.max_buffer_size = config.max_buffer_size.records();
        status
    }

    // Platform events

    /// Passive / significant-change fixes. Ignored while the live loop runs
    /// (it receives the same positions), then a live loop is requested.
    pub fn handle_passive_fixes(&self, fixes: Vec<Fix>) {
        if !self.is_live() {
            for fix in fixes {
                self.send_write(WriteOp::Fix(fix));
            }
        }
        self.start_live_loop();
    }

    pub fn handle_visit(&self, visit: Visit) {
        if !visit.is_departure() {
            self.spawn_flush_after_writes(FlushReason::VisitArrival);
            return;
        }

        self.inner.notifier.send("You left a Location.");
        self.start_live_loop();
    }

    /// Start the live sampling loop when tracking and high-density mode are
    /// on and no loop is running. Returns whether a loop was started.
    pub fn start_live_loop(&self) -> bool {
        let config = self.inner.settings.get();
        if !config.tracking_enabled || !config.high_density {
            return false;
        }

        if self
            .inner
            .live_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        log::info!("Starting live sampling");
        self.inner.stats.live_loops_started.fetch_add(1, Ordering::Relaxed);
        self.inner.stop_tx.send_replace(false);
        let agent = self.clone();
        let task = self.inner.runtime.spawn(async move { agent.run_live_loop().await });
        match self.inner.live_task.lock() {
            Ok(mut slot) => *slot = Some(task),
            Err(_) => log::error!("Failed to acquire live task lock"),
        }
        true
    }

    async fn run_live_loop(self) {
        let inner = &self.inner;
        inner.notifier.send("Starting Updates");

        let started = Instant::now();
        let mut controller = DutyCycleController::new(&inner.tuning);
        controller.reset();
        let mut stop_rx = inner.stop_tx.subscribe();

        match inner.source.live_updates() {
            Ok(mut updates) => loop {
                let next = tokio::select! {
                    next = updates.next() => next,
                    _ = stop_rx.wait_for(|stop| *stop) => {
                        log::info!("Live sampling stop requested");
                        break;
                    }
                };

                if *stop_rx.borrow() || !inner.settings.get().tracking_enabled {
                    break;
                }

                let fix = match next {
                    Some(Ok(fix)) => fix,
                    Some(Err(e)) => {
                        log::warn!("Live updates failed: {}", e);
                        break;
                    }
                    None => {
                        log::info!("Live updates ended by the source");
                        break;
                    }
                };

                match controller.on_fix(&fix) {
                    LoopDecision::Exit { idle_secs } => {
                        log::info!("Stationary for {:.0}s, leaving live sampling", idle_secs);
                        break;
                    }
                    LoopDecision::Continue => {
                        inner.in_vehicle.store(controller.in_vehicle(), Ordering::SeqCst);
                        self.send_write(WriteOp::Fix(fix));
                    }
                }
            },
            Err(e) => log::warn!("Could not start location updates: {}", e),
        }

        log::info!(
            "Logged for {:.0} seconds ({} live fixes)",
            started.elapsed().as_secs_f64(),
            controller.fixes_seen()
        );
        inner.in_vehicle.store(false, Ordering::SeqCst);
        inner.live_running.store(false, Ordering::SeqCst);
        inner.notifier.send("Stopping Updates");

        self.drain_writes().await;
        let outcome = inner.uploader.flush(FlushReason::LoopExit).await;
        log::debug!("Loop-exit flush: {:?}", outcome);
    }

    /// Flush once every write queued before this call has landed
    fn spawn_flush_after_writes(&self, reason: FlushReason) {
        let agent = self.clone();
        self.inner.runtime.spawn(async move {
            agent.drain_writes().await;
            let outcome = agent.inner.uploader.flush(reason).await;
            log::debug!("Flush ({:?}): {:?}", reason, outcome);
        });
    }

    fn send_write(&self, op: WriteOp) -> bool {
        if self.inner.write_tx.send(op).is_err() {
            log::error!("Write lane is gone, dropping operation");
            return false;
        }
        true
    }
}

fn spawn_flush(uploader: &Arc<Uploader>, reason: FlushReason) {
    let uploader = uploader.clone();
    tokio::spawn(async move {
        let outcome = uploader.flush(reason).await;
        log::debug!("Flush ({:?}): {:?}", reason, outcome);
    });
}

async fn write_lane(
    mut rx: mpsc::UnboundedReceiver<WriteOp>,
    mut filter: SampleFilter,
    buffer: SharedBuffer,
    settings: Settings,
    uploader: Arc<Uploader>,
    stats: Arc<AgentStats>,
) {
    while let Some(op) = rx.recv().await {
        match op {
            WriteOp::Fix(fix) => {
                stats.fixes_received.fetch_add(1, Ordering::Relaxed);
                let record = match filter.evaluate(&fix) {
                    Ok(record) => record,
                    Err(rejection) => {
                        log::trace!("Dropped fix at {:.3}: {}", fix.timestamp, rejection);
                        stats.record_rejection(&rejection);
                        continue;
                    }
                };

                let len = match buffer.lock() {
                    Ok(mut buffer) => buffer.append(record),
                    Err(_) => {
                        log::error!("Failed to acquire buffer lock, fix lost");
                        continue;
                    }
                };
                stats.fixes_accepted.fetch_add(1, Ordering::Relaxed);

                if len >= settings.get().max_buffer_size.records() {
                    spawn_flush(&uploader, FlushReason::Threshold);
                }
            }
            WriteOp::Clear => match buffer.lock() {
                Ok(mut buffer) => {
                    log::info!("Clearing {} buffered records", buffer.len());
                    buffer.clear();
                }
                Err(_) => log::error!("Failed to acquire buffer lock, clear skipped"),
            },
            WriteOp::Barrier(done) => {
                let _ = done.send(());
            }
        }
    }
    log::debug!("Write lane stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::RecordingNotifier;
    use crate::source::ChannelSource;
    use crate::store::{FileStore, MemoryStore};
    use crate::upload::tests::MockTransport;
    use std::time::Duration;

    struct Fixture {
        agent: TrackingAgent,
        source: Arc<ChannelSource>,
        transport: Arc<MockTransport>,
        notifications: Arc<RecordingNotifier>,
    }

    fn fixture_with_store(store: Arc<dyn KeyValueStore>) -> Fixture {
        fixture_with(store, MockTransport::new())
    }

    fn fixture_with(store: Arc<dyn KeyValueStore>, transport: MockTransport) -> Fixture {
        let source = Arc::new(ChannelSource::default());
        let transport = Arc::new(transport);
        let notifications = Arc::new(RecordingNotifier::new());
        let agent = TrackingAgent::new(AgentParts {
            store,
            source: source.clone(),
            transport: transport.clone(),
            notifier: notifications.clone(),
            network: NetworkMonitor::new(true),
            tuning: TrackerTuning::default(),
        })
        .unwrap();
        agent.set_server_host("https://waypoints.example.org").unwrap();
        agent.set_api_key("secret").unwrap();

        Fixture {
            agent,
            source,
            transport,
            notifications,
        }
    }

    fn fixture() -> Fixture {
        fixture_with_store(Arc::new(MemoryStore::new()))
    }

    /// Fix `i` steps of ~22 m east of the origin
    fn walk(i: usize) -> Fix {
        Fix::new(1000.0 + i as f64, 0.0, 0.0002 * i as f64, 5.0)
    }

    async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
        for _ in 0..200 {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        condition()
    }

    fn messages(notifications: &RecordingNotifier) -> Vec<String> {
        notifications.messages().into_iter().map(|(_, m)| m).collect()
    }

    #[tokio::test]
    async fn test_passive_fixes_are_filtered_into_buffer() {
        let f = fixture();
        f.agent.handle_passive_fixes(vec![
            walk(0),
            walk(1),
            Fix::new(1001.5, 0.0, 0.0002, 80.0), // low accuracy
            walk(1),                             // stale
            walk(2),
        ]);
        f.agent.drain_writes().await;

        assert_eq!(f.agent.buffer_len(), 3);
        let status = f.agent.status();
        assert_eq!(status.fixes_received, 5);
        assert_eq!(status.fixes_accepted, 3);
        assert_eq!(status.rejected_low_accuracy, 1);
        assert_eq!(status.rejected_stale, 1);
        // tracking is off, so no live loop
        assert!(!f.agent.is_live());
    }

    #[tokio::test]
    async fn test_threshold_triggers_upload() {
        let f = fixture();
        f.agent.set_max_buffer_size(5).unwrap();

        f.agent.handle_passive_fixes((0..4).map(walk).collect());
        f.agent.drain_writes().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(f.transport.calls(), 0);

        f.agent.handle_passive_fixes(vec![walk(4)]);
        assert!(eventually(|| f.agent.buffer_len() == 0).await);
        assert_eq!(f.transport.sent_timestamps()[0].len(), 5);
    }

    #[tokio::test]
    async fn test_rejects_unsupported_buffer_size() {
        let f = fixture();
        assert!(f.agent.set_max_buffer_size(100).is_err());
        assert_eq!(f.agent.config().max_buffer_size, BufferCapacity::ThreeHundred);
    }

    #[tokio::test]
    async fn test_force_flush_on_empty_buffer_sends_nothing() {
        let f = fixture();
        assert_eq!(
            f.agent.flush_now().await,
            FlushOutcome::Skipped(crate::upload::SkipReason::EmptyBuffer)
        );
        f.agent.force_flush();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(f.transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_clear_buffer_runs_behind_pending_writes() {
        let f = fixture();
        f.agent.handle_passive_fixes((0..3).map(walk).collect());
        f.agent.clear_buffer();
        f.agent.drain_writes().await;
        assert_eq!(f.agent.buffer_len(), 0);
    }

    #[tokio::test]
    async fn test_live_loop_runs_until_stationary_then_flushes() {
        let f = fixture();
        f.agent.set_debug_notifications(true).unwrap();
        f.agent.set_high_density(true).unwrap();
        f.agent.set_tracking_enabled(true).unwrap();
        assert!(f.source.is_monitoring());
        assert!(f.agent.is_live());
        assert!(eventually(|| f.source.has_live_subscriber()).await);

        // passive fixes are ignored while live
        f.agent.handle_passive_fixes(vec![Fix::new(1.0, 10.0, 10.0, 5.0)]);

        for i in 0..3 {
            assert!(f.source.push_live(walk(i)));
        }
        // stationary at the last point
        assert!(f.source.push_live(Fix::new(1030.0, 0.0, 0.0004, 5.0).with_speed(0.0)));
        assert!(f.source.push_live(Fix::new(1070.0, 0.0, 0.0004, 5.0).with_speed(0.0)));

        assert!(eventually(|| !f.agent.is_live()).await);
        assert!(eventually(|| f.transport.calls() == 1).await);
        assert_eq!(
            f.transport.sent_timestamps()[0],
            vec![1000.0, 1001.0, 1002.0]
        );
        assert_eq!(f.agent.buffer_len(), 0);

        let messages = messages(&f.notifications);
        assert!(messages.contains(&"Notifications activated.".to_string()));
        assert!(messages.contains(&"Starting Updates".to_string()));
        assert!(messages.contains(&"Stopping Updates".to_string()));
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_loop_exit_upload() {
        let f = fixture_with(
            Arc::new(MemoryStore::new()),
            MockTransport::with_delay(Duration::from_millis(100)),
        );
        f.agent.set_high_density(true).unwrap();
        f.agent.set_tracking_enabled(true).unwrap();
        assert!(eventually(|| f.source.has_live_subscriber()).await);

        for i in 0..3 {
            assert!(f.source.push_live(walk(i)));
        }
        f.source.end_live();

        f.agent.wait_live_loop().await;
        assert!(!f.agent.is_live());
        assert_eq!(f.transport.calls(), 1);
        assert_eq!(f.agent.buffer_len(), 0);
        assert_eq!(
            f.agent.flush_now().await,
            FlushOutcome::Skipped(crate::upload::SkipReason::EmptyBuffer)
        );
    }

    #[tokio::test]
    async fn test_single_live_loop() {
        let f = fixture();
        f.agent.set_high_density(true).unwrap();
        f.agent.set_tracking_enabled(true).unwrap();

        assert!(f.agent.is_live());
        assert!(!f.agent.start_live_loop());
        f.agent.handle_passive_fixes(vec![]);
        assert_eq!(f.agent.status().live_loops_started, 1);
    }

    #[tokio::test]
    async fn test_no_live_loop_without_high_density() {
        let f = fixture();
        f.agent.set_tracking_enabled(true).unwrap();
        assert!(!f.agent.start_live_loop());
        assert!(!f.agent.is_live());
    }

    #[tokio::test]
    async fn test_disabling_tracking_stops_waiting_loop() {
        let f = fixture();
        f.agent.set_high_density(true).unwrap();
        f.agent.set_tracking_enabled(true).unwrap();
        assert!(f.agent.is_live());

        f.agent.set_tracking_enabled(false).unwrap();
        assert!(eventually(|| !f.agent.is_live()).await);
        assert!(!f.source.is_monitoring());

        // a later start is not blocked by the old stop request
        f.agent.set_tracking_enabled(true).unwrap();
        assert!(f.agent.is_live());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(f.agent.is_live());
    }

    #[tokio::test]
    async fn test_visits() {
        let f = fixture();
        f.agent.set_debug_notifications(true).unwrap();
        f.agent.handle_passive_fixes((0..3).map(walk).collect());
        f.agent.drain_writes().await;

        // arrival forces a flush
        f.agent.handle_visit(Visit {
            latitude: 0.0,
            longitude: 0.0,
            arrival: Some(2000.0),
            departure: None,
        });
        assert!(eventually(|| f.agent.buffer_len() == 0).await);
        assert_eq!(f.transport.calls(), 1);

        // departure notifies and asks for a live loop
        f.agent.set_high_density(true).unwrap();
        f.agent.inner.settings.update(|c| c.tracking_enabled = true).unwrap();
        f.agent.handle_visit(Visit {
            latitude: 0.0,
            longitude: 0.0,
            arrival: Some(2000.0),
            departure: Some(3000.0),
        });
        assert!(f.agent.is_live());
        assert!(messages(&f.notifications).contains(&"You left a Location.".to_string()));
    }

    #[tokio::test]
    async fn test_unreachable_network_keeps_records() {
        let f = fixture();
        f.agent.set_network_reachable(false);
        f.agent.handle_passive_fixes((0..3).map(walk).collect());

        assert_eq!(
            f.agent.flush_now().await,
            FlushOutcome::Skipped(crate::upload::SkipReason::Unreachable)
        );
        assert_eq!(f.agent.buffer_len(), 3);

        f.agent.set_network_reachable(true);
        assert_eq!(
            f.agent.flush_now().await,
            FlushOutcome::Completed { sent: 3, chunks: 1 }
        );
    }

    #[tokio::test]
    async fn test_state_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(dir.path()).unwrap());
            let f = fixture_with_store(store);
            f.agent.set_max_buffer_size(60).unwrap();
            f.agent.handle_passive_fixes((0..4).map(walk).collect());
            f.agent.drain_writes().await;
        }

        let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(dir.path()).unwrap());
        let f = fixture_with_store(store);
        assert_eq!(f.agent.buffer_len(), 4);
        assert_eq!(f.agent.config().max_buffer_size, BufferCapacity::Sixty);

        // the last accepted point is remembered too
        f.agent.handle_passive_fixes(vec![walk(2)]);
        f.agent.drain_writes().await;
        assert_eq!(f.agent.buffer_len(), 4);
        assert_eq!(f.agent.status().rejected_stale, 1);
    }

    #[tokio::test]
    async fn test_apply_config() {
        let f = fixture();
        let mut config = f.agent.config();
        config.server_host = "https://other.example.org".to_string();
        config.max_buffer_size = BufferCapacity::SixHundred;
        config.tracking_enabled = true;
        f.agent.apply_config(config.clone()).unwrap();

        assert_eq!(f.agent.config(), config);
        assert!(f.source.is_monitoring());
    }
}
