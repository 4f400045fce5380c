use crate::error::{BridgeError, BridgeResult};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::runtime::Runtime;
use waypoint_agent::network::NetworkMonitor;
use waypoint_agent::notifier::RecordingNotifier;
use waypoint_agent::store::FileStore;
use waypoint_agent::{
    AgentParts, ChannelSource, Fix, HttpTransport, SourceError, TrackerTuning, TrackingAgent,
    TrackingConfig, Visit,
};

/// Notification waiting to be shown by the app
#[derive(Serialize)]
struct PendingNotification {
    title: Option<String>,
    message: String,
}

/// Agent plus the runtime it lives on, owned by the JNI layer.
///
/// JNI calls arrive on arbitrary JVM threads; the agent spawns its work on
/// the bridge runtime, so every method here may be called from any thread
/// that is not a runtime worker.
pub struct Bridge {
    runtime: Runtime,
    agent: TrackingAgent,
    source: Arc<ChannelSource>,
    notifications: Arc<RecordingNotifier>,
}

impl Bridge {
    /// Open (or create) the agent state in `data_dir` and resume tracking
    /// if it was enabled
    pub fn open(data_dir: &Path) -> BridgeResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("waypoint-agent")
            .enable_all()
            .build()
            .map_err(|e| BridgeError::Internal(format!("Failed to start runtime: {}", e)))?;

        std::fs::create_dir_all(data_dir).map_err(|e| BridgeError::StorageError(e.to_string()))?;
        let store = FileStore::open(data_dir)?;
        let store_dir = store.dir().to_path_buf();
        let store = Arc::new(store);
        let tuning = TrackerTuning::default();
        let source = Arc::new(ChannelSource::default());
        let notifications = Arc::new(RecordingNotifier::new());

        let agent = {
            let _guard = runtime.enter();
            TrackingAgent::new(AgentParts {
                store,
                source: source.clone(),
                transport: Arc::new(HttpTransport::new(tuning.request_timeout)),
                notifier: notifications.clone(),
                network: NetworkMonitor::default(),
                tuning,
            })?
        };
        agent.try_start();

        log::info!(
            "Agent ready in {} ({} buffered records)",
            store_dir.display(),
            agent.buffer_len()
        );

        Ok(Bridge {
            runtime,
            agent,
            source,
            notifications,
        })
    }

    pub fn agent(&self) -> &TrackingAgent {
        &self.agent
    }

    pub fn push_passive_fix(&self, fix: Fix) {
        self.agent.handle_passive_fixes(vec![fix]);
    }

    /// Deliver to the live loop; without one the fix is handled as passive.
    /// Returns whether the live loop took it.
    pub fn push_live_fix(&self, fix: Fix) -> bool {
        if self.source.push_live(fix.clone()) {
            return true;
        }
        self.push_passive_fix(fix);
        false
    }

    /// Times are epoch seconds; negative or NaN means absent
    pub fn push_visit(&self, latitude: f64, longitude: f64, arrival: f64, departure: f64) {
        self.agent.handle_visit(Visit {
            latitude,
            longitude,
            arrival: optional_time(arrival),
            departure: optional_time(departure),
        });
    }

    pub fn report_location_error(&self, message: &str) {
        self.source.push_error(SourceError::Failed(message.to_string()));
    }

    pub fn set_network_reachable(&self, reachable: bool) {
        self.agent.set_network_reachable(reachable);
    }

    pub fn force_flush(&self) {
        self.agent.force_flush();
    }

    /// Clear and wait until the buffer is empty
    pub fn clear_buffer(&self) {
        self.agent.clear_buffer();
        self.sync();
    }

    pub fn buffer_len(&self) -> usize {
        self.agent.buffer_len()
    }

    /// Block until queued fixes have been filtered and stored
    pub fn sync(&self) {
        self.runtime.block_on(self.agent.drain_writes());
    }

    pub fn status_json(&self) -> BridgeResult<String> {
        Ok(serde_json::to_string(&self.agent.status())?)
    }

    pub fn config_json(&self) -> BridgeResult<String> {
        Ok(serde_json::to_string(&self.agent.config())?)
    }

    pub fn set_config_json(&self, json: &str) -> BridgeResult<()> {
        let config: TrackingConfig = serde_json::from_str(json)?;
        self.agent.apply_config(config)?;
        Ok(())
    }

    /// Notifications raised since the last call, as a JSON array
    pub fn drain_notifications_json(&self) -> BridgeResult<String> {
        let pending: Vec<PendingNotification> = self
            .notifications
            .drain()
            .into_iter()
            .map(|(title, message)| PendingNotification { title, message })
            .collect();
        Ok(serde_json::to_string(&pending)?)
    }
}

fn optional_time(seconds: f64) -> Option<f64> {
    (seconds.is_finite() && seconds >= 0.0).then_some(seconds)
}
