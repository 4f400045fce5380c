use crate::duty_cycle::DutyCycleMode;
use crate::filter::Rejection;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Result of the most recent upload attempt
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LastUpload {
    pub at: String,
    pub succeeded: bool,
    pub records_sent: u64,
    pub detail: String,
}

/// Running counters, updated from all lanes
#[derive(Default)]
pub struct AgentStats {
    pub fixes_received: AtomicU64,
    pub fixes_accepted: AtomicU64,
    pub rejected_low_accuracy: AtomicU64,
    pub rejected_stale: AtomicU64,
    pub rejected_too_close: AtomicU64,
    pub records_uploaded: AtomicU64,
    pub upload_failures: AtomicU64,
    pub flushes_coalesced: AtomicU64,
    pub live_loops_started: AtomicU64,
    last_upload: Mutex<Option<LastUpload>>,
}

impl AgentStats {
    pub fn record_rejection(&self, rejection: &Rejection) {
        let counter = match rejection {
            Rejection::LowAccuracy { .. } => &self.rejected_low_accuracy,
            Rejection::Stale { .. } => &self.rejected_stale,
            Rejection::TooClose { .. } => &self.rejected_too_close,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upload(&self, succeeded: bool, records_sent: u64, detail: String) {
        self.records_uploaded.fetch_add(records_sent, Ordering::Relaxed);
        if !succeeded {
            self.upload_failures.fetch_add(1, Ordering::Relaxed);
        }
        if let Ok(mut last) = self.last_upload.lock() {
            *last = Some(LastUpload {
                at: Utc::now().to_rfc3339(),
                succeeded,
                records_sent,
                detail,
            });
        }
    }

    pub fn last_upload(&self) -> Option<LastUpload> {
        self.last_upload.lock().ok().and_then(|l| l.clone())
    }
}

/// Snapshot of agent state for the presentation layer
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AgentStatus {
    pub timestamp: f64,
    pub tracking_enabled: bool,
    pub network_reachable: bool,
    pub mode: DutyCycleMode,
    pub in_vehicle: bool,
    pub buffer_len: usize,
    pub max_buffer_size: usize,
    // Filter counters
    pub fixes_received: u64,
    pub fixes_accepted: u64,
    pub rejected_low_accuracy: u64,
    pub rejected_stale: u64,
    pub rejected_too_close: u64,
    // Upload counters
    pub records_uploaded: u64,
    pub upload_failures: u64,
    pub flushes_coalesced: u64,
    pub live_loops_started: u64,
    pub last_upload: Option<LastUpload>,
}

impl AgentStatus {
    pub fn from_stats(stats: &AgentStats) -> Self {
        Self {
            timestamp: current_timestamp(),
            tracking_enabled: false,
            network_reachable: false,
            mode: DutyCycleMode::Idle,
            in_vehicle: false,
            buffer_len: 0,
            max_buffer_size: 0,
            fixes_received: stats.fixes_received.load(Ordering::Relaxed),
            fixes_accepted: stats.fixes_accepted.load(Ordering::Relaxed),
            rejected_low_accuracy: stats.rejected_low_accuracy.load(Ordering::Relaxed),
            rejected_stale: stats.rejected_stale.load(Ordering::Relaxed),
            rejected_too_close: stats.rejected_too_close.load(Ordering::Relaxed),
            records_uploaded: stats.records_uploaded.load(Ordering::Relaxed),
            upload_failures: stats.upload_failures.load(Ordering::Relaxed),
            flushes_coalesced: stats.flushes_coalesced.load(Ordering::Relaxed),
            live_loops_started: stats.live_loops_started.load(Ordering::Relaxed),
            last_upload: stats.last_upload(),
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

pub fn current_timestamp() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
