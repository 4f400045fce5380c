use crate::types::Fix;
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;

/// Lazy, unbounded, non-restartable stream of live fixes
pub type FixStream = BoxStream<'static, Result<Fix, SourceError>>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Position source unavailable: {0}")]
    Unavailable(String),

    #[error("Position source failed: {0}")]
    Failed(String),
}

/// Platform location subsystem as seen by the agent.
///
/// Passive (significant-change) fixes and visits are pushed into the agent
/// by the platform; only the live stream is pulled.
pub trait PositionSource: Send + Sync {
    /// Ask the platform for the tracking capability. Best effort.
    fn request_authorization(&self) {}

    /// Begin passive, significant-change and visit monitoring
    fn start_monitoring(&self) -> Result<(), SourceError> {
        Ok(())
    }

    fn stop_monitoring(&self) {}

    /// Subscribe to continuous high-frequency updates
    fn live_updates(&self) -> Result<FixStream, SourceError>;
}

/// Source fed by a host platform (JNI bridge, replay driver).
///
/// Each `live_updates` call opens a fresh channel; fixes pushed while no
/// live subscriber exists are refused so the host can deliver them as
/// passive fixes instead.
pub struct ChannelSource {
    live_tx: Mutex<Option<mpsc::Sender<Result<Fix, SourceError>>>>,
    monitoring: AtomicBool,
    capacity: usize,
}

impl ChannelSource {
    pub fn new(capacity: usize) -> Self {
        ChannelSource {
            live_tx: Mutex::new(None),
            monitoring: AtomicBool::new(false),
            capacity: capacity.max(1),
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitoring.load(Ordering::SeqCst)
    }

    /// True while a live stream is open and consuming
    pub fn has_live_subscriber(&self) -> bool {
        self.live_tx
            .lock()
            .ok()
            .map(|tx| tx.as_ref().map(|t| !t.is_closed()).unwrap_or(false))
            .unwrap_or(false)
    }

    /// Hand a fix to the live stream. Returns false when there is no live
    /// subscriber or its queue is full.
    pub fn push_live(&self, fix: Fix) -> bool {
        let Ok(mut guard) = self.live_tx.lock() else {
            return false;
        };
        let Some(tx) = guard.as_ref() else {
            return false;
        };

        match tx.try_send(Ok(fix)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Closed(_)) => {
                *guard = None;
                false
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                log::warn!("Live fix queue full, dropping fix");
                false
            }
        }
    }

    /// Report a platform failure to the live subscriber
    pub fn push_error(&self, error: SourceError) {
        if let Ok(guard) = self.live_tx.lock() {
            if let Some(tx) = guard.as_ref() {
                let _ = tx.try_send(Err(error));
            }
        }
    }

    /// Close the current live stream (platform stopped delivering)
    pub fn end_live(&self) {
        if let Ok(mut guard) = self.live_tx.lock() {
            *guard = None;
        }
    }
}

impl Default for ChannelSource {
    fn default() -> Self {
        Self::new(256)
    }
}

impl PositionSource for ChannelSource {
    fn request_authorization(&self) {
        log::info!("Requesting always-on location authorization");
    }

    fn start_monitoring(&self) -> Result<(), SourceError> {
        self.monitoring.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop_monitoring(&self) {
        self.monitoring.store(false, Ordering::SeqCst);
    }

    fn live_updates(&self) -> Result<FixStream, SourceError> {
        let (tx, rx) = mpsc::channel(self.capacity);
        let mut guard = self
            .live_tx
            .lock()
            .map_err(|_| SourceError::Failed("live channel lock poisoned".to_string()))?;
        *guard = Some(tx);

        Ok(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed())
    }
}
