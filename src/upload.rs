use crate::buffer::{LocalBuffer, SharedBuffer};
use crate::config::Settings;
use crate::network::NetworkMonitor;
use crate::notifier::DebugNotifier;
use crate::status::AgentStats;
use crate::types::GpsBatch;
use futures::future::BoxFuture;
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use serde::Serialize;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

/// Per-request upload failures
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum UploadError {
    NetworkTimeout,
    Network(String),
    HttpError(u16),
    Serialization(String),
}

impl Display for UploadError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            UploadError::NetworkTimeout => write!(f, "Network timeout"),
            UploadError::Network(msg) => write!(f, "Network error: {}", msg),
            UploadError::HttpError(code) => write!(f, "HTTP error: {}", code),
            UploadError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

/// Sends one serialized batch and reports the HTTP status code.
pub trait BatchTransport: Send + Sync {
    fn post_batch<'a>(&'a self, url: &'a Url, body: Vec<u8>) -> BoxFuture<'a, Result<u16, UploadError>>;
}

/// reqwest-backed transport
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("waypoint-agent/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        HttpTransport { client }
    }
}

impl BatchTransport for HttpTransport {
    fn post_batch<'a>(&'a self, url: &'a Url, body: Vec<u8>) -> BoxFuture<'a, Result<u16, UploadError>> {
        Box::pin(async move {
            let response = self
                .client
                .post(url.clone())
                .header(CONTENT_TYPE, "application/json")
                .body(body)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        UploadError::NetworkTimeout
                    } else {
                        UploadError::Network(e.to_string())
                    }
                })?;
            Ok(response.status().as_u16())
        })
    }
}

/// Build `<host>/api/v1/gps/batch?api_key=<key>`
pub fn batch_url(host: &str, api_key: &str) -> Option<Url> {
    let host = host.trim().trim_end_matches('/');
    if host.is_empty() {
        return None;
    }
    let mut url = Url::parse(&format!("{}/api/v1/gps/batch", host)).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.query_pairs_mut().append_pair("api_key", api_key);
    Some(url)
}

/// What asked for the flush
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// Buffer reached the configured size
    Threshold,
    /// Explicit user request
    Forced,
    /// Live loop ended
    LoopExit,
    /// Platform reported arrival at a place
    VisitArrival,
}

impl FlushReason {
    pub fn is_forced(self) -> bool {
        !matches!(self, FlushReason::Threshold)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    BelowThreshold,
    EmptyBuffer,
    Unreachable,
    NoEndpoint,
    InvalidEndpoint,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum FlushOutcome {
    /// Preconditions not met; nothing sent
    Skipped(SkipReason),
    /// Another flush was in flight
    Coalesced,
    /// Buffer drained to its tail
    Completed { sent: usize, chunks: usize },
    /// Stopped at a failed chunk; it and everything after it stay buffered
    Aborted { sent: usize, error: UploadError },
}

/// Drains the buffer to the collection server, one chunk at a time.
///
/// # Delivery
/// - chunks are contiguous head prefixes of at most `max_chunk` records
/// - a chunk is removed only after a 2xx response
/// - the first failure ends the run; nothing unconfirmed is dropped
///
/// # Lane
/// Runs never overlap. A flush requested while another is running returns
/// [`FlushOutcome::Coalesced`]; the running flush reads the buffer up to its
/// current tail anyway.
pub struct Uploader {
    buffer: SharedBuffer,
    settings: Settings,
    network: NetworkMonitor,
    transport: Arc<dyn BatchTransport>,
    notifier: DebugNotifier,
    stats: Arc<AgentStats>,
    max_chunk: usize,
    lane: tokio::sync::Mutex<()>,
}

impl Uploader {
    pub fn new(
        buffer: SharedBuffer,
        settings: Settings,
        network: NetworkMonitor,
        transport: Arc<dyn BatchTransport>,
        notifier: DebugNotifier,
        stats: Arc<AgentStats>,
        max_chunk: usize,
    ) -> Self {
        Uploader {
            buffer,
            settings,
            network,
            transport,
            notifier,
            stats,
            max_chunk: max_chunk.max(1),
            lane: tokio::sync::Mutex::new(()),
        }
    }

    pub async fn flush(&self, reason: FlushReason) -> FlushOutcome {
        let _lane = match self.lane.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                log::debug!("Flush ({:?}) coalesced into running upload", reason);
                self.stats
                    .flushes_coalesced
                    .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                return FlushOutcome::Coalesced;
            }
        };
        self.flush_locked(reason).await
    }

    /// Like [`Uploader::flush`], but waits for a running upload to finish
    /// instead of coalescing into it
    pub async fn flush_after_running(&self, reason: FlushReason) -> FlushOutcome {
        let _lane = self.lane.lock().await;
        self.flush_locked(reason).await
    }

    async fn flush_locked(&self, reason: FlushReason) -> FlushOutcome {
        let url = match self.check_preconditions(reason) {
            Ok(url) => url,
            Err(skip) => {
                log::debug!("Flush ({:?}) skipped: {:?}", reason, skip);
                return FlushOutcome::Skipped(skip);
            }
        };

        let mut sent = 0;
        let mut chunks = 0;
        loop {
            let (generation, chunk) =
                match self.with_buffer(|b| (b.generation(), b.peek_chunk(self.max_chunk))) {
                    Some((generation, chunk)) if !chunk.is_empty() => (generation, chunk),
                    _ => break,
                };

            let body = match GpsBatch::from_records(&chunk).to_json_bytes() {
                Ok(body) => body,
                Err(e) => {
                    return self.abort(sent, UploadError::Serialization(e.to_string()));
                }
            };

            match self.transport.post_batch(&url, body).await {
                Ok(status) if (200..300).contains(&status) => {
                    log::info!("Sent {} records to server. Removing them from the buffer.", chunk.len());
                    let pruned = self.with_buffer(|b| {
                        let removed = b.remove_confirmed(generation, &chunk).unwrap_or(false);
                        (removed, b.generation() != generation)
                    });
                    sent += chunk.len();
                    chunks += 1;
                    // after a clear, everything left was appended later and is still unsent
                    if !matches!(pruned, Some((true, _)) | Some((false, true))) {
                        log::error!("Buffer did not shrink after a confirmed chunk, stopping upload");
                        break;
                    }
                }
                Ok(status) => {
                    log::warn!("Server responded with status code: {}", status);
                    return self.abort(sent, UploadError::HttpError(status));
                }
                Err(e) => {
                    log::warn!("Error sending data to server: {}", e);
                    return self.abort(sent, e);
                }
            }
        }

        if sent > 0 {
            self.stats
                .record_upload(true, sent as u64, format!("{} records in {} chunks", sent, chunks));
        }
        FlushOutcome::Completed { sent, chunks }
    }

    fn check_preconditions(&self, reason: FlushReason) -> Result<Url, SkipReason> {
        let config = self.settings.get();
        let len = self.with_buffer(|b| b.len()).unwrap_or(0);

        if !reason.is_forced() && len < config.max_buffer_size.records() {
            return Err(SkipReason::BelowThreshold);
        }
        if len == 0 {
            return Err(SkipReason::EmptyBuffer);
        }
        if !self.network.is_reachable() {
            return Err(SkipReason::Unreachable);
        }
        if config.server_host.trim().is_empty() {
            return Err(SkipReason::NoEndpoint);
        }
        batch_url(&config.server_host, &config.api_key).ok_or_else(|| {
            log::warn!("Invalid server host: {:?}", config.server_host);
            SkipReason::InvalidEndpoint
        })
    }

    fn abort(&self, sent: usize, error: UploadError) -> FlushOutcome {
        let title = match error {
            UploadError::HttpError(_) => "HTTP Err",
            _ => "Upload Err",
        };
        self.notifier.send_titled(Some(title), &error.to_string());
        self.stats.record_upload(false, sent as u64, error.to_string());
        FlushOutcome::Aborted { sent, error }
    }

    fn with_buffer<R>(&self, f: impl FnOnce(&mut LocalBuffer) -> R) -> Option<R> {
        match self.buffer.lock() {
            Ok(mut buffer) => Some(f(&mut buffer)),
            Err(_) => {
                log::error!("Failed to acquire buffer lock");
                None
            }
        }
    }
}
