//! Core downloader implementation split into focused submodules.
//!
//! The `MediaDownloader` struct and its methods are organized by domain:
//! - [`queue`] - URL capture and deduplication
//! - [`control`] - Queue control (start/stop/retry/clear/close)
//! - [`lifecycle`] - Graceful shutdown coordination
//! - [`queue_processor`] - Dispatch pump and concurrency limiting
//! - [`download_task`] - Per-job pipeline execution and finalization
//! - [`entry`] - The shared per-download record

mod control;
mod download_task;
mod entry;
mod lifecycle;
mod queue;
mod queue_processor;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub(crate) use entry::QueueEntry;

use std::sync::atomic::Ordering;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::sources::{MediaSource, YtDlpSource};
use crate::types::{DownloadId, DownloadInfo, QueueStats};

/// Queue and download state management
#[derive(Clone)]
pub(crate) struct QueueState {
    /// Every live record by id, whatever its current status
    pub(crate) entries: std::sync::Arc<
        tokio::sync::Mutex<std::collections::HashMap<DownloadId, std::sync::Arc<QueueEntry>>>,
    >,
    /// Dedup set holding both the original and normalized form of every
    /// captured URL
    pub(crate) captured_links:
        std::sync::Arc<tokio::sync::Mutex<std::collections::HashSet<String>>>,
    /// Records waiting for dispatch, in FIFO order (stop requeues at the head)
    pub(crate) pending:
        std::sync::Arc<tokio::sync::Mutex<std::collections::VecDeque<std::sync::Arc<QueueEntry>>>>,
    /// Records currently owned by a worker task
    pub(crate) active: std::sync::Arc<
        tokio::sync::Mutex<std::collections::HashMap<DownloadId, std::sync::Arc<QueueEntry>>>,
    >,
    /// Records that finished successfully
    pub(crate) completed: std::sync::Arc<tokio::sync::Mutex<Vec<std::sync::Arc<QueueEntry>>>>,
    /// Records that failed
    pub(crate) failed: std::sync::Arc<tokio::sync::Mutex<Vec<std::sync::Arc<QueueEntry>>>>,
    /// Number of in-flight worker tasks; the pump dispatches only while
    /// this is below the concurrency limit
    pub(crate) active_count: std::sync::Arc<std::sync::atomic::AtomicUsize>,
    /// Whether the queue processor should dispatch pending records
    pub(crate) downloads_running: std::sync::Arc<std::sync::atomic::AtomicBool>,
    /// Set when stop was requested while jobs were in flight; the pump
    /// emits QueueStopped once the last one unwinds
    pub(crate) draining: std::sync::Arc<std::sync::atomic::AtomicBool>,
    /// Monotonic id allocator
    pub(crate) next_download_id: std::sync::Arc<std::sync::atomic::AtomicI64>,
    /// Runtime-mutable concurrency limit, observed at each dispatch check
    pub(crate) concurrent_limit: std::sync::Arc<std::sync::atomic::AtomicUsize>,
    /// Cancelled on shutdown; exits the queue processor loop
    pub(crate) shutdown_token: tokio_util::sync::CancellationToken,
}

impl QueueState {
    fn new(concurrent_limit: usize) -> Self {
        Self {
            entries: std::sync::Arc::new(tokio::sync::Mutex::new(
                std::collections::HashMap::new(),
            )),
            captured_links: std::sync::Arc::new(tokio::sync::Mutex::new(
                std::collections::HashSet::new(),
            )),
            pending: std::sync::Arc::new(tokio::sync::Mutex::new(
                std::collections::VecDeque::new(),
            )),
            active: std::sync::Arc::new(tokio::sync::Mutex::new(std::collections::HashMap::new())),
            completed: std::sync::Arc::new(tokio::sync::Mutex::new(Vec::new())),
            failed: std::sync::Arc::new(tokio::sync::Mutex::new(Vec::new())),
            active_count: std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0)),
            downloads_running: std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false)),
            draining: std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false)),
            next_download_id: std::sync::Arc::new(std::sync::atomic::AtomicI64::new(0)),
            // Zero would deadlock the pump, clamp to one
            concurrent_limit: std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(
                concurrent_limit.max(1),
            )),
            shutdown_token: tokio_util::sync::CancellationToken::new(),
        }
    }
}

/// Main downloader instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct MediaDownloader {
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<crate::types::Event>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: std::sync::Arc<Config>,
    /// Media source driving the external tool (trait object for pluggable
    /// implementations)
    pub(crate) source: std::sync::Arc<dyn MediaSource>,
    /// Queue and download state management
    pub(crate) queue_state: QueueState,
}

impl MediaDownloader {
    /// Create a new MediaDownloader instance
    ///
    /// This initializes all core components:
    /// - Creates the download and temp directories if absent
    /// - Resolves the yt-dlp and ffmpeg binaries from configuration/PATH
    /// - Sets up the event broadcast channel
    pub async fn new(config: Config) -> Result<Self> {
        ensure_directories(&config).await?;

        let source = std::sync::Arc::new(YtDlpSource::resolve(&config.tools)?);

        Ok(Self::assemble(config, source))
    }

    /// Create a downloader with a custom media source.
    ///
    /// Used to plug in other download tools or test doubles; binary
    /// resolution is the source's business.
    pub async fn with_source(
        config: Config,
        source: std::sync::Arc<dyn MediaSource>,
    ) -> Result<Self> {
        ensure_directories(&config).await?;

        Ok(Self::assemble(config, source))
    }

    fn assemble(config: Config, source: std::sync::Arc<dyn MediaSource>) -> Self {
        // Buffer size 1000: subscribers lagging further than this lose
        // events rather than stalling the core
        let (event_tx, _rx) = tokio::sync::broadcast::channel(1000);

        let queue_state = QueueState::new(config.download.max_concurrent_downloads);

        tracing::info!(
            source = source.name(),
            executable = %source.executable().display(),
            concurrent_limit = config.download.max_concurrent_downloads,
            "Media downloader initialized"
        );

        Self {
            event_tx,
            config: std::sync::Arc::new(config),
            source,
            queue_state,
        }
    }

    /// Subscribe to download events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all events independently.
    /// Events are buffered, but if a subscriber falls behind by more than 1000 events,
    /// it will receive a `RecvError::Lagged` error.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use media_dl::{Config, MediaDownloader};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let downloader = MediaDownloader::new(Config::default()).await?;
    ///
    ///     let mut events = downloader.subscribe();
    ///     tokio::spawn(async move {
    ///         while let Ok(event) = events.recv().await {
    ///             println!("{event:?}");
    ///         }
    ///     });
    ///
    ///     downloader.capture("https://www.youtube.com/watch?v=dQw4w9WgXcQ").await?;
    ///     downloader.start_queue_processor();
    ///     downloader.start();
    ///     Ok(())
    /// }
    /// ```
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<crate::types::Event> {
        self.event_tx.subscribe()
    }

    /// Subscribe to download events as a `Stream`
    ///
    /// Wraps [`subscribe`](Self::subscribe) for consumers that prefer
    /// stream combinators over a receiver loop. Lagged subscribers see a
    /// `BroadcastStreamRecvError::Lagged` item instead of missed events.
    pub fn event_stream(
        &self,
    ) -> tokio_stream::wrappers::BroadcastStream<crate::types::Event> {
        tokio_stream::wrappers::BroadcastStream::new(self.subscribe())
    }

    /// Get the current configuration
    ///
    /// The configuration is wrapped in an Arc, so this is a cheap clone
    /// operation.
    pub fn get_config(&self) -> std::sync::Arc<Config> {
        std::sync::Arc::clone(&self.config)
    }

    /// Snapshot one download record
    pub async fn get_download(&self, id: DownloadId) -> Option<DownloadInfo> {
        let entries = self.queue_state.entries.lock().await;
        entries.get(&id).map(|entry| entry.snapshot())
    }

    /// Snapshot every live record, ordered by capture id
    pub async fn list_downloads(&self) -> Vec<DownloadInfo> {
        let entries = self.queue_state.entries.lock().await;

        let mut downloads: Vec<DownloadInfo> =
            entries.values().map(|entry| entry.snapshot()).collect();
        downloads.sort_by_key(|info| info.id);
        downloads
    }

    /// Current queue statistics
    pub async fn queue_stats(&self) -> QueueStats {
        QueueStats {
            pending: self.queue_state.pending.lock().await.len(),
            active: self.queue_state.active_count.load(Ordering::SeqCst),
            completed: self.queue_state.completed.lock().await.len(),
            failed: self.queue_state.failed.lock().await.len(),
            captured_urls: self.queue_state.captured_links.lock().await.len(),
            running: self.queue_state.downloads_running.load(Ordering::SeqCst),
            concurrent_limit: self.queue_state.concurrent_limit.load(Ordering::SeqCst),
        }
    }

    /// Emit an event to all subscribers
    ///
    /// If there are no active subscribers, the event is silently dropped
    /// (ok() converts Err to None). Downloads proceed whether or not
    /// anyone is listening.
    pub(crate) fn emit_event(&self, event: crate::types::Event) {
        self.event_tx.send(event).ok();
    }
}

/// Create the download and temp directories, with path context on failure.
async fn ensure_directories(config: &Config) -> Result<()> {
    tokio::fs::create_dir_all(&config.download.download_dir)
        .await
        .map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to create download directory '{}': {}",
                    config.download.download_dir.display(),
                    e
                ),
            ))
        })?;
    tokio::fs::create_dir_all(&config.download.temp_dir)
        .await
        .map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to create temp directory '{}': {}",
                    config.download.temp_dir.display(),
                    e
                ),
            ))
        })?;

    Ok(())
}
