//! Per-download record shared between the queue and worker tasks

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::sources::SiteFilter;
use crate::types::{DownloadId, DownloadInfo, DownloadStatus, MediaInfo};

/// Status and its display message, updated together under one lock
struct StatusLine {
    status: DownloadStatus,
    message: String,
}

/// One captured URL's full lifetime state.
///
/// Shared as `Arc<QueueEntry>` between the entries map, the pending
/// queue and the worker task driving it. Hot-path cancellation checks go
/// through a cloned [`CancellationToken`] rather than the entry itself;
/// everything else sits behind short-lived std mutexes that are never
/// held across an await.
pub(crate) struct QueueEntry {
    /// Monotonic id assigned at capture
    pub(crate) id: DownloadId,
    /// URL exactly as captured
    pub(crate) original_url: String,
    /// Normalized URL used for fetching
    pub(crate) filtered_url: String,
    /// Site rule that recognized the URL
    pub(crate) site: SiteFilter,
    /// Capture timestamp
    pub(crate) created_at: DateTime<Utc>,

    /// Current status and display message
    status: std::sync::Mutex<StatusLine>,
    /// Current progress percent (0-100)
    percent: std::sync::Mutex<f64>,
    /// Cancellation for the current run attempt; replaced wholesale by
    /// [`QueueEntry::reset`], which is the only way to clear it
    cancel_token: std::sync::Mutex<CancellationToken>,
    /// Whether a worker task currently owns this entry
    running: AtomicBool,
    /// Latch set on the first downloading-phase output line
    download_started: AtomicBool,
    /// Scratch directory of the current run attempt
    work_dir: std::sync::Mutex<Option<PathBuf>>,
    /// Files the finalizer copied into the destination
    final_files: std::sync::Mutex<Vec<PathBuf>>,
    /// Media metadata resolved asynchronously after capture
    media_info: std::sync::RwLock<Option<MediaInfo>>,
}

/// Lock with poison recovery; these mutexes guard plain values that stay
/// valid even if a worker panicked while holding one.
fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl QueueEntry {
    pub(crate) fn new(
        id: DownloadId,
        original_url: String,
        filtered_url: String,
        site: SiteFilter,
        initial_status: DownloadStatus,
    ) -> Self {
        Self {
            id,
            original_url,
            filtered_url,
            site,
            created_at: Utc::now(),
            status: std::sync::Mutex::new(StatusLine {
                status: initial_status,
                message: String::new(),
            }),
            percent: std::sync::Mutex::new(0.0),
            cancel_token: std::sync::Mutex::new(CancellationToken::new()),
            running: AtomicBool::new(false),
            download_started: AtomicBool::new(false),
            work_dir: std::sync::Mutex::new(None),
            final_files: std::sync::Mutex::new(Vec::new()),
            media_info: std::sync::RwLock::new(None),
        }
    }

    // --- status ---

    pub(crate) fn status(&self) -> DownloadStatus {
        lock(&self.status).status
    }

    /// Move to `next`, updating the display message.
    ///
    /// Returns true only when the status was newly entered; callers use
    /// that to decide whether to emit a status event. A repeat of the
    /// current status refreshes the message without replaying side
    /// effects. An illegal transition is refused and logged, leaving the
    /// record unchanged.
    pub(crate) fn set_status(&self, next: DownloadStatus, message: impl Into<String>) -> bool {
        let mut line = lock(&self.status);

        if line.status == next {
            line.message = message.into();
            return false;
        }

        if !line.status.can_transition_to(next) {
            warn!(
                download_id = self.id.0,
                from = %line.status,
                to = %next,
                "Refusing illegal status transition"
            );
            return false;
        }

        line.status = next;
        line.message = message.into();
        true
    }

    // --- progress ---

    pub(crate) fn percent(&self) -> f64 {
        *lock(&self.percent)
    }

    pub(crate) fn set_percent(&self, percent: f64) {
        *lock(&self.percent) = percent;
    }

    pub(crate) fn download_started(&self) -> bool {
        self.download_started.load(Ordering::SeqCst)
    }

    pub(crate) fn set_download_started(&self, started: bool) {
        self.download_started.store(started, Ordering::SeqCst);
    }

    // --- cancellation and run state ---

    /// Cancel the current run attempt. Idempotent.
    pub(crate) fn cancel(&self) {
        lock(&self.cancel_token).cancel();
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        lock(&self.cancel_token).is_cancelled()
    }

    /// Clone of the current run's token, for lock-free observation in
    /// the output pump.
    pub(crate) fn cancel_token(&self) -> CancellationToken {
        lock(&self.cancel_token).clone()
    }

    /// Prepare the entry for another run attempt: fresh cancellation
    /// token, percent back to zero, download-started latch off.
    ///
    /// The status is NOT touched; callers pair reset with an explicit
    /// transition (Stopped on requeue, Queued on retry).
    pub(crate) fn reset(&self) {
        *lock(&self.cancel_token) = CancellationToken::new();
        *lock(&self.percent) = 0.0;
        self.download_started.store(false, Ordering::SeqCst);
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    // --- scratch directory and outputs ---

    pub(crate) fn work_dir(&self) -> Option<PathBuf> {
        lock(&self.work_dir).clone()
    }

    pub(crate) fn set_work_dir(&self, dir: PathBuf) {
        *lock(&self.work_dir) = Some(dir);
    }

    /// Detach the scratch dir from the record, for deletion.
    pub(crate) fn take_work_dir(&self) -> Option<PathBuf> {
        lock(&self.work_dir).take()
    }

    pub(crate) fn push_final_file(&self, path: PathBuf) {
        lock(&self.final_files).push(path);
    }

    pub(crate) fn final_files(&self) -> Vec<PathBuf> {
        lock(&self.final_files).clone()
    }

    // --- metadata ---

    pub(crate) fn set_media_info(&self, info: MediaInfo) {
        *self
            .media_info
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(info);
    }

    pub(crate) fn media_info(&self) -> Option<MediaInfo> {
        self.media_info
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Read-only copy for presentation layers.
    pub(crate) fn snapshot(&self) -> DownloadInfo {
        let line = lock(&self.status);

        DownloadInfo {
            id: self.id,
            url: self.original_url.clone(),
            filtered_url: self.filtered_url.clone(),
            status: line.status,
            message: line.message.clone(),
            percent: *lock(&self.percent),
            media: self.media_info(),
            files: self.final_files(),
            created_at: self.created_at,
        }
    }
}
