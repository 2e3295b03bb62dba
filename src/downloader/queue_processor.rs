//! Queue processor — dispatch pump and concurrency limiting.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tracing::{debug, warn};

use super::MediaDownloader;
use crate::types::{DownloadStatus, Event};
use crate::utils;

/// Interval between dispatch sweeps
const QUEUE_POLL_INTERVAL: Duration = Duration::from_millis(100);

impl MediaDownloader {
    /// Start the queue processor task
    ///
    /// This method spawns a background task that sweeps the pending queue
    /// at a fixed interval:
    /// 1. While the running intent is set and a concurrency slot is free,
    ///    dispatch the head record into its own download task
    /// 2. Hold dispatch while the destination volume is below the
    ///    configured free-space threshold
    /// 3. Emit the fully-stopped event once a requested stop has drained
    ///
    /// The task runs until [`shutdown`](Self::shutdown) cancels it.
    /// Dispatch order is queue order; the concurrency limit is re-read
    /// every dispatch so runtime changes apply between sweeps.
    pub fn start_queue_processor(&self) -> tokio::task::JoinHandle<()> {
        let downloader = self.clone();
        let shutdown = self.queue_state.shutdown_token.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(QUEUE_POLL_INTERVAL) => {
                        downloader.dispatch_pending().await;
                    }
                }
            }

            debug!("Queue processor exited");
        })
    }

    /// One dispatch sweep of the pending queue.
    async fn dispatch_pending(&self) {
        while self.queue_state.downloads_running.load(Ordering::SeqCst)
            && self.queue_state.active_count.load(Ordering::SeqCst)
                < self.queue_state.concurrent_limit.load(Ordering::SeqCst)
        {
            if !self.disk_space_ok() {
                break;
            }

            let entry = {
                let mut pending = self.queue_state.pending.lock().await;

                // A head record still waiting on its metadata query blocks
                // the sweep; records behind it keep their queue position
                let head_is_ready = pending
                    .front()
                    .is_some_and(|head| head.status() != DownloadStatus::Querying);

                if head_is_ready { pending.pop_front() } else { None }
            };

            let Some(entry) = entry else {
                break;
            };

            self.queue_state.active_count.fetch_add(1, Ordering::SeqCst);
            self.queue_state
                .active
                .lock()
                .await
                .insert(entry.id, Arc::clone(&entry));
            entry.set_running(true);

            debug!(download_id = entry.id.0, url = %entry.filtered_url, "Dispatching download");

            let downloader = self.clone();
            tokio::spawn(async move {
                downloader.run_download_task(entry).await;
            });
        }

        // stop() saw jobs in flight; emit the fully-stopped event exactly
        // once after the last of them unwound
        if !self.queue_state.downloads_running.load(Ordering::SeqCst)
            && self.queue_state.active_count.load(Ordering::SeqCst) == 0
            && self.queue_state.draining.swap(false, Ordering::SeqCst)
        {
            self.emit_event(Event::QueueStopped);
        }
    }

    /// Disk guard: false while the destination volume sits below the
    /// configured minimum free space.
    fn disk_space_ok(&self) -> bool {
        let min_mb = self.config.download.min_free_space_mb;
        if min_mb == 0 {
            return true;
        }

        let required_bytes = min_mb.saturating_mul(1024 * 1024);

        match utils::get_available_space(self.config.download_dir()) {
            Ok(available_bytes) if available_bytes < required_bytes => {
                warn!(
                    available_bytes,
                    required_bytes, "Destination volume below free-space threshold, holding dispatch"
                );
                self.emit_event(Event::LowDiskSpace {
                    available_bytes,
                    required_bytes,
                });
                false
            }
            Ok(_) => true,
            Err(e) => {
                // A failed probe does not hold the queue
                debug!(error = %e, "Could not determine free space");
                true
            }
        }
    }
}
