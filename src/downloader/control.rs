//! Queue control — start, stop, retry, clear, close.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use tracing::{debug, info};

use super::download_task::remove_scratch_dir;
use super::{MediaDownloader, QueueEntry};
use crate::error::{DownloadError, Result};
use crate::types::{DownloadId, DownloadStatus, Event};

impl MediaDownloader {
    /// Begin dispatching pending downloads.
    ///
    /// Sets the running intent observed by the queue processor; the
    /// processor itself must have been spawned via
    /// [`start_queue_processor`](Self::start_queue_processor).
    /// Idempotent: calling start while already running does nothing.
    pub fn start(&self) {
        let was_running = self
            .queue_state
            .downloads_running
            .swap(true, Ordering::SeqCst);

        // A restart supersedes any drain still pending from the last
        // stop; its QueueStopped must not fire after this
        self.queue_state.draining.store(false, Ordering::SeqCst);

        if !was_running {
            info!("Queue started");
            self.emit_event(Event::QueueStarted);
        }
    }

    /// Stop dispatching and wind down in-flight downloads.
    ///
    /// Clears the running intent. In-flight jobs are not killed here;
    /// each runner observes the cleared flag at its next poll tick, kills
    /// its process and requeues the record at the head of the pending
    /// queue as Stopped. `QueueStopped` is emitted immediately when
    /// nothing is in flight, otherwise once the last job has unwound.
    pub fn stop(&self) {
        let was_running = self
            .queue_state
            .downloads_running
            .swap(false, Ordering::SeqCst);

        if !was_running {
            return;
        }

        info!("Queue stop requested");

        if self.queue_state.active_count.load(Ordering::SeqCst) > 0 {
            self.queue_state.draining.store(true, Ordering::SeqCst);
        } else {
            self.emit_event(Event::QueueStopped);
        }
    }

    /// Change the concurrency limit at runtime.
    ///
    /// Observed by the queue processor at its next dispatch check; jobs
    /// already in flight above a lowered limit run to completion. Zero is
    /// clamped to one.
    pub fn set_concurrent_limit(&self, limit: usize) {
        let limit = limit.max(1);

        self.queue_state
            .concurrent_limit
            .store(limit, Ordering::SeqCst);
        debug!(limit, "Concurrency limit updated");
    }

    /// Requeue every failed download and resume the queue.
    ///
    /// Each failed record is reset (fresh cancellation token, percent
    /// zeroed) and pushed to the tail of the pending queue in its
    /// original failure order.
    pub async fn retry_failed(&self) {
        let failed: Vec<Arc<QueueEntry>> = {
            let mut failed = self.queue_state.failed.lock().await;
            failed.drain(..).collect()
        };

        if failed.is_empty() {
            return;
        }

        let count = failed.len();

        {
            let mut pending = self.queue_state.pending.lock().await;

            for entry in failed {
                entry.reset();

                if entry.set_status(DownloadStatus::Queued, "Queued") {
                    self.emit_event(Event::StatusChanged {
                        id: entry.id,
                        status: DownloadStatus::Queued,
                        message: "Queued".to_string(),
                    });
                }

                pending.push_back(entry);
            }
        }

        info!(count, "Requeued failed downloads");
        self.start();
    }

    /// Remove every non-running record from the queue.
    ///
    /// Pending, completed and failed records are dropped along with their
    /// scratch directories and dedup set entries, so their URLs can be
    /// captured again. Running jobs are untouched. Returns the number of
    /// records removed.
    pub async fn clear_queue(&self) -> usize {
        let mut removed: Vec<Arc<QueueEntry>> = Vec::new();

        {
            let mut pending = self.queue_state.pending.lock().await;
            let (keep, drop): (std::collections::VecDeque<_>, std::collections::VecDeque<_>) =
                pending.drain(..).partition(|entry| entry.is_running());
            *pending = keep;
            removed.extend(drop);
        }
        {
            let mut completed = self.queue_state.completed.lock().await;
            let (keep, drop): (Vec<_>, Vec<_>) =
                completed.drain(..).partition(|entry| entry.is_running());
            *completed = keep;
            removed.extend(drop);
        }
        {
            let mut failed = self.queue_state.failed.lock().await;
            let (keep, drop): (Vec<_>, Vec<_>) =
                failed.drain(..).partition(|entry| entry.is_running());
            *failed = keep;
            removed.extend(drop);
        }

        {
            let mut entries = self.queue_state.entries.lock().await;
            let mut captured = self.queue_state.captured_links.lock().await;

            for entry in &removed {
                entries.remove(&entry.id);
                captured.remove(&entry.original_url);
                captured.remove(&entry.filtered_url);
            }
        }

        for entry in &removed {
            remove_scratch_dir(entry).await;
        }

        let count = removed.len();
        info!(removed = count, "Cleared queue");
        self.emit_event(Event::Cleared { removed: count });

        count
    }

    /// Close one download, cancelling it if live.
    ///
    /// The record is removed from every collection and its URLs leave the
    /// dedup set. A running job observes its cancellation token at the
    /// next poll tick, kills the tool process and unwinds without
    /// touching the queue; its scratch directory is deleted by whichever
    /// side still owns it.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::NotFound`] when the id is unknown.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use media_dl::{MediaDownloader, types::DownloadId};
    /// # async fn example(downloader: MediaDownloader) -> media_dl::Result<()> {
    /// downloader.close(DownloadId(1)).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn close(&self, id: DownloadId) -> Result<()> {
        let entry = {
            let mut entries = self.queue_state.entries.lock().await;
            entries.remove(&id)
        };

        let Some(entry) = entry else {
            return Err(DownloadError::NotFound { id }.into());
        };

        entry.cancel();

        self.queue_state
            .pending
            .lock()
            .await
            .retain(|pending| pending.id != id);
        self.queue_state.active.lock().await.remove(&id);
        self.queue_state
            .completed
            .lock()
            .await
            .retain(|completed| completed.id != id);
        self.queue_state
            .failed
            .lock()
            .await
            .retain(|failed| failed.id != id);

        {
            let mut captured = self.queue_state.captured_links.lock().await;
            captured.remove(&entry.original_url);
            captured.remove(&entry.filtered_url);
        }

        // A running worker still owns the scratch dir and deletes it on
        // its cancelled unwind; otherwise it is ours to delete
        if !entry.is_running() {
            remove_scratch_dir(&entry).await;
        }

        info!(download_id = id.0, "Closed download");
        self.emit_event(Event::Removed { id });

        Ok(())
    }
}
