//! Startup and shutdown coordination.

use crate::types::Event;

use super::MediaDownloader;

/// How long shutdown waits for in-flight downloads before cancelling them
const SHUTDOWN_GRACE_PERIOD: std::time::Duration = std::time::Duration::from_secs(30);

impl MediaDownloader {
    /// Gracefully shut down the downloader
    ///
    /// This method performs a graceful shutdown sequence:
    /// 1. Stops the queue so no further records are dispatched
    /// 2. Waits for active downloads to unwind with a timeout (30 seconds)
    /// 3. Cancels whatever is still running after the grace period
    /// 4. Emits the shutdown event and retires the queue processor task
    ///
    /// Cancelled jobs discard their scratch directories on the way out;
    /// their records keep whatever status they held.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// use media_dl::{Config, MediaDownloader};
    ///
    /// let downloader = MediaDownloader::new(Config::default()).await?;
    /// let processor = downloader.start_queue_processor();
    ///
    /// // ... capture and download ...
    ///
    /// downloader.shutdown().await;
    /// processor.await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn shutdown(&self) {
        tracing::info!("Initiating graceful shutdown");

        // 1. Stop dispatching new downloads
        self.stop();

        // 2. Wait for active downloads to unwind with timeout
        let wait_result =
            tokio::time::timeout(SHUTDOWN_GRACE_PERIOD, self.wait_for_active_downloads()).await;

        match wait_result {
            Ok(()) => {
                tracing::info!("All active downloads unwound gracefully");
            }
            Err(_) => {
                tracing::warn!(
                    grace_secs = SHUTDOWN_GRACE_PERIOD.as_secs(),
                    "Timeout waiting for downloads to unwind, cancelling the rest"
                );

                // 3. Cancel the stragglers; their workers observe the token
                // at the next output line or process exit
                let active = self.queue_state.active.lock().await;
                for entry in active.values() {
                    tracing::debug!(download_id = entry.id.0, "Cancelling download");
                    entry.cancel();
                }
            }
        }

        // 4. Emit shutdown event and retire the queue processor
        self.emit_event(Event::Shutdown);
        self.queue_state.shutdown_token.cancel();

        tracing::info!("Graceful shutdown complete");
    }

    /// Wait for all active downloads to complete
    ///
    /// This is a helper method used during shutdown to wait for active downloads
    /// to finish their current work before closing.
    async fn wait_for_active_downloads(&self) {
        loop {
            let active_count = self
                .queue_state
                .active_count
                .load(std::sync::atomic::Ordering::SeqCst);

            if active_count == 0 {
                return;
            }

            tracing::debug!(active_count, "Waiting for active downloads to unwind");
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
    }
}
