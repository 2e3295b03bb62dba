//! URL capture and deduplication.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use tracing::{debug, info};

use super::{MediaDownloader, QueueEntry};
use crate::error::Result;
use crate::sources::{SiteFilter, is_youtube_channel};
use crate::types::{DownloadId, DownloadStatus, Event};

impl MediaDownloader {
    /// Capture a URL into the download queue.
    ///
    /// The URL runs through the capture gauntlet: trim, source capability
    /// check, site classification, normalization, deduplication. Survivors
    /// get a record, a spot at the tail of the pending queue and (when
    /// enabled) an async metadata query.
    ///
    /// Returns `Ok(true)` only when a new record was queued; rejected and
    /// duplicate URLs return `Ok(false)`.
    pub async fn capture(&self, url: &str) -> Result<bool> {
        let url = url.trim();

        if url.is_empty() {
            return Ok(false);
        }

        if !self.source.can_consume_url(url) {
            debug!(url = %url, "Source cannot consume URL");
            return Ok(false);
        }

        // Whole-channel downloads are never what a pasted link means
        if is_youtube_channel(url) {
            debug!(url = %url, "Refusing channel URL");
            return Ok(false);
        }

        let Some(site) = SiteFilter::classify(url, self.config.capture.capture_any_links) else {
            debug!(url = %url, "No site filter matched");
            return Ok(false);
        };

        let filtered_url = self
            .source
            .normalize_url(url, self.config.capture.playlist_policy);

        {
            let mut captured = self.queue_state.captured_links.lock().await;

            if captured.contains(url) || captured.contains(&filtered_url) {
                debug!(url = %url, "URL already captured");
                return Ok(false);
            }

            captured.insert(url.to_string());
            captured.insert(filtered_url.clone());
        }

        let id = DownloadId(
            self.queue_state
                .next_download_id
                .fetch_add(1, Ordering::SeqCst)
                + 1,
        );

        let query_metadata = self.config.capture.query_metadata;
        let initial_status = if query_metadata {
            DownloadStatus::Querying
        } else {
            DownloadStatus::Queued
        };

        let entry = Arc::new(QueueEntry::new(
            id,
            url.to_string(),
            filtered_url.clone(),
            site,
            initial_status,
        ));

        self.queue_state
            .entries
            .lock()
            .await
            .insert(id, Arc::clone(&entry));
        self.queue_state
            .pending
            .lock()
            .await
            .push_back(Arc::clone(&entry));

        info!(download_id = id.0, url = %url, site = %site, "Captured URL");
        self.emit_event(Event::Captured {
            id,
            url: filtered_url,
        });

        if query_metadata {
            self.spawn_metadata_query(entry);
        }

        Ok(true)
    }

    /// Resolve media metadata in the background.
    ///
    /// Metadata is display-only; the record becomes dispatchable when the
    /// query finishes, whether or not it produced anything.
    fn spawn_metadata_query(&self, entry: Arc<QueueEntry>) {
        let downloader = self.clone();

        tokio::spawn(async move {
            let info = downloader.source.fetch_metadata(&entry.filtered_url).await;

            // The record may have been closed while the query ran
            if entry.is_cancelled() {
                return;
            }

            match info {
                Some(info) => {
                    let title = info.title.clone();
                    entry.set_media_info(info);

                    debug!(download_id = entry.id.0, title = %title, "Metadata resolved");
                    downloader.emit_event(Event::MetadataResolved { id: entry.id, title });
                }
                None => {
                    debug!(download_id = entry.id.0, "Metadata query came back empty");
                }
            }

            if entry.set_status(DownloadStatus::Queued, "Queued") {
                downloader.emit_event(Event::StatusChanged {
                    id: entry.id,
                    status: DownloadStatus::Queued,
                    message: "Queued".to_string(),
                });
            }
        });
    }
}
