//! Download task orchestration — top-level lifecycle for a single download.

use std::sync::Arc;

use rand::Rng;

use crate::config::Config;
use crate::downloader::{MediaDownloader, QueueEntry};
use crate::error::Result;
use crate::process::{RunHooks, RunOutcome, run_streaming};
use crate::progress::{ProgressUpdate, parse_line};
use crate::sources::PassRequest;
use crate::types::{DownloadOutcome, DownloadPass, DownloadResult, DownloadStatus, Event};

use super::finalization::{finalize_download, remove_scratch_dir};

impl MediaDownloader {
    /// Core download task -- drives the full lifecycle of a single record.
    ///
    /// Phases:
    /// 1. Run the multi-pass pipeline against the external tool
    /// 2. Route the result: finalize artifacts, requeue after a stop, or
    ///    mark the record failed
    /// 3. Unwind the active bookkeeping so the queue processor can
    ///    dispatch the next record
    /// 4. Emit the terminal event, so an observer reacting to it sees
    ///    the concurrency slot already freed
    ///
    /// A record whose token was cancelled mid-run was closed (or abandoned
    /// by shutdown); it unwinds silently and its scratch dir is discarded.
    pub(crate) async fn run_download_task(&self, entry: Arc<QueueEntry>) {
        let id = entry.id;

        let result = self.try_download(&entry).await;

        // Requeue after the unwind, not before: a record back in pending
        // must never still look owned by this task
        let mut requeue = None;
        let mut terminal = None;

        if entry.is_cancelled() {
            tracing::debug!(download_id = id.0, "Download cancelled, discarding run");
            remove_scratch_dir(&entry).await;
        } else {
            match result {
                Ok(result) => match result.outcome {
                    DownloadOutcome::Success => {
                        terminal = Some(self.finalize_success(&entry).await);
                    }
                    DownloadOutcome::Stopped => {
                        // The scratch dir stays: the next attempt resumes
                        // from whatever the tool already fetched
                        tracing::debug!(download_id = id.0, "Download stopped, requeueing at head");
                        entry.reset();
                        if entry.set_status(DownloadStatus::Stopped, "Stopped") {
                            self.emit_event(Event::StatusChanged {
                                id,
                                status: DownloadStatus::Stopped,
                                message: "Stopped".to_string(),
                            });
                        }
                        requeue = Some(Arc::clone(&entry));
                    }
                    DownloadOutcome::Unsupported
                    | DownloadOutcome::MainCategoryFailed
                    | DownloadOutcome::NoApplicableMethod => {
                        let diagnostic = result
                            .diagnostic
                            .filter(|d| !d.is_empty())
                            .unwrap_or_else(|| "Download failed".to_string());
                        terminal = Some(self.mark_failed(&entry, diagnostic).await);
                    }
                },
                Err(e) => {
                    tracing::error!(download_id = id.0, error = %e, "Download task errored");
                    terminal = Some(self.mark_failed(&entry, e.to_string()).await);
                }
            }
        }

        entry.set_running(false);
        self.queue_state.active.lock().await.remove(&id);
        if let Some(entry) = requeue {
            self.queue_state.pending.lock().await.push_front(entry);
        }
        self.queue_state
            .active_count
            .fetch_sub(1, std::sync::atomic::Ordering::SeqCst);

        if let Some(event) = terminal {
            self.emit_event(event);
        }
    }

    /// Run every enabled pass against the tool, in pipeline order.
    ///
    /// Primaries (video, audio) run first; a non-zero exit from one of
    /// them ends the job. Secondaries (subtitles, thumbnails) only warn.
    /// The scheduler stop flag and the record's cancellation token are
    /// observed between output lines, so an interruption lands within the
    /// runner's poll interval.
    async fn try_download(&self, entry: &Arc<QueueEntry>) -> Result<DownloadResult> {
        let id = entry.id;

        if entry.set_status(DownloadStatus::Starting, "Starting download") {
            self.emit_event(Event::StatusChanged {
                id,
                status: DownloadStatus::Starting,
                message: "Starting download".to_string(),
            });
        }

        if !self.config.has_applicable_method() {
            return Ok(DownloadResult::new(
                DownloadOutcome::NoApplicableMethod,
                "No applicable download method enabled",
            ));
        }

        let work_dir = self.config.temp_dir().join(format!("download_{}", id.0));
        if let Err(e) = tokio::fs::create_dir_all(&work_dir).await {
            tracing::error!(download_id = id.0, error = %e, "Failed to create scratch directory");
            return Err(e.into());
        }
        entry.set_work_dir(work_dir.clone());

        let hooks = RunHooks {
            scheduler_running: Arc::clone(&self.queue_state.downloads_running),
            cancel: entry.cancel_token(),
        };

        let mut any_success = false;
        let mut last_output = String::new();

        for pass in DownloadPass::ORDER {
            if !pass_enabled(&self.config, pass) {
                continue;
            }

            let request = PassRequest {
                pass,
                url: &entry.filtered_url,
                work_dir: &work_dir,
                config: &self.config,
                site: entry.site,
            };
            let args = self.source.build_args(&request);
            if args.is_empty() {
                // The source produced nothing for this pass (for example
                // the audio pass with the bitrate set to no-audio)
                continue;
            }

            if self.config.download.random_intervals {
                let secs = rand::thread_rng().gen_range(1..=5);
                tracing::debug!(download_id = id.0, secs, "Sleeping before tool invocation");
                tokio::time::sleep(std::time::Duration::from_secs(secs)).await;
            }

            tracing::debug!(
                download_id = id.0,
                pass = %pass,
                url = %entry.filtered_url,
                "Running download pass"
            );

            let outcome = run_streaming(self.source.executable(), &args, &hooks, |line| {
                self.handle_output_line(entry, line);
            })
            .await?;

            match outcome {
                RunOutcome::Interrupted => {
                    return Ok(DownloadResult::bare(DownloadOutcome::Stopped));
                }
                RunOutcome::Completed {
                    exit_code: 0,
                    last_line,
                } => {
                    any_success = true;
                    if !last_line.is_empty() {
                        last_output = last_line;
                    }
                }
                RunOutcome::Completed {
                    exit_code,
                    last_line,
                } => {
                    if last_line.contains("Unsupported URL") {
                        tracing::warn!(
                            download_id = id.0,
                            url = %entry.filtered_url,
                            "Tool reports the URL as unsupported"
                        );
                        return Ok(DownloadResult::new(DownloadOutcome::Unsupported, last_line));
                    }

                    if pass.is_primary() {
                        tracing::error!(
                            download_id = id.0,
                            pass = %pass,
                            exit_code,
                            diagnostic = %last_line,
                            "Primary pass failed"
                        );
                        return Ok(DownloadResult::new(
                            DownloadOutcome::MainCategoryFailed,
                            last_line,
                        ));
                    }

                    // Secondary passes never fail the job
                    tracing::error!(
                        download_id = id.0,
                        pass = %pass,
                        exit_code,
                        diagnostic = %last_line,
                        "Secondary pass failed, continuing"
                    );
                    self.emit_event(Event::SecondaryPassWarning {
                        id,
                        pass,
                        error: last_line,
                    });
                }
            }
        }

        if any_success {
            Ok(DownloadResult::new(DownloadOutcome::Success, last_output))
        } else {
            // Every pass was skipped or produced nothing
            Ok(DownloadResult::new(DownloadOutcome::Unsupported, last_output))
        }
    }

    /// Classify one tool output line and fold it into the record.
    ///
    /// Runs synchronously inside the output pump; state lives on the
    /// entry, events go straight to the broadcast bus.
    fn handle_output_line(&self, entry: &QueueEntry, line: &str) {
        let id = entry.id;

        match parse_line(line, entry.percent(), entry.download_started()) {
            ProgressUpdate::Downloading { percent, message } => {
                entry.set_download_started(true);

                if let Some(percent) = percent {
                    entry.set_percent(percent);
                    self.emit_event(Event::ProgressChanged {
                        id,
                        percent,
                        message: message.clone(),
                    });
                }

                if entry.set_status(DownloadStatus::Downloading, &message) {
                    self.emit_event(Event::StatusChanged {
                        id,
                        status: DownloadStatus::Downloading,
                        message,
                    });
                }
            }
            ProgressUpdate::Processing { message } => {
                if entry.set_status(DownloadStatus::Processing, &message) {
                    self.emit_event(Event::StatusChanged {
                        id,
                        status: DownloadStatus::Processing,
                        message,
                    });
                }
            }
            ProgressUpdate::Preparing { message } => {
                if entry.set_status(DownloadStatus::Preparing, &message) {
                    self.emit_event(Event::StatusChanged {
                        id,
                        status: DownloadStatus::Preparing,
                        message,
                    });
                }
            }
        }
    }

    /// Finalize a successful run and mark the record complete. Returns
    /// the terminal event for the caller to emit once the active
    /// bookkeeping is unwound.
    ///
    /// A placement failure does not fail the job: the tool already did
    /// its work. The failure is logged, the files that did land are
    /// reported, and the scratch directory stays behind so nothing
    /// downloaded is lost.
    async fn finalize_success(&self, entry: &Arc<QueueEntry>) -> Event {
        let id = entry.id;

        if let Err(e) = finalize_download(entry, &self.config).await {
            tracing::error!(download_id = id.0, error = %e, "Finalization incomplete");
        }
        let files = entry.final_files();

        tracing::info!(
            download_id = id.0,
            file_count = files.len(),
            "Download complete"
        );
        if entry.set_status(DownloadStatus::Complete, "Complete") {
            self.emit_event(Event::StatusChanged {
                id,
                status: DownloadStatus::Complete,
                message: "Complete".to_string(),
            });
        }
        if self.still_tracked(entry).await {
            self.queue_state
                .completed
                .lock()
                .await
                .push(Arc::clone(entry));
        }

        Event::DownloadComplete { id, files }
    }

    /// Mark the record failed and return the failure event for the caller
    /// to emit once the active bookkeeping is unwound. The scratch
    /// directory is kept so an explicit retry can resume partial files.
    async fn mark_failed(&self, entry: &Arc<QueueEntry>, diagnostic: String) -> Event {
        let id = entry.id;

        tracing::warn!(download_id = id.0, diagnostic = %diagnostic, "Download failed");

        if entry.set_status(DownloadStatus::Failed, &diagnostic) {
            self.emit_event(Event::StatusChanged {
                id,
                status: DownloadStatus::Failed,
                message: diagnostic.clone(),
            });
        }
        if self.still_tracked(entry).await {
            self.queue_state.failed.lock().await.push(Arc::clone(entry));
        }

        Event::DownloadFailed {
            id,
            error: diagnostic,
        }
    }

    /// Whether the record is still in the entries map. A record closed
    /// while its task was finishing must not reappear in the terminal
    /// collections.
    async fn still_tracked(&self, entry: &QueueEntry) -> bool {
        self.queue_state
            .entries
            .lock()
            .await
            .contains_key(&entry.id)
    }
}

/// Whether the configuration enables a pass at the queue level.
pub(super) fn pass_enabled(config: &Config, pass: DownloadPass) -> bool {
    match pass {
        DownloadPass::Video => config.download.download_video,
        DownloadPass::Audio => config.download.download_audio,
        DownloadPass::Subtitles => config.download.download_subtitles,
        DownloadPass::Thumbnails => config.download.download_thumbnails,
    }
}
