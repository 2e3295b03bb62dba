//! End-to-end queue exercises through the public API
//!
//! A scripted [`MediaSource`] stands in for the external download tool, so
//! the full capture → dispatch → finalize path runs without a network or a
//! real yt-dlp binary. Everything here goes through the crate's public
//! surface only.

#![cfg(unix)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use media_dl::{
    Config, DownloadId, DownloadPass, DownloadStatus, Event, MediaDownloader, MediaInfo,
    MediaSource, PassRequest, PlaylistPolicy,
};
use tempfile::TempDir;

/// Source whose passes run shell scripts instead of a downloader binary.
struct ScriptedSource {
    scripts: HashMap<DownloadPass, String>,
}

impl ScriptedSource {
    fn new() -> Self {
        Self {
            scripts: HashMap::new(),
        }
    }

    fn with_script(mut self, pass: DownloadPass, script: &str) -> Self {
        self.scripts.insert(pass, script.to_string());
        self
    }
}

#[async_trait::async_trait]
impl MediaSource for ScriptedSource {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn executable(&self) -> &Path {
        Path::new("/bin/sh")
    }

    fn can_consume_url(&self, url: &str) -> bool {
        url.starts_with("http")
    }

    fn normalize_url(&self, url: &str, _policy: PlaylistPolicy) -> String {
        url.to_string()
    }

    fn build_args(&self, request: &PassRequest<'_>) -> Vec<String> {
        let Some(script) = self.scripts.get(&request.pass) else {
            return Vec::new();
        };
        let script = script.replace("{work_dir}", &request.work_dir.display().to_string());
        vec!["-c".to_string(), script]
    }

    async fn fetch_metadata(&self, _url: &str) -> Option<MediaInfo> {
        None
    }
}

async fn scripted_downloader(source: ScriptedSource) -> (MediaDownloader, TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.download.download_dir = temp_dir.path().join("library");
    config.download.temp_dir = temp_dir.path().join("scratch");
    config.capture.query_metadata = false;
    // The scripted URLs match no site rule; take them via the catch-all
    config.capture.capture_any_links = true;

    let downloader = MediaDownloader::with_source(config, Arc::new(source))
        .await
        .unwrap();
    (downloader, temp_dir)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn capture_to_completion_through_the_public_api() {
    let script = "\
echo '[download]  41.0% of 4.00MiB at 1.00MiB/s ETA 00:02'; \
echo '[download] 100% of 4.00MiB in 00:04'; \
printf 'media' > \"{work_dir}/Talk (720p).mp4\"";
    let source = ScriptedSource::new().with_script(DownloadPass::Video, script);
    let (downloader, temp_dir) = scripted_downloader(source).await;

    let mut events = downloader.subscribe();
    assert!(
        downloader
            .capture("https://media.example.com/watch/talk-42")
            .await
            .unwrap()
    );
    downloader.start();
    let processor = downloader.start_queue_processor();

    let mut finished = None;
    let mut saw_progress = false;
    let _ = tokio::time::timeout(Duration::from_secs(5), async {
        while let Ok(event) = events.recv().await {
            match event {
                Event::ProgressChanged { .. } => saw_progress = true,
                Event::DownloadComplete { id, files } => {
                    finished = Some((id, files));
                    break;
                }
                Event::DownloadFailed { id, error } => {
                    panic!("download {id} failed: {error}");
                }
                _ => {}
            }
        }
    })
    .await;

    let (id, files) = finished.expect("the download should complete");
    assert_eq!(id, DownloadId(1));
    assert_eq!(files.len(), 1);
    assert_eq!(
        files[0],
        temp_dir.path().join("library/Talk (720p).mp4"),
        "the artifact lands in the library directory"
    );
    assert!(files[0].exists());
    assert!(saw_progress, "progress events should stream while downloading");

    let info = downloader.get_download(DownloadId(1)).await.unwrap();
    assert_eq!(info.status, DownloadStatus::Complete);
    assert_eq!(info.percent, 100.0);

    downloader.shutdown().await;
    processor.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_and_restart_finishes_an_interrupted_download() {
    // A stopped run keeps its scratch dir, so the marker written by the
    // first attempt is still there when the restart dispatches the record
    let script = "\
if [ -f \"{work_dir}/attempted\" ]; then \
printf 'media' > \"{work_dir}/Talk (720p).mp4\"; \
else \
touch \"{work_dir}/attempted\"; \
sleep 30; \
fi";
    let source = ScriptedSource::new().with_script(DownloadPass::Video, script);
    let (downloader, _temp_dir) = scripted_downloader(source).await;

    downloader
        .capture("https://media.example.com/watch/talk-42")
        .await
        .unwrap();
    downloader.start();
    let processor = downloader.start_queue_processor();

    // Wait until the first attempt is holding a slot
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if downloader.queue_stats().await.active == 1 {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "download never started");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let mut events = downloader.subscribe();
    downloader.stop();

    // The interrupted record unwinds, requeues, and the queue reports stopped
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    loop {
        match tokio::time::timeout_at(deadline, events.recv()).await {
            Ok(Ok(Event::QueueStopped)) => break,
            Ok(Ok(_)) => continue,
            other => panic!("expected QueueStopped, got {other:?}"),
        }
    }
    let info = downloader.get_download(DownloadId(1)).await.unwrap();
    assert_eq!(info.status, DownloadStatus::Stopped);
    assert_eq!(downloader.queue_stats().await.pending, 1);

    downloader.start();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        match tokio::time::timeout_at(deadline, events.recv()).await {
            Ok(Ok(Event::DownloadComplete { id, .. })) => {
                assert_eq!(id, DownloadId(1));
                break;
            }
            Ok(Ok(_)) => continue,
            other => panic!("restarted download did not complete: {other:?}"),
        }
    }

    downloader.shutdown().await;
    processor.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unconsumable_urls_are_refused_at_capture() {
    let (downloader, _temp_dir) = scripted_downloader(ScriptedSource::new()).await;

    assert!(
        !downloader.capture("ftp://old.example.com/file").await.unwrap(),
        "the source does not consume ftp URLs"
    );
    assert_eq!(downloader.queue_stats().await.pending, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_cancels_a_stuck_download() {
    let source = ScriptedSource::new().with_script(DownloadPass::Video, "sleep 600");
    let (downloader, _temp_dir) = scripted_downloader(source).await;

    downloader
        .capture("https://media.example.com/watch/talk-42")
        .await
        .unwrap();
    downloader.start();
    let processor = downloader.start_queue_processor();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if downloader.queue_stats().await.active == 1 {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "download never started");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    // stop() flips the running intent, so the in-flight run is interrupted
    // well inside the grace period and shutdown returns promptly
    let start = std::time::Instant::now();
    downloader.shutdown().await;
    assert!(
        start.elapsed() < Duration::from_secs(10),
        "shutdown must not wait out a 600s sleep"
    );

    processor.await.unwrap();
}
