//! Shared test helpers for creating MediaDownloader instances in tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::tempdir;

use crate::config::{Config, PlaylistPolicy};
use crate::downloader::MediaDownloader;
use crate::sources::{MediaSource, PassRequest};
use crate::types::{DownloadPass, MediaInfo};

/// Scripted stand-in for the external tool, backed by `/bin/sh`.
///
/// Each pass maps to one shell script; `{work_dir}` and `{url}`
/// placeholders are substituted when arguments are built. A pass without
/// a script builds no arguments and is skipped by the pipeline, like a
/// real source with nothing to do for that pass.
pub(crate) struct MockSource {
    scripts: HashMap<DownloadPass, String>,
    metadata: Option<MediaInfo>,
    invocations: Arc<std::sync::Mutex<Vec<DownloadPass>>>,
}

impl MockSource {
    pub(crate) fn new() -> Self {
        Self {
            scripts: HashMap::new(),
            metadata: None,
            invocations: Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    /// Script to run for `pass`. `{work_dir}` and `{url}` are substituted.
    pub(crate) fn with_script(mut self, pass: DownloadPass, script: &str) -> Self {
        self.scripts.insert(pass, script.to_string());
        self
    }

    /// Metadata returned by every [`MediaSource::fetch_metadata`] call.
    pub(crate) fn with_metadata(mut self, info: MediaInfo) -> Self {
        self.metadata = Some(info);
        self
    }

    /// Handle for observing invocations after the source moves into the
    /// downloader.
    pub(crate) fn invocation_log(&self) -> Arc<std::sync::Mutex<Vec<DownloadPass>>> {
        Arc::clone(&self.invocations)
    }
}

#[async_trait]
impl MediaSource for MockSource {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn executable(&self) -> &Path {
        Path::new("/bin/sh")
    }

    fn can_consume_url(&self, url: &str) -> bool {
        url.starts_with("http")
    }

    fn normalize_url(&self, url: &str, policy: PlaylistPolicy) -> String {
        crate::sources::normalize_url(url, policy)
    }

    fn build_args(&self, request: &PassRequest<'_>) -> Vec<String> {
        let Some(script) = self.scripts.get(&request.pass) else {
            return Vec::new();
        };

        self.invocations.lock().unwrap().push(request.pass);

        let script = script
            .replace("{work_dir}", &request.work_dir.display().to_string())
            .replace("{url}", request.url);
        vec!["-c".to_string(), script]
    }

    async fn fetch_metadata(&self, _url: &str) -> Option<MediaInfo> {
        self.metadata.clone()
    }
}

/// Helper to create a test MediaDownloader instance with a scripted source.
/// Returns the downloader and the tempdir (which must be kept alive).
///
/// Metadata querying is disabled so captured records are immediately
/// dispatchable; tests that exercise the querying state re-enable it via
/// the `configure` variant.
pub(crate) async fn create_test_downloader(
    source: MockSource,
) -> (MediaDownloader, tempfile::TempDir) {
    create_test_downloader_with(source, |_| {}).await
}

/// Like [`create_test_downloader`], with a configuration hook applied
/// before construction.
pub(crate) async fn create_test_downloader_with(
    source: MockSource,
    configure: impl FnOnce(&mut Config),
) -> (MediaDownloader, tempfile::TempDir) {
    let temp_dir = tempdir().unwrap();

    let mut config = Config::default();
    config.download.download_dir = temp_dir.path().join("downloads");
    config.download.temp_dir = temp_dir.path().join("temp");
    config.download.max_concurrent_downloads = 3;
    config.capture.query_metadata = false;
    configure(&mut config);

    let downloader = MediaDownloader::with_source(config, Arc::new(source))
        .await
        .unwrap();

    (downloader, temp_dir)
}

/// Poll `predicate` until it holds or the timeout elapses.
///
/// The queue processor and worker tasks run on their own schedule; tests
/// wait for observable state instead of sleeping fixed amounts.
pub(crate) async fn wait_until<F, Fut>(timeout: std::time::Duration, mut predicate: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if predicate().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
}
