//! Trait definitions for media sources

use std::path::Path;

use async_trait::async_trait;

use crate::config::{Config, PlaylistPolicy};
use crate::sources::filters::SiteFilter;
use crate::types::{DownloadPass, MediaInfo};

/// Everything a download pass needs to turn into a command line.
///
/// Borrowed views into the orchestrator's state for the duration of one
/// argument-building call.
pub struct PassRequest<'a> {
    /// Which pass is being built (video, audio, subtitles, thumbnails)
    pub pass: DownloadPass,
    /// The normalized URL to download
    pub url: &'a str,
    /// Scratch directory the tool should write into
    pub work_dir: &'a Path,
    /// Effective configuration for this download
    pub config: &'a Config,
    /// Site classification of the URL
    pub site: SiteFilter,
}

/// Trait for media source implementations
///
/// A media source wraps one external download tool: it decides which URLs
/// the tool can consume, canonicalizes them, translates configuration into
/// per-pass argument vectors, and optionally resolves metadata up front.
///
/// Implementations must be `Send + Sync` as they are shared across the
/// queue processor and per-download tasks.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Get the name of this source (for logging)
    fn name(&self) -> &'static str;

    /// Path to the executable this source spawns
    fn executable(&self) -> &Path;

    /// Check whether this source is willing to handle the given URL.
    ///
    /// Returning false rejects the URL at capture time before any
    /// process is spawned.
    fn can_consume_url(&self, url: &str) -> bool;

    /// Canonicalize a URL for deduplication and download.
    ///
    /// Must be idempotent: normalizing an already-normalized URL returns
    /// it unchanged.
    fn normalize_url(&self, url: &str, policy: PlaylistPolicy) -> String;

    /// Build the argument vector for one download pass.
    ///
    /// An empty vector means the pass is not applicable under the given
    /// configuration and must be skipped without spawning anything.
    fn build_args(&self, request: &PassRequest<'_>) -> Vec<String>;

    /// Query metadata for a URL without downloading.
    ///
    /// Best effort: `None` on any failure. Metadata is cosmetic and a
    /// failure here must never fail the download itself.
    async fn fetch_metadata(&self, url: &str) -> Option<MediaInfo>;
}
