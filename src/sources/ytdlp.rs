//! Bundled yt-dlp media source
//!
//! Wraps a yt-dlp binary: resolves it from configuration or PATH,
//! translates quality and pass settings into argument vectors, and runs
//! `--dump-json` metadata queries.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::{PlaylistPolicy, ToolsConfig};
use crate::error::{DownloadError, Result};
use crate::sources::filters::{self, SiteFilter};
use crate::sources::traits::{MediaSource, PassRequest};
use crate::types::{DownloadPass, MediaInfo};

/// Binary name searched on PATH when no explicit path is configured
const YTDLP_BINARY: &str = "yt-dlp";

/// ffmpeg binary name searched on PATH
const FFMPEG_BINARY: &str = "ffmpeg";

/// Subtitle languages: everything except live chat transcripts
const SUB_LANGS: &str = "all,-live_chat";

/// SponsorBlock categories marked as chapters in YouTube downloads
const SPONSORBLOCK_CATEGORIES: &str = "sponsor,intro,outro,selfpromo,interaction,music_offtopic";

/// Extractor tuning for metadata queries; skips the webpage and JS player
/// fetches that dominate query latency
const METADATA_EXTRACTOR_ARGS: &str =
    "youtube:player_skip=webpage,configs,js;player_client=android,web";

/// Media source backed by the yt-dlp command-line tool.
///
/// Construct via [`YtDlpSource::resolve`] to discover binaries from a
/// [`ToolsConfig`], or via [`YtDlpSource::new`] with explicit paths.
pub struct YtDlpSource {
    /// Resolved path to the yt-dlp binary
    executable: PathBuf,
    /// Resolved path to ffmpeg, if available
    ffmpeg: Option<PathBuf>,
    /// Browser whose cookie store is passed via `--cookies-from-browser`
    cookies_from_browser: Option<String>,
}

impl YtDlpSource {
    /// Create a source from explicit binary paths.
    pub fn new(executable: PathBuf, ffmpeg: Option<PathBuf>) -> Self {
        Self {
            executable,
            ffmpeg,
            cookies_from_browser: None,
        }
    }

    /// Attach a browser whose cookie store yt-dlp should read.
    pub fn with_cookies_from_browser(mut self, browser: impl Into<String>) -> Self {
        self.cookies_from_browser = Some(browser.into());
        self
    }

    /// Resolve binaries from tool configuration.
    ///
    /// The yt-dlp binary comes from the explicit configured path, falling
    /// back to PATH discovery when enabled. A missing yt-dlp is an error;
    /// a missing ffmpeg is not, it only drops the `--ffmpeg-location`
    /// argument from generated command lines.
    pub fn resolve(tools: &ToolsConfig) -> Result<Self> {
        let executable = match &tools.ytdlp_path {
            Some(path) => path.clone(),
            None if tools.search_path => which::which(YTDLP_BINARY).map_err(|_| {
                DownloadError::ToolNotFound {
                    name: YTDLP_BINARY.to_string(),
                }
            })?,
            None => {
                return Err(DownloadError::ToolNotFound {
                    name: YTDLP_BINARY.to_string(),
                }
                .into());
            }
        };

        let ffmpeg = tools.ffmpeg_path.clone().or_else(|| {
            if tools.search_path {
                which::which(FFMPEG_BINARY).ok()
            } else {
                None
            }
        });

        debug!(
            executable = %executable.display(),
            ffmpeg = ffmpeg.as_deref().map(Path::display).map(|p| p.to_string()),
            "Resolved yt-dlp source"
        );

        let mut source = Self::new(executable, ffmpeg);

        if let Some(browser) = &tools.cookies_from_browser {
            source = source.with_cookies_from_browser(browser.clone());
        }

        Ok(source)
    }

    /// Arguments shared by every pass: error tolerance, tool locations,
    /// config isolation, site-level flags and cookies.
    fn common_args(&self, request: &PassRequest<'_>) -> Vec<String> {
        let mut args = vec!["-i".to_string()];

        if let Some(ffmpeg) = &self.ffmpeg {
            args.push("--ffmpeg-location".to_string());
            args.push(ffmpeg.display().to_string());
        }

        if !request.config.tools.respect_tool_config {
            args.push("--ignore-config".to_string());
        }

        match request.site {
            SiteFilter::Youtube => {
                // The URL was canonicalized at capture, but a stray list
                // parameter must still not expand into a full playlist
                args.push("--no-playlist".to_string());
            }
            SiteFilter::YoutubePlaylist
                if request.config.capture.playlist_policy == PlaylistPolicy::Playlist =>
            {
                args.push("--yes-playlist".to_string());
            }
            SiteFilter::Facebook => {
                args.extend(args_of(&[
                    "--max-sleep-interval",
                    "30",
                    "--min-sleep-interval",
                    "15",
                ]));
            }
            _ => {}
        }

        if let Some(browser) = &self.cookies_from_browser {
            args.push("--cookies-from-browser".to_string());
            args.push(browser.clone());
        }

        args
    }

    fn video_args(&self, request: &PassRequest<'_>) -> Vec<String> {
        let quality = &request.config.quality;

        let mut args = vec![
            "-f".to_string(),
            quality.format_selector.clone(),
            "--merge-output-format".to_string(),
            quality.video_container.extension().to_string(),
            "-o".to_string(),
            output_template(request.work_dir, video_template(request.site)),
        ];

        match request.site {
            SiteFilter::Youtube | SiteFilter::YoutubePlaylist => {
                args.extend(args_of(&[
                    "--embed-thumbnail",
                    "--embed-metadata",
                    "--embed-subs",
                    "--sub-langs",
                    SUB_LANGS,
                    "--embed-chapters",
                    "--sponsorblock-mark",
                    SPONSORBLOCK_CATEGORIES,
                ]));
            }
            SiteFilter::Twitch => {
                args.extend(args_of(&["--verbose", "--continue", "--hls-prefer-native"]));
            }
            _ => {}
        }

        args
    }

    fn audio_args(&self, request: &PassRequest<'_>, kbps: u32) -> Vec<String> {
        let quality = &request.config.quality;
        let template = format!("%(title)s ({kbps}kbps).%(ext)s");

        vec![
            "-f".to_string(),
            "bestaudio".to_string(),
            "--extract-audio".to_string(),
            "--audio-format".to_string(),
            quality.audio_container.extension().to_string(),
            "--audio-quality".to_string(),
            format!("{kbps}k"),
            "-o".to_string(),
            output_template(request.work_dir, &template),
        ]
    }

    fn subtitle_args(&self, request: &PassRequest<'_>) -> Vec<String> {
        let mut args = vec!["--skip-download".to_string(), "--write-subs".to_string()];

        if request.config.download.download_auto_subtitles {
            args.push("--write-auto-subs".to_string());
        }

        args.extend([
            "--sub-langs".to_string(),
            SUB_LANGS.to_string(),
            "--convert-subs".to_string(),
            request.config.quality.subtitle_container.extension().to_string(),
            "-o".to_string(),
            output_template(request.work_dir, PLAIN_TEMPLATE),
        ]);

        args
    }

    fn thumbnail_args(&self, request: &PassRequest<'_>) -> Vec<String> {
        vec![
            "--skip-download".to_string(),
            "--write-thumbnail".to_string(),
            "--convert-thumbnails".to_string(),
            request.config.quality.thumbnail_container.extension().to_string(),
            "-o".to_string(),
            output_template(request.work_dir, PLAIN_TEMPLATE),
        ]
    }
}

#[async_trait]
impl MediaSource for YtDlpSource {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    fn executable(&self) -> &Path {
        &self.executable
    }

    fn can_consume_url(&self, url: &str) -> bool {
        !filters::is_noise_url(url)
    }

    fn normalize_url(&self, url: &str, policy: PlaylistPolicy) -> String {
        filters::normalize_url(url, policy)
    }

    fn build_args(&self, request: &PassRequest<'_>) -> Vec<String> {
        let pass_args = match request.pass {
            DownloadPass::Video => self.video_args(request),
            DownloadPass::Audio => match request.config.quality.audio_bitrate.kbps() {
                Some(kbps) => self.audio_args(request, kbps),
                // NoAudio leaves the pass with nothing to produce
                None => return Vec::new(),
            },
            DownloadPass::Subtitles => self.subtitle_args(request),
            DownloadPass::Thumbnails => self.thumbnail_args(request),
        };

        let mut args = self.common_args(request);
        args.extend(pass_args);
        // User arguments come after generated ones so they win conflicts
        args.extend(request.config.tools.extra_args.iter().cloned());
        args.push(request.url.to_string());

        args
    }

    async fn fetch_metadata(&self, url: &str) -> Option<MediaInfo> {
        let mut args = args_of(&[
            "--dump-json",
            "--flat-playlist",
            "--extractor-args",
            METADATA_EXTRACTOR_ARGS,
        ]);

        if let Some(browser) = &self.cookies_from_browser {
            args.push("--cookies-from-browser".to_string());
            args.push(browser.clone());
        }

        args.push(url.to_string());

        let output = Command::new(&self.executable)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await;

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                warn!(url = %url, error = %e, "Failed to spawn metadata query");
                return None;
            }
        };

        if !output.status.success() {
            debug!(url = %url, status = %output.status, "Metadata query exited non-zero");
            return None;
        }

        parse_metadata_output(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Output template for passes that keep the plain title as the file name
const PLAIN_TEMPLATE: &str = "%(title)s.%(ext)s";

/// Per-site output template for the video pass.
///
/// Every variant ends in a `)` before the extension; the finalizer relies
/// on that suffix to tell primary outputs from intermediate fragments.
fn video_template(site: SiteFilter) -> &'static str {
    match site {
        SiteFilter::Facebook => "%(title)s (%(upload_date)s %(resolution)s).%(ext)s",
        SiteFilter::Crunchyroll | SiteFilter::Dropout | SiteFilter::Generic => {
            "%(title)s (%(resolution)s).%(ext)s"
        }
        _ => "%(title)s (%(uploader_id)s %(upload_date)s %(resolution)s).%(ext)s",
    }
}

/// Join a yt-dlp output template onto the scratch directory.
fn output_template(work_dir: &Path, template: &str) -> String {
    format!("{}/{}", work_dir.display(), template)
}

fn args_of(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

/// Pull a [`MediaInfo`] out of `--dump-json` output.
///
/// yt-dlp mixes warnings into stdout, so the first line that looks like a
/// JSON document is the metadata.
pub(crate) fn parse_metadata_output(stdout: &str) -> Option<MediaInfo> {
    let line = stdout.lines().find(|line| line.starts_with('{'))?;

    match serde_json::from_str::<MediaInfo>(line) {
        Ok(info) => Some(info),
        Err(e) => {
            warn!(error = %e, "yt-dlp returned malformed metadata JSON");
            None
        }
    }
}
