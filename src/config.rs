//! Configuration types for media-dl

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Download behavior configuration (directories, concurrency, pass toggles)
///
/// Groups settings related to how downloads are fetched and stored.
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Final download directory (default: "./downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Scratch directory root; per-job work dirs live under it (default: "./temp")
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Maximum concurrent downloads (default: 3)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_downloads: usize,

    /// Run the video pass (default: true)
    #[serde(default = "default_true")]
    pub download_video: bool,

    /// Run the audio extraction pass (default: true)
    #[serde(default = "default_true")]
    pub download_audio: bool,

    /// Run the subtitle pass (default: false)
    #[serde(default)]
    pub download_subtitles: bool,

    /// Include auto-generated subtitles in the subtitle pass (default: false)
    #[serde(default)]
    pub download_auto_subtitles: bool,

    /// Run the thumbnail pass (default: false)
    #[serde(default)]
    pub download_thumbnails: bool,

    /// Sleep a random 1-5s before each tool invocation (default: false)
    ///
    /// Spreads out requests against rate-limited sites.
    #[serde(default)]
    pub random_intervals: bool,

    /// Minimum free space on the destination volume in MB; 0 disables the
    /// check (default: 0)
    ///
    /// While the volume is below this threshold the queue processor holds
    /// dispatch and emits [`Event::LowDiskSpace`](crate::types::Event).
    #[serde(default)]
    pub min_free_space_mb: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            temp_dir: default_temp_dir(),
            max_concurrent_downloads: default_max_concurrent(),
            download_video: true,
            download_audio: true,
            download_subtitles: false,
            download_auto_subtitles: false,
            download_thumbnails: false,
            random_intervals: false,
            min_free_space_mb: 0,
        }
    }
}

/// External tool configuration (yt-dlp, ffmpeg) and tool-level options
///
/// Groups settings for the download tool binaries and the arguments that
/// apply to every invocation. Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Path to the yt-dlp executable (auto-detected on PATH if None)
    #[serde(default)]
    pub ytdlp_path: Option<PathBuf>,

    /// Path to the ffmpeg executable (auto-detected on PATH if None;
    /// missing ffmpeg only drops the `--ffmpeg-location` argument)
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Whether to search PATH for binaries if explicit paths not set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Honor the user's own yt-dlp config file instead of passing
    /// `--ignore-config` (default: false)
    #[serde(default)]
    pub respect_tool_config: bool,

    /// Extra arguments appended to every download invocation, after all
    /// generated arguments so they win conflicts (default: empty)
    #[serde(default)]
    pub extra_args: Vec<String>,

    /// Browser whose cookie store the tool should read, e.g. "firefox"
    ///
    /// Resolved by the embedding application at startup and injected here;
    /// the library performs no browser detection of its own. None disables
    /// `--cookies-from-browser`.
    #[serde(default)]
    pub cookies_from_browser: Option<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: None,
            ffmpeg_path: None,
            search_path: true,
            respect_tool_config: false,
            extra_args: Vec::new(),
            cookies_from_browser: None,
        }
    }
}

/// Quality and container configuration
///
/// Controls the format selector and which container extensions the
/// finalizer recognizes. Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QualityConfig {
    /// yt-dlp format selector for the video pass
    /// (default: "bestvideo*+bestaudio/best")
    #[serde(default = "default_format_selector")]
    pub format_selector: String,

    /// Video container to merge into (default: mp4)
    #[serde(default)]
    pub video_container: VideoContainer,

    /// Audio container for the extraction pass (default: mp3)
    #[serde(default)]
    pub audio_container: AudioContainer,

    /// Audio bitrate for the extraction pass (default: 320 kbps)
    ///
    /// `NoAudio` disables the audio pass entirely; audio-only setups with
    /// `NoAudio` have no applicable download method.
    #[serde(default)]
    pub audio_bitrate: AudioBitrate,

    /// Subtitle container (default: srt)
    #[serde(default)]
    pub subtitle_container: SubtitleContainer,

    /// Thumbnail container (default: png)
    #[serde(default)]
    pub thumbnail_container: ThumbnailContainer,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            format_selector: default_format_selector(),
            video_container: VideoContainer::default(),
            audio_container: AudioContainer::default(),
            audio_bitrate: AudioBitrate::default(),
            subtitle_container: SubtitleContainer::default(),
            thumbnail_container: ThumbnailContainer::default(),
        }
    }
}

/// URL capture configuration
///
/// Controls which URLs are accepted and how they are normalized.
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Accept URLs no site filter matches, via the catch-all filter
    /// (default: false)
    #[serde(default)]
    pub capture_any_links: bool,

    /// What to do with playlist-flavored URLs (default: single)
    #[serde(default)]
    pub playlist_policy: PlaylistPolicy,

    /// Query media metadata asynchronously after capture (default: true)
    ///
    /// When disabled, captured records skip the querying state and enter
    /// the queue as immediately dispatchable.
    #[serde(default = "default_true")]
    pub query_metadata: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            capture_any_links: false,
            playlist_policy: PlaylistPolicy::default(),
            query_metadata: true,
        }
    }
}

/// Main configuration for MediaDownloader
///
/// Fields are organized into logical sub-configs:
/// - [`download`](DownloadConfig) — directories, concurrency, pass toggles
/// - [`tools`](ToolsConfig) — tool paths and tool-level options
/// - [`quality`](QualityConfig) — format selector and containers
/// - [`capture`](CaptureConfig) — URL acceptance and normalization
///
/// All sub-config fields are flattened for flat serialization, so the
/// JSON/TOML format carries no nesting. Common fields are also reachable
/// through accessor methods on `Config` for convenience.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Download behavior settings
    #[serde(flatten)]
    pub download: DownloadConfig,

    /// External tool settings
    #[serde(flatten)]
    pub tools: ToolsConfig,

    /// Quality and container settings
    #[serde(flatten)]
    pub quality: QualityConfig,

    /// URL capture settings
    #[serde(flatten)]
    pub capture: CaptureConfig,
}

// Convenience accessors — allow call sites to use `config.download_dir()`
// etc. without reaching through the sub-config structs.
impl Config {
    /// Final download directory
    pub fn download_dir(&self) -> &PathBuf {
        &self.download.download_dir
    }

    /// Scratch directory root
    pub fn temp_dir(&self) -> &PathBuf {
        &self.download.temp_dir
    }

    /// Maximum concurrent downloads
    pub fn max_concurrent_downloads(&self) -> usize {
        self.download.max_concurrent_downloads
    }

    /// Whether the given primary/secondary pass toggles leave any primary
    /// download method enabled
    pub fn has_applicable_method(&self) -> bool {
        if !self.download.download_video && !self.download.download_audio {
            return false;
        }
        // Audio-only with the bitrate set to NoAudio cannot produce output
        if !self.download.download_video
            && self.download.download_audio
            && self.quality.audio_bitrate == AudioBitrate::NoAudio
        {
            return false;
        }
        true
    }
}

/// Video container for merged output
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoContainer {
    /// MP4 (default)
    #[default]
    Mp4,
    /// WebM
    Webm,
    /// Matroska
    Mkv,
}

impl VideoContainer {
    /// File extension without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            VideoContainer::Mp4 => "mp4",
            VideoContainer::Webm => "webm",
            VideoContainer::Mkv => "mkv",
        }
    }
}

/// Audio container for the extraction pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioContainer {
    /// MP3 (default)
    #[default]
    Mp3,
    /// M4A/AAC
    M4a,
    /// Opus
    Opus,
    /// FLAC
    Flac,
    /// WAV
    Wav,
}

impl AudioContainer {
    /// File extension without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            AudioContainer::Mp3 => "mp3",
            AudioContainer::M4a => "m4a",
            AudioContainer::Opus => "opus",
            AudioContainer::Flac => "flac",
            AudioContainer::Wav => "wav",
        }
    }
}

/// Audio bitrate for the extraction pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioBitrate {
    /// Audio downloads disabled at the quality level
    NoAudio,
    /// 128 kbps
    Kbps128,
    /// 192 kbps
    Kbps192,
    /// 256 kbps
    Kbps256,
    /// 320 kbps (default)
    #[default]
    Kbps320,
}

impl AudioBitrate {
    /// Numeric bitrate, None for [`AudioBitrate::NoAudio`]
    pub fn kbps(&self) -> Option<u32> {
        match self {
            AudioBitrate::NoAudio => None,
            AudioBitrate::Kbps128 => Some(128),
            AudioBitrate::Kbps192 => Some(192),
            AudioBitrate::Kbps256 => Some(256),
            AudioBitrate::Kbps320 => Some(320),
        }
    }
}

/// Subtitle container
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtitleContainer {
    /// SubRip (default)
    #[default]
    Srt,
    /// WebVTT
    Vtt,
    /// Advanced SubStation Alpha
    Ass,
}

impl SubtitleContainer {
    /// File extension without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            SubtitleContainer::Srt => "srt",
            SubtitleContainer::Vtt => "vtt",
            SubtitleContainer::Ass => "ass",
        }
    }
}

/// Thumbnail container
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThumbnailContainer {
    /// PNG (default)
    #[default]
    Png,
    /// JPEG
    Jpg,
    /// WebP
    Webp,
}

impl ThumbnailContainer {
    /// File extension without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            ThumbnailContainer::Png => "png",
            ThumbnailContainer::Jpg => "jpg",
            ThumbnailContainer::Webp => "webp",
        }
    }
}

/// Playlist handling policy for captured URLs
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaylistPolicy {
    /// Strip playlist context and fetch the single item (default)
    #[default]
    Single,
    /// Keep the URL as captured and fetch the whole playlist
    Playlist,
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("./temp")
}

fn default_max_concurrent() -> usize {
    3
}

fn default_true() -> bool {
    true
}

fn default_format_selector() -> String {
    "bestvideo*+bestaudio/best".to_string()
}
