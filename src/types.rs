//! Core types for media-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Unique identifier for a download
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DownloadId(pub i64);

impl DownloadId {
    /// Create a new DownloadId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for DownloadId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<DownloadId> for i64 {
    fn from(id: DownloadId) -> Self {
        id.0
    }
}

impl PartialEq<i64> for DownloadId {
    fn eq(&self, other: &i64) -> bool {
        self.0 == *other
    }
}

impl PartialEq<DownloadId> for i64 {
    fn eq(&self, other: &DownloadId) -> bool {
        *self == other.0
    }
}

impl std::fmt::Display for DownloadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for DownloadId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Download status
///
/// The lifecycle of a captured URL. Transitions are validated by
/// [`DownloadStatus::can_transition_to`]; a record only ever moves along
/// the edges of that graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    /// Metadata query in flight; not yet dispatchable
    Querying,
    /// Waiting in the pending queue
    Queued,
    /// Dispatched to a worker, no tool output seen yet
    Starting,
    /// Tool output seen, transfer not started
    Preparing,
    /// Transfer in progress
    Downloading,
    /// Tool is muxing/converting/post-processing
    Processing,
    /// All enabled passes succeeded and files were finalized
    Complete,
    /// A primary pass or an internal error failed the job
    Failed,
    /// Interrupted by a graceful stop; requeued, never terminal
    Stopped,
}

impl DownloadStatus {
    /// Whether this state has running work behind it
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            DownloadStatus::Starting
                | DownloadStatus::Preparing
                | DownloadStatus::Downloading
                | DownloadStatus::Processing
        )
    }

    /// Whether this state ends the lifecycle (absent explicit retry)
    pub fn is_terminal(&self) -> bool {
        matches!(self, DownloadStatus::Complete | DownloadStatus::Failed)
    }

    /// Pure transition check for the status graph
    ///
    /// A repeat of the current state is always allowed (message/percent
    /// refresh); everything else must follow an edge:
    ///
    /// ```text
    /// Querying → Queued → Starting → {Preparing ⇄ Downloading → Processing}
    ///     running states → Stopped | Failed | Complete
    ///     Processing → Downloading      (multi-fragment downloads)
    ///     Stopped → Queued | Starting   (requeue, then redispatch)
    ///     Failed → Queued               (explicit retry only)
    /// ```
    pub fn can_transition_to(self, next: DownloadStatus) -> bool {
        use DownloadStatus::*;

        if self == next {
            return true;
        }

        match (self, next) {
            (Querying, Queued) => true,
            (Queued, Starting) => true,
            (Starting, Preparing | Downloading | Processing) => true,
            (Preparing, Downloading | Processing) => true,
            (Downloading, Preparing | Processing) => true,
            (Processing, Downloading) => true,
            (Starting | Preparing | Downloading | Processing, Stopped | Failed | Complete) => true,
            (Stopped, Queued | Starting) => true,
            (Failed, Queued) => true,
            _ => false,
        }
    }

    /// Stable lowercase name, matching the serde representation
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadStatus::Querying => "querying",
            DownloadStatus::Queued => "queued",
            DownloadStatus::Starting => "starting",
            DownloadStatus::Preparing => "preparing",
            DownloadStatus::Downloading => "downloading",
            DownloadStatus::Processing => "processing",
            DownloadStatus::Complete => "complete",
            DownloadStatus::Failed => "failed",
            DownloadStatus::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One pass of the multi-pass download pipeline
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadPass {
    /// Main video download (primary)
    Video,
    /// Audio extraction (primary)
    Audio,
    /// Subtitle files (secondary)
    Subtitles,
    /// Thumbnail images (secondary)
    Thumbnails,
}

impl DownloadPass {
    /// Pipeline execution order: primaries first, then secondaries
    pub const ORDER: [DownloadPass; 4] = [
        DownloadPass::Video,
        DownloadPass::Audio,
        DownloadPass::Subtitles,
        DownloadPass::Thumbnails,
    ];

    /// Primary passes fail the whole job; secondary failures only warn
    pub fn is_primary(&self) -> bool {
        matches!(self, DownloadPass::Video | DownloadPass::Audio)
    }

    /// Stable lowercase name, matching the serde representation
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadPass::Video => "video",
            DownloadPass::Audio => "audio",
            DownloadPass::Subtitles => "subtitles",
            DownloadPass::Thumbnails => "thumbnails",
        }
    }
}

impl std::fmt::Display for DownloadPass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Media metadata as reported by the tool's JSON dump
///
/// Every field is optional in practice; the tool emits wildly different
/// shapes per site, so unknown fields are ignored and missing fields
/// default. Strictly display-only: nothing here influences the pipeline.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaInfo {
    /// Site-specific media identifier
    pub id: String,

    /// Media title
    pub title: String,

    /// Thumbnail URL
    pub thumbnail: String,

    /// Media description
    pub description: String,

    /// Channel/uploader identifier
    pub channel_id: String,

    /// Channel/uploader URL
    pub channel_url: String,

    /// Duration in seconds
    pub duration: f64,

    /// View count (0 when the site does not report one)
    pub view_count: i64,

    /// Upload date in `YYYYMMDD` form
    pub upload_date: String,

    /// Uploader display name
    pub uploader: String,

    /// Video width in pixels
    pub width: u32,

    /// Video height in pixels
    pub height: u32,

    /// Resolution label (e.g. `1920x1080`)
    pub resolution: String,

    /// Frames per second
    pub fps: f64,
}

impl MediaInfo {
    /// Best human-readable label for this media
    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            &self.id
        } else {
            &self.title
        }
    }
}

/// Category of a finished (or aborted) per-job pipeline run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadOutcome {
    /// Every enabled pass that was attempted succeeded
    Success,
    /// The tool reported the URL as unsupported, or no pass produced output
    Unsupported,
    /// A primary (video/audio) pass exited non-zero
    MainCategoryFailed,
    /// No primary pass is enabled; nothing was spawned
    NoApplicableMethod,
    /// Interrupted by a scheduler stop or a job cancel
    Stopped,
}

/// Outcome of one per-job pipeline run, with the diagnostic line if any
#[derive(Clone, Debug, PartialEq)]
pub struct DownloadResult {
    /// What happened
    pub outcome: DownloadOutcome,

    /// Last non-empty tool output line, when one was captured
    pub diagnostic: Option<String>,
}

impl DownloadResult {
    /// Build a result with a diagnostic line
    pub fn new(outcome: DownloadOutcome, diagnostic: impl Into<String>) -> Self {
        Self {
            outcome,
            diagnostic: Some(diagnostic.into()),
        }
    }

    /// Build a result without a diagnostic
    pub fn bare(outcome: DownloadOutcome) -> Self {
        Self {
            outcome,
            diagnostic: None,
        }
    }

    /// Whether the run finished with every attempted pass succeeding
    pub fn is_success(&self) -> bool {
        self.outcome == DownloadOutcome::Success
    }
}

/// Event emitted on the listener bus during the download lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// URL captured and queued
    Captured {
        /// Download ID
        id: DownloadId,
        /// Filtered URL that will be fetched
        url: String,
    },

    /// Async metadata query resolved
    MetadataResolved {
        /// Download ID
        id: DownloadId,
        /// Media title (empty when the site reported none)
        title: String,
    },

    /// Status state machine took an edge
    StatusChanged {
        /// Download ID
        id: DownloadId,
        /// New status
        status: DownloadStatus,
        /// Displayed message
        message: String,
    },

    /// Percent or message refresh without a state change
    ProgressChanged {
        /// Download ID
        id: DownloadId,
        /// Progress percentage (0.0 to 100.0)
        percent: f64,
        /// Displayed message
        message: String,
    },

    /// Job completed and files were finalized
    DownloadComplete {
        /// Download ID
        id: DownloadId,
        /// Finalized file paths in the destination directory
        files: Vec<PathBuf>,
    },

    /// Job failed
    DownloadFailed {
        /// Download ID
        id: DownloadId,
        /// Diagnostic (last tool output line or error text)
        error: String,
    },

    /// A secondary pass failed; the job continues
    SecondaryPassWarning {
        /// Download ID
        id: DownloadId,
        /// Which pass failed
        pass: DownloadPass,
        /// Diagnostic line
        error: String,
    },

    /// Queue processing started
    QueueStarted,

    /// Queue processing fully stopped (no jobs left in flight)
    QueueStopped,

    /// Non-running records cleared from the queue
    Cleared {
        /// Number of records removed
        removed: usize,
    },

    /// A single record was closed and removed
    Removed {
        /// Download ID
        id: DownloadId,
    },

    /// Destination volume is below the configured free-space threshold
    LowDiskSpace {
        /// Free bytes on the destination volume
        available_bytes: u64,
        /// Configured minimum
        required_bytes: u64,
    },

    /// Graceful shutdown initiated
    Shutdown,
}

/// Read-only snapshot of one download record
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadInfo {
    /// Unique download identifier
    pub id: DownloadId,

    /// URL exactly as captured
    pub url: String,

    /// Filtered/normalized URL used for fetching
    pub filtered_url: String,

    /// Current status
    pub status: DownloadStatus,

    /// Last displayed message
    pub message: String,

    /// Progress percentage (0.0 to 100.0)
    pub percent: f64,

    /// Resolved media metadata, when the query has completed
    pub media: Option<MediaInfo>,

    /// Finalized file paths (non-empty only after completion)
    pub files: Vec<PathBuf>,

    /// When the URL was captured
    pub created_at: DateTime<Utc>,
}

/// Queue statistics
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueStats {
    /// Records waiting in the pending queue
    pub pending: usize,

    /// Records currently running
    pub active: usize,

    /// Completed records
    pub completed: usize,

    /// Failed records
    pub failed: usize,

    /// Distinct URLs held in the dedup set
    pub captured_urls: usize,

    /// Whether the queue processor is dispatching
    pub running: bool,

    /// Current concurrency limit
    pub concurrent_limit: usize,
}
