//! # media-dl
//!
//! Backend library for media download applications. URLs are captured
//! into a queue and driven through an external downloader tool (yt-dlp
//! by default): per-site argument construction, separate passes for
//! video, audio, subtitles and thumbnails, live progress parsing, and
//! artifact finalization into the library directory.
//!
//! ## Design Philosophy
//!
//! media-dl is designed to be:
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to events, no polling required
//! - **Sensible defaults** - Works out of the box with zero configuration
//! - **Tool-agnostic** - Any yt-dlp compatible tool fits behind the
//!   [`sources::MediaSource`] trait
//!
//! ## Quick Start
//!
//! ```no_run
//! use media_dl::{Config, MediaDownloader};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.download.download_dir = "/media/library".into();
//!
//!     let downloader = MediaDownloader::new(config).await?;
//!     let _processor = downloader.start_queue_processor();
//!
//!     // Subscribe to events
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {event:?}");
//!         }
//!     });
//!
//!     downloader
//!         .capture("https://www.youtube.com/watch?v=dQw4w9WgXcQ")
//!         .await?;
//!     downloader.start();
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Core downloader implementation (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// Download tool integration and per-site URL handling
pub mod sources;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

mod process;
mod progress;

// Re-export commonly used types
pub use config::{Config, PlaylistPolicy};
pub use downloader::MediaDownloader;
pub use error::{DownloadError, Error, FinalizeError, Result};
pub use sources::{MediaSource, PassRequest, SiteFilter, YtDlpSource};
pub use types::{
    DownloadId, DownloadInfo, DownloadPass, DownloadStatus, Event, MediaInfo, QueueStats,
};

/// Helper function to run the downloader with graceful signal handling.
///
/// Waits for a termination signal and then calls the downloader's
/// [`shutdown`](MediaDownloader::shutdown) method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use media_dl::{Config, MediaDownloader, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let downloader = MediaDownloader::new(Config::default()).await?;
///     let processor = downloader.start_queue_processor();
///     downloader.start();
///
///     // Blocks until SIGTERM/SIGINT, then drains and shuts down
///     run_with_shutdown(downloader).await;
///     processor.await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(downloader: MediaDownloader) {
    wait_for_signal().await;
    downloader.shutdown().await;
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Signal registration can fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT (Ctrl+C)");
                }
            }
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            sigint.recv().await;
            tracing::info!("Received SIGINT (Ctrl+C)");
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("Received SIGTERM");
        }
        (Err(_), Err(e)) => {
            tracing::error!(error = %e, "Could not register signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
    }
}
