//! Media source handling
//!
//! This module provides a trait-based architecture for the capability
//! collaborator that sits between the queue orchestrator and the external
//! download tool: recognizing URLs, normalizing them for dedup, building
//! per-pass command lines, and querying media metadata.
//!
//! ## Architecture
//!
//! The core abstraction is the [`MediaSource`] trait. One implementation
//! is bundled:
//!
//! - [`YtDlpSource`]: drives a yt-dlp binary discovered from configuration
//!   or PATH
//!
//! Embedders can substitute their own implementation (other tools, test
//! doubles) via [`MediaDownloader::with_source`](crate::MediaDownloader::with_source).
//!
//! ## Usage
//!
//! ```no_run
//! use media_dl::config::ToolsConfig;
//! use media_dl::sources::{MediaSource, YtDlpSource};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Resolve yt-dlp from an explicit path or PATH
//! let source = YtDlpSource::resolve(&ToolsConfig::default())?;
//!
//! assert!(source.can_consume_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ"));
//! assert!(!source.can_consume_url("https://i.ytimg.com/vi/x/hq720.jpg"));
//! # Ok(())
//! # }
//! ```

mod filters;
mod traits;
mod ytdlp;

pub use filters::SiteFilter;
pub use traits::{MediaSource, PassRequest};
pub use ytdlp::YtDlpSource;

pub(crate) use filters::is_youtube_channel;
// Consumed only by the in-crate test double
#[cfg(test)]
pub(crate) use filters::normalize_url;
