//! Error types for media-dl
//!
//! This module provides error handling for the library, including:
//! - Domain-specific error types (Download, Finalize)
//! - Context information (download ID, file path, tool name)
//!
//! Failures that the pipeline tolerates by design (secondary-pass errors,
//! finalization placement failures) are logged and surfaced as events
//! rather than ending the job; only failures that end an operation
//! escalate through [`Result`].

use std::path::PathBuf;
use thiserror::Error;

use crate::types::DownloadId;

/// Result type alias for media-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for media-dl
///
/// This is the primary error type used throughout the library. Each variant
/// includes contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Download-related error
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// Finalization error (copying artifacts out of the scratch dir)
    #[error("finalization error: {0}")]
    Finalize(#[from] FinalizeError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Download-related errors
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Download not found in any queue collection
    #[error("download {id} not found")]
    NotFound {
        /// The download ID that was not found
        id: DownloadId,
    },

    /// External download tool could not be located
    #[error("download tool not found: {name}")]
    ToolNotFound {
        /// Binary name or configured path that failed to resolve
        name: String,
    },

    /// External download tool failed to spawn
    #[error("failed to spawn {program}: {source}")]
    SpawnFailed {
        /// The program that failed to start
        program: PathBuf,
        /// The underlying I/O error
        source: std::io::Error,
    },
}

/// Finalization errors (moving artifacts from scratch to destination)
#[derive(Debug, Error)]
pub enum FinalizeError {
    /// Walking the scratch directory failed
    #[error("failed to list files for download {id} under {path}: {reason}")]
    WalkFailed {
        /// The download ID being finalized
        id: DownloadId,
        /// The scratch directory that could not be read
        path: PathBuf,
        /// The reason the walk failed
        reason: String,
    },

    /// A single artifact copy failed
    #[error("failed to copy {source_path} to {dest_path}: {reason}")]
    CopyFailed {
        /// The source path of the file being copied
        source_path: PathBuf,
        /// The destination path where the file should land
        dest_path: PathBuf,
        /// The reason the copy failed
        reason: String,
    },
}
