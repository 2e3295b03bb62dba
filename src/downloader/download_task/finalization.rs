//! Download finalization — walk the scratch directory and place artifacts.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use crate::config::Config;
use crate::downloader::QueueEntry;
use crate::error::{FinalizeError, Result};

/// Copy recognized artifacts from the record's scratch directory into the
/// destination, preserving relative structure.
///
/// Individual copy failures do not stop the walk; the remaining artifacts
/// are still placed. Any failure leaves the scratch directory behind and
/// fails the call with the first failure's detail. Only a fully placed
/// run deletes its scratch directory.
pub(super) async fn finalize_download(entry: &QueueEntry, config: &Config) -> Result<Vec<PathBuf>> {
    let id = entry.id;

    let Some(work_dir) = entry.work_dir() else {
        return Ok(Vec::new());
    };

    let files =
        collect_files(work_dir.clone())
            .await
            .map_err(|e| FinalizeError::WalkFailed {
                id,
                path: work_dir.clone(),
                reason: e.to_string(),
            })?;

    let mut finalized = Vec::new();
    let mut failed_count = 0usize;
    let mut first_failure: Option<FinalizeError> = None;

    for path in files {
        let Some(name) = path.file_name() else {
            continue;
        };
        let name = name.to_string_lossy().to_lowercase();
        if !is_wanted_artifact(&name, config) {
            continue;
        }

        let relative = path.strip_prefix(&work_dir).unwrap_or(&path);
        let target = config.download_dir().join(relative);

        match place_artifact(&path, &target).await {
            Ok(()) => {
                tracing::debug!(
                    download_id = id.0,
                    source = %path.display(),
                    target = %target.display(),
                    "Placed artifact"
                );
                entry.push_final_file(target.clone());
                finalized.push(target);
            }
            Err(e) => {
                tracing::error!(
                    download_id = id.0,
                    source = %path.display(),
                    target = %target.display(),
                    error = %e,
                    "Failed to place artifact"
                );
                failed_count += 1;
                if first_failure.is_none() {
                    first_failure = Some(FinalizeError::CopyFailed {
                        source_path: path.clone(),
                        dest_path: target,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    if let Some(failure) = first_failure {
        tracing::warn!(
            download_id = id.0,
            failed_count,
            placed = finalized.len(),
            "Finalization incomplete, keeping the scratch directory"
        );
        return Err(failure.into());
    }

    // Every artifact landed; the scratch directory is done
    if let Some(dir) = entry.take_work_dir() {
        if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
            tracing::warn!(
                download_id = id.0,
                error = %e,
                path = %dir.display(),
                "Failed to remove scratch directory"
            );
        }
    }

    Ok(finalized)
}

/// Discard the record's scratch directory, if it still has one.
///
/// Used when a run is stopped or cancelled and when records leave the
/// queue. A missing directory is not an error; it may never have been
/// created.
pub(crate) async fn remove_scratch_dir(entry: &QueueEntry) {
    let Some(dir) = entry.take_work_dir() else {
        return;
    };

    match tokio::fs::remove_dir_all(&dir).await {
        Ok(()) => {
            tracing::debug!(
                download_id = entry.id.0,
                path = %dir.display(),
                "Removed scratch directory"
            );
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(
                download_id = entry.id.0,
                error = %e,
                path = %dir.display(),
                "Failed to remove scratch directory"
            );
        }
    }
}

/// Recursively list every file under `dir`.
fn collect_files(
    dir: PathBuf,
) -> Pin<Box<dyn Future<Output = std::io::Result<Vec<PathBuf>>> + Send>> {
    Box::pin(async move {
        let mut files = Vec::new();
        let mut read_dir = tokio::fs::read_dir(&dir).await?;

        while let Some(dir_entry) = read_dir.next_entry().await? {
            let path = dir_entry.path();
            if dir_entry.file_type().await?.is_dir() {
                files.extend(collect_files(path).await?);
            } else {
                files.push(path);
            }
        }

        Ok(files)
    })
}

/// Whether a lowercased file name is an artifact the configuration wants.
///
/// Media output templates end in `(...)` before the extension, so the
/// `).` requirement keeps plain-named subtitle and thumbnail files out of
/// the media rules. Subtitles and thumbnails are recognized only while
/// their passes are enabled. Anything else the tool drops in the scratch
/// dir (partial fragments, description files) never matches.
pub(super) fn is_wanted_artifact(name: &str, config: &Config) -> bool {
    if name.ends_with(&format!(").{}", config.quality.audio_container.extension())) {
        return true;
    }
    if name.ends_with(&format!(").{}", config.quality.video_container.extension())) {
        return true;
    }
    if config.download.download_subtitles
        && name.ends_with(&format!(".{}", config.quality.subtitle_container.extension()))
    {
        return true;
    }
    if config.download.download_thumbnails
        && name.ends_with(&format!(".{}", config.quality.thumbnail_container.extension()))
    {
        return true;
    }
    false
}

/// Copy one artifact into place, creating parent directories as needed.
/// Existing files at the target are replaced.
async fn place_artifact(source: &Path, target: &Path) -> std::io::Result<()> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::copy(source, target).await?;
    Ok(())
}
