//! Tests against a real yt-dlp binary
//!
//! Disabled by default: they need yt-dlp on PATH and, for the metadata
//! test, network access to YouTube.
//!
//! # Running the tests
//!
//! ```bash
//! cargo test --features tool-tests --test live_ytdlp
//! ```

#![cfg(feature = "tool-tests")]

use media_dl::config::ToolsConfig;
use media_dl::{MediaSource, YtDlpSource};

fn ytdlp_available() -> bool {
    which::which("yt-dlp").is_ok()
}

#[test]
fn resolves_ytdlp_from_path() {
    if !ytdlp_available() {
        eprintln!("skipping: yt-dlp not on PATH");
        return;
    }

    let source = YtDlpSource::resolve(&ToolsConfig::default()).unwrap();
    assert!(source.executable().exists());
    assert_eq!(source.name(), "yt-dlp");
}

#[tokio::test]
async fn fetches_metadata_for_a_known_video() {
    if !ytdlp_available() {
        eprintln!("skipping: yt-dlp not on PATH");
        return;
    }

    let source = YtDlpSource::resolve(&ToolsConfig::default()).unwrap();

    // "Me at the zoo", the oldest video on the site; its metadata has been
    // stable for two decades
    let info = source
        .fetch_metadata("https://www.youtube.com/watch?v=jNQXAC9IVRw")
        .await;

    match info {
        Some(info) => {
            assert_eq!(info.id, "jNQXAC9IVRw");
            assert!(!info.title.is_empty());
            assert!(info.duration > 0.0);
        }
        None => eprintln!("skipping: metadata fetch failed (offline?)"),
    }
}
