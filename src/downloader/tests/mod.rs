use super::*;
use crate::downloader::test_helpers::{
    MockSource, create_test_downloader, create_test_downloader_with, wait_until,
};
use crate::types::{DownloadId, DownloadPass, DownloadStatus, Event};
use std::time::Duration;


/// Drain every event currently buffered on the receiver.
fn drain_events(rx: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Wait for the next event matching `predicate`, discarding others.
async fn next_matching(
    rx: &mut tokio::sync::broadcast::Receiver<Event>,
    timeout: Duration,
    mut predicate: impl FnMut(&Event) -> bool,
) -> Option<Event> {
    tokio::time::timeout(timeout, async {
        loop {
            match rx.recv().await {
                Ok(event) if predicate(&event) => return Some(event),
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}
