//! Site classification and URL canonicalization
//!
//! Substring-based site rules decide which filter a captured URL falls
//! under; the filter in turn drives per-site argument construction and
//! playlist handling. Rules are deliberately simple `contains` checks
//! rather than full URL parsing, matching how media hosts structure
//! their share links in practice.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::PlaylistPolicy;

/// Site categories recognized when capturing URLs.
///
/// A URL that matches no specific site is only accepted as
/// [`SiteFilter::Generic`] when link capture is configured to take
/// anything (`capture_any_links`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteFilter {
    /// A single YouTube video (watch, embed or youtu.be link)
    Youtube,
    /// A YouTube playlist (`list=` parameter or `/playlist` path)
    YoutubePlaylist,
    /// Twitch VODs, clips and live channels
    Twitch,
    /// Facebook videos
    Facebook,
    /// Twitter / X posts
    Twitter,
    /// Crunchyroll episodes
    Crunchyroll,
    /// Dropout episodes
    Dropout,
    /// Catch-all for any other link
    Generic,
}

impl SiteFilter {
    /// Classify a URL against the site rules.
    ///
    /// Returns `None` when no site matches and `capture_any_links` is
    /// disabled. Playlist URLs classify ahead of single videos so that a
    /// watch URL carrying a `list=` parameter is treated as a playlist.
    pub fn classify(url: &str, capture_any_links: bool) -> Option<Self> {
        if url.contains("youtube.com/") && is_youtube_playlist(url) {
            return Some(Self::YoutubePlaylist);
        }

        if (url.contains("youtube.com/watch?v=") || url.contains("youtube.com/embed"))
            && !is_youtube_playlist(url)
            || url.contains("youtu.be")
        {
            return Some(Self::Youtube);
        }

        if url.contains("twitch.tv") {
            return Some(Self::Twitch);
        }

        if url.contains("facebook.com") {
            return Some(Self::Facebook);
        }

        if url.contains("twitter") || url.contains("x.com") {
            return Some(Self::Twitter);
        }

        if url.contains("crunchyroll.com") {
            return Some(Self::Crunchyroll);
        }

        if url.contains("dropout.tv") {
            return Some(Self::Dropout);
        }

        if capture_any_links {
            return Some(Self::Generic);
        }

        None
    }

    /// Get the filter name as a string (for logging)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Youtube => "youtube",
            Self::YoutubePlaylist => "youtube_playlist",
            Self::Twitch => "twitch",
            Self::Facebook => "facebook",
            Self::Twitter => "twitter",
            Self::Crunchyroll => "crunchyroll",
            Self::Dropout => "dropout",
            Self::Generic => "generic",
        }
    }
}

impl std::fmt::Display for SiteFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Check whether a URL points at a YouTube playlist rather than a single
/// video.
pub(crate) fn is_youtube_playlist(url: &str) -> bool {
    url.contains("youtube") && (url.contains("list=") || url.contains("/playlist"))
}

/// Check whether a URL points at a YouTube channel page.
///
/// Channel URLs are refused at capture time; downloading an entire
/// channel is never what a pasted link means.
pub(crate) fn is_youtube_channel(url: &str) -> bool {
    url.contains("youtube") && (url.contains("/@") || url.contains("/channel"))
}

/// Check whether a URL is capture noise rather than downloadable media.
///
/// Browsing YouTube sprays thumbnail CDN links (ytimg, ggpht) and bare
/// site roots into the clipboard alongside the links users actually
/// want.
pub(crate) fn is_noise_url(url: &str) -> bool {
    url.contains("ytimg")
        || url.contains("ggpht")
        || url.ends_with("youtube.com/")
        || url.ends_with(".jpg")
        || url.ends_with(".png")
        || url.ends_with(".webp")
}

/// Canonicalize a URL for fetching and deduplication.
///
/// Under the single-video policy a YouTube watch URL is reduced to
/// `https://www.youtube.com/watch?v=<id>`, dropping playlist and
/// tracking query parameters, and `youtu.be/<id>` short links expand to
/// the same canonical form. The playlist policy and all non-YouTube URLs
/// keep the URL exactly as captured. Unparsable input passes through
/// unchanged.
pub(crate) fn normalize_url(url: &str, policy: PlaylistPolicy) -> String {
    if policy == PlaylistPolicy::Playlist {
        return url.to_string();
    }

    let Ok(parsed) = Url::parse(url) else {
        return url.to_string();
    };

    match parsed.host_str() {
        Some(host) if host.contains("youtube.com") => {
            let video_id = parsed
                .query_pairs()
                .find(|(key, _)| key == "v")
                .map(|(_, value)| value.into_owned());

            match video_id {
                Some(id) if !id.is_empty() => format!("https://www.youtube.com/watch?v={id}"),
                _ => url.to_string(),
            }
        }
        Some("youtu.be") => {
            let id = parsed.path().trim_start_matches('/');

            if id.is_empty() {
                url.to_string()
            } else {
                format!("https://www.youtube.com/watch?v={id}")
            }
        }
        _ => url.to_string(),
    }
}
