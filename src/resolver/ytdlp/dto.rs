//! yt-dlp JSON output types
//!
//! These types match what `yt-dlp -J` prints, for single videos, playlists
//! and `ytsearchN:` pseudo-playlists. Only the fields we read are listed.
//! DO NOT use these types outside the ytdlp module - convert to MediaInfo.

use serde::{Deserialize, Serialize};

/// One info document (a video, a playlist, or a flat playlist entry)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct InfoJson {
    pub id: Option<String>,
    pub title: Option<String>,
    /// "video", "playlist" or "url" (flat entries)
    #[serde(rename = "_type")]
    pub kind: Option<String>,
    /// Canonical page URL
    pub webpage_url: Option<String>,
    /// Direct media URL for videos, watch URL for flat entries
    pub url: Option<String>,
    /// Duration in seconds (may be fractional)
    pub duration: Option<f64>,
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub thumbnails: Vec<Thumbnail>,
    pub uploader: Option<String>,
    pub channel: Option<String>,
    #[serde(default)]
    pub formats: Vec<Format>,
    /// Playlist entries; unavailable videos show up as null
    pub entries: Option<Vec<Option<InfoJson>>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Thumbnail {
    pub url: String,
}

/// One downloadable format
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Format {
    pub format_id: Option<String>,
    pub url: Option<String>,
    /// Audio codec, "none" for video-only formats
    pub acodec: Option<String>,
}
