//! Adapter layer: Convert yt-dlp output to MediaInfo
//!
//! This is the ONLY place where yt-dlp DTOs are converted to the core's
//! boundary record.

use super::dto;
use crate::model::MediaInfo;

const WATCH_URL: &str = "https://www.youtube.com/watch?v=";

/// Convert one info document (video or flat entry).
pub fn to_media_info(info: &dto::InfoJson) -> MediaInfo {
    let webpage_url = info.webpage_url.clone().or_else(|| {
        // Flat entries carry no page URL; their id is enough to build one
        // when the url field is missing too.
        match (&info.url, &info.id) {
            (None, Some(id)) => Some(format!("{WATCH_URL}{id}")),
            _ => None,
        }
    });

    let thumbnail = info
        .thumbnail
        .clone()
        .or_else(|| info.thumbnails.last().map(|t| t.url.clone()));

    MediaInfo {
        title: info.title.clone(),
        webpage_url,
        url: info.url.clone(),
        duration_secs: info
            .duration
            .filter(|d| d.is_finite() && *d > 0.0)
            .map(|d| d.round() as u64),
        thumbnail,
        uploader: info.uploader.clone().or_else(|| info.channel.clone()),
    }
}

/// Convert the entries of a playlist or search result, skipping null entries.
///
/// A document without entries is treated as a single item.
pub fn to_media_list(info: &dto::InfoJson, max_items: usize) -> Vec<MediaInfo> {
    match &info.entries {
        Some(entries) => entries
            .iter()
            .flatten()
            .take(max_items)
            .map(to_media_info)
            .collect(),
        None if max_items > 0 => vec![to_media_info(info)],
        None => Vec::new(),
    }
}

/// Pick the audio stream URL: the selected format's url, else the first
/// format that carries audio.
pub fn stream_url(info: &dto::InfoJson) -> Option<String> {
    if let Some(url) = info.url.as_deref().filter(|u| !u.is_empty()) {
        return Some(url.to_string());
    }
    info.formats
        .iter()
        .filter(|f| f.acodec.as_deref() != Some("none"))
        .find_map(|f| f.url.clone())
}
