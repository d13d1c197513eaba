//! Spotify Web API Data Transfer Objects
//!
//! These types match what the Web API returns for the endpoints we call.
//! DO NOT use these types outside the spotify module - convert to CatalogTrack.

use serde::{Deserialize, Serialize};

/// POST /api/token response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    /// Lifetime in seconds
    pub expires_in: u64,
}

/// Error body: {"error": {"status": 404, "message": "..."}}
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ErrorBody {
    pub status: u16,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Artist {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Image {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ExternalUrls {
    pub spotify: Option<String>,
}

/// Album as embedded in a full track
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimplifiedAlbum {
    pub name: String,
    #[serde(default)]
    pub images: Vec<Image>,
}

/// GET /v1/tracks/{id}, also the `track` of a playlist item
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Track {
    pub name: String,
    #[serde(default)]
    pub artists: Vec<Artist>,
    pub album: Option<SimplifiedAlbum>,
    pub duration_ms: u64,
    #[serde(default)]
    pub external_urls: ExternalUrls,
}

/// Track as listed inside an album (no album field)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimplifiedTrack {
    pub name: String,
    #[serde(default)]
    pub artists: Vec<Artist>,
    pub duration_ms: u64,
    #[serde(default)]
    pub external_urls: ExternalUrls,
}

/// Paging object
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<String>,
}

/// GET /v1/albums/{id}
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Album {
    pub name: String,
    #[serde(default)]
    pub images: Vec<Image>,
    pub tracks: Page<SimplifiedTrack>,
}

/// Item of GET /v1/playlists/{id}/tracks; `track` is null for removed tracks
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlaylistItem {
    pub track: Option<Track>,
}
