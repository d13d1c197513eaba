//! Media resolver boundary.
//!
//! Turns raw user input into playable media: classifies a query, looks up
//! metadata for URLs, playlists and free-text searches, and produces the
//! short-lived stream locator the transport plays from.
//!
//! Everything downstream talks to the [`Resolver`] trait, so tests swap in
//! a mock and production wraps the yt-dlp client in a [`CachingResolver`].

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;

use crate::model::MediaInfo;

mod cached;
pub mod ytdlp;

pub use cached::CachingResolver;
pub use ytdlp::YtDlpClient;

/// Hosts treated as direct media links.
const MEDIA_HOSTS: &[&str] = &["youtube.com", "youtu.be"];

/// What kind of input a play request carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// A media page or playlist URL the resolver can open directly
    DirectMedia,
    /// A link into the external catalog (needs a catalog lookup first)
    CatalogLink,
    /// Anything else, searched as text
    FreeText,
}

/// Classify a raw query.
///
/// Only an absolute http(s) URL on a media host counts as a direct link.
/// Everything else that is not a catalog link is searched as text.
pub fn classify_query(query: &str) -> QueryKind {
    let query = query.trim();
    let lower = query.to_ascii_lowercase();
    if lower.starts_with("spotify:") || web_host(query).is_some_and(|host| host == "open.spotify.com") {
        QueryKind::CatalogLink
    } else if web_host(query).is_some_and(|host| is_media_host(&host)) {
        QueryKind::DirectMedia
    } else {
        QueryKind::FreeText
    }
}

/// Lowercased host of an absolute http(s) URL.
fn web_host(query: &str) -> Option<String> {
    let url = Url::parse(query).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.host_str().map(str::to_ascii_lowercase)
}

fn is_media_host(host: &str) -> bool {
    MEDIA_HOSTS
        .iter()
        .any(|media| host == *media || host.strip_suffix(media).is_some_and(|sub| sub.ends_with('.')))
}

/// Whether a direct media URL points at a playlist.
pub fn is_playlist_url(url: &str) -> bool {
    url.contains("list=") || url.to_ascii_lowercase().contains("playlist")
}

/// Opaque, short-lived handle the transport streams audio from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHandle(String);

impl StreamHandle {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors from the media resolver.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResolveError {
    #[error("Resolver tool not available: {0}")]
    ToolMissing(String),

    #[error("Resolver process failed: {0}")]
    Process(String),

    #[error("Resolver timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to parse resolver output: {0}")]
    Parse(String),

    #[error("Media not found: {0}")]
    NotFound(String),

    #[error("No playable stream for {0}")]
    NoStream(String),
}

/// The media resolver contract.
///
/// Implement this trait to create mock implementations for testing.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Classify a raw query. The default follows [`classify_query`].
    fn classify(&self, query: &str) -> QueryKind {
        classify_query(query)
    }

    /// Look up metadata for a single media URL.
    async fn resolve_direct(&self, url: &str) -> Result<MediaInfo, ResolveError>;

    /// List up to `max_items` entries of a playlist URL.
    async fn resolve_playlist(
        &self,
        url: &str,
        max_items: usize,
    ) -> Result<Vec<MediaInfo>, ResolveError>;

    /// Search by free text, best match first.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<MediaInfo>, ResolveError>;

    /// Produce a fresh stream handle for a track locator.
    async fn stream_locator(&self, locator: &str) -> Result<StreamHandle, ResolveError>;
}
