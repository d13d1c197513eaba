//! External music catalog (secondary source).
//!
//! Catalog links can't be played directly. The catalog is asked for the
//! tracks behind a link, and each one is turned into a resolver search
//! query via [`CatalogTrack::to_search_query`].

use async_trait::async_trait;

pub mod spotify;

pub use spotify::SpotifyClient;

/// What a catalog link points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogKind {
    Track,
    Album,
    Playlist,
    Unknown,
}

impl CatalogKind {
    fn from_segment(segment: &str) -> Self {
        match segment {
            "track" => CatalogKind::Track,
            "album" => CatalogKind::Album,
            "playlist" => CatalogKind::Playlist,
            _ => CatalogKind::Unknown,
        }
    }
}

/// A parsed catalog link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogLink {
    pub kind: CatalogKind,
    pub id: String,
}

/// Parse `https://open.spotify.com/[intl-xx/]<kind>/<id>?...` or
/// `spotify:<kind>:<id>`.
pub fn parse_link(url: &str) -> Option<CatalogLink> {
    let url = url.trim();

    if let Some(rest) = url.strip_prefix("spotify:") {
        let mut parts = rest.split(':');
        let kind = CatalogKind::from_segment(parts.next()?);
        let id = parts.next().filter(|id| !id.is_empty())?;
        return Some(CatalogLink {
            kind,
            id: id.to_string(),
        });
    }

    let (_, path) = url.split_once("open.spotify.com/")?;
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    let mut kind_segment = segments.next()?;
    if kind_segment.starts_with("intl-") {
        kind_segment = segments.next()?;
    }
    let id = segments.next()?;
    Some(CatalogLink {
        kind: CatalogKind::from_segment(kind_segment),
        id: id.to_string(),
    })
}

/// Classify a catalog URL.
pub fn classify_link(url: &str) -> CatalogKind {
    parse_link(url).map_or(CatalogKind::Unknown, |link| link.kind)
}

/// Track metadata from the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogTrack {
    pub title: String,
    pub artists: Vec<String>,
    pub album: Option<String>,
    pub duration_ms: u64,
    pub external_url: Option<String>,
    pub thumbnail: Option<String>,
}

impl CatalogTrack {
    /// Resolver query: "<artists joined by space> - <title> official audio".
    pub fn to_search_query(&self) -> String {
        format!("{} - {} official audio", self.artists.join(" "), self.title)
    }
}

/// Errors from the catalog client.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CatalogError {
    #[error("Catalog credentials are not configured")]
    NotConfigured,

    #[error("Unsupported catalog link: {0}")]
    UnsupportedLink(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Catalog API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Not found in catalog")]
    NotFound,

    #[error("Rate limited - try again later")]
    RateLimited,
}

/// Catalog lookup contract.
///
/// Implement this trait to create mock implementations for testing.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Classify a catalog URL.
    fn classify(&self, url: &str) -> CatalogKind {
        classify_link(url)
    }

    /// All tracks behind a track, album or playlist link, in catalog order.
    async fn fetch_tracks(&self, url: &str) -> Result<Vec<CatalogTrack>, CatalogError>;
}
