//! Core data models shared by every subsystem.
//!
//! Defines the primary entities: [`Track`] (one playable item in a tenant's
//! queue) and [`MediaInfo`] (the loosely-populated record the external
//! resolver hands back). Resolver output is only ever turned into a
//! [`Track`] through [`Track::from_media`], which is where required fields
//! are validated and the rest defaulted.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Uploader name used when the resolver doesn't report one.
pub const UNKNOWN_UPLOADER: &str = "Unknown";

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }
    };
}

id_type!(
    /// A tenant (guild) - one isolated playback context.
    TenantId
);
id_type!(
    /// A chat-platform user.
    UserId
);
id_type!(
    /// A voice or text channel reference.
    ChannelId
);

/// Where a track was requested from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackOrigin {
    /// Resolved directly by the media resolver (URL or search)
    #[default]
    Youtube,
    /// Looked up in the external catalog, then matched by search
    Spotify,
}

impl fmt::Display for TrackOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackOrigin::Youtube => write!(f, "youtube"),
            TrackOrigin::Spotify => write!(f, "spotify"),
        }
    }
}

/// One playable item.
///
/// Fields are private: a track never changes after it has been built, so
/// clones handed to the queue, the history and notifications all agree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    title: String,
    locator: String,
    duration_secs: u64,
    thumbnail_url: Option<String>,
    requested_by: UserId,
    origin: TrackOrigin,
    uploader: String,
}

impl Track {
    /// Create a track with unknown duration and uploader.
    pub fn new(title: impl Into<String>, locator: impl Into<String>, requested_by: UserId) -> Self {
        Self {
            title: title.into(),
            locator: locator.into(),
            duration_secs: 0,
            thumbnail_url: None,
            requested_by,
            origin: TrackOrigin::default(),
            uploader: UNKNOWN_UPLOADER.to_string(),
        }
    }

    pub fn with_duration(mut self, secs: u64) -> Self {
        self.duration_secs = secs;
        self
    }

    pub fn with_thumbnail(mut self, url: impl Into<String>) -> Self {
        self.thumbnail_url = Some(url.into());
        self
    }

    pub fn with_uploader(mut self, uploader: impl Into<String>) -> Self {
        self.uploader = uploader.into();
        self
    }

    pub fn with_origin(mut self, origin: TrackOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// Build a track from a resolver record.
    ///
    /// Title and locator are required; everything else falls back to a
    /// default (duration 0 = unknown, uploader "Unknown").
    pub fn from_media(
        info: &MediaInfo,
        requested_by: UserId,
        origin: TrackOrigin,
    ) -> Result<Self, ModelError> {
        let title = info
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(ModelError::MissingField("title"))?;
        let locator = info.locator().ok_or(ModelError::MissingField("locator"))?;

        let mut track = Track::new(title, locator, requested_by)
            .with_duration(info.duration_secs.unwrap_or(0))
            .with_uploader(info.uploader_or_unknown())
            .with_origin(origin);
        if let Some(thumb) = info.thumbnail.as_deref().filter(|t| !t.is_empty()) {
            track = track.with_thumbnail(thumb);
        }
        Ok(track)
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Stable lookup key (the page URL of the media).
    pub fn locator(&self) -> &str {
        &self.locator
    }

    /// Duration in seconds, 0 when unknown.
    pub fn duration_secs(&self) -> u64 {
        self.duration_secs
    }

    pub fn thumbnail_url(&self) -> Option<&str> {
        self.thumbnail_url.as_deref()
    }

    pub fn requested_by(&self) -> UserId {
        self.requested_by
    }

    pub fn origin(&self) -> TrackOrigin {
        self.origin
    }

    pub fn uploader(&self) -> &str {
        &self.uploader
    }

    /// Duration formatted for display.
    pub fn duration_str(&self) -> String {
        format_duration(self.duration_secs)
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {} [{}]", self.title, self.uploader, self.duration_str())
    }
}

/// Media record as reported by the external resolver.
///
/// Every field is optional because the resolver's output shape varies
/// between direct lookups, flat playlist entries and search hits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub title: Option<String>,
    /// Canonical page URL (preferred locator)
    pub webpage_url: Option<String>,
    /// Fallback URL when no page URL is reported
    pub url: Option<String>,
    pub duration_secs: Option<u64>,
    pub thumbnail: Option<String>,
    pub uploader: Option<String>,
}

impl MediaInfo {
    /// The stable locator: page URL, else plain URL. Empty strings don't count.
    pub fn locator(&self) -> Option<&str> {
        self.webpage_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .or_else(|| self.url.as_deref().filter(|u| !u.is_empty()))
    }

    pub fn uploader_or_unknown(&self) -> &str {
        self.uploader
            .as_deref()
            .filter(|u| !u.is_empty())
            .unwrap_or(UNKNOWN_UPLOADER)
    }

    pub fn title_or_default(&self) -> &str {
        self.title.as_deref().unwrap_or("Untitled")
    }
}

/// Errors mapping external records into core entities.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
}

/// Format seconds as M:SS or H:MM:SS. Zero means unknown.
pub fn format_duration(secs: u64) -> String {
    if secs == 0 {
        return "??:??".to_string();
    }

    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;
    let secs = secs % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, mins, secs)
    } else {
        format!("{}:{:02}", mins, secs)
    }
}
