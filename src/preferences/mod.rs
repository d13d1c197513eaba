//! Per-user listening preferences.
//!
//! Records like/dislike ratings, accumulates a score per artist, logs plays
//! (to compute skip rates) and keeps each user's favorites list. All data
//! is scoped by (user, tenant).
//!
//! The [`PreferenceStore`] trait is the seam; [`SqlitePreferenceStore`] is
//! the production implementation.

use std::fmt;

use async_trait::async_trait;

use crate::model::{TenantId, Track, UserId};

mod sqlite;

pub use sqlite::{SqlitePreferenceStore, db_url, init_db};

/// Artists scoring below this are "disliked" and filtered from recommendations.
pub const DISLIKED_ARTIST_THRESHOLD: i64 = -2;

/// Artists scoring below this are avoided outright.
pub const AVOID_ARTIST_THRESHOLD: i64 = -3;

/// Artists skipped more often than this are avoided.
pub const AVOID_SKIP_RATE: f64 = 0.7;

/// A like or dislike.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rating {
    Like,
    Dislike,
}

impl Rating {
    /// +1 or -1, the amount added to the artist score.
    pub fn value(self) -> i64 {
        match self {
            Rating::Like => 1,
            Rating::Dislike => -1,
        }
    }

    pub fn from_value(value: i64) -> Option<Self> {
        match value {
            1 => Some(Rating::Like),
            -1 => Some(Rating::Dislike),
            _ => None,
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rating::Like => write!(f, "like"),
            Rating::Dislike => write!(f, "dislike"),
        }
    }
}

/// A rated song, newest first when listed.
#[derive(Debug, Clone, PartialEq)]
pub struct RatedSong {
    pub title: String,
    pub locator: String,
    pub artist: Option<String>,
    pub rating: Rating,
    /// RFC3339 timestamp
    pub rated_at: String,
}

/// Accumulated score for one artist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtistScore {
    pub artist: String,
    pub score: i64,
}

/// One finished play.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayRecord {
    pub user: UserId,
    pub tenant: TenantId,
    pub title: String,
    pub locator: String,
    pub artist: Option<String>,
    pub skipped: bool,
    pub completed: bool,
}

impl PlayRecord {
    /// A play of `track` by its requester.
    pub fn for_track(tenant: TenantId, track: &Track, skipped: bool) -> Self {
        Self {
            user: track.requested_by(),
            tenant,
            title: track.title().to_string(),
            locator: track.locator().to_string(),
            artist: Some(track.uploader().to_string()),
            skipped,
            completed: !skipped,
        }
    }
}

/// A bookmarked song.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Favorite {
    pub title: String,
    pub locator: String,
    pub duration_secs: u64,
    pub uploader: Option<String>,
    pub thumbnail: Option<String>,
    pub added_at: String,
}

impl Favorite {
    /// Rebuild a queueable track requested by `user`.
    pub fn to_track(&self, user: UserId) -> Track {
        let mut track = Track::new(&self.title, &self.locator, user).with_duration(self.duration_secs);
        if let Some(uploader) = &self.uploader {
            track = track.with_uploader(uploader);
        }
        if let Some(thumb) = &self.thumbnail {
            track = track.with_thumbnail(thumb);
        }
        track
    }
}

/// Result of adding a favorite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FavoriteAdded {
    Added,
    AlreadyPresent,
    /// The per-user cap was reached
    Full,
}

/// Overview of a user's tastes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreferenceSummary {
    pub liked_count: usize,
    pub favorite_artists: Vec<String>,
    pub disliked_artists: Vec<String>,
    pub top_songs: Vec<RatedSong>,
}

impl PreferenceSummary {
    pub fn is_empty(&self) -> bool {
        self.liked_count == 0 && self.favorite_artists.is_empty() && self.disliked_artists.is_empty()
    }
}

/// Errors from the preference store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

/// Preference persistence contract.
///
/// Implement this trait to create mock implementations for testing.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// Record a rating. A later rating of the same song replaces the earlier
    /// one; the artist score moves by the rating's sign either way.
    async fn add_rating(
        &self,
        user: UserId,
        tenant: TenantId,
        title: &str,
        locator: &str,
        rating: Rating,
        artist: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Liked songs, most recent first.
    async fn liked_songs(
        &self,
        user: UserId,
        tenant: TenantId,
        limit: usize,
    ) -> Result<Vec<RatedSong>, StoreError>;

    /// Disliked songs, most recent first.
    async fn disliked_songs(
        &self,
        user: UserId,
        tenant: TenantId,
        limit: usize,
    ) -> Result<Vec<RatedSong>, StoreError>;

    async fn liked_count(&self, user: UserId, tenant: TenantId) -> Result<usize, StoreError>;

    /// Artists with a positive score, highest first.
    async fn favorite_artists(
        &self,
        user: UserId,
        tenant: TenantId,
        limit: usize,
    ) -> Result<Vec<ArtistScore>, StoreError>;

    /// Artists scoring below [`DISLIKED_ARTIST_THRESHOLD`].
    async fn disliked_artists(&self, user: UserId, tenant: TenantId)
    -> Result<Vec<String>, StoreError>;

    async fn artist_score(
        &self,
        user: UserId,
        tenant: TenantId,
        artist: &str,
    ) -> Result<Option<i64>, StoreError>;

    async fn add_play_history(&self, record: &PlayRecord) -> Result<(), StoreError>;

    /// Skipped plays / total plays for an artist, 0.0 without plays.
    async fn skip_rate(&self, user: UserId, tenant: TenantId, artist: &str)
    -> Result<f64, StoreError>;

    /// Bookmark a track unless the user already has `max` favorites.
    async fn add_favorite(
        &self,
        user: UserId,
        tenant: TenantId,
        track: &Track,
        max: usize,
    ) -> Result<FavoriteAdded, StoreError>;

    /// Favorites, newest first.
    async fn favorites(&self, user: UserId, tenant: TenantId) -> Result<Vec<Favorite>, StoreError>;

    /// Remove the favorite at `index` of [`favorites`](Self::favorites).
    async fn remove_favorite(
        &self,
        user: UserId,
        tenant: TenantId,
        index: usize,
    ) -> Result<Option<Favorite>, StoreError>;

    /// Remove all favorites, returning how many were deleted.
    async fn clear_favorites(&self, user: UserId, tenant: TenantId) -> Result<u64, StoreError>;

    /// True if the artist's score is below [`AVOID_ARTIST_THRESHOLD`] or the
    /// user skips them more than [`AVOID_SKIP_RATE`] of the time.
    async fn should_avoid_artist(
        &self,
        user: UserId,
        tenant: TenantId,
        artist: &str,
    ) -> Result<bool, StoreError> {
        if let Some(score) = self.artist_score(user, tenant, artist).await?
            && score < AVOID_ARTIST_THRESHOLD
        {
            return Ok(true);
        }
        Ok(self.skip_rate(user, tenant, artist).await? > AVOID_SKIP_RATE)
    }

    async fn summary(&self, user: UserId, tenant: TenantId) -> Result<PreferenceSummary, StoreError> {
        let liked_count = self.liked_count(user, tenant).await?;
        let top_songs = self.liked_songs(user, tenant, 5).await?;
        let favorite_artists = self
            .favorite_artists(user, tenant, 5)
            .await?
            .into_iter()
            .map(|a| a.artist)
            .collect();
        let disliked_artists = self.disliked_artists(user, tenant).await?;

        Ok(PreferenceSummary {
            liked_count,
            favorite_artists,
            disliked_artists,
            top_songs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_values() {
        assert_eq!(Rating::Like.value(), 1);
        assert_eq!(Rating::Dislike.value(), -1);
        assert_eq!(Rating::from_value(-1), Some(Rating::Dislike));
        assert_eq!(Rating::from_value(0), None);
    }

    #[test]
    fn test_play_record_for_track() {
        let track = Track::new("Song", "loc", UserId(5)).with_uploader("Band");
        let record = PlayRecord::for_track(TenantId(9), &track, true);
        assert_eq!(record.user, UserId(5));
        assert_eq!(record.artist.as_deref(), Some("Band"));
        assert!(record.skipped);
        assert!(!record.completed);
    }

    #[test]
    fn test_favorite_to_track() {
        let fav = Favorite {
            title: "Song".to_string(),
            locator: "https://youtu.be/a".to_string(),
            duration_secs: 200,
            uploader: Some("Band".to_string()),
            thumbnail: None,
            added_at: String::new(),
        };
        let track = fav.to_track(UserId(3));
        assert_eq!(track.requested_by(), UserId(3));
        assert_eq!(track.uploader(), "Band");
        assert_eq!(track.duration_secs(), 200);
    }
}
