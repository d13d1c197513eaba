//! Command surface for the chat layer.
//!
//! [`Jukebox`] turns raw requests ("play <query>", "like", "radio rock")
//! into resolver lookups, preference updates and session commands. Every
//! failure comes back as a [`CommandError`] with short user-facing text;
//! the underlying detail is logged where it happens.
//!
//! Queue positions are 0-based here. Chat front-ends that show 1-based
//! positions convert at their edge.

use std::sync::Arc;

use futures::stream::{self, StreamExt};

use crate::catalog::{CatalogClient, CatalogTrack};
use crate::config::Config;
use crate::error::CommandError;
use crate::model::{ChannelId, MediaInfo, TenantId, Track, TrackOrigin, UserId};
use crate::preferences::{Favorite, FavoriteAdded, PreferenceStore, PreferenceSummary, Rating};
use crate::queue::LoopMode;
use crate::radio::{RadioSource, to_tracks};
use crate::recommend::RecommendationEngine;
use crate::resolver::{QueryKind, ResolveError, Resolver, is_playlist_url};
use crate::session::{EnqueueOutcome, QueuePage, SessionHandle, SessionRegistry, SessionSummary};

/// Catalog tracks looked up concurrently.
const CATALOG_LOOKUPS: usize = 4;

/// Bounds for [`Jukebox::recommend`].
pub const MIN_RECOMMENDATIONS: usize = 1;
pub const MAX_RECOMMENDATIONS: usize = 20;

/// Who issued a command, and from where.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requester {
    pub user: UserId,
    pub tenant: TenantId,
    /// The user's current voice channel, if any
    pub voice: Option<ChannelId>,
    /// Channel the command was typed in
    pub text: Option<ChannelId>,
}

impl Requester {
    fn voice_channel(&self) -> Result<ChannelId, CommandError> {
        self.voice.ok_or(CommandError::NotInVoice)
    }
}

#[derive(Debug, Clone)]
pub struct JukeboxSettings {
    /// Known durations above this are refused
    pub max_song_duration_secs: u64,
    /// Entries read from a playlist link
    pub playlist_limit: usize,
    pub radio_batch_size: usize,
    pub genre_playlist_size: usize,
    pub genre_search_size: usize,
    pub max_favorites: usize,
}

impl Default for JukeboxSettings {
    fn default() -> Self {
        Self {
            max_song_duration_secs: 7200,
            playlist_limit: 100,
            radio_batch_size: 20,
            genre_playlist_size: 20,
            genre_search_size: 10,
            max_favorites: 50,
        }
    }
}

impl JukeboxSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_song_duration_secs: config.playback.max_song_duration_secs,
            playlist_limit: config.playback.max_queue_size,
            radio_batch_size: config.radio.queue_size,
            genre_playlist_size: config.radio.genre_playlist_size,
            genre_search_size: config.radio.genre_search_size,
            max_favorites: config.favorites.max_per_user,
        }
    }
}

/// Result of rating the current track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatingOutcome {
    pub track: Track,
    /// Radio was on, so the disliked track was skipped
    pub skipped: bool,
}

pub struct Jukebox {
    sessions: SessionRegistry,
    resolver: Arc<dyn Resolver>,
    catalog: Option<Arc<dyn CatalogClient>>,
    preferences: Arc<dyn PreferenceStore>,
    recommender: Arc<RecommendationEngine>,
    settings: JukeboxSettings,
}

impl Jukebox {
    pub fn new(
        sessions: SessionRegistry,
        resolver: Arc<dyn Resolver>,
        preferences: Arc<dyn PreferenceStore>,
        recommender: Arc<RecommendationEngine>,
        settings: JukeboxSettings,
    ) -> Self {
        Self {
            sessions,
            resolver,
            catalog: None,
            preferences,
            recommender,
            settings,
        }
    }

    /// Accept catalog links (without one they are refused).
    pub fn with_catalog(mut self, catalog: Arc<dyn CatalogClient>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    fn session(&self, tenant: TenantId) -> SessionHandle {
        self.sessions.get_or_create(tenant)
    }

    // ------------------------------------------------------------------
    // Queueing
    // ------------------------------------------------------------------

    /// Resolve `query` (media URL, playlist URL, catalog link or free text)
    /// and queue the result. Free text takes the top search hit.
    pub async fn enqueue_from_query(
        &self,
        req: &Requester,
        query: &str,
    ) -> Result<EnqueueOutcome, CommandError> {
        let voice = req.voice_channel()?;
        let query = query.trim();
        if query.is_empty() {
            return Err(CommandError::NoResults);
        }
        let session = self.session(req.tenant);
        session.join(voice, req.text).await?;

        let tracks = self.resolve_query(req.user, query).await?;
        self.enqueue_checked(&session, req, voice, tracks).await
    }

    /// Drop over-long tracks, then hand the rest to the session.
    async fn enqueue_checked(
        &self,
        session: &SessionHandle,
        req: &Requester,
        voice: ChannelId,
        tracks: Vec<Track>,
    ) -> Result<EnqueueOutcome, CommandError> {
        let (tracks, too_long) = self.split_too_long(tracks);
        if tracks.is_empty() {
            return Err(if too_long > 0 {
                CommandError::TooLong {
                    limit_secs: self.settings.max_song_duration_secs,
                }
            } else {
                CommandError::NoResults
            });
        }
        let mut outcome = session.enqueue(tracks, voice, req.text).await?;
        outcome.rejected += too_long;
        Ok(outcome)
    }

    fn split_too_long(&self, tracks: Vec<Track>) -> (Vec<Track>, usize) {
        let limit = self.settings.max_song_duration_secs;
        let total = tracks.len();
        let kept: Vec<Track> = tracks
            .into_iter()
            .filter(|t| t.duration_secs() == 0 || t.duration_secs() <= limit)
            .collect();
        let dropped = total - kept.len();
        if dropped > 0 {
            tracing::debug!(target: "session", dropped, limit, "Refused over-long tracks");
        }
        (kept, dropped)
    }

    async fn resolve_query(&self, user: UserId, query: &str) -> Result<Vec<Track>, CommandError> {
        match self.resolver.classify(query) {
            QueryKind::CatalogLink => self.resolve_catalog(user, query).await,
            QueryKind::DirectMedia if is_playlist_url(query) => {
                let entries = self
                    .resolver
                    .resolve_playlist(query, self.settings.playlist_limit)
                    .await
                    .map_err(|e| resolve_failed(query, e))?;
                let tracks = to_tracks(&entries, user);
                tracing::info!(target: "resolver", url = query, entries = entries.len(), usable = tracks.len(), "Playlist resolved");
                Ok(tracks)
            }
            QueryKind::DirectMedia => {
                let info = self
                    .resolver
                    .resolve_direct(query)
                    .await
                    .map_err(|e| resolve_failed(query, e))?;
                Ok(to_tracks(&[info], user))
            }
            QueryKind::FreeText => {
                let hits = self
                    .resolver
                    .search(query, 1)
                    .await
                    .map_err(|e| resolve_failed(query, e))?;
                Ok(to_tracks(&hits, user))
            }
        }
    }

    /// Look up each catalog track on the resolver, keeping catalog order.
    /// Tracks with no match are skipped.
    async fn resolve_catalog(&self, user: UserId, url: &str) -> Result<Vec<Track>, CommandError> {
        let catalog = self.catalog.as_ref().ok_or_else(|| {
            tracing::warn!(target: "catalog", url, "Catalog link but no catalog client configured");
            CommandError::CatalogUnavailable
        })?;
        let entries = catalog.fetch_tracks(url).await?;
        let total = entries.len();

        let tracks: Vec<Track> = stream::iter(entries)
            .map(|entry| self.match_catalog_track(user, entry))
            .buffered(CATALOG_LOOKUPS)
            .filter_map(|track| async move { track })
            .collect()
            .await;

        tracing::info!(target: "catalog", url, total, matched = tracks.len(), "Catalog link resolved");
        Ok(tracks)
    }

    async fn match_catalog_track(&self, user: UserId, entry: CatalogTrack) -> Option<Track> {
        let query = entry.to_search_query();
        let hit = match self.resolver.search(&query, 1).await {
            Ok(hits) => hits.into_iter().next()?,
            Err(e) => {
                tracing::debug!(target: "catalog", query, error = %e, "No match for catalog track");
                return None;
            }
        };
        let mut track = Track::from_media(&hit, user, TrackOrigin::Spotify).ok()?;
        if track.thumbnail_url().is_none()
            && let Some(thumb) = entry.thumbnail.as_deref()
        {
            track = track.with_thumbnail(thumb);
        }
        Some(track)
    }

    /// Search candidates for a selection UI.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<MediaInfo>, CommandError> {
        let hits = self
            .resolver
            .search(query, limit)
            .await
            .map_err(|e| resolve_failed(query, e))?;
        if hits.is_empty() {
            return Err(CommandError::NoResults);
        }
        Ok(hits)
    }

    // ------------------------------------------------------------------
    // Playback control
    // ------------------------------------------------------------------

    pub async fn join(&self, req: &Requester) -> Result<(), CommandError> {
        let voice = req.voice_channel()?;
        self.session(req.tenant).join(voice, req.text).await
    }

    pub async fn leave(&self, tenant: TenantId) -> Result<(), CommandError> {
        self.session(tenant).leave().await
    }

    pub async fn pause(&self, tenant: TenantId) -> Result<(), CommandError> {
        self.session(tenant).pause().await
    }

    pub async fn resume(&self, tenant: TenantId) -> Result<(), CommandError> {
        self.session(tenant).resume().await
    }

    pub async fn stop(&self, tenant: TenantId) -> Result<(), CommandError> {
        self.session(tenant).stop().await
    }

    pub async fn skip(&self, tenant: TenantId) -> Result<(), CommandError> {
        self.session(tenant).skip().await
    }

    pub async fn set_volume(&self, tenant: TenantId, volume: u8) -> Result<(), CommandError> {
        self.session(tenant).set_volume(volume).await
    }

    pub async fn now_playing(&self, tenant: TenantId) -> Result<Option<Track>, CommandError> {
        self.session(tenant).now_playing().await
    }

    pub async fn summary(&self, tenant: TenantId) -> Result<SessionSummary, CommandError> {
        self.session(tenant).summary().await
    }

    // ------------------------------------------------------------------
    // Queue management
    // ------------------------------------------------------------------

    pub async fn queue_page(
        &self,
        tenant: TenantId,
        page: usize,
        per_page: usize,
    ) -> Result<QueuePage, CommandError> {
        self.session(tenant).queue_page(page, per_page).await
    }

    /// Set the loop mode by name ("off", "song", "queue").
    pub async fn set_loop_mode(&self, tenant: TenantId, mode: &str) -> Result<LoopMode, CommandError> {
        let mode: LoopMode = mode
            .parse()
            .map_err(|_| CommandError::InvalidLoopMode(mode.to_string()))?;
        self.session(tenant).set_loop_mode(mode).await?;
        Ok(mode)
    }

    pub async fn loop_mode(&self, tenant: TenantId) -> Result<LoopMode, CommandError> {
        Ok(self.summary(tenant).await?.loop_mode)
    }

    pub async fn cycle_loop_mode(&self, tenant: TenantId) -> Result<LoopMode, CommandError> {
        self.session(tenant).cycle_loop_mode().await
    }

    /// Shuffle the queue. Fails when there is nothing to shuffle.
    pub async fn shuffle(&self, tenant: TenantId) -> Result<(), CommandError> {
        if self.session(tenant).shuffle().await? {
            Ok(())
        } else {
            Err(CommandError::QueueEmpty)
        }
    }

    /// Undo the last shuffle; false when there is nothing to undo.
    pub async fn unshuffle(&self, tenant: TenantId) -> Result<bool, CommandError> {
        self.session(tenant).unshuffle().await
    }

    pub async fn remove_at(&self, tenant: TenantId, index: usize) -> Result<Track, CommandError> {
        self.session(tenant).remove(index).await
    }

    pub async fn move_between(&self, tenant: TenantId, from: usize, to: usize) -> Result<(), CommandError> {
        self.session(tenant).move_track(from, to).await
    }

    pub async fn jump_to(&self, tenant: TenantId, index: usize) -> Result<Track, CommandError> {
        self.session(tenant).jump_to(index).await
    }

    pub async fn clear(&self, tenant: TenantId) -> Result<usize, CommandError> {
        self.session(tenant).clear().await
    }

    pub async fn set_auto_shuffle(&self, tenant: TenantId, enabled: bool) -> Result<(), CommandError> {
        self.session(tenant).set_auto_shuffle(enabled).await
    }

    pub async fn auto_shuffle(&self, tenant: TenantId) -> Result<bool, CommandError> {
        Ok(self.summary(tenant).await?.auto_shuffle)
    }

    // ------------------------------------------------------------------
    // Preferences and radio
    // ------------------------------------------------------------------

    pub async fn like(&self, user: UserId, tenant: TenantId) -> Result<RatingOutcome, CommandError> {
        self.rate(user, tenant, Rating::Like).await
    }

    /// Dislike the current track. With radio on, it is skipped right away.
    pub async fn dislike(&self, user: UserId, tenant: TenantId) -> Result<RatingOutcome, CommandError> {
        self.rate(user, tenant, Rating::Dislike).await
    }

    async fn rate(&self, user: UserId, tenant: TenantId, rating: Rating) -> Result<RatingOutcome, CommandError> {
        let session = self.session(tenant);
        let summary = session.summary().await?;
        let track = summary.current.ok_or(CommandError::NothingPlaying)?;

        self.preferences
            .add_rating(
                user,
                tenant,
                track.title(),
                track.locator(),
                rating,
                Some(track.uploader()),
            )
            .await?;
        tracing::info!(target: "preferences", %user, %tenant, %rating, track = track.title(), "Rated");

        let skipped = rating == Rating::Dislike && summary.radio_active && session.skip().await.is_ok();
        Ok(RatingOutcome { track, skipped })
    }

    /// Start radio: a genre radio when `genre` is given, otherwise one
    /// built from the user's likes. Returns the number of tracks queued.
    pub async fn start_radio(&self, req: &Requester, genre: Option<&str>) -> Result<usize, CommandError> {
        let voice = req.voice_channel()?;
        let session = self.session(req.tenant);
        session.join(voice, req.text).await?;

        let tracks = match genre.map(str::trim).filter(|g| !g.is_empty()) {
            Some(genre) => self.genre_radio(req.user, genre).await,
            None => {
                // Same source as later refills, so avoided artists stay out.
                let seed = session.now_playing().await?;
                self.sessions
                    .radio()
                    .refill(req.user, req.tenant, seed, self.settings.radio_batch_size)
                    .await
            }
        };
        let (tracks, _) = self.split_too_long(tracks);
        if tracks.is_empty() {
            return Err(CommandError::NoPreferences);
        }

        let outcome = session.start_radio(req.user, tracks, voice, req.text).await?;
        tracing::info!(target: "recommend", tenant = %req.tenant, genre, added = outcome.added, "Radio started");
        Ok(outcome.added)
    }

    /// A genre playlist if one turns up, else plain genre search results.
    async fn genre_radio(&self, user: UserId, genre: &str) -> Vec<Track> {
        let playlist = self.recommender.find_playlist(genre, 1).await.into_iter().next();
        if let Some(locator) = playlist.as_ref().and_then(MediaInfo::locator) {
            match self
                .resolver
                .resolve_playlist(locator, self.settings.genre_playlist_size)
                .await
            {
                Ok(entries) if !entries.is_empty() => return to_tracks(&entries, user),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(target: "recommend", genre, error = %e, "Genre playlist failed");
                }
            }
        }

        let query = format!("{genre} music");
        match self.resolver.search(&query, self.settings.genre_search_size).await {
            Ok(hits) => to_tracks(&hits, user),
            Err(e) => {
                tracing::warn!(target: "recommend", genre, error = %e, "Genre search failed");
                Vec::new()
            }
        }
    }

    pub async fn stop_radio(&self, tenant: TenantId) -> Result<(), CommandError> {
        self.session(tenant).stop_radio().await
    }

    pub async fn preference_summary(
        &self,
        user: UserId,
        tenant: TenantId,
    ) -> Result<PreferenceSummary, CommandError> {
        Ok(self.preferences.summary(user, tenant).await?)
    }

    /// `count` recommendations, between [`MIN_RECOMMENDATIONS`] and
    /// [`MAX_RECOMMENDATIONS`].
    pub async fn recommend(
        &self,
        user: UserId,
        tenant: TenantId,
        count: usize,
    ) -> Result<Vec<Track>, CommandError> {
        if !(MIN_RECOMMENDATIONS..=MAX_RECOMMENDATIONS).contains(&count) {
            return Err(CommandError::InvalidCount {
                min: MIN_RECOMMENDATIONS,
                max: MAX_RECOMMENDATIONS,
            });
        }
        let media = self.recommender.recommendations(user, tenant, count).await;
        Ok(to_tracks(&media, user))
    }

    pub async fn find_playlist(&self, query: &str, limit: usize) -> Result<Vec<MediaInfo>, CommandError> {
        let found = self.recommender.find_playlist(query, limit).await;
        if found.is_empty() {
            return Err(CommandError::NoResults);
        }
        Ok(found)
    }

    // ------------------------------------------------------------------
    // Favorites
    // ------------------------------------------------------------------

    /// Bookmark the current track.
    pub async fn add_favorite(&self, user: UserId, tenant: TenantId) -> Result<(Track, FavoriteAdded), CommandError> {
        let track = self
            .session(tenant)
            .now_playing()
            .await?
            .ok_or(CommandError::NothingPlaying)?;
        let max = self.settings.max_favorites;
        match self.preferences.add_favorite(user, tenant, &track, max).await? {
            FavoriteAdded::Full => Err(CommandError::FavoritesFull(max)),
            added => Ok((track, added)),
        }
    }

    pub async fn favorites(&self, user: UserId, tenant: TenantId) -> Result<Vec<Favorite>, CommandError> {
        Ok(self.preferences.favorites(user, tenant).await?)
    }

    pub async fn remove_favorite(
        &self,
        user: UserId,
        tenant: TenantId,
        index: usize,
    ) -> Result<Favorite, CommandError> {
        self.preferences
            .remove_favorite(user, tenant, index)
            .await?
            .ok_or(CommandError::NoSuchFavorite)
    }

    pub async fn clear_favorites(&self, user: UserId, tenant: TenantId) -> Result<u64, CommandError> {
        Ok(self.preferences.clear_favorites(user, tenant).await?)
    }

    /// Queue one favorite, or all of them when `index` is `None`.
    pub async fn play_favorites(
        &self,
        req: &Requester,
        index: Option<usize>,
    ) -> Result<EnqueueOutcome, CommandError> {
        let voice = req.voice_channel()?;
        let favorites = self.preferences.favorites(req.user, req.tenant).await?;
        if favorites.is_empty() {
            return Err(CommandError::NoResults);
        }
        let chosen: Vec<Track> = match index {
            Some(i) => vec![favorites.get(i).ok_or(CommandError::NoSuchFavorite)?.to_track(req.user)],
            None => favorites.iter().map(|f| f.to_track(req.user)).collect(),
        };

        let session = self.session(req.tenant);
        self.enqueue_checked(&session, req, voice, chosen).await
    }
}

fn resolve_failed(query: &str, e: ResolveError) -> CommandError {
    tracing::warn!(target: "resolver", query, error = %e, "Resolution failed");
    CommandError::NoResults
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::SessionNotice;
    use crate::session::{SessionContext, SessionSettings};
    use crate::test_utils::{
        FailingPreferenceStore, MockCatalog, MockGateway, MockRadio, MockResolver,
        RecordingNotifier, mock_media, mock_track, temp_store, wait_until,
    };
    use crate::preferences::PlayRecord;
    use crate::radio::RadioGenerator;
    use crate::recommend::popular_queries;
    use chrono::Datelike;
    use std::time::Duration;
    use tempfile::TempDir;

    const GUILD: TenantId = TenantId(5);
    const USER: UserId = UserId(9);
    const REQ: Requester = Requester {
        user: USER,
        tenant: GUILD,
        voice: Some(ChannelId(50)),
        text: Some(ChannelId(60)),
    };

    struct Fixture {
        jukebox: Jukebox,
        gateway: MockGateway,
        notifier: Arc<RecordingNotifier>,
        resolver: Arc<MockResolver>,
    }

    fn fixture_with(resolver: MockResolver, store: Arc<dyn PreferenceStore>, auto_shuffle: bool) -> Fixture {
        fixture_with_radio(resolver, store, auto_shuffle, |_| -> Arc<dyn RadioSource> {
            Arc::new(MockRadio::new())
        })
    }

    fn fixture_with_radio(
        resolver: MockResolver,
        store: Arc<dyn PreferenceStore>,
        auto_shuffle: bool,
        radio: impl FnOnce(Arc<RecommendationEngine>) -> Arc<dyn RadioSource>,
    ) -> Fixture {
        let resolver = Arc::new(resolver);
        let gateway = MockGateway::new();
        let notifier = Arc::new(RecordingNotifier::new());
        let recommender = Arc::new(RecommendationEngine::new(
            store.clone(),
            resolver.clone(),
            Duration::from_secs(5),
        ));
        let ctx = SessionContext {
            resolver: resolver.clone(),
            gateway: Arc::new(gateway.clone()),
            notifier: notifier.clone(),
            preferences: store.clone(),
            radio: radio(recommender.clone()),
            settings: SessionSettings {
                auto_shuffle,
                ..SessionSettings::default()
            },
        };
        let jukebox = Jukebox::new(
            SessionRegistry::new(ctx),
            resolver.clone(),
            store,
            recommender,
            JukeboxSettings {
                max_song_duration_secs: 600,
                ..JukeboxSettings::default()
            },
        );
        Fixture {
            jukebox,
            gateway,
            notifier,
            resolver,
        }
    }

    async fn fixture(resolver: MockResolver) -> (Fixture, TempDir) {
        let (store, dir) = temp_store().await;
        (fixture_with(resolver, Arc::new(store), false), dir)
    }

    fn media(title: &str, secs: u64) -> MediaInfo {
        MediaInfo {
            duration_secs: Some(secs),
            ..mock_media(title, &format!("https://youtu.be/{title}"))
        }
    }

    #[tokio::test]
    async fn test_direct_link_plays_once() {
        let url = "https://www.youtube.com/watch?v=abc";
        let resolver = MockResolver::new().with_media(url, MediaInfo {
            webpage_url: Some(url.to_string()),
            ..media("Song", 180)
        });
        let (f, _dir) = fixture(resolver).await;

        let outcome = f.jukebox.enqueue_from_query(&REQ, url).await.unwrap();
        assert_eq!(outcome.added, 1);

        wait_until(|| f.gateway.plays() == vec!["Song"]).await;
        let now = f.jukebox.now_playing(GUILD).await.unwrap().unwrap();
        assert_eq!(now.title(), "Song");
        assert_eq!(now.duration_secs(), 180);
        assert_eq!(now.requested_by(), USER);
        assert_eq!(f.notifier.count(|n| matches!(n, SessionNotice::NowPlaying { .. })), 1);
    }

    #[tokio::test]
    async fn test_playlist_import_shuffles_same_set() {
        let url = "https://www.youtube.com/playlist?list=PL1";
        let entries: Vec<MediaInfo> = (1..=5).map(|i| media(&format!("t{i}"), 200)).collect();
        let resolver = MockResolver::new().with_playlist(url, entries);
        let (store, _dir) = temp_store().await;
        let f = fixture_with(resolver, Arc::new(store), true);

        let outcome = f.jukebox.enqueue_from_query(&REQ, url).await.unwrap();
        assert_eq!(outcome.added, 5);
        assert!(outcome.shuffled);

        wait_until(|| f.gateway.plays().len() == 1).await;
        let page = f.jukebox.queue_page(GUILD, 1, 10).await.unwrap();
        let mut titles: Vec<String> = page.tracks.iter().map(|t| t.title().to_string()).collect();
        titles.extend(f.gateway.plays());
        titles.sort();
        assert_eq!(titles, vec!["t1", "t2", "t3", "t4", "t5"]);
    }

    #[tokio::test]
    async fn test_free_text_takes_top_hit() {
        let resolver = MockResolver::new().with_search("lofi beats", vec![media("first", 100), media("second", 100)]);
        let (f, _dir) = fixture(resolver).await;

        f.jukebox.enqueue_from_query(&REQ, "lofi beats").await.unwrap();
        wait_until(|| f.gateway.plays() == vec!["first"]).await;
        assert_eq!(f.resolver.searched(), vec!["lofi beats"]);
    }

    #[tokio::test]
    async fn test_enqueue_preconditions() {
        let (f, _dir) = fixture(MockResolver::new()).await;
        let absent = Requester { voice: None, ..REQ };
        assert_eq!(
            f.jukebox.enqueue_from_query(&absent, "anything").await,
            Err(CommandError::NotInVoice)
        );
        assert_eq!(
            f.jukebox.enqueue_from_query(&REQ, "nothing matches").await,
            Err(CommandError::NoResults)
        );
    }

    #[tokio::test]
    async fn test_overlong_tracks_are_refused() {
        let resolver = MockResolver::new().with_search("epic", vec![media("Ten hours", 36_000)]);
        let (f, _dir) = fixture(resolver).await;
        assert_eq!(
            f.jukebox.enqueue_from_query(&REQ, "epic").await,
            Err(CommandError::TooLong { limit_secs: 600 })
        );
    }

    #[tokio::test]
    async fn test_catalog_links() {
        let link = "https://open.spotify.com/album/xyz";
        let (f, _dir) = fixture(MockResolver::new()).await;
        assert_eq!(
            f.jukebox.enqueue_from_query(&REQ, link).await,
            Err(CommandError::CatalogUnavailable)
        );

        let resolver = MockResolver::new()
            .with_search("Artist A Artist B - One official audio", vec![media("One (Official)", 200)])
            .with_search("Artist A - Two official audio", vec![media("Two (Official)", 200)]);
        let catalog = MockCatalog::new().with_tracks(
            link,
            vec![
                CatalogTrack {
                    title: "One".to_string(),
                    artists: vec!["Artist A".to_string(), "Artist B".to_string()],
                    album: Some("Album".to_string()),
                    duration_ms: 200_000,
                    external_url: None,
                    thumbnail: None,
                },
                CatalogTrack {
                    title: "Missing".to_string(),
                    artists: vec!["Nobody".to_string()],
                    album: None,
                    duration_ms: 1,
                    external_url: None,
                    thumbnail: None,
                },
                CatalogTrack {
                    title: "Two".to_string(),
                    artists: vec!["Artist A".to_string()],
                    album: None,
                    duration_ms: 200_000,
                    external_url: None,
                    thumbnail: Some("https://img/two.jpg".to_string()),
                },
            ],
        );
        let (store, _dir) = temp_store().await;
        let f = fixture_with(resolver, Arc::new(store), false);
        let jukebox = f.jukebox.with_catalog(Arc::new(catalog));

        let outcome = jukebox.enqueue_from_query(&REQ, link).await.unwrap();
        assert_eq!(outcome.added, 2);
        wait_until(|| f.gateway.plays() == vec!["One (Official)"]).await;

        let page = jukebox.queue_page(GUILD, 1, 10).await.unwrap();
        assert_eq!(page.tracks[0].title(), "Two (Official)");
        assert_eq!(page.tracks[0].origin(), TrackOrigin::Spotify);
        assert_eq!(page.tracks[0].thumbnail_url(), Some("https://img/two.jpg"));
    }

    #[tokio::test]
    async fn test_like_and_dislike() {
        let resolver = MockResolver::new().with_search("song", vec![media("Song", 100)]);
        let (f, _dir) = fixture(resolver).await;
        assert_eq!(f.jukebox.like(USER, GUILD).await, Err(CommandError::NothingPlaying));

        f.jukebox.enqueue_from_query(&REQ, "song").await.unwrap();
        wait_until(|| f.gateway.plays().len() == 1).await;

        let liked = f.jukebox.like(USER, GUILD).await.unwrap();
        assert_eq!(liked.track.title(), "Song");
        assert!(!liked.skipped);

        let summary = f.jukebox.preference_summary(USER, GUILD).await.unwrap();
        assert_eq!(summary.liked_count, 1);
        assert_eq!(summary.favorite_artists, vec!["Test Artist"]);

        // Radio is off, so no auto-skip.
        let disliked = f.jukebox.dislike(USER, GUILD).await.unwrap();
        assert!(!disliked.skipped);
    }

    #[tokio::test]
    async fn test_dislike_skips_during_radio() {
        let resolver = MockResolver::new()
            .with_search("jazz playlist", vec![media("Jazz Playlist", 3600)])
            .with_playlist("https://youtu.be/Jazz Playlist", vec![media("j1", 100), media("j2", 100)]);
        let (f, _dir) = fixture(resolver).await;

        let added = f.jukebox.start_radio(&REQ, Some("jazz")).await.unwrap();
        assert_eq!(added, 2);
        wait_until(|| f.gateway.plays() == vec!["j1"]).await;

        let outcome = f.jukebox.dislike(USER, GUILD).await.unwrap();
        assert!(outcome.skipped);
        wait_until(|| f.gateway.plays() == vec!["j1", "j2"]).await;

        f.jukebox.stop_radio(GUILD).await.unwrap();
        assert_eq!(f.jukebox.stop_radio(GUILD).await, Err(CommandError::RadioInactive));
    }

    #[tokio::test]
    async fn test_genre_radio_falls_back_to_search() {
        let resolver = MockResolver::new().with_search("chill music", vec![media("c1", 100)]);
        let (f, _dir) = fixture(resolver).await;

        assert_eq!(f.jukebox.start_radio(&REQ, Some("chill")).await, Ok(1));
        assert!(f.resolver.searched().contains(&"chill music".to_string()));
    }

    #[tokio::test]
    async fn test_personal_radio_needs_history() {
        let (f, _dir) = fixture(MockResolver::new()).await;
        assert_eq!(f.jukebox.start_radio(&REQ, None).await, Err(CommandError::NoPreferences));
        assert!(!f.jukebox.summary(GUILD).await.unwrap().radio_active);
    }

    #[tokio::test]
    async fn test_personal_radio_first_batch_drops_avoided_artists() {
        let (store, _dir) = temp_store().await;
        let store = Arc::new(store);
        let skipped = Track::new("Old", "https://youtu.be/old", USER).with_uploader("Skippy");
        store
            .add_play_history(&PlayRecord::for_track(GUILD, &skipped, true))
            .await
            .unwrap();

        let hits = vec![
            MediaInfo {
                uploader: Some("Skippy".to_string()),
                ..media("Skip me", 200)
            },
            MediaInfo {
                uploader: Some("Fine".to_string()),
                ..media("Keep me", 200)
            },
        ];
        let mut resolver = MockResolver::new();
        for query in popular_queries(chrono::Utc::now().year()) {
            resolver = resolver.with_search(&query, hits.clone());
        }
        let f = fixture_with_radio(resolver, store, false, |engine| -> Arc<dyn RadioSource> {
            Arc::new(RadioGenerator::new(engine))
        });

        assert_eq!(f.jukebox.start_radio(&REQ, None).await, Ok(1));
        wait_until(|| f.gateway.plays() == vec!["Keep me"]).await;
        assert!(f.jukebox.summary(GUILD).await.unwrap().radio_active);
    }

    #[tokio::test]
    async fn test_personal_radio_uses_session_radio_source() {
        let (store, _dir) = temp_store().await;
        let radio = Arc::new(MockRadio::new().with_batch(vec![mock_track("r1"), mock_track("r2")]));
        let source = radio.clone();
        let f = fixture_with_radio(MockResolver::new(), Arc::new(store), false, move |_| -> Arc<dyn RadioSource> {
            source
        });

        assert_eq!(f.jukebox.start_radio(&REQ, None).await, Ok(2));
        assert_eq!(radio.calls(), 1);
        wait_until(|| f.gateway.plays() == vec!["r1"]).await;
    }

    #[tokio::test]
    async fn test_recommend_validates_count() {
        let (f, _dir) = fixture(MockResolver::new()).await;
        let err = f.jukebox.recommend(USER, GUILD, 0).await.unwrap_err();
        assert_eq!(err, CommandError::InvalidCount { min: 1, max: 20 });
        assert!(f.jukebox.recommend(USER, GUILD, 21).await.is_err());
        assert!(f.jukebox.recommend(USER, GUILD, 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_loop_mode_by_name() {
        let (f, _dir) = fixture(MockResolver::new()).await;
        assert_eq!(f.jukebox.set_loop_mode(GUILD, "queue").await, Ok(LoopMode::Queue));
        assert_eq!(
            f.jukebox.set_loop_mode(GUILD, "forever").await,
            Err(CommandError::InvalidLoopMode("forever".to_string()))
        );
        assert_eq!(f.jukebox.loop_mode(GUILD).await, Ok(LoopMode::Queue));
        assert_eq!(f.jukebox.shuffle(GUILD).await, Err(CommandError::QueueEmpty));
    }

    #[tokio::test]
    async fn test_favorites_flow() {
        let resolver = MockResolver::new().with_search("fav", vec![media("Fav", 100)]);
        let (f, _dir) = fixture(resolver).await;
        assert_eq!(f.jukebox.add_favorite(USER, GUILD).await, Err(CommandError::NothingPlaying));

        f.jukebox.enqueue_from_query(&REQ, "fav").await.unwrap();
        wait_until(|| f.gateway.plays().len() == 1).await;

        let (track, added) = f.jukebox.add_favorite(USER, GUILD).await.unwrap();
        assert_eq!(track.title(), "Fav");
        assert_eq!(added, FavoriteAdded::Added);
        let (_, again) = f.jukebox.add_favorite(USER, GUILD).await.unwrap();
        assert_eq!(again, FavoriteAdded::AlreadyPresent);

        let outcome = f.jukebox.play_favorites(&REQ, Some(0)).await.unwrap();
        assert_eq!(outcome.added, 1);
        assert_eq!(
            f.jukebox.play_favorites(&REQ, Some(3)).await,
            Err(CommandError::NoSuchFavorite)
        );

        assert_eq!(f.jukebox.remove_favorite(USER, GUILD, 0).await.unwrap().title, "Fav");
        assert_eq!(f.jukebox.clear_favorites(USER, GUILD).await, Ok(0));
        assert_eq!(f.jukebox.play_favorites(&REQ, None).await, Err(CommandError::NoResults));
    }

    #[tokio::test]
    async fn test_store_failure_is_generic() {
        let resolver = MockResolver::new().with_search("song", vec![media("Song", 100)]);
        let f = fixture_with(resolver, Arc::new(FailingPreferenceStore), false);

        f.jukebox.enqueue_from_query(&REQ, "song").await.unwrap();
        wait_until(|| f.gateway.plays().len() == 1).await;

        assert_eq!(
            f.jukebox.like(USER, GUILD).await,
            Err(CommandError::PreferencesUnavailable)
        );
        // Recommendations degrade instead of failing.
        assert!(f.jukebox.recommend(USER, GUILD, 3).await.is_ok());
    }
}
