//! Test utilities and fixtures for guild-music tests.
//!
//! This module provides fixtures, mock collaborators for every trait seam
//! (resolver, catalog, voice, notifier, preferences, radio) and a polling
//! helper for asserting on work done by session tasks.
//!
//! # Example
//!
//! ```ignore
//! use guild_music::test_utils::{MockGateway, mock_context, wait_until};
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let gateway = MockGateway::new();
//!     // ... build a session, enqueue, then
//!     wait_until(|| gateway.plays().len() == 1).await;
//! }
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::sync::Semaphore;

use crate::catalog::{CatalogClient, CatalogError, CatalogTrack};
use crate::model::{ChannelId, MediaInfo, TenantId, Track, UserId};
use crate::notify::{Notifier, SessionNotice};
use crate::preferences::{
    ArtistScore, Favorite, FavoriteAdded, PlayRecord, PreferenceStore, RatedSong, Rating,
    SqlitePreferenceStore, StoreError, db_url,
};
use crate::radio::RadioSource;
use crate::resolver::{ResolveError, Resolver, StreamHandle};
use crate::session::{SessionContext, SessionSettings};
use crate::transport::{
    CompletionNotifier, PlaybackOutcome, PlaybackSource, Transport, TransportError, VoiceGateway,
};

/// Creates a preference store backed by a temporary database.
///
/// The database lives in a temporary directory that is removed when the
/// returned `TempDir` is dropped. Migrations are run automatically.
///
/// ```ignore
/// let (store, _dir) = temp_store().await;
/// // Database is deleted when _dir goes out of scope
/// ```
pub async fn temp_store() -> (SqlitePreferenceStore, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let url = db_url(&dir.path().join("test.db"));
    let store = SqlitePreferenceStore::open(&url)
        .await
        .expect("Failed to initialize test database");
    (store, dir)
}

/// A three-minute track by "Test Artist" at `https://youtu.be/<name>`.
pub fn mock_track(name: &str) -> Track {
    Track::new(name, format!("https://youtu.be/{name}"), UserId(1))
        .with_duration(180)
        .with_uploader("Test Artist")
}

/// A search hit or direct lookup result with sensible defaults.
///
/// Customize with struct update syntax:
///
/// ```ignore
/// let info = MediaInfo { uploader: None, ..mock_media("Song", "https://youtu.be/s") };
/// ```
pub fn mock_media(title: &str, url: &str) -> MediaInfo {
    MediaInfo {
        title: Some(title.to_string()),
        webpage_url: Some(url.to_string()),
        url: None,
        duration_secs: Some(180),
        thumbnail: None,
        uploader: Some("Test Artist".to_string()),
    }
}

/// Poll `condition` until it holds, panicking after about a second.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met in time");
}

/// Session context wired to inert mocks.
pub fn mock_context() -> SessionContext {
    SessionContext {
        resolver: Arc::new(MockResolver::new()),
        gateway: Arc::new(MockGateway::new()),
        notifier: Arc::new(RecordingNotifier::new()),
        preferences: Arc::new(FailingPreferenceStore),
        radio: Arc::new(MockRadio::new()),
        settings: SessionSettings::default(),
    }
}

// ============================================================================
// Resolver
// ============================================================================

#[derive(Default)]
struct ResolverLog {
    direct: usize,
    searched: Vec<String>,
    streams: usize,
}

/// Canned resolver. Unknown searches return no hits; unknown direct and
/// playlist lookups fail with `NotFound`.
#[derive(Default)]
pub struct MockResolver {
    media: HashMap<String, MediaInfo>,
    playlists: HashMap<String, Vec<MediaInfo>>,
    searches: HashMap<String, Vec<MediaInfo>>,
    failing_searches: HashSet<String>,
    failing_streams: HashSet<String>,
    held_streams: HashSet<String>,
    gate: StreamGate,
    log: Mutex<ResolverLog>,
}

/// Releases stream lookups parked by [`MockResolver::hold_stream`].
#[derive(Clone)]
pub struct StreamGate(Arc<Semaphore>);

impl Default for StreamGate {
    fn default() -> Self {
        Self(Arc::new(Semaphore::new(0)))
    }
}

impl StreamGate {
    /// Let every held lookup, current and future, complete.
    pub fn release(&self) {
        self.0.add_permits(1024);
    }

    async fn pass(&self) {
        if let Ok(permit) = self.0.acquire().await {
            drop(permit);
        }
    }
}

impl MockResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_media(mut self, url: &str, info: MediaInfo) -> Self {
        self.media.insert(url.to_string(), info);
        self
    }

    pub fn with_playlist(mut self, url: &str, entries: Vec<MediaInfo>) -> Self {
        self.playlists.insert(url.to_string(), entries);
        self
    }

    pub fn with_search(mut self, query: &str, hits: Vec<MediaInfo>) -> Self {
        self.searches.insert(query.to_string(), hits);
        self
    }

    /// Make `query` fail with a process error.
    pub fn fail_search(mut self, query: &str) -> Self {
        self.failing_searches.insert(query.to_string());
        self
    }

    /// Make stream resolution for `locator` fail.
    pub fn fail_stream(mut self, locator: &str) -> Self {
        self.failing_streams.insert(locator.to_string());
        self
    }

    /// Park stream resolution for `locator` until the gate is released.
    pub fn hold_stream(mut self, locator: &str) -> Self {
        self.held_streams.insert(locator.to_string());
        self
    }

    pub fn stream_gate(&self) -> StreamGate {
        self.gate.clone()
    }

    pub fn direct_calls(&self) -> usize {
        self.log.lock().direct
    }

    /// Every query searched, in order, failures included.
    pub fn searched(&self) -> Vec<String> {
        self.log.lock().searched.clone()
    }

    pub fn stream_calls(&self) -> usize {
        self.log.lock().streams
    }
}

#[async_trait]
impl Resolver for MockResolver {
    async fn resolve_direct(&self, url: &str) -> Result<MediaInfo, ResolveError> {
        self.log.lock().direct += 1;
        self.media
            .get(url)
            .cloned()
            .ok_or_else(|| ResolveError::NotFound(url.to_string()))
    }

    async fn resolve_playlist(
        &self,
        url: &str,
        max_items: usize,
    ) -> Result<Vec<MediaInfo>, ResolveError> {
        let entries = self
            .playlists
            .get(url)
            .ok_or_else(|| ResolveError::NotFound(url.to_string()))?;
        Ok(entries.iter().take(max_items).cloned().collect())
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<MediaInfo>, ResolveError> {
        self.log.lock().searched.push(query.to_string());
        if self.failing_searches.contains(query) {
            return Err(ResolveError::Process(format!("search failed: {query}")));
        }
        Ok(self
            .searches
            .get(query)
            .map(|hits| hits.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn stream_locator(&self, locator: &str) -> Result<StreamHandle, ResolveError> {
        self.log.lock().streams += 1;
        if self.held_streams.contains(locator) {
            self.gate.pass().await;
        }
        if self.failing_streams.contains(locator) {
            return Err(ResolveError::NoStream(locator.to_string()));
        }
        Ok(StreamHandle::new(format!("stream:{locator}")))
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// Canned catalog: link → tracks. Unknown links are `NotFound`.
#[derive(Default)]
pub struct MockCatalog {
    links: HashMap<String, Vec<CatalogTrack>>,
}

impl MockCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tracks(mut self, url: &str, tracks: Vec<CatalogTrack>) -> Self {
        self.links.insert(url.to_string(), tracks);
        self
    }
}

#[async_trait]
impl CatalogClient for MockCatalog {
    async fn fetch_tracks(&self, url: &str) -> Result<Vec<CatalogTrack>, CatalogError> {
        self.links.get(url).cloned().ok_or(CatalogError::NotFound)
    }
}

// ============================================================================
// Voice
// ============================================================================

/// What a mock transport was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Connect(ChannelId),
    Move(ChannelId),
    /// Track title
    Play(String),
    Pause,
    Resume,
    Stop,
    Disconnect,
    /// Percent
    Volume(u8),
}

#[derive(Default)]
struct GatewayState {
    calls: Vec<TransportCall>,
    plays: Vec<String>,
    pending: Option<CompletionNotifier>,
    fail_connect: bool,
    failing_plays: HashSet<String>,
    volume: f32,
}

impl GatewayState {
    fn take_pending(&mut self) -> Option<CompletionNotifier> {
        self.pending.take()
    }
}

/// Records every transport call. Clones share state, so a test keeps one
/// handle while the session owns another.
#[derive(Clone, Default)]
pub struct MockGateway {
    state: Arc<Mutex<GatewayState>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse the next connections.
    pub fn fail_connect(&self) {
        self.state.lock().fail_connect = true;
    }

    /// Refuse to start tracks titled `title`.
    pub fn fail_play(&self, title: &str) {
        self.state.lock().failing_plays.insert(title.to_string());
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.state.lock().calls.clone()
    }

    /// Titles started, in order.
    pub fn plays(&self) -> Vec<String> {
        self.state.lock().plays.clone()
    }

    /// End the current stream as if it played out. False when nothing was
    /// playing.
    pub fn finish(&self) -> bool {
        let pending = self.state.lock().take_pending();
        match pending {
            Some(notifier) => {
                notifier.notify(PlaybackOutcome::Finished);
                true
            }
            None => false,
        }
    }

    /// Volume of the last play or volume change.
    pub fn volume(&self) -> f32 {
        self.state.lock().volume
    }
}

#[async_trait]
impl VoiceGateway for MockGateway {
    async fn connect(
        &self,
        _tenant: TenantId,
        channel: ChannelId,
    ) -> Result<Box<dyn Transport>, TransportError> {
        let mut state = self.state.lock();
        if state.fail_connect {
            return Err(TransportError::ConnectFailed(channel, "refused".to_string()));
        }
        state.calls.push(TransportCall::Connect(channel));
        Ok(Box::new(MockTransport {
            channel,
            state: self.state.clone(),
            connected: true,
            playing: false,
            paused: false,
        }))
    }
}

struct MockTransport {
    channel: ChannelId,
    state: Arc<Mutex<GatewayState>>,
    connected: bool,
    playing: bool,
    paused: bool,
}

impl MockTransport {
    fn record(&self, call: TransportCall) {
        self.state.lock().calls.push(call);
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn channel(&self) -> ChannelId {
        self.channel
    }

    async fn move_to(&mut self, channel: ChannelId) -> Result<(), TransportError> {
        self.record(TransportCall::Move(channel));
        self.channel = channel;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.stop();
        self.record(TransportCall::Disconnect);
        self.connected = false;
        Ok(())
    }

    async fn play(
        &mut self,
        source: PlaybackSource,
        volume: f32,
        on_complete: CompletionNotifier,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.failing_plays.contains(&source.title) {
            return Err(TransportError::Playback(format!("cannot play {}", source.title)));
        }
        state.calls.push(TransportCall::Play(source.title.clone()));
        state.plays.push(source.title);
        state.pending = Some(on_complete);
        state.volume = volume;
        drop(state);

        self.playing = true;
        self.paused = false;
        Ok(())
    }

    fn pause(&mut self) -> Result<(), TransportError> {
        self.record(TransportCall::Pause);
        self.paused = true;
        Ok(())
    }

    fn resume(&mut self) -> Result<(), TransportError> {
        self.record(TransportCall::Resume);
        self.paused = false;
        Ok(())
    }

    fn stop(&mut self) {
        let pending = {
            let mut state = self.state.lock();
            state.calls.push(TransportCall::Stop);
            state.take_pending()
        };
        self.playing = false;
        self.paused = false;
        if let Some(notifier) = pending {
            notifier.notify(PlaybackOutcome::Stopped);
        }
    }

    fn is_playing(&self) -> bool {
        self.playing && !self.paused
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn set_volume(&mut self, volume: f32) {
        let mut state = self.state.lock();
        state.calls.push(TransportCall::Volume((volume * 100.0).round() as u8));
        state.volume = volume;
    }
}

// ============================================================================
// Notifier
// ============================================================================

/// Keeps every notice with the channel it was sent to.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(Option<ChannelId>, SessionNotice)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<SessionNotice> {
        self.sent.lock().iter().map(|(_, n)| n.clone()).collect()
    }

    pub fn count(&self, predicate: impl Fn(&SessionNotice) -> bool) -> usize {
        self.sent.lock().iter().filter(|(_, n)| predicate(n)).count()
    }

    pub fn channels(&self) -> Vec<Option<ChannelId>> {
        self.sent.lock().iter().map(|(c, _)| *c).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, _tenant: TenantId, channel: Option<ChannelId>, notice: SessionNotice) {
        self.sent.lock().push((channel, notice));
    }
}

// ============================================================================
// Preferences
// ============================================================================

/// A store whose every call fails, for degraded-path tests.
pub struct FailingPreferenceStore;

fn unavailable<T>() -> Result<T, StoreError> {
    Err(StoreError::Corrupt("store unavailable".to_string()))
}

#[async_trait]
impl PreferenceStore for FailingPreferenceStore {
    async fn add_rating(
        &self,
        _user: UserId,
        _tenant: TenantId,
        _title: &str,
        _locator: &str,
        _rating: Rating,
        _artist: Option<&str>,
    ) -> Result<(), StoreError> {
        unavailable()
    }

    async fn liked_songs(&self, _: UserId, _: TenantId, _: usize) -> Result<Vec<RatedSong>, StoreError> {
        unavailable()
    }

    async fn disliked_songs(&self, _: UserId, _: TenantId, _: usize) -> Result<Vec<RatedSong>, StoreError> {
        unavailable()
    }

    async fn liked_count(&self, _: UserId, _: TenantId) -> Result<usize, StoreError> {
        unavailable()
    }

    async fn favorite_artists(&self, _: UserId, _: TenantId, _: usize) -> Result<Vec<ArtistScore>, StoreError> {
        unavailable()
    }

    async fn disliked_artists(&self, _: UserId, _: TenantId) -> Result<Vec<String>, StoreError> {
        unavailable()
    }

    async fn artist_score(&self, _: UserId, _: TenantId, _: &str) -> Result<Option<i64>, StoreError> {
        unavailable()
    }

    async fn add_play_history(&self, _: &PlayRecord) -> Result<(), StoreError> {
        unavailable()
    }

    async fn skip_rate(&self, _: UserId, _: TenantId, _: &str) -> Result<f64, StoreError> {
        unavailable()
    }

    async fn add_favorite(&self, _: UserId, _: TenantId, _: &Track, _: usize) -> Result<FavoriteAdded, StoreError> {
        unavailable()
    }

    async fn favorites(&self, _: UserId, _: TenantId) -> Result<Vec<Favorite>, StoreError> {
        unavailable()
    }

    async fn remove_favorite(&self, _: UserId, _: TenantId, _: usize) -> Result<Option<Favorite>, StoreError> {
        unavailable()
    }

    async fn clear_favorites(&self, _: UserId, _: TenantId) -> Result<u64, StoreError> {
        unavailable()
    }
}

// ============================================================================
// Radio
// ============================================================================

#[derive(Default)]
struct RadioLog {
    calls: usize,
    last_seed: Option<String>,
}

/// Hands out queued batches in order, then empty ones.
#[derive(Default)]
pub struct MockRadio {
    batches: Mutex<VecDeque<Vec<Track>>>,
    log: Mutex<RadioLog>,
}

impl MockRadio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch(self, tracks: Vec<Track>) -> Self {
        self.batches.lock().push_back(tracks);
        self
    }

    pub fn calls(&self) -> usize {
        self.log.lock().calls
    }

    /// Title of the seed passed to the latest refill.
    pub fn last_seed(&self) -> Option<String> {
        self.log.lock().last_seed.clone()
    }
}

#[async_trait]
impl RadioSource for MockRadio {
    async fn refill(&self, _user: UserId, _tenant: TenantId, seed: Option<Track>, size: usize) -> Vec<Track> {
        {
            let mut log = self.log.lock();
            log.calls += 1;
            log.last_seed = seed.map(|t| t.title().to_string());
        }
        let mut batch = self.batches.lock().pop_front().unwrap_or_default();
        batch.truncate(size);
        batch
    }
}
