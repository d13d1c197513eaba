//! Recommendation engine.
//!
//! Blends three search strategies seeded by a user's ratings:
//!
//! - **favorite artists**: "<artist> popular songs" for the top 3 artists
//! - **similar songs**: "<title> similar songs" for a random sample of likes
//! - **exploration**: "<genre> music" for genre words found in liked titles
//!   (or the most recently liked artist when none match)
//!
//! Users without likes get generic popular searches instead. Every search
//! is best effort with its own timeout: a failing branch contributes
//! nothing rather than failing the request.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Datelike;
use rand::seq::{IndexedRandom, SliceRandom};

use crate::model::{MediaInfo, TenantId, Track, UserId};
use crate::preferences::{ArtistScore, PreferenceStore, RatedSong};
use crate::resolver::Resolver;

/// Liked songs considered per request.
const LIKED_WINDOW: usize = 20;
/// Favorite artists fetched; only the first [`TOP_ARTISTS`] are searched.
const FAVORITE_WINDOW: usize = 5;
const TOP_ARTISTS: usize = 3;
const RESULTS_PER_ARTIST: usize = 3;
const SIMILAR_SAMPLE: usize = 5;
const RESULTS_PER_SIMILAR: usize = 2;
const MAX_KEYWORDS: usize = 3;
const RESULTS_PER_KEYWORD: usize = 2;
/// Query variants tried by [`RecommendationEngine::find_playlist`].
const PLAYLIST_VARIANTS: usize = 2;

/// Genre words searched for in liked titles.
pub const GENRE_KEYWORDS: &[&str] = &[
    "rock", "pop", "jazz", "classical", "electronic", "hip hop", "country", "reggae", "blues",
    "metal", "indie", "folk", "r&b", "soul", "funk", "disco", "house", "techno", "dubstep", "rap",
    "latin", "salsa", "reggaeton", "bachata", "cumbia",
];

/// Title words that mark a result as a playlist-like compilation.
const PLAYLIST_SIGNALS: &[&str] = &["playlist", "mix", "compilation", "best of", "top"];

/// Generic queries for users without history.
pub fn popular_queries(year: i32) -> Vec<String> {
    vec![
        format!("top hits {year}"),
        "popular music".to_string(),
        "trending songs".to_string(),
        format!("best songs {year}"),
    ]
}

/// Genre keywords found in liked titles, by title and then in genre-list
/// order, falling back to the artist of the most recent like.
pub fn extract_keywords(liked: &[RatedSong]) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    for song in liked {
        let title = song.title.to_lowercase();
        for genre in GENRE_KEYWORDS {
            if title.contains(genre) && !keywords.iter().any(|k| k == genre) {
                keywords.push((*genre).to_string());
            }
        }
    }

    if keywords.is_empty()
        && let Some(artist) = liked.first().and_then(|s| s.artist.clone())
        && !artist.is_empty()
    {
        keywords.push(artist);
    }
    keywords
}

fn is_playlist_like(media: &MediaInfo) -> bool {
    let title = media.title.as_deref().unwrap_or_default().to_lowercase();
    PLAYLIST_SIGNALS.iter().any(|signal| title.contains(signal))
}

/// Drop repeats of the same locator, keeping the first.
fn dedupe_by_locator(items: Vec<MediaInfo>) -> Vec<MediaInfo> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|m| match m.locator() {
            Some(loc) => seen.insert(loc.to_string()),
            None => false,
        })
        .collect()
}

fn shuffle_truncate(mut items: Vec<MediaInfo>, count: usize) -> Vec<MediaInfo> {
    items.shuffle(&mut rand::rng());
    items.truncate(count);
    items
}

/// Preference-driven recommendations.
pub struct RecommendationEngine {
    store: Arc<dyn PreferenceStore>,
    resolver: Arc<dyn Resolver>,
    search_timeout: Duration,
}

impl RecommendationEngine {
    pub fn new(
        store: Arc<dyn PreferenceStore>,
        resolver: Arc<dyn Resolver>,
        search_timeout: Duration,
    ) -> Self {
        Self {
            store,
            resolver,
            search_timeout,
        }
    }

    /// Best-effort search: failures and timeouts yield no results.
    async fn search(&self, query: &str, limit: usize) -> Vec<MediaInfo> {
        match tokio::time::timeout(self.search_timeout, self.resolver.search(query, limit)).await {
            Ok(Ok(results)) => results,
            Ok(Err(e)) => {
                tracing::warn!(target: "recommend", query, error = %e, "Search failed");
                Vec::new()
            }
            Err(_) => {
                tracing::warn!(target: "recommend", query, "Search timed out");
                Vec::new()
            }
        }
    }

    /// Up to `count` candidates for the user, shuffled.
    pub async fn recommendations(
        &self,
        user: UserId,
        tenant: TenantId,
        count: usize,
    ) -> Vec<MediaInfo> {
        if count == 0 {
            return Vec::new();
        }

        let liked = match self.store.liked_songs(user, tenant, LIKED_WINDOW).await {
            Ok(liked) => liked,
            Err(e) => {
                tracing::warn!(target: "recommend", %user, %tenant, error = %e, "Couldn't read likes");
                Vec::new()
            }
        };
        let disliked: HashSet<String> = self
            .store
            .disliked_artists(user, tenant)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(target: "recommend", error = %e, "Couldn't read disliked artists");
                Vec::new()
            })
            .into_iter()
            .collect();

        if liked.is_empty() {
            tracing::info!(target: "recommend", %user, %tenant, "No likes yet, using popular music");
            return self.popular(count, &disliked).await;
        }

        let favorites = self
            .store
            .favorite_artists(user, tenant, FAVORITE_WINDOW)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(target: "recommend", error = %e, "Couldn't read favorite artists");
                Vec::new()
            });

        let share = count * 2 / 5;
        let mut candidates = self.from_favorite_artists(&favorites, &disliked, share).await;
        candidates.extend(self.similar_songs(&liked, &disliked, share).await);
        let remaining = count.saturating_sub(candidates.len());
        candidates.extend(self.explore(&liked, &disliked, remaining).await);

        let candidates = dedupe_by_locator(candidates);
        tracing::debug!(target: "recommend", %user, %tenant, found = candidates.len(), count, "Blended recommendations");
        shuffle_truncate(candidates, count)
    }

    async fn from_favorite_artists(
        &self,
        favorites: &[ArtistScore],
        disliked: &HashSet<String>,
        target: usize,
    ) -> Vec<MediaInfo> {
        let mut found = Vec::new();
        if target == 0 {
            return found;
        }
        for fav in favorites.iter().take(TOP_ARTISTS) {
            if disliked.contains(&fav.artist) {
                continue;
            }
            let query = format!("{} popular songs", fav.artist);
            found.extend(
                self.search(&query, RESULTS_PER_ARTIST)
                    .await
                    .into_iter()
                    .filter(|m| !disliked.contains(m.uploader_or_unknown())),
            );
            if found.len() >= target {
                break;
            }
        }
        found.truncate(target);
        found
    }

    async fn similar_songs(
        &self,
        liked: &[RatedSong],
        disliked: &HashSet<String>,
        target: usize,
    ) -> Vec<MediaInfo> {
        let mut found = Vec::new();
        if target == 0 {
            return found;
        }
        let sample: Vec<String> = liked
            .choose_multiple(&mut rand::rng(), SIMILAR_SAMPLE.min(liked.len()))
            .map(|song| song.title.clone())
            .collect();

        for title in sample {
            let query = format!("{} similar songs", title);
            found.extend(
                self.search(&query, RESULTS_PER_SIMILAR)
                    .await
                    .into_iter()
                    .filter(|m| !disliked.contains(m.uploader_or_unknown())),
            );
            if found.len() >= target {
                break;
            }
        }
        found.truncate(target);
        found
    }

    async fn explore(
        &self,
        liked: &[RatedSong],
        disliked: &HashSet<String>,
        target: usize,
    ) -> Vec<MediaInfo> {
        let mut found = Vec::new();
        if target == 0 {
            return found;
        }
        for keyword in extract_keywords(liked).into_iter().take(MAX_KEYWORDS) {
            let query = format!("{} music", keyword);
            found.extend(
                self.search(&query, RESULTS_PER_KEYWORD)
                    .await
                    .into_iter()
                    .filter(|m| !disliked.contains(m.uploader_or_unknown())),
            );
            if found.len() >= target {
                break;
            }
        }
        found.truncate(target);
        found
    }

    async fn popular(&self, count: usize, disliked: &HashSet<String>) -> Vec<MediaInfo> {
        let queries = popular_queries(chrono::Utc::now().year());
        let Some(query) = queries.choose(&mut rand::rng()).cloned() else {
            return Vec::new();
        };
        let mut results: Vec<MediaInfo> = self
            .search(&query, count)
            .await
            .into_iter()
            .filter(|m| !disliked.contains(m.uploader_or_unknown()))
            .collect();
        results.truncate(count);
        results
    }

    /// Playlist-like results for a free-text query ("rock", "hits 2010").
    pub async fn find_playlist(&self, query: &str, limit: usize) -> Vec<MediaInfo> {
        let variants = [
            format!("{query} playlist"),
            format!("{query} mix"),
            format!("best {query}"),
            format!("{query} compilation"),
        ];

        let mut found = Vec::new();
        for variant in variants.iter().take(PLAYLIST_VARIANTS) {
            found.extend(
                self.search(variant, limit * 2)
                    .await
                    .into_iter()
                    .filter(is_playlist_like),
            );
            if found.len() >= limit {
                break;
            }
        }
        found.truncate(limit);
        found
    }

    /// A radio batch: "<seed> radio" results for half the batch (when a
    /// seed is given), topped up with recommendations, shuffled.
    pub async fn radio_queue(
        &self,
        user: UserId,
        tenant: TenantId,
        seed: Option<&Track>,
        size: usize,
    ) -> Vec<MediaInfo> {
        let mut queue = Vec::new();
        if let Some(seed) = seed {
            let query = format!("{} radio", seed.title());
            queue.extend(self.search(&query, size / 2).await);
        }
        let remaining = size.saturating_sub(queue.len());
        queue.extend(self.recommendations(user, tenant, remaining).await);

        shuffle_truncate(dedupe_by_locator(queue), size)
    }

    /// Whether radio should steer away from an artist. Store failures count
    /// as "no".
    pub async fn should_avoid_artist(&self, user: UserId, tenant: TenantId, artist: &str) -> bool {
        self.store
            .should_avoid_artist(user, tenant, artist)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(target: "recommend", error = %e, "Couldn't check artist avoidance");
                false
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preferences::{Rating, SqlitePreferenceStore};
    use crate::test_utils::{FailingPreferenceStore, MockResolver, mock_media, temp_store};
    use tempfile::TempDir;

    const USER: UserId = UserId(1);
    const GUILD: TenantId = TenantId(7);

    fn media(id: &str, uploader: &str) -> MediaInfo {
        MediaInfo {
            uploader: Some(uploader.to_string()),
            ..mock_media(id, &format!("https://youtu.be/{id}"))
        }
    }

    fn rated(title: &str, artist: Option<&str>) -> RatedSong {
        RatedSong {
            title: title.to_string(),
            locator: format!("https://youtu.be/{title}"),
            artist: artist.map(String::from),
            rating: Rating::Like,
            rated_at: String::new(),
        }
    }

    fn engine(store: Arc<dyn PreferenceStore>, resolver: Arc<MockResolver>) -> RecommendationEngine {
        RecommendationEngine::new(store, resolver, Duration::from_secs(5))
    }

    async fn rate(store: &SqlitePreferenceStore, title: &str, artist: &str, rating: Rating) {
        store
            .add_rating(USER, GUILD, title, &format!("https://youtu.be/{title}"), rating, Some(artist))
            .await
            .unwrap();
    }

    /// Five likes across three artists, plus a disliked "Spam" uploader.
    async fn seeded_store() -> (Arc<SqlitePreferenceStore>, TempDir) {
        let (store, dir) = temp_store().await;
        rate(&store, "Alpha One", "Alpha", Rating::Like).await;
        rate(&store, "Alpha Two", "Alpha", Rating::Like).await;
        rate(&store, "Beta Jazz Night", "Beta", Rating::Like).await;
        rate(&store, "Beta Rock Day", "Beta", Rating::Like).await;
        rate(&store, "Gamma Song", "Gamma", Rating::Like).await;
        for i in 0..3 {
            rate(&store, &format!("spam{i}"), "Spam", Rating::Dislike).await;
        }
        (Arc::new(store), dir)
    }

    fn loaded_resolver() -> MockResolver {
        let mut resolver = MockResolver::new();
        for artist in ["Alpha", "Beta", "Gamma"] {
            resolver = resolver.with_search(
                &format!("{artist} popular songs"),
                vec![
                    media(&format!("{artist}-1"), artist),
                    media(&format!("{artist}-spam"), "Spam"),
                    media(&format!("{artist}-2"), artist),
                ],
            );
        }
        for title in ["Alpha One", "Alpha Two", "Beta Jazz Night", "Beta Rock Day", "Gamma Song"] {
            resolver = resolver.with_search(
                &format!("{title} similar songs"),
                vec![media(&format!("{title}-sim"), "Other"), media(&format!("{title}-spam"), "Spam")],
            );
        }
        for genre in ["jazz", "rock"] {
            resolver = resolver.with_search(
                &format!("{genre} music"),
                vec![media(&format!("{genre}-a"), "Genre"), media(&format!("{genre}-b"), "Spam")],
            );
        }
        resolver
    }

    #[tokio::test]
    async fn test_blend_respects_count_and_dislikes() {
        let (store, _dir) = seeded_store().await;
        let resolver = Arc::new(loaded_resolver());
        let engine = engine(store, resolver.clone());

        let recs = engine.recommendations(USER, GUILD, 10).await;
        assert!(!recs.is_empty());
        assert!(recs.len() <= 10);
        assert!(recs.iter().all(|m| m.uploader.as_deref() != Some("Spam")));

        let searched = resolver.searched();
        assert!(searched.iter().any(|q| q.ends_with("popular songs")));
        assert!(searched.iter().any(|q| q.ends_with("similar songs")));
    }

    #[tokio::test]
    async fn test_blend_has_no_duplicate_locators() {
        let (store, _dir) = seeded_store().await;
        // Every strategy returns the same track.
        let same = vec![media("same", "Alpha")];
        let mut resolver = MockResolver::new();
        for q in ["Alpha popular songs", "Beta popular songs", "jazz music", "rock music"] {
            resolver = resolver.with_search(q, same.clone());
        }
        for title in ["Alpha One", "Alpha Two", "Beta Jazz Night", "Beta Rock Day", "Gamma Song"] {
            resolver = resolver.with_search(&format!("{title} similar songs"), same.clone());
        }
        let engine = engine(store, Arc::new(resolver));

        let recs = engine.recommendations(USER, GUILD, 10).await;
        assert_eq!(recs.len(), 1);
    }

    #[tokio::test]
    async fn test_cold_start_uses_popular_only() {
        let (store, _dir) = temp_store().await;
        let mut resolver = MockResolver::new();
        let hits: Vec<MediaInfo> = (0..8).map(|i| media(&format!("hit{i}"), "Star")).collect();
        for query in popular_queries(chrono::Utc::now().year()) {
            resolver = resolver.with_search(&query, hits.clone());
        }
        let resolver = Arc::new(resolver);
        let engine = engine(Arc::new(store), resolver.clone());

        let recs = engine.recommendations(USER, GUILD, 5).await;
        assert_eq!(recs.len(), 5);

        let searched = resolver.searched();
        assert_eq!(searched.len(), 1);
        assert!(!searched[0].contains("popular songs"));
        assert!(!searched[0].contains("similar songs"));
    }

    #[tokio::test]
    async fn test_store_failure_degrades_to_popular() {
        let resolver = Arc::new(MockResolver::new());
        let engine = engine(Arc::new(FailingPreferenceStore), resolver.clone());

        let recs = engine.recommendations(USER, GUILD, 5).await;
        assert!(recs.is_empty());
        assert_eq!(resolver.searched().len(), 1);
        assert!(!engine.should_avoid_artist(USER, GUILD, "Anyone").await);
    }

    #[tokio::test]
    async fn test_failing_branch_contributes_nothing() {
        let (store, _dir) = seeded_store().await;
        let resolver = loaded_resolver()
            .fail_search("Alpha popular songs")
            .fail_search("Beta popular songs");
        let engine = engine(store, Arc::new(resolver));

        let recs = engine.recommendations(USER, GUILD, 10).await;
        assert!(!recs.is_empty());
        assert!(recs.iter().all(|m| !m.title_or_default().starts_with("Alpha-")));
    }

    #[test]
    fn test_extract_keywords() {
        let liked = vec![
            rated("Smooth Jazz Evening", Some("A")),
            rated("Classic ROCK anthem", Some("B")),
            rated("More jazz", Some("C")),
            rated("Metal and blues", Some("D")),
        ];
        // Keywords come out in genre-list order, not title order.
        assert_eq!(extract_keywords(&liked), vec!["jazz", "rock", "blues", "metal"]);
    }

    #[tokio::test]
    async fn test_explore_searches_at_most_three_keywords() {
        let (store, _dir) = temp_store().await;
        let resolver = Arc::new(MockResolver::new());
        let engine = engine(Arc::new(store), resolver.clone());
        let liked = vec![
            rated("Smooth Jazz Evening", Some("A")),
            rated("Classic ROCK anthem", Some("B")),
            rated("Metal and blues", Some("D")),
        ];
        assert_eq!(extract_keywords(&liked).len(), 4);

        let found = engine.explore(&liked, &HashSet::new(), 10).await;
        assert!(found.is_empty());
        assert_eq!(resolver.searched(), vec!["jazz music", "rock music", "blues music"]);
    }

    #[test]
    fn test_extract_keywords_falls_back_to_latest_artist() {
        let liked = vec![rated("Untitled", Some("Newest")), rated("Other", Some("Older"))];
        assert_eq!(extract_keywords(&liked), vec!["Newest"]);
        assert!(extract_keywords(&[rated("Untitled", None)]).is_empty());
        assert!(extract_keywords(&[]).is_empty());
    }

    #[tokio::test]
    async fn test_find_playlist_filters_titles() {
        let resolver = MockResolver::new()
            .with_search(
                "lofi playlist",
                vec![
                    mock_media("Lofi Playlist 2024", "https://youtu.be/p1"),
                    mock_media("Random vlog", "https://youtu.be/v1"),
                ],
            )
            .with_search("lofi mix", vec![mock_media("Lofi Mix", "https://youtu.be/p2")]);
        let resolver = Arc::new(resolver);
        let (store, _dir) = temp_store().await;
        let engine = engine(Arc::new(store), resolver.clone());

        let found = engine.find_playlist("lofi", 2).await;
        let titles: Vec<_> = found.iter().map(|m| m.title_or_default()).collect();
        assert_eq!(titles, vec!["Lofi Playlist 2024", "Lofi Mix"]);

        let found = engine.find_playlist("lofi", 1).await;
        assert_eq!(found.len(), 1);
        // Stopped after the first variant had enough.
        assert_eq!(resolver.searched().last().map(String::as_str), Some("lofi playlist"));
    }

    #[tokio::test]
    async fn test_radio_queue_uses_seed() {
        let (store, _dir) = temp_store().await;
        let seed_hits: Vec<MediaInfo> = (0..10).map(|i| media(&format!("r{i}"), "Radio")).collect();
        let resolver = Arc::new(MockResolver::new().with_search("Seed Song radio", seed_hits));
        let engine = engine(Arc::new(store), resolver.clone());

        let seed = Track::new("Seed Song", "https://youtu.be/seed", USER);
        let queue = engine.radio_queue(USER, GUILD, Some(&seed), 8).await;
        // Seed search capped at half the batch; the cold-start top-up finds nothing.
        assert_eq!(queue.len(), 4);
        assert_eq!(resolver.searched()[0], "Seed Song radio");
    }
}
