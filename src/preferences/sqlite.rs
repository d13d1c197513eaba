//! SQLite-backed preference store.
//!
//! Uses SQLx with an embedded SQLite file. Ratings and artist scores are
//! upserted with `ON CONFLICT ... DO UPDATE` so concurrent ratings never
//! lose an update.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use super::{
    ArtistScore, DISLIKED_ARTIST_THRESHOLD, Favorite, FavoriteAdded, PlayRecord, PreferenceStore,
    RatedSong, Rating, StoreError,
};
use crate::model::{TenantId, Track, UserId};

/// Build a SQLite database URL from a file path.
pub fn db_url(path: &std::path::Path) -> String {
    format!("sqlite:{}", path.display())
}

/// Initialize the database connection pool and run migrations.
///
/// Creates the database file if it doesn't exist.
pub async fn init_db(db_url: &str) -> Result<SqlitePool, StoreError> {
    if !sqlx::Sqlite::database_exists(db_url).await.unwrap_or(false) {
        sqlx::Sqlite::create_database(db_url).await?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Discord-style ids fit in 63 bits; SQLite integers are signed.
fn sql_id(id: u64) -> i64 {
    id as i64
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[derive(Debug, sqlx::FromRow)]
struct RatingRow {
    song_title: String,
    song_url: String,
    artist: Option<String>,
    rating: i64,
    rated_at: String,
}

impl TryFrom<RatingRow> for RatedSong {
    type Error = StoreError;

    fn try_from(row: RatingRow) -> Result<Self, Self::Error> {
        let rating = Rating::from_value(row.rating)
            .ok_or_else(|| StoreError::Corrupt(format!("rating {}", row.rating)))?;
        Ok(RatedSong {
            title: row.song_title,
            locator: row.song_url,
            artist: row.artist,
            rating,
            rated_at: row.rated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct FavoriteRow {
    id: i64,
    song_title: String,
    song_url: String,
    duration_secs: i64,
    uploader: Option<String>,
    thumbnail: Option<String>,
    added_at: String,
}

impl From<FavoriteRow> for Favorite {
    fn from(row: FavoriteRow) -> Self {
        Favorite {
            title: row.song_title,
            locator: row.song_url,
            duration_secs: u64::try_from(row.duration_secs).unwrap_or(0),
            uploader: row.uploader,
            thumbnail: row.thumbnail,
            added_at: row.added_at,
        }
    }
}

/// Preference store over a SQLite pool.
#[derive(Debug, Clone)]
pub struct SqlitePreferenceStore {
    pool: SqlitePool,
}

impl SqlitePreferenceStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database at `db_url` and migrate it.
    pub async fn open(db_url: &str) -> Result<Self, StoreError> {
        Ok(Self::new(init_db(db_url).await?))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn rated_songs(
        &self,
        user: UserId,
        tenant: TenantId,
        rating: Rating,
        limit: usize,
    ) -> Result<Vec<RatedSong>, StoreError> {
        let rows: Vec<RatingRow> = sqlx::query_as(
            r#"
            SELECT song_title, song_url, artist, rating, rated_at
            FROM song_ratings
            WHERE user_id = ? AND guild_id = ? AND rating = ?
            ORDER BY rated_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(sql_id(user.0))
        .bind(sql_id(tenant.0))
        .bind(rating.value())
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(RatedSong::try_from).collect()
    }

    async fn favorite_rows(&self, user: UserId, tenant: TenantId) -> Result<Vec<FavoriteRow>, StoreError> {
        let rows = sqlx::query_as(
            r#"
            SELECT id, song_title, song_url, duration_secs, uploader, thumbnail, added_at
            FROM favorites
            WHERE user_id = ? AND guild_id = ?
            ORDER BY added_at DESC, id DESC
            "#,
        )
        .bind(sql_id(user.0))
        .bind(sql_id(tenant.0))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl PreferenceStore for SqlitePreferenceStore {
    async fn add_rating(
        &self,
        user: UserId,
        tenant: TenantId,
        title: &str,
        locator: &str,
        rating: Rating,
        artist: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO song_ratings (user_id, guild_id, song_title, song_url, artist, rating, rated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, guild_id, song_url) DO UPDATE SET
                rating = excluded.rating,
                rated_at = excluded.rated_at
            "#,
        )
        .bind(sql_id(user.0))
        .bind(sql_id(tenant.0))
        .bind(title)
        .bind(locator)
        .bind(artist)
        .bind(rating.value())
        .bind(now())
        .execute(&mut *tx)
        .await?;

        if let Some(artist) = artist.filter(|a| !a.is_empty()) {
            sqlx::query(
                r#"
                INSERT INTO artist_preferences (user_id, guild_id, artist, preference_score)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(user_id, guild_id, artist) DO UPDATE SET
                    preference_score = preference_score + excluded.preference_score
                "#,
            )
            .bind(sql_id(user.0))
            .bind(sql_id(tenant.0))
            .bind(artist)
            .bind(rating.value())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::debug!(target: "preferences", %user, %tenant, %rating, locator, "Rating stored");
        Ok(())
    }

    async fn liked_songs(
        &self,
        user: UserId,
        tenant: TenantId,
        limit: usize,
    ) -> Result<Vec<RatedSong>, StoreError> {
        self.rated_songs(user, tenant, Rating::Like, limit).await
    }

    async fn disliked_songs(
        &self,
        user: UserId,
        tenant: TenantId,
        limit: usize,
    ) -> Result<Vec<RatedSong>, StoreError> {
        self.rated_songs(user, tenant, Rating::Dislike, limit).await
    }

    async fn liked_count(&self, user: UserId, tenant: TenantId) -> Result<usize, StoreError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM song_ratings WHERE user_id = ? AND guild_id = ? AND rating = 1",
        )
        .bind(sql_id(user.0))
        .bind(sql_id(tenant.0))
        .fetch_one(&self.pool)
        .await?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    async fn favorite_artists(
        &self,
        user: UserId,
        tenant: TenantId,
        limit: usize,
    ) -> Result<Vec<ArtistScore>, StoreError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT artist, preference_score
            FROM artist_preferences
            WHERE user_id = ? AND guild_id = ? AND preference_score > 0
            ORDER BY preference_score DESC, id ASC
            LIMIT ?
            "#,
        )
        .bind(sql_id(user.0))
        .bind(sql_id(tenant.0))
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(artist, score)| ArtistScore { artist, score })
            .collect())
    }

    async fn disliked_artists(
        &self,
        user: UserId,
        tenant: TenantId,
    ) -> Result<Vec<String>, StoreError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT artist FROM artist_preferences
            WHERE user_id = ? AND guild_id = ? AND preference_score < ?
            ORDER BY preference_score ASC, id ASC
            "#,
        )
        .bind(sql_id(user.0))
        .bind(sql_id(tenant.0))
        .bind(DISLIKED_ARTIST_THRESHOLD)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(artist,)| artist).collect())
    }

    async fn artist_score(
        &self,
        user: UserId,
        tenant: TenantId,
        artist: &str,
    ) -> Result<Option<i64>, StoreError> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT preference_score FROM artist_preferences WHERE user_id = ? AND guild_id = ? AND artist = ?",
        )
        .bind(sql_id(user.0))
        .bind(sql_id(tenant.0))
        .bind(artist)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(score,)| score))
    }

    async fn add_play_history(&self, record: &PlayRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO play_history (user_id, guild_id, song_title, song_url, artist, skipped, completed, played_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(sql_id(record.user.0))
        .bind(sql_id(record.tenant.0))
        .bind(&record.title)
        .bind(&record.locator)
        .bind(record.artist.as_deref())
        .bind(record.skipped)
        .bind(record.completed)
        .bind(now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn skip_rate(
        &self,
        user: UserId,
        tenant: TenantId,
        artist: &str,
    ) -> Result<f64, StoreError> {
        let (total, skipped): (i64, Option<i64>) = sqlx::query_as(
            r#"
            SELECT COUNT(*), SUM(skipped)
            FROM play_history
            WHERE user_id = ? AND guild_id = ? AND artist = ?
            "#,
        )
        .bind(sql_id(user.0))
        .bind(sql_id(tenant.0))
        .bind(artist)
        .fetch_one(&self.pool)
        .await?;

        if total == 0 {
            return Ok(0.0);
        }
        Ok(skipped.unwrap_or(0) as f64 / total as f64)
    }

    async fn add_favorite(
        &self,
        user: UserId,
        tenant: TenantId,
        track: &Track,
        max: usize,
    ) -> Result<FavoriteAdded, StoreError> {
        let mut tx = self.pool.begin().await?;

        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM favorites WHERE user_id = ? AND guild_id = ?")
                .bind(sql_id(user.0))
                .bind(sql_id(tenant.0))
                .fetch_one(&mut *tx)
                .await?;

        if usize::try_from(count).unwrap_or(usize::MAX) >= max {
            return Ok(FavoriteAdded::Full);
        }

        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO favorites
                (user_id, guild_id, song_title, song_url, duration_secs, uploader, thumbnail, added_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(sql_id(user.0))
        .bind(sql_id(tenant.0))
        .bind(track.title())
        .bind(track.locator())
        .bind(i64::try_from(track.duration_secs()).unwrap_or(0))
        .bind(track.uploader())
        .bind(track.thumbnail_url())
        .bind(now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        if result.rows_affected() == 0 {
            Ok(FavoriteAdded::AlreadyPresent)
        } else {
            Ok(FavoriteAdded::Added)
        }
    }

    async fn favorites(&self, user: UserId, tenant: TenantId) -> Result<Vec<Favorite>, StoreError> {
        Ok(self
            .favorite_rows(user, tenant)
            .await?
            .into_iter()
            .map(Favorite::from)
            .collect())
    }

    async fn remove_favorite(
        &self,
        user: UserId,
        tenant: TenantId,
        index: usize,
    ) -> Result<Option<Favorite>, StoreError> {
        let Some(row) = self.favorite_rows(user, tenant).await?.into_iter().nth(index) else {
            return Ok(None);
        };

        sqlx::query("DELETE FROM favorites WHERE id = ?")
            .bind(row.id)
            .execute(&self.pool)
            .await?;
        Ok(Some(row.into()))
    }

    async fn clear_favorites(&self, user: UserId, tenant: TenantId) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM favorites WHERE user_id = ? AND guild_id = ?")
            .bind(sql_id(user.0))
            .bind(sql_id(tenant.0))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
