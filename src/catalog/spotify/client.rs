//! Spotify HTTP client
//!
//! Uses the client-credentials flow: an app token is fetched on first use
//! and reused until shortly before it expires.
//! See: https://developer.spotify.com/documentation/web-api/tutorials/client-credentials-flow

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tokio::time::Instant;

use super::{adapter, dto};
use crate::catalog::{CatalogClient, CatalogError, CatalogKind, CatalogTrack, parse_link};

const AUTH_URL: &str = "https://accounts.spotify.com/api/token";
const API_URL: &str = "https://api.spotify.com/v1";

/// Refresh the token this long before it actually expires.
const TOKEN_MARGIN: Duration = Duration::from_secs(60);

/// Upper bound on pages followed for one album or playlist.
const MAX_PAGES: usize = 5;

const USER_AGENT: &str = concat!("GuildMusic/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Spotify Web API client
pub struct SpotifyClient {
    http_client: reqwest::Client,
    client_id: String,
    client_secret: String,
    auth_url: String,
    api_url: String,
    token: Mutex<Option<CachedToken>>,
}

impl SpotifyClient {
    /// Create a new client
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Result<Self, CatalogError> {
        Self::with_base_urls(client_id, client_secret, AUTH_URL, API_URL)
    }

    /// Create a client against custom endpoints
    pub fn with_base_urls(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        auth_url: impl Into<String>,
        api_url: impl Into<String>,
    ) -> Result<Self, CatalogError> {
        let client_id = client_id.into();
        let client_secret = client_secret.into();
        if client_id.is_empty() || client_secret.is_empty() {
            return Err(CatalogError::NotConfigured);
        }

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| CatalogError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            client_id,
            client_secret,
            auth_url: auth_url.into(),
            api_url: api_url.into(),
            token: Mutex::new(None),
        })
    }

    /// Return a valid access token, fetching a new one if needed
    async fn access_token(&self) -> Result<String, CatalogError> {
        let cached = self
            .token
            .lock()
            .as_ref()
            .filter(|token| token.expires_at > Instant::now())
            .map(|token| token.value.clone());
        if let Some(value) = cached {
            return Ok(value);
        }

        let response = self
            .http_client
            .post(&self.auth_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| CatalogError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Auth(format!(
                "HTTP {}: {}",
                status,
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        let body = response
            .json::<dto::TokenResponse>()
            .await
            .map_err(|e| CatalogError::Parse(e.to_string()))?;

        let lifetime = Duration::from_secs(body.expires_in).saturating_sub(TOKEN_MARGIN);
        *self.token.lock() = Some(CachedToken {
            value: body.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        tracing::debug!(target: "catalog", expires_in = body.expires_in, "Fetched access token");

        Ok(body.access_token)
    }

    /// Authenticated GET, parsed as `T`
    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, CatalogError> {
        let token = self.access_token().await?;
        let response = self
            .http_client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| CatalogError::Network(e.to_string()))?;

        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(CatalogError::NotFound);
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(CatalogError::RateLimited);
        }

        if status == reqwest::StatusCode::UNAUTHORIZED {
            // Token revoked early; the next call fetches a fresh one
            self.token.lock().take();
        }

        if !status.is_success() {
            if let Ok(error) = response.json::<dto::ErrorResponse>().await {
                return Err(CatalogError::Api {
                    status: error.error.status,
                    message: error.error.message,
                });
            }
            return Err(CatalogError::Api {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| CatalogError::Parse(e.to_string()))
    }

    async fn fetch_track(&self, id: &str) -> Result<Vec<CatalogTrack>, CatalogError> {
        let track: dto::Track = self.get_json(&format!("{}/tracks/{}", self.api_url, id)).await?;
        Ok(vec![adapter::track(&track)])
    }

    async fn fetch_album(&self, id: &str) -> Result<Vec<CatalogTrack>, CatalogError> {
        let album: dto::Album = self.get_json(&format!("{}/albums/{}", self.api_url, id)).await?;
        let mut tracks = adapter::album_tracks(&album, &album.tracks.items);

        let mut next = album.tracks.next.clone();
        for _ in 1..MAX_PAGES {
            let Some(url) = next.take() else { break };
            let page: dto::Page<dto::SimplifiedTrack> = self.get_json(&url).await?;
            tracks.extend(adapter::album_tracks(&album, &page.items));
            next = page.next;
        }
        Ok(tracks)
    }

    async fn fetch_playlist(&self, id: &str) -> Result<Vec<CatalogTrack>, CatalogError> {
        let mut tracks = Vec::new();
        let mut next = Some(format!("{}/playlists/{}/tracks?limit=100", self.api_url, id));
        for _ in 0..MAX_PAGES {
            let Some(url) = next.take() else { break };
            let page: dto::Page<dto::PlaylistItem> = self.get_json(&url).await?;
            tracks.extend(adapter::playlist_tracks(&page.items));
            next = page.next;
        }
        Ok(tracks)
    }
}

#[async_trait]
impl CatalogClient for SpotifyClient {
    async fn fetch_tracks(&self, url: &str) -> Result<Vec<CatalogTrack>, CatalogError> {
        let link = parse_link(url).ok_or_else(|| CatalogError::UnsupportedLink(url.to_string()))?;
        let tracks = match link.kind {
            CatalogKind::Track => self.fetch_track(&link.id).await?,
            CatalogKind::Album => self.fetch_album(&link.id).await?,
            CatalogKind::Playlist => self.fetch_playlist(&link.id).await?,
            CatalogKind::Unknown => return Err(CatalogError::UnsupportedLink(url.to_string())),
        };
        tracing::info!(target: "catalog", kind = ?link.kind, count = tracks.len(), "Fetched catalog tracks");
        Ok(tracks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = SpotifyClient::new("id", "secret").unwrap();
        assert_eq!(client.api_url, API_URL);
        assert_eq!(client.auth_url, AUTH_URL);
    }

    #[test]
    fn test_missing_credentials() {
        assert!(matches!(
            SpotifyClient::new("", "secret"),
            Err(CatalogError::NotConfigured)
        ));
    }

    #[test]
    fn test_user_agent_format() {
        assert!(USER_AGENT.starts_with("GuildMusic/"));
    }

    #[tokio::test]
    async fn test_unsupported_link_fails_before_network() {
        let client = SpotifyClient::with_base_urls("id", "secret", "http://127.0.0.1:9", "http://127.0.0.1:9")
            .unwrap();
        let err = client
            .fetch_tracks("https://open.spotify.com/artist/xyz")
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::UnsupportedLink(_)));
    }

    #[tokio::test]
    async fn test_cached_token_is_reused() {
        let client = SpotifyClient::with_base_urls("id", "secret", "http://127.0.0.1:9", "http://127.0.0.1:9")
            .unwrap();
        *client.token.lock() = Some(CachedToken {
            value: "tok".to_string(),
            expires_at: Instant::now() + Duration::from_secs(600),
        });
        assert_eq!(client.access_token().await.unwrap(), "tok");
    }
}
