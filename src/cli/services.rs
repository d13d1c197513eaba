//! Composition root: builds the live collaborators from configuration.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::cache::{ResolutionCache, spawn_sweeper};
use crate::catalog::{CatalogClient, SpotifyClient};
use crate::config::Config;
use crate::error::ResultExt;
use crate::jukebox::{Jukebox, JukeboxSettings};
use crate::notify::Notifier;
use crate::preferences::{PreferenceStore, SqlitePreferenceStore, db_url};
use crate::radio::RadioGenerator;
use crate::recommend::RecommendationEngine;
use crate::resolver::{CachingResolver, Resolver, YtDlpClient};
use crate::session::{SessionContext, SessionRegistry, SessionSettings};
use crate::transport::SimulatedGateway;

/// Open (creating if needed) the preference database named by the config.
pub async fn open_store(config: &Config) -> anyhow::Result<Arc<SqlitePreferenceStore>> {
    let path = config.database_path();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(format!("creating database directory {}", parent.display()))?;
    }
    let store = SqlitePreferenceStore::open(&db_url(&path))
        .await
        .with_context(format!("opening preference database {}", path.display()))?;
    tracing::debug!(target: "preferences", path = %path.display(), "Preference store ready");
    Ok(Arc::new(store))
}

/// The yt-dlp resolver behind a resolution cache, plus the cache sweeper.
pub fn build_resolver(config: &Config) -> (Arc<dyn Resolver>, JoinHandle<()>) {
    let cache = Arc::new(ResolutionCache::new(config.cache_ttl()));
    let sweeper = spawn_sweeper(cache.clone(), config.sweep_interval());
    let ytdlp = YtDlpClient::new(
        &config.search.ytdlp_path,
        config.search.resolver_workers,
        config.search_timeout(),
    );
    (Arc::new(CachingResolver::new(ytdlp, cache)), sweeper)
}

/// The catalog client, when credentials are configured.
pub fn build_catalog(config: &Config) -> Option<Arc<dyn CatalogClient>> {
    let (id, secret) = config.credentials.spotify()?;
    match SpotifyClient::new(id, secret) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            tracing::warn!(target: "catalog", error = %e, "Catalog client unavailable, catalog links disabled");
            None
        }
    }
}

/// Everything the console needs, wired together.
pub struct Services {
    pub jukebox: Jukebox,
    sweeper: JoinHandle<()>,
}

impl Services {
    /// Build the full stack over a simulated voice transport running at
    /// `speed`.
    pub async fn build(config: &Config, speed: f64, notifier: Arc<dyn Notifier>) -> anyhow::Result<Self> {
        let preferences: Arc<dyn PreferenceStore> = open_store(config).await?;
        let (resolver, sweeper) = build_resolver(config);
        let recommender = Arc::new(RecommendationEngine::new(
            preferences.clone(),
            resolver.clone(),
            config.search_timeout(),
        ));

        let ctx = SessionContext {
            resolver: resolver.clone(),
            gateway: Arc::new(SimulatedGateway::new(speed)),
            notifier,
            preferences: preferences.clone(),
            radio: Arc::new(RadioGenerator::new(recommender.clone())),
            settings: SessionSettings::from_config(config),
        };

        let mut jukebox = Jukebox::new(
            SessionRegistry::new(ctx),
            resolver,
            preferences,
            recommender,
            JukeboxSettings::from_config(config),
        );
        match build_catalog(config) {
            Some(catalog) => jukebox = jukebox.with_catalog(catalog),
            None => tracing::info!(target: "catalog", "No catalog credentials, catalog links disabled"),
        }

        Ok(Self {
            jukebox,
            sweeper,
        })
    }

    /// Stop every session and background task.
    pub async fn shutdown(self) {
        self.jukebox.sessions().shutdown_all().await;
        self.sweeper.abort();
    }
}
