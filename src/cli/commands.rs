//! One-shot subcommands.
//!
//! Each subcommand is a function that takes the effective config plus its
//! arguments and returns an `anyhow::Result<()>`.

use std::path::Path;
use std::sync::Arc;

use crate::config::{self, Config};
use crate::jukebox::{MAX_RECOMMENDATIONS, MIN_RECOMMENDATIONS};
use crate::model::{TenantId, UserId, format_duration};
use crate::preferences::PreferenceStore;
use crate::radio::to_tracks;
use crate::recommend::RecommendationEngine;

use super::services::{build_resolver, open_store};

pub async fn cmd_recommend(config: &Config, user: u64, tenant: u64, count: usize) -> anyhow::Result<()> {
    if !(MIN_RECOMMENDATIONS..=MAX_RECOMMENDATIONS).contains(&count) {
        anyhow::bail!("count must be between {MIN_RECOMMENDATIONS} and {MAX_RECOMMENDATIONS}");
    }
    let store: Arc<dyn PreferenceStore> = open_store(config).await?;
    let (resolver, sweeper) = build_resolver(config);
    let engine = RecommendationEngine::new(store, resolver, config.search_timeout());

    let user = UserId(user);
    let media = engine.recommendations(user, TenantId(tenant), count).await;
    sweeper.abort();

    if media.is_empty() {
        println!("No recommendations found.");
        return Ok(());
    }
    for (i, track) in to_tracks(&media, user).iter().enumerate() {
        println!("{:>2}. {}", i + 1, track);
    }
    Ok(())
}

pub async fn cmd_prefs(config: &Config, user: u64, tenant: u64) -> anyhow::Result<()> {
    let store = open_store(config).await?;
    let (user, tenant) = (UserId(user), TenantId(tenant));
    let summary = store.summary(user, tenant).await?;

    if summary.is_empty() {
        println!("No preferences recorded for user {user} in tenant {tenant}.");
        return Ok(());
    }

    println!("Liked songs: {}", summary.liked_count);
    if !summary.favorite_artists.is_empty() {
        println!("Favorite artists: {}", summary.favorite_artists.join(", "));
    }
    if !summary.disliked_artists.is_empty() {
        println!("Avoided artists: {}", summary.disliked_artists.join(", "));
    }
    if !summary.top_songs.is_empty() {
        println!("Recent likes:");
        for song in &summary.top_songs {
            match &song.artist {
                Some(artist) => println!("  {} - {}", song.title, artist),
                None => println!("  {}", song.title),
            }
        }
    }

    let favorites = store.favorites(user, tenant).await?;
    if !favorites.is_empty() {
        println!("Favorites: {}", favorites.len());
    }
    Ok(())
}

pub async fn cmd_search(config: &Config, query: &str, limit: Option<usize>) -> anyhow::Result<()> {
    let (resolver, sweeper) = build_resolver(config);
    let limit = limit.unwrap_or(config.search.results_limit).max(1);
    let result = resolver.search(query, limit).await;
    sweeper.abort();

    let hits = result?;
    if hits.is_empty() {
        println!("No results for '{query}'.");
        return Ok(());
    }
    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{:>2}. {} - {} [{}]",
            i + 1,
            hit.title_or_default(),
            hit.uploader_or_unknown(),
            format_duration(hit.duration_secs.unwrap_or(0))
        );
        if let Some(locator) = hit.locator() {
            println!("    {locator}");
        }
    }
    Ok(())
}

pub fn cmd_config(config: &Config, explicit: Option<&Path>, save: bool) -> anyhow::Result<()> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => config::config_path(),
    };

    if save {
        match &path {
            Some(path) => config::save_to(config, path)?,
            None => anyhow::bail!("could not determine a config directory"),
        }
    }

    match &path {
        Some(path) => println!("# {}", path.display()),
        None => println!("# (no config directory)"),
    }
    println!("# database: {}", config.database_path().display());
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}
