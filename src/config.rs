//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\guild-music\config.toml
//! - macOS: ~/Library/Application Support/guild-music/config.toml
//! - Linux: ~/.config/guild-music/config.toml
//!
//! Every field has a default, so a partial (or missing) file is fine.
//! A handful of environment variables override the file, for container
//! deployments: `SPOTIFY_CLIENT_ID`, `SPOTIFY_CLIENT_SECRET`,
//! `DATABASE_PATH`, `MAX_QUEUE_SIZE`, `DEFAULT_VOLUME`, `LOG_LEVEL`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// API credentials
    pub credentials: Credentials,
    pub playback: PlaybackConfig,
    pub search: SearchConfig,
    pub cache: CacheConfig,
    pub database: DatabaseConfig,
    pub radio: RadioConfig,
    pub favorites: FavoritesConfig,
    pub logging: LoggingConfig,
}

/// API credentials
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    /// Spotify app credentials; catalog links are refused without them
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,
}

impl Credentials {
    /// Both Spotify credentials, if set and non-empty.
    pub fn spotify(&self) -> Option<(&str, &str)> {
        let id = self.spotify_client_id.as_deref().filter(|s| !s.is_empty())?;
        let secret = self.spotify_client_secret.as_deref().filter(|s| !s.is_empty())?;
        Some((id, secret))
    }
}

/// Playback and queue settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Volume for new sessions, percent (0 - 100)
    pub default_volume: u8,
    pub max_queue_size: usize,
    /// Longer tracks are refused at enqueue
    pub max_song_duration_secs: u64,
    /// Shuffle multi-track imports as they are queued
    pub auto_shuffle: bool,
    /// Limit for resolving a track's stream before it counts as failed
    pub resolve_timeout_secs: u64,
    /// Recently played tracks kept for loop mode "queue"
    pub history_size: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            default_volume: 50,
            max_queue_size: 100,
            max_song_duration_secs: 7200,
            auto_shuffle: true,
            resolve_timeout_secs: 30,
            history_size: 10,
        }
    }
}

/// Search and resolver settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub results_limit: usize,
    /// Per external call
    pub timeout_secs: u64,
    /// Concurrent yt-dlp processes
    pub resolver_workers: usize,
    pub ytdlp_path: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            results_limit: 5,
            timeout_secs: 30,
            resolver_workers: 4,
            ytdlp_path: "yt-dlp".to_string(),
        }
    }
}

/// Resolution cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            sweep_interval_secs: 600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Relative paths live under the data directory
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("preferences.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    /// Tracks per personalized radio batch
    pub queue_size: usize,
    /// Tracks taken from a genre playlist
    pub genre_playlist_size: usize,
    /// Tracks searched when no genre playlist is found
    pub genre_search_size: usize,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            queue_size: 20,
            genre_playlist_size: 20,
            genre_search_size: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FavoritesConfig {
    pub max_per_user: usize,
}

impl Default for FavoritesConfig {
    fn default() -> Self {
        Self { max_per_user: 50 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level for this crate's targets, RUST_LOG still wins
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`. Unparseable numbers are ignored with
    /// a warning.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(id) = lookup("SPOTIFY_CLIENT_ID") {
            self.credentials.spotify_client_id = Some(id);
        }
        if let Some(secret) = lookup("SPOTIFY_CLIENT_SECRET") {
            self.credentials.spotify_client_secret = Some(secret);
        }
        if let Some(path) = lookup("DATABASE_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Some(size) = parse_override(&lookup, "MAX_QUEUE_SIZE") {
            self.playback.max_queue_size = size;
        }
        if let Some(volume) = parse_override(&lookup, "DEFAULT_VOLUME") {
            self.playback.default_volume = volume;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level.to_lowercase();
        }
    }

    /// Reject values the rest of the system can't work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.playback.default_volume > 100 {
            return Err(ConfigError::Invalid(format!(
                "playback.default_volume must be 0-100, got {}",
                self.playback.default_volume
            )));
        }
        let positive = [
            ("playback.max_queue_size", self.playback.max_queue_size as u64),
            ("playback.resolve_timeout_secs", self.playback.resolve_timeout_secs),
            ("search.timeout_secs", self.search.timeout_secs),
            ("search.resolver_workers", self.search.resolver_workers as u64),
            ("cache.ttl_secs", self.cache.ttl_secs),
            ("cache.sweep_interval_secs", self.cache.sweep_interval_secs),
            ("radio.queue_size", self.radio.queue_size as u64),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be greater than 0")));
            }
        }
        Ok(())
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search.timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache.sweep_interval_secs)
    }

    /// Where the preference database lives.
    pub fn database_path(&self) -> PathBuf {
        let path = &self.database.path;
        if path.is_absolute() {
            return path.clone();
        }
        match data_dir() {
            Some(dir) => dir.join(path),
            None => path.clone(),
        }
    }
}

fn parse_override<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring {}={:?}: not a valid number", key, raw);
            None
        }
    }
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("guild-music"))
}

/// Directory for the preference database
pub fn data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("guild-music"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration from the default location.
///
/// Returns default config if file doesn't exist or can't be parsed.
/// Logs warnings but doesn't fail - we always return a usable config.
pub fn load() -> Config {
    let Some(path) = config_path() else {
        tracing::warn!("Could not determine config directory, using defaults");
        return Config::default();
    };

    if !path.exists() {
        tracing::info!("No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    match load_from(&path) {
        Ok(config) => {
            tracing::info!("Loaded config from {:?}", path);
            config
        }
        Err(e) => {
            tracing::error!("{}", e);
            tracing::warn!("Using default configuration");
            Config::default()
        }
    }
}

/// Load an explicit config file.
pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
    let contents =
        std::fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
    toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
}

/// Save configuration to the default location.
pub fn save(config: &Config) -> Result<(), ConfigError> {
    let path = config_path().ok_or(ConfigError::NoConfigDir)?;
    save_to(config, &path)
}

/// Save configuration to `path`.
///
/// Creates the parent directory if it doesn't exist.
pub fn save_to(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::CreateDir(dir.to_path_buf(), e))?;
    }

    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    // Write atomically (write to temp, then rename)
    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, path)
        .map_err(|e| ConfigError::Rename(temp_path, path.to_path_buf(), e))?;

    tracing::info!("Saved config to {:?}", path);
    Ok(())
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read config file {0}: {1}")]
    Read(PathBuf, std::io::Error),

    #[error("Failed to parse config file {0}: {1}")]
    Parse(PathBuf, toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to create config directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Failed to write config to {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to rename temp file {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),
}

// ============================================================================
// Tests
// ============================================================================
