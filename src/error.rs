//! Application-wide error types.
//!
//! Library modules use specific error types via `thiserror`; this module
//! aggregates them into [`Error`] for the composition root, and defines
//! [`CommandError`], the short reason shown to whoever issued a command.
//! CLI/main uses `anyhow` on top.
//!
//! # Design
//!
//! - [`Error`]: internal faults, with full detail, for logs and startup
//! - [`CommandError`]: user-facing refusals and failures. Its `Display` is
//!   generic on purpose: detail is logged where the fault happens, never
//!   echoed back to the channel.

use std::path::PathBuf;

use crate::catalog::CatalogError;
use crate::config::ConfigError;
use crate::model::ModelError;
use crate::preferences::StoreError;
use crate::resolver::ResolveError;
use crate::transport::TransportError;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level application error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Resolver error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Preference store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid media record: {0}")]
    Model(#[from] ModelError),

    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::NotFound(path.into())
    }

    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().context(ctx))
    }
}

/// Why a command could not be carried out.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("You need to be in a voice channel")]
    NotInVoice,

    #[error("I'm not connected to a voice channel")]
    NotConnected,

    #[error("Nothing is playing")]
    NothingPlaying,

    #[error("Nothing is paused")]
    NothingPaused,

    #[error("The queue is empty")]
    QueueEmpty,

    #[error("The queue is full")]
    QueueFull,

    #[error("Invalid position: {0}")]
    InvalidIndex(usize),

    #[error("Volume must be between 0 and 100")]
    InvalidVolume,

    #[error("Unknown loop mode '{0}' (use off, song or queue)")]
    InvalidLoopMode(String),

    #[error("Count must be between {min} and {max}")]
    InvalidCount { min: usize, max: usize },

    #[error("No results found")]
    NoResults,

    #[error("Track is too long (limit {limit_secs}s)")]
    TooLong { limit_secs: u64 },

    #[error("That link can't be used right now")]
    CatalogUnavailable,

    #[error("Couldn't save your preferences, try again later")]
    PreferencesUnavailable,

    #[error("Not enough listening history yet: like some songs first or pick a genre")]
    NoPreferences,

    #[error("Radio is not active")]
    RadioInactive,

    #[error("Your favorites list is full ({0} max)")]
    FavoritesFull(usize),

    #[error("No favorite at that position")]
    NoSuchFavorite,

    #[error("The player for this server stopped, try again")]
    SessionClosed,

    #[error("Couldn't join the voice channel")]
    VoiceConnectFailed,
}

impl From<StoreError> for CommandError {
    fn from(e: StoreError) -> Self {
        tracing::warn!(target: "preferences", error = %e, "Preference store failure");
        CommandError::PreferencesUnavailable
    }
}

impl From<CatalogError> for CommandError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::NotFound => CommandError::NoResults,
            other => {
                tracing::warn!(target: "catalog", error = %other, "Catalog failure");
                CommandError::CatalogUnavailable
            }
        }
    }
}
