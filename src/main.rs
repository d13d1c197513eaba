//! guild-music - per-guild music playback coordinator.
//!
//! Resolves play requests into tracks, runs one playback session per guild
//! over a voice transport, and learns each user's tastes to drive
//! recommendations and radio. Run `guild-music console` to drive a session
//! from the terminal.

pub mod cache;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod jukebox;
pub mod model;
pub mod notify;
pub mod preferences;
pub mod queue;
pub mod radio;
pub mod recommend;
pub mod resolver;
pub mod session;
#[cfg(test)]
pub mod test_utils;
pub mod transport;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();
    let config = cli::load_config(&args)?;

    // RUST_LOG wins over the configured level
    let default_directive = format!("guild_music={}", config.logging.level);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&default_directive))
        .unwrap_or_else(|_| EnvFilter::new("guild_music=info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();

    cli::run_command(&args, config)
}
