//! Command-line interface for guild-music.
//!
//! The `console` subcommand drives a full playback session from stdin
//! against a simulated voice transport. The other subcommands are one-shot
//! queries against the preference store and the resolver.

mod commands;
mod console;
mod services;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::runtime::Runtime;

use crate::config::{self, Config};
use crate::error::Error;
use crate::transport::{MAX_SPEED, MIN_SPEED};

/// guild-music CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file to use instead of the default location
    #[arg(short, long, global = true, env = "GUILD_MUSIC_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Interactive playback console
    Console {
        /// Tenant (guild) id
        #[arg(long, default_value_t = 1)]
        tenant: u64,
        /// Acting user id
        #[arg(long, default_value_t = 1)]
        user: u64,
        /// Voice channel the user sits in
        #[arg(long, default_value_t = 1)]
        voice: u64,
        /// Channel notices are sent to
        #[arg(long)]
        text: Option<u64>,
        /// Playback speed of the simulated transport (0.01-100)
        #[arg(long, default_value_t = 1.0, value_parser = parse_speed)]
        speed: f64,
    },
    /// Print recommendations for a user
    Recommend {
        #[arg(long, default_value_t = 1)]
        user: u64,
        #[arg(long, default_value_t = 1)]
        tenant: u64,
        /// How many (1-20)
        #[arg(short = 'n', long, default_value_t = 5)]
        count: usize,
    },
    /// Show a user's stored preferences
    Prefs {
        #[arg(long, default_value_t = 1)]
        user: u64,
        #[arg(long, default_value_t = 1)]
        tenant: u64,
    },
    /// Search the media source
    Search {
        /// Free-text query
        query: String,
        /// Maximum results (defaults to search.results_limit)
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Print the effective configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        save: bool,
    },
}

/// Resolve the configuration for this invocation: an explicit file if one
/// was given, else the default location, then environment overrides.
pub fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) if !path.exists() => return Err(Error::not_found(path).into()),
        Some(path) => config::load_from(path)?,
        None => config::load(),
    };
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

/// Run the parsed command to completion.
pub fn run_command(cli: &Cli, config: Config) -> anyhow::Result<()> {
    let rt = Runtime::new()?;

    match &cli.command {
        Commands::Console {
            tenant,
            user,
            voice,
            text,
            speed,
        } => rt.block_on(console::run(
            &config,
            console::Seat {
                tenant: *tenant,
                user: *user,
                voice: *voice,
                text: *text,
            },
            *speed,
        )),
        Commands::Recommend {
            user,
            tenant,
            count,
        } => rt.block_on(commands::cmd_recommend(&config, *user, *tenant, *count)),
        Commands::Prefs { user, tenant } => rt.block_on(commands::cmd_prefs(&config, *user, *tenant)),
        Commands::Search { query, limit } => rt.block_on(commands::cmd_search(&config, query, *limit)),
        Commands::Config { save } => commands::cmd_config(&config, cli.config.as_deref(), *save),
    }
}

fn parse_speed(s: &str) -> Result<f64, String> {
    let speed: f64 = s.parse().map_err(|_| format!("'{s}' is not a number"))?;
    if !(MIN_SPEED..=MAX_SPEED).contains(&speed) {
        return Err(format!("speed must be between {MIN_SPEED} and {MAX_SPEED}"));
    }
    Ok(speed)
}
