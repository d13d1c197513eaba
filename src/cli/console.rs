//! Line-based console over the jukebox.
//!
//! Each line is one command, the way a chat front-end would pass them on.
//! Positions typed here are 1-based and converted before reaching the
//! jukebox.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use super::services::Services;
use crate::config::Config;
use crate::error::CommandError;
use crate::jukebox::{Jukebox, Requester};
use crate::model::{ChannelId, TenantId, UserId, format_duration};
use crate::notify::LogNotifier;
use crate::preferences::FavoriteAdded;

const QUEUE_PAGE_SIZE: usize = 10;
const SEARCH_RESULTS: usize = 5;
const DEFAULT_RECOMMENDATIONS: usize = 5;

/// Who is typing, and where.
#[derive(Debug, Clone, Copy)]
pub struct Seat {
    pub tenant: u64,
    pub user: u64,
    pub voice: u64,
    pub text: Option<u64>,
}

impl Seat {
    fn requester(&self) -> Requester {
        Requester {
            user: UserId(self.user),
            tenant: TenantId(self.tenant),
            voice: Some(ChannelId(self.voice)),
            text: self.text.map(ChannelId),
        }
    }
}

/// A parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Play(String),
    Search(String),
    Pause,
    Resume,
    Stop,
    Skip,
    NowPlaying,
    Queue(usize),
    Volume(u8),
    /// `None` cycles
    Loop(Option<String>),
    Shuffle,
    Unshuffle,
    /// 0-based from here on
    Remove(usize),
    Move(usize, usize),
    Jump(usize),
    Clear,
    AutoShuffle(Option<bool>),
    Join,
    Leave,
    Like,
    Dislike,
    Radio(Option<String>),
    RadioStop,
    Prefs,
    Recommend(usize),
    Playlist(String),
    Favorite,
    Favorites,
    Unfavorite(usize),
    ClearFavorites,
    PlayFavorites(Option<usize>),
    Help,
    Quit,
}

/// Parse one console line. Returns `Ok(None)` for blank lines.
pub fn parse_line(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let rest_opt = || (!rest.is_empty()).then(|| rest.to_string());

    let cmd = match word.to_ascii_lowercase().as_str() {
        "play" | "p" => ConsoleCommand::Play(required(rest, "play <url or search>")?),
        "search" => ConsoleCommand::Search(required(rest, "search <query>")?),
        "pause" => ConsoleCommand::Pause,
        "resume" => ConsoleCommand::Resume,
        "stop" => ConsoleCommand::Stop,
        "skip" | "s" => ConsoleCommand::Skip,
        "np" | "nowplaying" => ConsoleCommand::NowPlaying,
        "queue" | "q" => ConsoleCommand::Queue(if rest.is_empty() { 1 } else { number(rest)? }),
        "volume" | "vol" => {
            let volume = rest.parse::<u8>().map_err(|_| "usage: volume <0-100>".to_string())?;
            ConsoleCommand::Volume(volume)
        }
        "loop" => ConsoleCommand::Loop(rest_opt()),
        "shuffle" => ConsoleCommand::Shuffle,
        "unshuffle" => ConsoleCommand::Unshuffle,
        "remove" | "rm" => ConsoleCommand::Remove(position(rest)?),
        "move" | "mv" => {
            let mut parts = rest.split_whitespace();
            match (parts.next(), parts.next(), parts.next()) {
                (Some(from), Some(to), None) => ConsoleCommand::Move(position(from)?, position(to)?),
                _ => return Err("usage: move <from> <to>".to_string()),
            }
        }
        "jump" => ConsoleCommand::Jump(position(rest)?),
        "clear" => ConsoleCommand::Clear,
        "autoshuffle" => ConsoleCommand::AutoShuffle(match rest.to_ascii_lowercase().as_str() {
            "" => None,
            "on" | "true" => Some(true),
            "off" | "false" => Some(false),
            _ => return Err("usage: autoshuffle [on|off]".to_string()),
        }),
        "join" => ConsoleCommand::Join,
        "leave" | "disconnect" => ConsoleCommand::Leave,
        "like" => ConsoleCommand::Like,
        "dislike" => ConsoleCommand::Dislike,
        "radio" if rest.eq_ignore_ascii_case("stop") => ConsoleCommand::RadioStop,
        "radio" => ConsoleCommand::Radio(rest_opt()),
        "prefs" | "preferences" => ConsoleCommand::Prefs,
        "recommend" | "rec" => {
            ConsoleCommand::Recommend(if rest.is_empty() { DEFAULT_RECOMMENDATIONS } else { number(rest)? })
        }
        "playlist" => ConsoleCommand::Playlist(required(rest, "playlist <query>")?),
        "fav" | "favorite" => ConsoleCommand::Favorite,
        "favs" | "favorites" => ConsoleCommand::Favorites,
        "unfav" => ConsoleCommand::Unfavorite(position(rest)?),
        "clearfavs" => ConsoleCommand::ClearFavorites,
        "playfav" | "playfavs" => ConsoleCommand::PlayFavorites(if rest.is_empty() {
            None
        } else {
            Some(position(rest)?)
        }),
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" => ConsoleCommand::Quit,
        other => return Err(format!("unknown command '{other}', try 'help'")),
    };
    Ok(Some(cmd))
}

fn required(rest: &str, usage: &str) -> Result<String, String> {
    if rest.is_empty() {
        Err(format!("usage: {usage}"))
    } else {
        Ok(rest.to_string())
    }
}

fn number(s: &str) -> Result<usize, String> {
    s.parse().map_err(|_| format!("'{s}' is not a number"))
}

/// 1-based position typed by the user → 0-based index.
fn position(s: &str) -> Result<usize, String> {
    match number(s)? {
        0 => Err("positions start at 1".to_string()),
        n => Ok(n - 1),
    }
}

const HELP: &str = "\
play <url|query>   queue a link, playlist or search
search <query>     list search results
pause | resume | stop | skip | np
queue [page]       show the queue
volume <0-100>     set volume
loop [off|song|queue]  set or cycle loop mode
shuffle | unshuffle | clear
remove <n> | move <a> <b> | jump <n>
autoshuffle [on|off]
join | leave
like | dislike
radio [genre] | radio stop
prefs | recommend [n] | playlist <query>
fav | favs | unfav <n> | clearfavs | playfav [n]
quit";

/// Run one command and render the reply.
pub async fn execute(jukebox: &Jukebox, req: &Requester, cmd: ConsoleCommand) -> Result<String, CommandError> {
    let tenant = req.tenant;
    let reply = match cmd {
        ConsoleCommand::Play(query) => {
            let outcome = jukebox.enqueue_from_query(req, &query).await?;
            let mut text = format!("Queued {} track(s)", outcome.added);
            if outcome.rejected > 0 {
                text.push_str(&format!(", {} refused", outcome.rejected));
            }
            if outcome.shuffled {
                text.push_str(" (shuffled)");
            }
            text
        }
        ConsoleCommand::Search(query) => {
            let hits = jukebox.search(&query, SEARCH_RESULTS).await?;
            hits.iter()
                .enumerate()
                .map(|(i, hit)| {
                    format!(
                        "{}. {} - {} [{}]",
                        i + 1,
                        hit.title_or_default(),
                        hit.uploader_or_unknown(),
                        format_duration(hit.duration_secs.unwrap_or(0))
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        }
        ConsoleCommand::Pause => {
            jukebox.pause(tenant).await?;
            "Paused".to_string()
        }
        ConsoleCommand::Resume => {
            jukebox.resume(tenant).await?;
            "Resumed".to_string()
        }
        ConsoleCommand::Stop => {
            jukebox.stop(tenant).await?;
            "Stopped and cleared the queue".to_string()
        }
        ConsoleCommand::Skip => {
            jukebox.skip(tenant).await?;
            "Skipped".to_string()
        }
        ConsoleCommand::NowPlaying => {
            let summary = jukebox.summary(tenant).await?;
            match summary.current {
                Some(track) => format!(
                    "{} [{}] - {} queued, loop {}, volume {}%{}",
                    track,
                    summary.status,
                    summary.queued,
                    summary.loop_mode,
                    summary.volume,
                    if summary.radio_active { ", radio on" } else { "" }
                ),
                None => format!("Nothing playing ({})", summary.status),
            }
        }
        ConsoleCommand::Queue(page) => {
            let page = jukebox.queue_page(tenant, page, QUEUE_PAGE_SIZE).await?;
            if page.tracks.is_empty() {
                return Err(CommandError::QueueEmpty);
            }
            let mut lines: Vec<String> = page
                .tracks
                .iter()
                .enumerate()
                .map(|(i, t)| format!("{}. {}", page.offset + i + 1, t))
                .collect();
            lines.push(format!(
                "Page {}/{} - {} tracks, {}",
                page.page,
                page.total_pages,
                page.total_tracks,
                format_duration(page.total_duration_secs)
            ));
            lines.join("\n")
        }
        ConsoleCommand::Volume(volume) => {
            jukebox.set_volume(tenant, volume).await?;
            format!("Volume set to {volume}%")
        }
        ConsoleCommand::Loop(Some(mode)) => format!("Loop: {}", jukebox.set_loop_mode(tenant, &mode).await?),
        ConsoleCommand::Loop(None) => format!("Loop: {}", jukebox.cycle_loop_mode(tenant).await?),
        ConsoleCommand::Shuffle => {
            jukebox.shuffle(tenant).await?;
            "Shuffled".to_string()
        }
        ConsoleCommand::Unshuffle => {
            if jukebox.unshuffle(tenant).await? {
                "Restored the original order".to_string()
            } else {
                "Nothing to unshuffle".to_string()
            }
        }
        ConsoleCommand::Remove(index) => format!("Removed {}", jukebox.remove_at(tenant, index).await?),
        ConsoleCommand::Move(from, to) => {
            jukebox.move_between(tenant, from, to).await?;
            format!("Moved {} to {}", from + 1, to + 1)
        }
        ConsoleCommand::Jump(index) => format!("Jumped to {}", jukebox.jump_to(tenant, index).await?),
        ConsoleCommand::Clear => format!("Cleared {} track(s)", jukebox.clear(tenant).await?),
        ConsoleCommand::AutoShuffle(Some(enabled)) => {
            jukebox.set_auto_shuffle(tenant, enabled).await?;
            format!("Auto-shuffle {}", if enabled { "on" } else { "off" })
        }
        ConsoleCommand::AutoShuffle(None) => {
            let enabled = jukebox.auto_shuffle(tenant).await?;
            format!("Auto-shuffle is {}", if enabled { "on" } else { "off" })
        }
        ConsoleCommand::Join => {
            jukebox.join(req).await?;
            "Joined".to_string()
        }
        ConsoleCommand::Leave => {
            jukebox.leave(tenant).await?;
            "Left the voice channel".to_string()
        }
        ConsoleCommand::Like => format!("Liked {}", jukebox.like(req.user, tenant).await?.track.title()),
        ConsoleCommand::Dislike => {
            let outcome = jukebox.dislike(req.user, tenant).await?;
            if outcome.skipped {
                format!("Disliked {} and skipped it", outcome.track.title())
            } else {
                format!("Disliked {}", outcome.track.title())
            }
        }
        ConsoleCommand::Radio(genre) => {
            let added = jukebox.start_radio(req, genre.as_deref()).await?;
            format!("Radio on, {added} track(s) queued")
        }
        ConsoleCommand::RadioStop => {
            jukebox.stop_radio(tenant).await?;
            "Radio off".to_string()
        }
        ConsoleCommand::Prefs => {
            let summary = jukebox.preference_summary(req.user, tenant).await?;
            if summary.is_empty() {
                return Err(CommandError::NoPreferences);
            }
            let mut lines = vec![format!("Liked songs: {}", summary.liked_count)];
            if !summary.favorite_artists.is_empty() {
                lines.push(format!("Favorite artists: {}", summary.favorite_artists.join(", ")));
            }
            if !summary.disliked_artists.is_empty() {
                lines.push(format!("Avoiding: {}", summary.disliked_artists.join(", ")));
            }
            for song in &summary.top_songs {
                lines.push(format!("  {}", song.title));
            }
            lines.join("\n")
        }
        ConsoleCommand::Recommend(count) => {
            let tracks = jukebox.recommend(req.user, tenant, count).await?;
            if tracks.is_empty() {
                return Err(CommandError::NoResults);
            }
            numbered(tracks.iter().map(ToString::to_string))
        }
        ConsoleCommand::Playlist(query) => {
            let found = jukebox.find_playlist(&query, 3).await?;
            numbered(
                found
                    .iter()
                    .map(|p| format!("{} <{}>", p.title_or_default(), p.locator().unwrap_or("?"))),
            )
        }
        ConsoleCommand::Favorite => {
            let (track, added) = jukebox.add_favorite(req.user, tenant).await?;
            match added {
                FavoriteAdded::AlreadyPresent => format!("{} is already a favorite", track.title()),
                _ => format!("Added {} to favorites", track.title()),
            }
        }
        ConsoleCommand::Favorites => {
            let favorites = jukebox.favorites(req.user, tenant).await?;
            if favorites.is_empty() {
                "No favorites yet".to_string()
            } else {
                numbered(
                    favorites
                        .iter()
                        .map(|f| format!("{} [{}]", f.title, format_duration(f.duration_secs))),
                )
            }
        }
        ConsoleCommand::Unfavorite(index) => {
            format!("Removed {} from favorites", jukebox.remove_favorite(req.user, tenant, index).await?.title)
        }
        ConsoleCommand::ClearFavorites => {
            format!("Removed {} favorite(s)", jukebox.clear_favorites(req.user, tenant).await?)
        }
        ConsoleCommand::PlayFavorites(index) => {
            let outcome = jukebox.play_favorites(req, index).await?;
            format!("Queued {} favorite(s)", outcome.added)
        }
        ConsoleCommand::Help => HELP.to_string(),
        ConsoleCommand::Quit => String::new(),
    };
    Ok(reply)
}

fn numbered(items: impl Iterator<Item = String>) -> String {
    items
        .enumerate()
        .map(|(i, item)| format!("{}. {}", i + 1, item))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Read commands from stdin until EOF or `quit`.
pub async fn run(config: &Config, seat: Seat, speed: f64) -> anyhow::Result<()> {
    let services = Services::build(config, speed, Arc::new(LogNotifier::echoing())).await?;
    let req = seat.requester();
    tracing::info!(tenant = seat.tenant, user = seat.user, voice = seat.voice, speed, "Console ready");
    println!("guild-music console (tenant {}, user {}). Type 'help'.", seat.tenant, seat.user);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };

        match parse_line(&line) {
            Ok(None) => {}
            Ok(Some(ConsoleCommand::Quit)) => break,
            Ok(Some(cmd)) => match execute(&services.jukebox, &req, cmd).await {
                Ok(reply) => println!("{reply}"),
                // Shown 1-based, like the positions typed in.
                Err(CommandError::InvalidIndex(i)) => println!("✗ {}", CommandError::InvalidIndex(i + 1)),
                Err(e) => println!("✗ {e}"),
            },
            Err(usage) => println!("{usage}"),
        }
    }

    services.shutdown().await;
    Ok(())
}
