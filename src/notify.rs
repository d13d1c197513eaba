//! Outbound session notifications ("now playing", "queue finished", ...).
//!
//! Sessions post notices to the tenant's last-used text channel through the
//! [`Notifier`] trait. Rendering belongs to the chat layer; here a notice is
//! just data plus a plain-text [`Display`](std::fmt::Display).

use std::fmt;

use async_trait::async_trait;

use crate::model::{ChannelId, TenantId, Track};

/// Something a tenant's listeners should hear about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    NowPlaying { track: Track, queued: usize },
    /// Nothing left to play
    QueueFinished,
    /// A track couldn't be started and was skipped
    TrackFailed { track: Track, reason: String },
    /// Radio topped up the queue
    RadioRefilled { added: usize },
    /// Radio gave up (no more candidates)
    RadioEnded,
}

impl fmt::Display for SessionNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionNotice::NowPlaying { track, queued } => {
                write!(f, "Now playing: {} (requested by <@{}>)", track, track.requested_by())?;
                if *queued > 0 {
                    write!(f, " - {} in queue", queued)?;
                }
                Ok(())
            }
            SessionNotice::QueueFinished => write!(f, "Queue finished"),
            SessionNotice::TrackFailed { track, .. } => {
                write!(f, "Couldn't play {}, skipping", track.title())
            }
            SessionNotice::RadioRefilled { added } => write!(f, "Radio added {} tracks", added),
            SessionNotice::RadioEnded => write!(f, "Radio stopped: no more recommendations"),
        }
    }
}

/// Delivers notices to a tenant's text channel.
///
/// Implement this trait to create mock implementations for testing.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// `channel` is the tenant's last-used text channel, if any.
    async fn notify(&self, tenant: TenantId, channel: Option<ChannelId>, notice: SessionNotice);
}

/// Notifier that writes notices to the log, and optionally to stdout.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier {
    echo: bool,
}

impl LogNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also print each notice on stdout (console mode).
    pub fn echoing() -> Self {
        Self { echo: true }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, tenant: TenantId, channel: Option<ChannelId>, notice: SessionNotice) {
        if let SessionNotice::TrackFailed { reason, .. } = &notice {
            tracing::debug!(target: "session", %tenant, reason, "Track failure notice");
        }
        tracing::info!(target: "session", %tenant, channel = ?channel, "{}", notice);
        if self.echo {
            println!("» {}", notice);
        }
    }
}
