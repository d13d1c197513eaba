//! State owned by one tenant's session task.

use std::fmt;

use tokio::task::AbortHandle;

use crate::model::{ChannelId, Track, UserId};
use crate::queue::{LoopMode, QueueEngine};
use crate::transport::Transport;

/// Where a session is in its playback lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    /// No voice connection
    Idle,
    /// Connected, nothing playing
    ConnectedIdle,
    Playing,
    Paused,
    /// Resolving and starting the next track
    Advancing,
}

impl fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlaybackStatus::Idle => "idle",
            PlaybackStatus::ConnectedIdle => "connected",
            PlaybackStatus::Playing => "playing",
            PlaybackStatus::Paused => "paused",
            PlaybackStatus::Advancing => "loading",
        };
        f.write_str(s)
    }
}

/// Radio bookkeeping while radio mode is on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadioState {
    /// Whose tastes drive the refills
    pub user: UserId,
    /// Refills since a track last started successfully
    pub barren_refills: u32,
    pub refill_pending: bool,
}

impl RadioState {
    pub fn new(user: UserId) -> Self {
        Self {
            user,
            barren_refills: 0,
            refill_pending: false,
        }
    }
}

/// A resolution in flight.
#[derive(Debug)]
pub struct PendingTrack {
    pub track: Track,
    pub abort: AbortHandle,
}

/// Everything one tenant's session mutates. Only the session task touches
/// it.
pub struct TenantState {
    pub queue: QueueEngine,
    pub current: Option<Track>,
    pub pending: Option<PendingTrack>,
    /// Last track that started, used as the radio seed
    pub last_played: Option<Track>,
    /// Percent, 0 - 100
    pub volume: u8,
    pub auto_shuffle: bool,
    pub transport: Option<Box<dyn Transport>>,
    /// Where notices go
    pub text_channel: Option<ChannelId>,
    pub radio: Option<RadioState>,
    /// Stamps resolutions and completions so stale ones can be dropped
    pub generation: u64,
    /// Tracks that failed to start in a row
    pub failures: usize,
}

impl TenantState {
    pub fn new(queue: QueueEngine, volume: u8, auto_shuffle: bool) -> Self {
        Self {
            queue,
            current: None,
            pending: None,
            last_played: None,
            volume,
            auto_shuffle,
            transport: None,
            text_channel: None,
            radio: None,
            generation: 0,
            failures: 0,
        }
    }

    pub fn status(&self) -> PlaybackStatus {
        let Some(transport) = self.transport.as_ref() else {
            return PlaybackStatus::Idle;
        };
        if self.pending.is_some() {
            PlaybackStatus::Advancing
        } else if self.current.is_none() {
            PlaybackStatus::ConnectedIdle
        } else if transport.is_paused() {
            PlaybackStatus::Paused
        } else {
            PlaybackStatus::Playing
        }
    }

    /// Nothing playing, paused or loading.
    pub fn is_quiet(&self) -> bool {
        self.current.is_none() && self.pending.is_none()
    }

    /// Start a new playback slot, invalidating anything in flight for the
    /// old one.
    pub fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        if let Some(pending) = self.pending.take() {
            pending.abort.abort();
        }
        self.generation
    }

    pub fn volume_fraction(&self) -> f32 {
        f32::from(self.volume) / 100.0
    }

    /// Snapshot for callers outside the session.
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            status: self.status(),
            current: self.current.clone(),
            queued: self.queue.len(),
            loop_mode: self.queue.loop_mode(),
            volume: self.volume,
            auto_shuffle: self.auto_shuffle,
            radio_active: self.radio.is_some(),
            channel: self.transport.as_ref().map(|t| t.channel()),
        }
    }
}

/// Read-only view of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub status: PlaybackStatus,
    pub current: Option<Track>,
    pub queued: usize,
    pub loop_mode: LoopMode,
    pub volume: u8,
    pub auto_shuffle: bool,
    pub radio_active: bool,
    pub channel: Option<ChannelId>,
}

/// One page of the upcoming queue.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuePage {
    /// 0-based position of `tracks[0]` in the queue
    pub offset: usize,
    pub tracks: Vec<Track>,
    /// 1-based
    pub page: usize,
    pub total_pages: usize,
    pub total_tracks: usize,
    pub total_duration_secs: u64,
}

impl QueuePage {
    /// Slice page `page` (1-based, clamped) of `per_page` tracks.
    pub fn from_queue(queue: &QueueEngine, page: usize, per_page: usize) -> Self {
        let per_page = per_page.max(1);
        let total_tracks = queue.len();
        let total_pages = total_tracks.div_ceil(per_page).max(1);
        let page = page.clamp(1, total_pages);
        let offset = (page - 1) * per_page;
        let tracks = queue.queue().into_iter().skip(offset).take(per_page).collect();

        Self {
            offset,
            tracks,
            page,
            total_pages,
            total_tracks,
            total_duration_secs: queue.total_duration_secs(),
        }
    }
}
