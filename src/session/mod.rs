//! Per-tenant playback sessions.
//!
//! Each tenant gets one session task that exclusively owns its queue,
//! current track, volume and voice transport. Callers talk to it through a
//! cloneable [`SessionHandle`]: every command travels over a bounded
//! channel with a oneshot reply, so commands for one tenant are applied in
//! the order they were sent and never race each other.
//!
//! Slow work (stream resolution, radio refills) runs in spawned tasks that
//! report back on the session's event channel. The transport's completion
//! callback posts to the same channel from whatever thread it fires on.
//! Every resolution and completion carries the playback *generation* it
//! belongs to; stop, skip-while-loading, jump and disconnect start a new
//! generation, so late events from an abandoned slot are dropped.
//!
//! # Usage
//!
//! ```ignore
//! let (handle, _task) = session::spawn(tenant, ctx);
//! handle.enqueue(tracks, voice_channel, Some(text_channel)).await?;
//! handle.skip().await?;
//! ```

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::error::CommandError;
use crate::model::{ChannelId, TenantId, Track, UserId};
use crate::notify::SessionNotice;
use crate::preferences::PlayRecord;
use crate::queue::{LoopMode, QueueEngine};
use crate::resolver::{ResolveError, StreamHandle};
use crate::transport::{CompletionNotifier, PlaybackOutcome, PlaybackSource};

mod registry;
mod state;

pub use registry::{SessionContext, SessionRegistry};
pub use state::{PlaybackStatus, QueuePage, RadioState, SessionSummary};

use state::{PendingTrack, TenantState};

/// Commands waiting for a busy session before senders block.
const COMMAND_BUFFER: usize = 32;

/// Radio refills in a row that may come back without a single track
/// starting before radio gives up.
const MAX_BARREN_REFILLS: u32 = 2;

/// Per-session tunables.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Percent
    pub default_volume: u8,
    pub max_queue_size: usize,
    pub history_size: usize,
    pub auto_shuffle: bool,
    pub resolve_timeout: Duration,
    pub radio_batch_size: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            default_volume: 50,
            max_queue_size: crate::queue::DEFAULT_CAPACITY,
            history_size: crate::queue::DEFAULT_HISTORY_SIZE,
            auto_shuffle: true,
            resolve_timeout: Duration::from_secs(30),
            radio_batch_size: 20,
        }
    }
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            default_volume: config.playback.default_volume.min(100),
            max_queue_size: config.playback.max_queue_size,
            history_size: config.playback.history_size,
            auto_shuffle: config.playback.auto_shuffle,
            resolve_timeout: Duration::from_secs(config.playback.resolve_timeout_secs),
            radio_batch_size: config.radio.queue_size,
        }
    }
}

/// Result of queueing a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnqueueOutcome {
    pub added: usize,
    /// Refused because the queue was full (or, through the jukebox, too long)
    pub rejected: usize,
    /// Auto-shuffle was applied
    pub shuffled: bool,
}

type Reply<T> = oneshot::Sender<T>;

/// Requests handled by a session task.
#[derive(Debug)]
pub enum SessionCommand {
    Join {
        channel: ChannelId,
        text: Option<ChannelId>,
        reply: Reply<Result<(), CommandError>>,
    },
    Enqueue {
        tracks: Vec<Track>,
        channel: ChannelId,
        text: Option<ChannelId>,
        reply: Reply<Result<EnqueueOutcome, CommandError>>,
    },
    Pause(Reply<Result<(), CommandError>>),
    Resume(Reply<Result<(), CommandError>>),
    Stop(Reply<Result<(), CommandError>>),
    Skip(Reply<Result<(), CommandError>>),
    SetVolume {
        volume: u8,
        reply: Reply<Result<(), CommandError>>,
    },
    Summary(Reply<SessionSummary>),
    Queue {
        page: usize,
        per_page: usize,
        reply: Reply<QueuePage>,
    },
    SetLoopMode {
        mode: LoopMode,
        reply: Reply<()>,
    },
    CycleLoopMode(Reply<LoopMode>),
    Shuffle(Reply<bool>),
    Unshuffle(Reply<bool>),
    Remove {
        index: usize,
        reply: Reply<Result<Track, CommandError>>,
    },
    Move {
        from: usize,
        to: usize,
        reply: Reply<Result<(), CommandError>>,
    },
    JumpTo {
        index: usize,
        reply: Reply<Result<Track, CommandError>>,
    },
    Clear(Reply<usize>),
    SetAutoShuffle {
        enabled: bool,
        reply: Reply<()>,
    },
    StartRadio {
        user: UserId,
        tracks: Vec<Track>,
        channel: ChannelId,
        text: Option<ChannelId>,
        reply: Reply<Result<EnqueueOutcome, CommandError>>,
    },
    StopRadio(Reply<Result<(), CommandError>>),
    Leave(Reply<()>),
    Shutdown,
}

/// Internal events posted back to the session by its own spawned work.
#[derive(Debug)]
enum SessionEvent {
    Resolved {
        generation: u64,
        result: Result<StreamHandle, ResolveError>,
    },
    TrackEnded {
        generation: u64,
        outcome: PlaybackOutcome,
    },
    RadioBatch(Vec<Track>),
}

/// Cloneable handle to a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tenant: TenantId,
    commands: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    pub fn tenant(&self) -> TenantId {
        self.tenant
    }

    /// True once the session task has exited.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> SessionCommand,
    ) -> Result<T, CommandError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .await
            .map_err(|_| CommandError::SessionClosed)?;
        rx.await.map_err(|_| CommandError::SessionClosed)
    }

    /// Connect to `channel`, or move there.
    pub async fn join(&self, channel: ChannelId, text: Option<ChannelId>) -> Result<(), CommandError> {
        self.request(|reply| SessionCommand::Join { channel, text, reply }).await?
    }

    /// Queue tracks, connecting to `channel` first. Starts playback when
    /// nothing is playing.
    pub async fn enqueue(
        &self,
        tracks: Vec<Track>,
        channel: ChannelId,
        text: Option<ChannelId>,
    ) -> Result<EnqueueOutcome, CommandError> {
        self.request(|reply| SessionCommand::Enqueue {
            tracks,
            channel,
            text,
            reply,
        })
        .await?
    }

    pub async fn pause(&self) -> Result<(), CommandError> {
        self.request(SessionCommand::Pause).await?
    }

    pub async fn resume(&self) -> Result<(), CommandError> {
        self.request(SessionCommand::Resume).await?
    }

    /// Stop playback and clear the queue.
    pub async fn stop(&self) -> Result<(), CommandError> {
        self.request(SessionCommand::Stop).await?
    }

    pub async fn skip(&self) -> Result<(), CommandError> {
        self.request(SessionCommand::Skip).await?
    }

    /// `volume` in percent.
    pub async fn set_volume(&self, volume: u8) -> Result<(), CommandError> {
        self.request(|reply| SessionCommand::SetVolume { volume, reply }).await?
    }

    pub async fn summary(&self) -> Result<SessionSummary, CommandError> {
        self.request(SessionCommand::Summary).await
    }

    pub async fn now_playing(&self) -> Result<Option<Track>, CommandError> {
        Ok(self.summary().await?.current)
    }

    /// Page `page` (1-based) of the upcoming queue.
    pub async fn queue_page(&self, page: usize, per_page: usize) -> Result<QueuePage, CommandError> {
        self.request(|reply| SessionCommand::Queue { page, per_page, reply }).await
    }

    pub async fn set_loop_mode(&self, mode: LoopMode) -> Result<(), CommandError> {
        self.request(|reply| SessionCommand::SetLoopMode { mode, reply }).await
    }

    pub async fn cycle_loop_mode(&self) -> Result<LoopMode, CommandError> {
        self.request(SessionCommand::CycleLoopMode).await
    }

    pub async fn shuffle(&self) -> Result<bool, CommandError> {
        self.request(SessionCommand::Shuffle).await
    }

    pub async fn unshuffle(&self) -> Result<bool, CommandError> {
        self.request(SessionCommand::Unshuffle).await
    }

    pub async fn remove(&self, index: usize) -> Result<Track, CommandError> {
        self.request(|reply| SessionCommand::Remove { index, reply }).await?
    }

    pub async fn move_track(&self, from: usize, to: usize) -> Result<(), CommandError> {
        self.request(|reply| SessionCommand::Move { from, to, reply }).await?
    }

    /// Drop everything before `index` and play the track there now.
    pub async fn jump_to(&self, index: usize) -> Result<Track, CommandError> {
        self.request(|reply| SessionCommand::JumpTo { index, reply }).await?
    }

    /// Empty the upcoming queue, returning how many tracks were dropped.
    pub async fn clear(&self) -> Result<usize, CommandError> {
        self.request(SessionCommand::Clear).await
    }

    pub async fn set_auto_shuffle(&self, enabled: bool) -> Result<(), CommandError> {
        self.request(|reply| SessionCommand::SetAutoShuffle { enabled, reply }).await
    }

    /// Turn radio on for `user` with a first batch of tracks.
    pub async fn start_radio(
        &self,
        user: UserId,
        tracks: Vec<Track>,
        channel: ChannelId,
        text: Option<ChannelId>,
    ) -> Result<EnqueueOutcome, CommandError> {
        self.request(|reply| SessionCommand::StartRadio {
            user,
            tracks,
            channel,
            text,
            reply,
        })
        .await?
    }

    pub async fn stop_radio(&self) -> Result<(), CommandError> {
        self.request(SessionCommand::StopRadio).await?
    }

    /// Stop, clear and disconnect.
    pub async fn leave(&self) -> Result<(), CommandError> {
        self.request(SessionCommand::Leave).await
    }

    /// Ask the task to disconnect and exit.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(SessionCommand::Shutdown).await;
    }
}

/// Start a session task for `tenant`.
pub fn spawn(tenant: TenantId, ctx: SessionContext) -> (SessionHandle, JoinHandle<()>) {
    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    let settings = &ctx.settings;
    let queue = QueueEngine::with_history_size(settings.max_queue_size, settings.history_size);
    let state = TenantState::new(queue, settings.default_volume.min(100), settings.auto_shuffle);

    let session = Session {
        tenant,
        ctx,
        state,
        events_tx,
    };
    let task = tokio::spawn(session.run(commands_rx, events_rx));

    (
        SessionHandle {
            tenant,
            commands: commands_tx,
        },
        task,
    )
}

struct Session {
    tenant: TenantId,
    ctx: SessionContext,
    state: TenantState,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
}

impl Session {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
        mut events: mpsc::UnboundedReceiver<SessionEvent>,
    ) {
        tracing::debug!(target: "session", tenant = %self.tenant, "Session started");

        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(SessionCommand::Shutdown) | None => break,
                    Some(cmd) => self.handle_command(cmd).await,
                },
                Some(event) = events.recv() => self.handle_event(event).await,
            }
        }

        self.disconnect().await;
        tracing::debug!(target: "session", tenant = %self.tenant, "Session stopped");
    }

    async fn handle_command(&mut self, cmd: SessionCommand) {
        // A dropped reply only means the caller stopped waiting.
        match cmd {
            SessionCommand::Join { channel, text, reply } => {
                let result = self.ensure_connected(channel, text).await;
                let _ = reply.send(result);
            }
            SessionCommand::Enqueue {
                tracks,
                channel,
                text,
                reply,
            } => {
                let result = self.enqueue(tracks, channel, text).await;
                let _ = reply.send(result);
            }
            SessionCommand::Pause(reply) => {
                let _ = reply.send(self.pause());
            }
            SessionCommand::Resume(reply) => {
                let _ = reply.send(self.resume());
            }
            SessionCommand::Stop(reply) => {
                let _ = reply.send(self.stop());
            }
            SessionCommand::Skip(reply) => {
                let result = self.skip().await;
                let _ = reply.send(result);
            }
            SessionCommand::SetVolume { volume, reply } => {
                let _ = reply.send(self.set_volume(volume));
            }
            SessionCommand::Summary(reply) => {
                let _ = reply.send(self.state.summary());
            }
            SessionCommand::Queue {
                page,
                per_page,
                reply,
            } => {
                let _ = reply.send(QueuePage::from_queue(&self.state.queue, page, per_page));
            }
            SessionCommand::SetLoopMode { mode, reply } => {
                self.state.queue.set_loop_mode(mode);
                let _ = reply.send(());
            }
            SessionCommand::CycleLoopMode(reply) => {
                let _ = reply.send(self.state.queue.cycle_loop_mode());
            }
            SessionCommand::Shuffle(reply) => {
                let _ = reply.send(self.state.queue.shuffle());
            }
            SessionCommand::Unshuffle(reply) => {
                let _ = reply.send(self.state.queue.unshuffle());
            }
            SessionCommand::Remove { index, reply } => {
                let removed = self.state.queue.get(index).cloned();
                let result = match removed {
                    Some(track) => {
                        self.state.queue.remove(index);
                        Ok(track)
                    }
                    None => Err(CommandError::InvalidIndex(index)),
                };
                let _ = reply.send(result);
            }
            SessionCommand::Move { from, to, reply } => {
                let result = if self.state.queue.move_item(from, to) {
                    Ok(())
                } else if from >= self.state.queue.len() {
                    Err(CommandError::InvalidIndex(from))
                } else {
                    Err(CommandError::InvalidIndex(to))
                };
                let _ = reply.send(result);
            }
            SessionCommand::JumpTo { index, reply } => {
                let _ = reply.send(self.jump_to(index));
            }
            SessionCommand::Clear(reply) => {
                let dropped = self.state.queue.len();
                self.state.queue.clear();
                let _ = reply.send(dropped);
            }
            SessionCommand::SetAutoShuffle { enabled, reply } => {
                self.state.auto_shuffle = enabled;
                let _ = reply.send(());
            }
            SessionCommand::StartRadio {
                user,
                tracks,
                channel,
                text,
                reply,
            } => {
                let result = self.start_radio(user, tracks, channel, text).await;
                let _ = reply.send(result);
            }
            SessionCommand::StopRadio(reply) => {
                let result = match self.state.radio.take() {
                    Some(_) => {
                        tracing::info!(target: "session", tenant = %self.tenant, "Radio off");
                        Ok(())
                    }
                    None => Err(CommandError::RadioInactive),
                };
                let _ = reply.send(result);
            }
            SessionCommand::Leave(reply) => {
                self.disconnect().await;
                let _ = reply.send(());
            }
            SessionCommand::Shutdown => {}
        }
    }

    async fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Resolved { generation, result } => {
                if generation != self.state.generation {
                    tracing::debug!(target: "session", generation, "Dropping stale resolution");
                    return;
                }
                self.on_resolved(generation, result).await;
            }
            SessionEvent::TrackEnded {
                generation,
                outcome,
            } => {
                if generation != self.state.generation {
                    tracing::debug!(target: "session", generation, ?outcome, "Dropping stale completion");
                    return;
                }
                self.on_track_ended(outcome).await;
            }
            SessionEvent::RadioBatch(tracks) => self.on_radio_batch(tracks).await,
        }
    }

    async fn notify(&self, notice: SessionNotice) {
        self.ctx
            .notifier
            .notify(self.tenant, self.state.text_channel, notice)
            .await;
    }

    async fn ensure_connected(
        &mut self,
        channel: ChannelId,
        text: Option<ChannelId>,
    ) -> Result<(), CommandError> {
        if text.is_some() {
            self.state.text_channel = text;
        }

        match self.state.transport.as_mut() {
            Some(transport) if transport.channel() == channel => Ok(()),
            Some(transport) => transport.move_to(channel).await.map_err(|e| {
                tracing::warn!(target: "session", tenant = %self.tenant, %channel, error = %e, "Move failed");
                CommandError::VoiceConnectFailed
            }),
            None => {
                let transport = self
                    .ctx
                    .gateway
                    .connect(self.tenant, channel)
                    .await
                    .map_err(|e| {
                        tracing::warn!(target: "session", tenant = %self.tenant, %channel, error = %e, "Connect failed");
                        CommandError::VoiceConnectFailed
                    })?;
                tracing::info!(target: "session", tenant = %self.tenant, %channel, "Connected");
                self.state.transport = Some(transport);
                Ok(())
            }
        }
    }

    async fn enqueue(
        &mut self,
        tracks: Vec<Track>,
        channel: ChannelId,
        text: Option<ChannelId>,
    ) -> Result<EnqueueOutcome, CommandError> {
        if tracks.is_empty() {
            return Err(CommandError::NoResults);
        }
        self.ensure_connected(channel, text).await?;

        let total = tracks.len();
        let added = self.state.queue.add_multiple(tracks);
        if added == 0 {
            return Err(CommandError::QueueFull);
        }
        let shuffled = added > 1 && self.state.auto_shuffle && self.state.queue.shuffle();
        tracing::debug!(target: "session", tenant = %self.tenant, added, shuffled, "Enqueued");

        if self.state.is_quiet() {
            self.advance().await;
        }
        Ok(EnqueueOutcome {
            added,
            rejected: total - added,
            shuffled,
        })
    }

    async fn start_radio(
        &mut self,
        user: UserId,
        tracks: Vec<Track>,
        channel: ChannelId,
        text: Option<ChannelId>,
    ) -> Result<EnqueueOutcome, CommandError> {
        if tracks.is_empty() {
            return Err(CommandError::NoPreferences);
        }
        self.ensure_connected(channel, text).await?;

        self.state.radio = Some(RadioState::new(user));
        tracing::info!(target: "session", tenant = %self.tenant, %user, "Radio on");

        let total = tracks.len();
        let added = self.state.queue.add_multiple(tracks);
        if self.state.is_quiet() {
            self.advance().await;
        }
        Ok(EnqueueOutcome {
            added,
            rejected: total - added,
            shuffled: false,
        })
    }

    fn pause(&mut self) -> Result<(), CommandError> {
        let transport = self.state.transport.as_mut().ok_or(CommandError::NotConnected)?;
        if self.state.current.is_none() || !transport.is_playing() {
            return Err(CommandError::NothingPlaying);
        }
        transport.pause().map_err(|e| {
            tracing::warn!(target: "session", tenant = %self.tenant, error = %e, "Pause failed");
            CommandError::NothingPlaying
        })
    }

    fn resume(&mut self) -> Result<(), CommandError> {
        let transport = self.state.transport.as_mut().ok_or(CommandError::NotConnected)?;
        if self.state.current.is_none() || !transport.is_paused() {
            return Err(CommandError::NothingPaused);
        }
        transport.resume().map_err(|e| {
            tracing::warn!(target: "session", tenant = %self.tenant, error = %e, "Resume failed");
            CommandError::NothingPaused
        })
    }

    fn stop(&mut self) -> Result<(), CommandError> {
        if self.state.transport.is_none() {
            return Err(CommandError::NotConnected);
        }
        self.state.next_generation();
        self.state.queue.clear();
        self.state.current = None;
        self.state.radio = None;
        self.state.failures = 0;
        if let Some(transport) = self.state.transport.as_mut() {
            transport.stop();
        }
        tracing::info!(target: "session", tenant = %self.tenant, "Stopped");
        Ok(())
    }

    /// Skipping stops the transport; its completion drives the advance,
    /// exactly like a natural end.
    async fn skip(&mut self) -> Result<(), CommandError> {
        if self.state.transport.is_none() {
            return Err(CommandError::NotConnected);
        }
        if self.state.pending.is_some() {
            self.state.next_generation();
            self.advance().await;
            return Ok(());
        }
        if self.state.current.is_none() {
            return Err(CommandError::NothingPlaying);
        }
        if let Some(transport) = self.state.transport.as_mut() {
            transport.stop();
        }
        Ok(())
    }

    fn set_volume(&mut self, volume: u8) -> Result<(), CommandError> {
        if volume > 100 {
            return Err(CommandError::InvalidVolume);
        }
        self.state.volume = volume;
        let fraction = self.state.volume_fraction();
        if let Some(transport) = self.state.transport.as_mut() {
            transport.set_volume(fraction);
        }
        Ok(())
    }

    fn jump_to(&mut self, index: usize) -> Result<Track, CommandError> {
        if self.state.transport.is_none() {
            return Err(CommandError::NotConnected);
        }
        let track = self
            .state
            .queue
            .jump_to(index)
            .ok_or(CommandError::InvalidIndex(index))?;

        // Abandon the current slot before stopping so its completion is stale.
        self.state.next_generation();
        if let Some(transport) = self.state.transport.as_mut() {
            transport.stop();
        }
        if let Some(previous) = self.state.current.take() {
            self.record_play(&previous, &PlaybackOutcome::Stopped);
        }
        self.start(track.clone());
        Ok(track)
    }

    async fn disconnect(&mut self) {
        self.state.next_generation();
        self.state.current = None;
        self.state.radio = None;
        self.state.failures = 0;
        self.state.queue.clear();

        if let Some(mut transport) = self.state.transport.take() {
            transport.stop();
            if let Err(e) = transport.disconnect().await {
                tracing::warn!(target: "session", tenant = %self.tenant, error = %e, "Disconnect failed");
            }
            tracing::info!(target: "session", tenant = %self.tenant, "Disconnected");
        }
    }

    /// Take the next track and start resolving it.
    async fn advance(&mut self) {
        if self.state.transport.is_none() {
            return;
        }
        match self.state.queue.next() {
            Some(track) => self.start(track),
            None => self.queue_exhausted().await,
        }
    }

    fn start(&mut self, track: Track) {
        let generation = self.state.next_generation();
        let resolver = self.ctx.resolver.clone();
        let events = self.events_tx.clone();
        let timeout = self.ctx.settings.resolve_timeout;
        let locator = track.locator().to_string();

        tracing::debug!(target: "session", tenant = %self.tenant, generation, track = track.title(), "Resolving");
        let task = tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, resolver.stream_locator(&locator)).await {
                Ok(result) => result,
                Err(_) => Err(ResolveError::Timeout(timeout)),
            };
            let _ = events.send(SessionEvent::Resolved { generation, result });
        });

        self.state.pending = Some(PendingTrack {
            track,
            abort: task.abort_handle(),
        });
    }

    async fn on_resolved(&mut self, generation: u64, result: Result<StreamHandle, ResolveError>) {
        let Some(PendingTrack { track, .. }) = self.state.pending.take() else {
            return;
        };

        let started = match result {
            Ok(stream) => self.play(&track, stream, generation).await,
            Err(e) => Err(e.to_string()),
        };

        match started {
            Ok(()) => {
                tracing::info!(target: "session", tenant = %self.tenant, track = track.title(), "Now playing");
                self.state.failures = 0;
                if let Some(radio) = self.state.radio.as_mut() {
                    radio.barren_refills = 0;
                }
                self.state.last_played = Some(track.clone());
                self.state.current = Some(track.clone());
                let queued = self.state.queue.len();
                self.notify(SessionNotice::NowPlaying { track, queued }).await;
            }
            Err(reason) => self.track_failed(track, reason).await,
        }
    }

    async fn play(&mut self, track: &Track, stream: StreamHandle, generation: u64) -> Result<(), String> {
        let volume = self.state.volume_fraction();
        let transport = self
            .state
            .transport
            .as_mut()
            .ok_or_else(|| "not connected".to_string())?;

        let events = self.events_tx.clone();
        let on_complete = CompletionNotifier::new(move |outcome| {
            let _ = events.send(SessionEvent::TrackEnded { generation, outcome });
        });
        let source = PlaybackSource {
            stream,
            title: track.title().to_string(),
            duration_secs: track.duration_secs(),
        };
        transport
            .play(source, volume, on_complete)
            .await
            .map_err(|e| e.to_string())
    }

    async fn track_failed(&mut self, track: Track, reason: String) {
        tracing::warn!(target: "session", tenant = %self.tenant, track = track.title(), reason = %reason, "Track failed to start");
        self.state.failures += 1;
        self.notify(SessionNotice::TrackFailed { track, reason }).await;

        // Song loop would retry the same broken track forever; queue loop
        // gives up once every track in the cycle has failed in a row.
        let give_up = match self.state.queue.loop_mode() {
            LoopMode::Song => true,
            LoopMode::Queue => {
                self.state.failures >= self.state.queue.len() + self.state.queue.history_len()
            }
            LoopMode::Off => false,
        };
        if give_up {
            tracing::warn!(target: "session", tenant = %self.tenant, failures = self.state.failures, "Giving up after repeated failures");
            self.state.failures = 0;
            self.notify(SessionNotice::QueueFinished).await;
            return;
        }
        self.advance().await;
    }

    async fn on_track_ended(&mut self, outcome: PlaybackOutcome) {
        let Some(track) = self.state.current.take() else {
            return;
        };
        if let PlaybackOutcome::Failed(reason) = &outcome {
            tracing::warn!(target: "session", tenant = %self.tenant, track = track.title(), reason, "Playback broke off");
        }
        self.record_play(&track, &outcome);
        self.advance().await;
    }

    fn record_play(&self, track: &Track, outcome: &PlaybackOutcome) {
        let mut record = PlayRecord::for_track(self.tenant, track, *outcome == PlaybackOutcome::Stopped);
        record.completed = *outcome == PlaybackOutcome::Finished;

        let store = self.ctx.preferences.clone();
        tokio::spawn(async move {
            if let Err(e) = store.add_play_history(&record).await {
                tracing::warn!(target: "preferences", error = %e, "Couldn't record play");
            }
        });
    }

    async fn queue_exhausted(&mut self) {
        let tenant = self.tenant;
        let Some(radio) = self.state.radio.as_mut() else {
            self.notify(SessionNotice::QueueFinished).await;
            return;
        };
        if radio.refill_pending {
            return;
        }
        if radio.barren_refills >= MAX_BARREN_REFILLS {
            tracing::info!(target: "session", %tenant, "Radio found nothing playable, stopping");
            self.end_radio().await;
            return;
        }
        radio.barren_refills += 1;
        radio.refill_pending = true;

        let user = radio.user;
        let source = self.ctx.radio.clone();
        let seed = self.state.last_played.clone();
        let size = self.ctx.settings.radio_batch_size;
        let events = self.events_tx.clone();
        tracing::debug!(target: "session", %tenant, %user, "Refilling radio");
        tokio::spawn(async move {
            let tracks = source.refill(user, tenant, seed, size).await;
            let _ = events.send(SessionEvent::RadioBatch(tracks));
        });
    }

    async fn on_radio_batch(&mut self, tracks: Vec<Track>) {
        let Some(radio) = self.state.radio.as_mut() else {
            return;
        };
        radio.refill_pending = false;

        if tracks.is_empty() {
            self.end_radio().await;
            return;
        }
        if self.state.transport.is_none() {
            return;
        }
        let added = self.state.queue.add_multiple(tracks);
        self.notify(SessionNotice::RadioRefilled { added }).await;
        if self.state.is_quiet() {
            self.advance().await;
        }
    }

    async fn end_radio(&mut self) {
        self.state.radio = None;
        self.notify(SessionNotice::RadioEnded).await;
        self.notify(SessionNotice::QueueFinished).await;
    }
}
