//! Audio transport boundary.
//!
//! A [`VoiceGateway`] opens a [`Transport`] into a voice channel. The
//! transport plays one stream at a time and reports the end of each stream
//! through a [`CompletionNotifier`], which may fire from any thread. The
//! session turns that into a message on its own mailbox, so transports never
//! touch session state.

use std::fmt;

use async_trait::async_trait;

use crate::model::{ChannelId, TenantId};
use crate::resolver::StreamHandle;

mod simulated;

pub use simulated::{MAX_SPEED, MIN_SPEED, SimulatedGateway, SimulatedTransport};

/// How a stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// Played to the end
    Finished,
    /// Cut short by `stop()`
    Stopped,
    /// The stream broke mid-playback
    Failed(String),
}

/// One-shot callback fired when the current stream ends.
pub struct CompletionNotifier {
    callback: Box<dyn FnOnce(PlaybackOutcome) + Send + 'static>,
}

impl CompletionNotifier {
    pub fn new(callback: impl FnOnce(PlaybackOutcome) + Send + 'static) -> Self {
        Self {
            callback: Box::new(callback),
        }
    }

    /// Report the outcome. Never blocks.
    pub fn notify(self, outcome: PlaybackOutcome) {
        (self.callback)(outcome);
    }
}

impl fmt::Debug for CompletionNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionNotifier").finish_non_exhaustive()
    }
}

/// What to play.
#[derive(Debug, Clone)]
pub struct PlaybackSource {
    pub stream: StreamHandle,
    pub title: String,
    /// Seconds, 0 when unknown
    pub duration_secs: u64,
}

/// Errors from the voice transport.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to connect to voice channel {0}: {1}")]
    ConnectFailed(ChannelId, String),

    #[error("Not connected to a voice channel")]
    NotConnected,

    #[error("Playback failed: {0}")]
    Playback(String),
}

/// An open voice connection for one tenant.
///
/// `stop()` must fire the pending completion with
/// [`PlaybackOutcome::Stopped`]; the session relies on it to advance after
/// a skip.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Channel currently joined.
    fn channel(&self) -> ChannelId;

    async fn move_to(&mut self, channel: ChannelId) -> Result<(), TransportError>;

    async fn disconnect(&mut self) -> Result<(), TransportError>;

    /// Start playing `source` at `volume` (0.0 to 1.0), replacing nothing:
    /// callers stop the previous stream first.
    async fn play(
        &mut self,
        source: PlaybackSource,
        volume: f32,
        on_complete: CompletionNotifier,
    ) -> Result<(), TransportError>;

    fn pause(&mut self) -> Result<(), TransportError>;

    fn resume(&mut self) -> Result<(), TransportError>;

    fn stop(&mut self);

    fn is_playing(&self) -> bool;

    fn is_paused(&self) -> bool;

    fn is_connected(&self) -> bool;

    /// Change the live volume (0.0 to 1.0) without restarting the stream.
    fn set_volume(&mut self, volume: f32);
}

/// Opens voice connections.
///
/// Implement this trait to create mock implementations for testing.
#[async_trait]
pub trait VoiceGateway: Send + Sync {
    async fn connect(
        &self,
        tenant: TenantId,
        channel: ChannelId,
    ) -> Result<Box<dyn Transport>, TransportError>;
}
