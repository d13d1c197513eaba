//! In-process transport that "plays" a stream by waiting out its duration.
//!
//! Drives the console and end-to-end runs without a voice platform. Pause
//! freezes the remaining time, stop ends it early, and completion fires
//! from the playback task exactly as a real media worker would.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::{
    CompletionNotifier, PlaybackOutcome, PlaybackSource, Transport, TransportError, VoiceGateway,
};
use crate::model::{ChannelId, TenantId};

/// Assumed length of a stream with unknown duration.
const UNKNOWN_LENGTH: Duration = Duration::from_secs(30);

/// Accepted playback speed range.
pub const MIN_SPEED: f64 = 0.01;
pub const MAX_SPEED: f64 = 100.0;

/// Clamp `speed` into [`MIN_SPEED`, `MAX_SPEED`]. Non-finite values play at 1.0.
fn clamp_speed(speed: f64) -> f64 {
    if !speed.is_finite() {
        return 1.0;
    }
    speed.clamp(MIN_SPEED, MAX_SPEED)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SimState {
    Idle,
    Playing,
    Paused,
}

#[derive(Debug)]
enum Control {
    Pause,
    Resume,
    Stop,
}

/// Opens [`SimulatedTransport`]s.
#[derive(Debug, Clone)]
pub struct SimulatedGateway {
    speed: f64,
}

impl SimulatedGateway {
    /// `speed` scales playback time; 2.0 plays a 3 minute track in 90 seconds.
    pub fn new(speed: f64) -> Self {
        Self {
            speed: clamp_speed(speed),
        }
    }
}

impl Default for SimulatedGateway {
    fn default() -> Self {
        Self::new(1.0)
    }
}

#[async_trait]
impl VoiceGateway for SimulatedGateway {
    async fn connect(
        &self,
        tenant: TenantId,
        channel: ChannelId,
    ) -> Result<Box<dyn Transport>, TransportError> {
        tracing::info!(target: "transport", %tenant, %channel, "Voice connected");
        Ok(Box::new(SimulatedTransport::new(tenant, channel, self.speed)))
    }
}

/// Simulated voice connection.
pub struct SimulatedTransport {
    tenant: TenantId,
    channel: ChannelId,
    connected: bool,
    speed: f64,
    volume: f32,
    /// State of the current playback task (fresh per stream)
    state: Arc<Mutex<SimState>>,
    control: Option<mpsc::UnboundedSender<Control>>,
}

impl SimulatedTransport {
    pub fn new(tenant: TenantId, channel: ChannelId, speed: f64) -> Self {
        Self {
            tenant,
            channel,
            connected: true,
            speed: clamp_speed(speed),
            volume: 1.0,
            state: Arc::new(Mutex::new(SimState::Idle)),
            control: None,
        }
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    fn state(&self) -> SimState {
        *self.state.lock()
    }

    fn send(&self, control: Control) {
        if let Some(tx) = &self.control {
            let _ = tx.send(control);
        }
    }
}

async fn run_playback(
    length: Duration,
    mut control: mpsc::UnboundedReceiver<Control>,
    state: Arc<Mutex<SimState>>,
    on_complete: CompletionNotifier,
) {
    let mut remaining = length;
    let mut started = Instant::now();
    let mut paused = false;

    let outcome = loop {
        if paused {
            match control.recv().await {
                Some(Control::Resume) => {
                    paused = false;
                    started = Instant::now();
                    *state.lock() = SimState::Playing;
                }
                Some(Control::Pause) => {}
                Some(Control::Stop) | None => break PlaybackOutcome::Stopped,
            }
            continue;
        }

        tokio::select! {
            _ = tokio::time::sleep(remaining) => break PlaybackOutcome::Finished,
            cmd = control.recv() => match cmd {
                Some(Control::Pause) => {
                    remaining = remaining.saturating_sub(started.elapsed());
                    paused = true;
                    *state.lock() = SimState::Paused;
                }
                Some(Control::Resume) => {}
                Some(Control::Stop) | None => break PlaybackOutcome::Stopped,
            },
        }
    };

    *state.lock() = SimState::Idle;
    on_complete.notify(outcome);
}

#[async_trait]
impl Transport for SimulatedTransport {
    fn channel(&self) -> ChannelId {
        self.channel
    }

    async fn move_to(&mut self, channel: ChannelId) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        tracing::info!(target: "transport", tenant = %self.tenant, from = %self.channel, to = %channel, "Moved voice channel");
        self.channel = channel;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.stop();
        self.connected = false;
        tracing::info!(target: "transport", tenant = %self.tenant, "Voice disconnected");
        Ok(())
    }

    async fn play(
        &mut self,
        source: PlaybackSource,
        volume: f32,
        on_complete: CompletionNotifier,
    ) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        if self.control.is_some() {
            self.stop();
        }

        let base = match source.duration_secs {
            0 => UNKNOWN_LENGTH,
            secs => Duration::from_secs(secs),
        };
        let length = base.div_f64(self.speed);

        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(SimState::Playing));
        self.state = state.clone();
        self.control = Some(tx);
        self.volume = volume.clamp(0.0, 1.0);

        tracing::debug!(target: "transport", tenant = %self.tenant, title = %source.title, ?length, "Simulated playback started");
        tokio::spawn(run_playback(length, rx, state, on_complete));
        Ok(())
    }

    fn pause(&mut self) -> Result<(), TransportError> {
        if self.state() != SimState::Playing {
            return Err(TransportError::Playback("nothing is playing".to_string()));
        }
        // Reflect the pause immediately; the task confirms it.
        *self.state.lock() = SimState::Paused;
        self.send(Control::Pause);
        Ok(())
    }

    fn resume(&mut self) -> Result<(), TransportError> {
        if self.state() != SimState::Paused {
            return Err(TransportError::Playback("nothing is paused".to_string()));
        }
        *self.state.lock() = SimState::Playing;
        self.send(Control::Resume);
        Ok(())
    }

    fn stop(&mut self) {
        self.send(Control::Stop);
        self.control = None;
        *self.state.lock() = SimState::Idle;
    }

    fn is_playing(&self) -> bool {
        self.state() == SimState::Playing
    }

    fn is_paused(&self) -> bool {
        self.state() == SimState::Paused
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }
}
