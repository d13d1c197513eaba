//! Per-tenant play queue.
//!
//! A FIFO of [`Track`]s with a bounded history ring, a loop mode and a
//! single-slot pre-shuffle snapshot. Every operation reports misuse through
//! its return value (`bool` / `Option`); nothing here panics or errors on a
//! bad index or an empty queue.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use rand::seq::SliceRandom;

use crate::model::Track;

/// Default maximum number of queued tracks.
pub const DEFAULT_CAPACITY: usize = 100;

/// Default number of recently played tracks kept in history.
pub const DEFAULT_HISTORY_SIZE: usize = 10;

/// Loop mode controlling how [`QueueEngine::next`] dequeues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    #[default]
    Off,
    /// Replay the most recent track indefinitely
    Song,
    /// Refill the queue from history once it runs dry
    Queue,
}

impl LoopMode {
    /// The mode that follows this one when cycling off -> song -> queue.
    pub fn cycle(self) -> Self {
        match self {
            LoopMode::Off => LoopMode::Song,
            LoopMode::Song => LoopMode::Queue,
            LoopMode::Queue => LoopMode::Off,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LoopMode::Off => "off",
            LoopMode::Song => "song",
            LoopMode::Queue => "queue",
        }
    }
}

impl fmt::Display for LoopMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing a loop mode other than off/song/queue.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown loop mode: {0}")]
pub struct UnknownLoopMode(pub String);

impl FromStr for LoopMode {
    type Err = UnknownLoopMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(LoopMode::Off),
            "song" => Ok(LoopMode::Song),
            "queue" => Ok(LoopMode::Queue),
            _ => Err(UnknownLoopMode(s.to_string())),
        }
    }
}

/// The queue engine for one tenant.
#[derive(Debug, Clone)]
pub struct QueueEngine {
    /// Upcoming tracks, front is next
    items: VecDeque<Track>,
    /// Recently played tracks, most recent last
    history: VecDeque<Track>,
    history_size: usize,
    capacity: usize,
    loop_mode: LoopMode,
    /// Order of the queue before the last shuffle
    snapshot: Option<Vec<Track>>,
}

impl Default for QueueEngine {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl QueueEngine {
    /// Create an empty queue holding at most `capacity` tracks.
    pub fn new(capacity: usize) -> Self {
        Self::with_history_size(capacity, DEFAULT_HISTORY_SIZE)
    }

    pub fn with_history_size(capacity: usize, history_size: usize) -> Self {
        Self {
            items: VecDeque::new(),
            history: VecDeque::new(),
            history_size: history_size.max(1),
            capacity,
            loop_mode: LoopMode::Off,
            snapshot: None,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get the track at a queue position.
    pub fn get(&self, index: usize) -> Option<&Track> {
        self.items.get(index)
    }

    /// Append a track. Returns false, leaving the queue untouched, when full.
    pub fn add(&mut self, track: Track) -> bool {
        if self.is_full() {
            return false;
        }
        if let Some(snapshot) = self.snapshot.as_mut() {
            snapshot.push(track.clone());
        }
        self.items.push_back(track);
        true
    }

    /// Append tracks in order until the queue is full. Returns how many were added.
    pub fn add_multiple(&mut self, tracks: impl IntoIterator<Item = Track>) -> usize {
        let mut added = 0;
        for track in tracks {
            if !self.add(track) {
                break;
            }
            added += 1;
        }
        added
    }

    /// Take the next track according to the loop mode.
    pub fn next(&mut self) -> Option<Track> {
        if self.loop_mode == LoopMode::Song
            && let Some(last) = self.history.back()
        {
            return Some(last.clone());
        }

        if self.loop_mode == LoopMode::Queue && self.items.is_empty() && !self.history.is_empty() {
            let take = self.history.len().min(self.capacity);
            let refill: Vec<Track> = self.history.drain(..take).collect();
            if let Some(snapshot) = self.snapshot.as_mut() {
                snapshot.extend(refill.iter().cloned());
            }
            self.items.extend(refill);
        }

        let track = self.items.pop_front()?;
        self.forget_in_snapshot(&track);
        self.push_history(track.clone());
        Some(track)
    }

    /// Remove the track at `index`. History is not touched.
    pub fn remove(&mut self, index: usize) -> bool {
        if self.items.remove(index).is_none() {
            return false;
        }
        self.snapshot = None;
        true
    }

    /// Empty the upcoming queue. History is kept.
    pub fn clear(&mut self) {
        self.items.clear();
        self.snapshot = None;
    }

    /// Uniformly permute the queue. No-op below two tracks.
    ///
    /// The previous order is saved for [`unshuffle`](Self::unshuffle),
    /// overwriting any earlier snapshot.
    pub fn shuffle(&mut self) -> bool {
        if self.items.len() < 2 {
            return false;
        }
        self.snapshot = Some(self.items.iter().cloned().collect());
        let mut rng = rand::rng();
        self.items.make_contiguous().shuffle(&mut rng);
        true
    }

    /// Restore the order saved by the last shuffle, once.
    pub fn unshuffle(&mut self) -> bool {
        match self.snapshot.take() {
            Some(order) => {
                self.items = order.into();
                true
            }
            None => false,
        }
    }

    /// Whether an unshuffle would restore anything.
    pub fn can_unshuffle(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Move one track from `from` to `to`.
    pub fn move_item(&mut self, from: usize, to: usize) -> bool {
        let len = self.items.len();
        if from >= len || to >= len {
            return false;
        }
        if from != to
            && let Some(track) = self.items.remove(from)
        {
            self.items.insert(to, track);
            self.snapshot = None;
        }
        true
    }

    /// Skip ahead to `index`, returning the track there.
    ///
    /// Every skipped track and the returned one are pushed to history in
    /// queue order.
    pub fn jump_to(&mut self, index: usize) -> Option<Track> {
        if index >= self.items.len() {
            return None;
        }
        let skipped: Vec<Track> = self.items.drain(..index).collect();
        for track in skipped {
            self.forget_in_snapshot(&track);
            self.push_history(track);
        }
        let track = self.items.pop_front()?;
        self.forget_in_snapshot(&track);
        self.push_history(track.clone());
        Some(track)
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    pub fn set_loop_mode(&mut self, mode: LoopMode) {
        self.loop_mode = mode;
    }

    /// Parse and apply a loop mode. Anything but off/song/queue is rejected
    /// without changing state.
    pub fn set_loop_mode_str(&mut self, mode: &str) -> bool {
        match mode.parse() {
            Ok(mode) => {
                self.loop_mode = mode;
                true
            }
            Err(_) => false,
        }
    }

    /// Advance the loop mode one step and return the new mode.
    pub fn cycle_loop_mode(&mut self) -> LoopMode {
        self.loop_mode = self.loop_mode.cycle();
        self.loop_mode
    }

    /// Copy of the upcoming tracks.
    pub fn queue(&self) -> Vec<Track> {
        self.items.iter().cloned().collect()
    }

    /// Copy of the history, most recent last.
    pub fn history(&self) -> Vec<Track> {
        self.history.iter().cloned().collect()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Sum of known durations in the upcoming queue.
    pub fn total_duration_secs(&self) -> u64 {
        self.items.iter().map(Track::duration_secs).sum()
    }

    fn push_history(&mut self, track: Track) {
        while self.history.len() >= self.history_size {
            self.history.pop_front();
        }
        self.history.push_back(track);
    }

    fn forget_in_snapshot(&mut self, track: &Track) {
        if let Some(snapshot) = self.snapshot.as_mut()
            && let Some(pos) = snapshot.iter().position(|t| t.locator() == track.locator())
        {
            snapshot.remove(pos);
        }
    }
}
