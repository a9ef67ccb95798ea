//! Media clock seam
//!
//! Playback itself lives outside the engine. The engine only reads a playback
//! position and an end-of-track flag, and issues play/pause/seek at phase
//! transitions.

use tokio::time::{Duration, Instant};

/// Read side of a playing track
pub trait MediaClock {
    /// Current playback position in ms from song start
    fn position_ms(&self) -> i64;

    /// True once playback reached the end of the track
    fn is_ended(&self) -> bool;
}

/// Control side of a playing track
pub trait MediaControl: MediaClock {
    fn play(&mut self);
    fn pause(&mut self);
    fn seek(&mut self, position_ms: i64);
}

/// Wall-clock driven stand-in for a media element
///
/// Uses `tokio::time::Instant` so tests can run it under paused time.
#[derive(Debug, Clone)]
pub struct SimulatedTrack {
    duration_ms: i64,
    /// Position accumulated before the current play span
    base_ms: i64,
    playing_since: Option<Instant>,
}

impl SimulatedTrack {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration_ms: duration.as_millis() as i64,
            base_ms: 0,
            playing_since: None,
        }
    }

    pub fn duration_ms(&self) -> i64 {
        self.duration_ms
    }

    pub fn is_playing(&self) -> bool {
        self.playing_since.is_some() && !self.is_ended()
    }
}

impl MediaClock for SimulatedTrack {
    fn position_ms(&self) -> i64 {
        let running = self
            .playing_since
            .map_or(0, |since| since.elapsed().as_millis() as i64);
        (self.base_ms + running).min(self.duration_ms)
    }

    fn is_ended(&self) -> bool {
        self.position_ms() >= self.duration_ms
    }
}

impl MediaControl for SimulatedTrack {
    fn play(&mut self) {
        if self.playing_since.is_none() {
            self.playing_since = Some(Instant::now());
        }
    }

    fn pause(&mut self) {
        self.base_ms = self.position_ms();
        self.playing_since = None;
    }

    fn seek(&mut self, position_ms: i64) {
        self.base_ms = position_ms.clamp(0, self.duration_ms);
        if self.playing_since.is_some() {
            self.playing_since = Some(Instant::now());
        }
    }
}
