//! Room phase state machine
//!
//! ```text
//! song-select → ready → countdown → playing → finished
//!      ↑          │          │          │         │
//!      └──────────┴──────────┴──────────┴─────────┘
//! ```
//!
//! The [`PhaseDriver`] is held by whichever client drives the session. Each
//! transition mutates the driver's own copy and returns the partial
//! [`GameUpdate`] to broadcast; the sequence number is stamped by the client
//! at send time.

use crate::error::{Result, RoomError};
use crate::queue::ReservationQueue;
use encore_common::events::{GamePhase, GameUpdate, RoomGameState};
use tracing::info;

/// Whether `from → to` is a legal phase change
pub fn can_transition(from: GamePhase, to: GamePhase) -> bool {
    use GamePhase::*;
    matches!(
        (from, to),
        (SongSelect, Ready)
            | (Ready, Ready)
            | (Ready, Countdown)
            | (Countdown, Playing)
            | (Playing, Finished)
            | (Ready, SongSelect)
            | (Countdown, SongSelect)
            | (Playing, SongSelect)
            | (Finished, SongSelect)
    )
}

/// Authoritative phase state held by the driving client
pub struct PhaseDriver {
    state: RoomGameState,
    countdown_lead_ms: i64,
}

impl PhaseDriver {
    pub fn new(countdown_lead_ms: i64) -> Self {
        Self {
            state: RoomGameState::default(),
            countdown_lead_ms,
        }
    }

    /// Resume driving from an existing state (e.g. a roster snapshot)
    pub fn with_state(state: RoomGameState, countdown_lead_ms: i64) -> Self {
        Self {
            state,
            countdown_lead_ms,
        }
    }

    pub fn state(&self) -> &RoomGameState {
        &self.state
    }

    pub fn phase(&self) -> GamePhase {
        self.state.phase
    }

    fn check(&self, to: GamePhase) -> Result<()> {
        if can_transition(self.state.phase, to) {
            Ok(())
        } else {
            Err(RoomError::InvalidTransition {
                from: self.state.phase,
                to,
            })
        }
    }

    fn commit(&mut self, update: GameUpdate) -> GameUpdate {
        self.state.merge(&update);
        info!("Phase -> {}", self.state.phase);
        update
    }

    /// `song-select|ready → ready` with the chosen song
    pub fn select_song(&mut self, song_id: impl Into<String>) -> Result<GameUpdate> {
        self.check(GamePhase::Ready)?;
        Ok(self.commit(GameUpdate {
            phase: Some(GamePhase::Ready),
            current_song_id: Some(song_id.into()),
            ..Default::default()
        }))
    }

    /// Pop the next reservation and select it
    pub fn select_next_from_queue<Q: ReservationQueue + ?Sized>(
        &mut self,
        queue: &mut Q,
    ) -> Result<GameUpdate> {
        self.check(GamePhase::Ready)?;
        let reservation = queue.dequeue_next().ok_or(RoomError::QueueEmpty)?;
        self.select_song(reservation.song_id)
    }

    /// `ready → countdown`, scheduling the start `countdown_lead_ms` after `now_ms`
    pub fn start_countdown(&mut self, now_ms: i64) -> Result<GameUpdate> {
        self.check(GamePhase::Countdown)?;
        Ok(self.commit(GameUpdate {
            phase: Some(GamePhase::Countdown),
            scheduled_start_time: Some(now_ms + self.countdown_lead_ms),
            ..Default::default()
        }))
    }

    /// `countdown → playing`
    pub fn start_playing(&mut self) -> Result<GameUpdate> {
        self.check(GamePhase::Playing)?;
        Ok(self.commit(GameUpdate {
            phase: Some(GamePhase::Playing),
            ..Default::default()
        }))
    }

    /// `playing → finished`, on end of track or early end
    pub fn finish(&mut self) -> Result<GameUpdate> {
        self.check(GamePhase::Finished)?;
        Ok(self.commit(GameUpdate {
            phase: Some(GamePhase::Finished),
            ..Default::default()
        }))
    }

    /// Back to `song-select` from any later phase
    pub fn back_to_song_select(&mut self) -> Result<GameUpdate> {
        self.check(GamePhase::SongSelect)?;
        Ok(self.commit(GameUpdate {
            phase: Some(GamePhase::SongSelect),
            ..Default::default()
        }))
    }
}
