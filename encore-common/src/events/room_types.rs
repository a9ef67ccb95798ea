//! Room-related type definitions
//!
//! Participant roles, instruments and the replicated game state that every
//! client mirrors.

use serde::{Deserialize, Serialize};

/// Participant role within a room
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Singer,
    Band,
    Audience,
}

impl Role {
    /// Whether this role drives phase transitions
    pub fn is_driver(self) -> bool {
        matches!(self, Role::Singer)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Singer => write!(f, "singer"),
            Role::Band => write!(f, "band"),
            Role::Audience => write!(f, "audience"),
        }
    }
}

/// Playable band instrument
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Instrument {
    Drums,
    Guitar,
    Keyboard,
    Bass,
}

impl Instrument {
    pub const ALL: [Instrument; 4] = [
        Instrument::Drums,
        Instrument::Guitar,
        Instrument::Keyboard,
        Instrument::Bass,
    ];

    /// Lane-based instruments route taps to a specific pad
    pub fn is_lane_based(self) -> bool {
        matches!(self, Instrument::Drums)
    }

    /// Number of lanes (0 for free-form instruments)
    pub fn lane_count(self) -> u8 {
        if self.is_lane_based() {
            4
        } else {
            0
        }
    }
}

impl std::fmt::Display for Instrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Instrument::Drums => write!(f, "drums"),
            Instrument::Guitar => write!(f, "guitar"),
            Instrument::Keyboard => write!(f, "keyboard"),
            Instrument::Bass => write!(f, "bass"),
        }
    }
}

/// Chart difficulty
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Normal,
    Hard,
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Difficulty::Easy => write!(f, "easy"),
            Difficulty::Normal => write!(f, "normal"),
            Difficulty::Hard => write!(f, "hard"),
        }
    }
}

/// Room session phase
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum GamePhase {
    SongSelect,
    Ready,
    Countdown,
    Playing,
    Finished,
}

impl std::fmt::Display for GamePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GamePhase::SongSelect => write!(f, "song-select"),
            GamePhase::Ready => write!(f, "ready"),
            GamePhase::Countdown => write!(f, "countdown"),
            GamePhase::Playing => write!(f, "playing"),
            GamePhase::Finished => write!(f, "finished"),
        }
    }
}

/// Room participant as seen by every mirror
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: String,
    pub name: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrument: Option<Instrument>,
}

/// Replicated room game state
///
/// The authoritative copy lives with the driver; every other client holds a
/// best-effort mirror updated from `game_update` events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoomGameState {
    pub phase: GamePhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_song_id: Option<String>,
    /// Absolute start instant (ms since epoch)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_start_time: Option<i64>,
}

impl Default for RoomGameState {
    fn default() -> Self {
        Self {
            phase: GamePhase::SongSelect,
            current_song_id: None,
            scheduled_start_time: None,
        }
    }
}

impl RoomGameState {
    /// Shallow field overwrite from a partial update
    ///
    /// Fields absent from the update are kept, except that entering
    /// `song-select` or `ready` drops the schedule and entering `song-select`
    /// drops the song unless the update names one.
    pub fn merge(&mut self, update: &super::GameUpdate) {
        if let Some(phase) = update.phase {
            match phase {
                GamePhase::SongSelect => {
                    self.current_song_id = None;
                    self.scheduled_start_time = None;
                }
                GamePhase::Ready => {
                    self.scheduled_start_time = None;
                }
                _ => {}
            }
            self.phase = phase;
        }
        if let Some(song_id) = &update.current_song_id {
            self.current_song_id = Some(song_id.clone());
        }
        if let Some(start) = update.scheduled_start_time {
            self.scheduled_start_time = Some(start);
        }
    }

    /// Milliseconds left before the scheduled start, never negative
    ///
    /// Recomputed from the shared timestamp on every call, so broadcast
    /// latency does not shift the local countdown.
    pub fn countdown_remaining_ms(&self, now_ms: i64) -> Option<i64> {
        self.scheduled_start_time.map(|t| (t - now_ms).max(0))
    }

    /// Phase this client should present at `now_ms`
    ///
    /// A countdown whose scheduled start has passed is locally `playing`
    /// even before any further update arrives.
    pub fn effective_phase(&self, now_ms: i64) -> GamePhase {
        match (self.phase, self.scheduled_start_time) {
            (GamePhase::Countdown, Some(start)) if now_ms >= start => GamePhase::Playing,
            (phase, _) => phase,
        }
    }
}
