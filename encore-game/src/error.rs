//! Error types for encore-game

use encore_common::events::{Difficulty, Instrument};
use thiserror::Error;

/// Gameplay error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GameError {
    /// Bad chart-generation inputs; the caller must not use a partial chart
    #[error("Invalid chart parameters: {0}")]
    InvalidParameters(String),

    /// No chart was generated for this song/instrument/difficulty
    #[error("No chart for song {song_id} ({instrument}, {difficulty})")]
    MissingChart {
        song_id: String,
        instrument: Instrument,
        difficulty: Difficulty,
    },

    #[error("Unknown call: {0}")]
    UnknownCall(String),

    /// Score has not reached the call's unlock threshold
    #[error("Call {id} locked until score {required} (have {score})")]
    CallLocked { id: String, required: u64, score: u64 },

    #[error("Call already used this session: {0}")]
    CallAlreadyUsed(String),
}

/// Convenience Result type using GameError
pub type Result<T> = std::result::Result<T, GameError>;
