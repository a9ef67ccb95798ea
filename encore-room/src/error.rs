//! Error types for encore-room

use encore_common::events::GamePhase;
use thiserror::Error;

/// Room-level error type
#[derive(Error, Debug)]
pub enum RoomError {
    /// No live channel; the client observes `is_connected() == false`
    #[error("Not connected to room {0}")]
    NotConnected(String),

    /// Phase change not allowed from the current phase
    #[error("Invalid phase transition: {from} -> {to}")]
    InvalidTransition { from: GamePhase, to: GamePhase },

    /// Phase change proposed by a participant the room will not follow
    #[error("{0} is not the room driver")]
    NotDriver(String),

    /// Reservation queue had nothing to play
    #[error("Reservation queue is empty")]
    QueueEmpty,

    #[error(transparent)]
    Common(#[from] encore_common::Error),

    #[error(transparent)]
    Game(#[from] encore_game::GameError),
}

/// Convenience Result type using RoomError
pub type Result<T> = std::result::Result<T, RoomError>;
