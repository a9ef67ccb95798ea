//! # Encore Game Engine
//!
//! Rhythm-game core shared by every band-member client:
//! - Chart generation from tempo and density ([`chart`])
//! - Tap judgment and miss sweep ([`judge`])
//! - Score, combo and judgment tallies ([`scoring`])
//! - Score-gated calls ([`calls`])
//! - Media clock seam ([`clock`])
//! - A session tying them together ([`session`])

pub mod calls;
pub mod chart;
pub mod clock;
pub mod error;
pub mod judge;
pub mod scoring;
pub mod session;

pub use chart::{Chart, ChartLibrary, Note, NoteKind, SongInfo};
pub use clock::{MediaClock, MediaControl, SimulatedTrack};
pub use error::{GameError, Result};
pub use judge::{JudgeMachine, Judgment, JudgmentResult, JudgmentWindows, NoteState};
pub use scoring::{JudgmentCounts, ScoreState, ScoreTable};
pub use session::{GameSession, SessionSummary, TapOutcome};
