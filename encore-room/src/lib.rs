//! # Encore Room
//!
//! Room synchronization for encore participants:
//! - Channel transport seam and in-process hub ([`channel`])
//! - HTTP transport through an encore relay ([`relay`])
//! - Event reducer behind every client's view ([`mirror`])
//! - Phase state machine for the driving client ([`phase`])
//! - Reservation queue collaborator ([`queue`])
//! - Room client tying a channel to a mirror ([`client`])
//! - Local stage controller ([`stage`])

pub mod channel;
pub mod client;
pub mod error;
pub mod mirror;
pub mod phase;
pub mod queue;
pub mod relay;
pub mod stage;

pub use channel::{ChannelHandle, LocalHub, Transport};
pub use client::RoomClient;
pub use error::{Result, RoomError};
pub use mirror::{Applied, Ignored, RoomMirror};
pub use phase::PhaseDriver;
pub use queue::{InMemoryQueue, Reservation, ReservationQueue};
pub use relay::RelayTransport;
pub use stage::{SpectateReason, StageController, StageTick, StageView};
