//! # Encore Common Library
//!
//! Shared code for the encore room crates:
//! - Sync event model and wire envelope (SyncEvent)
//! - Per-room event bus
//! - Shared room types (roles, instruments, game phase)
//! - Configuration loading
//! - Time and identifier helpers

pub mod config;
pub mod error;
pub mod events;
pub mod time;
pub mod uuid_utils;

pub use error::{Error, Result};
