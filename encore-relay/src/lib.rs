//! Encore relay
//!
//! Stateless HTTP relay for room sync events. Clients POST events for a
//! room and receive every room event over SSE. Delivery is at-most-once
//! with no persistence; the only state kept is one broadcast bus per room
//! and a roster derived from join/sync/leave traffic.

pub mod api;
pub mod error;
pub mod state;

pub use api::{create_router, AppContext};
pub use error::{RelayError, Result};
pub use state::RelayState;
