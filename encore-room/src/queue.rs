//! Song reservation queue
//!
//! Reservations are owned by an external service; the phase driver only pops
//! the next one when leaving song-select. [`InMemoryQueue`] is the in-process
//! implementation used by the simulator and tests.

use encore_common::{time, uuid_utils};
use std::collections::VecDeque;
use uuid::Uuid;

/// One queued song
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub id: Uuid,
    pub song_id: String,
    /// Enqueue time (ms since epoch)
    pub enqueued_at: i64,
}

/// Reservation queue collaborator
pub trait ReservationQueue {
    fn enqueue(&mut self, song_id: &str) -> Reservation;

    /// Remove and return the oldest reservation
    fn dequeue_next(&mut self) -> Option<Reservation>;

    /// Pending reservations, oldest first
    fn list_pending(&self) -> Vec<Reservation>;
}

/// FIFO queue held in memory
#[derive(Debug, Default)]
pub struct InMemoryQueue {
    entries: VecDeque<Reservation>,
}

impl InMemoryQueue {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cancel a reservation; returns whether it was queued
    pub fn remove(&mut self, id: Uuid) -> bool {
        let before = self.entries.len();
        self.entries.retain(|r| r.id != id);
        self.entries.len() != before
    }
}

impl ReservationQueue for InMemoryQueue {
    fn enqueue(&mut self, song_id: &str) -> Reservation {
        let reservation = Reservation {
            id: uuid_utils::generate(),
            song_id: song_id.to_string(),
            enqueued_at: time::now_ms(),
        };
        self.entries.push_back(reservation.clone());
        reservation
    }

    fn dequeue_next(&mut self) -> Option<Reservation> {
        self.entries.pop_front()
    }

    fn list_pending(&self) -> Vec<Reservation> {
        self.entries.iter().cloned().collect()
    }
}
